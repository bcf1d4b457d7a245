//! Extension Registrar Tests
//!
//! Walks real plugin directories built in temp dirs:
//! - archive → command group registration
//! - alias collisions within and across groups
//! - missing, empty and malformed inputs
//! - nested directories and nested declarations

mod common;

use std::path::Path;
use std::sync::Arc;

use cmdgraph_core::command::{Dispatcher, MethodCommand};
use cmdgraph_core::error::ExtensionError;
use cmdgraph_core::extension::{
    CodePath, DynModule, MAX_ENTRY_SIZE, ManifestRuntime, ModuleRuntime, SkipReason,
};
use common::{
    commands_manifest, registrar, registrar_with, root_node, write_archive,
    write_archive_declaring_size,
};
use tempfile::TempDir;

// ============================================================================
// Registration
// ============================================================================

#[test]
fn test_archive_module_becomes_described_group() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "cmds.jar",
        &[("com/example/Greet.cmd.json", &commands_manifest(&[("hello", &["hello"])]))],
    );

    let node = registrar().register_all(dir.path(), root_node());

    let greet = node.child("Greet").expect("Greet group");
    let description = greet.description().description.unwrap();
    assert!(description.contains("cmds.jar"), "{description}");

    let dispatcher = greet.dispatcher();
    let dispatcher = dispatcher.read();
    let hello = dispatcher
        .get("hello")
        .unwrap()
        .callable()
        .as_any()
        .downcast_ref::<MethodCommand>()
        .unwrap()
        .clone();
    assert_eq!(hello.host, "com.example.Greet");
    assert_eq!(hello.method, "hello");
}

#[test]
fn test_same_alias_in_distinct_groups() {
    let dir = TempDir::new().unwrap();
    let build = commands_manifest(&[("build", &["build"])]);
    write_archive(dir.path(), "a.jar", &[("a/Alpha.cmd.json", &build)]);
    write_archive(dir.path(), "b.jar", &[("b/Beta.cmd.json", &build)]);

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert_eq!(report.registered.len(), 2);
    for group in ["Alpha", "Beta"] {
        assert!(node.child(group).unwrap().dispatcher().read().contains("build"));
    }
}

#[test]
fn test_report_lists_registered_commands() {
    let dir = TempDir::new().unwrap();
    let manifest = commands_manifest(&[("set", &["set", "s"]), ("get", &["get"])]);
    let jar = write_archive(dir.path(), "tools.jar", &[("x/Tools.cmd.json", &manifest)]);

    let report = registrar().scan(dir.path(), &root_node());

    assert!(report.root_exists);
    assert_eq!(report.archives_found, 1);
    assert_eq!(report.archives_merged, 1);
    let registered = &report.registered[0];
    assert_eq!(registered.module, "x.Tools");
    assert_eq!(registered.group, "Tools");
    assert_eq!(registered.archive, jar);
    assert_eq!(registered.commands, vec!["set", "get"]);

    let json = serde_json::to_value(&report).unwrap();
    assert_eq!(json["registered"][0]["group"], "Tools");
}

// ============================================================================
// Collisions
// ============================================================================

#[test]
fn test_same_simple_name_keeps_first_archive() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "a.jar",
        &[("one/Tool.cmd.json", &commands_manifest(&[("first", &["first"])]))],
    );
    write_archive(
        dir.path(),
        "b.jar",
        &[("two/Tool.cmd.json", &commands_manifest(&[("second", &["second"])]))],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert_eq!(report.registered.len(), 1);
    assert_eq!(report.skipped_with(SkipReason::AliasConflict).count(), 1);
    let tool = node.child("Tool").unwrap();
    let dispatcher = tool.dispatcher();
    let dispatcher = dispatcher.read();
    // registration order follows sorted listing, but exactly one module won
    assert_eq!(dispatcher.len(), 1);
    assert!(dispatcher.contains("first") != dispatcher.contains("second"));
}

#[test]
fn test_clashing_methods_leave_empty_group_and_walk_continues() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "bad.jar",
        &[
            (
                "Clash.cmd.json",
                &commands_manifest(&[("a", &["same"]), ("b", &["same"])]),
            ),
            ("Fine.cmd.json", &commands_manifest(&[("ok", &["ok"])])),
        ],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert!(report.aborted.is_none());
    assert!(node.child("Clash").unwrap().dispatcher().read().is_empty());
    assert!(node.child("Fine").unwrap().dispatcher().read().contains("ok"));
}

// ============================================================================
// Missing, empty and malformed inputs
// ============================================================================

#[test]
fn test_missing_root_returns_node_unchanged() {
    let dir = TempDir::new().unwrap();
    let node = registrar().register_all(&dir.path().join("plugins"), root_node());
    assert!(node.dispatcher().read().is_empty());
    assert!(node.is_root());
}

#[test]
fn test_directory_without_archives_changes_nothing() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("readme.txt"), "no archives here").unwrap();
    std::fs::create_dir(dir.path().join("empty")).unwrap();

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert_eq!(report.directories_visited, 2);
    assert_eq!(report.archives_found, 0);
    assert!(node.dispatcher().read().is_empty());
}

#[test]
fn test_invalid_archive_does_not_stop_walk() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("broken.jar"), b"definitely not a zip").unwrap();
    write_archive(
        dir.path(),
        "good.jar",
        &[("Good.cmd.json", &commands_manifest(&[("run", &["run"])]))],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert_eq!(report.archives_found, 2);
    assert_eq!(report.archives_merged, 1);
    assert_eq!(report.skipped_with(SkipReason::ArchiveUnreadable).count(), 1);
    assert!(node.child("Good").is_some());
}

#[test]
fn test_modules_without_commands_or_linkage_are_skipped() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "mixed.jar",
        &[
            ("Plain.cmd.json", r#"{"methods":[{"name":"helper"}]}"#),
            (
                "Orphan.cmd.json",
                r#"{"requires":["gone.Base"],"methods":[{"name":"x","command":{"aliases":["x"]}}]}"#,
            ),
            ("Garbage.cmd.json", "{ not json"),
            ("host/command/GeneralCommands.cmd.json", &commands_manifest(&[("help", &["help"])])),
            ("META-INF/MANIFEST.MF", "Manifest-Version: 1.0"),
        ],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert!(report.registered.is_empty());
    assert_eq!(report.skipped_with(SkipReason::NoCommands).count(), 1);
    assert_eq!(report.skipped_with(SkipReason::BlocklistedOrMissing).count(), 3);
    assert!(node.dispatcher().read().is_empty());
}

// ============================================================================
// Layout
// ============================================================================

#[test]
fn test_subdirectories_are_walked() {
    let dir = TempDir::new().unwrap();
    write_archive(
        &dir.path().join("vendor").join("deep"),
        "deep.jar",
        &[("Deep.cmd.json", &commands_manifest(&[("dig", &["dig"])]))],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert_eq!(report.directories_visited, 3);
    assert!(node.child("Deep").unwrap().dispatcher().read().contains("dig"));
}

#[test]
fn test_nested_entries_are_not_registered_on_their_own() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "outer.jar",
        &[
            ("Outer$Inner.cmd.json", &commands_manifest(&[("inner", &["inner"])])),
            (
                "Outer.cmd.json",
                r#"{"nested":[{"name":"Inner","methods":[{"name":"inner","command":{"aliases":["inner"]}}]}]}"#,
            ),
        ],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    // Outer is command-bearing via its nested declaration, but only its own
    // top-level methods are registered.
    assert!(report.is_registered("Outer"));
    assert!(node.child("Inner").is_none());
    assert!(node.child("Outer").unwrap().dispatcher().read().is_empty());
}

#[test]
fn test_dependency_in_sibling_archive_resolves() {
    let dir = TempDir::new().unwrap();
    // "a.jar" sorts first and depends on a module only "z.jar" provides
    write_archive(
        dir.path(),
        "a.jar",
        &[(
            "app/Child.cmd.json",
            r#"{"requires":["lib.Base"],"methods":[{"name":"c","command":{"aliases":["child"]}}]}"#,
        )],
    );
    write_archive(dir.path(), "z.jar", &[("lib/Base.cmd.json", r#"{"methods":[]}"#)]);

    let node = root_node();
    registrar().scan(dir.path(), &node);
    assert!(node.child("Child").unwrap().dispatcher().read().contains("child"));
}

#[test]
fn test_second_walk_reuses_code_path() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "cmds.jar",
        &[("Greet.cmd.json", &commands_manifest(&[("hello", &["hello"])]))],
    );
    let code_path = Arc::new(CodePath::new());
    let runtime = Arc::new(ManifestRuntime::default());
    let registrar = registrar_with(runtime.clone(), code_path.clone());

    let first = registrar.scan(dir.path(), &root_node());
    let second = registrar.scan(dir.path(), &root_node());

    assert_eq!(first.archives_merged, 1);
    assert_eq!(second.archives_merged, 0);
    assert_eq!(code_path.archives().len(), 1);
    assert_eq!(second.registered.len(), 1);
    assert_eq!(runtime.defined_count(), 1);
}

#[cfg(unix)]
#[test]
fn test_symlinked_archive_is_ignored() {
    let dir = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    let real = write_archive(
        elsewhere.path(),
        "real.jar",
        &[("Linked.cmd.json", &commands_manifest(&[("l", &["l"])]))],
    );
    std::os::unix::fs::symlink(&real, dir.path().join("linked.jar")).unwrap();

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);
    assert_eq!(report.archives_found, 0);
    assert!(node.child("Linked").is_none());
}

#[cfg(unix)]
#[test]
fn test_directory_link_cycles_are_walked_once() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "cmds.jar",
        &[("Loop.cmd.json", &commands_manifest(&[("spin", &["spin"])]))],
    );
    std::os::unix::fs::symlink(".", dir.path().join("a")).unwrap();
    std::os::unix::fs::symlink(".", dir.path().join("b")).unwrap();

    let report = registrar().scan(dir.path(), &root_node());
    assert!(report.aborted.is_none());
    assert_eq!(report.directories_visited, 1);
    assert_eq!(report.archives_found, 1);
    assert!(report.is_registered("Loop"));
    assert!(report.skipped.is_empty());
}

#[cfg(unix)]
#[test]
fn test_linked_directory_is_walked() {
    let dir = TempDir::new().unwrap();
    let elsewhere = TempDir::new().unwrap();
    write_archive(
        elsewhere.path(),
        "far.jar",
        &[("Far.cmd.json", &commands_manifest(&[("far", &["far"])]))],
    );
    std::os::unix::fs::symlink(elsewhere.path(), dir.path().join("far")).unwrap();

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);
    assert_eq!(report.directories_visited, 2);
    assert!(node.child("Far").unwrap().dispatcher().read().contains("far"));
}

#[test]
fn test_register_extensions_fluent_form() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "cmds.jar",
        &[("fluent/Fluent.cmd.json", &commands_manifest(&[("go", &["go"])]))],
    );

    let node = root_node().register_extensions(dir.path());
    assert!(node.child("Fluent").unwrap().dispatcher().read().contains("go"));
}

#[test]
fn test_command_without_alias_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "cmds.jar",
        &[(
            "Mute.cmd.json",
            r#"{"methods":[{"name":"quiet","command":{"aliases":[]}}]}"#,
        )],
    );

    let report = registrar().scan(dir.path(), &root_node());
    assert!(report.aborted.is_none());
    assert!(!report.is_registered("Mute"));
    assert_eq!(report.skipped_with(SkipReason::MissingAlias).count(), 1);
    assert_eq!(report.skipped_with(SkipReason::AliasConflict).count(), 0);
}

// ============================================================================
// Hostile archives
// ============================================================================

#[test]
fn test_entry_declaring_huge_size_is_skipped() {
    let dir = TempDir::new().unwrap();
    write_archive_declaring_size(dir.path(), "a.jar", "Greet.cmd.json", b"{}", 1 << 40);
    write_archive(
        dir.path(),
        "b.jar",
        &[("Fine.cmd.json", &commands_manifest(&[("fine", &["fine"])]))],
    );

    let node = root_node();
    let report = registrar().scan(dir.path(), &node);

    assert!(report.aborted.is_none());
    assert!(!report.is_registered("Greet"));
    assert!(report.is_registered("Fine"));
    assert!(
        report
            .skipped_with(SkipReason::BlocklistedOrMissing)
            .any(|s| s.entry == "Greet.cmd.json")
    );
}

#[test]
fn test_locate_rejects_entry_over_limit() {
    let dir = TempDir::new().unwrap();
    let jar = write_archive_declaring_size(
        dir.path(),
        "big.jar",
        "Big.cmd.json",
        b"{}",
        MAX_ENTRY_SIZE + 1,
    );
    let code_path = CodePath::new();
    code_path.append(&jar).unwrap();

    let err = code_path.locate("Big.cmd.json").unwrap_err();
    assert!(matches!(err, ExtensionError::Linkage { .. }));
}

// ============================================================================
// Panic isolation
// ============================================================================

/// Manifest runtime that panics when asked for one module.
#[derive(Default)]
struct PanickingRuntime {
    inner: ManifestRuntime,
}

impl ModuleRuntime for PanickingRuntime {
    fn module_suffix(&self) -> &str {
        self.inner.module_suffix()
    }

    fn lookup(&self, name: &str) -> Result<DynModule, ExtensionError> {
        if name == "Boom" {
            panic!("lookup of {name} exploded");
        }
        self.inner.lookup(name)
    }

    fn define(
        &self,
        name: &str,
        bytes: &[u8],
        origin: &Path,
        code_path: &CodePath,
    ) -> Result<DynModule, ExtensionError> {
        self.inner.define(name, bytes, origin, code_path)
    }

    fn install(&self, module: DynModule) {
        self.inner.install(module);
    }

    fn defined_count(&self) -> usize {
        self.inner.defined_count()
    }
}

#[test]
fn test_panic_during_walk_keeps_earlier_groups() {
    let dir = TempDir::new().unwrap();
    write_archive(
        dir.path(),
        "a.jar",
        &[("A.cmd.json", &commands_manifest(&[("first", &["first"])]))],
    );
    write_archive(
        dir.path(),
        "b.jar",
        &[("Boom.cmd.json", &commands_manifest(&[("boom", &["boom"])]))],
    );
    let registrar = registrar_with(
        Arc::new(PanickingRuntime::default()),
        Arc::new(CodePath::new()),
    );

    let node = registrar.register_from_plugin_directory(dir.path(), root_node());

    assert!(node.child("A").unwrap().dispatcher().read().contains("first"));
    assert!(node.child("Boom").is_none());
}
