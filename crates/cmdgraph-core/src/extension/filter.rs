//! Predicates used to filter plugin directory listings and module names.
//!
//! Symlink rejection is a heuristic: a plain file is treated as a link when
//! resolving it yields a different path than resolving only its parent and
//! re-joining the file name. It misses some link kinds on some platforms
//! (junctions, hard links) and is not a security boundary.

use std::path::{Path, PathBuf};

use tracing::{error, trace, warn};

/// Separator between an outer module and a nested declaration (`Outer$Inner`).
pub const NESTED_SEPARATOR: char = '$';

/// Modules that are never loaded from an extension archive.
///
/// The host's own command modules are registered by the host itself; loading a
/// second copy from a stale plugin archive would shadow them.
pub const BLOCKED_MODULES: &[&str] = &[
    "legacy.blocks.NativeBlockAdapter_1710",
    "host.command.BiomeCommands",
    "host.command.BrushCommands",
    "host.command.ChunkCommands",
    "host.command.ClipboardCommands",
    "host.command.GeneralCommands",
    "host.command.GenerationCommands",
    "host.command.HistoryCommands",
    "host.command.NavigationCommands",
    "host.command.RegionCommands",
    "host.command.SchematicCommands",
    "host.command.ScriptingCommands",
    "host.command.SelectionCommands",
    "host.command.SnapshotCommands",
    "host.command.SnapshotUtilCommands",
    "host.command.SuperPickaxeCommands",
    "host.command.ToolCommands",
    "host.command.ToolUtilCommands",
    "host.command.UtilityCommands",
    "host.command.HostCommands",
];

/// Whether `path` is a directory. Links to directories are accepted.
pub fn is_directory(path: &Path) -> bool {
    path.is_dir()
}

/// Whether `path` is a regular file that does not look like a symlink.
pub fn is_plain_file(path: &Path) -> bool {
    if !path.is_file() {
        trace!(path = %path.display(), "not a file");
        return false;
    }
    !is_symlink(path)
}

/// Best-effort symlink detection by canonical-path comparison.
///
/// I/O errors during the check are logged and the path is reported as a link,
/// so that it is rejected by [`is_plain_file`].
pub fn is_symlink(path: &Path) -> bool {
    match rejoined_differs(path) {
        Ok(true) => {
            warn!(path = %path.display(), "is a symbolic link");
            true
        }
        Ok(false) => false,
        Err(e) => {
            error!(path = %path.display(), error = %e, "Could not check for symbolic link");
            true
        }
    }
}

fn rejoined_differs(path: &Path) -> std::io::Result<bool> {
    let Some(name) = path.file_name() else {
        return Ok(false);
    };
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    let rejoined: PathBuf = parent.canonicalize()?.join(name);
    Ok(rejoined.canonicalize()? != rejoined)
}

/// Whether `path` is a plain file whose name ends with `suffix`.
pub fn is_extension_archive(path: &Path, suffix: &str) -> bool {
    let named = path
        .file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(suffix));
    named && is_plain_file(path)
}

/// Whether `name` is on the [`BLOCKED_MODULES`] list.
pub fn is_blocked(name: &str) -> bool {
    BLOCKED_MODULES.contains(&name)
}

/// Whether an archive entry names a nested declaration.
pub fn is_nested_entry(entry: &str) -> bool {
    entry.contains(NESTED_SEPARATOR)
}

/// Qualified module name of an archive entry: `a/b/C.cmd.json` → `a.b.C`.
///
/// Returns `None` when the entry does not end with `module_suffix`.
pub fn qualified_name(entry: &str, module_suffix: &str) -> Option<String> {
    let stem = entry.strip_suffix(module_suffix)?;
    if stem.is_empty() || stem.ends_with('/') {
        return None;
    }
    Some(stem.replace('/', "."))
}

/// Archive entry of a qualified module name: `a.b.C` → `a/b/C.cmd.json`.
pub fn entry_name(qualified: &str, module_suffix: &str) -> String {
    format!("{}{}", qualified.replace('.', "/"), module_suffix)
}

/// Part of a qualified name after the last `.`.
pub fn simple_name(qualified: &str) -> &str {
    qualified.rsplit('.').next().unwrap_or(qualified)
}
