//! Walking a plugin directory and registering command-bearing modules.
//!
//! For every directory, all archives are merged into the code path before any
//! module is loaded from them, so modules in one archive may depend on modules
//! in a sibling archive regardless of listing order. Subdirectories are walked
//! after the directory's own archives.

use std::collections::HashSet;
use std::fs::File;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};
use zip::ZipArchive;

use super::code_path::CodePath;
use super::detector::CommandDetector;
use super::filter;
use super::loader::ModuleLoader;
use super::module::DynModule;
use super::runtime::create_runtime;
use crate::command::{Dispatcher, DispatcherNode};
use crate::config::RegistrarConfig;
use crate::error::{CommandError, ExtensionError};

/// Why an archive entry did not become a command group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// Blocklisted, absent, or not linkable against this host.
    BlocklistedOrMissing,
    NoCommands,
    AliasConflict,
    /// A command method declares no alias.
    MissingAlias,
    LoadFailed,
    ArchiveUnreadable,
}

/// A module registered as a command group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisteredModule {
    pub module: String,
    pub group: String,
    pub archive: PathBuf,
    /// Primary aliases of the group's commands.
    pub commands: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedEntry {
    pub archive: PathBuf,
    pub entry: String,
    pub reason: SkipReason,
}

/// What one registration walk did.
#[derive(Debug, Clone, Serialize)]
pub struct RegistrationReport {
    pub root: PathBuf,
    pub started_at: DateTime<Utc>,
    pub root_exists: bool,
    pub directories_visited: usize,
    pub archives_found: usize,
    /// Archives merged into the code path by this walk.
    pub archives_merged: usize,
    pub registered: Vec<RegisteredModule>,
    pub skipped: Vec<SkippedEntry>,
    /// Set when the walk stopped early.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub aborted: Option<String>,
}

impl RegistrationReport {
    fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            started_at: Utc::now(),
            root_exists: false,
            directories_visited: 0,
            archives_found: 0,
            archives_merged: 0,
            registered: Vec::new(),
            skipped: Vec::new(),
            aborted: None,
        }
    }

    pub fn skipped_with(&self, reason: SkipReason) -> impl Iterator<Item = &SkippedEntry> {
        self.skipped.iter().filter(move |s| s.reason == reason)
    }

    pub fn is_registered(&self, module: &str) -> bool {
        self.registered.iter().any(|r| r.module == module)
    }

    fn skip(&mut self, archive: &Path, entry: &str, reason: SkipReason) {
        self.skipped.push(SkippedEntry {
            archive: archive.to_path_buf(),
            entry: entry.to_string(),
            reason,
        });
    }
}

/// One module entry of an archive, as seen by [`ExtensionRegistrar::inspect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryInspection {
    pub entry: String,
    pub module: String,
    pub resolved: bool,
    pub has_commands: bool,
    /// Aliases of each command method, primary alias first.
    pub commands: Vec<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Registers the command-bearing modules of a plugin directory tree.
#[derive(Clone)]
pub struct ExtensionRegistrar {
    loader: ModuleLoader,
    detector: CommandDetector,
    archive_suffix: String,
}

impl ExtensionRegistrar {
    pub fn new(
        loader: ModuleLoader,
        detector: CommandDetector,
        archive_suffix: impl Into<String>,
    ) -> Self {
        Self {
            loader,
            detector,
            archive_suffix: archive_suffix.into(),
        }
    }

    /// Registrar with the runtime selected by `config`.
    pub fn from_config(config: &RegistrarConfig, code_path: Arc<CodePath>) -> Self {
        let loader = ModuleLoader::new(create_runtime(config), code_path);
        Self::new(loader, CommandDetector::default(), &config.archive_suffix)
    }

    pub fn loader(&self) -> &ModuleLoader {
        &self.loader
    }

    pub fn archive_suffix(&self) -> &str {
        &self.archive_suffix
    }

    /// Register every command-bearing module under `root` into `node`.
    ///
    /// Failures are logged; `node` is returned in whatever state it reached.
    pub fn register_all(&self, root: &Path, node: DispatcherNode) -> DispatcherNode {
        self.scan(root, &node);
        node
    }

    /// [`register_all`](Self::register_all), returning what the walk did.
    pub fn scan(&self, root: &Path, node: &DispatcherNode) -> RegistrationReport {
        let mut report = RegistrationReport::new(root);
        if !root.exists() {
            warn!(dir = %root.display(), "Plugin directory does not (yet) exist");
            return report;
        }
        report.root_exists = true;

        info!(dir = %root.display(), "Searching directory for commands");
        let mut visited = HashSet::new();
        if let Err(e) = self.walk_dir(root, node, &mut report, &mut visited) {
            error!(dir = %root.display(), error = %e, "Extension registration stopped");
            report.aborted = Some(e.to_string());
        }
        info!(
            dir = %root.display(),
            registered = report.registered.len(),
            skipped = report.skipped.len(),
            "Extension registration finished"
        );
        report
    }

    /// Like [`register_all`](Self::register_all), but also survives panics.
    pub fn register_from_plugin_directory(
        &self,
        dir: &Path,
        node: DispatcherNode,
    ) -> DispatcherNode {
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| self.scan(dir, &node))) {
            error!(
                dir = %dir.display(),
                panic = %panic_message(panic.as_ref()),
                "Extension registration panicked"
            );
        }
        node
    }

    fn walk_dir(
        &self,
        dir: &Path,
        node: &DispatcherNode,
        report: &mut RegistrationReport,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<(), ExtensionError> {
        if !filter::is_directory(dir) {
            return Err(ExtensionError::NotADirectory(dir.to_path_buf()));
        }
        // Links to directories are followed, each real directory once.
        let real = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        if !visited.insert(real) {
            debug!(dir = %dir.display(), "directory already walked");
            return Ok(());
        }
        report.directories_visited += 1;

        let (archives, subdirs) = self.list_dir(dir)?;
        info!(dir = %dir.display(), count = archives.len(), "Found archives");
        report.archives_found += archives.len();

        for archive in &archives {
            match self.loader.code_path().append(archive) {
                Ok(true) => report.archives_merged += 1,
                Ok(false) => {}
                Err(e) => {
                    error!(
                        archive = %archive.display(),
                        error = %e,
                        cause = ?std::error::Error::source(&e),
                        "Could not extend code path"
                    )
                }
            }
        }

        for archive in &archives {
            self.register_archive(archive, node, report)?;
        }

        for subdir in &subdirs {
            if let Err(e) = self.walk_dir(subdir, node, report, visited) {
                if is_fatal(&e) {
                    return Err(e);
                }
                error!(dir = %subdir.display(), error = %e, "Skipping directory");
            }
        }
        Ok(())
    }

    /// Archives and subdirectories directly inside `dir`, sorted by path.
    fn list_dir(&self, dir: &Path) -> Result<(Vec<PathBuf>, Vec<PathBuf>), ExtensionError> {
        let mut archives = Vec::new();
        let mut subdirs = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(e) => {
                    error!(dir = %dir.display(), error = %e, "Could not read directory entry");
                    continue;
                }
            };
            if filter::is_directory(&path) {
                subdirs.push(path);
            } else if filter::is_extension_archive(&path, &self.archive_suffix) {
                archives.push(path);
            }
        }
        archives.sort();
        subdirs.sort();
        Ok((archives, subdirs))
    }

    fn register_archive(
        &self,
        archive: &Path,
        node: &DispatcherNode,
        report: &mut RegistrationReport,
    ) -> Result<(), ExtensionError> {
        info!(archive = %archive.display(), "Searching archive for commands");
        let entries = match self.archive_entries(archive) {
            Ok(entries) => entries,
            Err(e) => {
                error!(archive = %archive.display(), error = %e, "Could not read archive");
                report.skip(archive, "", SkipReason::ArchiveUnreadable);
                return Ok(());
            }
        };

        let suffix = self.loader.runtime().module_suffix().to_string();
        for entry in entries {
            if filter::is_nested_entry(&entry) {
                trace!(entry = %entry, "skipping nested declaration");
                continue;
            }
            let Some(name) = filter::qualified_name(&entry, &suffix) else {
                continue;
            };
            debug!(entry = %entry, "Found module entry");

            let module = match self.loader.resolve(&name) {
                Ok(Some(module)) => module,
                Ok(None) => {
                    debug!(entry = %entry, "Could not load");
                    report.skip(archive, &entry, SkipReason::BlocklistedOrMissing);
                    continue;
                }
                Err(_) => {
                    report.skip(archive, &entry, SkipReason::LoadFailed);
                    continue;
                }
            };

            if !self.detector.has_commands(module.as_ref(), 0) {
                debug!(entry = %entry, "is not tagged as a command");
                report.skip(archive, &entry, SkipReason::NoCommands);
                continue;
            }

            match register_module(&module, archive, node) {
                Ok(registered) => report.registered.push(registered),
                Err(e @ CommandError::AliasConflict { .. }) => {
                    warn!(
                        entry = %entry,
                        error = %e,
                        "not registered because it has at least one alias that has been previously registered"
                    );
                    report.skip(archive, &entry, SkipReason::AliasConflict);
                }
                Err(e @ CommandError::NoAliases) => {
                    warn!(
                        entry = %entry,
                        error = %e,
                        "not registered because a command has no alias"
                    );
                    report.skip(archive, &entry, SkipReason::MissingAlias);
                }
                Err(CommandError::Introspection(reason)) => {
                    error!(entry = %entry, reason = %reason, "Could not read command methods");
                    report.skip(archive, &entry, SkipReason::LoadFailed);
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn archive_entries(&self, archive: &Path) -> Result<Vec<String>, ExtensionError> {
        if let Some(entries) = self.loader.code_path().entries(archive) {
            return Ok(entries);
        }
        let zip = ZipArchive::new(File::open(archive)?)?;
        let mut entries: Vec<String> = zip.file_names().map(str::to_string).collect();
        entries.sort();
        Ok(entries)
    }

    /// Merge `archive` and report on each of its top-level module entries.
    pub fn inspect(&self, archive: &Path) -> Result<Vec<EntryInspection>, ExtensionError> {
        if let Err(e) = self.loader.code_path().append(archive) {
            warn!(archive = %archive.display(), error = %e, "Could not extend code path");
        }
        let suffix = self.loader.runtime().module_suffix().to_string();

        let mut inspected = Vec::new();
        for entry in self.archive_entries(archive)? {
            if filter::is_nested_entry(&entry) {
                continue;
            }
            let Some(name) = filter::qualified_name(&entry, &suffix) else {
                continue;
            };
            let mut row = EntryInspection {
                entry,
                module: name,
                resolved: false,
                has_commands: false,
                commands: Vec::new(),
                error: None,
            };
            match self.loader.resolve(&row.module) {
                Ok(Some(module)) => {
                    row.resolved = true;
                    row.has_commands = self.detector.has_commands(module.as_ref(), 0);
                    match module.methods() {
                        Ok(methods) => {
                            row.commands = methods
                                .into_iter()
                                .filter_map(|m| m.command.map(|tag| tag.aliases))
                                .collect();
                        }
                        Err(e) => row.error = Some(e.to_string()),
                    }
                }
                Ok(None) => {}
                Err(e) => row.error = Some(e.to_string()),
            }
            inspected.push(row);
        }
        Ok(inspected)
    }
}

fn register_module(
    module: &DynModule,
    archive: &Path,
    node: &DispatcherNode,
) -> Result<RegisteredModule, CommandError> {
    let simple = module.simple_name();
    info!(module = module.name(), group = simple, "Registering module as command group");

    let group = node
        .group(&[simple])?
        .describe_as(format!("commands loaded from {}", archive.display()))
        .register_methods(module.as_host())?;

    let commands = group
        .dispatcher()
        .read()
        .commands()
        .iter()
        .map(|c| c.primary_alias().to_string())
        .collect();
    Ok(RegisteredModule {
        module: module.name().to_string(),
        group: simple.to_string(),
        archive: archive.to_path_buf(),
        commands,
    })
}

fn is_fatal(e: &ExtensionError) -> bool {
    matches!(e, ExtensionError::Command(CommandError::Configuration(_)))
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
