//! Host runtimes: the module table plus a tier that defines modules from bytes.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;

use super::code_path::CodePath;
use super::filter;
use super::module::{DeclaredModule, DynModule, ModuleManifest};
use super::native::NativeRuntime;
use crate::config::{RegistrarConfig, RuntimeKind};
use crate::error::ExtensionError;

/// Suffix of manifest module entries.
pub const MANIFEST_SUFFIX: &str = ".cmd.json";

/// Version modules are linked against.
pub fn host_version() -> semver::Version {
    semver::Version::parse(env!("CARGO_PKG_VERSION")).unwrap_or(semver::Version::new(0, 1, 0))
}

/// A host runtime that owns loaded modules.
pub trait ModuleRuntime: Send + Sync {
    /// Suffix of archive entries this runtime can define modules from.
    fn module_suffix(&self) -> &str;

    /// Standard resolution through the module table.
    ///
    /// Fails with [`ExtensionError::NotFound`] for unknown names.
    fn lookup(&self, name: &str) -> Result<DynModule, ExtensionError>;

    /// Define `name` from the bytes of its archive entry.
    ///
    /// Defining a name that is already in the table returns the existing module.
    fn define(
        &self,
        name: &str,
        bytes: &[u8],
        origin: &Path,
        code_path: &CodePath,
    ) -> Result<DynModule, ExtensionError>;

    /// Add a host built-in module to the table.
    fn install(&self, module: DynModule);

    /// Number of modules in the table.
    fn defined_count(&self) -> usize;
}

/// Build the runtime selected by `config`.
pub fn create_runtime(config: &RegistrarConfig) -> Arc<dyn ModuleRuntime> {
    match config.runtime {
        RuntimeKind::Manifest => Arc::new(ManifestRuntime::new(host_version())),
        RuntimeKind::Native => Arc::new(NativeRuntime::new(&config.cache_dir, host_version())),
    }
}

/// Name-keyed table of loaded modules shared by the runtimes.
#[derive(Default)]
pub(crate) struct ModuleTable {
    modules: RwLock<HashMap<String, DynModule>>,
}

impl ModuleTable {
    pub(crate) fn get(&self, name: &str) -> Option<DynModule> {
        self.modules.read().get(name).cloned()
    }

    pub(crate) fn lookup(&self, name: &str) -> Result<DynModule, ExtensionError> {
        self.get(name)
            .ok_or_else(|| ExtensionError::NotFound(name.to_string()))
    }

    /// Insert `module` unless its name is taken; returns whichever is in the table.
    pub(crate) fn insert(&self, module: DynModule) -> DynModule {
        self.modules
            .write()
            .entry(module.name().to_string())
            .or_insert(module)
            .clone()
    }

    pub(crate) fn len(&self) -> usize {
        self.modules.read().len()
    }

    /// Check that `manifest` can be linked as `name` in this table.
    pub(crate) fn check_linkage(
        &self,
        name: &str,
        manifest: &ModuleManifest,
        host: &semver::Version,
        suffix: &str,
        code_path: &CodePath,
    ) -> Result<(), ExtensionError> {
        if let Some(declared) = &manifest.name {
            if declared != name {
                return Err(ExtensionError::module_load(
                    name,
                    format!("entry defines module {declared}"),
                ));
            }
        }
        manifest.check_host_version(name, host)?;
        for dependency in &manifest.requires {
            let resolvable = self.get(dependency).is_some()
                || code_path.contains_entry(&filter::entry_name(dependency, suffix));
            if !resolvable {
                return Err(ExtensionError::linkage(
                    name,
                    format!("missing dependency {dependency}"),
                ));
            }
        }
        Ok(())
    }
}

/// Runtime whose module entries are JSON manifests.
pub struct ManifestRuntime {
    host_version: semver::Version,
    table: ModuleTable,
}

impl ManifestRuntime {
    pub fn new(host_version: semver::Version) -> Self {
        Self {
            host_version,
            table: ModuleTable::default(),
        }
    }
}

impl Default for ManifestRuntime {
    fn default() -> Self {
        Self::new(host_version())
    }
}

impl ModuleRuntime for ManifestRuntime {
    fn module_suffix(&self) -> &str {
        MANIFEST_SUFFIX
    }

    fn lookup(&self, name: &str) -> Result<DynModule, ExtensionError> {
        self.table.lookup(name)
    }

    fn define(
        &self,
        name: &str,
        bytes: &[u8],
        origin: &Path,
        code_path: &CodePath,
    ) -> Result<DynModule, ExtensionError> {
        if let Some(existing) = self.table.get(name) {
            return Ok(existing);
        }
        let manifest = ModuleManifest::from_slice(name, bytes)?;
        self.table
            .check_linkage(name, &manifest, &self.host_version, MANIFEST_SUFFIX, code_path)?;

        debug!(module = name, origin = %origin.display(), "defining module from manifest");
        let module = DeclaredModule::new(name, manifest, Some(origin.to_path_buf()));
        Ok(self.table.insert(Arc::new(module)))
    }

    fn install(&self, module: DynModule) {
        self.table.insert(module);
    }

    fn defined_count(&self) -> usize {
        self.table.len()
    }
}
