//! Loaded modules and the manifest that declares them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::filter::{self, NESTED_SEPARATOR};
use crate::command::{CommandHost, MethodInfo};
use crate::error::{CommandError, ExtensionError};

/// A module owned by a runtime's module table.
pub type DynModule = Arc<dyn Module>;

/// A named, loaded unit of code.
pub trait Module: CommandHost {
    /// Fully-qualified name, e.g. `com.example.Greet`.
    fn name(&self) -> &str;

    fn simple_name(&self) -> &str {
        filter::simple_name(self.name())
    }

    /// Nested declarations, one level deep.
    fn nested(&self) -> Result<Vec<DynModule>, ExtensionError>;

    /// Archive the module was defined from; `None` for host built-ins.
    fn source(&self) -> Option<&Path> {
        None
    }

    fn as_host(&self) -> &dyn CommandHost;
}

/// JSON description of a module.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleManifest {
    /// Overrides the name derived from the entry path. Must match it when set.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub methods: Vec<MethodInfo>,
    pub nested: Vec<NestedManifest>,
    /// Qualified names of modules this one links against.
    pub requires: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host_version: Option<semver::VersionReq>,
}

/// A nested declaration inside a [`ModuleManifest`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NestedManifest {
    pub name: String,
    #[serde(flatten)]
    pub manifest: ModuleManifest,
}

impl ModuleManifest {
    pub fn from_slice(name: &str, bytes: &[u8]) -> Result<Self, ExtensionError> {
        serde_json::from_slice(bytes)
            .map_err(|e| ExtensionError::linkage(name, format!("malformed manifest: {e}")))
    }

    /// Check the host version requirement of this manifest and all nested ones.
    pub fn check_host_version(
        &self,
        name: &str,
        host: &semver::Version,
    ) -> Result<(), ExtensionError> {
        if let Some(req) = &self.host_version {
            if !req.matches(host) {
                return Err(ExtensionError::linkage(
                    name,
                    format!("requires host {req}, running {host}"),
                ));
            }
        }
        for nested in &self.nested {
            nested
                .manifest
                .check_host_version(&nested_name(name, &nested.name), host)?;
        }
        Ok(())
    }
}

fn nested_name(outer: &str, inner: &str) -> String {
    format!("{outer}{NESTED_SEPARATOR}{inner}")
}

/// Module built from a [`ModuleManifest`].
///
/// Native modules hold their library open through `_library`.
pub struct DeclaredModule {
    name: String,
    methods: Vec<MethodInfo>,
    nested: Vec<DynModule>,
    source: Option<PathBuf>,
    _library: Option<Arc<libloading::Library>>,
}

impl DeclaredModule {
    pub fn new(name: impl Into<String>, manifest: ModuleManifest, source: Option<PathBuf>) -> Self {
        Self::build(name.into(), manifest, source, None)
    }

    pub(crate) fn with_library(
        name: impl Into<String>,
        manifest: ModuleManifest,
        source: Option<PathBuf>,
        library: Arc<libloading::Library>,
    ) -> Self {
        Self::build(name.into(), manifest, source, Some(library))
    }

    fn build(
        name: String,
        manifest: ModuleManifest,
        source: Option<PathBuf>,
        library: Option<Arc<libloading::Library>>,
    ) -> Self {
        let nested = manifest
            .nested
            .into_iter()
            .map(|n| {
                Arc::new(Self::build(
                    nested_name(&name, &n.name),
                    n.manifest,
                    source.clone(),
                    library.clone(),
                )) as DynModule
            })
            .collect();
        Self {
            name,
            methods: manifest.methods,
            nested,
            source,
            _library: library,
        }
    }

    /// Module with the given methods and no nested declarations.
    pub fn from_methods(name: impl Into<String>, methods: Vec<MethodInfo>) -> Self {
        Self::new(
            name,
            ModuleManifest {
                methods,
                ..Default::default()
            },
            None,
        )
    }
}

impl std::fmt::Debug for DeclaredModule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeclaredModule")
            .field("name", &self.name)
            .field("methods", &self.methods.len())
            .field("nested", &self.nested.len())
            .field("source", &self.source)
            .field("native", &self._library.is_some())
            .finish()
    }
}

impl CommandHost for DeclaredModule {
    fn host_name(&self) -> &str {
        &self.name
    }

    fn methods(&self) -> Result<Vec<MethodInfo>, CommandError> {
        Ok(self.methods.clone())
    }
}

impl Module for DeclaredModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn simple_name(&self) -> &str {
        let tail = self
            .name
            .rsplit(NESTED_SEPARATOR)
            .next()
            .unwrap_or(&self.name);
        filter::simple_name(tail)
    }

    fn nested(&self) -> Result<Vec<DynModule>, ExtensionError> {
        Ok(self.nested.clone())
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn as_host(&self) -> &dyn CommandHost {
        self
    }
}
