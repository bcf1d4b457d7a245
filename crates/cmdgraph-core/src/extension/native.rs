//! Runtime for modules shipped as native dynamic libraries.
//!
//! A module library must export:
//! - `cmdgraph_module_abi_version()` -> u32 (must return [`MODULE_ABI_VERSION`])
//! - `cmdgraph_module_manifest()` -> *const c_char (NUL-terminated JSON manifest)

use std::ffi::{CStr, c_char};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{debug, info};

use super::code_path::CodePath;
use super::module::{DeclaredModule, DynModule, ModuleManifest};
use super::runtime::{ModuleRuntime, ModuleTable};
use crate::error::ExtensionError;

/// ABI version the host expects from module libraries.
pub const MODULE_ABI_VERSION: u32 = 1;

const ABI_VERSION_SYMBOL: &[u8] = b"cmdgraph_module_abi_version\0";
const MANIFEST_SYMBOL: &[u8] = b"cmdgraph_module_manifest\0";

type AbiVersionFn = unsafe extern "C" fn() -> u32;
type ManifestFn = unsafe extern "C" fn() -> *const c_char;

/// Loads module libraries out of archive entries.
///
/// Entry bytes are written to `cache_dir` under a content-addressed file name
/// before the library is opened. Libraries stay loaded as long as their module.
pub struct NativeRuntime {
    cache_dir: PathBuf,
    host_version: semver::Version,
    table: ModuleTable,
}

impl NativeRuntime {
    pub fn new(cache_dir: impl Into<PathBuf>, host_version: semver::Version) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            host_version,
            table: ModuleTable::default(),
        }
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Path the bytes of `name` are materialized at.
    pub fn cached_path(&self, name: &str, bytes: &[u8]) -> PathBuf {
        let digest = hex::encode(Sha256::digest(bytes));
        self.cache_dir.join(format!(
            "{}-{}{}",
            name,
            &digest[..16],
            std::env::consts::DLL_SUFFIX
        ))
    }

    fn materialize(&self, name: &str, bytes: &[u8]) -> Result<PathBuf, ExtensionError> {
        let path = self.cached_path(name, bytes);
        if path.is_file() {
            return Ok(path);
        }
        std::fs::create_dir_all(&self.cache_dir)
            .and_then(|_| std::fs::write(&path, bytes))
            .map_err(|e| ExtensionError::module_load(name, e))?;
        debug!(module = name, path = %path.display(), "cached module library");
        Ok(path)
    }

    fn open(
        &self,
        name: &str,
        path: &Path,
    ) -> Result<(Arc<libloading::Library>, ModuleManifest), ExtensionError> {
        // SAFETY: loading a library runs its initializers; extension archives
        // are trusted to the same degree as the plugin directory.
        let library = unsafe { libloading::Library::new(path) }
            .map_err(|e| ExtensionError::linkage(name, format!("cannot open library: {e}")))?;

        let abi = unsafe {
            let symbol = library
                .get::<AbiVersionFn>(ABI_VERSION_SYMBOL)
                .map_err(|e| ExtensionError::linkage(name, format!("missing ABI version: {e}")))?;
            symbol()
        };
        check_abi(name, abi)?;

        let manifest = unsafe {
            let symbol = library
                .get::<ManifestFn>(MANIFEST_SYMBOL)
                .map_err(|e| ExtensionError::linkage(name, format!("missing manifest: {e}")))?;
            let ptr = symbol();
            if ptr.is_null() {
                return Err(ExtensionError::linkage(name, "manifest pointer is null"));
            }
            ModuleManifest::from_slice(name, CStr::from_ptr(ptr).to_bytes())?
        };

        Ok((Arc::new(library), manifest))
    }
}

fn check_abi(name: &str, abi: u32) -> Result<(), ExtensionError> {
    if abi != MODULE_ABI_VERSION {
        return Err(ExtensionError::linkage(
            name,
            format!("ABI version {abi}, expected {MODULE_ABI_VERSION}"),
        ));
    }
    Ok(())
}

impl ModuleRuntime for NativeRuntime {
    fn module_suffix(&self) -> &str {
        std::env::consts::DLL_SUFFIX
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
        let path = self.materialize(name, bytes)?;
        let (library, manifest) = self.open(name, &path)?;
        self.table.check_linkage(
            name,
            &manifest,
            &self.host_version,
            self.module_suffix(),
            code_path,
        )?;

        info!(module = name, library = %path.display(), "Loaded native module");
        let module =
            DeclaredModule::with_library(name, manifest, Some(origin.to_path_buf()), library);
        Ok(self.table.insert(Arc::new(module)))
    }

    fn install(&self, module: DynModule) {
        self.table.insert(module);
    }

    fn defined_count(&self) -> usize {
        self.table.len()
    }
}
