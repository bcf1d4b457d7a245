//! Resolving qualified module names to loaded modules.

use std::sync::Arc;

use tracing::{debug, error, trace};

use super::code_path::CodePath;
use super::filter;
use super::module::DynModule;
use super::runtime::ModuleRuntime;
use crate::error::ExtensionError;

/// Two-tier resolver over a [`ModuleRuntime`] and a [`CodePath`].
///
/// Names on the blocklist and modules that cannot be linked resolve to
/// `Ok(None)`. Only unexpected failures are returned as errors.
#[derive(Clone)]
pub struct ModuleLoader {
    runtime: Arc<dyn ModuleRuntime>,
    code_path: Arc<CodePath>,
}

impl ModuleLoader {
    pub fn new(runtime: Arc<dyn ModuleRuntime>, code_path: Arc<CodePath>) -> Self {
        Self { runtime, code_path }
    }

    pub fn runtime(&self) -> &Arc<dyn ModuleRuntime> {
        &self.runtime
    }

    pub fn code_path(&self) -> &Arc<CodePath> {
        &self.code_path
    }

    /// Resolve `name`, falling back to defining it from the code path.
    pub fn resolve(&self, name: &str) -> Result<Option<DynModule>, ExtensionError> {
        if filter::is_blocked(name) {
            debug!(module = name, "module is blocklisted");
            return Ok(None);
        }

        match self.runtime.lookup(name) {
            Ok(module) => return Ok(Some(module)),
            Err(e) if e.is_benign_miss() => {
                trace!(module = name, reason = %e, "not in module table");
            }
            Err(e) => return Err(self.hard_failure(name, e)),
        }

        match self.define_from_code_path(name) {
            Ok(module) => Ok(module),
            Err(e) if e.is_benign_miss() => {
                debug!(module = name, reason = %e, "skipping module");
                Ok(None)
            }
            Err(e) => Err(self.hard_failure(name, e)),
        }
    }

    fn define_from_code_path(&self, name: &str) -> Result<Option<DynModule>, ExtensionError> {
        let entry = filter::entry_name(name, self.runtime.module_suffix());
        let Some((origin, bytes)) = self.code_path.locate(&entry)? else {
            return Ok(None);
        };

        let module = self.runtime.define(name, &bytes, &origin, &self.code_path)?;
        if module.name() != name {
            return Err(ExtensionError::module_load(
                name,
                format!("runtime defined {} instead", module.name()),
            ));
        }
        Ok(Some(module))
    }

    fn hard_failure(&self, name: &str, e: ExtensionError) -> ExtensionError {
        let e = match e {
            e @ ExtensionError::ModuleLoad { .. } => e,
            other => ExtensionError::module_load(name, other),
        };
        error!(
            module = name,
            error = %e,
            cause = ?std::error::Error::source(&e),
            "Module load failed"
        );
        e
    }
}
