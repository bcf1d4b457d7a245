//! Configuration defaults and loading.
//!
//! Constants live in small modules so every crate reads the same values;
//! [`RegistrarConfig`] is what a host hands to the extension registrar.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default values.
pub mod defaults {
    /// Suffix of extension archives.
    pub const ARCHIVE_SUFFIX: &str = ".jar";
    /// Directory under the user's home holding cmdgraph state.
    pub const HOME_DIR_NAME: &str = ".cmdgraph";
    pub const PLUGIN_DIR_NAME: &str = "plugins";
    pub const CACHE_DIR_NAME: &str = "module-cache";
    /// Log filter used when `RUST_LOG` is unset.
    pub const LOG_FILTER: &str = "cmdgraph=info";
}

/// Environment variable names.
pub mod env_vars {
    pub const PLUGIN_DIR: &str = "CMDGRAPH_PLUGIN_DIR";
    pub const ARCHIVE_SUFFIX: &str = "CMDGRAPH_ARCHIVE_SUFFIX";
    pub const RUNTIME: &str = "CMDGRAPH_RUNTIME";
    pub const CACHE_DIR: &str = "CMDGRAPH_CACHE_DIR";
    pub const LOG_JSON: &str = "CMDGRAPH_LOG_JSON";
}

/// Which [`ModuleRuntime`](crate::extension::ModuleRuntime) defines modules.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeKind {
    /// JSON module manifests (`.cmd.json` entries).
    #[default]
    Manifest,
    /// Dynamic libraries (`.so` / `.dylib` / `.dll` entries).
    Native,
}

impl std::str::FromStr for RuntimeKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "manifest" => Ok(Self::Manifest),
            "native" => Ok(Self::Native),
            other => Err(Error::config(format!("unknown runtime: {other}"))),
        }
    }
}

/// Settings of the extension registrar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrarConfig {
    /// Directory walked for extension archives.
    pub plugin_dir: PathBuf,
    /// File-name suffix identifying an extension archive.
    pub archive_suffix: String,
    pub runtime: RuntimeKind,
    /// Where the native runtime materializes library bytes.
    pub cache_dir: PathBuf,
}

impl Default for RegistrarConfig {
    fn default() -> Self {
        let home = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(defaults::HOME_DIR_NAME);
        Self {
            plugin_dir: home.join(defaults::PLUGIN_DIR_NAME),
            archive_suffix: defaults::ARCHIVE_SUFFIX.to_string(),
            runtime: RuntimeKind::default(),
            cache_dir: home.join(defaults::CACHE_DIR_NAME),
        }
    }
}

impl RegistrarConfig {
    /// Defaults overridden by environment variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    /// Read a TOML file, then apply environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("cannot read {}: {}", path.display(), e)))?;
        let mut config = Self::from_toml_str(&content)?;
        config.apply_env()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_plugin_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.plugin_dir = dir.into();
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeKind) -> Self {
        self.runtime = runtime;
        self
    }

    pub fn with_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = dir.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        let suffix = &self.archive_suffix;
        if suffix.len() < 2 || !suffix.starts_with('.') {
            return Err(Error::config(format!(
                "archive_suffix must look like \".ext\", got {suffix:?}"
            )));
        }
        Ok(())
    }

    fn apply_env(&mut self) -> Result<()> {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(dir) = var(env_vars::PLUGIN_DIR) {
            self.plugin_dir = PathBuf::from(dir);
        }
        if let Some(suffix) = var(env_vars::ARCHIVE_SUFFIX) {
            self.archive_suffix = suffix;
        }
        if let Some(runtime) = var(env_vars::RUNTIME) {
            self.runtime = runtime.parse()?;
        }
        if let Some(dir) = var(env_vars::CACHE_DIR) {
            self.cache_dir = PathBuf::from(dir);
        }
        self.validate()
    }
}

/// Whether JSON logging was requested through [`env_vars::LOG_JSON`].
pub fn json_logging() -> bool {
    std::env::var(env_vars::LOG_JSON)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(false)
}
