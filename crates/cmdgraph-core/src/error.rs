//! Error types for cmdgraph.
//!
//! The dispatch tree reports [`CommandError`], the extension loading engine
//! reports [`ExtensionError`]. [`Error`] is the crate-level type that callers
//! outside the core can use to hold either.

use std::path::PathBuf;

/// Boxed error used as the wrapped cause of load failures.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building the command dispatch tree.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CommandError {
    /// An alias is already registered on the same dispatcher.
    #[error("Can't add the command '{alias}' because the dispatcher already has a command by that name")]
    AliasConflict { alias: String },

    /// A registration was attempted without any alias.
    #[error("At least one alias is required to register a command")]
    NoAliases,

    /// The command graph is missing required configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// `parent()` was called on the root node.
    #[error("This node does not have a parent")]
    NoParent,

    /// Method metadata of a host object could not be read.
    #[error("Introspection failed: {0}")]
    Introspection(String),
}

impl CommandError {
    /// True for failures caused by alias clashes or missing aliases.
    ///
    /// These are the per-module failures the registrar logs and skips.
    pub fn is_alias_error(&self) -> bool {
        matches!(self, Self::AliasConflict { .. } | Self::NoAliases)
    }
}

/// Errors raised by the extension loading engine.
#[derive(Debug, thiserror::Error)]
pub enum ExtensionError {
    /// An archive could not be merged into the code path.
    #[error("Error, could not add archive {} to the code path", location.display())]
    ClasspathExtension {
        location: PathBuf,
        #[source]
        source: BoxError,
    },

    /// Unexpected failure while resolving a module.
    #[error("Error, could not load module {name}")]
    ModuleLoad {
        name: String,
        #[source]
        source: BoxError,
    },

    /// Benign resolution miss.
    #[error("Module not found: {0}")]
    NotFound(String),

    /// The module exists but cannot be linked against this host.
    #[error("Module {name} cannot be linked: {reason}")]
    Linkage { name: String, reason: String },

    /// A path expected to be a directory is not one.
    #[error("File {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl ExtensionError {
    pub fn linkage(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Linkage {
            name: name.into(),
            reason: reason.into(),
        }
    }

    pub fn module_load(name: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::ModuleLoad {
            name: name.into(),
            source: source.into(),
        }
    }

    pub fn classpath(location: impl Into<PathBuf>, source: impl Into<BoxError>) -> Self {
        Self::ClasspathExtension {
            location: location.into(),
            source: source.into(),
        }
    }

    /// Linkage-class failures and plain misses are treated as "not found".
    pub fn is_benign_miss(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::Linkage { .. })
    }
}

/// Crate-level error type.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Dispatch tree errors.
    #[error("Command error: {0}")]
    Command(#[from] CommandError),

    /// Extension loading errors.
    #[error("Extension error: {0}")]
    Extension(String),

    /// I/O errors.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

impl From<ExtensionError> for Error {
    fn from(e: ExtensionError) -> Self {
        match e {
            ExtensionError::Command(e) => Error::Command(e),
            other => Error::Extension(other.to_string()),
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::Config(e.to_string())
    }
}

impl Error {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
