//! Extension loading engine.
//!
//! Extensions are archives dropped into a plugin directory. Each archive holds
//! module entries; modules that expose command-tagged methods become command
//! groups of a [`DispatcherNode`].
//!
//! ```text
//! ExtensionRegistrar ── walks plugin dir
//!        │
//!        ├── CodePath         merge each archive once
//!        ├── ModuleLoader     blocklist → module table → define from bytes
//!        │       └── ModuleRuntime (ManifestRuntime | NativeRuntime)
//!        └── CommandDetector  tagged methods, nested up to MAX_DEPTH
//! ```
//!
//! # Native modules
//!
//! Native module libraries must export:
//! - `cmdgraph_module_abi_version()` -> u32 (should return 1)
//! - `cmdgraph_module_manifest()` -> *const c_char
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::path::Path;
//! use std::sync::Arc;
//! use cmdgraph_core::command::{CommandGraph, TaggedMethodBuilder};
//!
//! let graph = Arc::new(CommandGraph::new().with_builder(TaggedMethodBuilder::new()));
//! let root = graph.commands().register_extensions(Path::new("plugins"));
//! println!("{root:?}");
//! ```

pub mod code_path;
pub mod detector;
pub mod filter;
pub mod loader;
pub mod module;
pub mod native;
pub mod registrar;
pub mod runtime;

use std::path::Path;

use once_cell::sync::Lazy;
use tracing::warn;

use crate::command::DispatcherNode;
use crate::config::RegistrarConfig;

pub use code_path::{CodePath, MAX_ENTRY_SIZE};
pub use detector::{CommandDetector, CommandMetadata, CommandTagMetadata, MAX_DEPTH};
pub use filter::{BLOCKED_MODULES, NESTED_SEPARATOR};
pub use loader::ModuleLoader;
pub use module::{DeclaredModule, DynModule, Module, ModuleManifest, NestedManifest};
pub use native::{MODULE_ABI_VERSION, NativeRuntime};
pub use registrar::{
    EntryInspection, ExtensionRegistrar, RegisteredModule, RegistrationReport, SkipReason,
    SkippedEntry,
};
pub use runtime::{MANIFEST_SUFFIX, ManifestRuntime, ModuleRuntime, create_runtime};

static DEFAULT_REGISTRAR: Lazy<ExtensionRegistrar> = Lazy::new(|| {
    let config = RegistrarConfig::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "Ignoring invalid registrar environment");
        RegistrarConfig::default()
    });
    ExtensionRegistrar::from_config(&config, CodePath::global())
});

/// Register the extensions under `dir` with the process-wide registrar.
///
/// Failures, panics included, are logged; `node` is returned in whatever
/// state it reached.
pub fn register_from_plugin_directory(dir: &Path, node: DispatcherNode) -> DispatcherNode {
    DEFAULT_REGISTRAR.register_from_plugin_directory(dir, node)
}
