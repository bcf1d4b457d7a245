//! Core types for cmdgraph.
//!
//! This crate holds the hierarchical command dispatch tree and the engine that
//! discovers extension archives in a plugin directory and registers the
//! command-bearing modules they contain.

pub mod command;
pub mod config;
pub mod error;
pub mod extension;

pub use command::{
    CommandCallable, CommandGraph, CommandHost, CommandTag, Description, Dispatcher,
    DispatcherNode, MethodBuilder, MethodInfo, SimpleDispatcher, TaggedMethodBuilder,
};
pub use error::{CommandError, Error, ExtensionError, Result};

/// Re-exports commonly used types.
pub mod prelude {
    // Configuration
    pub use crate::config::{RegistrarConfig, RuntimeKind, defaults, env_vars};

    // Error handling
    pub use crate::error::{CommandError, Error, ExtensionError, Result};

    // Dispatch tree
    pub use crate::command::{
        CommandCallable, CommandGraph, CommandHost, Dispatcher, DispatcherNode, MethodInfo,
        TaggedMethodBuilder,
    };

    // Extensions
    pub use crate::extension::{
        CodePath, CommandDetector, DynModule, ExtensionRegistrar, Module, ModuleLoader,
        ModuleRuntime, RegistrationReport,
    };
}
