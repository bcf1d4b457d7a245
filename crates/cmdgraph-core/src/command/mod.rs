//! Hierarchical command dispatch tree.
//!
//! A [`CommandGraph`] owns the root of a tree of [`DispatcherNode`]s. Every node
//! owns a [`SimpleDispatcher`] mapping aliases to callables; groups are
//! callables whose dispatcher holds further commands.
//!
//! ```text
//! CommandGraph ── root: DispatcherNode
//!                   ├── "Greet"  (GroupCommand)
//!                   │      └── "hello" (MethodCommand)
//!                   └── "tools"  (GroupCommand)
//! ```

pub mod builder;
pub mod callable;
pub mod dispatcher;
pub mod graph;

pub use builder::{MethodBuilder, TaggedMethodBuilder};
pub use callable::{
    CommandCallable, CommandHost, CommandTag, Description, MethodCommand, MethodInfo,
};
pub use dispatcher::{CommandMapping, Dispatcher, SharedDispatcher, SimpleDispatcher};
pub use graph::{CommandGraph, DispatcherNode, GroupCommand};
