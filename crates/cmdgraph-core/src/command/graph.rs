//! Fluent construction of the command tree.
//!
//! ```rust
//! use std::sync::Arc;
//! use cmdgraph_core::command::{CommandGraph, TaggedMethodBuilder};
//!
//! let graph = Arc::new(CommandGraph::new().with_builder(TaggedMethodBuilder::new()));
//! let root = graph.commands();
//! let tools = root.group(&["tools", "t"]).unwrap().describe_as("Tool commands");
//! assert!(tools.parent().is_ok());
//! assert!(root.parent().is_err());
//! ```

use std::any::Any;
use std::path::Path;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use super::builder::MethodBuilder;
use super::callable::{CommandCallable, CommandHost, Description};
use super::dispatcher::{Dispatcher, SharedDispatcher, SimpleDispatcher};
use crate::error::CommandError;

/// State of one tree node. Owned by its parent's group callable, or by the
/// graph for the root.
#[derive(Debug)]
struct NodeState {
    dispatcher: SharedDispatcher,
    parent: Option<Weak<NodeState>>,
}

impl NodeState {
    fn new(parent: Option<Weak<NodeState>>) -> Arc<Self> {
        Arc::new(Self {
            dispatcher: SimpleDispatcher::new().shared(),
            parent,
        })
    }
}

/// Root of a command tree and holder of process-wide tree configuration.
pub struct CommandGraph {
    root: Arc<NodeState>,
    builder: RwLock<Option<Arc<dyn MethodBuilder>>>,
}

impl CommandGraph {
    /// Create a graph with an empty root and no registration builder.
    pub fn new() -> Self {
        Self {
            root: NodeState::new(None),
            builder: RwLock::new(None),
        }
    }

    pub fn with_builder(self, builder: impl MethodBuilder + 'static) -> Self {
        *self.builder.write() = Some(Arc::new(builder));
        self
    }

    pub fn set_builder(&self, builder: Arc<dyn MethodBuilder>) {
        *self.builder.write() = Some(builder);
    }

    pub fn builder(&self) -> Option<Arc<dyn MethodBuilder>> {
        self.builder.read().clone()
    }

    /// Handle to the root node.
    pub fn commands(self: &Arc<Self>) -> DispatcherNode {
        DispatcherNode {
            graph: self.clone(),
            state: self.root.clone(),
        }
    }

    /// Dispatcher of the root node.
    pub fn dispatcher(&self) -> SharedDispatcher {
        self.root.dispatcher.clone()
    }
}

impl Default for CommandGraph {
    fn default() -> Self {
        Self::new()
    }
}

/// Callable registered in a parent dispatcher for each group.
#[derive(Debug)]
pub struct GroupCommand {
    state: Arc<NodeState>,
}

impl CommandCallable for GroupCommand {
    fn description(&self) -> Description {
        self.state.dispatcher.read().description().clone()
    }

    fn as_dispatcher(&self) -> Option<SharedDispatcher> {
        Some(self.state.dispatcher.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A handle to one node of the command tree.
///
/// Handles are cheap to clone; all clones refer to the same node.
#[derive(Clone)]
pub struct DispatcherNode {
    graph: Arc<CommandGraph>,
    state: Arc<NodeState>,
}

impl DispatcherNode {
    /// Set the description of this node.
    pub fn describe_as(self, description: impl Into<String>) -> Self {
        self.state
            .dispatcher
            .write()
            .description_mut()
            .set_description(description);
        self
    }

    /// Register a command with this node's dispatcher.
    ///
    /// The first alias is the primary one.
    pub fn register<S: AsRef<str>>(
        &self,
        callable: Arc<dyn CommandCallable>,
        aliases: &[S],
    ) -> Result<(), CommandError> {
        let aliases: Vec<&str> = aliases.iter().map(AsRef::as_ref).collect();
        self.state
            .dispatcher
            .write()
            .register_command(callable, &aliases)
    }

    /// Register the tagged methods of `host` using the graph's builder.
    pub fn register_methods(self, host: &dyn CommandHost) -> Result<Self, CommandError> {
        let builder = self
            .graph
            .builder()
            .ok_or_else(|| CommandError::Configuration("No method builder set".into()))?;
        builder.register_methods_as_commands(&mut self.state.dispatcher.write(), host)?;
        Ok(self)
    }

    /// Create a sub-command group and return a handle to it.
    pub fn group<S: AsRef<str>>(&self, aliases: &[S]) -> Result<DispatcherNode, CommandError> {
        let child = NodeState::new(Some(Arc::downgrade(&self.state)));
        self.register(
            Arc::new(GroupCommand {
                state: child.clone(),
            }),
            aliases,
        )?;
        Ok(DispatcherNode {
            graph: self.graph.clone(),
            state: child,
        })
    }

    /// Return the parent node.
    pub fn parent(&self) -> Result<DispatcherNode, CommandError> {
        let parent = self
            .state
            .parent
            .as_ref()
            .and_then(Weak::upgrade)
            .ok_or(CommandError::NoParent)?;
        Ok(DispatcherNode {
            graph: self.graph.clone(),
            state: parent,
        })
    }

    /// Navigate to the group registered under `alias`.
    pub fn child(&self, alias: &str) -> Option<DispatcherNode> {
        let dispatcher = self.state.dispatcher.read();
        let group = dispatcher
            .get(alias)?
            .callable()
            .as_any()
            .downcast_ref::<GroupCommand>()?;
        Some(DispatcherNode {
            graph: self.graph.clone(),
            state: group.state.clone(),
        })
    }

    pub fn is_root(&self) -> bool {
        self.state.parent.is_none()
    }

    /// Get the root command graph.
    pub fn graph(&self) -> &Arc<CommandGraph> {
        &self.graph
    }

    /// Get the underlying dispatcher of this node.
    pub fn dispatcher(&self) -> SharedDispatcher {
        self.state.dispatcher.clone()
    }

    pub fn description(&self) -> Description {
        self.state.dispatcher.read().description().clone()
    }

    /// Register the commands of every extension archive under `dir`.
    ///
    /// Failures are logged, never returned.
    pub fn register_extensions(self, dir: &Path) -> Self {
        crate::extension::register_from_plugin_directory(dir, self)
    }
}

impl std::fmt::Debug for DispatcherNode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let dispatcher = self.state.dispatcher.read();
        f.debug_struct("DispatcherNode")
            .field("commands", &dispatcher.primary_aliases())
            .field("description", dispatcher.description())
            .field("root", &self.is_root())
            .finish()
    }
}
