//! Deciding whether a module exposes any commands.

use std::sync::Arc;

use tracing::error;

use super::module::Module;
use crate::command::MethodInfo;

/// Deepest nesting level inspected; level 0 is the top-level module.
pub const MAX_DEPTH: usize = 5;

/// Capability query answered per method.
pub trait CommandMetadata: Send + Sync {
    fn supports_command(&self, method: &MethodInfo) -> bool;
}

/// A method supports a command iff it carries a command tag.
#[derive(Debug, Default, Clone, Copy)]
pub struct CommandTagMetadata;

impl CommandMetadata for CommandTagMetadata {
    fn supports_command(&self, method: &MethodInfo) -> bool {
        method.command.is_some()
    }
}

/// Depth-bounded search for command-tagged methods.
#[derive(Clone)]
pub struct CommandDetector {
    metadata: Arc<dyn CommandMetadata>,
}

impl Default for CommandDetector {
    fn default() -> Self {
        Self::new(Arc::new(CommandTagMetadata))
    }
}

impl CommandDetector {
    pub fn new(metadata: Arc<dyn CommandMetadata>) -> Self {
        Self { metadata }
    }

    /// Whether `module`, or a declaration nested at most [`MAX_DEPTH`] levels
    /// below level `depth`, has a command method.
    pub fn has_commands(&self, module: &dyn Module, depth: usize) -> bool {
        if depth > MAX_DEPTH {
            return false;
        }

        match module.methods() {
            Ok(methods) => {
                if methods.iter().any(|m| self.metadata.supports_command(m)) {
                    return true;
                }
            }
            Err(e) => error!(module = module.name(), error = %e, "Could not read methods"),
        }

        if depth < MAX_DEPTH {
            match module.nested() {
                Ok(nested) => {
                    return nested
                        .iter()
                        .any(|inner| self.has_commands(inner.as_ref(), depth + 1));
                }
                Err(e) => {
                    error!(module = module.name(), error = %e, "Could not read nested declarations")
                }
            }
        }
        false
    }
}
