//! Callables and the method metadata they are built from.

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::dispatcher::SharedDispatcher;
use crate::error::CommandError;

/// Human-readable description attached to a command or group.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Description {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub usage: Option<String>,
    #[serde(default)]
    pub help: Option<String>,
}

impl Description {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..Default::default()
        }
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = Some(description.into());
    }
}

/// The command tag carried by a method.
///
/// A method is a command iff it carries one of these.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandTag {
    /// Aliases, the first one being the primary alias.
    pub aliases: Vec<String>,
    #[serde(default)]
    pub desc: String,
    #[serde(default)]
    pub usage: String,
    #[serde(default)]
    pub help: String,
}

/// Public method of a host object as seen through its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodInfo {
    pub name: String,
    #[serde(default)]
    pub command: Option<CommandTag>,
}

impl MethodInfo {
    /// Untagged method.
    pub fn plain(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            command: None,
        }
    }

    /// Method tagged as a command under `aliases`.
    pub fn command<S: AsRef<str>>(name: impl Into<String>, aliases: &[S]) -> Self {
        Self {
            name: name.into(),
            command: Some(CommandTag {
                aliases: aliases.iter().map(|a| a.as_ref().to_string()).collect(),
                ..Default::default()
            }),
        }
    }
}

/// An object whose tagged methods can be turned into commands.
pub trait CommandHost: Send + Sync {
    /// Name used in diagnostics and as the owner of built callables.
    fn host_name(&self) -> &str;

    /// All public methods of the object.
    fn methods(&self) -> Result<Vec<MethodInfo>, CommandError>;
}

/// Something registered under an alias in a dispatcher.
///
/// The core never invokes callables; the host's execution harness downcasts
/// them through [`CommandCallable::as_any`].
pub trait CommandCallable: Send + Sync + fmt::Debug {
    fn description(&self) -> Description;

    /// Sub-commands, when this callable is a group.
    fn as_dispatcher(&self) -> Option<SharedDispatcher> {
        None
    }

    fn as_any(&self) -> &dyn Any;
}

/// Callable produced for one tagged method of a host object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodCommand {
    pub host: String,
    pub method: String,
    pub tag: CommandTag,
}

impl CommandCallable for MethodCommand {
    fn description(&self) -> Description {
        let non_empty = |s: &str| (!s.is_empty()).then(|| s.to_string());
        Description {
            description: non_empty(&self.tag.desc),
            usage: non_empty(&self.tag.usage),
            help: non_empty(&self.tag.help),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
