//! Turning a host object's tagged methods into registered callables.

use std::sync::Arc;

use tracing::trace;

use super::callable::{CommandCallable, CommandHost, MethodCommand};
use super::dispatcher::{Dispatcher, SimpleDispatcher};
use crate::error::CommandError;

/// Registration builder held by the [`CommandGraph`](super::CommandGraph).
pub trait MethodBuilder: Send + Sync {
    /// Register every tagged method of `host` as a command of `dispatcher`.
    fn register_methods_as_commands(
        &self,
        dispatcher: &mut SimpleDispatcher,
        host: &dyn CommandHost,
    ) -> Result<(), CommandError>;
}

/// Builder that maps each command tag to a [`MethodCommand`].
///
/// Either every tagged method is registered or none is: all aliases, including
/// clashes between two methods of the same host, are checked before the first
/// insert.
#[derive(Debug, Default, Clone)]
pub struct TaggedMethodBuilder;

impl TaggedMethodBuilder {
    pub fn new() -> Self {
        Self
    }
}

impl MethodBuilder for TaggedMethodBuilder {
    fn register_methods_as_commands(
        &self,
        dispatcher: &mut SimpleDispatcher,
        host: &dyn CommandHost,
    ) -> Result<(), CommandError> {
        let mut pending: Vec<(Arc<dyn CommandCallable>, Vec<String>)> = Vec::new();

        for method in host.methods()? {
            let Some(tag) = method.command else {
                continue;
            };
            let aliases: Vec<&str> = tag.aliases.iter().map(String::as_str).collect();
            dispatcher.check_aliases(&aliases)?;
            for alias in &aliases {
                let taken = pending
                    .iter()
                    .flat_map(|(_, a)| a.iter())
                    .any(|a| a.eq_ignore_ascii_case(alias.trim()));
                if taken {
                    return Err(CommandError::AliasConflict {
                        alias: alias.to_string(),
                    });
                }
            }

            let owned = tag.aliases.clone();
            let callable = MethodCommand {
                host: host.host_name().to_string(),
                method: method.name,
                tag,
            };
            pending.push((Arc::new(callable), owned));
        }

        for (callable, aliases) in pending {
            let aliases: Vec<&str> = aliases.iter().map(String::as_str).collect();
            trace!(host = host.host_name(), alias = aliases[0], "registering method command");
            dispatcher.register_command(callable, &aliases)?;
        }
        Ok(())
    }
}
