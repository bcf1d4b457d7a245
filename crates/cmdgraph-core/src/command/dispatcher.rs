//! Alias → callable registries.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use super::callable::{CommandCallable, Description};
use crate::error::CommandError;

/// Dispatcher shared between a node handle and the group callable that owns it.
pub type SharedDispatcher = Arc<RwLock<SimpleDispatcher>>;

/// One registered command and all of its aliases.
#[derive(Debug, Clone)]
pub struct CommandMapping {
    aliases: Vec<String>,
    callable: Arc<dyn CommandCallable>,
}

impl CommandMapping {
    /// The alias the command was first registered under.
    pub fn primary_alias(&self) -> &str {
        &self.aliases[0]
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn callable(&self) -> &Arc<dyn CommandCallable> {
        &self.callable
    }
}

/// Registry of callables keyed by alias.
pub trait Dispatcher: Send + Sync {
    /// Register `callable` under every alias in `aliases`.
    ///
    /// Fails without changing the dispatcher if any alias is already taken.
    fn register_command(
        &mut self,
        callable: Arc<dyn CommandCallable>,
        aliases: &[&str],
    ) -> Result<(), CommandError>;

    /// Look up a command by any of its aliases.
    fn get(&self, alias: &str) -> Option<&CommandMapping>;

    fn contains(&self, alias: &str) -> bool {
        self.get(alias).is_some()
    }

    /// Registered commands in registration order.
    fn commands(&self) -> &[CommandMapping];

    fn description(&self) -> &Description;

    fn description_mut(&mut self) -> &mut Description;
}

/// Default [`Dispatcher`]. Alias matching ignores ASCII case.
#[derive(Debug, Default)]
pub struct SimpleDispatcher {
    commands: Vec<CommandMapping>,
    index: HashMap<String, usize>,
    description: Description,
}

impl SimpleDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shared(self) -> SharedDispatcher {
        Arc::new(RwLock::new(self))
    }

    /// Primary aliases of all registered commands.
    pub fn primary_aliases(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.primary_alias()).collect()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    /// Checks `aliases` against this dispatcher without registering anything.
    pub fn check_aliases(&self, aliases: &[&str]) -> Result<(), CommandError> {
        if aliases.is_empty() {
            return Err(CommandError::NoAliases);
        }
        for alias in aliases {
            if alias.trim().is_empty() {
                return Err(CommandError::NoAliases);
            }
            if self.index.contains_key(&normalize(alias)) {
                return Err(CommandError::AliasConflict {
                    alias: alias.to_string(),
                });
            }
        }
        Ok(())
    }
}

fn normalize(alias: &str) -> String {
    alias.trim().to_ascii_lowercase()
}

impl Dispatcher for SimpleDispatcher {
    fn register_command(
        &mut self,
        callable: Arc<dyn CommandCallable>,
        aliases: &[&str],
    ) -> Result<(), CommandError> {
        self.check_aliases(aliases)?;

        let mut kept: Vec<String> = Vec::with_capacity(aliases.len());
        for alias in aliases {
            let alias = alias.trim();
            if !kept.iter().any(|k| k.eq_ignore_ascii_case(alias)) {
                kept.push(alias.to_string());
            }
        }

        let slot = self.commands.len();
        for alias in &kept {
            self.index.insert(normalize(alias), slot);
        }
        self.commands.push(CommandMapping {
            aliases: kept,
            callable,
        });
        Ok(())
    }

    fn get(&self, alias: &str) -> Option<&CommandMapping> {
        self.index
            .get(&normalize(alias))
            .and_then(|&slot| self.commands.get(slot))
    }

    fn commands(&self) -> &[CommandMapping] {
        &self.commands
    }

    fn description(&self) -> &Description {
        &self.description
    }

    fn description_mut(&mut self) -> &mut Description {
        &mut self.description
    }
}
