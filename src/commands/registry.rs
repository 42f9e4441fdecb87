//! Command descriptors and the catalog they are resolved through.
//!
//! Each command group contributes a fixed descriptor set at startup.
//! Duplicate names or aliases indicate a programming error and make the
//! bootstrap fail; everything else about resolution is a recoverable
//! per-line condition.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::args::{ArgSpec, BoundArgs};
use super::error::CommandError;
use super::{CommandOutcome, ExecutionContext};
use crate::core::settings::AccessLevel;

/// The single execution capability every command implements.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError>;
}

#[derive(Clone, Copy)]
pub struct CommandUsage {
    pub syntax: &'static str,
    pub description: &'static str,
}

pub struct CommandDescriptor {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub usages: &'static [CommandUsage],
    pub args: &'static [ArgSpec],
    pub required_level: AccessLevel,
    pub handler: Arc<dyn CommandHandler>,
}

/// Raised only during startup registration; the catalog is unusable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateCommand(pub String);

impl fmt::Display for DuplicateCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "command name or alias '{}' registered twice", self.0)
    }
}

impl std::error::Error for DuplicateCommand {}

#[derive(Default)]
pub struct CommandCatalog {
    commands: Vec<CommandDescriptor>,
    /// Lowercased name and alias lookup into `commands`.
    index: HashMap<String, usize>,
}

impl CommandCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_group(
        &mut self,
        group: Vec<CommandDescriptor>,
    ) -> Result<(), DuplicateCommand> {
        for descriptor in group {
            let slot = self.commands.len();
            for name in std::iter::once(descriptor.name).chain(descriptor.aliases.iter().copied())
            {
                let lowered = name.to_ascii_lowercase();
                if self.index.contains_key(&lowered) {
                    return Err(DuplicateCommand(lowered));
                }
                self.index.insert(lowered, slot);
            }
            self.commands.push(descriptor);
        }
        Ok(())
    }

    /// Exact match first (names and aliases), then unambiguous prefix.
    pub fn resolve(&self, name: &str) -> Result<&CommandDescriptor, CommandError> {
        let lowered = name.to_ascii_lowercase();
        if let Some(&slot) = self.index.get(&lowered) {
            return Ok(&self.commands[slot]);
        }

        let mut slots: Vec<usize> = self
            .index
            .iter()
            .filter(|(candidate, _)| candidate.starts_with(&lowered))
            .map(|(_, &slot)| slot)
            .collect();
        slots.sort_unstable();
        slots.dedup();

        match slots.as_slice() {
            [] => Err(CommandError::UnknownCommand(name.to_string())),
            [slot] => Ok(&self.commands[*slot]),
            many => {
                let mut candidates: Vec<String> = many
                    .iter()
                    .map(|&slot| self.commands[slot].name.to_string())
                    .collect();
                candidates.sort();
                Err(CommandError::AmbiguousCommand {
                    input: name.to_string(),
                    candidates,
                })
            }
        }
    }

    pub fn all(&self) -> &[CommandDescriptor] {
        &self.commands
    }

    /// Every name and alias, for completion.
    pub fn completion_names(&self) -> Vec<&'static str> {
        self.commands
            .iter()
            .flat_map(|descriptor| {
                std::iter::once(descriptor.name).chain(descriptor.aliases.iter().copied())
            })
            .collect()
    }
}
