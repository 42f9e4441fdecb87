//! Session commands: help and quit.

use std::sync::Arc;

use crate::commands::args::{ArgKind, ArgSpec, BoundArgs};
use crate::commands::error::CommandError;
use crate::commands::registry::{CommandDescriptor, CommandHandler, CommandUsage};
use crate::commands::{CommandOutcome, ExecutionContext};
use crate::core::settings::AccessLevel;
use crate::ui::events::ResultKind;

pub fn commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor {
            name: "help",
            aliases: &["h", "?"],
            usages: &[
                CommandUsage {
                    syntax: "/help",
                    description: "List all commands",
                },
                CommandUsage {
                    syntax: "/help <command>",
                    description: "Show usage for one command",
                },
            ],
            args: HELP_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(HelpCommand),
        },
        CommandDescriptor {
            name: "quit",
            aliases: &["exit", "q"],
            usages: &[CommandUsage {
                syntax: "/quit",
                description: "End the session",
            }],
            args: &[],
            required_level: AccessLevel::User,
            handler: Arc::new(QuitCommand),
        },
    ]
}

const HELP_ARGS: &[ArgSpec] = &[ArgSpec::optional("command", ArgKind::Str, "command to describe")];

struct HelpCommand;

#[async_trait::async_trait]
impl CommandHandler for HelpCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        if let Some(name) = args.get_str("command") {
            let descriptor = ctx.catalog.resolve(name)?;
            let mut lines = Vec::new();
            for usage in descriptor.usages {
                lines.push(format!("{} - {}", usage.syntax, usage.description));
            }
            if !descriptor.aliases.is_empty() {
                lines.push(format!("aliases: {}", descriptor.aliases.join(", ")));
            }
            for spec in descriptor.args {
                lines.push(format!("  {}: {}", spec.name, spec.description));
            }
            ctx.events
                .on_command_result(ResultKind::Info, &lines.join("\n"), None);
            return Ok(CommandOutcome::Done);
        }

        let mut lines = Vec::new();
        for descriptor in ctx.catalog.all() {
            let description = descriptor
                .usages
                .first()
                .map(|usage| usage.description)
                .unwrap_or_default();
            lines.push(format!("/{} - {}", descriptor.name, description));
        }
        ctx.events
            .on_command_result(ResultKind::Info, &lines.join("\n"), None);
        Ok(CommandOutcome::Done)
    }
}

struct QuitCommand;

#[async_trait::async_trait]
impl CommandHandler for QuitCommand {
    async fn execute(
        &self,
        _args: BoundArgs,
        _ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        Ok(CommandOutcome::Quit)
    }
}
