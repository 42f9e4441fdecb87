//! Tool package commands.

use std::sync::Arc;

use serde_json::json;

use crate::commands::args::{ArgKind, ArgSpec, BoundArgs};
use crate::commands::error::CommandError;
use crate::commands::registry::{CommandDescriptor, CommandHandler, CommandUsage};
use crate::commands::{CommandOutcome, ExecutionContext};
use crate::core::settings::AccessLevel;
use crate::ui::events::ResultKind;

pub fn commands() -> Vec<CommandDescriptor> {
    vec![CommandDescriptor {
        name: "pkg",
        aliases: &["package"],
        usages: &[
            CommandUsage {
                syntax: "/pkg list",
                description: "List installed tool packages",
            },
            CommandUsage {
                syntax: "/pkg install <name>",
                description: "Install a tool package",
            },
            CommandUsage {
                syntax: "/pkg remove <name>",
                description: "Remove an installed tool package",
            },
        ],
        args: PKG_ARGS,
        required_level: AccessLevel::User,
        handler: Arc::new(PkgCommand),
    }]
}

const PKG_ARGS: &[ArgSpec] = &[
    ArgSpec::with_default(
        "action",
        ArgKind::Enum(&["install", "remove", "list"]),
        "list",
        "what to do",
    ),
    ArgSpec::optional("name", ArgKind::Str, "package name"),
];

struct PkgCommand;

#[async_trait::async_trait]
impl CommandHandler for PkgCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let action = args.get_str("action").unwrap_or("list").to_string();
        let name = args.get_str("name").map(str::to_string);

        match action.as_str() {
            "install" => {
                let name = name.ok_or_else(|| CommandError::Argument {
                    name: "name".into(),
                    reason: "'install' needs a package name".into(),
                })?;
                let info = ctx
                    .packages
                    .install(&name)
                    .await
                    .map_err(|err| CommandError::Execution(err.to_string()))?;
                Ok(CommandOutcome::Message(format!(
                    "installed {} {}",
                    info.name, info.version
                )))
            }
            "remove" => {
                let name = name.ok_or_else(|| CommandError::Argument {
                    name: "name".into(),
                    reason: "'remove' needs a package name".into(),
                })?;
                ctx.packages
                    .remove(&name)
                    .await
                    .map_err(|err| CommandError::Execution(err.to_string()))?;
                Ok(CommandOutcome::Message(format!("removed {name}")))
            }
            _ => {
                let installed = ctx.packages.installed();
                if installed.is_empty() {
                    return Ok(CommandOutcome::Message("no packages installed".into()));
                }
                let lines: Vec<String> = installed
                    .iter()
                    .map(|info| format!("{} {}: {}", info.name, info.version, info.description))
                    .collect();
                let names: Vec<&str> = installed.iter().map(|info| info.name.as_str()).collect();
                ctx.events.on_command_result(
                    ResultKind::Info,
                    &lines.join("\n"),
                    Some(&json!({ "packages": names })),
                );
                Ok(CommandOutcome::Done)
            }
        }
    }
}
