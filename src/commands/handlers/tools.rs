//! Tool server commands.

use std::sync::Arc;

use serde_json::json;

use super::report_settings_error;
use crate::commands::args::{ArgKind, ArgSpec, BoundArgs};
use crate::commands::error::CommandError;
use crate::commands::registry::{CommandDescriptor, CommandHandler, CommandUsage};
use crate::commands::{CommandOutcome, ExecutionContext};
use crate::core::settings::builtin::NS_TOOLS;
use crate::core::settings::{AccessLevel, SettingValue};
use crate::ui::events::ResultKind;

pub fn commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor {
            name: "tools",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/tools",
                description: "List tools offered by connected servers",
            }],
            args: &[],
            required_level: AccessLevel::User,
            handler: Arc::new(ToolsCommand),
        },
        CommandDescriptor {
            name: "server",
            aliases: &[],
            usages: &[
                CommandUsage {
                    syntax: "/server status [name]",
                    description: "Show server connection state",
                },
                CommandUsage {
                    syntax: "/server connect <name>",
                    description: "Connect a registered tool server",
                },
                CommandUsage {
                    syntax: "/server disconnect <name>",
                    description: "Disconnect a tool server",
                },
            ],
            args: SERVER_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ServerCommand),
        },
        CommandDescriptor {
            name: "toggle-tools",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/toggle-tools [on|off]",
                description: "Enable or disable tool use for the model",
            }],
            args: TOGGLE_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ToggleToolsCommand),
        },
    ]
}

const SERVER_ARGS: &[ArgSpec] = &[
    ArgSpec::with_default(
        "action",
        ArgKind::Enum(&["connect", "disconnect", "status"]),
        "status",
        "what to do",
    ),
    ArgSpec::optional("name", ArgKind::Str, "server name"),
];

// Not a Bool: the state is a positional value, not a presence flag.
const TOGGLE_ARGS: &[ArgSpec] = &[ArgSpec::optional(
    "state",
    ArgKind::Enum(&["on", "off"]),
    "on or off",
)];

struct ToolsCommand;

#[async_trait::async_trait]
impl CommandHandler for ToolsCommand {
    async fn execute(
        &self,
        _args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let tools = ctx
            .tools
            .all_tools()
            .await
            .map_err(|err| CommandError::Execution(err.to_string()))?;
        if tools.is_empty() {
            let hint = if ctx.tools.is_enabled() {
                "no tools available (no connected servers)"
            } else {
                "no tools available (tool use is disabled)"
            };
            return Ok(CommandOutcome::Message(hint.into()));
        }
        let lines: Vec<String> = tools
            .iter()
            .map(|tool| format!("{} ({}): {}", tool.name, tool.server, tool.description))
            .collect();
        let names: Vec<&str> = tools.iter().map(|tool| tool.name.as_str()).collect();
        ctx.events.on_command_result(
            ResultKind::Info,
            &lines.join("\n"),
            Some(&json!({ "tools": names })),
        );
        Ok(CommandOutcome::Done)
    }
}

struct ServerCommand;

#[async_trait::async_trait]
impl CommandHandler for ServerCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let action = args.get_str("action").unwrap_or("status").to_string();
        let name = args.get_str("name").map(str::to_string);

        match action.as_str() {
            "connect" | "disconnect" => {
                let name = name.ok_or_else(|| CommandError::Argument {
                    name: "name".into(),
                    reason: format!("'{action}' needs a server name"),
                })?;
                let result = if action == "connect" {
                    ctx.tools.connect(&name).await
                } else {
                    ctx.tools.disconnect(&name).await
                };
                result.map_err(|err| CommandError::Execution(err.to_string()))?;
                Ok(CommandOutcome::Message(format!("{name}: {action}ed")))
            }
            _ => {
                let statuses = match &name {
                    Some(name) => vec![ctx
                        .tools
                        .status(name)
                        .map_err(|err| CommandError::Execution(err.to_string()))?],
                    None => ctx.tools.statuses(),
                };
                if statuses.is_empty() {
                    return Ok(CommandOutcome::Message("no tool servers registered".into()));
                }
                let lines: Vec<String> = statuses
                    .iter()
                    .map(|status| {
                        let state = if status.connected {
                            "connected"
                        } else {
                            "disconnected"
                        };
                        format!("{}: {state}", status.name)
                    })
                    .collect();
                Ok(CommandOutcome::Message(lines.join("\n")))
            }
        }
    }
}

struct ToggleToolsCommand;

#[async_trait::async_trait]
impl CommandHandler for ToggleToolsCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        // Without an explicit state, flip the current one.
        let target = match args.get_str("state") {
            Some(state) => state == "on",
            None => {
                let registry = ctx.settings.read().expect("settings lock poisoned");
                !registry
                    .get(NS_TOOLS, "enabled")
                    .ok()
                    .and_then(SettingValue::as_bool)
                    .unwrap_or(true)
            }
        };

        let result = {
            let mut registry = ctx.settings.write().expect("settings lock poisoned");
            registry.set(
                NS_TOOLS,
                "enabled",
                SettingValue::Bool(target),
                ctx.requester,
            )
        };
        match result {
            Ok(_) => {
                ctx.tools.set_enabled(target);
                Ok(CommandOutcome::Message(format!(
                    "tool use {}",
                    if target { "enabled" } else { "disabled" }
                )))
            }
            Err(err) => {
                report_settings_error(ctx.events, err)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}
