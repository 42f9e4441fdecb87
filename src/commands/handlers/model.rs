//! Model and provider commands.

use std::sync::Arc;

use serde_json::json;

use super::report_settings_error;
use crate::api::ApiError;
use crate::commands::args::{ArgKind, ArgSpec, BoundArgs};
use crate::commands::error::CommandError;
use crate::commands::registry::{CommandDescriptor, CommandHandler, CommandUsage};
use crate::commands::{CommandOutcome, ExecutionContext};
use crate::core::settings::builtin::{NS_LLM, PROVIDERS};
use crate::core::settings::AccessLevel;
use crate::ui::events::ResultKind;

pub fn commands() -> Vec<CommandDescriptor> {
    vec![
        CommandDescriptor {
            name: "model",
            aliases: &["m"],
            usages: &[
                CommandUsage {
                    syntax: "/model",
                    description: "Show the active model",
                },
                CommandUsage {
                    syntax: "/model <name>",
                    description: "Switch to another model",
                },
            ],
            args: MODEL_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ModelCommand),
        },
        CommandDescriptor {
            name: "models",
            aliases: &[],
            usages: &[CommandUsage {
                syntax: "/models",
                description: "List models offered by the backend",
            }],
            args: &[],
            required_level: AccessLevel::User,
            handler: Arc::new(ModelsCommand),
        },
        CommandDescriptor {
            name: "provider",
            aliases: &[],
            usages: &[
                CommandUsage {
                    syntax: "/provider",
                    description: "Show the active provider",
                },
                CommandUsage {
                    syntax: "/provider <name>",
                    description: "Switch provider (openai, ollama, custom)",
                },
            ],
            args: PROVIDER_ARGS,
            required_level: AccessLevel::User,
            handler: Arc::new(ProviderCommand),
        },
    ]
}

const MODEL_ARGS: &[ArgSpec] = &[ArgSpec::optional("name", ArgKind::Str, "model identifier")];

const PROVIDER_ARGS: &[ArgSpec] = &[ArgSpec::optional(
    "name",
    ArgKind::Enum(PROVIDERS),
    "provider name",
)];

struct ModelCommand;

#[async_trait::async_trait]
impl CommandHandler for ModelCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let Some(name) = args.get_str("name").map(str::to_string) else {
            let registry = ctx.settings.read().expect("settings lock poisoned");
            let current = registry
                .get(NS_LLM, "model")
                .map_err(|err| CommandError::Execution(err.to_string()))?;
            return Ok(CommandOutcome::Message(format!("model: {current}")));
        };

        let result = {
            let mut registry = ctx.settings.write().expect("settings lock poisoned");
            registry.set_text(NS_LLM, "model", &name, ctx.requester)
        };
        match result {
            Ok(previous) => Ok(CommandOutcome::Message(format!(
                "model changed to {name} (was {previous})"
            ))),
            Err(err) => {
                report_settings_error(ctx.events, err)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}

struct ModelsCommand;

#[async_trait::async_trait]
impl CommandHandler for ModelsCommand {
    async fn execute(
        &self,
        _args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let models = ctx.chat.list_models(&ctx.cancel).await.map_err(|err| match err {
            ApiError::Cancelled => CommandError::Cancelled,
            other => CommandError::Execution(other.to_string()),
        })?;
        if models.is_empty() {
            return Ok(CommandOutcome::Message("backend offers no models".into()));
        }
        let ids: Vec<&str> = models.iter().map(|model| model.id.as_str()).collect();
        ctx.events.on_command_result(
            ResultKind::Info,
            &ids.join("\n"),
            Some(&json!({ "models": ids })),
        );
        Ok(CommandOutcome::Done)
    }
}

struct ProviderCommand;

#[async_trait::async_trait]
impl CommandHandler for ProviderCommand {
    async fn execute(
        &self,
        args: BoundArgs,
        ctx: &mut ExecutionContext<'_>,
    ) -> Result<CommandOutcome, CommandError> {
        let Some(name) = args.get_str("name").map(str::to_string) else {
            let registry = ctx.settings.read().expect("settings lock poisoned");
            let current = registry
                .get(NS_LLM, "provider")
                .map_err(|err| CommandError::Execution(err.to_string()))?;
            return Ok(CommandOutcome::Message(format!("provider: {current}")));
        };

        let result = {
            let mut registry = ctx.settings.write().expect("settings lock poisoned");
            registry.set_text(NS_LLM, "provider", &name, ctx.requester)
        };
        match result {
            Ok(previous) => Ok(CommandOutcome::Message(format!(
                "provider changed to {name} (was {previous})"
            ))),
            Err(err) => {
                report_settings_error(ctx.events, err)?;
                Ok(CommandOutcome::Done)
            }
        }
    }
}
