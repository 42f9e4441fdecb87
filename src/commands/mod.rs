//! Slash-command interpretation.
//!
//! A line starting with [`COMMAND_SIGIL`] is lexed, resolved against the
//! catalog, access-checked, bound to the command's argument schema, and
//! only then handed to its handler. Anything else is forwarded to the
//! conversation untouched. Failures at any stage surface as events and
//! never reach the model.

pub mod args;
pub mod completion;
pub mod error;
pub mod handlers;
pub mod lexer;
pub mod registry;

#[cfg(test)]
mod tests;

pub use completion::{complete, Completions};
pub use error::CommandError;
pub use registry::{CommandCatalog, CommandDescriptor, CommandHandler, DuplicateCommand};

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::ChatClient;
use crate::core::config::SettingsStore;
use crate::core::settings::{AccessLevel, SharedSettings};
use crate::mcp::packages::PackageManager;
use crate::mcp::ToolServerManager;
use crate::ui::events::{EventSink, ResultKind};

pub const COMMAND_SIGIL: char = '/';

/// What a handler produced.
pub enum CommandOutcome {
    /// The handler already reported everything through the event sink.
    Done,
    /// A single-line success message for the sink.
    Message(String),
    Quit,
}

/// How one input line was consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// A command line that ran to completion.
    Handled,
    /// A command line that failed; the failure was already reported
    /// through the event sink and the line is consumed.
    Failed,
    /// Plain chat input for the conversation loop.
    Forward(String),
    Quit,
}

/// Everything a command handler may touch during one dispatch.
pub struct ExecutionContext<'a> {
    pub settings: &'a SharedSettings,
    pub store: &'a SettingsStore,
    /// Access level the current dispatch runs at.
    pub requester: AccessLevel,
    pub catalog: &'a CommandCatalog,
    pub chat: &'a dyn ChatClient,
    pub tools: &'a mut ToolServerManager,
    pub packages: &'a mut dyn PackageManager,
    pub events: &'a dyn EventSink,
    pub cancel: CancellationToken,
}

/// Interpret one input line.
///
/// Command lines are always consumed here: a failed command comes back
/// as [`ProcessOutcome::Failed`] after reporting and is never forwarded.
pub async fn process_line(line: &str, ctx: &mut ExecutionContext<'_>) -> ProcessOutcome {
    let trimmed = line.trim();
    if !trimmed.starts_with(COMMAND_SIGIL) {
        return ProcessOutcome::Forward(trimmed.to_string());
    }
    let body = &trimmed[COMMAND_SIGIL.len_utf8()..];

    let tokens = match lexer::tokenize(body) {
        Ok(tokens) => tokens,
        Err(mut err) => {
            // Lexed positions are relative to the body after the sigil;
            // report them against the operator's full line.
            if let CommandError::UnterminatedQuote { position } = &mut err {
                *position += COMMAND_SIGIL.len_utf8();
            }
            report(ctx, &err);
            return ProcessOutcome::Failed;
        }
    };
    let Some((head, rest)) = tokens.split_first() else {
        ctx.events
            .on_command_result(ResultKind::Error, "empty command (try /help)", None);
        return ProcessOutcome::Failed;
    };

    // Copy the catalog reference out so the descriptor outlives the
    // mutable borrow of the context below.
    let catalog: &CommandCatalog = ctx.catalog;
    let descriptor = match catalog.resolve(&head.value) {
        Ok(descriptor) => descriptor,
        Err(err) => {
            report(ctx, &err);
            return ProcessOutcome::Failed;
        }
    };

    if ctx.requester < descriptor.required_level {
        report(
            ctx,
            &CommandError::PermissionDenied {
                command: descriptor.name.to_string(),
                required: descriptor.required_level,
            },
        );
        return ProcessOutcome::Failed;
    }

    let bound = match args::bind(descriptor.args, rest) {
        Ok(bound) => bound,
        Err(err) => {
            report(ctx, &err);
            if let Some(usage) = descriptor.usages.first() {
                ctx.events
                    .on_command_result(ResultKind::Info, &format!("usage: {}", usage.syntax), None);
            }
            return ProcessOutcome::Failed;
        }
    };

    debug!(command = descriptor.name, "dispatching");
    match descriptor.handler.execute(bound, ctx).await {
        Ok(CommandOutcome::Done) => ProcessOutcome::Handled,
        Ok(CommandOutcome::Message(message)) => {
            ctx.events
                .on_command_result(ResultKind::Ok, &message, None);
            ProcessOutcome::Handled
        }
        Ok(CommandOutcome::Quit) => ProcessOutcome::Quit,
        Err(err) => {
            report(ctx, &err);
            ProcessOutcome::Failed
        }
    }
}

fn report(ctx: &ExecutionContext<'_>, err: &CommandError) {
    debug!("command failed: {err}");
    match err {
        CommandError::UnknownCommand(name) => ctx.events.on_unknown_command(name),
        other => {
            ctx.events
                .on_command_result(ResultKind::Error, &other.to_string(), None)
        }
    }
}
