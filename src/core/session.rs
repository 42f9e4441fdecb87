//! The chat session state machine.
//!
//! Each input line is one turn: lexed and resolved as a command when it
//! starts with the sigil, otherwise forwarded to the model with the
//! conversation history. A turn ends back at `Idle` (or `Faulted` after
//! an error) and always gets a fresh cancellation token, so a stale
//! Ctrl+C can never pre-cancel the next turn.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::api::{ApiError, ChatClient, ChatMessage};
use crate::commands::{
    self, CommandCatalog, Completions, DuplicateCommand, ExecutionContext, ProcessOutcome,
    COMMAND_SIGIL,
};
use crate::core::config::SettingsStore;
use crate::core::settings::builtin::{NS_TOOLS, NS_UI};
use crate::core::settings::{AccessLevel, SettingValue, SharedSettings};
use crate::mcp::packages::PackageManager;
use crate::mcp::ToolServerManager;
use crate::ui::events::{EventSink, ResultKind};

/// Where the current turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    Parsing,
    CommandDispatch,
    MessageForward,
    /// The previous turn ended in an error. Cleared when the next turn
    /// starts.
    Faulted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnOutcome {
    Continue,
    Quit,
}

pub struct ChatSession {
    settings: SharedSettings,
    store: SettingsStore,
    catalog: CommandCatalog,
    chat: Arc<dyn ChatClient>,
    tools: ToolServerManager,
    packages: Box<dyn PackageManager>,
    events: Arc<dyn EventSink>,
    history: Vec<ChatMessage>,
    state: TurnState,
    access_level: AccessLevel,
    cancel: CancellationToken,
}

impl ChatSession {
    pub fn new(
        settings: SharedSettings,
        store: SettingsStore,
        chat: Arc<dyn ChatClient>,
        mut tools: ToolServerManager,
        packages: Box<dyn PackageManager>,
        events: Arc<dyn EventSink>,
    ) -> Result<Self, DuplicateCommand> {
        let mut catalog = CommandCatalog::new();
        commands::handlers::register_all(&mut catalog)?;

        {
            let registry = settings.read().expect("settings lock poisoned");
            let enabled = registry
                .get(NS_TOOLS, "enabled")
                .ok()
                .and_then(SettingValue::as_bool)
                .unwrap_or(true);
            tools.set_enabled(enabled);
        }

        Ok(Self {
            settings,
            store,
            catalog,
            chat,
            tools,
            packages,
            events,
            history: Vec::new(),
            state: TurnState::Idle,
            access_level: AccessLevel::User,
            cancel: CancellationToken::new(),
        })
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.history
    }

    /// Token for the turn about to run (or currently running). Cancelling
    /// it interrupts the in-flight operation; finished turns are
    /// unaffected because every turn ends by replacing the token.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Completion over the current line. Read-only; safe while idle.
    pub fn complete(&self, line: &str, cursor: usize) -> Completions {
        let registry = self.settings.read().expect("settings lock poisoned");
        commands::complete(line, cursor, &self.catalog, &registry)
    }

    /// Connect registered tool servers when `tools:auto_connect` is on.
    pub async fn auto_connect_tools(&mut self) {
        let auto = {
            let registry = self.settings.read().expect("settings lock poisoned");
            registry
                .get(NS_TOOLS, "auto_connect")
                .ok()
                .and_then(SettingValue::as_bool)
                .unwrap_or(false)
        };
        if !auto {
            return;
        }
        let names: Vec<String> = self
            .tools
            .statuses()
            .into_iter()
            .map(|status| status.name)
            .collect();
        for name in names {
            if let Err(err) = self.tools.connect(&name).await {
                self.events.on_command_result(
                    ResultKind::Error,
                    &format!("could not connect tool server '{name}': {err}"),
                    None,
                );
            }
        }
    }

    /// Run one turn.
    pub async fn handle_line(&mut self, line: &str) -> TurnOutcome {
        self.state = TurnState::Parsing;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.state = TurnState::Idle;
            return TurnOutcome::Continue;
        }

        self.state = if trimmed.starts_with(COMMAND_SIGIL) {
            TurnState::CommandDispatch
        } else {
            TurnState::MessageForward
        };

        let cancel = self.cancel.clone();
        let processed = {
            let mut ctx = ExecutionContext {
                settings: &self.settings,
                store: &self.store,
                requester: self.access_level,
                catalog: &self.catalog,
                chat: self.chat.as_ref(),
                tools: &mut self.tools,
                packages: self.packages.as_mut(),
                events: self.events.as_ref(),
                cancel: cancel.clone(),
            };
            commands::process_line(trimmed, &mut ctx).await
        };

        let outcome = match processed {
            ProcessOutcome::Handled => {
                self.state = TurnState::Idle;
                TurnOutcome::Continue
            }
            ProcessOutcome::Failed => {
                self.state = TurnState::Faulted;
                TurnOutcome::Continue
            }
            ProcessOutcome::Quit => {
                self.state = TurnState::Idle;
                TurnOutcome::Quit
            }
            ProcessOutcome::Forward(text) => {
                self.forward_message(text, &cancel).await;
                TurnOutcome::Continue
            }
        };

        // A turn never leaks its token into the next one.
        self.cancel = CancellationToken::new();
        outcome
    }

    async fn forward_message(&mut self, text: String, cancel: &CancellationToken) {
        self.history.push(ChatMessage::user(text));

        let events = self.events.clone();
        let mut on_delta = |delta: &str| events.on_message_delta(delta);
        match self
            .chat
            .stream_chat(&self.history, &mut on_delta, cancel)
            .await
        {
            Ok(content) => {
                self.events.on_message_complete(&content);
                self.history.push(ChatMessage::assistant(content));
                self.trim_history();
                self.state = TurnState::Idle;
            }
            Err(ApiError::Cancelled) => {
                // The turn leaves no trace: the pending user message is
                // rolled back along with any partial reply.
                self.history.pop();
                debug!("message turn cancelled");
                self.events
                    .on_command_result(ResultKind::Info, "response cancelled", None);
                self.state = TurnState::Idle;
            }
            Err(err) => {
                self.history.pop();
                self.events
                    .on_command_result(ResultKind::Error, &err.to_string(), None);
                self.state = TurnState::Faulted;
            }
        }
    }

    fn trim_history(&mut self) {
        let limit = {
            let registry = self.settings.read().expect("settings lock poisoned");
            registry
                .get(NS_UI, "history_limit")
                .ok()
                .and_then(SettingValue::as_int)
                .unwrap_or(200)
                .max(1) as usize
        };
        if self.history.len() > limit {
            let excess = self.history.len() - limit;
            self.history.drain(..excess);
        }
    }
}
