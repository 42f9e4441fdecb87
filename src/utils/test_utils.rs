//! Shared test doubles: a recording event sink, a stub chat backend, and
//! a fully wired session fixture.

use std::sync::{Arc, Mutex};

use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::api::{ApiError, ChatClient, ChatMessage, ModelInfo};
use crate::core::config::SettingsStore;
use crate::core::session::ChatSession;
use crate::core::settings::builtin::register_builtin_settings;
use crate::core::settings::{self, SettingsRegistry, SharedSettings};
use crate::mcp::packages::{LocalPackageManager, PackageInfo};
use crate::mcp::ToolServerManager;
use crate::ui::events::{EventSink, ResultKind};

#[derive(Debug, Clone, PartialEq)]
pub enum RecordedEvent {
    Result { kind: ResultKind, message: String },
    PermissionDenied(String),
    ValidationError { key: String, reason: String },
    UnknownCommand(String),
    Delta(String),
    Complete(String),
}

#[derive(Default)]
pub struct RecordingSink {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn messages_of(&self, kind: ResultKind) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                RecordedEvent::Result { kind: k, message } if k == kind => Some(message),
                _ => None,
            })
            .collect()
    }

    fn push(&self, event: RecordedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

impl EventSink for RecordingSink {
    fn on_command_result(&self, kind: ResultKind, message: &str, _data: Option<&Value>) {
        self.push(RecordedEvent::Result {
            kind,
            message: message.to_string(),
        });
    }

    fn on_permission_denied(&self, setting_key: &str) {
        self.push(RecordedEvent::PermissionDenied(setting_key.to_string()));
    }

    fn on_validation_error(&self, setting_key: &str, reason: &str) {
        self.push(RecordedEvent::ValidationError {
            key: setting_key.to_string(),
            reason: reason.to_string(),
        });
    }

    fn on_unknown_command(&self, name: &str) {
        self.push(RecordedEvent::UnknownCommand(name.to_string()));
    }

    fn on_message_delta(&self, delta: &str) {
        self.push(RecordedEvent::Delta(delta.to_string()));
    }

    fn on_message_complete(&self, content: &str) {
        self.push(RecordedEvent::Complete(content.to_string()));
    }
}

/// Chat backend that streams a canned reply in two chunks.
pub struct StubChatClient {
    pub reply: String,
    pub models: Vec<ModelInfo>,
}

impl Default for StubChatClient {
    fn default() -> Self {
        Self {
            reply: "stubbed reply".to_string(),
            models: vec![
                ModelInfo { id: "alpha".into() },
                ModelInfo { id: "beta".into() },
            ],
        }
    }
}

#[async_trait::async_trait]
impl ChatClient for StubChatClient {
    async fn stream_chat(
        &self,
        _messages: &[ChatMessage],
        on_delta: &mut (dyn for<'a> FnMut(&'a str) + Send),
        cancel: &CancellationToken,
    ) -> Result<String, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        let mut mid = self.reply.len() / 2;
        while !self.reply.is_char_boundary(mid) {
            mid -= 1;
        }
        for chunk in [&self.reply[..mid], &self.reply[mid..]] {
            if !chunk.is_empty() {
                on_delta(chunk);
            }
        }
        Ok(self.reply.clone())
    }

    async fn list_models(&self, cancel: &CancellationToken) -> Result<Vec<ModelInfo>, ApiError> {
        if cancel.is_cancelled() {
            return Err(ApiError::Cancelled);
        }
        Ok(self.models.clone())
    }
}

pub struct SessionFixture {
    pub session: ChatSession,
    pub sink: Arc<RecordingSink>,
    pub settings: SharedSettings,
    pub config_dir: TempDir,
}

pub fn session_fixture() -> SessionFixture {
    session_with_chat(Arc::new(StubChatClient::default()))
}

pub fn session_with_chat(chat: Arc<dyn ChatClient>) -> SessionFixture {
    let mut registry = SettingsRegistry::new();
    register_builtin_settings(&mut registry).expect("builtin settings");
    let settings = settings::shared(registry);

    let config_dir = TempDir::new().expect("temp dir");
    let store = SettingsStore::at_path(config_dir.path().join("settings.toml"));
    let sink = Arc::new(RecordingSink::new());

    let packages = Box::new(LocalPackageManager::with_available(vec![PackageInfo {
        name: "weather".to_string(),
        version: "1.2.0".to_string(),
        description: "forecast lookup tools".to_string(),
    }]));

    let session = ChatSession::new(
        settings.clone(),
        store,
        chat,
        ToolServerManager::new(),
        packages,
        sink.clone(),
    )
    .expect("session bootstrap");

    SessionFixture {
        session,
        sink,
        settings,
        config_dir,
    }
}
