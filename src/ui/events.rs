//! Event interface between the core and the interface layer.
//!
//! The core only emits structured events; the interface layer owns all
//! rendering. The binary ships [`ConsoleSink`], a plain stdout/stderr
//! renderer suitable for a line-oriented terminal session.

use std::io::Write;

use chrono::Local;
use serde_json::Value;

use crate::core::settings::builtin::NS_UI;
use crate::core::settings::{SettingValue, SharedSettings};

/// Result classification carried on `on_command_result`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultKind {
    Ok,
    Info,
    Error,
}

impl ResultKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResultKind::Ok => "ok",
            ResultKind::Info => "info",
            ResultKind::Error => "error",
        }
    }
}

/// Lifecycle events surfaced to the interface layer.
pub trait EventSink: Send + Sync {
    fn on_command_result(&self, kind: ResultKind, message: &str, data: Option<&Value>);
    fn on_permission_denied(&self, setting_key: &str);
    fn on_validation_error(&self, setting_key: &str, reason: &str);
    fn on_unknown_command(&self, name: &str);
    /// A streamed chunk of an assistant reply.
    fn on_message_delta(&self, delta: &str);
    /// The full assistant reply, after streaming finishes.
    fn on_message_complete(&self, content: &str);
}

/// Renders events for a plain terminal session.
pub struct ConsoleSink {
    settings: SharedSettings,
}

impl ConsoleSink {
    pub fn new(settings: SharedSettings) -> Self {
        Self { settings }
    }

    /// `[HH:MM:SS] ` when `ui:timestamps` is on, empty otherwise.
    fn stamp(&self) -> String {
        let on = {
            let registry = self.settings.read().expect("settings lock poisoned");
            registry
                .get(NS_UI, "timestamps")
                .ok()
                .and_then(SettingValue::as_bool)
                .unwrap_or(false)
        };
        if on {
            format!("[{}] ", Local::now().format("%H:%M:%S"))
        } else {
            String::new()
        }
    }
}

impl EventSink for ConsoleSink {
    fn on_command_result(&self, kind: ResultKind, message: &str, _data: Option<&Value>) {
        let stamp = self.stamp();
        match kind {
            ResultKind::Error => eprintln!("{stamp}error: {message}"),
            _ => println!("{stamp}{message}"),
        }
    }

    fn on_permission_denied(&self, setting_key: &str) {
        eprintln!("error: permission denied for setting '{setting_key}'");
    }

    fn on_validation_error(&self, setting_key: &str, reason: &str) {
        eprintln!("error: invalid value for '{setting_key}': {reason}");
    }

    fn on_unknown_command(&self, name: &str) {
        eprintln!("error: unknown command '/{name}' (try /help)");
    }

    fn on_message_delta(&self, delta: &str) {
        print!("{delta}");
        let _ = std::io::stdout().flush();
    }

    fn on_message_complete(&self, _content: &str) {
        println!();
    }
}
