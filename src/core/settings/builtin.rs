//! Builtin setting namespaces.
//!
//! Each subsystem contributes its own settings here at startup. The
//! registration order is irrelevant; a name collision is a fatal
//! bootstrap error surfaced by the caller.

use std::path::PathBuf;

use super::{AccessLevel, Setting, SettingValue, SettingsError, SettingsRegistry};

pub const NS_LLM: &str = "llm";
pub const NS_PATHS: &str = "paths";
pub const NS_UI: &str = "ui";
pub const NS_TOOLS: &str = "tools";

pub const PROVIDERS: &[&str] = &["openai", "ollama", "custom"];

/// Register every builtin namespace on a fresh registry.
pub fn register_builtin_settings(registry: &mut SettingsRegistry) -> Result<(), SettingsError> {
    register_llm_settings(registry)?;
    register_path_settings(registry)?;
    register_ui_settings(registry)?;
    register_tool_settings(registry)?;
    Ok(())
}

fn register_llm_settings(registry: &mut SettingsRegistry) -> Result<(), SettingsError> {
    registry.register(
        NS_LLM,
        Setting::new(
            "provider",
            SettingValue::Enum("openai".into()),
            AccessLevel::User,
            "Which backend flavor to talk to",
        )
        .with_choices(PROVIDERS),
    )?;
    registry.register(
        NS_LLM,
        Setting::new(
            "base_url",
            SettingValue::Str("https://api.openai.com/v1".into()),
            AccessLevel::User,
            "Base URL of the chat completion API",
        )
        .with_validator(|value| {
            let url = value.as_str().unwrap_or_default();
            if url.starts_with("http://") || url.starts_with("https://") {
                Ok(())
            } else {
                Err("must start with http:// or https://".into())
            }
        }),
    )?;
    registry.register(
        NS_LLM,
        Setting::new(
            "model",
            SettingValue::Str("gpt-4o".into()),
            AccessLevel::User,
            "Model identifier sent with each request",
        )
        .with_validator(non_empty),
    )?;
    // Credentials never come from the persisted file; env-only.
    registry.register(
        NS_LLM,
        Setting::new(
            "api_key",
            SettingValue::Str(String::new()),
            AccessLevel::System,
            "API key for the backend",
        ),
    )?;
    registry.register(
        NS_LLM,
        Setting::new(
            "request_timeout_secs",
            SettingValue::Int(120),
            AccessLevel::Advanced,
            "Per-request timeout in seconds",
        )
        .with_validator(int_range(1, 600)),
    )?;
    Ok(())
}

fn register_path_settings(registry: &mut SettingsRegistry) -> Result<(), SettingsError> {
    registry.register(
        NS_PATHS,
        Setting::new(
            "data_dir",
            SettingValue::Path(PathBuf::new()),
            AccessLevel::Advanced,
            "Directory for transcripts and local state (empty = platform default)",
        ),
    )?;
    registry.register(
        NS_PATHS,
        Setting::new(
            "transcript_file",
            SettingValue::Path(PathBuf::from("palaver-transcript.txt")),
            AccessLevel::User,
            "Default transcript file name",
        ),
    )?;
    Ok(())
}

fn register_ui_settings(registry: &mut SettingsRegistry) -> Result<(), SettingsError> {
    registry.register(
        NS_UI,
        Setting::new(
            "history_limit",
            SettingValue::Int(200),
            AccessLevel::User,
            "Maximum number of messages kept in the conversation window",
        )
        .with_validator(int_range(1, 10_000)),
    )?;
    registry.register(
        NS_UI,
        Setting::new(
            "timestamps",
            SettingValue::Bool(false),
            AccessLevel::User,
            "Prefix rendered messages with timestamps",
        ),
    )?;
    Ok(())
}

fn register_tool_settings(registry: &mut SettingsRegistry) -> Result<(), SettingsError> {
    registry.register(
        NS_TOOLS,
        Setting::new(
            "enabled",
            SettingValue::Bool(true),
            AccessLevel::User,
            "Expose connected tool servers to the model",
        ),
    )?;
    registry.register(
        NS_TOOLS,
        Setting::new(
            "auto_connect",
            SettingValue::Bool(false),
            AccessLevel::Advanced,
            "Connect registered tool servers at startup",
        ),
    )?;
    registry.register(
        NS_TOOLS,
        Setting::new(
            "call_timeout_secs",
            SettingValue::Int(60),
            AccessLevel::Advanced,
            "Per-tool-call timeout in seconds",
        )
        .with_validator(int_range(1, 600)),
    )?;
    registry.register(
        NS_TOOLS,
        Setting::new(
            "max_rounds",
            SettingValue::Int(8),
            AccessLevel::Advanced,
            "Maximum tool-call rounds per user message",
        )
        .with_validator(int_range(1, 25)),
    )?;
    Ok(())
}

fn non_empty(value: &SettingValue) -> Result<(), String> {
    match value.as_str() {
        Some(s) if !s.trim().is_empty() => Ok(()),
        _ => Err("must not be empty".into()),
    }
}

fn int_range(min: i64, max: i64) -> impl Fn(&SettingValue) -> Result<(), String> {
    move |value| match value.as_int() {
        Some(v) if (min..=max).contains(&v) => Ok(()),
        _ => Err(format!("must be between {min} and {max}")),
    }
}
