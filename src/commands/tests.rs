//! End-to-end tests for the command pipeline: one session, real catalog,
//! stub backend, recording sink.

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tempfile::TempDir;

use crate::core::config::SettingsStore;
use crate::core::session::{ChatSession, TurnOutcome, TurnState};
use crate::core::settings::builtin::{register_builtin_settings, NS_LLM};
use crate::core::settings::{self, AccessLevel, SettingValue, SettingsRegistry, SharedSettings};
use crate::mcp::packages::LocalPackageManager;
use crate::mcp::ToolServerManager;
use crate::ui::events::{EventSink, ResultKind};
use crate::utils::test_utils::{session_fixture, RecordedEvent, RecordingSink, StubChatClient};

fn current(fixture: &crate::utils::test_utils::SessionFixture, key: &str) -> SettingValue {
    let registry = fixture.settings.read().unwrap();
    registry.get(NS_LLM, key).unwrap().clone()
}

#[tokio::test]
async fn unknown_command_is_reported_and_never_forwarded() {
    let mut fixture = session_fixture();
    let outcome = fixture.session.handle_line("/frobnicate now").await;
    assert_eq!(outcome, TurnOutcome::Continue);
    assert_eq!(fixture.session.state(), TurnState::Faulted);

    let events = fixture.sink.events();
    assert!(events.contains(&RecordedEvent::UnknownCommand("frobnicate".into())));
    // Nothing reached the backend.
    assert!(fixture.session.history().is_empty());
    assert!(!events
        .iter()
        .any(|event| matches!(event, RecordedEvent::Delta(_) | RecordedEvent::Complete(_))));
}

#[tokio::test]
async fn set_updates_the_registry_and_reports_success() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/set llm:model llama3").await;
    assert_eq!(fixture.session.state(), TurnState::Idle);
    assert_eq!(current(&fixture, "model"), SettingValue::Str("llama3".into()));

    let ok = fixture.sink.messages_of(ResultKind::Ok);
    assert_eq!(ok.len(), 1);
    assert!(ok[0].contains("llm:model"));
    assert!(ok[0].contains("llama3"));
}

#[tokio::test]
async fn quoted_values_survive_lexing_end_to_end() {
    let mut fixture = session_fixture();
    fixture
        .session
        .handle_line(r#"/set llm:model "model with spaces""#)
        .await;
    assert_eq!(
        current(&fixture, "model"),
        SettingValue::Str("model with spaces".into())
    );
}

#[tokio::test]
async fn permission_denied_emits_the_event_and_keeps_the_value() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/set llm:api_key sk-nope").await;
    assert_eq!(fixture.session.state(), TurnState::Idle);
    assert_eq!(current(&fixture, "api_key"), SettingValue::Str(String::new()));
    assert!(fixture
        .sink
        .events()
        .contains(&RecordedEvent::PermissionDenied("llm:api_key".into())));
}

#[tokio::test]
async fn force_escalates_a_single_operation_to_advanced() {
    let mut fixture = session_fixture();

    // Advanced-level setting: denied at the session's user level.
    fixture
        .session
        .handle_line("/set llm:request_timeout_secs 30")
        .await;
    assert!(fixture
        .sink
        .events()
        .contains(&RecordedEvent::PermissionDenied(
            "llm:request_timeout_secs".into()
        )));
    assert_eq!(current(&fixture, "request_timeout_secs"), SettingValue::Int(120));

    fixture
        .session
        .handle_line("/set llm:request_timeout_secs 30 --force")
        .await;
    assert_eq!(current(&fixture, "request_timeout_secs"), SettingValue::Int(30));

    // System settings stay out of reach even with --force.
    fixture
        .session
        .handle_line("/set llm:api_key sk-x --force")
        .await;
    assert_eq!(current(&fixture, "api_key"), SettingValue::Str(String::new()));
}

#[tokio::test]
async fn validation_failure_emits_the_event_and_keeps_the_value() {
    let mut fixture = session_fixture();
    fixture
        .session
        .handle_line("/set llm:base_url ftp://example.org")
        .await;
    assert_eq!(
        current(&fixture, "base_url"),
        SettingValue::Str("https://api.openai.com/v1".into())
    );
    assert!(fixture.sink.events().iter().any(|event| matches!(
        event,
        RecordedEvent::ValidationError { key, .. } if key == "llm:base_url"
    )));
}

#[tokio::test]
async fn dispatch_is_case_insensitive() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/SET llm:model mixtral").await;
    assert_eq!(current(&fixture, "model"), SettingValue::Str("mixtral".into()));
}

#[tokio::test]
async fn unambiguous_prefix_dispatches_ambiguous_prefix_fails() {
    let mut fixture = session_fixture();

    fixture.session.handle_line("/prov ollama").await;
    assert_eq!(current(&fixture, "provider"), SettingValue::Enum("ollama".into()));

    // "mo" matches both /model and /models.
    fixture.session.handle_line("/mo").await;
    assert_eq!(fixture.session.state(), TurnState::Faulted);
    let errors = fixture.sink.messages_of(ResultKind::Error);
    assert!(errors.iter().any(|message| message.contains("ambiguous")
        && message.contains("model")
        && message.contains("models")));
}

#[tokio::test]
async fn quit_and_its_aliases_end_the_session() {
    for line in ["/quit", "/exit", "/q"] {
        let mut fixture = session_fixture();
        assert_eq!(fixture.session.handle_line(line).await, TurnOutcome::Quit, "{line}");
    }
}

#[tokio::test]
async fn unterminated_quote_is_consumed_not_forwarded() {
    let mut fixture = session_fixture();
    fixture.session.handle_line(r#"/set llm:model "oops"#).await;
    assert_eq!(fixture.session.state(), TurnState::Faulted);
    let errors = fixture.sink.messages_of(ResultKind::Error);
    assert!(errors.iter().any(|message| message.contains("unterminated quote")));
    // The position counts from the start of the line, sigil included.
    assert!(errors.iter().any(|message| message.contains("position 15")));
    assert!(fixture.session.history().is_empty());
}

#[tokio::test]
async fn stray_positional_token_does_not_escalate_access() {
    let mut fixture = session_fixture();
    fixture
        .session
        .handle_line("/set llm:request_timeout_secs 30 on")
        .await;
    assert_eq!(fixture.session.state(), TurnState::Faulted);

    let errors = fixture.sink.messages_of(ResultKind::Error);
    assert!(errors.iter().any(|message| message.contains("unexpected argument")));
    assert_eq!(current(&fixture, "request_timeout_secs"), SettingValue::Int(120));
}

#[tokio::test]
async fn missing_argument_reports_usage() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/set llm:model").await;
    let errors = fixture.sink.messages_of(ResultKind::Error);
    assert!(errors.iter().any(|message| message.contains("value")));
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert!(info.iter().any(|message| message.starts_with("usage: /set")));
}

#[tokio::test]
async fn plain_text_forwards_to_the_backend() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("hello there").await;
    assert_eq!(fixture.session.state(), TurnState::Idle);

    let events = fixture.sink.events();
    assert!(events.iter().any(|event| matches!(event, RecordedEvent::Delta(_))));
    assert!(events.contains(&RecordedEvent::Complete("stubbed reply".into())));

    let history = fixture.session.history();
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].content, "hello there");
    assert_eq!(history[1].content, "stubbed reply");
}

#[tokio::test]
async fn cancelled_turn_leaves_no_trace_and_the_next_turn_works() {
    let mut fixture = session_fixture();
    fixture.session.cancel_handle().cancel();
    fixture.session.handle_line("hello").await;

    assert!(fixture.session.history().is_empty());
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert!(info.iter().any(|message| message.contains("cancelled")));

    // The token was replaced at end of turn; the session is not stuck.
    fixture.session.handle_line("hello again").await;
    assert_eq!(fixture.session.history().len(), 2);
}

#[tokio::test]
async fn cancelled_command_leaves_the_registry_untouched() {
    use crate::core::config::snapshot;

    let mut fixture = session_fixture();
    let before = {
        let registry = fixture.settings.read().unwrap();
        snapshot(&registry).namespaces
    };

    fixture.session.cancel_handle().cancel();
    fixture.session.handle_line("/models").await;

    let errors = fixture.sink.messages_of(ResultKind::Error);
    assert!(errors.iter().any(|message| message.contains("cancelled")));
    let after = {
        let registry = fixture.settings.read().unwrap();
        snapshot(&registry).namespaces
    };
    assert_eq!(before, after);
}

#[tokio::test]
async fn help_lists_every_command_group() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/help").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert_eq!(info.len(), 1);
    for name in ["/set", "/settings", "/model", "/server", "/pkg", "/quit"] {
        assert!(info[0].contains(name), "missing {name}");
    }

    fixture.session.handle_line("/help set").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert!(info[1].contains("/set <namespace:key>"));
}

#[tokio::test]
async fn settings_listing_shows_values_and_levels() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/settings llm").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert_eq!(info.len(), 1);
    assert!(info[0].contains("llm:model = gpt-4o"));
    assert!(info[0].contains("system access"));
    assert!(!info[0].contains("ui:"));

    fixture.session.handle_line("/settings warp").await;
    let errors = fixture.sink.messages_of(ResultKind::Error);
    assert!(errors.iter().any(|message| message.contains("no settings match 'warp'")));
}

#[tokio::test]
async fn settings_filter_stages_exact_then_namespace_then_substring() {
    let mut fixture = session_fixture();

    // Exact qualified key: one line.
    fixture.session.handle_line("/settings llm:model").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert!(info[0].contains("llm:model"));
    assert!(!info[0].contains('\n'));

    // Substring across namespaces.
    fixture.session.handle_line("/settings timeout").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert!(info[1].contains("llm:request_timeout_secs"));
    assert!(info[1].contains("tools:call_timeout_secs"));
}

#[tokio::test]
async fn get_shows_one_setting() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/get llm:model").await;
    let ok = fixture.sink.messages_of(ResultKind::Ok);
    assert_eq!(ok.len(), 1);
    assert!(ok[0].contains("llm:model = gpt-4o"));
    assert!(ok[0].contains("string"));
}

#[tokio::test]
async fn reset_restores_the_default() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/set llm:model llama3").await;
    fixture.session.handle_line("/reset llm:model").await;
    assert_eq!(current(&fixture, "model"), SettingValue::Str("gpt-4o".into()));
}

#[tokio::test]
async fn save_persists_to_the_configured_store() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/set llm:model llama3").await;
    fixture.session.handle_line("/save").await;

    let path = fixture.config_dir.path().join("settings.toml");
    let contents = fs::read_to_string(path).unwrap();
    assert!(contents.contains("model = \"llama3\""));
    // Env-only settings never land on disk.
    assert!(!contents.contains("api_key"));
}

#[tokio::test]
async fn export_then_import_round_trips_values() {
    let mut fixture = session_fixture();
    let file = fixture.config_dir.path().join("exported.toml");

    fixture.session.handle_line("/set llm:model llama3").await;
    fixture
        .session
        .handle_line(&format!("/export {}", file.display()))
        .await;
    fixture.session.handle_line("/reset llm:model").await;
    assert_eq!(current(&fixture, "model"), SettingValue::Str("gpt-4o".into()));

    fixture
        .session
        .handle_line(&format!("/import {}", file.display()))
        .await;
    assert_eq!(current(&fixture, "model"), SettingValue::Str("llama3".into()));
}

#[tokio::test]
async fn import_honors_access_levels_per_key() {
    let mut fixture = session_fixture();
    let file = fixture.config_dir.path().join("hostile.toml");
    fs::write(
        &file,
        "version = 1\n[llm]\nmodel = \"from-file\"\nrequest_timeout_secs = 30\n",
    )
    .unwrap();

    fixture
        .session
        .handle_line(&format!("/import {}", file.display()))
        .await;

    // The user-level key applies; the advanced one is denied.
    assert_eq!(current(&fixture, "model"), SettingValue::Str("from-file".into()));
    assert_eq!(current(&fixture, "request_timeout_secs"), SettingValue::Int(120));
    assert!(fixture
        .sink
        .events()
        .contains(&RecordedEvent::PermissionDenied(
            "llm:request_timeout_secs".into()
        )));
    let ok = fixture.sink.messages_of(ResultKind::Ok);
    assert!(ok.iter().any(|message| message.contains("imported 1 setting(s)")
        && message.contains("1 skipped")));
}

#[tokio::test]
async fn models_command_lists_backend_models() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/models").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert_eq!(info, vec!["alpha\nbeta".to_string()]);
}

#[tokio::test]
async fn model_command_shows_and_switches() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/model").await;
    let ok = fixture.sink.messages_of(ResultKind::Ok);
    assert_eq!(ok, vec!["model: gpt-4o".to_string()]);

    fixture.session.handle_line("/model beta").await;
    assert_eq!(current(&fixture, "model"), SettingValue::Str("beta".into()));
}

#[tokio::test]
async fn toggle_tools_flips_the_setting() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/toggle-tools").await;
    {
        let registry = fixture.settings.read().unwrap();
        assert_eq!(
            registry.get("tools", "enabled").unwrap(),
            &SettingValue::Bool(false)
        );
    }
    fixture.session.handle_line("/toggle-tools on").await;
    let registry = fixture.settings.read().unwrap();
    assert_eq!(
        registry.get("tools", "enabled").unwrap(),
        &SettingValue::Bool(true)
    );
}

#[tokio::test]
async fn pkg_install_list_remove_cycle() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/pkg install weather").await;
    let ok = fixture.sink.messages_of(ResultKind::Ok);
    assert!(ok.iter().any(|message| message.contains("installed weather 1.2.0")));

    fixture.session.handle_line("/pkg list").await;
    let info = fixture.sink.messages_of(ResultKind::Info);
    assert!(info.iter().any(|message| message.contains("weather 1.2.0")));

    fixture.session.handle_line("/pkg remove weather").await;
    fixture.session.handle_line("/pkg list").await;
    let ok = fixture.sink.messages_of(ResultKind::Ok);
    assert!(ok.iter().any(|message| message.contains("no packages installed")));
}

#[tokio::test]
async fn completion_runs_through_the_session() {
    let fixture = session_fixture();
    let line = "/set llm:mo";
    let completions = fixture.session.complete(line, line.len());
    assert_eq!(completions.candidates, vec!["llm:model".to_string()]);
}

#[tokio::test]
async fn faulted_state_clears_on_the_next_turn() {
    let mut fixture = session_fixture();
    fixture.session.handle_line("/frobnicate").await;
    assert_eq!(fixture.session.state(), TurnState::Faulted);
    fixture.session.handle_line("/get llm:model").await;
    assert_eq!(fixture.session.state(), TurnState::Idle);
}

/// Sink that takes a settings read lock while rendering, the way the
/// console sink checks ui:timestamps before printing.
struct LockReadingSink {
    settings: SharedSettings,
    inner: RecordingSink,
}

impl EventSink for LockReadingSink {
    fn on_command_result(&self, kind: ResultKind, message: &str, data: Option<&Value>) {
        let _registry = self.settings.read().expect("settings lock poisoned");
        self.inner.on_command_result(kind, message, data);
    }

    fn on_permission_denied(&self, setting_key: &str) {
        let _registry = self.settings.read().expect("settings lock poisoned");
        self.inner.on_permission_denied(setting_key);
    }

    fn on_validation_error(&self, setting_key: &str, reason: &str) {
        let _registry = self.settings.read().expect("settings lock poisoned");
        self.inner.on_validation_error(setting_key, reason);
    }

    fn on_unknown_command(&self, name: &str) {
        self.inner.on_unknown_command(name);
    }

    fn on_message_delta(&self, delta: &str) {
        self.inner.on_message_delta(delta);
    }

    fn on_message_complete(&self, content: &str) {
        self.inner.on_message_complete(content);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn import_and_listing_complete_with_a_settings_reading_sink() {
    let mut registry = SettingsRegistry::new();
    register_builtin_settings(&mut registry).unwrap();
    let settings = settings::shared(registry);

    let dir = TempDir::new().unwrap();
    let store = SettingsStore::at_path(dir.path().join("settings.toml"));
    let sink = Arc::new(LockReadingSink {
        settings: settings.clone(),
        inner: RecordingSink::new(),
    });

    let mut session = ChatSession::new(
        settings.clone(),
        store,
        Arc::new(StubChatClient::default()),
        ToolServerManager::new(),
        Box::new(LocalPackageManager::new()),
        sink.clone(),
    )
    .unwrap();

    let file = dir.path().join("mixed.toml");
    fs::write(&file, "version = 1\n[llm]\nmodel = \"from-file\"\nwarp = \"9\"\n").unwrap();
    let line = format!("/import {}", file.display());

    // Run on a worker so a same-thread lock cycle shows up as a timeout
    // instead of hanging the whole suite.
    let worker = tokio::spawn(async move {
        session.handle_line("/settings llm").await;
        session.handle_line(&line).await;
    });
    tokio::time::timeout(Duration::from_secs(5), worker)
        .await
        .expect("turns finished without blocking on the settings lock")
        .unwrap();

    {
        let registry = settings.read().unwrap();
        assert_eq!(
            registry.get(NS_LLM, "model").unwrap(),
            &SettingValue::Str("from-file".into())
        );
    }
    let info = sink.inner.messages_of(ResultKind::Info);
    assert!(info
        .iter()
        .any(|message| message.contains("skipping unknown setting 'llm:warp'")));
    let ok = sink.inner.messages_of(ResultKind::Ok);
    assert!(ok.iter().any(|message| message.contains("imported 1 setting(s)")
        && message.contains("1 skipped")));
}

#[test]
fn access_levels_order_as_documented() {
    assert!(AccessLevel::ReadOnly < AccessLevel::User);
    assert!(AccessLevel::User < AccessLevel::Advanced);
    assert!(AccessLevel::Advanced < AccessLevel::System);
}
