use std::error::Error;
use std::io::Write as _;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use palaver::api::HttpChatClient;
use palaver::core::config::{self, SettingsStore};
use palaver::core::session::{ChatSession, TurnOutcome};
use palaver::core::settings::builtin::{register_builtin_settings, NS_LLM};
use palaver::core::settings::{self, AccessLevel, SettingsRegistry};
use palaver::mcp::packages::LocalPackageManager;
use palaver::mcp::ToolServerManager;
use palaver::ui::events::ConsoleSink;

#[derive(Parser, Debug)]
#[command(
    name = "palaver",
    version,
    about = "Terminal chat client for OpenAI-compatible APIs"
)]
struct Cli {
    /// Settings file to use instead of the platform default location.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model for this session (overrides the persisted setting).
    #[arg(short, long)]
    model: Option<String>,

    /// Base URL of the chat API (overrides the persisted setting).
    #[arg(long, value_name = "URL")]
    base_url: Option<String>,
}

#[tokio::main]
async fn main() {
    if let Err(err) = run().await {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    let mut registry = SettingsRegistry::new();
    register_builtin_settings(&mut registry)?;
    config::apply_env_overrides(&mut registry);

    let store = match cli.config {
        Some(path) => SettingsStore::at_path(path),
        None => SettingsStore::at_default_location()?,
    };
    // A missing file is fine; a corrupt one is not.
    if let Some(doc) = store.load()? {
        config::apply_document(&mut registry, &doc);
    }
    if let Some(model) = cli.model {
        registry.set_text(NS_LLM, "model", &model, AccessLevel::System)?;
    }
    if let Some(base_url) = cli.base_url {
        registry.set_text(NS_LLM, "base_url", &base_url, AccessLevel::System)?;
    }

    let settings = settings::shared(registry);
    let chat = Arc::new(HttpChatClient::new(settings.clone()));
    let events = Arc::new(ConsoleSink::new(settings.clone()));
    let mut session = ChatSession::new(
        settings,
        store,
        chat,
        ToolServerManager::new(),
        Box::new(LocalPackageManager::new()),
        events,
    )?;
    session.auto_connect_tools().await;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        // Ctrl+C during a turn cancels that turn's token; the turn itself
        // decides how to unwind and always ends with a fresh token.
        let cancel = session.cancel_handle();
        let turn = session.handle_line(&line);
        tokio::pin!(turn);
        let outcome = loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => cancel.cancel(),
                outcome = &mut turn => break outcome,
            }
        };
        if outcome == TurnOutcome::Quit {
            break;
        }
    }
    Ok(())
}
