use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use finchat_core::client::OpenAiClient;
use finchat_core::config::ChatConfig;
use finchat_core::request::RequestSettings;
use finchat_server::config::AppConfig;
use finchat_server::conversation::SessionController;
use finchat_server::http_server::{self, AppState};
use finchat_server::session::{InMemorySessionStore, SessionStoreRef};
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "finchat-daemon", about = "Chat UI for a financial-data assistant backed by file search")]
struct Args {
    /// Path to config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// OpenAI API key (overrides OPENAI_API_KEY)
    #[arg(short = 'k', long)]
    api_key: Option<String>,

    /// Vector store searched by the file search tool (overrides VECTOR_STORE_ID)
    #[arg(short, long)]
    vector_store_id: Option<String>,

    /// Model to use
    #[arg(short = 'o', long)]
    model: Option<String>,

    /// System prompt to use
    #[arg(short, long)]
    system_prompt: Option<String>,

    /// HTTP server address
    #[arg(long)]
    http_addr: Option<SocketAddr>,

    /// Minutes of inactivity before a conversation is dropped
    #[arg(long)]
    session_ttl_minutes: Option<i64>,

    /// Maximum log level
    #[arg(long, default_value = "info")]
    log_level: Level,
}

impl Args {
    fn chat_overrides(&self) -> ChatConfig {
        ChatConfig {
            api_key: self.api_key.clone(),
            vector_store_id: self.vector_store_id.clone(),
            model_name: self.model.clone(),
            system_prompt: self.system_prompt.clone(),
            max_num_results: None,
            api_base: None,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command line args
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting finchat daemon");

    // Load config from file or use defaults
    let mut config = match &args.config {
        Some(path) => AppConfig::load_from_file(path),
        None => AppConfig::load_from_default(),
    }
    .map_err(|e| {
        error!(error = %e, "Failed to load configuration");
        e
    })?;

    // Update config from CLI args
    if let Some(addr) = args.http_addr {
        config.http_addr = addr;
    }
    if let Some(ttl) = args.session_ttl_minutes {
        config.session_ttl_minutes = ttl;
    }
    let chat = config.effective_chat(&ChatConfig::from_env(), &args.chat_overrides());

    // Missing secrets are not fatal; the first request reports them
    let warnings = chat.missing_settings();
    for missing in &warnings {
        warn!("{}", missing);
    }

    info!(model = chat.model(), "Initialized OpenAI client");
    let settings = RequestSettings::from(&chat);
    let controller = SessionController::new(Arc::new(OpenAiClient::new(chat)), settings);

    let sessions: SessionStoreRef = Arc::new(InMemorySessionStore::with_ttl(config.session_ttl()));
    let sweeper = spawn_session_sweeper(
        sessions.clone(),
        Duration::from_secs(config.cleanup_interval_secs.max(1)),
    );

    let state = AppState::new(controller, sessions, warnings);
    let result = http_server::run_server(state, config.http_addr, shutdown_signal()).await;

    sweeper.abort();
    if let Err(e) = &result {
        error!(error = %e, "HTTP server failed");
    }

    info!("finchat daemon shutting down");
    result
}

/// Periodically drop sessions that have been idle past their TTL
fn spawn_session_sweeper(
    sessions: SessionStoreRef,
    every: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            match sessions.cleanup_expired_sessions().await {
                Ok(_) => {
                    if let Ok(active) = sessions.list_sessions().await {
                        debug!(active = active.len(), "Session sweep complete");
                    }
                }
                Err(e) => warn!(error = %e, "Session sweep failed"),
            }
        }
    })
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
