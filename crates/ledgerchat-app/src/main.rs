//! ledgerchat application binary - composition root.
//!
//! 1. Parse CLI arguments and load configuration from TOML
//! 2. Load account data and seed sessions
//! 3. Load the fee and FAQ knowledge
//! 4. Wire classifier, handlers, composer and optional text backend
//! 5. Answer a single `--ask` question, or serve the HTTP API

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use ledgerchat_api::{start_server, AppState};
use ledgerchat_chat::{backend, ChatOrchestrator, SessionStore};
use ledgerchat_core::config::LedgerConfig;
use ledgerchat_core::types::UserId;
use ledgerchat_store::{Fixture, InMemoryGateway, KnowledgeStore};

use cli::{expand_home, CliArgs};

/// How often expired sessions are swept while serving.
const SESSION_SWEEP: Duration = Duration::from_secs(300);

fn init_tracing(level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level)),
        )
        .init();
}

fn load_fixture(config: &LedgerConfig) -> Result<Fixture, Box<dyn std::error::Error>> {
    match config.data.fixture_path {
        Some(ref path) => Ok(Fixture::load(&expand_home(path))?),
        None => {
            tracing::info!("Using bundled demo accounts");
            Ok(Fixture::demo()?)
        }
    }
}

fn load_knowledge(config: &LedgerConfig) -> Result<KnowledgeStore, Box<dyn std::error::Error>> {
    match config.data.knowledge_path {
        Some(ref path) => Ok(KnowledgeStore::load(&expand_home(path))?),
        None => Ok(KnowledgeStore::with_defaults()),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config.
    let config_file = args.resolve_config_path();
    let mut config = LedgerConfig::load_or_default(&config_file);
    args.apply(&mut config);

    // Tracing.
    init_tracing(&config.general.log_level);
    tracing::info!("Starting ledgerchat v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(path = %config_file.display(), "Configuration loaded");

    // Account data and sessions.
    let fixture = load_fixture(&config)?;
    let gateway = Arc::new(InMemoryGateway::from_fixture(&fixture));
    let sessions = Arc::new(SessionStore::new(config.auth.session_ttl_minutes));
    for seeded in &fixture.sessions {
        sessions.insert(seeded.token.clone(), UserId::new(seeded.user_id.clone()));
    }
    tracing::info!(
        accounts = gateway.account_count(),
        sessions = sessions.len(),
        "Account data ready"
    );

    // Knowledge.
    let knowledge = Arc::new(load_knowledge(&config)?);
    tracing::info!(topics = knowledge.topics().len(), "Knowledge ready");

    // Text backend. A misconfigured backend leaves the narrative composer in charge.
    let text_backend = match backend::from_config(&config.backend) {
        Ok(b) => b,
        Err(e) => {
            tracing::warn!("Text backend disabled: {e}");
            None
        }
    };

    let orchestrator = ChatOrchestrator::build(
        &config,
        gateway,
        knowledge,
        text_backend,
        Arc::clone(&sessions),
    );

    // One-shot mode.
    if let Some(ref question) = args.ask {
        let answer = orchestrator.respond(args.token.as_deref(), question).await;
        if answer.is_success() {
            println!("{}", answer.answer);
            return Ok(());
        }
        eprintln!("{}", answer.answer);
        std::process::exit(1);
    }

    // Expired session sweep.
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP);
        loop {
            interval.tick().await;
            let purged = sessions.purge_expired();
            if purged > 0 {
                tracing::debug!(purged, "Expired sessions purged");
            }
        }
    });

    // === API server ===
    let state = AppState::new(config.clone(), orchestrator);
    if let Err(e) = start_server(&config, state).await {
        tracing::error!("{e}");
        tracing::error!(
            "Try: LEDGERCHAT_PORT={} ledgerchat",
            config.general.port.saturating_add(1)
        );
        return Err(e.into());
    }

    Ok(())
}
