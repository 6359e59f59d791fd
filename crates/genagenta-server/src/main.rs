//! genagenta-server - HTTP server for the GenAgenTa CRM assistant

mod config;
mod prompt;
mod routes;
mod state;
mod store;
mod tools;

use std::sync::Arc;

use clap::Parser;
use genagenta_agent::{Agent, ContextManager};
use genagenta_ai::create_provider;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;
use crate::store::MemoryStore;
use crate::tools::Sandbox;

/// GenAgenTa assistant server
#[derive(Parser, Debug)]
#[command(name = "genagenta-server")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Bind address (overrides the config file)
    #[arg(short, long)]
    bind: Option<String>,

    /// Provider (openai, google; overrides the config file)
    #[arg(short, long)]
    provider: Option<String>,

    /// Model identifier (overrides the config file)
    #[arg(short, long)]
    model: Option<String>,

    /// Sandbox directory for the assistant's file tools
    #[arg(long)]
    sandbox_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("genagenta_server=info,tower_http=info")),
        )
        .init();

    let args = Args::parse();
    let mut config = Config::load();
    if let Some(bind) = args.bind {
        config.bind_addr = bind;
    }
    if let Some(provider) = args.provider {
        config.provider = provider;
    }
    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(dir) = args.sandbox_dir {
        config.sandbox_dir = Some(dir);
    }

    let kind = config.provider_kind()?;
    let api_key = config.api_key(kind)?;
    let provider = create_provider(kind, api_key, config.model.clone(), config.base_url.clone());

    let sandbox_dir = config
        .sandbox_dir
        .clone()
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| Config::config_dir().join("sandbox"));
    std::fs::create_dir_all(&sandbox_dir)?;
    let sandbox = Arc::new(Sandbox::new(&sandbox_dir)?);

    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(tools::build_registry(
        store,
        sandbox,
        &config.geocode_base_url,
    ));

    let agent = Agent::new(
        provider,
        registry,
        ContextManager::new(config.context_config()),
        config.agent_config(),
    );
    let state = AppState::new(agent, config.prompt_template());

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!(
        addr = %config.bind_addr,
        provider = kind.name(),
        model = %config.model,
        "genagenta-server listening"
    );
    axum::serve(listener, routes::router(state)).await?;

    Ok(())
}
