//! Omniretail server entry point.

use anyhow::{bail, Context, Result};
use omniretail::config::{OrchestratorConfig, DEFAULT_CONFIG_FILE};
use omniretail::events::LoggingEventSink;
use omniretail::orchestrator::OrchestratorBuilder;
use omniretail_server::cli::Args;
use omniretail_server::{serve, AppState};
use std::path::Path;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse_args();

    // --init-config needs no logging
    if args.init_config {
        return handle_init_config(&args);
    }

    init_logging(&args)?;
    info!("omniretail-server v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&args)?;

    serve(AppState::pending(), args.listen, || {
        let orchestrator = OrchestratorBuilder::from_config(&config)?
            .event_sink(Arc::new(LoggingEventSink::debug()))
            .build();
        Ok(orchestrator)
    })
    .await
}

/// Writes the example configuration to `--config` or `omniretail.toml`.
fn handle_init_config(args: &Args) -> Result<()> {
    let path = args
        .config
        .as_deref()
        .unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));

    if path.exists() {
        bail!("{} already exists. Remove it first or edit it manually.", path.display());
    }

    let content = OrchestratorConfig::default_toml()?;
    std::fs::write(path, content)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    println!("Created {} with example settings.", path.display());
    Ok(())
}

fn load_config(args: &Args) -> Result<OrchestratorConfig> {
    let mut config = match &args.config {
        Some(path) => OrchestratorConfig::load(path)?,
        None => OrchestratorConfig::load_default()?.unwrap_or_default(),
    };
    config.apply_env();

    info!(
        providers = ?config.providers.configured(),
        generation = config.synthesis.api_key().is_some(),
        "Configuration loaded"
    );
    Ok(config)
}

/// `RUST_LOG` wins; otherwise `info`.
fn init_logging(args: &Args) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    let installed = if args.log_json {
        builder.json().try_init()
    } else {
        builder.compact().try_init()
    };
    installed.map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
