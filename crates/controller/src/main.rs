//! ferrostor controller daemon.

use anyhow::{Context, Result};
use clap::Parser;
use ferrostor_controller::objects::CoreObjects;
use ferrostor_controller::{CtrlState, create_router};
use ferrostor_core::config::AppConfig;
use figment::Figment;
use figment::providers::{Env, Format, Toml};
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// ferrostor - storage cluster controller
#[derive(Parser, Debug)]
#[command(name = "ferrostord")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(
        short,
        long,
        env = "FERROSTOR_CONFIG",
        default_value = "config/controller.toml"
    )]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("ferrostor v{}", env!("CARGO_PKG_VERSION"));

    // The file is optional; every setting has a default and can come from the environment.
    let mut figment = Figment::new();
    if std::path::Path::new(&args.config).exists() {
        tracing::info!(config_path = %args.config, "Loading configuration from file");
        figment = figment.merge(Toml::file(&args.config));
    } else {
        tracing::info!(config_path = %args.config, "No config file found, using defaults and environment");
    }
    let config: AppConfig = figment
        .merge(Env::prefixed("FERROSTOR_").split("__"))
        .extract()
        .context("failed to load configuration")?;
    config
        .validate()
        .map_err(|e| anyhow::anyhow!(e))
        .context("invalid configuration")?;

    let backend = ferrostor_metadata::from_config(&config.metadata)
        .await
        .context("failed to initialize metadata backend")?;
    backend
        .migrate()
        .await
        .context("failed to migrate metadata")?;
    if backend
        .recover()
        .await
        .context("failed to recover interrupted transaction")?
    {
        tracing::warn!(backend = %backend.kind(), "rolled back a transaction interrupted by a crash");
    }

    let objects = CoreObjects::load(backend.as_ref())
        .await
        .context("failed to load object model")?;

    ferrostor_controller::metrics::register_metrics();
    tracing::info!("Prometheus metrics registered");

    let state = CtrlState::new(config, backend, objects).context("failed to build controller state")?;
    tracing::info!(
        port_range_start = state.config.shipping.port_range_start,
        port_range_end = state.config.shipping.port_range_end,
        ports_in_use = state.ports.allocated_count(),
        "backup shipping ports ready"
    );

    let addr: SocketAddr = state
        .config
        .controller
        .bind
        .parse()
        .context("invalid bind address")?;
    let app = create_router(state);

    tracing::info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for shutdown signal");
            }
            tracing::info!("shutting down");
        })
        .await?;

    Ok(())
}
