//! wardgate binary: wires the collaborators together and serves the HTTP
//! ingress surface.

use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use wardgate::config::GatewayConfig;
use wardgate::events::InMemoryEventLog;
use wardgate::metrics::GatewayMetrics;
use wardgate::model::{HttpModelClient, ModelConfig};
use wardgate::pipeline::Gateway;
use wardgate::policy::PolicyStore;
use wardgate::registry::{InMemoryRegistry, Principal};
use wardgate::retrieval::InMemoryRetrievalStore;
use wardgate::server::{AppState, serve};

/// Command-line configuration for the gateway server.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Port to listen on
    #[arg(short, long, env = "WARDGATE_PORT", default_value = "8001")]
    port: u16,

    /// Bind address
    #[arg(short, long, env = "WARDGATE_BIND", default_value = "127.0.0.1")]
    bind: String,

    /// Seed a demo principal and corpus for local exploration
    #[arg(long)]
    demo: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = GatewayConfig::from_env();

    let registry = Arc::new(InMemoryRegistry::new());
    let policies = Arc::new(PolicyStore::with_defaults(config.ingestion_threshold));
    let store = Arc::new(InMemoryRetrievalStore::new());
    let events = Arc::new(InMemoryEventLog::new());
    let metrics = Arc::new(GatewayMetrics::new());
    let model = Arc::new(HttpModelClient::new(ModelConfig::from_env())?);

    if cli.demo {
        seed_demo(&registry, &store, &config);
    }

    let gateway = Arc::new(Gateway::new(
        registry,
        policies,
        model,
        store.clone(),
        events.clone(),
        events.clone(),
        metrics.clone(),
        config.clone(),
    ));

    let state = AppState {
        gateway,
        store,
        events,
        metrics,
        config,
    };

    let addr = format!("{}:{}", cli.bind, cli.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!(addr = %addr, demo = cli.demo, "wardgate starting");

    let shutdown = CancellationToken::new();
    let shutdown_signal = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received SIGINT, shutting down");
                shutdown_signal.cancel();
            }
            Err(e) => error!(error = %e, "Failed to listen for SIGINT"),
        }
    });

    #[cfg(unix)]
    {
        let shutdown_sigterm = shutdown.clone();
        tokio::spawn(async move {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    sigterm.recv().await;
                    info!("Received SIGTERM, shutting down");
                    shutdown_sigterm.cancel();
                }
                Err(e) => error!(error = %e, "Failed to listen for SIGTERM"),
            }
        });
    }

    serve(state, listener, shutdown).await?;
    Ok(())
}

/// Seed a demo principal and a small trusted corpus.
fn seed_demo(registry: &InMemoryRegistry, store: &InMemoryRetrievalStore, config: &GatewayConfig) {
    let mut demo = Principal::new("demo", "demo-agent");
    demo.description = Some("Demo principal for local exploration".to_string());
    demo.owner = Some("platform-team".to_string());
    demo.environment = "development".to_string();
    demo.allowed_tools.insert("calculator".to_string());
    registry.upsert(demo);

    for (content, source) in [
        (
            "Refund policy: purchases can be returned within 30 days with receipt.",
            "internal_docs",
        ),
        (
            "Onboarding checklist: request accounts, order a laptop, book orientation.",
            "company_wiki",
        ),
    ] {
        let report = store.screen_and_ingest(content, source, config);
        if !report.is_accepted() {
            error!(source = source, "Demo document unexpectedly rejected");
        }
    }

    info!("Demo principal 'demo' and corpus seeded");
}
