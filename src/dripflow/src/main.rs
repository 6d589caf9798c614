//! DripFlow — multi-tenant drip campaign execution engine.
//!
//! Main entry point: wires stores, runner, and trigger dispatcher, then
//! serves the HTTP trigger surface.

use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{error, info};

use drip_api::{ApiServer, AppState};
use drip_core::config::AppConfig;
use drip_core::dispatch::logging_dispatcher;
use drip_engine::{
    demo, CampaignRunner, CampaignStore, ExecutionLog, MembershipStore, StepStore,
    TriggerDispatcher,
};

#[derive(Parser, Debug)]
#[command(name = "dripflow")]
#[command(about = "Multi-tenant drip campaign execution engine")]
#[command(version)]
struct Cli {
    /// Node identifier (overrides config)
    #[arg(long, env = "DRIPFLOW__NODE_ID")]
    node_id: Option<String>,

    /// HTTP port (overrides config)
    #[arg(long, env = "DRIPFLOW__API__HTTP_PORT")]
    http_port: Option<u16>,

    /// Shared secret for the periodic trigger endpoint (overrides config)
    #[arg(long, env = "DRIPFLOW__ENGINE__TRIGGER_SECRET")]
    trigger_secret: Option<String>,

    /// Seed demo tenants and campaigns on startup
    #[arg(long, default_value_t = false)]
    seed_demo: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dripflow=info,tower_http=info".into()),
        )
        .json()
        .init();

    let cli = Cli::parse();

    info!("DripFlow starting up");

    // Load configuration
    let mut config = AppConfig::load().unwrap_or_else(|e| {
        tracing::warn!(error = %e, "Failed to load config, using defaults");
        AppConfig::default()
    });

    // Apply CLI overrides
    if let Some(node_id) = cli.node_id {
        config.node_id = node_id;
    }
    if let Some(port) = cli.http_port {
        config.api.http_port = port;
    }
    if let Some(secret) = cli.trigger_secret {
        config.engine.trigger_secret = secret;
    }

    info!(
        node_id = %config.node_id,
        http_port = config.api.http_port,
        claim_stale_secs = config.engine.claim_stale_secs,
        dispatch_timeout_ms = config.engine.dispatch_timeout_ms,
        "Configuration loaded"
    );

    // Wire stores and the engine. The mail transport is an external
    // collaborator; without one configured, sends are logged and succeed.
    let campaigns = Arc::new(CampaignStore::new());
    let steps = Arc::new(StepStore::new());
    let memberships = Arc::new(MembershipStore::new());
    let log = Arc::new(ExecutionLog::new());
    let dispatcher = logging_dispatcher();

    let runner = Arc::new(CampaignRunner::new(
        campaigns.clone(),
        steps.clone(),
        memberships,
        log,
        dispatcher,
        config.engine.clone(),
    ));
    let trigger = Arc::new(TriggerDispatcher::new(
        campaigns.clone(),
        runner.clone(),
        Duration::from_secs(config.engine.run_deadline_secs),
    ));

    if cli.seed_demo {
        demo::seed_demo(&campaigns, &steps, &runner);
    }

    let state = AppState {
        trigger,
        runner,
        trigger_secret: config.engine.trigger_secret.clone(),
        node_id: config.node_id.clone(),
        start_time: Instant::now(),
    };
    let api_server = ApiServer::new(config, state);

    // Start metrics exporter
    if let Err(e) = api_server.start_metrics().await {
        error!(error = %e, "Failed to start metrics exporter");
    }

    info!("DripFlow is ready; waiting for trigger invocations");

    // Start HTTP server (blocks until shutdown)
    api_server.start_http().await?;

    Ok(())
}
