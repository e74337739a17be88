//! shopsim: instrumented transaction simulator.
//!
//! Simulates shop transactions (listing, orders, checkout) and emits the
//! correlated telemetry of a real service, built with Tokio and Axum.
//!
//! # Architecture Overview
//!
//! ```text
//!                    ┌──────────────────────────────────────────────┐
//!                    │                  SHOPSIM                      │
//!                    │                                               │
//!   HTTP Request     │  ┌─────────┐      ┌───────────────────────┐  │
//!   ─────────────────┼─▶│  http   │─────▶│   TransactionEngine   │  │
//!                    │  │ server  │      │  (flows, span trees)  │  │
//!                    │  └─────────┘      └──────────┬────────────┘  │
//!                    │                              │               │
//!                    │        ┌─────────────────────┼─────────────┐ │
//!                    │        ▼                     ▼             ▼ │
//!                    │  ┌──────────┐         ┌──────────┐  ┌──────┐ │
//!                    │  │ metrics  │         │  spans   │  │ logs │ │
//!                    │  └────┬─────┘         └────┬─────┘  └──┬───┘ │
//!                    │       │   ┌────────────────┘           │     │
//!                    │       ▼   ▼                            ▼     │
//!                    │  ┌────────────────────────────────────────┐  │
//!                    │  │   telemetry sink (bounded buffer →     │  │
//!                    │  │   stdout JSON lines / discard)         │  │
//!                    │  └────────────────────────────────────────┘  │
//!                    └──────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use shopsim::config::{self, ConfigError, ExporterKind, SimConfig};
use shopsim::sim::{RandomnessSource, SimRng};
use shopsim::telemetry::sink::{BufferedSink, NullSink, StdoutSink, TelemetrySink};
use shopsim::{Catalog, HttpServer, ServiceIdentity, Shutdown, TelemetryContext, TransactionEngine};

#[derive(Parser)]
#[command(name = "shopsim")]
#[command(about = "Transaction simulator emitting correlated spans, metrics, and logs")]
struct Args {
    /// Path to a TOML config file; defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener bind address from the config.
    #[arg(short, long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => config::load_config(path)?,
        None => SimConfig::default(),
    };
    if let Some(listen) = args.listen {
        config.listener.bind_address = listen;
        config::validation::validate_config(&config).map_err(ConfigError::Validation)?;
    }

    init_subscriber(&config);

    tracing::info!(
        bind_address = %config.listener.bind_address,
        exporter = ?config.telemetry.exporter,
        seed = ?config.simulation.seed,
        payment_failure_probability = config.simulation.payment_failure_probability,
        "Configuration loaded"
    );

    if config.telemetry.metrics_enabled {
        if let Ok(addr) = config.telemetry.metrics_address.parse() {
            shopsim::telemetry::metrics::init_prometheus(addr);
        } else {
            tracing::error!(
                metrics_address = %config.telemetry.metrics_address,
                "Failed to parse metrics address"
            );
        }
    }

    let inner: Arc<dyn TelemetrySink> = match config.telemetry.exporter {
        ExporterKind::Stdout => Arc::new(StdoutSink),
        ExporterKind::None => Arc::new(NullSink),
    };
    let (sink, sink_worker) = BufferedSink::spawn(inner, config.telemetry.queue_capacity);

    let service = ServiceIdentity::new(
        &config.telemetry.service_name,
        &config.telemetry.service_version,
        &config.telemetry.environment,
    );
    let telemetry = Arc::new(TelemetryContext::new(service, sink.clone()));
    let catalog = Arc::new(Catalog::builtin());
    let rng: Arc<dyn RandomnessSource> = match config.simulation.seed {
        Some(seed) => Arc::new(SimRng::with_seed(seed)),
        None => Arc::new(SimRng::new()),
    };
    let engine = Arc::new(TransactionEngine::new(
        telemetry,
        catalog,
        rng,
        config.simulation.clone(),
    ));

    let listener = TcpListener::bind(&config.listener.bind_address).await?;
    tracing::info!(
        address = %listener.local_addr()?,
        service = %config.telemetry.service_name,
        "Listening for connections"
    );

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signals();

    let server = HttpServer::new(config, engine.clone());
    server.run(listener, shutdown.subscribe()).await?;

    // Stop producing, then give the sink worker a bounded window to drain
    // whatever the in-flight invocations exported.
    drop(engine);
    drop(sink);
    if tokio::time::timeout(Duration::from_secs(5), sink_worker)
        .await
        .is_err()
    {
        tracing::warn!("Telemetry drain timed out");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_subscriber(config: &SimConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "shopsim=info,tower_http=info".into());

    if config.telemetry.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}
