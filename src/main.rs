//! # rsi-stream: Streaming RSI Engine
//!
//! ```text
//!  stdin (JSON lines) ──▶ trade-events ──▶ [ Engine ] ──▶ rsi-events ──▶ stdout (JSON lines)
//!                                             │
//!                                  GET /health, GET /stats
//! ```
//!
//! ## Environment Variables
//!
//! | Variable     | Default          | Description                         |
//! |--------------|------------------|-------------------------------------|
//! | `BIND_ADDR`  | `0.0.0.0:3000`   | Address the ops server listens on   |
//! | `RUST_LOG`   | `rsi_stream=debug` | Tracing filter                    |
//! | `RSI_*`      | see `config.rs`  | Engine settings                     |

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use rsi_stream::{
    bridge,
    broker::{Broker, MemoryBroker},
    engine::{shutdown_requested, Engine},
    routes, EngineConfig,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging (stderr; stdout carries the RSI stream) ────────
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::from_default_env()
                .add_directive("rsi_stream=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════╗
  ║        RSI-STREAM · Streaming Indicator       ║
  ║   trades in · Wilder RSI(14) · events out     ║
  ╚═══════════════════════════════════════════════╝"#);

    // ── 3. Config (fatal on error) ────────────────────────────────────────────
    let config = EngineConfig::from_env().context("Failed to load config")?;
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()
        .context("BIND_ADDR must be a socket address")?;

    // ── 4. Broker + engine ────────────────────────────────────────────────────
    let broker = MemoryBroker::new(config.partitions);
    let engine = Engine::new(config.clone(), Arc::new(broker.clone()));
    let stats = engine.stats();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let mut engine_task = tokio::spawn(engine.run(shutdown_rx.clone()));

    // ── 5. Collaborators: stdin feeder, stdout relay ──────────────────────────
    {
        let broker = broker.clone();
        let topic = config.input_topic.clone();
        tokio::spawn(async move {
            // topics are idempotent; the feeder may win the race against engine startup
            if let Err(e) = broker.ensure_topic(&topic).await {
                error!(error = %e, "Input feeder could not start");
                return;
            }
            let stdin = BufReader::new(tokio::io::stdin());
            if let Err(e) = bridge::feed_lines(stdin, &broker, &topic).await {
                error!(error = %e, "Input feeder failed");
            }
        });
    }
    {
        let broker = broker.clone();
        let topic = config.output_topic.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = bridge::relay_output(&broker, &topic, tokio::io::stdout(), shutdown).await {
                error!(error = %e, "Output relay failed");
            }
        });
    }

    // ── 6. Ops server ─────────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(?addr, "🩺 Ops server listening");
    {
        let mut shutdown = shutdown_rx.clone();
        let app = routes::router(stats);
        tokio::spawn(async move {
            let serve = axum::serve(listener, app)
                .with_graceful_shutdown(async move { shutdown_requested(&mut shutdown).await });
            if let Err(e) = serve.await {
                error!(error = %e, "Ops server failed");
            }
        });
    }

    // ── 7. Run until Ctrl-C or engine failure ─────────────────────────────────
    let finished = tokio::select! {
        joined = &mut engine_task => Some(joined),
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("🛑 Ctrl-C received");
            None
        }
    };
    shutdown_tx.send_replace(true);
    let outcome = match finished {
        Some(joined) => joined,
        None => engine_task.await,
    };

    let report = outcome.context("Engine task panicked")??;
    info!(
        instruments = report.windows.len(),
        consumed    = report.stats.consumed,
        emitted     = report.stats.emitted,
        malformed   = report.stats.malformed,
        "👋 Bye"
    );
    Ok(())
}
