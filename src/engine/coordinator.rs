//! # engine::coordinator
//!
//! **Engine Coordinator**: startup, one worker per partition, graceful
//! shutdown, and the restart contract.
//!
//! ```text
//!  Engine::run(shutdown)
//!     │
//!     ├─ ensure_topic(input, output)  ┐
//!     ├─ assign(input, group)         ┘ failure here → EngineError::Config, nothing spawned
//!     │
//!     ├─ spawn PartitionWorker × partitions ──▶ StreamPublisher ──▶ output topic
//!     ├─ spawn stats reporter (optional)
//!     │
//!     └─ wait: external shutdown, or first worker failure
//!           → signal all workers → join → EngineReport { windows, stats }
//! ```
//!
//! Windows live in the coordinator's hands: workers borrow them for the run
//! and return them on exit.  There is no process-wide store, so any number of
//! engines can run side by side (one per test, for instance).
//!
//! ## Restart
//! Build a new `Engine` on the same broker.  Every partition resumes from the
//! group's committed offset; every window starts empty and needs 15 fresh
//! prices before that instrument emits again.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::broker::{Broker, PartitionStream};
use crate::config::{EngineConfig, WindowMode};
use crate::engine::consumer::PartitionWorker;
use crate::engine::publisher::StreamPublisher;
use crate::engine::stats::{self, EngineStats, StatsSnapshot};
use crate::engine::window::{SharedWindowStore, WindowStore, Windows};
use crate::engine::shutdown_requested;
use crate::error::{EngineError, EngineResult};

/// What an engine leaves behind after a clean shutdown.
#[derive(Debug)]
pub struct EngineReport {
    pub windows: WindowStore,
    pub stats: StatsSnapshot,
}

pub struct Engine {
    config: EngineConfig,
    broker: Arc<dyn Broker>,
    stats: Arc<EngineStats>,
    member_id: Uuid,
}

impl Engine {
    pub fn new(config: EngineConfig, broker: Arc<dyn Broker>) -> Self {
        Self {
            config,
            broker,
            stats: EngineStats::new(),
            member_id: Uuid::new_v4(),
        }
    }

    /// Live counters; stays valid after `run` returns.
    pub fn stats(&self) -> Arc<EngineStats> {
        Arc::clone(&self.stats)
    }

    /// Connect to the broker and take the group's partitions.  Any failure is
    /// fatal and leaves nothing running.
    pub async fn start(&self) -> EngineResult<Vec<Box<dyn PartitionStream>>> {
        self.config
            .validate()
            .map_err(|e| EngineError::Config(format!("{e:#}")))?;

        for topic in [&self.config.input_topic, &self.config.output_topic] {
            self.broker.ensure_topic(topic).await.map_err(|e| {
                EngineError::Config(format!("cannot prepare topic '{topic}': {e}"))
            })?;
        }

        let streams = self
            .broker
            .assign(&self.config.input_topic, &self.config.consumer_group)
            .await
            .map_err(|e| {
                EngineError::Config(format!(
                    "cannot join consumer group '{}': {e}",
                    self.config.consumer_group
                ))
            })?;

        if streams.is_empty() {
            return Err(EngineError::Config(format!(
                "no partitions assigned on '{}'",
                self.config.input_topic
            )));
        }
        Ok(streams)
    }

    /// Run until `shutdown` flips to `true` (or its sender drops), then drain
    /// and return the final windows.  A worker failing fatally stops the
    /// whole engine and is returned as the error.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> EngineResult<EngineReport> {
        let streams = self.start().await?;

        info!(
            member_id  = %self.member_id,
            group      = %self.config.consumer_group,
            input      = %self.config.input_topic,
            output     = %self.config.output_topic,
            partitions = streams.len(),
            mode       = %self.config.window_mode,
            "🚀 RSI engine started"
        );

        let (stop_tx, stop_rx) = watch::channel(false);
        let publisher = Arc::new(StreamPublisher::new(
            Arc::clone(&self.broker),
            &self.config,
            Arc::clone(&self.stats),
        ));
        let shared = match self.config.window_mode {
            WindowMode::Shared => Some(SharedWindowStore::new()),
            WindowMode::Partitioned => None,
        };

        let mut workers = JoinSet::new();
        for stream in streams {
            let windows = match &shared {
                Some(store) => Windows::Shared(store.clone()),
                None => Windows::Owned(WindowStore::new()),
            };
            let worker = PartitionWorker::new(
                stream,
                windows,
                Arc::clone(&publisher),
                Arc::clone(&self.stats),
                self.config.clone(),
                stop_rx.clone(),
            );
            workers.spawn(worker.run());
        }

        if let Some(interval) = self.config.stats_interval {
            tokio::spawn(stats::report_periodically(
                Arc::clone(&self.stats),
                interval,
                stop_rx.clone(),
            ));
        }

        self.stats.running.store(true, Ordering::Relaxed);

        // ── Supervise ─────────────────────────────────────────────────────────
        let mut windows = WindowStore::new();
        let mut failure: Option<EngineError> = None;
        let mut stopping = false;

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown), if !stopping => {
                    info!("🛑 Shutdown requested, draining workers");
                    stopping = true;
                    stop_tx.send_replace(true);
                }
                joined = workers.join_next() => {
                    let Some(joined) = joined else { break };
                    match joined {
                        Ok(Ok(returned)) => {
                            if let Some(store) = returned.into_owned() {
                                windows.merge(store);
                            }
                        }
                        Ok(Err(e)) => {
                            error!(error = %e, "❌ Worker failed, stopping engine");
                            failure.get_or_insert(e);
                        }
                        Err(e) => {
                            error!(error = %e, "❌ Worker task aborted, stopping engine");
                            failure.get_or_insert(EngineError::Config(format!("worker task aborted: {e}")));
                        }
                    }
                    if failure.is_some() && !stopping {
                        stopping = true;
                        stop_tx.send_replace(true);
                    }
                }
            }
        }

        stop_tx.send_replace(true);
        self.stats.running.store(false, Ordering::Relaxed);

        if let Some(store) = shared {
            windows = store.to_store().await;
        }

        if let Some(e) = failure {
            return Err(e);
        }

        let stats = self.stats.snapshot();
        if stats.publish_failures > 0 {
            warn!(
                publish_failures = stats.publish_failures,
                "Engine stopped after publish outages; held events were re-sent"
            );
        }
        info!(
            instruments = windows.len(),
            consumed    = stats.consumed,
            emitted     = stats.emitted,
            "✅ RSI engine stopped cleanly"
        );

        Ok(EngineReport { windows, stats })
    }
}
