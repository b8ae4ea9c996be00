//! # engine::consumer
//!
//! **Stream Consumer**: one [`PartitionWorker`] per input partition.
//!
//! ## Per-record flow
//! ```text
//! 1. receive (bounded by receive_timeout, interruptible by shutdown)
//! 2. decode            → malformed: warn, commit, next
//! 3. window.observe    → lazily creates the instrument's window
//! 4. if RSI ready      → publish (retry/backoff)
//!                         ├─ ok        → commit
//!                         └─ exhausted → hold the event, wait, publish again
//! 5. commit offset
//! ```
//!
//! Records are handled strictly one at a time.  Shutdown is only observed
//! while waiting for a record or backing off, never in the middle of a
//! window update.
//!
//! ## Held events
//! A price is folded into its window exactly once per process.  While the
//! output topic is down the computed event is kept and re-sent, and the
//! record's offset stays uncommitted.  Only a restart replays the record,
//! and then into a fresh window.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::broker::{Delivery, PartitionStream, Record};
use crate::config::EngineConfig;
use crate::engine::publisher::StreamPublisher;
use crate::engine::shutdown_requested;
use crate::engine::stats::EngineStats;
use crate::engine::window::Windows;
use crate::error::{EngineError, EngineResult};
use crate::models::{RsiEvent, TradeEvent};

// ─── Outcome ──────────────────────────────────────────────────────────────────

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Malformed; skipped and committed.
    Skipped,
    /// Window still has fewer than 15 prices.
    WarmingUp,
    /// RSI computed and published.
    Emitted(RsiEvent),
}

// ─── PartitionWorker ──────────────────────────────────────────────────────────

pub struct PartitionWorker {
    stream: Box<dyn PartitionStream>,
    windows: Windows,
    publisher: Arc<StreamPublisher>,
    stats: Arc<EngineStats>,
    config: EngineConfig,
    shutdown: watch::Receiver<bool>,
}

impl PartitionWorker {
    pub fn new(
        stream: Box<dyn PartitionStream>,
        windows: Windows,
        publisher: Arc<StreamPublisher>,
        stats: Arc<EngineStats>,
        config: EngineConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            stream,
            windows,
            publisher,
            stats,
            config,
            shutdown,
        }
    }

    pub fn partition(&self) -> u32 {
        self.stream.partition()
    }

    /// Consume until shutdown.  Hands the windows back so the coordinator
    /// keeps ownership of them after the worker is gone.
    pub async fn run(mut self) -> EngineResult<Windows> {
        let partition = self.partition();
        let timeout = self.config.receive_timeout;
        let mut failures: u32 = 0;

        info!(partition, topic = %self.stream.topic(), "▶️ Partition worker started");

        loop {
            let received = tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => break,
                received = tokio::time::timeout(timeout, self.stream.next()) => received,
            };

            let record = match received {
                Ok(Ok(record)) => {
                    failures = 0;
                    record
                }
                Ok(Err(e)) => {
                    let err = EngineError::from(e);
                    if !err.is_retryable() {
                        error!(partition, error = %err, "❌ Partition stream failed");
                        return Err(err);
                    }
                    failures = failures.saturating_add(1);
                    let delay = self.config.backoff_for(failures);
                    warn!(partition, error = %err, delay = ?delay, "⚠️ Receive failed, backing off");
                    if self.pause(delay).await {
                        break;
                    }
                    continue;
                }
                Err(_) => {
                    debug!(partition, after = ?timeout, "No records within receive timeout");
                    continue;
                }
            };

            match self.process(record).await {
                Ok(_) => {}
                Err(EngineError::Shutdown) => break,
                Err(e) => {
                    error!(partition, error = %e, "❌ Partition worker stopping");
                    return Err(e);
                }
            }
        }

        info!(partition, "⏹️ Partition worker stopped");
        Ok(self.windows)
    }

    /// Handle one record end to end, including its commit.
    pub async fn process(&mut self, record: Record) -> EngineResult<Outcome> {
        EngineStats::incr(&self.stats.consumed);
        let (partition, offset) = (record.partition, record.offset);

        // ── 1. Decode ─────────────────────────────────────────────────────────
        let trade = match TradeEvent::decode(&record.payload) {
            Ok(trade) => trade,
            Err(e) => {
                EngineStats::incr(&self.stats.malformed);
                warn!(partition, offset, key = %record.key, error = %e, "⚠️ Malformed trade event skipped");
                self.commit(offset).await;
                return Ok(Outcome::Skipped);
            }
        };

        // ── 2. Window + calculator ────────────────────────────────────────────
        let observation = self.windows.observe(&trade.token_address, trade.price).await;
        if observation.new_instrument {
            EngineStats::incr(&self.stats.instruments);
            info!(
                partition,
                instrument = %trade.token_address,
                name       = %trade.token_name,
                "🆕 Tracking new instrument"
            );
        }

        let Some(rsi) = observation.rsi else {
            debug!(partition, offset, instrument = %trade.token_address, "Warming up");
            self.commit(offset).await;
            return Ok(Outcome::WarmingUp);
        };

        // ── 3. Publish ────────────────────────────────────────────────────────
        let event = RsiEvent::from_trade(&trade, rsi);
        self.publish_held(&event, offset).await?;
        EngineStats::incr(&self.stats.emitted);

        // ── 4. Commit ─────────────────────────────────────────────────────────
        self.commit(offset).await;
        Ok(Outcome::Emitted(event))
    }

    /// Publish `event` until the broker acknowledges it.  Each exhausted retry
    /// budget is followed by a pause of `retry_backoff_max`; shutdown during
    /// that pause gets one last attempt.
    async fn publish_held(&mut self, event: &RsiEvent, offset: u64) -> EngineResult<Delivery> {
        let partition = self.stream.partition();
        loop {
            let err = match self.publisher.publish(event, &mut self.shutdown).await {
                Ok(delivery) => return Ok(delivery),
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e),
            };

            EngineStats::incr(&self.stats.publish_failures);
            error!(
                partition,
                offset,
                instrument = %event.token_address,
                error      = %err,
                "❌ Publish retries exhausted, holding event and offset"
            );
            if self.pause(self.config.retry_backoff_max).await {
                return self.publisher.drain(event).await;
            }
        }
    }

    /// A failed commit is not fatal: the record was handled, and the next
    /// successful commit covers it.  Worst case it is redelivered after restart.
    async fn commit(&mut self, offset: u64) {
        if let Err(e) = self.stream.commit(offset).await {
            warn!(partition = self.stream.partition(), offset, error = %e, "⚠️ Offset commit failed");
        }
    }

    /// Sleep for `delay`; returns `true` if shutdown arrived first.
    async fn pause(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            _ = shutdown_requested(&mut self.shutdown) => true,
        }
    }
}
