//! # engine::publisher
//!
//! **Stream Publisher**: encodes an [`RsiEvent`] and appends it to the output
//! topic, keyed by instrument.
//!
//! Every attempt is bounded by `publish_timeout`.  Transient failures are
//! retried with exponential backoff up to `publish_max_retries`; after that the
//! caller gets [`EngineError::PublishExhausted`] and must not commit the input
//! offset.  An event is either acknowledged whole or not at all.

use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::broker::{Broker, Delivery};
use crate::config::EngineConfig;
use crate::engine::shutdown_requested;
use crate::engine::stats::EngineStats;
use crate::error::{EngineError, EngineResult};
use crate::models::RsiEvent;

pub struct StreamPublisher {
    broker: Arc<dyn Broker>,
    config: EngineConfig,
    stats: Arc<EngineStats>,
}

impl StreamPublisher {
    pub fn new(broker: Arc<dyn Broker>, config: &EngineConfig, stats: Arc<EngineStats>) -> Self {
        Self {
            broker,
            config: config.clone(),
            stats,
        }
    }

    pub fn topic(&self) -> &str {
        &self.config.output_topic
    }

    /// A single bounded publish attempt.
    pub async fn try_publish(&self, key: &str, payload: Vec<u8>) -> EngineResult<Delivery> {
        let after = self.config.publish_timeout;
        let publish = self.broker.publish(&self.config.output_topic, key, payload);
        match tokio::time::timeout(after, publish).await {
            Ok(Ok(delivery)) => Ok(delivery),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => Err(EngineError::Timeout { op: "publish", after }),
        }
    }

    /// Publish with retry.  Shutdown during a backoff gets one last attempt
    /// through [`StreamPublisher::drain`].
    pub async fn publish(
        &self,
        event: &RsiEvent,
        shutdown: &mut watch::Receiver<bool>,
    ) -> EngineResult<Delivery> {
        let payload = event.encode()?;
        let mut attempt: u32 = 0;

        loop {
            let err = match self.try_publish(&event.token_address, payload.clone()).await {
                Ok(delivery) => {
                    debug!(
                        instrument = %event.token_address,
                        partition  = delivery.partition,
                        offset     = delivery.offset,
                        rsi        = event.rsi,
                        "RSI event published"
                    );
                    return Ok(delivery);
                }
                Err(e) => e,
            };

            if !err.is_retryable() {
                return Err(err);
            }
            if attempt >= self.config.publish_max_retries {
                return Err(EngineError::PublishExhausted {
                    attempts: attempt + 1,
                    last: err.to_string(),
                });
            }

            attempt += 1;
            EngineStats::incr(&self.stats.publish_retries);
            let delay = self.config.backoff_for(attempt);
            warn!(
                instrument = %event.token_address,
                attempt,
                max        = self.config.publish_max_retries,
                delay      = ?delay,
                error      = %err,
                "⚠️ Publish failed, retrying"
            );

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(shutdown) => return self.drain(event).await,
            }
        }
    }

    /// One final bounded attempt for an in-flight event once shutdown is
    /// requested.  Failure yields [`EngineError::Shutdown`] and the input
    /// offset stays uncommitted.
    pub async fn drain(&self, event: &RsiEvent) -> EngineResult<Delivery> {
        let payload = event.encode()?;
        match self.try_publish(&event.token_address, payload).await {
            Ok(delivery) => {
                info!(instrument = %event.token_address, "📤 In-flight event drained on shutdown");
                Ok(delivery)
            }
            Err(e) => {
                warn!(
                    instrument = %event.token_address,
                    error      = %e,
                    "In-flight event not published before shutdown; offset left uncommitted"
                );
                Err(EngineError::Shutdown)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};

    use super::*;
    use crate::broker::MemoryBroker;

    fn event() -> RsiEvent {
        RsiEvent {
            token_address: "0xabc".into(),
            token_name: "ABC".into(),
            rsi: 65.0,
            current_price: 16.0,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 14).unwrap(),
        }
    }

    async fn publisher(broker: &MemoryBroker, retries: u32, backoff_ms: u64) -> StreamPublisher {
        let config = EngineConfig {
            publish_max_retries: retries,
            retry_backoff: Duration::from_millis(backoff_ms),
            retry_backoff_max: Duration::from_millis(backoff_ms * 4),
            ..EngineConfig::default()
        };
        broker.ensure_topic(&config.output_topic).await.unwrap();
        StreamPublisher::new(Arc::new(broker.clone()), &config, EngineStats::new())
    }

    #[tokio::test]
    async fn test_publish_keys_by_instrument() {
        let broker = MemoryBroker::new(4);
        let publisher = publisher(&broker, 0, 1).await;
        let (_tx, mut rx) = watch::channel(false);

        let delivery = publisher.publish(&event(), &mut rx).await.unwrap();
        assert_eq!(delivery.partition, broker.partition_for("0xabc"));

        let records = broker.records(publisher.topic()).await;
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].key, "0xabc");
    }

    #[tokio::test]
    async fn test_retries_then_gives_up() {
        let broker = MemoryBroker::new(1);
        let publisher = publisher(&broker, 3, 1).await;
        broker.set_available(false);
        let (_tx, mut rx) = watch::channel(false);

        let err = publisher.publish(&event(), &mut rx).await.unwrap_err();
        assert!(matches!(err, EngineError::PublishExhausted { attempts: 4, .. }));
        assert_eq!(publisher.stats.snapshot().publish_retries, 3);
    }

    #[tokio::test]
    async fn test_shutdown_interrupts_backoff() {
        let broker = MemoryBroker::new(1);
        let publisher = publisher(&broker, 5, 60_000).await;
        broker.set_available(false);
        let (tx, mut rx) = watch::channel(false);

        let stop = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            tx.send_replace(true);
            tx
        });
        let err = publisher.publish(&event(), &mut rx).await.unwrap_err();
        assert!(matches!(err, EngineError::Shutdown));
        drop(stop.await);
    }

    #[tokio::test]
    async fn test_shutdown_drains_in_flight_event() {
        let broker = MemoryBroker::new(1);
        let publisher = publisher(&broker, 5, 60_000).await;
        broker.set_available(false);
        let (tx, mut rx) = watch::channel(false);

        let recover = {
            let broker = broker.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                broker.set_available(true);
                tx.send_replace(true);
                tx
            })
        };
        let delivery = publisher.publish(&event(), &mut rx).await.unwrap();
        assert_eq!(delivery.offset, 0);
        assert_eq!(broker.records(publisher.topic()).await.len(), 1);
        drop(recover.await);
    }
}
