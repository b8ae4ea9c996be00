#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::watch;
use tokio::task::JoinHandle;

use rsi_stream::broker::{Broker, Delivery, MemoryBroker, PartitionStream, Record};
use rsi_stream::engine::EngineStats;
use rsi_stream::error::EngineResult;
use rsi_stream::{BrokerError, Engine, EngineConfig, EngineReport};

pub const SAMPLE: [f64; 15] = [
    10.0, 11.0, 10.0, 12.0, 11.0, 13.0, 12.0, 14.0, 13.0, 15.0, 14.0, 16.0, 15.0, 17.0, 16.0,
];

pub fn test_config() -> EngineConfig {
    EngineConfig {
        partitions: 4,
        receive_timeout: Duration::from_millis(50),
        publish_timeout: Duration::from_millis(200),
        publish_max_retries: 2,
        retry_backoff: Duration::from_millis(5),
        retry_backoff_max: Duration::from_millis(20),
        stats_interval: None,
        ..EngineConfig::default()
    }
}

pub fn trade_payload(address: &str, name: &str, price: f64, second: u32) -> Vec<u8> {
    json!({
        "token_address": address,
        "token_name":    name,
        "price":         price,
        "timestamp":     format!("2024-03-01T10:00:{second:02}Z"),
    })
    .to_string()
    .into_bytes()
}

pub async fn publish_trades(broker: &MemoryBroker, topic: &str, address: &str, name: &str, prices: &[f64]) {
    for (i, price) in prices.iter().enumerate() {
        broker
            .publish(topic, address, trade_payload(address, name, *price, i as u32))
            .await
            .unwrap();
    }
}

/// Output-topic messages for one instrument, in publish order.
pub async fn outputs_for(broker: &MemoryBroker, topic: &str, address: &str) -> Vec<Value> {
    broker
        .records(topic)
        .await
        .into_iter()
        .filter(|r| r.key == address)
        .map(|r| serde_json::from_slice(&r.payload).unwrap())
        .collect()
}

/// Poll `cond` every 10ms for up to 5s.
pub async fn eventually<F: Fn() -> bool>(what: &str, cond: F) {
    for _ in 0..500 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for: {what}");
}

/// Poll the group's committed offset until it reaches `target`.
pub async fn committed_reaches(broker: &MemoryBroker, group: &str, topic: &str, partition: u32, target: u64) {
    for _ in 0..500 {
        if broker.committed(group, topic, partition).await >= target {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("committed offset on {topic}/{partition} never reached {target}");
}

pub struct Running {
    pub stats: Arc<EngineStats>,
    pub shutdown: watch::Sender<bool>,
    pub task: JoinHandle<EngineResult<EngineReport>>,
}

impl Running {
    pub async fn stop(self) -> EngineReport {
        self.shutdown.send_replace(true);
        self.task.await.unwrap().unwrap()
    }
}

pub async fn start_engine(config: EngineConfig, broker: Arc<dyn Broker>) -> Running {
    let engine = Engine::new(config, broker);
    let stats = engine.stats();
    let (shutdown, rx) = watch::channel(false);
    let task = tokio::spawn(engine.run(rx));
    eventually("engine running", || stats.snapshot().running).await;
    Running { stats, shutdown, task }
}

/// Wraps a `MemoryBroker` and sabotages publishes to one topic and commits
/// on any stream it hands out.
pub struct FlakyBroker {
    pub inner: MemoryBroker,
    topic: String,
    /// Publishes still to reject with `Unavailable`.
    failures: AtomicU32,
    /// Publishes still to stall far past any publish timeout.
    stalls: AtomicU32,
    /// Commits still to reject with `Unavailable`.
    commit_failures: Arc<AtomicU32>,
}

impl FlakyBroker {
    pub fn new(inner: MemoryBroker, topic: &str) -> Self {
        Self {
            inner,
            topic: topic.to_string(),
            failures: AtomicU32::new(0),
            stalls: AtomicU32::new(0),
            commit_failures: Arc::new(AtomicU32::new(0)),
        }
    }

    pub fn fail_next(&self, n: u32) {
        self.failures.store(n, Ordering::SeqCst);
    }

    pub fn stall_next(&self, n: u32) {
        self.stalls.store(n, Ordering::SeqCst);
    }

    pub fn fail_next_commits(&self, n: u32) {
        self.commit_failures.store(n, Ordering::SeqCst);
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn ensure_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.inner.ensure_topic(topic).await
    }

    async fn assign(&self, topic: &str, group: &str) -> Result<Vec<Box<dyn PartitionStream>>, BrokerError> {
        let streams = self.inner.assign(topic, group).await?;
        Ok(streams
            .into_iter()
            .map(|inner| {
                Box::new(FlakyStream {
                    inner,
                    commit_failures: Arc::clone(&self.commit_failures),
                }) as Box<dyn PartitionStream>
            })
            .collect())
    }

    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>) -> Result<Delivery, BrokerError> {
        if topic == self.topic {
            if Self::take(&self.stalls) {
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if Self::take(&self.failures) {
                return Err(BrokerError::Unavailable("injected failure".into()));
            }
        }
        self.inner.publish(topic, key, payload).await
    }
}

struct FlakyStream {
    inner: Box<dyn PartitionStream>,
    commit_failures: Arc<AtomicU32>,
}

#[async_trait]
impl PartitionStream for FlakyStream {
    fn topic(&self) -> &str {
        self.inner.topic()
    }

    fn partition(&self) -> u32 {
        self.inner.partition()
    }

    async fn next(&mut self) -> Result<Record, BrokerError> {
        self.inner.next().await
    }

    async fn commit(&mut self, offset: u64) -> Result<(), BrokerError> {
        if FlakyBroker::take(&self.commit_failures) {
            return Err(BrokerError::Unavailable("injected commit failure".into()));
        }
        self.inner.commit(offset).await
    }
}
