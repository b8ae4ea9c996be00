//! # broker::memory
//!
//! In-process partitioned log with consumer-group offsets.
//!
//! Outlives any engine built on top of it, which is what makes restarts
//! observable: a new engine on the same `MemoryBroker` resumes each partition
//! from the group's committed offset.  `set_available(false)` simulates an
//! outage: every call fails with [`BrokerError::Unavailable`] until re-enabled.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, RwLock};
use tracing::debug;

use super::{Broker, Delivery, PartitionStream, Record};
use crate::error::BrokerError;

/// `(group, topic, partition)` → next offset to read.
type OffsetKey = (String, String, u32);

// ─── Storage ──────────────────────────────────────────────────────────────────

struct Partition {
    log: RwLock<Vec<Record>>,
    /// Number of records in `log`; consumers wait on it.
    high_water: watch::Sender<u64>,
}

impl Partition {
    fn new() -> Self {
        let (high_water, _) = watch::channel(0);
        Self {
            log: RwLock::new(Vec::new()),
            high_water,
        }
    }
}

struct Topic {
    name: String,
    partitions: Vec<Partition>,
}

impl Topic {
    fn partition(&self, index: u32) -> Result<&Partition, BrokerError> {
        self.partitions
            .get(index as usize)
            .ok_or_else(|| BrokerError::UnknownPartition {
                topic: self.name.clone(),
                partition: index,
            })
    }
}

struct BrokerInner {
    partitions_per_topic: u32,
    topics: RwLock<HashMap<String, Arc<Topic>>>,
    offsets: Mutex<HashMap<OffsetKey, u64>>,
    available: AtomicBool,
}

impl BrokerInner {
    fn check_available(&self) -> Result<(), BrokerError> {
        if self.available.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(BrokerError::Unavailable("in-memory broker is offline".into()))
        }
    }

    async fn topic(&self, name: &str) -> Result<Arc<Topic>, BrokerError> {
        let topics = self.topics.read().await;
        topics
            .get(name)
            .cloned()
            .ok_or_else(|| BrokerError::UnknownTopic(name.to_string()))
    }

    async fn committed(&self, group: &str, topic: &str, partition: u32) -> u64 {
        let offsets = self.offsets.lock().await;
        offsets
            .get(&(group.to_string(), topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }
}

// ─── MemoryBroker ─────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct MemoryBroker {
    inner: Arc<BrokerInner>,
}

impl MemoryBroker {
    /// Every topic created through this broker gets `partitions` partitions (min 1).
    pub fn new(partitions: u32) -> Self {
        Self {
            inner: Arc::new(BrokerInner {
                partitions_per_topic: partitions.max(1),
                topics: RwLock::new(HashMap::new()),
                offsets: Mutex::new(HashMap::new()),
                available: AtomicBool::new(true),
            }),
        }
    }

    /// Stable key → partition mapping.
    pub fn partition_for(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % u64::from(self.inner.partitions_per_topic)) as u32
    }

    pub fn set_available(&self, available: bool) {
        self.inner.available.store(available, Ordering::Release);
    }

    /// Next offset `group` will read on `topic`/`partition`.
    pub async fn committed(&self, group: &str, topic: &str, partition: u32) -> u64 {
        self.inner.committed(group, topic, partition).await
    }

    /// Every record on `topic`, partition by partition.  Empty if the topic is unknown.
    pub async fn records(&self, topic: &str) -> Vec<Record> {
        let Ok(topic) = self.inner.topic(topic).await else {
            return Vec::new();
        };
        let mut out = Vec::new();
        for partition in &topic.partitions {
            out.extend(partition.log.read().await.iter().cloned());
        }
        out
    }
}

#[async_trait]
impl Broker for MemoryBroker {
    async fn ensure_topic(&self, topic: &str) -> Result<(), BrokerError> {
        self.inner.check_available()?;

        let mut topics = self.inner.topics.write().await;
        if !topics.contains_key(topic) {
            let partitions = (0..self.inner.partitions_per_topic)
                .map(|_| Partition::new())
                .collect();
            topics.insert(
                topic.to_string(),
                Arc::new(Topic {
                    name: topic.to_string(),
                    partitions,
                }),
            );
            debug!(topic, partitions = self.inner.partitions_per_topic, "Topic created");
        }
        Ok(())
    }

    async fn assign(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Vec<Box<dyn PartitionStream>>, BrokerError> {
        self.inner.check_available()?;
        let topic = self.inner.topic(topic).await?;

        let mut streams: Vec<Box<dyn PartitionStream>> = Vec::with_capacity(topic.partitions.len());
        for (index, partition) in topic.partitions.iter().enumerate() {
            let index = index as u32;
            let position = self.inner.committed(group, &topic.name, index).await;
            streams.push(Box::new(MemoryStream {
                broker: Arc::clone(&self.inner),
                topic: Arc::clone(&topic),
                group: group.to_string(),
                partition: index,
                position,
                high_water: partition.high_water.subscribe(),
            }));
        }
        Ok(streams)
    }

    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: Vec<u8>,
    ) -> Result<Delivery, BrokerError> {
        self.inner.check_available()?;
        let topic = self.inner.topic(topic).await?;
        let index = self.partition_for(key);
        let partition = topic.partition(index)?;

        let mut log = partition.log.write().await;
        let offset = log.len() as u64;
        log.push(Record {
            topic: topic.name.clone(),
            partition: index,
            offset,
            key: key.to_string(),
            payload,
        });
        partition.high_water.send_replace(offset + 1);

        Ok(Delivery {
            partition: index,
            offset,
        })
    }
}

// ─── MemoryStream ─────────────────────────────────────────────────────────────

struct MemoryStream {
    broker: Arc<BrokerInner>,
    topic: Arc<Topic>,
    group: String,
    partition: u32,
    /// Offset of the next record to hand out.
    position: u64,
    high_water: watch::Receiver<u64>,
}

#[async_trait]
impl PartitionStream for MemoryStream {
    fn topic(&self) -> &str {
        &self.topic.name
    }

    fn partition(&self) -> u32 {
        self.partition
    }

    async fn next(&mut self) -> Result<Record, BrokerError> {
        self.broker.check_available()?;

        let position = self.position;
        loop {
            let ready = *self.high_water.borrow_and_update() > position;
            if ready {
                break;
            }
            self.high_water
                .changed()
                .await
                .map_err(|_| BrokerError::Closed)?;
        }

        let partition = self.topic.partition(self.partition)?;
        let record = {
            let log = partition.log.read().await;
            log.get(position as usize).cloned().ok_or(BrokerError::Closed)?
        };
        self.position = position + 1;
        Ok(record)
    }

    async fn commit(&mut self, offset: u64) -> Result<(), BrokerError> {
        self.broker.check_available()?;

        let key = (self.group.clone(), self.topic.name.clone(), self.partition);
        let mut offsets = self.broker.offsets.lock().await;
        let next = offsets.entry(key).or_insert(0);
        *next = (*next).max(offset + 1);
        Ok(())
    }
}
