//! # broker
//!
//! The publish/subscribe contract the engine consumes.
//!
//! ```text
//!            publish(topic, key, payload)
//!  producer ─────────────────────────────▶ topic ─┬─ partition 0 ──▶ PartitionStream (group offset)
//!                                                  ├─ partition 1 ──▶ PartitionStream (group offset)
//!                                                  └─ ...
//! ```
//!
//! * Records with the same key always land on the same partition, in publish order.
//! * A consumer group owns one committed offset per partition.  A fresh
//!   [`Broker::assign`] resumes from it.
//! * Timeouts are the caller's job: every future here may wait indefinitely.
//!
//! [`memory::MemoryBroker`] is the in-process implementation used by the
//! binary and the tests.

pub mod memory;

use async_trait::async_trait;

use crate::error::BrokerError;

pub use memory::MemoryBroker;

// ─── Record ───────────────────────────────────────────────────────────────────

/// One message read from a partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

/// Where a published record ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub partition: u32,
    pub offset: u64,
}

// ─── Traits ───────────────────────────────────────────────────────────────────

/// A single partition of a topic, read on behalf of a consumer group.
#[async_trait]
pub trait PartitionStream: Send {
    fn topic(&self) -> &str;

    fn partition(&self) -> u32;

    /// Wait for the record at the current read position and advance past it.
    async fn next(&mut self) -> Result<Record, BrokerError>;

    /// Record that everything up to and including `offset` has been processed.
    /// Commits never move backwards.
    async fn commit(&mut self, offset: u64) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Broker: Send + Sync + 'static {
    /// Create `topic` if it does not exist yet.
    async fn ensure_topic(&self, topic: &str) -> Result<(), BrokerError>;

    /// Join `group` on `topic` and receive one stream per assigned partition,
    /// each positioned at the group's committed offset.
    async fn assign(
        &self,
        topic: &str,
        group: &str,
    ) -> Result<Vec<Box<dyn PartitionStream>>, BrokerError>;

    /// Append `payload` to `topic`, partitioned by `key`.  Resolves once the
    /// record is durable on the broker.
    async fn publish(&self, topic: &str, key: &str, payload: Vec<u8>)
        -> Result<Delivery, BrokerError>;
}
