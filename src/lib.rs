//! # rsi-stream: streaming 14-period RSI per instrument
//!
//! ```text
//!  trade-events (keyed by token_address)
//!        │
//!        ▼
//!  ┌──────────────────────────── Engine ─────────────────────────────┐
//!  │  PartitionWorker ×N ─▶ decode ─▶ PriceWindow ─▶ rsi::advance    │
//!  │        │                                      │ (15th price on)  │
//!  │        └─ commit offset ◀─ StreamPublisher ◀──┘                  │
//!  └──────────────────────────────────────────────────────────────────┘
//!        │
//!        ▼
//!  rsi-events (keyed by token_address) ──▶ dashboard relay (external)
//! ```

pub mod bridge;
pub mod broker;
pub mod config;
pub mod engine;
pub mod error;
pub mod models;
pub mod routes;

pub use config::{EngineConfig, WindowMode};
pub use engine::{Engine, EngineReport};
pub use error::{BrokerError, DecodeError, EngineError};
