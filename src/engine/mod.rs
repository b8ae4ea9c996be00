//! The streaming RSI engine: windows, calculator, consumer, publisher,
//! and the coordinator that wires them together.

pub mod consumer;
pub mod coordinator;
pub mod publisher;
pub mod rsi;
pub mod stats;
pub mod window;

use tokio::sync::watch;

pub use coordinator::{Engine, EngineReport};
pub use stats::{EngineStats, StatsSnapshot};
pub use window::{PriceWindow, SharedWindowStore, WindowStore};

/// Resolves once `shutdown` holds `true`, or its sender is gone.
pub async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    loop {
        let stop = *shutdown.borrow_and_update();
        if stop {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}
