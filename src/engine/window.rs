//! # engine::window
//!
//! Per-instrument price history and the stores that hold it.
//!
//! * [`PriceWindow`]: bounded ring of the last 15 prices + Wilder averages.
//! * [`WindowStore`]: plain owned map, one per worker (partition affinity).
//! * [`SharedWindowStore`]: one map shared by many workers; every instrument
//!   sits behind its own `Mutex`, so updates to a key are serialized while
//!   different keys proceed in parallel.
//!
//! Windows are created lazily on the first price for an instrument and are
//! never evicted.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::engine::rsi::{self, WINDOW_CAPACITY};

// ─── PriceWindow ──────────────────────────────────────────────────────────────

/// Running Wilder averages.  Both exist or neither does.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WilderAverages {
    pub gain: f64,
    pub loss: f64,
}

#[derive(Debug, Clone, Default)]
pub struct PriceWindow {
    /// Oldest at the front, newest at the back.  `len() <= WINDOW_CAPACITY`.
    history: VecDeque<f64>,
    /// `None` until the 15th price seeds them.
    averages: Option<WilderAverages>,
    /// Total prices ever fed, including those rotated out of `history`.
    observed: u64,
}

impl PriceWindow {
    pub fn new() -> Self {
        Self {
            history: VecDeque::with_capacity(WINDOW_CAPACITY),
            averages: None,
            observed: 0,
        }
    }

    pub fn history(&self) -> &VecDeque<f64> {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn last_price(&self) -> Option<f64> {
        self.history.back().copied()
    }

    pub fn averages(&self) -> Option<WilderAverages> {
        self.averages
    }

    /// True once 15 prices have been seen and the averages are seeded.
    pub fn is_ready(&self) -> bool {
        self.averages.is_some()
    }

    pub fn observed(&self) -> u64 {
        self.observed
    }

    /// Append `price`, dropping the oldest entry when full.
    pub(crate) fn push(&mut self, price: f64) {
        if self.history.len() >= WINDOW_CAPACITY {
            self.history.pop_front();
        }
        self.history.push_back(price);
        self.observed += 1;
    }

    pub(crate) fn set_averages(&mut self, averages: WilderAverages) {
        self.averages = Some(averages);
    }
}

// ─── Observation ──────────────────────────────────────────────────────────────

/// Result of feeding one price into a store.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Observation {
    /// RSI computed for this price, once the window is warm.
    pub rsi: Option<f64>,
    /// This price created the instrument's window.
    pub new_instrument: bool,
}

// ─── WindowStore (owned) ──────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct WindowStore {
    windows: HashMap<String, PriceWindow>,
}

impl WindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `price` to the window for `instrument`, creating it if unseen.
    pub fn observe(&mut self, instrument: &str, price: f64) -> Observation {
        if let Some(window) = self.windows.get_mut(instrument) {
            return Observation {
                rsi: rsi::advance(window, price),
                new_instrument: false,
            };
        }

        let mut window = PriceWindow::new();
        let value = rsi::advance(&mut window, price);
        self.windows.insert(instrument.to_string(), window);
        Observation {
            rsi: value,
            new_instrument: true,
        }
    }

    pub fn get(&self, instrument: &str) -> Option<&PriceWindow> {
        self.windows.get(instrument)
    }

    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    pub fn instruments(&self) -> impl Iterator<Item = &str> {
        self.windows.keys().map(String::as_str)
    }

    /// Absorb another store.  Keys are disjoint under partition affinity; on a
    /// clash the incoming window wins.
    pub fn merge(&mut self, other: WindowStore) {
        self.windows.extend(other.windows);
    }
}

// ─── SharedWindowStore (per-key lock) ─────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct SharedWindowStore {
    windows: Arc<RwLock<HashMap<String, Arc<Mutex<PriceWindow>>>>>,
}

impl SharedWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed `price` to `instrument`'s window.  Holds only that instrument's
    /// lock while the calculator runs.
    pub async fn observe(&self, instrument: &str, price: f64) -> Observation {
        let (slot, new_instrument) = self.slot(instrument).await;
        let mut window = slot.lock().await;
        Observation {
            rsi: rsi::advance(&mut window, price),
            new_instrument,
        }
    }

    /// Copy of one instrument's window.
    pub async fn snapshot(&self, instrument: &str) -> Option<PriceWindow> {
        let slot = {
            let map = self.windows.read().await;
            map.get(instrument).cloned()
        }?;
        let window = slot.lock().await.clone();
        Some(window)
    }

    pub async fn len(&self) -> usize {
        self.windows.read().await.len()
    }

    /// Copy every window into an owned store.
    pub async fn to_store(&self) -> WindowStore {
        let slots: Vec<(String, Arc<Mutex<PriceWindow>>)> = {
            let map = self.windows.read().await;
            map.iter().map(|(k, v)| (k.clone(), Arc::clone(v))).collect()
        };

        let mut store = WindowStore::new();
        for (key, slot) in slots {
            let window = slot.lock().await.clone();
            store.windows.insert(key, window);
        }
        store
    }

    async fn slot(&self, instrument: &str) -> (Arc<Mutex<PriceWindow>>, bool) {
        {
            let map = self.windows.read().await;
            if let Some(slot) = map.get(instrument) {
                return (Arc::clone(slot), false);
            }
        }

        let mut map = self.windows.write().await;
        // another writer may have won the race between the two locks
        if let Some(slot) = map.get(instrument) {
            return (Arc::clone(slot), false);
        }
        let slot = Arc::new(Mutex::new(PriceWindow::new()));
        map.insert(instrument.to_string(), Arc::clone(&slot));
        (slot, true)
    }
}

// ─── Windows (worker view) ────────────────────────────────────────────────────

/// The store a worker drives: its own map, or a handle to the shared one.
#[derive(Debug)]
pub enum Windows {
    Owned(WindowStore),
    Shared(SharedWindowStore),
}

impl Windows {
    pub async fn observe(&mut self, instrument: &str, price: f64) -> Observation {
        match self {
            Windows::Owned(store) => store.observe(instrument, price),
            Windows::Shared(store) => store.observe(instrument, price).await,
        }
    }

    /// Owned windows are handed back; a shared handle has nothing to return.
    pub fn into_owned(self) -> Option<WindowStore> {
        match self {
            Windows::Owned(store) => Some(store),
            Windows::Shared(_) => None,
        }
    }
}
