use std::collections::HashMap;

use proptest::prelude::*;

use rsi_stream::engine::{SharedWindowStore, WindowStore};

fn isolated(prices: &[f64]) -> Vec<Option<f64>> {
    let mut store = WindowStore::new();
    prices.iter().map(|&p| store.observe("solo", p).rsi).collect()
}

fn price_list() -> impl Strategy<Value = Vec<f64>> {
    prop::collection::vec(0.01f64..1_000.0, 0..40)
}

proptest! {
    /// Interleaving two instruments in any order never changes either one's values.
    #[test]
    fn interleaving_matches_isolated(
        a in price_list(),
        b in price_list(),
        picks in prop::collection::vec(any::<bool>(), 0..80),
    ) {
        let mut store = WindowStore::new();
        let mut got: HashMap<&str, Vec<Option<f64>>> = HashMap::new();
        let (mut ia, mut ib) = (0, 0);
        let mut picks = picks.into_iter();

        while ia < a.len() || ib < b.len() {
            let take_a = match (ia < a.len(), ib < b.len()) {
                (true, true) => picks.next().unwrap_or(true),
                (true, false) => true,
                _ => false,
            };
            if take_a {
                got.entry("A").or_default().push(store.observe("A", a[ia]).rsi);
                ia += 1;
            } else {
                got.entry("B").or_default().push(store.observe("B", b[ib]).rsi);
                ib += 1;
            }
        }

        prop_assert_eq!(got.remove("A").unwrap_or_default(), isolated(&a));
        prop_assert_eq!(got.remove("B").unwrap_or_default(), isolated(&b));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_store_concurrent_instruments_match_isolated() {
    let store = SharedWindowStore::new();
    let series: Vec<(String, Vec<f64>)> = (0..8)
        .map(|n| {
            let prices = (0..50).map(|i| 100.0 + ((i * (n + 3)) % 11) as f64).collect();
            (format!("T{n}"), prices)
        })
        .collect();

    let mut tasks = Vec::new();
    for (key, prices) in series.clone() {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut out = Vec::with_capacity(prices.len());
            for price in prices {
                out.push(store.observe(&key, price).await.rsi);
                tokio::task::yield_now().await;
            }
            (key, out)
        }));
    }

    let mut results = HashMap::new();
    for task in tasks {
        let (key, out) = task.await.unwrap();
        results.insert(key, out);
    }

    assert_eq!(store.len().await, 8);
    for (key, prices) in &series {
        assert_eq!(results[key], isolated(prices), "instrument {key}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_shared_store_same_key_loses_no_updates() {
    let store = SharedWindowStore::new();
    let mut tasks = Vec::new();
    for t in 0..4 {
        let store = store.clone();
        tasks.push(tokio::spawn(async move {
            let mut created = 0u32;
            for i in 0..100 {
                let seen = store.observe("HOT", 10.0 + ((t + i) % 3) as f64).await;
                if seen.new_instrument {
                    created += 1;
                }
            }
            created
        }));
    }

    let mut created = 0;
    for task in tasks {
        created += task.await.unwrap();
    }

    // exactly one task saw the window created
    assert_eq!(created, 1);
    let window = store.snapshot("HOT").await.unwrap();
    assert_eq!(window.observed(), 400);
    assert!(window.is_ready());
    let rsi = rsi_stream::engine::rsi::rsi_from_averages(window.averages().unwrap());
    assert!((0.0..=100.0).contains(&rsi));
}
