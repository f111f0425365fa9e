//! Live Price Cache - Sharded Concurrent Ticker Map
//!
//! Backs the `PriceStore` port with a `DashMap`, so writers on different
//! tickers never contend and readers never block the feeds. A merge holds
//! only the shard lock of the ticker being written.
//!
//! Optionally publishes a `PriceTick` whenever an upsert writes a positive
//! last price, which drives the order-price adjuster. Zero or non-finite
//! prints are stored but never ticked.

use dashmap::DashMap;
use tokio::sync::broadcast;
use tracing::trace;

use crate::domain::price::{PriceRecord, PriceTick, PriceUpdate, UpsertOutcome};
use crate::ports::store::{PriceStore, SnapshotSource};

/// Concurrent ticker -> price record cache.
pub struct PriceCache {
    /// Records keyed by ticker.
    records: DashMap<String, PriceRecord>,
    /// Tick notifications, absent when built without them.
    tick_tx: Option<broadcast::Sender<PriceTick>>,
}

impl PriceCache {
    /// Cache without tick notifications.
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            tick_tx: None,
        }
    }

    /// Cache that broadcasts a `PriceTick` for every last-price write.
    pub fn with_notifications(capacity: usize) -> Self {
        let (tick_tx, _) = broadcast::channel(capacity);
        Self {
            records: DashMap::new(),
            tick_tx: Some(tick_tx),
        }
    }

    /// Subscribe to last-price ticks, if notifications are enabled.
    pub fn subscribe(&self) -> Option<broadcast::Receiver<PriceTick>> {
        self.tick_tx.as_ref().map(|tx| tx.subscribe())
    }

    pub fn get(&self, ticker: &str) -> Option<PriceRecord> {
        self.records.get(ticker).map(|r| r.value().clone())
    }

    pub fn upsert(&self, ticker: &str, update: &PriceUpdate) -> UpsertOutcome {
        self.merge_update(ticker, update)
    }

    pub fn snapshot(&self) -> Vec<PriceRecord> {
        self.collect_all()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn merge_update(&self, ticker: &str, update: &PriceUpdate) -> UpsertOutcome {
        let outcome = {
            let mut outcome = UpsertOutcome::Updated;
            let mut entry = self.records.entry(ticker.to_string()).or_insert_with(|| {
                outcome = UpsertOutcome::Created;
                PriceRecord::new(ticker)
            });
            entry.apply(update);
            outcome
        };

        trace!(ticker, ?outcome, "price upsert");

        let tickable = update
            .last_price
            .filter(|price| price.is_finite() && *price > 0.0);
        if let (Some(tx), Some(last_price)) = (&self.tick_tx, tickable) {
            // No receivers is fine.
            let _ = tx.send(PriceTick {
                ticker: ticker.to_string(),
                last_price,
            });
        }

        outcome
    }

    fn collect_all(&self) -> Vec<PriceRecord> {
        self.records.iter().map(|r| r.value().clone()).collect()
    }
}

impl Default for PriceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl PriceStore for PriceCache {
    fn get(&self, ticker: &str) -> Option<PriceRecord> {
        self.records.get(ticker).map(|r| r.value().clone())
    }

    fn upsert(&self, ticker: &str, update: &PriceUpdate) -> UpsertOutcome {
        self.merge_update(ticker, update)
    }

    fn snapshot(&self) -> Vec<PriceRecord> {
        self.collect_all()
    }

    fn len(&self) -> usize {
        self.records.len()
    }
}

impl SnapshotSource<PriceRecord> for PriceCache {
    fn snapshot(&self) -> Vec<PriceRecord> {
        self.collect_all()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn test_first_write_creates_record() {
        let cache = PriceCache::new();
        let outcome = cache.upsert(
            "AAPL",
            &PriceUpdate {
                last_price: Some(190.0),
                ..Default::default()
            },
        );
        assert_eq!(outcome, UpsertOutcome::Created);
        assert_eq!(cache.get("AAPL").unwrap().last_price, Some(190.0));
    }

    #[test]
    fn test_second_write_merges_fields() {
        let cache = PriceCache::new();
        cache.upsert(
            "AAPL",
            &PriceUpdate {
                bid_price: Some(189.5),
                source: Some("equity".into()),
                ..Default::default()
            },
        );
        let outcome = cache.upsert(
            "AAPL",
            &PriceUpdate {
                ask_price: Some(190.5),
                ..Default::default()
            },
        );

        let record = cache.get("AAPL").unwrap();
        assert_eq!(outcome, UpsertOutcome::Updated);
        assert_eq!(record.bid_price, Some(189.5));
        assert_eq!(record.ask_price, Some(190.5));
        assert_eq!(record.source.as_deref(), Some("equity"));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_returns_every_ticker() {
        let cache = PriceCache::new();
        for ticker in ["A", "B", "C"] {
            cache.upsert(ticker, &PriceUpdate::default());
        }
        let mut tickers: Vec<_> = cache.snapshot().into_iter().map(|r| r.ticker).collect();
        tickers.sort();
        assert_eq!(tickers, vec!["A", "B", "C"]);
    }

    #[test]
    fn test_missing_ticker_is_none() {
        let cache = PriceCache::new();
        assert!(cache.get("NOPE").is_none());
        assert!(cache.is_empty());
    }

    #[tokio::test]
    async fn test_notifications_only_for_last_price() {
        let cache = PriceCache::with_notifications(16);
        let mut rx = cache.subscribe().unwrap();

        cache.upsert(
            "SPX",
            &PriceUpdate {
                bid_price: Some(1.0),
                ..Default::default()
            },
        );
        cache.upsert(
            "SPX",
            &PriceUpdate {
                last_price: Some(5000.0),
                ..Default::default()
            },
        );

        let tick = rx.recv().await.unwrap();
        assert_eq!(tick.ticker, "SPX");
        assert_eq!(tick.last_price, 5000.0);
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_zero_last_price_is_stored_but_not_ticked() {
        let cache = PriceCache::with_notifications(16);
        let mut rx = cache.subscribe().unwrap();

        for last_price in [0.0, -1.0, f64::NAN] {
            cache.upsert(
                "SPY",
                &PriceUpdate {
                    last_price: Some(last_price),
                    ..Default::default()
                },
            );
        }
        assert!(rx.try_recv().is_err());
        assert_eq!(cache.get("SPY").unwrap().last_price.map(f64::is_nan), Some(true));

        cache.upsert(
            "SPY",
            &PriceUpdate {
                last_price: Some(500.0),
                ..Default::default()
            },
        );
        assert_eq!(rx.recv().await.unwrap().last_price, 500.0);
    }

    #[test]
    fn test_concurrent_writers_on_distinct_fields() {
        let cache = Arc::new(PriceCache::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let cache = Arc::clone(&cache);
            handles.push(std::thread::spawn(move || {
                for n in 0..500 {
                    let update = if i % 2 == 0 {
                        PriceUpdate {
                            bid_price: Some(n as f64),
                            ..Default::default()
                        }
                    } else {
                        PriceUpdate {
                            ask_price: Some(n as f64),
                            ..Default::default()
                        }
                    };
                    cache.upsert("BTC-USD", &update);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let record = cache.get("BTC-USD").unwrap();
        assert_eq!(cache.len(), 1);
        assert_eq!(record.bid_price, Some(499.0));
        assert_eq!(record.ask_price, Some(499.0));
    }
}
