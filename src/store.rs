// ===============================
// src/store.rs
// ===============================
//
// Rolling price history. `MemoryStore` keeps samples per symbol inside the
// retention horizon and answers "average since T" queries; durable history
// is the recorder's JSONL journal, not this store.
//
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;

use ahash::AHashMap as HashMap;

use crate::domain::PriceSample;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store write failed: {0}")]
    WriteFailed(String),
    #[error("store query failed: {0}")]
    QueryFailed(String),
}

#[async_trait]
pub trait PriceStore: Send + Sync {
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError>;
    /// Mean price of `symbol` samples observed at or after `since`.
    /// `None` when the window holds no samples.
    async fn average_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError>;
}

pub struct MemoryStore {
    retention: chrono::Duration,
    rows: RwLock<HashMap<String, Vec<(DateTime<Utc>, f64)>>>,
}

impl MemoryStore {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention: chrono::Duration::seconds(retention.as_secs() as i64),
            rows: RwLock::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PriceStore for MemoryStore {
    async fn append(&self, sample: &PriceSample) -> Result<(), StoreError> {
        let cutoff = sample.at - self.retention;
        let mut rows = self.rows.write().await;
        let series = rows.entry(sample.symbol.clone()).or_default();
        series.push((sample.at, sample.price));
        // drop rows that fell out of the retention horizon
        series.retain(|(t, _)| *t >= cutoff);
        Ok(())
    }

    async fn average_since(
        &self,
        symbol: &str,
        since: DateTime<Utc>,
    ) -> Result<Option<f64>, StoreError> {
        let rows = self.rows.read().await;
        let Some(series) = rows.get(symbol) else {
            return Ok(None);
        };
        let mut sum = 0.0;
        let mut n = 0u32;
        for (t, price) in series {
            if *t >= since {
                sum += price;
                n += 1;
            }
        }
        if n == 0 {
            Ok(None)
        } else {
            Ok(Some(sum / n as f64))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(symbol: &str, price: f64, at: DateTime<Utc>) -> PriceSample {
        PriceSample { symbol: symbol.to_string(), price, at }
    }

    #[tokio::test]
    async fn averages_only_inside_window() {
        let store = MemoryStore::new(Duration::from_secs(3600));
        let now = Utc::now();

        store.append(&sample("LKOH", 100.0, now - chrono::Duration::seconds(600))).await.unwrap();
        store.append(&sample("LKOH", 200.0, now - chrono::Duration::seconds(60))).await.unwrap();
        store.append(&sample("LKOH", 300.0, now)).await.unwrap();

        let avg = store
            .average_since("LKOH", now - chrono::Duration::seconds(300))
            .await
            .unwrap();
        assert_eq!(avg, Some(250.0));
    }

    #[tokio::test]
    async fn empty_window_and_unknown_symbol_give_none() {
        let store = MemoryStore::new(Duration::from_secs(3600));
        let now = Utc::now();

        assert_eq!(store.average_since("LKOH", now).await.unwrap(), None);

        store.append(&sample("LKOH", 100.0, now - chrono::Duration::seconds(600))).await.unwrap();
        let avg = store
            .average_since("LKOH", now - chrono::Duration::seconds(10))
            .await
            .unwrap();
        assert_eq!(avg, None);
    }

    #[tokio::test]
    async fn samples_beyond_retention_are_pruned() {
        let store = MemoryStore::new(Duration::from_secs(300));
        let now = Utc::now();

        store.append(&sample("SBER", 100.0, now - chrono::Duration::seconds(600))).await.unwrap();
        store.append(&sample("SBER", 200.0, now)).await.unwrap();

        // the old row is gone, even for a query window that would cover it
        let avg = store
            .average_since("SBER", now - chrono::Duration::seconds(3600))
            .await
            .unwrap();
        assert_eq!(avg, Some(200.0));
    }

    #[tokio::test]
    async fn concurrent_appends_lose_nothing() {
        let store = std::sync::Arc::new(MemoryStore::new(Duration::from_secs(3600)));
        let now = Utc::now();

        let mut handles = Vec::new();
        for i in 0..16 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store.append(&sample("GAZP", 100.0 + i as f64, now)).await.unwrap();
            }));
        }
        for h in handles {
            h.await.unwrap();
        }

        let avg = store
            .average_since("GAZP", now - chrono::Duration::seconds(1))
            .await
            .unwrap()
            .unwrap();
        // mean of 100..=115; all 16 appends must be present
        assert!((avg - 107.5).abs() < 1e-9);
    }
}
