// ===============================
// src/registry.rs
// ===============================
//
// Target alert registry: user-submitted "notify me at price X" requests and
// the periodic sweep that evaluates them.
//
// Locking discipline: the alert set is only locked for snapshot / insert /
// remove. All fetches and sends happen outside the lock, so submits racing a
// sweep are never blocked and never lost; the sweep removes exactly the
// alerts it fired, by id.
//
use chrono::Utc;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::{
    sync::{mpsc, Mutex},
    time::sleep,
};
use tracing::{error, info, warn};

use crate::catalog;
use crate::domain::{Direction, Event, TargetAlert};
use crate::metrics::{FETCH_ERRORS, NOTIFY_ERRORS, SWEEPS, TARGET_ACTIVE, TARGET_FIRED, TARGET_SET};
use crate::notify::Notifier;
use crate::source::{FetchError, PriceSource};

/// User-visible rejections; Display strings go straight into the reply.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("Ticker {0} is not in the catalog.")]
    UnknownSymbol(String),
    #[error("Bad price format: {0}. Try again.")]
    InvalidPrice(String),
    #[error("{name} already trades at {price:.2}.")]
    InvalidTarget { name: String, price: f64 },
    #[error("Could not fetch the current price: {0}. Try again later.")]
    Fetch(#[from] FetchError),
}

pub struct TargetAlertRegistry {
    source: Arc<dyn PriceSource>,
    notifier: Arc<dyn Notifier>,
    alerts: Mutex<Vec<TargetAlert>>,
    rec_tx: Option<mpsc::Sender<Event>>,
}

impl TargetAlertRegistry {
    pub fn new(
        source: Arc<dyn PriceSource>,
        notifier: Arc<dyn Notifier>,
        rec_tx: Option<mpsc::Sender<Event>>,
    ) -> Self {
        Self { source, notifier, alerts: Mutex::new(Vec::new()), rec_tx }
    }

    /// Create an alert for `chat_id`. Fetches the current price synchronously
    /// (bounded by the source timeout) to derive the crossing direction.
    pub async fn submit(
        &self,
        ticker: &str,
        target: f64,
        chat_id: i64,
    ) -> Result<TargetAlert, RequestError> {
        let info = catalog::lookup(ticker)
            .ok_or_else(|| RequestError::UnknownSymbol(ticker.to_string()))?;

        let quote = self.source.fetch(info).await?;

        let direction = if quote.price < target {
            Direction::Above
        } else if quote.price > target {
            Direction::Below
        } else {
            // equal: no monotonic direction derivable
            return Err(RequestError::InvalidTarget { name: quote.name, price: quote.price });
        };

        let alert = TargetAlert {
            id: next_alert_id(),
            symbol: info.ticker.to_string(),
            target,
            chat_id,
            direction,
            created_at: Utc::now(),
        };

        {
            let mut alerts = self.alerts.lock().await;
            alerts.push(alert.clone());
            TARGET_ACTIVE.set(alerts.len() as i64);
        }
        TARGET_SET.inc();
        if let Some(tx) = &self.rec_tx {
            let _ = tx.try_send(Event::AlertSet(alert.clone()));
        }
        info!(
            symbol = %alert.symbol,
            target = alert.target,
            chat_id,
            direction = alert.direction.as_str(),
            "target alert set"
        );
        Ok(alert)
    }

    pub async fn active(&self) -> usize {
        self.alerts.lock().await.len()
    }

    /// One evaluation pass over the pending alerts. Each alert is handled
    /// independently: a fetch failure or a failed send keeps that alert for
    /// the next sweep without affecting the others.
    pub async fn sweep(&self) {
        let snapshot: Vec<TargetAlert> = self.alerts.lock().await.clone();

        let mut fired: Vec<String> = Vec::new();
        for alert in &snapshot {
            // alerts enter the set through the catalog, the entry is still there
            let Some(info) = catalog::lookup(&alert.symbol) else { continue };

            let quote = match self.source.fetch(info).await {
                Ok(q) => q,
                Err(e) => {
                    FETCH_ERRORS.with_label_values(&[e.kind()]).inc();
                    warn!(?e, symbol = %alert.symbol, "sweep fetch failed, keeping alert");
                    continue;
                }
            };

            if !alert.is_triggered(quote.price) {
                continue;
            }

            let text = format!(
                "🔔 {} reached {:.2} (current price: {:.2})",
                quote.name, alert.target, quote.price
            );
            match self.notifier.send(alert.chat_id, &text).await {
                Ok(()) => {
                    TARGET_FIRED.inc();
                    info!(
                        symbol = %alert.symbol,
                        target = alert.target,
                        price = quote.price,
                        chat_id = alert.chat_id,
                        "target alert fired"
                    );
                    if let Some(tx) = &self.rec_tx {
                        let _ = tx.try_send(Event::AlertFired {
                            id: alert.id.clone(),
                            symbol: alert.symbol.clone(),
                            target: alert.target,
                            price: quote.price,
                            chat_id: alert.chat_id,
                        });
                    }
                    fired.push(alert.id.clone());
                }
                Err(e) => {
                    NOTIFY_ERRORS.inc();
                    error!(?e, symbol = %alert.symbol, "target notify failed, keeping alert for retry");
                }
            }
        }

        if !fired.is_empty() {
            let mut alerts = self.alerts.lock().await;
            alerts.retain(|a| !fired.contains(&a.id));
            TARGET_ACTIVE.set(alerts.len() as i64);
        }
        SWEEPS.inc();
    }
}

fn next_alert_id() -> String {
    let now = Utc::now().timestamp_nanos_opt().unwrap_or(0);
    format!("AL-{}-{}", now, rand::thread_rng().gen::<u32>())
}

/// Unattended sweep task.
pub async fn run(registry: Arc<TargetAlertRegistry>, interval: Duration) {
    info!(interval_secs = interval.as_secs(), "target alert sweep started");
    loop {
        registry.sweep().await;
        sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::StockInfo;
    use crate::notify::SendError;
    use crate::source::Quote;
    use async_trait::async_trait;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicBool, Ordering};

    use ahash::AHashMap as HashMap;

    /// Fixed per-ticker prices; tickers in `failing` always error.
    struct ScriptedSource {
        prices: Mutex<HashMap<String, f64>>,
        failing: Mutex<HashSet<String>>,
    }

    impl ScriptedSource {
        fn new(prices: &[(&str, f64)]) -> Self {
            let mut m = HashMap::new();
            for (t, p) in prices {
                m.insert(t.to_string(), *p);
            }
            Self { prices: Mutex::new(m), failing: Mutex::new(HashSet::new()) }
        }

        async fn set_price(&self, ticker: &str, price: f64) {
            self.prices.lock().await.insert(ticker.to_string(), price);
        }

        async fn set_failing(&self, ticker: &str, failing: bool) {
            let mut f = self.failing.lock().await;
            if failing {
                f.insert(ticker.to_string());
            } else {
                f.remove(ticker);
            }
        }
    }

    #[async_trait]
    impl PriceSource for ScriptedSource {
        async fn fetch(&self, info: &StockInfo) -> Result<Quote, FetchError> {
            if self.failing.lock().await.contains(info.ticker) {
                return Err(FetchError::Timeout);
            }
            let prices = self.prices.lock().await;
            let price = prices
                .get(info.ticker)
                .copied()
                .ok_or_else(|| FetchError::ParseFailure("no scripted price".to_string()))?;
            Ok(Quote { name: info.name.to_string(), price })
        }
    }

    struct RecordingNotifier {
        sent: Mutex<Vec<(i64, String)>>,
        fail: AtomicBool,
    }

    impl RecordingNotifier {
        fn new() -> Self {
            Self { sent: Mutex::new(Vec::new()), fail: AtomicBool::new(false) }
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(SendError::Transport("scripted failure".to_string()));
            }
            self.sent.lock().await.push((chat_id, text.to_string()));
            Ok(())
        }
    }

    fn registry_with(
        prices: &[(&str, f64)],
    ) -> (Arc<ScriptedSource>, Arc<RecordingNotifier>, TargetAlertRegistry) {
        let source = Arc::new(ScriptedSource::new(prices));
        let notifier = Arc::new(RecordingNotifier::new());
        let registry = TargetAlertRegistry::new(source.clone(), notifier.clone(), None);
        (source, notifier, registry)
    }

    #[tokio::test]
    async fn submit_derives_direction_from_current_price() {
        let (_, _, registry) = registry_with(&[("LKOH", 7050.0)]);

        let above = registry.submit("LKOH", 7100.0, 42).await.unwrap();
        assert_eq!(above.direction, Direction::Above);

        let below = registry.submit("LKOH", 7000.0, 42).await.unwrap();
        assert_eq!(below.direction, Direction::Below);

        assert_eq!(registry.active().await, 2);
    }

    #[tokio::test]
    async fn submit_rejects_equal_target_and_unknown_ticker() {
        let (_, _, registry) = registry_with(&[("LKOH", 7050.0)]);

        let err = registry.submit("LKOH", 7050.0, 42).await.unwrap_err();
        assert!(matches!(err, RequestError::InvalidTarget { .. }));

        let err = registry.submit("NOPE", 1.0, 42).await.unwrap_err();
        assert!(matches!(err, RequestError::UnknownSymbol(_)));

        // rejections create no partial state
        assert_eq!(registry.active().await, 0);
    }

    #[tokio::test]
    async fn submit_surfaces_fetch_failure() {
        let (source, _, registry) = registry_with(&[("LKOH", 7050.0)]);
        source.set_failing("LKOH", true).await;

        let err = registry.submit("LKOH", 7100.0, 42).await.unwrap_err();
        assert!(matches!(err, RequestError::Fetch(_)));
        assert_eq!(registry.active().await, 0);
    }

    #[tokio::test]
    async fn fired_alert_is_removed_exactly_once() {
        let (source, notifier, registry) = registry_with(&[("LKOH", 7050.0)]);
        registry.submit("LKOH", 7100.0, 42).await.unwrap();

        // reaching the target exactly counts as a crossing
        source.set_price("LKOH", 7100.0).await;
        registry.sweep().await;
        assert_eq!(registry.active().await, 0);
        assert_eq!(notifier.sent.lock().await.len(), 1);

        // a later sweep finds nothing to fire
        registry.sweep().await;
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn untriggered_alert_survives_sweeps() {
        let (_, notifier, registry) = registry_with(&[("LKOH", 7050.0)]);
        registry.submit("LKOH", 7100.0, 42).await.unwrap();

        registry.sweep().await;
        registry.sweep().await;
        assert_eq!(registry.active().await, 1);
        assert!(notifier.sent.lock().await.is_empty());
    }

    #[tokio::test]
    async fn sweep_fetch_failure_is_isolated_per_alert() {
        let (source, notifier, registry) =
            registry_with(&[("LKOH", 7050.0), ("SBER", 280.0)]);
        registry.submit("LKOH", 7100.0, 1).await.unwrap();
        registry.submit("SBER", 285.0, 2).await.unwrap();

        // LKOH fetches now fail; SBER crosses its target
        source.set_failing("LKOH", true).await;
        source.set_price("SBER", 290.0).await;
        registry.sweep().await;

        // SBER fired, LKOH kept for the next sweep
        assert_eq!(registry.active().await, 1);
        let sent = notifier.sent.lock().await;
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].0, 2);
    }

    #[tokio::test]
    async fn send_failure_keeps_alert_for_retry() {
        let (source, notifier, registry) = registry_with(&[("LKOH", 7050.0)]);
        registry.submit("LKOH", 7100.0, 42).await.unwrap();

        source.set_price("LKOH", 7200.0).await;
        notifier.fail.store(true, Ordering::SeqCst);
        registry.sweep().await;
        assert_eq!(registry.active().await, 1);

        notifier.fail.store(false, Ordering::SeqCst);
        registry.sweep().await;
        assert_eq!(registry.active().await, 0);
        assert_eq!(notifier.sent.lock().await.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_submits_interleaved_with_sweeps_lose_nothing() {
        let (_, _, registry) = registry_with(&[("LKOH", 7050.0), ("SBER", 280.0)]);
        let registry = Arc::new(registry);

        let mut handles = Vec::new();
        for i in 0..8 {
            let registry = registry.clone();
            // targets far from the scripted prices, nothing triggers
            handles.push(tokio::spawn(async move {
                if i % 2 == 0 {
                    registry.submit("LKOH", 9000.0, 100 + i).await.unwrap();
                } else {
                    registry.submit("SBER", 100.0, 100 + i).await.unwrap();
                }
            }));
        }
        for _ in 0..4 {
            let registry = registry.clone();
            handles.push(tokio::spawn(async move { registry.sweep().await }));
        }
        for h in handles {
            h.await.unwrap();
        }

        registry.sweep().await;
        assert_eq!(registry.active().await, 8);
    }
}
