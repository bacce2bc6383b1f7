// ===============================
// src/monitor.rs
// ===============================
//
// Deviation monitor: one unattended loop per watched symbol.
//   fetch -> append history -> window average -> deviation -> maybe notify
//
// Decision rules live in DeviationState so they are testable without I/O:
// - notify when |pct| >= threshold AND the price left the re-arm band
//   around the last alerted price;
// - a failed send leaves the baseline untouched (retry next iteration);
// - once deviation drops under threshold the baseline resets, so the next
//   breach always notifies.
//
use chrono::Utc;
use std::sync::Arc;
use tokio::{sync::mpsc, time::sleep};
use tracing::{debug, error, info, warn};

use crate::catalog;
use crate::domain::{DeviationWatch, Event, PriceSample};
use crate::metrics::{
    DEVIATION_ALERTS, FETCH_ERRORS, NOTIFY_ERRORS, SAMPLES, SAMPLES_BY_SYMBOL, STORE_ERRORS,
};
use crate::notify::Notifier;
use crate::source::PriceSource;
use crate::store::PriceStore;

/// Pure deviation/re-arm state. Single writer: the owning monitor loop.
pub struct DeviationState {
    threshold_pct: f64,
    rearm_pct: f64,
    last_alert_price: Option<f64>,
}

impl DeviationState {
    pub fn new(threshold_pct: f64, rearm_pct: f64) -> Self {
        Self { threshold_pct, rearm_pct, last_alert_price: None }
    }

    /// Percentage deviation of `current` from `average`, or None when the
    /// average gives no signal (empty window is handled by the caller,
    /// a zero average here).
    pub fn deviation(current: f64, average: f64) -> Option<f64> {
        if average > 0.0 {
            Some((current - average) / average * 100.0)
        } else {
            None
        }
    }

    /// Feed one sample. Returns the deviation pct when a notification should
    /// go out; resets the baseline when the price is back under threshold.
    /// Call `mark_notified` only after the send actually succeeded.
    pub fn on_sample(&mut self, current: f64, average: f64) -> Option<f64> {
        let pct = Self::deviation(current, average)?;
        if pct.abs() >= self.threshold_pct {
            if self.should_notify(current) {
                return Some(pct);
            }
        } else {
            self.last_alert_price = None;
        }
        None
    }

    pub fn mark_notified(&mut self, price: f64) {
        self.last_alert_price = Some(price);
    }

    // Suppress repeats while the price oscillates inside the band around the
    // last alerted price.
    fn should_notify(&self, current: f64) -> bool {
        match self.last_alert_price {
            None => true,
            Some(last) => {
                let band = self.rearm_pct / 100.0;
                let ratio = current / last;
                ratio < 1.0 - band || ratio > 1.0 + band
            }
        }
    }
}

/// Unattended per-symbol loop. Never returns; every failure is logged and
/// retried at the next tick.
pub async fn run(
    watch: DeviationWatch,
    source: Arc<dyn PriceSource>,
    store: Arc<dyn PriceStore>,
    notifier: Arc<dyn Notifier>,
    rec_tx: Option<mpsc::Sender<Event>>,
) {
    let Some(info) = catalog::lookup(&watch.symbol) else {
        error!(symbol = %watch.symbol, "ticker not in catalog, monitor not started");
        return;
    };

    info!(
        symbol = %watch.symbol,
        poll_secs = watch.poll_interval.as_secs(),
        window_secs = watch.averaging_window.as_secs(),
        threshold_pct = watch.threshold_pct,
        "deviation monitor started"
    );

    let mut st = DeviationState::new(watch.threshold_pct, watch.rearm_pct);
    let window = chrono::Duration::seconds(watch.averaging_window.as_secs() as i64);

    loop {
        match source.fetch(info).await {
            Ok(quote) => {
                let sample = PriceSample {
                    symbol: watch.symbol.clone(),
                    price: quote.price,
                    at: Utc::now(),
                };
                SAMPLES.inc();
                SAMPLES_BY_SYMBOL.with_label_values(&[&watch.symbol]).inc();
                debug!(symbol = %watch.symbol, price = quote.price, "sample");
                if let Some(tx) = &rec_tx {
                    let _ = tx.try_send(Event::Sample(sample.clone()));
                }

                // best-effort persistence: a write failure never skips evaluation
                if let Err(e) = store.append(&sample).await {
                    STORE_ERRORS.inc();
                    error!(?e, symbol = %watch.symbol, "sample append failed");
                }

                match store.average_since(&watch.symbol, sample.at - window).await {
                    Ok(Some(average)) => {
                        if let Some(pct) = st.on_sample(quote.price, average) {
                            if watch.chat_id != 0 {
                                let text = format!(
                                    "🚨 Sharp move for {}!\nCurrent price: {:.2}\nAverage over the window: {:.2}\nDeviation: {:+.2}%",
                                    quote.name, quote.price, average, pct
                                );
                                match notifier.send(watch.chat_id, &text).await {
                                    Ok(()) => {
                                        st.mark_notified(quote.price);
                                        DEVIATION_ALERTS.with_label_values(&[&watch.symbol]).inc();
                                        info!(symbol = %watch.symbol, price = quote.price, average, pct, "deviation alert sent");
                                        if let Some(tx) = &rec_tx {
                                            let _ = tx.try_send(Event::Deviation {
                                                symbol: watch.symbol.clone(),
                                                price: quote.price,
                                                average,
                                                pct,
                                                at: sample.at,
                                            });
                                        }
                                    }
                                    Err(e) => {
                                        NOTIFY_ERRORS.inc();
                                        error!(?e, symbol = %watch.symbol, "deviation notify failed, will retry next tick");
                                    }
                                }
                            }
                        }
                    }
                    Ok(None) => debug!(symbol = %watch.symbol, "no samples in window yet"),
                    Err(e) => {
                        STORE_ERRORS.inc();
                        error!(?e, symbol = %watch.symbol, "average query failed");
                    }
                }
            }
            Err(e) => {
                FETCH_ERRORS.with_label_values(&[e.kind()]).inc();
                warn!(?e, symbol = %watch.symbol, "fetch failed");
            }
        }

        sleep(watch.poll_interval).await;
    }
}
