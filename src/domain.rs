// ===============================
// src/domain.rs
// ===============================
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Catalog entry: ticker -> quote page locator + display name.
#[derive(Debug, Clone, Copy)]
pub struct StockInfo { pub ticker: &'static str, pub url: &'static str, pub name: &'static str }

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PriceSample { pub symbol: String, pub price: f64, pub at: DateTime<Utc> }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Direction { Above, Below }
impl Direction {
    pub fn as_str(&self) -> &'static str { match self { Direction::Above => "above", Direction::Below => "below" } }
}

/// One-shot user request: notify `chat_id` once the price crosses `target`.
/// `direction` is fixed at creation time by comparing target vs current price.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetAlert {
    pub id: String,
    pub symbol: String,
    pub target: f64,
    pub chat_id: i64,
    pub direction: Direction,
    pub created_at: DateTime<Utc>,
}

impl TargetAlert {
    /// Crossing check, inclusive on both sides.
    pub fn is_triggered(&self, price: f64) -> bool {
        match self.direction {
            Direction::Above => price >= self.target,
            Direction::Below => price <= self.target,
        }
    }
}

/// Per-symbol deviation monitor configuration. The mutable loop state
/// (last alerted price) lives inside the monitor task, single-writer.
#[derive(Debug, Clone)]
pub struct DeviationWatch {
    pub symbol: String,
    pub chat_id: i64,
    pub poll_interval: Duration,
    pub averaging_window: Duration,
    pub threshold_pct: f64,
    pub rearm_pct: f64,
}

/// Recorder event union, one JSON object per line in the journal.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Event {
    Sample(PriceSample),
    Deviation { symbol: String, price: f64, average: f64, pct: f64, at: DateTime<Utc> },
    AlertSet(TargetAlert),
    AlertFired { id: String, symbol: String, target: f64, price: f64, chat_id: i64 },
    Note(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert(direction: Direction, target: f64) -> TargetAlert {
        TargetAlert {
            id: "AL-test".to_string(),
            symbol: "LKOH".to_string(),
            target,
            chat_id: 42,
            direction,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn above_triggers_at_or_over_target() {
        let a = alert(Direction::Above, 7100.0);
        assert!(!a.is_triggered(7099.99));
        assert!(a.is_triggered(7100.0));
        assert!(a.is_triggered(7100.5));
    }

    #[test]
    fn below_triggers_at_or_under_target() {
        let a = alert(Direction::Below, 7100.0);
        assert!(!a.is_triggered(7100.01));
        assert!(a.is_triggered(7100.0));
        assert!(a.is_triggered(7000.0));
    }
}
