// ===============================
// src/config.rs
// ===============================
use dotenvy::dotenv;
use std::env;
use std::time::Duration;

use crate::catalog;

/// Where price samples come from
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SourceMode {
    Mock,
    Investing,
}

impl SourceMode {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mock" => Some(SourceMode::Mock),
            "investing" | "scrape" => Some(SourceMode::Investing),
            _ => None,
        }
    }

    pub fn from_env(key: &str, default_mode: SourceMode) -> SourceMode {
        env::var(key)
            .ok()
            .and_then(|v| Self::parse_one(&v))
            .unwrap_or(default_mode)
    }
}

/// Where notifications go
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NotifyMode {
    Log,
    Telegram,
}

impl NotifyMode {
    pub fn parse_one(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "log" | "mock" => Some(NotifyMode::Log),
            "telegram" | "tg" => Some(NotifyMode::Telegram),
            _ => None,
        }
    }

    pub fn from_env(key: &str, default_mode: NotifyMode) -> NotifyMode {
        env::var(key)
            .ok()
            .and_then(|v| Self::parse_one(&v))
            .unwrap_or(default_mode)
    }
}

#[derive(Clone, Debug)]
pub struct Args {
    pub source_mode: SourceMode,
    pub notify_mode: NotifyMode,

    // telegram
    pub bot_token: Option<String>,
    pub telegram_api_url: String,
    pub deviation_chat_id: i64,

    // watches
    pub watch_symbols: Vec<String>,

    // files/metrics
    pub record_file: Option<String>,
    pub metrics_port: u16,
}

/// Loop tunables. Deviation threshold and re-arm band are independent knobs.
#[derive(Clone, Debug)]
pub struct Tuning {
    pub poll_interval: Duration,
    pub averaging_window: Duration,
    pub deviation_threshold_pct: f64,
    pub rearm_threshold_pct: f64,
    pub sweep_interval: Duration,
    pub fetch_timeout: Duration,
    pub history_retention: Duration,
}

pub fn load() -> (Args, Tuning) {
    // Make sure .env is read (BOT_TOKEN, WATCH_SYMBOLS, etc.)
    let _ = dotenv();

    // ===== Modes =====
    let source_mode = SourceMode::from_env("SOURCE_MODE", SourceMode::Investing);
    let notify_mode = NotifyMode::from_env("NOTIFY_MODE", NotifyMode::Telegram);

    // ===== Telegram =====
    let bot_token = env::var("BOT_TOKEN").ok().filter(|t| !t.is_empty());
    let telegram_api_url = env::var("TELEGRAM_API_URL")
        .unwrap_or_else(|_| "https://api.telegram.org".to_string());
    let deviation_chat_id = env::var("DEVIATION_CHAT_ID")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(0);

    // ===== Watches: WATCH_SYMBOLS=LKOH,SBER,GAZP =====
    let watch_symbols: Vec<String> = env::var("WATCH_SYMBOLS")
        .ok()
        .map(|s| {
            s.split(',')
                .map(|x| x.trim())
                .filter(|x| !x.is_empty())
                .map(|x| x.to_ascii_uppercase())
                .collect()
        })
        .filter(|v: &Vec<String>| !v.is_empty())
        .unwrap_or_else(|| vec!["LKOH".to_string()]);

    // Unknown tickers cannot be monitored, drop them up front
    let watch_symbols: Vec<String> = watch_symbols
        .into_iter()
        .filter(|s| {
            let known = catalog::lookup(s).is_some();
            if !known {
                tracing::warn!(ticker = %s, "WATCH_SYMBOLS entry not in catalog, skipping");
            }
            known
        })
        .collect();

    let record_file = env::var("RECORD_FILE").ok();
    let metrics_port = env::var("METRICS_PORT")
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(9898);

    let args = Args {
        source_mode,
        notify_mode,
        bot_token,
        telegram_api_url,
        deviation_chat_id,
        watch_symbols,
        record_file,
        metrics_port,
    };

    // ===== Tuning =====
    let poll_interval = Duration::from_secs(env_u64("POLL_INTERVAL_SECS", 10));
    let averaging_window = Duration::from_secs(env_u64("AVG_WINDOW_SECS", 300));
    let sweep_interval = Duration::from_secs(env_u64("SWEEP_INTERVAL_SECS", 30));
    let fetch_timeout = Duration::from_secs(env_u64("FETCH_TIMEOUT_SECS", 10));
    // Retention must cover at least the averaging window
    let history_retention =
        Duration::from_secs(env_u64("HISTORY_RETENTION_SECS", 3600)).max(averaging_window);

    let deviation_threshold_pct = env_f64("DEVIATION_THRESHOLD_PCT", 0.42);
    let rearm_threshold_pct = env_f64("REARM_THRESHOLD_PCT", 0.1);

    let tuning = Tuning {
        poll_interval,
        averaging_window,
        deviation_threshold_pct,
        rearm_threshold_pct,
        sweep_interval,
        fetch_timeout,
        history_retention,
    };

    (args, tuning)
}

fn env_u64(key: &str, default: u64) -> u64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

fn env_f64(key: &str, default: f64) -> f64 {
    env::var(key).ok().and_then(|s| s.parse().ok()).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_mode_parsing() {
        assert_eq!(SourceMode::parse_one("mock"), Some(SourceMode::Mock));
        assert_eq!(SourceMode::parse_one("  Investing "), Some(SourceMode::Investing));
        assert_eq!(SourceMode::parse_one("csv"), None);
    }

    #[test]
    fn notify_mode_parsing() {
        assert_eq!(NotifyMode::parse_one("tg"), Some(NotifyMode::Telegram));
        assert_eq!(NotifyMode::parse_one("LOG"), Some(NotifyMode::Log));
        assert_eq!(NotifyMode::parse_one("email"), None);
    }
}
