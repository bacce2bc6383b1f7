// ===============================
// src/main.rs
// ===============================
/*
 # active configuration
curl -s localhost:9898/metrics | egrep '^config_(source_mode|notify_mode|symbol)'

# sampling / alert activity
curl -s localhost:9898/metrics | grep '^samples_total_by_symbol'
curl -s localhost:9898/metrics | egrep '^(deviation_alerts_total|target_alerts_)'

*/
/*
=============================================================================
Project : stock_alert_bot — quote watcher with Telegram alerts

Summary : Polls quote pages for a catalog of tickers, keeps a rolling price
          history, notifies a chat on sharp deviation from the moving
          average (with an anti-spam re-arm band), and manages user
          "notify me at price X" alerts evaluated by a periodic sweep.
          Prometheus metrics and a JSONL event journal included.
=============================================================================
*/
mod bot;
mod catalog;
mod config;
mod domain;
mod metrics;
mod monitor;
mod notify;
mod recorder;
mod registry;
mod source;
mod store;
mod telegram;

use std::sync::Arc;
use tokio::{sync::mpsc, time::Duration};
use tracing::info;

use crate::domain::{DeviationWatch, Event};
use crate::notify::Notifier;
use crate::source::PriceSource;
use crate::store::PriceStore;

#[tokio::main]
async fn main() {
    // ---- Logging ----
    tracing_subscriber::fmt().with_env_filter("info").init();

    // ---- Load config & tuning ----
    let (args, tuning) = config::load();

    // ---- Metrics ----
    metrics::init();
    tokio::spawn(metrics::serve_metrics(args.metrics_port));

    // ---- Human-friendly startup info + export config to metrics ----
    let source_mode_str = match args.source_mode {
        config::SourceMode::Mock => "mock",
        config::SourceMode::Investing => "investing",
    };
    let notify_mode_str = match args.notify_mode {
        config::NotifyMode::Log => "log",
        config::NotifyMode::Telegram => "telegram",
    };

    info!(
        source_mode = %source_mode_str,
        notify_mode = %notify_mode_str,
        symbols = ?args.watch_symbols,
        deviation_chat = args.deviation_chat_id,
        poll_secs = tuning.poll_interval.as_secs(),
        window_secs = tuning.averaging_window.as_secs(),
        threshold_pct = tuning.deviation_threshold_pct,
        rearm_pct = tuning.rearm_threshold_pct,
        "startup config"
    );

    crate::metrics::CONFIG_SOURCE_MODE
        .with_label_values(&[source_mode_str])
        .set(1);
    crate::metrics::CONFIG_NOTIFY_MODE
        .with_label_values(&[notify_mode_str])
        .set(1);
    for s in &args.watch_symbols {
        crate::metrics::CONFIG_SYMBOL.with_label_values(&[s]).set(1);
    }

    // ---- Capabilities ----
    let price_source: Arc<dyn PriceSource> = match args.source_mode {
        config::SourceMode::Mock => Arc::new(source::MockSource::new()),
        config::SourceMode::Investing => {
            let src = source::InvestingSource::new(tuning.fetch_timeout);
            // seed session cookies before the first quote fetch
            src.prime(source::INVESTING_ROOT).await;
            Arc::new(src)
        }
    };

    let price_store: Arc<dyn PriceStore> =
        Arc::new(store::MemoryStore::new(tuning.history_retention));

    let telegram_api = match args.notify_mode {
        config::NotifyMode::Telegram => {
            let token = args.bot_token.clone().expect("BOT_TOKEN missing");
            Some(telegram::TelegramClient::new(&args.telegram_api_url, &token))
        }
        config::NotifyMode::Log => None,
    };
    let notifier: Arc<dyn Notifier> = match &telegram_api {
        Some(api) => Arc::new(notify::TelegramNotifier::new(api.clone())),
        None => Arc::new(notify::LogNotifier),
    };

    // ---- Recorder (optional) ----
    let rec_tx: Option<mpsc::Sender<Event>> = args.record_file.clone().map(|path| {
        let (tx, rx) = mpsc::channel::<Event>(8192);
        tokio::spawn(recorder::run(rx, path));
        tx
    });

    // ---- Deviation monitors (one unattended loop per watched symbol) ----
    for sym in args.watch_symbols.iter().cloned() {
        let watch = DeviationWatch {
            symbol: sym,
            chat_id: args.deviation_chat_id,
            poll_interval: tuning.poll_interval,
            averaging_window: tuning.averaging_window,
            threshold_pct: tuning.deviation_threshold_pct,
            rearm_pct: tuning.rearm_threshold_pct,
        };
        tokio::spawn(monitor::run(
            watch,
            price_source.clone(),
            price_store.clone(),
            notifier.clone(),
            rec_tx.clone(),
        ));
    }

    // ---- Target alert registry + periodic sweep ----
    let alert_registry = Arc::new(registry::TargetAlertRegistry::new(
        price_source.clone(),
        notifier.clone(),
        rec_tx.clone(),
    ));
    tokio::spawn(registry::run(alert_registry.clone(), tuning.sweep_interval));

    // ---- Inbound Telegram surface (needs the API client) ----
    if let Some(api) = telegram_api {
        tokio::spawn(bot::run(api, price_source.clone(), alert_registry.clone()));
    }

    // ---- Heartbeat ----
    loop {
        tokio::time::sleep(Duration::from_secs(60)).await;
        info!(
            samples = metrics::SAMPLES.get(),
            active_alerts = alert_registry.active().await,
            "heartbeat"
        );
    }
}
