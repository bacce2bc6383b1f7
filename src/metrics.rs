// ===============================
// src/metrics.rs
// ===============================
use once_cell::sync::Lazy;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder,
};
use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::thread;

// Single custom registry (we register everything here)
pub static REGISTRY: Lazy<Registry> = Lazy::new(Registry::new);

// -------- Sampling --------
pub static SAMPLES: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("samples_total", "price samples fetched").unwrap());

pub static SAMPLES_BY_SYMBOL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("samples_total_by_symbol", "price samples per symbol"),
        &["symbol"],
    )
    .unwrap()
});

pub static FETCH_ERRORS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("fetch_errors_total", "failed price fetches (label: kind)"),
        &["kind"],
    )
    .unwrap()
});

pub static STORE_ERRORS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("store_errors_total", "failed history writes/queries").unwrap());

// -------- Alerts --------
pub static DEVIATION_ALERTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("deviation_alerts_total", "deviation notifications sent"),
        &["symbol"],
    )
    .unwrap()
});

pub static TARGET_SET: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("target_alerts_set_total", "target alerts created").unwrap());

pub static TARGET_FIRED: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("target_alerts_fired_total", "target alerts delivered and removed").unwrap());

pub static TARGET_ACTIVE: Lazy<IntGauge> =
    Lazy::new(|| IntGauge::new("target_alerts_active", "target alerts currently pending").unwrap());

pub static SWEEPS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("sweeps_total", "target alert sweep passes").unwrap());

pub static NOTIFY_ERRORS: Lazy<IntCounter> =
    Lazy::new(|| IntCounter::new("notify_errors_total", "failed notification sends").unwrap());

// ---- Config visibility (source / notify / symbols) ----
pub static CONFIG_SOURCE_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_source_mode", "source mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub static CONFIG_NOTIFY_MODE: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_notify_mode", "notify mode (label: mode)"),
        &["mode"],
    )
    .unwrap()
});

pub static CONFIG_SYMBOL: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("config_symbol", "watched symbols (label: symbol)"),
        &["symbol"],
    )
    .unwrap()
});

pub fn init() {
    // Register all metrics to the custom registry
    for m in [
        REGISTRY.register(Box::new(SAMPLES.clone())),
        REGISTRY.register(Box::new(SAMPLES_BY_SYMBOL.clone())),
        REGISTRY.register(Box::new(FETCH_ERRORS.clone())),
        REGISTRY.register(Box::new(STORE_ERRORS.clone())),
        REGISTRY.register(Box::new(DEVIATION_ALERTS.clone())),
        REGISTRY.register(Box::new(TARGET_SET.clone())),
        REGISTRY.register(Box::new(TARGET_FIRED.clone())),
        REGISTRY.register(Box::new(TARGET_ACTIVE.clone())),
        REGISTRY.register(Box::new(SWEEPS.clone())),
        REGISTRY.register(Box::new(NOTIFY_ERRORS.clone())),
        REGISTRY.register(Box::new(CONFIG_SOURCE_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_NOTIFY_MODE.clone())),
        REGISTRY.register(Box::new(CONFIG_SYMBOL.clone())),
    ] {
        let _ = m;
    }
}

// Encode all metrics in Prometheus text format
fn encode_metrics() -> Vec<u8> {
    let encoder = TextEncoder::new();
    let families = REGISTRY.gather();
    let mut buf = Vec::new();
    if encoder.encode(&families, &mut buf).is_err() || buf.is_empty() {
        buf.extend_from_slice(b"# no metrics\n");
    }
    buf
}

// Serve one HTTP request (GET / or /metrics) — tiny HTTP 1.1 responder
fn handle_client(mut stream: TcpStream) {
    // Read a bit to consume headers (no full parse)
    let mut _req_buf = [0u8; 1024];
    let _ = stream.read(&mut _req_buf);

    let body = encode_metrics();
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    );

    let _ = stream.write_all(header.as_bytes());
    let _ = stream.write_all(&body);
    let _ = stream.flush();
}

// Run the metrics server in a dedicated OS thread (keeps Tokio runtime clean)
pub async fn serve_metrics(port: u16) {
    thread::spawn(move || {
        let addr = format!("0.0.0.0:{port}");
        let listener = TcpListener::bind(&addr)
            .unwrap_or_else(|e| panic!("metrics bind {} failed: {}", addr, e));
        eprintln!("metrics listening on http://{addr}/ (and /metrics)");

        for conn in listener.incoming() {
            match conn {
                Ok(stream) => handle_client(stream),
                Err(e) => eprintln!("metrics accept error: {}", e),
            }
        }
    });
}
