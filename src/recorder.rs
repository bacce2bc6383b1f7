// ===============================
// src/recorder.rs
// ===============================
//
// Lightweight JSONL event journal:
// - appends every Event as one JSON line
// - BufWriter to keep syscalls down
// - periodic flush every 1s, plus a flush every N events
// - creates the parent directory when missing
// - on a write failure, reopens the file and carries on
//
// Enabled by RECORD_FILE=/path/to/events.jsonl (see main.rs).
//
use std::path::Path;
use tokio::{
    fs::{self, OpenOptions},
    io::{AsyncWriteExt, BufWriter},
    sync::mpsc,
    time::{interval, Duration, MissedTickBehavior},
};
use tracing::{error, info};

use crate::domain::Event;

async fn open_writer(path: &str) -> BufWriter<tokio::fs::File> {
    // Make sure the parent directory exists (when there is one)
    if let Some(parent) = Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = fs::create_dir_all(parent).await {
                error!(?e, %path, "recorder: create_dir_all failed");
            }
        }
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .unwrap_or_else(|e| panic!("recorder: open {} failed: {}", path, e));

    BufWriter::new(file)
}

pub async fn run(mut rx: mpsc::Receiver<Event>, path: String) {
    info!(%path, "recorder: started");
    let mut writer = open_writer(&path).await;

    // Periodic flush (1s) + count-based flush; sample rate here is seconds,
    // not ticks, so the count threshold is small
    let mut tick = interval(Duration::from_secs(1));
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut since_last_flush: u32 = 0;
    const FLUSH_EVERY_N_EVENTS: u32 = 32;

    loop {
        tokio::select! {
            maybe_ev = rx.recv() => {
                match maybe_ev {
                    Some(ev) => {
                        let line = match serde_json::to_string(&ev) {
                            Ok(s) => s,
                            Err(e) => {
                                error!(?e, "recorder: serialize error, skip event");
                                continue;
                            }
                        };

                        if let Err(e) = writer.write_all(line.as_bytes()).await {
                            error!(?e, "recorder: write_all failed, attempting reopen");
                            writer = open_writer(&path).await;
                            if let Err(e2) = writer.write_all(line.as_bytes()).await {
                                error!(?e2, "recorder: write_all failed again after reopen, drop event");
                                continue;
                            }
                        }
                        if let Err(e) = writer.write_all(b"\n").await {
                            error!(?e, "recorder: write newline failed, attempting reopen");
                            writer = open_writer(&path).await;
                            let _ = writer.write_all(b"\n").await;
                        }

                        since_last_flush += 1;
                        if since_last_flush >= FLUSH_EVERY_N_EVENTS {
                            let _ = writer.flush().await;
                            since_last_flush = 0;
                        }
                    }
                    None => {
                        // Channel closed: flush and stop
                        let _ = writer.flush().await;
                        info!("recorder: channel closed, stopped");
                        break;
                    }
                }
            }

            _ = tick.tick() => {
                let _ = writer.flush().await;
                since_last_flush = 0;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::PriceSample;
    use chrono::Utc;

    #[tokio::test]
    async fn writes_one_json_line_per_event() {
        let dir = std::env::temp_dir().join(format!("recorder-test-{}", std::process::id()));
        let path = dir.join("events.jsonl");
        let path_str = path.to_str().unwrap().to_string();

        let (tx, rx) = mpsc::channel::<Event>(16);
        let handle = tokio::spawn(run(rx, path_str.clone()));

        tx.send(Event::Sample(PriceSample {
            symbol: "LKOH".to_string(),
            price: 7100.5,
            at: Utc::now(),
        }))
        .await
        .unwrap();
        tx.send(Event::Note("sweep done".to_string())).await.unwrap();
        drop(tx);
        handle.await.unwrap();

        let body = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = body.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains("LKOH"));
        let _: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        let _: serde_json::Value = serde_json::from_str(lines[1]).unwrap();

        let _ = tokio::fs::remove_dir_all(&dir).await;
    }
}
