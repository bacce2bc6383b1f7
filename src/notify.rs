// ===============================
// src/notify.rs
// ===============================
//
// Notifier adapters: Telegram Bot API delivery, or log-only for offline runs.
//
use async_trait::async_trait;
use thiserror::Error;
use tracing::info;

use crate::telegram::{ApiError, TelegramClient};

#[derive(Debug, Error)]
pub enum SendError {
    #[error("notify transport error: {0}")]
    Transport(String),
    #[error("unknown destination: {0}")]
    InvalidDestination(i64),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError>;
}

/// NOTIFY_MODE=log: prints what would have been sent.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        info!(chat_id, %text, "notify (log mode)");
        Ok(())
    }
}

pub struct TelegramNotifier {
    api: TelegramClient,
}

impl TelegramNotifier {
    pub fn new(api: TelegramClient) -> Self {
        Self { api }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, chat_id: i64, text: &str) -> Result<(), SendError> {
        match self.api.send_message(chat_id, text).await {
            Ok(()) => Ok(()),
            // Bot API reports a bad chat id in the error description
            Err(ApiError::Api(desc)) if desc.contains("chat not found") => {
                Err(SendError::InvalidDestination(chat_id))
            }
            Err(e) => Err(SendError::Transport(e.to_string())),
        }
    }
}
