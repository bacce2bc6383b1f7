// ===============================
// src/telegram.rs
// ===============================
//
// Minimal Telegram Bot API plumbing: long-poll getUpdates + sendMessage.
// Only the fields this bot reads are modeled.
//
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("telegram transport error: {0}")]
    Transport(String),
    #[error("telegram api error: {0}")]
    Api(String),
}

// ---- Minimal update models ----

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default)]
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub text: Option<String>,
    pub chat: Chat,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Clone)]
pub struct TelegramClient {
    http: reqwest::Client,
    base: String,
    token: String,
}

impl TelegramClient {
    // No global client timeout: getUpdates long-polls for up to a minute.
    pub fn new(base: &str, token: &str) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.trim_end_matches('/').to_string(),
            token: token.to_string(),
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, self.token, method)
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, ApiError> {
        let url = format!(
            "{}?offset={}&timeout={}",
            self.method_url("getUpdates"),
            offset,
            timeout_secs
        );
        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let body: ApiResponse<Vec<Update>> = resp
            .json()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        if !body.ok {
            return Err(ApiError::Api(
                body.description.unwrap_or_else(|| "getUpdates rejected".to_string()),
            ));
        }
        Ok(body.result.unwrap_or_default())
    }

    pub async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), ApiError> {
        let query = format!("chat_id={}&text={}", chat_id, urlencoding::encode(text));
        let url = format!("{}?{}", self.method_url("sendMessage"), query);

        let resp = self
            .http
            .post(url)
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(ApiError::Api(format!("{status}: {body}")))
    }
}
