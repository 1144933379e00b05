//! Telegram delivery for finished wallet summaries.

use std::time::Duration;

use async_trait::async_trait;
use drover_queue::Notify;
use reqwest::Client;
use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::settings::TelegramSettings;

/// Longest message Telegram gets in one request, in characters.
const CHUNK_CHARS: usize = 1900;

const API_BASE: &str = "https://api.telegram.org";

pub struct TelegramNotifier {
    http: Client,
    api_base: String,
    bot_token: String,
    user_ids: Vec<i64>,
}

impl TelegramNotifier {
    pub fn new(settings: &TelegramSettings) -> Result<Self, reqwest::Error> {
        let http = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            http,
            api_base: API_BASE.to_string(),
            bot_token: settings.bot_token.trim().to_string(),
            user_ids: settings.user_ids.clone(),
        })
    }

    /// Point at another Bot API host.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    pub fn is_enabled(&self) -> bool {
        !self.bot_token.is_empty()
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), String> {
        let url = format!("{}/bot{}/sendMessage", self.api_base, self.bot_token);
        let response = self
            .http
            .post(&url)
            .json(&json!({
                "parse_mode": "html",
                "disable_web_page_preview": true,
                "chat_id": chat_id,
                "text": text,
            }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        if body.get("ok").and_then(Value::as_bool) != Some(true) {
            return Err(body.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl Notify for TelegramNotifier {
    async fn notify(&self, text: String) {
        if !self.is_enabled() {
            debug!("telegram disabled, summary not sent");
            return;
        }

        let chunks = chunk(&text, CHUNK_CHARS);
        for &chat_id in &self.user_ids {
            for part in &chunks {
                if let Err(error) = self.send(chat_id, part).await {
                    warn!(chat_id, %error, "failed to send telegram message");
                }
            }
        }
    }
}

/// Split `text` into pieces of at most `size` characters.
fn chunk(text: &str, size: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    chars
        .chunks(size.max(1))
        .map(|piece| piece.iter().collect())
        .collect()
}
