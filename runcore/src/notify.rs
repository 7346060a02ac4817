use anyhow::{Context, Result};
use serde_json::{Value, json};

/// Something that can push a message to a chat.
pub trait Notifier: Send + Sync {
    fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: &str,
        keyboard: &Value,
    ) -> Result<String>;
}

/// Builds a reply keyboard, one inner `Vec` per row of buttons.
pub fn keyboard(rows: &[Vec<String>]) -> Value {
    json!({
        "keyboard": rows,
        "resize_keyboard": true,
    })
}

/// Thin wrapper over the Telegram bot `sendMessage` endpoint.
pub struct TelegramNotifier {
    api_url: String,
    client: reqwest::blocking::Client,
}

impl TelegramNotifier {
    pub fn new(api_base: &str, token: &str) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .build()
            .context("failed to build HTTP client")?;
        Ok(TelegramNotifier {
            api_url: format!("{}/bot{token}/", api_base.trim_end_matches('/')),
            client,
        })
    }
}

impl Notifier for TelegramNotifier {
    fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        parse_mode: &str,
        keyboard: &Value,
    ) -> Result<String> {
        let body = json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": parse_mode,
            "reply_markup": keyboard,
        });
        let response = self
            .client
            .post(format!("{}sendMessage", self.api_url))
            .json(&body)
            .send()
            .context("Failed to send message")?
            .error_for_status()
            .context("Failed to send message")?;
        response.text().context("Failed to read response")
    }
}
