use reqwest::Client;
use serde::Serialize;
use tracing::{debug, error};

use crate::config::TelegramSettings;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'a str,
    disable_web_page_preview: bool,
}

/// Posts notification text to the Telegram Bot API when enabled, matching the original
/// source's `send_message_now` behaviour: best-effort, failures are logged and swallowed
/// rather than propagated, since a missed Telegram message must never block trading.
#[derive(Clone)]
pub struct TelegramSink {
    client: Client,
    bot_token: String,
    chat_id: String,
    enabled: bool,
}

impl TelegramSink {
    pub fn new(settings: &TelegramSettings) -> Self {
        Self {
            client: Client::new(),
            bot_token: settings.bot_token.clone(),
            chat_id: settings.chat_id.clone(),
            enabled: settings.enabled,
        }
    }

    pub async fn send(&self, text: &str) -> bool {
        if !self.enabled || self.bot_token.is_empty() || self.chat_id.is_empty() {
            return false;
        }

        let url = format!("{API_BASE}/bot{}/sendMessage", self.bot_token);
        let body = SendMessageRequest { chat_id: &self.chat_id, text, parse_mode: "Markdown", disable_web_page_preview: true };

        match self.client.post(&url).json(&body).send().await {
            Ok(response) if response.status().is_success() => {
                debug!("telegram message sent");
                true
            }
            Ok(response) => {
                error!(status = %response.status(), "telegram send rejected");
                false
            }
            Err(e) => {
                error!(error = %e, "telegram send failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_sink_never_calls_out() {
        let settings = TelegramSettings { bot_token: String::new(), chat_id: String::new(), enabled: false };
        let sink = TelegramSink::new(&settings);
        assert!(!sink.send("test").await);
    }

    #[tokio::test]
    async fn enabled_sink_without_credentials_is_a_noop() {
        let settings = TelegramSettings { bot_token: String::new(), chat_id: "123".to_string(), enabled: true };
        let sink = TelegramSink::new(&settings);
        assert!(!sink.send("test").await);
    }
}
