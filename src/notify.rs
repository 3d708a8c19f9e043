//! Telegram notifications for availability alerts
//!
//! Delivery is an HTTP POST of a JSON payload to the Bot API. Failures are
//! reported to the caller, which logs and continues; notification delivery is
//! never fatal to the monitoring loop.

use anyhow::{anyhow, Result};
use chrono::Local;
use serde_json::json;
use tracing::{debug, info};

/// Telegram Bot API client bound to a single chat
pub struct TelegramNotifier {
    client: reqwest::Client,
    base_url: String,
    chat_id: String,
}

impl TelegramNotifier {
    pub fn new(bot_token: &str, chat_id: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("reqwest client with static configuration");

        Self {
            client,
            base_url: format!("https://api.telegram.org/bot{}", bot_token),
            chat_id: chat_id.to_string(),
        }
    }

    /// Send an HTML-formatted message to the configured chat
    pub async fn send_message(&self, text: &str) -> Result<()> {
        let url = format!("{}/sendMessage", self.base_url);
        let payload = message_payload(&self.chat_id, text);

        let response = self
            .client
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| anyhow!("Telegram request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!("Telegram API returned {}: {}", status, body));
        }

        info!("Telegram notification sent");
        Ok(())
    }

    /// Alert that the proxy is unreachable
    pub async fn send_alert(
        &self,
        domain: &str,
        status_code: Option<u16>,
        error: Option<&str>,
        response_time_secs: Option<f64>,
    ) -> Result<()> {
        let text = alert_text(domain, status_code, error, response_time_secs);
        self.send_message(&text).await
    }

    /// Notify that the proxy is reachable again after downtime
    pub async fn send_recovery(&self, domain: &str, downtime_secs: u64) -> Result<()> {
        let text = recovery_text(domain, downtime_secs);
        self.send_message(&text).await
    }

    /// Short test message used by `test-monitor`
    pub async fn send_test(&self, domain: &str) -> Result<()> {
        debug!(domain, "Sending Telegram test message");
        self.send_message(&format!(
            "🔔 <b>Test notification</b>\n\n<b>Domain:</b> {}\nbubblectl can reach the Telegram API.",
            domain
        ))
        .await
    }
}

/// JSON body for the Bot API `sendMessage` call
pub fn message_payload(chat_id: &str, text: &str) -> serde_json::Value {
    json!({
        "chat_id": chat_id,
        "text": text,
        "parse_mode": "HTML",
        "disable_web_page_preview": true,
    })
}

pub fn alert_text(
    domain: &str,
    status_code: Option<u16>,
    error: Option<&str>,
    response_time_secs: Option<f64>,
) -> String {
    let mut text = format!(
        "🔴 <b>PROXY DOWN</b>\n\n<b>Domain:</b> {}\n<b>Time:</b> {}\n",
        domain,
        Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    if let Some(status) = status_code {
        text.push_str(&format!("<b>Status:</b> {}\n", status));
    }
    if let Some(rt) = response_time_secs {
        text.push_str(&format!("<b>Response time:</b> {:.2}s\n", rt));
    }
    if let Some(error) = error {
        text.push_str(&format!("<b>Error:</b> {}\n", error));
    }
    text.push_str("\n⚠️ <i>Check the server and DNS settings</i>");
    text
}

pub fn recovery_text(domain: &str, downtime_secs: u64) -> String {
    format!(
        "✅ <b>PROXY RECOVERED</b>\n\n<b>Domain:</b> {}\n<b>Time:</b> {}\n<b>Downtime:</b> {} seconds\n\n🎉 <i>Back to normal</i>",
        domain,
        Local::now().format("%Y-%m-%d %H:%M:%S"),
        downtime_secs
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_payload_shape() {
        let payload = message_payload("-100200300", "hello");
        assert_eq!(payload["chat_id"], "-100200300");
        assert_eq!(payload["text"], "hello");
        assert_eq!(payload["parse_mode"], "HTML");
        assert_eq!(payload["disable_web_page_preview"], true);
    }

    #[test]
    fn test_alert_text_includes_details() {
        let text = alert_text("example.com", Some(502), Some("Bad status code: 502"), Some(1.5));
        assert!(text.contains("PROXY DOWN"));
        assert!(text.contains("example.com"));
        assert!(text.contains("<b>Status:</b> 502"));
        assert!(text.contains("<b>Response time:</b> 1.50s"));
        assert!(text.contains("Bad status code: 502"));
    }

    #[test]
    fn test_alert_text_omits_absent_fields() {
        let text = alert_text("example.com", None, Some("Timeout after 15s"), None);
        assert!(!text.contains("<b>Status:</b>"));
        assert!(!text.contains("<b>Response time:</b>"));
        assert!(text.contains("Timeout after 15s"));
    }

    #[test]
    fn test_recovery_text() {
        let text = recovery_text("example.com", 420);
        assert!(text.contains("PROXY RECOVERED"));
        assert!(text.contains("420 seconds"));
    }

    #[test]
    fn test_base_url_embeds_token() {
        let notifier = TelegramNotifier::new("123:abc", "42");
        assert_eq!(notifier.base_url, "https://api.telegram.org/bot123:abc");
        assert_eq!(notifier.chat_id, "42");
    }
}
