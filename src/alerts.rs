use std::sync::Arc;

use crate::config::Config;

/// Outbound operator notifications. Fire-and-forget: never retried, never
/// allowed to block the engine.
pub trait AlertSink: Send + Sync {
    fn notify(&self, text: String);
}

/// Delivers alerts through the platform bot `sendMessage` endpoint.
pub struct HttpAlerts {
    client: reqwest::Client,
    url: String,
    chat_id: String,
    topic_id: Option<i64>,
}

impl HttpAlerts {
    pub fn new(base: &str, token: &str, chat_id: &str, topic_id: Option<i64>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            client,
            url: format!("{}/bot{}/sendMessage", base.trim_end_matches('/'), token),
            chat_id: chat_id.to_string(),
            topic_id,
        }
    }
}

impl AlertSink for HttpAlerts {
    fn notify(&self, text: String) {
        let mut payload = serde_json::json!({
            "chat_id": self.chat_id,
            "text": text,
            "disable_web_page_preview": true,
        });
        if let Some(topic) = self.topic_id {
            payload["message_thread_id"] = serde_json::Value::from(topic);
        }
        let request = self.client.post(&self.url).json(&payload);
        tokio::spawn(async move {
            match request.send().await {
                Ok(resp) => {
                    if !resp.status().is_success() {
                        eprintln!("⚠️  alert delivery failed: HTTP {}", resp.status());
                    }
                }
                Err(e) => {
                    eprintln!("⚠️  alert delivery error: {e}");
                }
            }
        });
    }
}

/// Used when no alert bot is configured.
pub struct NullAlerts;

impl AlertSink for NullAlerts {
    fn notify(&self, _text: String) {}
}

/// Build the sink the configuration asks for.
pub fn from_config(config: &Config) -> Arc<dyn AlertSink> {
    match (&config.alert_bot_token, &config.alert_chat_id) {
        (Some(token), Some(chat_id)) => Arc::new(HttpAlerts::new(
            &config.bot_api_base,
            token,
            chat_id,
            config.alert_topic_id,
        )),
        _ => Arc::new(NullAlerts),
    }
}
