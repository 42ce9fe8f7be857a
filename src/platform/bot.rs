// Bot HTTP posting transport. Plain HTTPS against the platform's bot API,
// one request per send, explicit timeout, no retries (the poll loop retries
// by not advancing the cursor).

use async_trait::async_trait;

use super::{BotSender, MediaBlob, PlatformError};

pub struct HttpBot {
    base: String,
    client: reqwest::Client,
}

impl HttpBot {
    pub fn new(base: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(15))
            .build()
            .expect("Failed to create HTTP client");
        Self {
            base: base.trim_end_matches('/').to_string(),
            client,
        }
    }

    fn url(&self, token: &str, method: &str) -> String {
        format!("{}/bot{}/{}", self.base, token, method)
    }

    async fn finish(&self, resp: reqwest::Response) -> Result<i64, PlatformError> {
        let status = resp.status().as_u16();
        let body: serde_json::Value = resp
            .json()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        if body["ok"].as_bool() == Some(true) {
            return Ok(body["result"]["message_id"].as_i64().unwrap_or(0));
        }
        Err(parse_failure(status, &body))
    }
}

/// Map a bot API failure response onto the engine's error kinds.
fn parse_failure(status: u16, body: &serde_json::Value) -> PlatformError {
    let code = body["error_code"].as_u64().unwrap_or(status as u64);
    let description = body["description"].as_str().unwrap_or("unknown error");
    match code {
        429 => {
            let secs = body["parameters"]["retry_after"].as_u64().unwrap_or(30);
            PlatformError::FloodWait(secs)
        }
        401 => PlatformError::AuthRevoked,
        403 => PlatformError::AdminRequired,
        404 => PlatformError::NotFound(description.to_string()),
        400 if description.contains("not found") => {
            PlatformError::NotFound(description.to_string())
        }
        _ => PlatformError::Transport(format!("HTTP {code}: {description}")),
    }
}

/// The bot API wants `@username` or a numeric chat id.
fn chat_id(channel: &str) -> String {
    let chan = channel.trim();
    if chan.starts_with('@') || chan.starts_with('-') || chan.chars().all(|c| c.is_ascii_digit())
    {
        chan.to_string()
    } else {
        format!("@{chan}")
    }
}

#[async_trait]
impl BotSender for HttpBot {
    async fn check(&self, token: &str) -> Result<(), PlatformError> {
        let resp = self
            .client
            .get(self.url(token, "getMe"))
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        self.finish(resp).await.map(|_| ())
    }

    async fn send_text(
        &self,
        token: &str,
        channel: &str,
        text: &str,
        formatted: Option<&str>,
    ) -> Result<i64, PlatformError> {
        let mut payload = serde_json::json!({
            "chat_id": chat_id(channel),
            "text": text,
        });
        if let Some(html) = formatted {
            payload["text"] = serde_json::Value::String(html.to_string());
            payload["parse_mode"] = serde_json::Value::String("HTML".to_string());
        }
        let resp = self
            .client
            .post(self.url(token, "sendMessage"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        self.finish(resp).await
    }

    async fn send_media(
        &self,
        token: &str,
        channel: &str,
        blob: &MediaBlob,
        caption: &str,
    ) -> Result<i64, PlatformError> {
        let (method, field) = if blob.photo {
            ("sendPhoto", "photo")
        } else {
            ("sendDocument", "document")
        };
        let part = reqwest::multipart::Part::bytes(blob.bytes.clone())
            .file_name(blob.filename.clone())
            .mime_str(&blob.mime)
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        let form = reqwest::multipart::Form::new()
            .text("chat_id", chat_id(channel))
            .text("caption", caption.to_string())
            .part(field.to_string(), part);
        let resp = self
            .client
            .post(self.url(token, method))
            .multipart(form)
            .send()
            .await
            .map_err(|e| PlatformError::Transport(e.to_string()))?;
        self.finish(resp).await
    }
}
