//! FCM push transport adapter.

use super::PushSender;
use crate::error::{CoreError, CoreResult};
use async_trait::async_trait;
use serde_json::json;
use tracing::debug;

const DEFAULT_ENDPOINT: &str = "https://fcm.googleapis.com/fcm/send";

pub struct FcmClient {
    server_key: String,
    endpoint: String,
    http_client: reqwest::Client,
}

impl FcmClient {
    pub fn new(server_key: String) -> Self {
        Self {
            server_key,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            http_client: reqwest::Client::new(),
        }
    }

    /// Point at a different endpoint (proxies, emulators)
    pub fn with_endpoint(mut self, endpoint: String) -> Self {
        self.endpoint = endpoint;
        self
    }
}

fn message_payload(token: &str, title: &str, body: &str) -> serde_json::Value {
    json!({
        "to": token,
        "notification": {
            "title": title,
            "body": body,
        }
    })
}

#[async_trait]
impl PushSender for FcmClient {
    async fn send(&self, token: &str, title: &str, body: &str) -> CoreResult<()> {
        let response = self
            .http_client
            .post(&self.endpoint)
            .header("Authorization", format!("key={}", self.server_key))
            .json(&message_payload(token, title, body))
            .send()
            .await
            .map_err(|e| CoreError::Internal(format!("fcm request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CoreError::Internal(format!(
                "fcm returned {}: {}",
                status, detail
            )));
        }

        debug!(title = %title, "Push accepted by FCM");
        Ok(())
    }
}
