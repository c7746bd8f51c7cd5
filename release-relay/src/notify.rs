//! Announcement channels: a Zulip stream and a generic JSON webhook (social posting queue).

use async_trait::async_trait;
use serde::Deserialize;

use release_relay_core::changelog::ChangelogBundle;
use release_relay_core::contract::Notifier;
use release_relay_core::HostError;

use crate::load_config::ZulipSettings;

pub struct ZulipNotifier {
    http: reqwest::Client,
    settings: ZulipSettings,
}

impl ZulipNotifier {
    pub fn new(http: reqwest::Client, settings: ZulipSettings) -> Self {
        Self { http, settings }
    }
}

#[derive(Debug, Deserialize)]
struct ZulipResponse {
    result: String,
    #[serde(default)]
    msg: String,
}

#[async_trait]
impl Notifier for ZulipNotifier {
    fn name(&self) -> String {
        format!("zulip:{}/{}", self.settings.stream, self.settings.topic)
    }

    async fn notify(&self, bundle: &ChangelogBundle) -> Result<(), HostError> {
        let url = format!("{}/api/v1/messages", self.settings.site.trim_end_matches('/'));
        let form = [
            ("type", "stream"),
            ("to", self.settings.stream.as_str()),
            ("topic", self.settings.topic.as_str()),
            ("content", bundle.social.as_str()),
        ];
        let response = self
            .http
            .post(&url)
            .basic_auth(&self.settings.bot_email, Some(&self.settings.bot_api_key))
            .form(&form)
            .send()
            .await?;
        let status = response.status();
        let body: ZulipResponse = response.json().await?;
        if !status.is_success() || body.result != "success" {
            return Err(HostError::Rejected {
                status: status.as_u16(),
                body: body.msg,
            });
        }
        Ok(())
    }
}

/// Posts `{"content": <social>, "announcement": <ann_meta>}` to a webhook.
pub struct WebhookNotifier {
    http: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(http: reqwest::Client, url: String) -> Self {
        Self { http, url }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    fn name(&self) -> String {
        "social-webhook".to_string()
    }

    async fn notify(&self, bundle: &ChangelogBundle) -> Result<(), HostError> {
        let announcement: serde_json::Value = serde_json::from_str(&bundle.ann_meta)
            .map_err(|e| HostError::Decode(e.to_string()))?;
        let payload = serde_json::json!({
            "content": bundle.social,
            "announcement": announcement,
        });
        let response = self.http.post(&self.url).json(&payload).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| String::from("<Failed to decode response body>"));
            return Err(HostError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }
}
