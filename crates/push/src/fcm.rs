use async_trait::async_trait;
use clap::Parser;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::{PushError, PushMessage, Pusher, SupportedPusher};

/// Firebase Cloud Messaging configuration
#[derive(Parser, Debug, Clone)]
pub struct FcmConfig {
    /// FCM server key, required unless running in dry-run mode
    #[clap(long, env)]
    pub fcm_server_key: Option<String>,

    #[clap(long, env, default_value = "https://fcm.googleapis.com/fcm/send")]
    pub fcm_url: url::Url,
}

#[derive(Debug, Serialize)]
struct FcmRequest<'a> {
    to: &'a str,
    priority: &'static str,
    notification: FcmNotification<'a>,
}

#[derive(Debug, Serialize)]
struct FcmNotification<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Deserialize)]
struct FcmResponse {
    #[serde(default)]
    failure: u32,
    #[serde(default)]
    results: Vec<FcmResult>,
}

#[derive(Debug, Deserialize)]
struct FcmResult {
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FcmPusher {
    client: reqwest::Client,
    url: url::Url,
}

impl FcmPusher {
    pub fn try_from_config(config: &FcmConfig) -> Result<Self, PushError> {
        let key = config.fcm_server_key.as_deref().ok_or_else(|| {
            PushError::InvalidConfiguration("FCM_SERVER_KEY is not set".to_string())
        })?;

        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("key={key}"))
            .map_err(|e| PushError::InvalidConfiguration(format!("Invalid FCM key: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            url: config.fcm_url.clone(),
        })
    }
}

#[async_trait]
impl Pusher for FcmPusher {
    type Error = PushError;

    async fn notify(&self, message: PushMessage<'_>) -> Result<(), Self::Error> {
        let request = FcmRequest {
            to: message.token,
            priority: "high",
            notification: FcmNotification {
                title: message.title,
                body: message.body,
            },
        };

        let response = self
            .client
            .post(self.url.clone())
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PushError::Rejected { status, body });
        }

        let parsed: FcmResponse = response.json().await?;
        if parsed.failure > 0 {
            let reason = parsed
                .results
                .into_iter()
                .find_map(|result| result.error)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(PushError::DeliveryFailed { reason });
        }

        debug!("Push delivered: {}", message.title);
        Ok(())
    }

    fn to_supported_pusher(&self) -> SupportedPusher {
        SupportedPusher::Fcm
    }
}
