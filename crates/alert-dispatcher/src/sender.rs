//! 推送发送器
//!
//! 通过 `PushSender` trait 抽象发送行为，生产实现调用 FCM HTTP v1 `messages:send`。
//! 发送失败直接返回错误，不做本地重试。

use std::sync::Arc;
use std::time::Instant;

use alert_shared::auth::TokenSource;
use alert_shared::config::GoogleConfig;
use alert_shared::error::AlertError;
use alert_shared::observability::metrics;
use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::DispatchError;
use crate::message::{PushMessage, SendRequest};

/// 发送回执
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendReceipt {
    /// FCM 返回的消息资源名，如 projects/p/messages/0:123
    pub message_id: String,
}

/// 推送发送器 trait
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PushSender: Send + Sync {
    async fn send(&self, message: &PushMessage) -> Result<SendReceipt, DispatchError>;
}

#[derive(Debug, Deserialize)]
struct SendResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: String,
}

/// FCM HTTP v1 发送器
pub struct FcmSender {
    client: reqwest::Client,
    token_source: Arc<dyn TokenSource>,
    endpoint: String,
    validate_only: bool,
}

impl FcmSender {
    pub fn new(
        client: reqwest::Client,
        token_source: Arc<dyn TokenSource>,
        config: &GoogleConfig,
    ) -> Result<Self, DispatchError> {
        if config.project_id.is_empty() {
            return Err(AlertError::Config("google.project_id 未配置".to_string()).into());
        }
        let endpoint = format!(
            "{}/v1/projects/{}/messages:send",
            config.fcm_base_url.trim_end_matches('/'),
            config.project_id
        );
        Ok(Self {
            client,
            token_source,
            endpoint,
            validate_only: config.validate_only,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post(&self, message: &PushMessage) -> Result<SendReceipt, DispatchError> {
        let token = self.token_source.access_token().await?;
        let request = SendRequest {
            message,
            validate_only: self.validate_only,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(token)
            .json(&request)
            .send()
            .await
            .map_err(AlertError::from)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorEnvelope>(&text)
                .map(|e| format!("{} {}", e.error.status, e.error.message).trim().to_string())
                .unwrap_or(text);
            return Err(AlertError::upstream("fcm", status.as_u16(), detail).into());
        }

        let parsed: SendResponse = response.json().await.map_err(AlertError::from)?;
        Ok(SendReceipt {
            message_id: parsed.name,
        })
    }
}

#[async_trait]
impl PushSender for FcmSender {
    async fn send(&self, message: &PushMessage) -> Result<SendReceipt, DispatchError> {
        let start = Instant::now();
        let result = self.post(message).await;
        let elapsed = start.elapsed().as_secs_f64();

        match &result {
            Ok(receipt) => {
                metrics::record_push_send(message.target.kind(), "ok", elapsed);
                info!(
                    target_kind = message.target.kind(),
                    destination = %message.target,
                    message_id = %receipt.message_id,
                    validate_only = self.validate_only,
                    "推送已发送"
                );
            }
            Err(e) => {
                metrics::record_push_send(message.target.kind(), "error", elapsed);
                warn!(
                    destination = %message.target,
                    error = %e,
                    "推送发送失败"
                );
            }
        }
        debug!(elapsed_secs = elapsed, "FCM 调用结束");

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alert_shared::auth::StaticTokenSource;

    #[test]
    fn test_endpoint_from_config() {
        let config = GoogleConfig {
            project_id: "demo-project".to_string(),
            fcm_base_url: "http://localhost:9099/".to_string(),
            ..Default::default()
        };
        let sender = FcmSender::new(
            reqwest::Client::new(),
            Arc::new(StaticTokenSource::new("owner")),
            &config,
        )
        .unwrap();
        assert_eq!(
            sender.endpoint(),
            "http://localhost:9099/v1/projects/demo-project/messages:send"
        );
    }

    #[test]
    fn test_missing_project_is_config_error() {
        let result = FcmSender::new(
            reqwest::Client::new(),
            Arc::new(StaticTokenSource::new("owner")),
            &GoogleConfig::default(),
        );
        assert!(matches!(
            result,
            Err(DispatchError::Shared(AlertError::Config(_)))
        ));
    }
}
