//! Google API 访问令牌
//!
//! Cloud Run / GCE 上通过元数据服务器获取服务账号的 OAuth2 access token；
//! 本地调试或连接模拟器时可直接配置静态 token。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use crate::config::GoogleConfig;
use crate::error::{AlertError, Result};

/// 距离过期不足该时长时提前刷新
const REFRESH_MARGIN: Duration = Duration::from_secs(60);

/// 访问令牌来源
#[async_trait]
pub trait TokenSource: Send + Sync {
    /// 返回可直接放入 Authorization: Bearer 的 token
    async fn access_token(&self) -> Result<String>;
}

/// 固定 token
pub struct StaticTokenSource {
    token: String,
}

impl StaticTokenSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

#[async_trait]
impl TokenSource for StaticTokenSource {
    async fn access_token(&self) -> Result<String> {
        Ok(self.token.clone())
    }
}

#[derive(Debug, Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    expires_in: u64,
}

struct CachedToken {
    token: String,
    expires_at: Instant,
}

/// 元数据服务器 token，按过期时间缓存
pub struct MetadataTokenSource {
    client: reqwest::Client,
    url: String,
    cache: Mutex<Option<CachedToken>>,
}

impl MetadataTokenSource {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
            cache: Mutex::new(None),
        }
    }

    async fn fetch(&self) -> Result<CachedToken> {
        let response = self
            .client
            .get(&self.url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| AlertError::Auth(format!("请求元数据服务器失败: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AlertError::Auth(format!(
                "元数据服务器返回 {}: {}",
                status.as_u16(),
                body
            )));
        }

        let parsed: MetadataTokenResponse = response
            .json()
            .await
            .map_err(|e| AlertError::Auth(format!("解析 token 响应失败: {e}")))?;

        debug!(expires_in = parsed.expires_in, "已刷新访问令牌");

        Ok(CachedToken {
            token: parsed.access_token,
            expires_at: Instant::now() + Duration::from_secs(parsed.expires_in),
        })
    }
}

#[async_trait]
impl TokenSource for MetadataTokenSource {
    async fn access_token(&self) -> Result<String> {
        // 持锁期间完成刷新，避免并发请求同时打到元数据服务器
        let mut cache = self.cache.lock().await;
        if let Some(cached) = cache.as_ref() {
            if cached.expires_at > Instant::now() + REFRESH_MARGIN {
                return Ok(cached.token.clone());
            }
        }

        let fresh = self.fetch().await?;
        let token = fresh.token.clone();
        *cache = Some(fresh);
        Ok(token)
    }
}

/// 根据配置选择 token 来源
pub fn token_source_from_config(
    config: &GoogleConfig,
    client: reqwest::Client,
) -> Arc<dyn TokenSource> {
    match config.access_token.as_deref().filter(|t| !t.is_empty()) {
        Some(token) => Arc::new(StaticTokenSource::new(token)),
        None => Arc::new(MetadataTokenSource::new(
            client,
            config.metadata_token_url.clone(),
        )),
    }
}
