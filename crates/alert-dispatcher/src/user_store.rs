//! 用户存储
//!
//! 单播模式按 user_id 读取用户文档以获得设备 token，只读不写。

use std::sync::Arc;

use alert_shared::auth::TokenSource;
use alert_shared::config::GoogleConfig;
use alert_shared::error::AlertError;
use alert_shared::firestore::{self, Document};
use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tracing::debug;

use crate::error::DispatchError;
use crate::models::UserRecord;

/// 用户存储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait UserStore: Send + Sync {
    /// 查询用户，不存在时返回 None
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, DispatchError>;
}

/// 基于 Firestore REST API 的用户存储
pub struct FirestoreUserStore {
    client: reqwest::Client,
    token_source: Arc<dyn TokenSource>,
    base_url: String,
    project_id: String,
    database_id: String,
    collection: String,
}

impl FirestoreUserStore {
    pub fn new(
        client: reqwest::Client,
        token_source: Arc<dyn TokenSource>,
        config: &GoogleConfig,
    ) -> Self {
        Self {
            client,
            token_source,
            base_url: config.firestore_base_url.clone(),
            project_id: config.project_id.clone(),
            database_id: config.database_id.clone(),
            collection: config.users_collection.clone(),
        }
    }

    fn document_url(&self, user_id: &str) -> Result<Url, AlertError> {
        firestore::document_url(
            &self.base_url,
            &self.project_id,
            &self.database_id,
            &self.collection,
            user_id,
        )
    }
}

#[async_trait]
impl UserStore for FirestoreUserStore {
    async fn find_user(&self, user_id: &str) -> Result<Option<UserRecord>, DispatchError> {
        let url = self.document_url(user_id)?;
        let token = self.token_source.access_token().await?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(AlertError::from)?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            debug!(user_id = %user_id, "用户文档不存在");
            return Ok(None);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AlertError::upstream("firestore", status.as_u16(), text).into());
        }

        let document: Document = response.json().await.map_err(AlertError::from)?;
        Ok(Some(UserRecord::from_document(user_id, &document)))
    }
}
