//! 分发服务错误类型
//!
//! 缺少收件人等数据不算错误；这里只覆盖事件本身不可解析，
//! 以及用户查询 / 推送发送失败两类。响应码决定托管平台是否重投。

use alert_shared::error::AlertError;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("事件格式无效: {0}")]
    InvalidEvent(String),

    #[error(transparent)]
    Shared(#[from] AlertError),
}

impl DispatchError {
    /// 对应的 HTTP 状态码
    ///
    /// 无法解析的事件返回 400，重投也不会成功；协作方失败返回 5xx 交由平台重试
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidEvent(_) => StatusCode::BAD_REQUEST,
            Self::Shared(AlertError::Http(_))
            | Self::Shared(AlertError::Upstream { .. })
            | Self::Shared(AlertError::Auth(_)) => StatusCode::BAD_GATEWAY,
            Self::Shared(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 重投是否可能成功：事件本身无效时永远不会
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidEvent(_) => false,
            Self::Shared(e) => e.is_retryable(),
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidEvent(_) => "INVALID_EVENT",
            Self::Shared(e) => e.code(),
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        let body = json!({
            "status": "error",
            "code": self.error_code(),
            "message": self.to_string(),
            "retryable": self.is_retryable(),
        });
        (self.status_code(), axum::Json(body)).into_response()
    }
}
