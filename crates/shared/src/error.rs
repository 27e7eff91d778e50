//! 统一错误处理模块
//!
//! 定义调用 Google API（Firestore / FCM / 元数据服务器）时共享的错误类型，
//! 使用 thiserror 提供良好的错误信息。

use thiserror::Error;

/// 系统错误类型
#[derive(Debug, Error)]
pub enum AlertError {
    // ==================== 网络错误 ====================
    #[error("HTTP 请求失败: {0}")]
    Http(#[from] reqwest::Error),

    // ==================== 外部服务错误 ====================
    #[error("外部服务错误: {service} status={status} - {message}")]
    Upstream {
        service: String,
        status: u16,
        message: String,
    },

    #[error("获取访问令牌失败: {0}")]
    Auth(String),

    // ==================== 数据错误 ====================
    #[error("文档格式无效: {0}")]
    InvalidDocument(String),

    #[error("配置错误: {0}")]
    Config(String),

    // ==================== 通用错误 ====================
    #[error("内部错误: {0}")]
    Internal(String),
}

/// 错误结果类型别名
pub type Result<T> = std::result::Result<T, AlertError>;

impl AlertError {
    /// 由非 2xx 响应构造上游错误
    pub fn upstream(service: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Upstream {
            service: service.into(),
            status,
            message: message.into(),
        }
    }

    /// 获取错误码
    pub fn code(&self) -> &'static str {
        match self {
            Self::Http(_) => "HTTP_ERROR",
            Self::Upstream { .. } => "UPSTREAM_ERROR",
            Self::Auth(_) => "AUTH_ERROR",
            Self::InvalidDocument(_) => "INVALID_DOCUMENT",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// 是否为可重试错误
    ///
    /// 写入失败日志与错误响应体，供托管平台和排障参考；本服务自身不做重试
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Upstream { status, .. } => *status == 429 || *status >= 500,
            Self::Auth(_) => true,
            Self::InvalidDocument(_) | Self::Config(_) | Self::Internal(_) => false,
        }
    }
}
