//! 进程级共享 HTTP 客户端
//!
//! reqwest::Client 内部持有连接池，整个进程复用一个实例即可。
//! 首次调用时按配置构建，之后的调用直接返回同一个引用，不做显式销毁。

use std::sync::OnceLock;
use std::time::Duration;

use crate::error::{AlertError, Result};

static CLIENT: OnceLock<reqwest::Client> = OnceLock::new();

/// 构建一个独立的 HTTP 客户端
pub fn build_client(timeout: Duration) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("alert-dispatcher/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| AlertError::Internal(format!("构建 HTTP 客户端失败: {e}")))
}

/// 获取共享客户端，首次调用时初始化
///
/// 超时参数只在首次初始化时生效。
pub fn shared_client(timeout: Duration) -> Result<&'static reqwest::Client> {
    if let Some(client) = CLIENT.get() {
        return Ok(client);
    }
    let client = build_client(timeout)?;
    // 并发初始化时保留先写入的实例
    Ok(CLIENT.get_or_init(|| client))
}
