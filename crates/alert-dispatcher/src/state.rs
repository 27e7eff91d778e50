//! 应用状态定义

use std::sync::Arc;

use crate::dispatcher::AlertDispatcher;

/// Axum 应用共享状态
///
/// 分发器内部持有发送器与用户存储的 Arc 句柄，进程内只构建一次
#[derive(Clone)]
pub struct AppState {
    pub dispatcher: Arc<AlertDispatcher>,
}

impl AppState {
    pub fn new(dispatcher: Arc<AlertDispatcher>) -> Self {
        Self { dispatcher }
    }
}
