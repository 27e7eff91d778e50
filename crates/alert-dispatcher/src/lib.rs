//! 告警推送分发服务
//!
//! 接收 Firestore `alerts` 集合的文档创建事件，渲染通知文案，
//! 广播到固定 topic 或按用户 token 单推到设备。

pub mod dispatcher;
pub mod error;
pub mod event;
pub mod handlers;
pub mod message;
pub mod models;
pub mod routes;
pub mod sender;
pub mod state;
pub mod templates;
pub mod user_store;
