//! 共享库
//!
//! 包含配置、错误处理、可观测性、Google API 访问（令牌、HTTP 客户端、Firestore 文档模型）等基础设施代码。

pub mod auth;
pub mod config;
pub mod error;
pub mod firestore;
pub mod http;
pub mod observability;
