//! FCM HTTP v1 消息模型
//!
//! 只覆盖本服务用到的字段：目标（topic 或 token）、通知标题正文、
//! Android 投递提示以及字符串键值的 data 载荷。

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use alert_shared::error::AlertError;
use serde::Serialize;

/// 投递目标
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Target {
    Topic(String),
    Token(String),
}

impl Target {
    /// 指标标签
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Topic(_) => "topic",
            Self::Token(_) => "token",
        }
    }

    /// 日志用的脱敏表示，设备 token 只保留末尾 6 位
    pub fn redacted(&self) -> String {
        match self {
            Self::Topic(topic) => format!("topic:{topic}"),
            Self::Token(token) => {
                let chars: Vec<char> = token.chars().collect();
                let tail: String = chars[chars.len().saturating_sub(6)..].iter().collect();
                format!("token:…{tail}")
            }
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
}

/// Android 消息优先级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AndroidPriority {
    Normal,
    High,
}

impl FromStr for AndroidPriority {
    type Err = AlertError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "normal" => Ok(Self::Normal),
            "high" => Ok(Self::High),
            other => Err(AlertError::Config(format!(
                "无效的 Android 优先级: {other}"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AndroidNotification {
    pub channel_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AndroidConfig {
    pub priority: AndroidPriority,
    pub notification: AndroidNotification,
}

impl AndroidConfig {
    pub fn new(priority: AndroidPriority, channel_id: impl Into<String>) -> Self {
        Self {
            priority,
            notification: AndroidNotification {
                channel_id: channel_id.into(),
            },
        }
    }
}

/// 推送消息
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PushMessage {
    #[serde(flatten)]
    pub target: Target,
    pub notification: Notification,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub android: Option<AndroidConfig>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub data: BTreeMap<String, String>,
}

impl PushMessage {
    pub fn new(target: Target, title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            target,
            notification: Notification {
                title: title.into(),
                body: body.into(),
            },
            android: None,
            data: BTreeMap::new(),
        }
    }

    pub fn with_android(mut self, android: AndroidConfig) -> Self {
        self.android = Some(android);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

/// messages:send 请求体
#[derive(Debug, Serialize)]
pub struct SendRequest<'a> {
    pub message: &'a PushMessage,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub validate_only: bool,
}
