//! 告警与用户记录
//!
//! 两者都由上游写入 Firestore，本服务只读。字段缺省规则在构造时一次性应用，
//! 后续渲染逻辑只面对已经归一化的字符串。

use alert_shared::firestore::Document;

/// `type` 缺失或为假值时使用的类别
pub const DEFAULT_ALERT_TYPE: &str = "alert";

/// 告警记录
#[derive(Debug, Clone, PartialEq)]
pub struct AlertRecord {
    /// 存储层分配的文档 ID
    pub id: String,
    pub alert_type: String,
    /// 缺失时为空串
    pub note: String,
    /// 缺失时为空串
    pub lens: String,
    pub user_id: Option<String>,
}

impl AlertRecord {
    pub fn from_document(id: impl Into<String>, document: &Document) -> Self {
        Self {
            id: id.into(),
            alert_type: document
                .truthy_string("type")
                .unwrap_or_else(|| DEFAULT_ALERT_TYPE.to_string()),
            note: document.truthy_string("note").unwrap_or_default(),
            lens: document.truthy_string("lens").unwrap_or_default(),
            user_id: document.truthy_string("user_id"),
        }
    }
}

/// 用户记录
#[derive(Debug, Clone, PartialEq)]
pub struct UserRecord {
    pub user_id: String,
    pub fcm_token: Option<String>,
}

impl UserRecord {
    pub fn from_document(user_id: impl Into<String>, document: &Document) -> Self {
        Self {
            user_id: user_id.into(),
            fcm_token: document.truthy_string("fcm_token"),
        }
    }

    /// 可用的设备 token，空串视为没有
    pub fn push_token(&self) -> Option<&str> {
        self.fcm_token.as_deref().filter(|t| !t.is_empty())
    }
}
