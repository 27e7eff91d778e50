//! 告警推送分发
//!
//! 每个新建的告警文档触发一次分发：
//! - 广播模式：渲染标题正文后推送到固定 topic
//! - 单播模式：按 user_id 查出设备 token 后单推；缺少收件人时静默结束
//!
//! 查询或发送失败原样向上返回，由托管平台决定是否重投。

use std::sync::Arc;

use alert_shared::config::{DispatchConfig, DispatchMode};
use alert_shared::error::AlertError;
use alert_shared::observability::metrics;
use tracing::{info, warn};

use crate::error::DispatchError;
use crate::message::{AndroidConfig, AndroidPriority, PushMessage, Target};
use crate::models::AlertRecord;
use crate::sender::PushSender;
use crate::templates::NotificationTemplateEngine;
use crate::user_store::UserStore;

/// 跳过发送的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    MissingUserId,
    UserNotFound,
    MissingToken,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingUserId => "missing_user_id",
            Self::UserNotFound => "user_not_found",
            Self::MissingToken => "missing_token",
        }
    }
}

/// 单次分发结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent {
        message_id: String,
        /// 脱敏后的目标
        destination: String,
    },
    Skipped(SkipReason),
}

impl DispatchOutcome {
    fn metric_label(&self) -> &'static str {
        match self {
            Self::Sent { .. } => "sent",
            Self::Skipped(SkipReason::MissingUserId) => "skipped_missing_user_id",
            Self::Skipped(SkipReason::UserNotFound) => "skipped_user_not_found",
            Self::Skipped(SkipReason::MissingToken) => "skipped_missing_token",
        }
    }
}

/// 推送分发器
pub struct AlertDispatcher {
    mode: DispatchMode,
    topic: String,
    android: AndroidConfig,
    targeted_android_hints: bool,
    sender: Arc<dyn PushSender>,
    users: Arc<dyn UserStore>,
}

impl AlertDispatcher {
    pub fn new(
        config: &DispatchConfig,
        sender: Arc<dyn PushSender>,
        users: Arc<dyn UserStore>,
    ) -> Result<Self, DispatchError> {
        if config.topic.is_empty() {
            return Err(AlertError::Config("dispatch.topic 不能为空".to_string()).into());
        }
        let priority: AndroidPriority = config.android_priority.parse()?;

        Ok(Self {
            mode: config.mode,
            topic: config.topic.clone(),
            android: AndroidConfig::new(priority, config.android_channel_id.clone()),
            targeted_android_hints: config.targeted_android_hints,
            sender,
            users,
        })
    }

    pub fn mode(&self) -> DispatchMode {
        self.mode
    }

    /// 处理一条新告警
    pub async fn dispatch(&self, alert: &AlertRecord) -> Result<DispatchOutcome, DispatchError> {
        let result = match self.mode {
            DispatchMode::Broadcast => self.dispatch_broadcast(alert).await,
            DispatchMode::Targeted => self.dispatch_targeted(alert).await,
        };

        match &result {
            Ok(outcome) => metrics::record_dispatch(self.mode.as_str(), outcome.metric_label()),
            Err(_) => metrics::record_dispatch(self.mode.as_str(), "failed"),
        }
        result
    }

    async fn dispatch_broadcast(
        &self,
        alert: &AlertRecord,
    ) -> Result<DispatchOutcome, DispatchError> {
        let message = build_broadcast_message(alert, &self.topic, &self.android);
        self.send(alert, message).await
    }

    async fn dispatch_targeted(
        &self,
        alert: &AlertRecord,
    ) -> Result<DispatchOutcome, DispatchError> {
        let Some(user_id) = alert.user_id.as_deref() else {
            info!(alert_id = %alert.id, "告警未指定 user_id，跳过推送");
            return Ok(DispatchOutcome::Skipped(SkipReason::MissingUserId));
        };

        let Some(user) = self.users.find_user(user_id).await? else {
            info!(alert_id = %alert.id, user_id = %user_id, "用户不存在，跳过推送");
            return Ok(DispatchOutcome::Skipped(SkipReason::UserNotFound));
        };

        let Some(token) = user.push_token() else {
            info!(alert_id = %alert.id, user_id = %user_id, "用户没有推送 token，跳过推送");
            return Ok(DispatchOutcome::Skipped(SkipReason::MissingToken));
        };

        let android = self.targeted_android_hints.then_some(&self.android);
        let message = build_targeted_message(alert, token, android);
        self.send(alert, message).await
    }

    async fn send(
        &self,
        alert: &AlertRecord,
        message: PushMessage,
    ) -> Result<DispatchOutcome, DispatchError> {
        let destination = message.target.redacted();
        match self.sender.send(&message).await {
            Ok(receipt) => {
                info!(
                    alert_id = %alert.id,
                    alert_type = %alert.alert_type,
                    destination = %destination,
                    message_id = %receipt.message_id,
                    "告警推送完成"
                );
                Ok(DispatchOutcome::Sent {
                    message_id: receipt.message_id,
                    destination,
                })
            }
            Err(e) => {
                warn!(
                    alert_id = %alert.id,
                    destination = %destination,
                    error = %e,
                    retryable = e.is_retryable(),
                    "告警推送失败"
                );
                Err(e)
            }
        }
    }
}

/// 构造广播消息
pub fn build_broadcast_message(
    alert: &AlertRecord,
    topic: &str,
    android: &AndroidConfig,
) -> PushMessage {
    PushMessage::new(
        Target::Topic(topic.to_string()),
        NotificationTemplateEngine::render_title(&alert.alert_type),
        NotificationTemplateEngine::render_broadcast_body(&alert.note, &alert.lens),
    )
    .with_android(android.clone())
    .with_data("alert_id", alert.id.clone())
    .with_data("type", alert.alert_type.clone())
}

/// 构造单播消息
pub fn build_targeted_message(
    alert: &AlertRecord,
    token: &str,
    android: Option<&AndroidConfig>,
) -> PushMessage {
    let message = PushMessage::new(
        Target::Token(token.to_string()),
        NotificationTemplateEngine::render_title(&alert.alert_type),
        NotificationTemplateEngine::render_targeted_body(&alert.note),
    )
    .with_data("alert_id", alert.id.clone())
    .with_data("type", alert.alert_type.clone());

    match android {
        Some(android) => message.with_android(android.clone()),
        None => message,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::UserRecord;
    use crate::sender::{MockPushSender, SendReceipt};
    use crate::user_store::MockUserStore;

    fn make_alert(alert_type: &str, note: &str, lens: &str, user_id: Option<&str>) -> AlertRecord {
        AlertRecord {
            id: "alert-001".to_string(),
            alert_type: alert_type.to_string(),
            note: note.to_string(),
            lens: lens.to_string(),
            user_id: user_id.map(String::from),
        }
    }

    fn config(mode: DispatchMode) -> DispatchConfig {
        DispatchConfig {
            mode,
            ..Default::default()
        }
    }

    fn receipt() -> Result<SendReceipt, DispatchError> {
        Ok(SendReceipt {
            message_id: "projects/demo/messages/1".to_string(),
        })
    }

    fn android() -> AndroidConfig {
        AndroidConfig::new(AndroidPriority::High, "alerts_channel")
    }

    // ---------------------------------------------------------------------
    // 消息构造
    // ---------------------------------------------------------------------

    #[test]
    fn test_title_replaces_underscores_in_both_modes() {
        let alert = make_alert("motion_detected", "", "", None);
        let broadcast = build_broadcast_message(&alert, "alerts_all", &android());
        let targeted = build_targeted_message(&alert, "tok", None);
        assert_eq!(broadcast.notification.title, "motion detected");
        assert_eq!(targeted.notification.title, "motion detected");
    }

    #[test]
    fn test_broadcast_body_rules() {
        let cases = [
            ("Door opened", "porch", "Door opened"),
            ("Door opened", "", "Door opened"),
            ("", "porch", "Lens: porch"),
            ("", "", "New alert"),
        ];
        for (note, lens, expected) in cases {
            let alert = make_alert("alert", note, lens, None);
            let message = build_broadcast_message(&alert, "alerts_all", &android());
            assert_eq!(message.notification.body, expected, "note={note:?} lens={lens:?}");
        }
    }

    #[test]
    fn test_broadcast_destination_and_hints() {
        let alert = make_alert("smoke", "kitchen", "cam-2", Some("u-1"));
        let message = build_broadcast_message(&alert, "alerts_all", &android());

        assert_eq!(message.target, Target::Topic("alerts_all".to_string()));
        let hints = message.android.expect("广播消息应携带 Android 提示");
        assert_eq!(hints.priority, AndroidPriority::High);
        assert_eq!(hints.notification.channel_id, "alerts_channel");
    }

    #[test]
    fn test_targeted_body_is_note_without_lens_fallback() {
        let alert = make_alert("alert", "", "porch", Some("u-1"));
        let message = build_targeted_message(&alert, "tok-1", None);
        assert_eq!(message.notification.body, "");
        assert_eq!(message.target, Target::Token("tok-1".to_string()));
        assert!(message.android.is_none());
    }

    #[test]
    fn test_payload_carries_id_and_type() {
        let alert = make_alert("motion_detected", "n", "", Some("u-1"));
        for message in [
            build_broadcast_message(&alert, "alerts_all", &android()),
            build_targeted_message(&alert, "tok", None),
        ] {
            assert_eq!(message.data.get("alert_id").map(String::as_str), Some("alert-001"));
            assert_eq!(message.data.get("type").map(String::as_str), Some("motion_detected"));
            assert_eq!(message.data.len(), 2);
        }
    }

    // ---------------------------------------------------------------------
    // 配置校验
    // ---------------------------------------------------------------------

    #[test]
    fn test_invalid_priority_is_rejected() {
        let config = DispatchConfig {
            android_priority: "urgent".to_string(),
            ..Default::default()
        };
        let result = AlertDispatcher::new(
            &config,
            Arc::new(MockPushSender::new()),
            Arc::new(MockUserStore::new()),
        );
        assert!(matches!(
            result,
            Err(DispatchError::Shared(AlertError::Config(_)))
        ));
    }

    #[test]
    fn test_empty_topic_is_rejected() {
        let config = DispatchConfig {
            topic: String::new(),
            ..Default::default()
        };
        let result = AlertDispatcher::new(
            &config,
            Arc::new(MockPushSender::new()),
            Arc::new(MockUserStore::new()),
        );
        assert!(result.is_err());
    }

    // ---------------------------------------------------------------------
    // 广播流程
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_broadcast_sends_to_topic_without_user_lookup() {
        let mut sender = MockPushSender::new();
        sender
            .expect_send()
            .withf(|m: &PushMessage| {
                m.target == Target::Topic("alerts_all".to_string())
                    && m.notification.body == "Lens: garage"
            })
            .times(1)
            .returning(|_| receipt());

        let mut users = MockUserStore::new();
        users.expect_find_user().never();

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Broadcast),
            Arc::new(sender),
            Arc::new(users),
        )
        .unwrap();

        let outcome = dispatcher
            .dispatch(&make_alert("motion_detected", "", "garage", Some("u-1")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                message_id: "projects/demo/messages/1".to_string(),
                destination: "topic:alerts_all".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_broadcast_send_failure_propagates() {
        let mut sender = MockPushSender::new();
        sender
            .expect_send()
            .times(1)
            .returning(|_| Err(AlertError::upstream("fcm", 503, "unavailable").into()));

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Broadcast),
            Arc::new(sender),
            Arc::new(MockUserStore::new()),
        )
        .unwrap();

        let result = dispatcher.dispatch(&make_alert("alert", "", "", None)).await;
        assert!(matches!(
            result,
            Err(DispatchError::Shared(AlertError::Upstream { status: 503, .. }))
        ));
    }

    // ---------------------------------------------------------------------
    // 单播流程
    // ---------------------------------------------------------------------

    #[tokio::test]
    async fn test_targeted_without_user_id_skips() {
        let mut sender = MockPushSender::new();
        sender.expect_send().never();
        let mut users = MockUserStore::new();
        users.expect_find_user().never();

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Targeted),
            Arc::new(sender),
            Arc::new(users),
        )
        .unwrap();

        let outcome = dispatcher
            .dispatch(&make_alert("alert", "note", "", None))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::MissingUserId));
    }

    #[tokio::test]
    async fn test_targeted_unknown_user_skips() {
        let mut sender = MockPushSender::new();
        sender.expect_send().never();
        let mut users = MockUserStore::new();
        users
            .expect_find_user()
            .withf(|id: &str| id == "ghost")
            .times(1)
            .returning(|_| Ok(None));

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Targeted),
            Arc::new(sender),
            Arc::new(users),
        )
        .unwrap();

        let outcome = dispatcher
            .dispatch(&make_alert("alert", "note", "", Some("ghost")))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::UserNotFound));
    }

    #[tokio::test]
    async fn test_targeted_user_without_token_skips() {
        let mut sender = MockPushSender::new();
        sender.expect_send().never();
        let mut users = MockUserStore::new();
        users.expect_find_user().times(1).returning(|id| {
            Ok(Some(UserRecord {
                user_id: id.to_string(),
                fcm_token: Some(String::new()),
            }))
        });

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Targeted),
            Arc::new(sender),
            Arc::new(users),
        )
        .unwrap();

        let outcome = dispatcher
            .dispatch(&make_alert("alert", "note", "", Some("u-1")))
            .await
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Skipped(SkipReason::MissingToken));
    }

    #[tokio::test]
    async fn test_targeted_sends_to_device_token() {
        let mut users = MockUserStore::new();
        users.expect_find_user().times(1).returning(|id| {
            Ok(Some(UserRecord {
                user_id: id.to_string(),
                fcm_token: Some("device-token-abcdef".to_string()),
            }))
        });

        let mut sender = MockPushSender::new();
        sender
            .expect_send()
            .withf(|m: &PushMessage| {
                m.target == Target::Token("device-token-abcdef".to_string())
                    && m.notification.title == "motion detected"
                    && m.notification.body.is_empty()
                    && m.android.is_none()
            })
            .times(1)
            .returning(|_| receipt());

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Targeted),
            Arc::new(sender),
            Arc::new(users),
        )
        .unwrap();

        let outcome = dispatcher
            .dispatch(&make_alert("motion_detected", "", "porch", Some("u-1")))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Sent {
                message_id: "projects/demo/messages/1".to_string(),
                destination: "token:…abcdef".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_targeted_android_hints_when_enabled() {
        let mut users = MockUserStore::new();
        users.expect_find_user().returning(|id| {
            Ok(Some(UserRecord {
                user_id: id.to_string(),
                fcm_token: Some("tok".to_string()),
            }))
        });
        let mut sender = MockPushSender::new();
        sender
            .expect_send()
            .withf(|m: &PushMessage| m.android.is_some())
            .times(1)
            .returning(|_| receipt());

        let config = DispatchConfig {
            mode: DispatchMode::Targeted,
            targeted_android_hints: true,
            ..Default::default()
        };
        let dispatcher =
            AlertDispatcher::new(&config, Arc::new(sender), Arc::new(users)).unwrap();

        dispatcher
            .dispatch(&make_alert("alert", "x", "", Some("u-1")))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_targeted_lookup_failure_propagates() {
        let mut sender = MockPushSender::new();
        sender.expect_send().never();
        let mut users = MockUserStore::new();
        users
            .expect_find_user()
            .returning(|_| Err(AlertError::upstream("firestore", 500, "internal").into()));

        let dispatcher = AlertDispatcher::new(
            &config(DispatchMode::Targeted),
            Arc::new(sender),
            Arc::new(users),
        )
        .unwrap();

        let result = dispatcher
            .dispatch(&make_alert("alert", "", "", Some("u-1")))
            .await;
        assert!(result.is_err());
    }
}
