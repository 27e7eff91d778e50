//! 通知文案渲染
//!
//! 标题由告警类别生成；正文在广播与单播两种模式下的回退规则不同。

/// 广播模式下 note 与 lens 都为空时的正文
pub const FALLBACK_BODY: &str = "New alert";

/// 广播模式下仅有 lens 时的正文前缀
pub const LENS_PREFIX: &str = "Lens: ";

/// 通知模板引擎
pub struct NotificationTemplateEngine;

impl NotificationTemplateEngine {
    /// 标题：类别中的下划线全部替换为空格
    pub fn render_title(alert_type: &str) -> String {
        alert_type.replace('_', " ")
    }

    /// 广播正文：note → "Lens: {lens}" → "New alert"
    pub fn render_broadcast_body(note: &str, lens: &str) -> String {
        if !note.is_empty() {
            note.to_string()
        } else if !lens.is_empty() {
            format!("{LENS_PREFIX}{lens}")
        } else {
            FALLBACK_BODY.to_string()
        }
    }

    /// 单播正文：原样使用 note，允许为空，不做 lens 回退
    pub fn render_targeted_body(note: &str) -> String {
        note.to_string()
    }
}
