//! HTTP 处理器
//!
//! 每个请求对应一次告警文档创建事件。发送成功或静默跳过都返回 200，
//! 协作方失败返回 5xx 让托管平台按自身策略重投。

use alert_shared::observability::tracing::{current_trace_id, set_parent_from_headers};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
};
use chrono::Utc;
use serde::Serialize;
use tracing::{Instrument, debug, info, info_span};

use crate::dispatcher::DispatchOutcome;
use crate::error::DispatchError;
use crate::event::{AlertEvent, parse_event};
use crate::state::AppState;

/// 事件处理响应
#[derive(Debug, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DispatchResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<&'static str>,
}

/// 处理告警文档创建事件
pub async fn handle_alert_event(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DispatchResponse>, DispatchError> {
    let event = parse_event(&headers, &body)?;

    let span = info_span!(
        "alert_event",
        event_id = event.id.as_deref().unwrap_or("-"),
        mode = state.dispatcher.mode().as_str(),
    );
    set_parent_from_headers(&span, &headers);

    process_event(state, event).instrument(span).await
}

async fn process_event(
    state: AppState,
    event: AlertEvent,
) -> Result<Json<DispatchResponse>, DispatchError> {
    if !event.is_document_created() {
        debug!(event_type = ?event.event_type, "非文档创建事件，忽略");
        return Ok(Json(DispatchResponse {
            status: "ignored",
            alert_id: None,
            message_id: None,
            reason: Some("not_a_create_event"),
        }));
    }

    let alert = event.alert_record()?;
    let trace_id = current_trace_id().unwrap_or_default();
    info!(
        alert_id = %alert.id,
        alert_type = %alert.alert_type,
        lag_ms = event.delivery_lag(Utc::now()).map(|lag| lag.num_milliseconds()),
        trace_id = %trace_id,
        "收到告警事件"
    );

    let outcome = state.dispatcher.dispatch(&alert).await?;
    let response = match outcome {
        DispatchOutcome::Sent { message_id, .. } => DispatchResponse {
            status: "sent",
            alert_id: Some(alert.id),
            message_id: Some(message_id),
            reason: None,
        },
        DispatchOutcome::Skipped(reason) => DispatchResponse {
            status: "skipped",
            alert_id: Some(alert.id),
            message_id: None,
            reason: Some(reason.as_str()),
        },
    };
    Ok(Json(response))
}

/// 存活探针
pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "alert-dispatcher"
    }))
}
