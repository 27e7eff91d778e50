//! 触发事件解析
//!
//! 事件路由把 Firestore 文档创建事件以 CloudEvent 形式 POST 过来，支持两种编码：
//! - binary 模式：元数据在 `ce-*` 请求头，body 为 DocumentEventData JSON
//! - structured 模式：`application/cloudevents+json`，元数据与 `data` 同在 body 中

use alert_shared::firestore::{self, Document};
use axum::http::HeaderMap;
use axum::http::header::CONTENT_TYPE;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::DispatchError;
use crate::models::AlertRecord;

/// 文档创建事件类型前缀（带鉴权上下文的变体以 .withAuthContext 结尾）
pub const DOCUMENT_CREATED_EVENT: &str = "google.cloud.firestore.document.v1.created";

const STRUCTURED_CONTENT_TYPE: &str = "application/cloudevents+json";

/// DocumentEventData 的 JSON 形式
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DocumentEventData {
    value: Option<Document>,
}

#[derive(Debug, Deserialize)]
struct StructuredEvent {
    id: Option<String>,
    #[serde(rename = "type")]
    event_type: Option<String>,
    subject: Option<String>,
    time: Option<String>,
    #[serde(default)]
    data: Option<DocumentEventData>,
}

/// 解析后的告警事件
#[derive(Debug, Clone, Default)]
pub struct AlertEvent {
    pub id: Option<String>,
    pub event_type: Option<String>,
    /// 形如 documents/alerts/{id}
    pub subject: Option<String>,
    pub time: Option<DateTime<Utc>>,
    pub document: Option<Document>,
}

impl AlertEvent {
    /// 是否为文档创建事件；未携带类型时按创建事件处理
    pub fn is_document_created(&self) -> bool {
        self.event_type
            .as_deref()
            .is_none_or(|t| t.starts_with(DOCUMENT_CREATED_EVENT))
    }

    /// 文档 ID：优先取资源名，其次取 subject
    pub fn document_id(&self) -> Option<&str> {
        self.document
            .as_ref()
            .and_then(Document::id)
            .or_else(|| self.subject.as_deref().and_then(firestore::document_id_from_name))
    }

    /// 事件产生到被处理之间的延迟
    pub fn delivery_lag(&self, now: DateTime<Utc>) -> Option<chrono::Duration> {
        self.time.map(|t| now - t)
    }

    /// 转为告警记录
    pub fn alert_record(&self) -> Result<AlertRecord, DispatchError> {
        let document = self
            .document
            .as_ref()
            .ok_or_else(|| DispatchError::InvalidEvent("事件缺少 value 文档".to_string()))?;
        let id = self
            .document_id()
            .ok_or_else(|| DispatchError::InvalidEvent("无法确定文档 ID".to_string()))?;
        Ok(AlertRecord::from_document(id, document))
    }
}

/// 解析 HTTP 请求为告警事件
pub fn parse_event(headers: &HeaderMap, body: &[u8]) -> Result<AlertEvent, DispatchError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(DispatchError::InvalidEvent("请求体为空".to_string()));
    }

    let structured = headers
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with(STRUCTURED_CONTENT_TYPE));

    if structured {
        let event: StructuredEvent = serde_json::from_slice(body)
            .map_err(|e| DispatchError::InvalidEvent(format!("CloudEvent 解析失败: {e}")))?;
        return Ok(AlertEvent {
            id: event.id,
            event_type: event.event_type,
            subject: event.subject,
            time: event.time.as_deref().and_then(parse_time),
            document: event.data.and_then(|d| d.value),
        });
    }

    let data: DocumentEventData = serde_json::from_slice(body)
        .map_err(|e| DispatchError::InvalidEvent(format!("事件数据解析失败: {e}")))?;

    Ok(AlertEvent {
        id: header_str(headers, "ce-id"),
        event_type: header_str(headers, "ce-type"),
        subject: header_str(headers, "ce-subject"),
        time: header_str(headers, "ce-time").as_deref().and_then(parse_time),
        document: data.value,
    })
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(String::from)
}

fn parse_time(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn binary_headers(event_type: &str, subject: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("ce-id", HeaderValue::from_static("evt-1"));
        headers.insert("ce-type", HeaderValue::from_str(event_type).unwrap());
        headers.insert("ce-subject", HeaderValue::from_str(subject).unwrap());
        headers.insert("ce-time", HeaderValue::from_static("2024-05-01T10:00:00Z"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers
    }

    fn alert_body() -> Vec<u8> {
        serde_json::to_vec(&serde_json::json!({
            "value": {
                "name": "projects/demo/databases/(default)/documents/alerts/a1",
                "fields": {
                    "type": {"stringValue": "motion_detected"},
                    "lens": {"stringValue": "garage"}
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_binary_event() {
        let headers = binary_headers(DOCUMENT_CREATED_EVENT, "documents/alerts/a1");
        let event = parse_event(&headers, &alert_body()).unwrap();

        assert_eq!(event.id.as_deref(), Some("evt-1"));
        assert!(event.is_document_created());
        assert!(event.time.is_some());

        let alert = event.alert_record().unwrap();
        assert_eq!(alert.id, "a1");
        assert_eq!(alert.alert_type, "motion_detected");
        assert_eq!(alert.lens, "garage");
    }

    #[test]
    fn test_id_falls_back_to_subject() {
        let headers = binary_headers(DOCUMENT_CREATED_EVENT, "documents/alerts/from-subject");
        let body = serde_json::to_vec(&serde_json::json!({
            "value": {"fields": {"type": {"stringValue": "smoke"}}}
        }))
        .unwrap();

        let alert = parse_event(&headers, &body).unwrap().alert_record().unwrap();
        assert_eq!(alert.id, "from-subject");
    }

    #[test]
    fn test_parse_structured_event() {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/cloudevents+json; charset=utf-8"),
        );
        let body = serde_json::to_vec(&serde_json::json!({
            "specversion": "1.0",
            "id": "evt-9",
            "type": "google.cloud.firestore.document.v1.created.withAuthContext",
            "source": "//firestore.googleapis.com/projects/demo/databases/(default)",
            "subject": "documents/alerts/a9",
            "data": {"value": {"fields": {"note": {"stringValue": "hi"}}}}
        }))
        .unwrap();

        let event = parse_event(&headers, &body).unwrap();
        assert!(event.is_document_created());
        let alert = event.alert_record().unwrap();
        assert_eq!(alert.id, "a9");
        assert_eq!(alert.note, "hi");
    }

    #[test]
    fn test_non_create_event_is_not_created() {
        let headers = binary_headers(
            "google.cloud.firestore.document.v1.updated",
            "documents/alerts/a1",
        );
        let event = parse_event(&headers, &alert_body()).unwrap();
        assert!(!event.is_document_created());
    }

    #[test]
    fn test_missing_type_header_counts_as_created() {
        let event = parse_event(&HeaderMap::new(), &alert_body()).unwrap();
        assert!(event.is_document_created());
        assert_eq!(event.alert_record().unwrap().id, "a1");
    }

    #[test]
    fn test_invalid_bodies() {
        let headers = HeaderMap::new();
        assert!(matches!(
            parse_event(&headers, b""),
            Err(DispatchError::InvalidEvent(_))
        ));
        assert!(matches!(
            parse_event(&headers, b"not json"),
            Err(DispatchError::InvalidEvent(_))
        ));

        let no_value = parse_event(&headers, b"{}").unwrap();
        assert!(matches!(
            no_value.alert_record(),
            Err(DispatchError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_missing_document_id() {
        let body = serde_json::to_vec(&serde_json::json!({"value": {"fields": {}}})).unwrap();
        let event = parse_event(&HeaderMap::new(), &body).unwrap();
        assert!(matches!(
            event.alert_record(),
            Err(DispatchError::InvalidEvent(_))
        ));
    }

    #[test]
    fn test_delivery_lag() {
        let headers = binary_headers(DOCUMENT_CREATED_EVENT, "documents/alerts/a1");
        let event = parse_event(&headers, &alert_body()).unwrap();
        let now = parse_time("2024-05-01T10:00:02Z").unwrap();
        assert_eq!(event.delivery_lag(now), Some(chrono::Duration::seconds(2)));
    }
}
