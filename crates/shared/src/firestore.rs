//! Firestore 文档模型
//!
//! Firestore REST API 与 document 事件中的字段都以带类型标签的 JSON 表示，
//! 例如 `{"stringValue": "motion"}`、`{"integerValue": "3"}`。
//! 这里负责把它们解码为 `FieldValue`，并提供与 JS 运行时一致的真值判断和字符串化，
//! 保证 `type || "alert"` 这类缺省逻辑在不同取值类型下行为不变。

use std::collections::HashMap;

use reqwest::Url;
use serde::{Deserialize, Deserializer};

use crate::error::{AlertError, Result};

/// Firestore 字段值
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FieldValue {
    NullValue(Option<String>),
    BooleanValue(bool),
    /// int64 在 JSON 中以字符串传输
    IntegerValue(String),
    #[serde(deserialize_with = "deserialize_double")]
    DoubleValue(f64),
    TimestampValue(String),
    StringValue(String),
    BytesValue(String),
    ReferenceValue(String),
    GeoPointValue(GeoPoint),
    ArrayValue(ArrayValue),
    MapValue(MapValue),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GeoPoint {
    #[serde(default)]
    pub latitude: f64,
    #[serde(default)]
    pub longitude: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ArrayValue {
    #[serde(default)]
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct MapValue {
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
}

/// doubleValue 可能是数字，也可能是 "NaN" / "Infinity" / "-Infinity" 字符串
fn deserialize_double<'de, D>(deserializer: D) -> std::result::Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Repr {
        Number(f64),
        Text(String),
    }

    match Repr::deserialize(deserializer)? {
        Repr::Number(n) => Ok(n),
        Repr::Text(s) => match s.as_str() {
            "NaN" => Ok(f64::NAN),
            "Infinity" => Ok(f64::INFINITY),
            "-Infinity" => Ok(f64::NEG_INFINITY),
            other => other.parse().map_err(serde::de::Error::custom),
        },
    }
}

impl FieldValue {
    /// 真值判断，与 JS 的 truthy 语义一致
    ///
    /// null、false、0、NaN、空字符串为假；对象类值（时间戳、数组、map 等）恒为真
    pub fn is_truthy(&self) -> bool {
        match self {
            Self::NullValue(_) => false,
            Self::BooleanValue(b) => *b,
            Self::IntegerValue(s) => s.trim().parse::<i64>().map(|n| n != 0).unwrap_or(true),
            Self::DoubleValue(n) => *n != 0.0 && !n.is_nan(),
            Self::StringValue(s) => !s.is_empty(),
            Self::TimestampValue(_)
            | Self::BytesValue(_)
            | Self::ReferenceValue(_)
            | Self::GeoPointValue(_)
            | Self::ArrayValue(_)
            | Self::MapValue(_) => true,
        }
    }

    /// 字符串化，用于把非字符串字段渲染进通知文案
    pub fn to_display_string(&self) -> String {
        match self {
            Self::NullValue(_) => "null".to_string(),
            Self::BooleanValue(b) => b.to_string(),
            Self::IntegerValue(s) => s.clone(),
            Self::DoubleValue(n) => format_double(*n),
            Self::StringValue(s)
            | Self::TimestampValue(s)
            | Self::BytesValue(s)
            | Self::ReferenceValue(s) => s.clone(),
            Self::GeoPointValue(p) => format!("{},{}", p.latitude, p.longitude),
            Self::ArrayValue(a) => a
                .values
                .iter()
                .map(|v| match v {
                    // 数组拼接时 null 渲染为空串
                    Self::NullValue(_) => String::new(),
                    other => other.to_display_string(),
                })
                .collect::<Vec<_>>()
                .join(","),
            Self::MapValue(m) => serde_json::to_string(&map_to_json(m)).unwrap_or_default(),
        }
    }

    /// 转为普通 JSON 值（去掉类型标签）
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;

        match self {
            Self::NullValue(_) => Value::Null,
            Self::BooleanValue(b) => Value::Bool(*b),
            Self::IntegerValue(s) => s
                .parse::<i64>()
                .map(Value::from)
                .unwrap_or_else(|_| Value::String(s.clone())),
            Self::DoubleValue(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or_else(|| Value::String(format_double(*n))),
            Self::StringValue(s)
            | Self::TimestampValue(s)
            | Self::BytesValue(s)
            | Self::ReferenceValue(s) => Value::String(s.clone()),
            Self::GeoPointValue(p) => serde_json::json!({
                "latitude": p.latitude,
                "longitude": p.longitude,
            }),
            Self::ArrayValue(a) => Value::Array(a.values.iter().map(Self::to_json).collect()),
            Self::MapValue(m) => map_to_json(m),
        }
    }
}

fn map_to_json(map: &MapValue) -> serde_json::Value {
    let object = map
        .fields
        .iter()
        .map(|(k, v)| (k.clone(), v.to_json()))
        .collect::<serde_json::Map<_, _>>();
    serde_json::Value::Object(object)
}

/// 按 JS `Number.prototype.toString` 的规则输出 double
///
/// 绝对值落在 [1e-6, 1e21) 时用普通小数，否则用指数形式（`1e+21`、`1.5e-7`）；
/// 两种形式都取能唯一还原该值的最短位数，-0 输出为 "0"。
fn format_double(n: f64) -> String {
    if n.is_nan() {
        return "NaN".to_string();
    }
    if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        return text.to_string();
    }
    if n == 0.0 {
        return "0".to_string();
    }

    let magnitude = n.abs();
    if (1e-6..1e21).contains(&magnitude) {
        return n.to_string();
    }

    let exp = format!("{n:e}");
    match exp.split_once('e') {
        Some((mantissa, power)) if !power.starts_with('-') => format!("{mantissa}e+{power}"),
        _ => exp,
    }
}

/// Firestore 文档
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// 完整资源名：projects/{p}/databases/{d}/documents/{collection}/{id}
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub fields: HashMap<String, FieldValue>,
    pub create_time: Option<String>,
    pub update_time: Option<String>,
}

impl Document {
    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.get(key)
    }

    /// 取字段并按 `String(value || "")` 的语义转成字符串，假值返回 None
    pub fn truthy_string(&self, key: &str) -> Option<String> {
        self.field(key)
            .filter(|v| v.is_truthy())
            .map(FieldValue::to_display_string)
    }

    /// 文档 ID，即资源名的最后一段
    pub fn id(&self) -> Option<&str> {
        document_id_from_name(&self.name)
    }
}

/// 从资源名或 CloudEvent subject 中取出文档 ID
///
/// 支持 `projects/p/databases/(default)/documents/alerts/abc` 与 `documents/alerts/abc` 两种形式
pub fn document_id_from_name(name: &str) -> Option<&str> {
    let (_, rest) = name.split_once("documents/")?;
    let id = rest.rsplit('/').next()?;
    // collection/id 成对出现，单段说明只给了集合
    if id.is_empty() || !rest.contains('/') {
        return None;
    }
    Some(id)
}

/// 文档 ID 的长度上限（字节）
const MAX_DOCUMENT_ID_BYTES: usize = 1500;

/// 构造单个文档的 REST URL
///
/// 各段按 URL 路径段编码后追加到 base 之后，ID 中的 `#`、`?`、`%` 只会成为 ID 的一部分，
/// 不会截断路径或变成查询串。
pub fn document_url(
    base_url: &str,
    project_id: &str,
    database_id: &str,
    collection: &str,
    id: &str,
) -> Result<Url> {
    if project_id.is_empty() {
        return Err(AlertError::Config("google.project_id 未配置".to_string()));
    }
    validate_document_id(id)?;

    let mut url = Url::parse(base_url)
        .map_err(|e| AlertError::Config(format!("非法的 Firestore 地址 {base_url:?}: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| AlertError::Config(format!("Firestore 地址缺少路径: {base_url:?}")))?
        .pop_if_empty()
        .extend([
            "v1",
            "projects",
            project_id,
            "databases",
            database_id,
            "documents",
            collection,
            id,
        ]);
    Ok(url)
}

/// Firestore 保留或无法寻址的 ID：空串、含 `/`、`.`、`..`、`__name__` 形式、超长
fn validate_document_id(id: &str) -> Result<()> {
    let reserved = id.len() >= 4 && id.starts_with("__") && id.ends_with("__");
    if id.is_empty()
        || id.contains('/')
        || id == "."
        || id == ".."
        || reserved
        || id.len() > MAX_DOCUMENT_ID_BYTES
    {
        return Err(AlertError::InvalidDocument(format!("非法的文档 ID: {id:?}")));
    }
    Ok(())
}
