//! Receipt model and the OCR field document it carries.
//!
//! A receipt is a flat JSON document: the server-owned fields (`id`, `owner`,
//! `imageUrl`, `uploadedAt`) plus whatever keys the OCR script extracted.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Keys the server sets itself. OCR output may not override them.
pub const RESERVED_FIELDS: &[&str] = &["id", "_id", "owner", "user", "imageUrl", "uploadedAt"];

/// Fields extracted from a receipt image by the OCR script.
///
/// Always a JSON object with the reserved keys stripped.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OcrFields(Map<String, Value>);

/// Why an OCR payload was rejected.
#[derive(Debug, thiserror::Error)]
pub enum OcrFieldsError {
    #[error("output is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("expected a JSON object, got {0}")]
    NotAnObject(&'static str),
}

impl OcrFields {
    /// Parse raw OCR stdout into a validated field map.
    pub fn parse(raw: &str) -> Result<Self, OcrFieldsError> {
        let value: Value = serde_json::from_str(raw.trim())?;
        Self::from_value(value)
    }

    /// Validate an already-parsed JSON value.
    pub fn from_value(value: Value) -> Result<Self, OcrFieldsError> {
        match value {
            Value::Object(mut map) => {
                for key in RESERVED_FIELDS {
                    if map.remove(*key).is_some() {
                        tracing::warn!("OCR output tried to set reserved field '{}', ignoring", key);
                    }
                }
                Ok(Self(map))
            }
            other => Err(OcrFieldsError::NotAnObject(json_kind(&other))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    /// Serialize for storage in the document column.
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&self.0).unwrap_or_else(|_| "{}".to_string())
    }

    /// Decode from the document column, tolerating corrupt rows.
    pub fn from_json_string(s: &str) -> Self {
        serde_json::from_str::<Value>(s)
            .ok()
            .and_then(|v| Self::from_value(v).ok())
            .unwrap_or_default()
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A processed receipt owned by a single user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub owner: String,
    pub image_url: String,
    #[serde(with = "rfc3339")]
    pub uploaded_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: OcrFields,
}

impl Receipt {
    /// Create a receipt for a freshly stored upload.
    ///
    /// `uploaded_at` is stamped here and never changes afterwards.
    pub fn new(owner: impl Into<String>, image_url: impl Into<String>, fields: OcrFields) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner: owner.into(),
            image_url: image_url.into(),
            uploaded_at: Utc::now(),
            fields,
        }
    }
}

/// RFC 3339 with millisecond precision, matching what the repository stores.
mod rfc3339 {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(dt: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        let s = String::deserialize(d)?;
        DateTime::parse_from_rfc3339(&s)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(serde::de::Error::custom)
    }
}

/// Format a timestamp the way receipts are stored and served.
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_object() {
        let fields = OcrFields::parse(r#"{"total": 12.50, "store": "Acme"}"#).unwrap();
        assert_eq!(fields.len(), 2);
        assert_eq!(fields.get("total"), Some(&json!(12.5)));
        assert_eq!(fields.get("store"), Some(&json!("Acme")));
    }

    #[test]
    fn test_parse_tolerates_trailing_newline() {
        let fields = OcrFields::parse("{\"store\": \"Acme\"}\n").unwrap();
        assert_eq!(fields.get("store"), Some(&json!("Acme")));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(matches!(
            OcrFields::parse("Total: 12.50"),
            Err(OcrFieldsError::InvalidJson(_))
        ));
        assert!(matches!(
            OcrFields::parse(""),
            Err(OcrFieldsError::InvalidJson(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_object() {
        assert!(matches!(
            OcrFields::parse("[1, 2, 3]"),
            Err(OcrFieldsError::NotAnObject("an array"))
        ));
        assert!(matches!(
            OcrFields::parse("42"),
            Err(OcrFieldsError::NotAnObject("a number"))
        ));
    }

    #[test]
    fn test_reserved_fields_are_stripped() {
        let fields = OcrFields::parse(
            r#"{"owner": "mallory", "imageUrl": "/etc/passwd", "uploadedAt": "1970", "id": "x", "store": "Acme"}"#,
        )
        .unwrap();
        assert_eq!(fields.keys().collect::<Vec<_>>(), vec!["store"]);
    }

    #[test]
    fn test_receipt_serializes_flat() {
        let fields = OcrFields::parse(r#"{"total": 12.5, "store": "Acme"}"#).unwrap();
        let receipt = Receipt::new("user-1", "uploads/abc.jpg", fields);

        let value = serde_json::to_value(&receipt).unwrap();
        let obj = value.as_object().unwrap();

        let mut keys: Vec<_> = obj.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec!["id", "imageUrl", "owner", "store", "total", "uploadedAt"]
        );
        assert_eq!(obj["owner"], "user-1");
        assert_eq!(obj["imageUrl"], "uploads/abc.jpg");
        assert_eq!(obj["total"], 12.5);
    }

    #[test]
    fn test_receipt_deserializes_back() {
        let fields = OcrFields::parse(r#"{"store": "Acme"}"#).unwrap();
        let receipt = Receipt::new("user-1", "uploads/abc.jpg", fields);
        let json = serde_json::to_string(&receipt).unwrap();

        let back: Receipt = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, receipt.id);
        assert_eq!(back.fields.get("store"), Some(&json!("Acme")));
        assert_eq!(
            format_timestamp(&back.uploaded_at),
            format_timestamp(&receipt.uploaded_at)
        );
    }
}
