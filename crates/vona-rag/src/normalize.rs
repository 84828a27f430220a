//! Response normalization
//!
//! Turns whatever text the model produced into a [`StructuredResponse`].
//! [`normalize`] is total: malformed output degrades to an `error` response
//! carrying the raw text instead of failing the request.

use std::sync::OnceLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::warn;
use vona_core::{ResponseType, StructuredResponse};

/// Identifiers shorter than this are not scrubbed from the answer text
const MIN_SCRUB_LEN: usize = 8;

fn fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?mi)^```(?:json)?[ \t]*|[ \t]*```[ \t]*$").expect("static regex")
    })
}

fn uuid_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)\b[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}\b")
            .expect("static regex")
    })
}

fn leftover_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\(\s*[,;]?\s*\)|\[\s*\]").expect("static regex"))
}

fn spaces_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[ \t]{2,}").expect("static regex"))
}

/// Outcome of parsing a model reply
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    /// The reply was a JSON object
    Parsed(StructuredResponse),
    /// The reply could not be used as JSON; the raw text is kept
    Degraded { response: String, reason: String },
}

impl Normalized {
    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }

    pub fn into_response(self) -> StructuredResponse {
        match self {
            Self::Parsed(response) => response,
            Self::Degraded { response, .. } => StructuredResponse::degraded(response),
        }
    }
}

impl From<Normalized> for StructuredResponse {
    fn from(normalized: Normalized) -> Self {
        normalized.into_response()
    }
}

/// Remove a markdown code fence around the reply
pub fn strip_fences(raw: &str) -> String {
    fence_re().replace_all(raw, "").trim().to_string()
}

/// Parse a model reply
pub fn normalize(raw: &str) -> Normalized {
    let stripped = strip_fences(raw);

    let object = match serde_json::from_str::<Value>(&stripped) {
        Ok(Value::Object(object)) => object,
        Ok(other) => {
            return degraded(raw, format!("expected a JSON object, got {}", kind_of(&other)));
        }
        Err(e) => return degraded(raw, e.to_string()),
    };

    Normalized::Parsed(from_object(raw, object))
}

/// Parse a model reply straight into the response shown to the shopper
pub fn normalize_response(raw: &str) -> StructuredResponse {
    normalize(raw).into_response()
}

fn degraded(raw: &str, reason: String) -> Normalized {
    warn!(%reason, raw_chars = raw.chars().count(), "Model output is not a JSON object");
    Normalized::Degraded {
        response: raw.to_string(),
        reason,
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn from_object(raw: &str, object: Map<String, Value>) -> StructuredResponse {
    let data: Vec<String> = match object.get("data") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|s| !s.is_empty())
            .collect(),
        _ => Vec::new(),
    };

    let kind = match object.get("type").and_then(Value::as_str) {
        Some(label) => ResponseType::parse_label(label).unwrap_or_else(|| {
            let fallback = inferred_type(&data);
            warn!(label, %fallback, "Unknown response type from model");
            fallback
        }),
        None => inferred_type(&data),
    };

    let response = match object.get("response") {
        Some(Value::String(text)) => scrub(text, &data),
        _ => scrub(raw, &data),
    };

    StructuredResponse::new(response, data, kind)
}

fn inferred_type(data: &[String]) -> ResponseType {
    if data.is_empty() {
        ResponseType::None
    } else {
        ResponseType::Product
    }
}

/// Remove referenced ids and anything shaped like a UUID from the answer
pub fn scrub(text: &str, ids: &[String]) -> String {
    let mut cleaned = uuid_re().replace_all(text, "").into_owned();
    for id in ids.iter().filter(|id| id.chars().count() >= MIN_SCRUB_LEN) {
        cleaned = cleaned.replace(id.as_str(), "");
    }

    if cleaned == text {
        return cleaned;
    }

    let cleaned = leftover_re().replace_all(&cleaned, "");
    let cleaned = spaces_re().replace_all(&cleaned, " ");
    cleaned
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n")
        .replace(" ,", ",")
        .replace(" .", ".")
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const UUID_A: &str = "3f2b8c9e-1a2b-4c3d-8e9f-0a1b2c3d4e5f";

    #[test]
    fn test_plain_json() {
        let normalized = normalize(
            r#"{"response": "Áo thun giá 120.000đ", "data": ["p-1"], "type": "product"}"#,
        );
        let Normalized::Parsed(response) = normalized else {
            panic!("expected parsed");
        };
        assert_eq!(response.response, "Áo thun giá 120.000đ");
        assert_eq!(response.data, vec!["p-1"]);
        assert_eq!(response.kind, ResponseType::Product);
    }

    #[test]
    fn test_fenced_json() {
        let raw = "```json\n{\"response\": \"Chào bạn\", \"data\": [], \"type\": \"none\"}\n```";
        let response = normalize_response(raw);
        assert_eq!(response.response, "Chào bạn");
        assert_eq!(response.kind, ResponseType::None);
    }

    #[test]
    fn test_malformed_degrades_to_error() {
        let raw = "Xin lỗi, tôi không chắc {";
        let normalized = normalize(raw);
        assert!(normalized.is_degraded());

        let response = normalized.into_response();
        assert_eq!(response.response, raw);
        assert!(response.data.is_empty());
        assert_eq!(response.kind, ResponseType::Error);
    }

    #[test]
    fn test_non_object_json_degrades() {
        assert!(normalize("[1, 2, 3]").is_degraded());
        assert!(normalize("\"chỉ là chuỗi\"").is_degraded());
        assert!(normalize("").is_degraded());
    }

    #[test]
    fn test_missing_fields_get_defaults() {
        let raw = r#"{"data": ["p-1", 42, null, {"x": 1}]}"#;
        let response = normalize_response(raw);

        assert_eq!(response.response, raw);
        assert_eq!(response.data, vec!["p-1", "42"]);
        assert_eq!(response.kind, ResponseType::Product);

        let response = normalize_response(r#"{"response": "Chào bạn"}"#);
        assert!(response.data.is_empty());
        assert_eq!(response.kind, ResponseType::None);
    }

    #[test]
    fn test_missing_response_falls_back_to_scrubbed_raw() {
        let raw = format!(r#"{{"data": ["{UUID_A}"], "type": "product"}}"#);
        let response = normalize_response(&raw);
        assert!(!response.response.contains(UUID_A));
        assert_eq!(response.data, vec![UUID_A]);
        assert_eq!(response.kind, ResponseType::Product);

        let raw = format!(r#"{{"response": ["Áo thun"], "data": ["{UUID_A}"]}}"#);
        let response = normalize_response(&raw);
        assert!(!response.response.contains(UUID_A));
        assert!(response.response.contains("Áo thun"));
    }

    #[test]
    fn test_fence_variants() {
        let body = r#"{"response": "Chào bạn", "data": [], "type": "none"}"#;
        for raw in [
            format!("```JSON\n{body}\n```"),
            format!("```json  \n{body}\n```   "),
            format!("```\n{body}\n```"),
        ] {
            let normalized = normalize(&raw);
            assert!(!normalized.is_degraded(), "{raw}");
            assert_eq!(normalized.into_response().response, "Chào bạn");
        }
    }

    #[test]
    fn test_unknown_type_is_inferred() {
        let response =
            normalize_response(r#"{"response": "Gợi ý", "data": ["p-1"], "type": "recommendation"}"#);
        assert_eq!(response.kind, ResponseType::Product);

        let response =
            normalize_response(r#"{"response": "Gợi ý", "data": [], "type": "greeting"}"#);
        assert_eq!(response.kind, ResponseType::None);

        let response =
            normalize_response(r#"{"response": "Đơn hàng", "data": [], "type": "Order"}"#);
        assert_eq!(response.kind, ResponseType::Order);
    }

    #[test]
    fn test_ids_are_scrubbed_from_response() {
        let raw = format!(
            r#"{{"response": "Sản phẩm A ({UUID_A}) có giá 100.000 VNĐ", "data": ["{UUID_A}"], "type": "product"}}"#
        );
        let response = normalize_response(&raw);

        assert_eq!(response.response, "Sản phẩm A có giá 100.000 VNĐ");
        assert_eq!(response.data, vec![UUID_A]);
    }

    #[test]
    fn test_scrub_keeps_short_ids_and_clean_text() {
        let text = "Giá 100.000 VNĐ cho mã p-1";
        assert_eq!(scrub(text, &["p-1".to_string()]), text);

        let scrubbed = scrub("Mã sku-000123, còn hàng", &["sku-000123".to_string()]);
        assert_eq!(scrubbed, "Mã, còn hàng");
    }

    proptest! {
        #[test]
        fn prop_normalize_is_total(raw in ".*") {
            let response = normalize_response(&raw);
            let value = serde_json::to_value(&response).unwrap();
            prop_assert!(value.get("response").is_some());
            prop_assert!(value.get("data").is_some());
            prop_assert!(value.get("type").is_some());
        }

        #[test]
        fn prop_parsed_response_never_contains_uuid(
            prefix in "[a-zA-Z ]{0,20}",
            suffix in "[a-zA-Z ]{0,20}",
            fenced in any::<bool>(),
            with_response in any::<bool>(),
        ) {
            let mut body = serde_json::json!({
                "data": [UUID_A],
                "type": "product",
            });
            if with_response {
                body["response"] = serde_json::Value::from(format!("{prefix}{UUID_A}{suffix}"));
            }
            let body = body.to_string();
            let raw = if fenced { format!("```json\n{body}\n```") } else { body };

            let response = normalize_response(&raw);
            prop_assert!(!response.response.contains(UUID_A));
            prop_assert_eq!(response.data, vec![UUID_A.to_string()]);
        }
    }
}
