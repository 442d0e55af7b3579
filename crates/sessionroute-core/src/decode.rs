//! Structural validation of raw payloads into `Session` values.
//!
//! The source produces loosely-typed JSON; everything structural is
//! rejected here with a `DecodeError` naming the offending field, so
//! missing-field failures never surface later in enrichment or routing.
//! `decode` is pure: identical bytes always yield a structurally
//! identical `Session`.

use crate::error::DecodeError;
use crate::model::{LineItem, Session};
use serde_json::Value;

/// Decode one raw payload into a validated `Session`.
///
/// Required fields: `session_id`, `country`, `browse_history`. The
/// remaining fields default when absent but still fail on a type
/// mismatch.
pub fn decode(payload: &[u8]) -> Result<Session, DecodeError> {
    let value: Value = serde_json::from_slice(payload).map_err(|e| DecodeError::Malformed {
        line: e.line(),
        column: e.column(),
        message: classify_syntax_error(&e),
    })?;

    let obj = value.as_object().ok_or(DecodeError::NotAnObject)?;

    let session_id = require_str(obj, "session_id")?.to_string();
    let country = require_str(obj, "country")?.to_string();

    let customer_number = opt_i64(obj, "customer_number")?.unwrap_or(0);
    let city = opt_str(obj, "city")?.unwrap_or_default();
    let credit_limit = opt_f64(obj, "credit_limit")?.unwrap_or(0.0);

    let history = obj
        .get("browse_history")
        .ok_or_else(|| DecodeError::MissingField {
            field: "browse_history".into(),
        })?
        .as_array()
        .ok_or(DecodeError::WrongType {
            field: "browse_history".into(),
            expected: "array",
        })?;

    let mut line_items = Vec::with_capacity(history.len());
    for (i, entry) in history.iter().enumerate() {
        line_items.push(decode_line_item(entry, i)?);
    }

    Ok(Session {
        session_id,
        customer_number,
        city,
        country,
        credit_limit,
        line_items,
    })
}

fn decode_line_item(entry: &Value, index: usize) -> Result<LineItem, DecodeError> {
    let obj = entry.as_object().ok_or_else(|| DecodeError::WrongType {
        field: format!("browse_history[{index}]"),
        expected: "object",
    })?;

    let field = |name: &str| format!("browse_history[{index}].{name}");

    let product_code = obj
        .get("product_code")
        .ok_or_else(|| DecodeError::MissingField {
            field: field("product_code"),
        })?
        .as_str()
        .ok_or_else(|| DecodeError::WrongType {
            field: field("product_code"),
            expected: "string",
        })?
        .to_string();

    let quantity = decode_quantity(
        obj.get("quantity").ok_or_else(|| DecodeError::MissingField {
            field: field("quantity"),
        })?,
        &field("quantity"),
    )?;

    let in_cart = obj
        .get("in_shopping_cart")
        .ok_or_else(|| DecodeError::MissingField {
            field: field("in_shopping_cart"),
        })?
        .as_bool()
        .ok_or_else(|| DecodeError::WrongType {
            field: field("in_shopping_cart"),
            expected: "boolean",
        })?;

    Ok(LineItem {
        product_code,
        quantity,
        in_cart,
    })
}

/// Quantities arrive either as a JSON integer or as a numeric string.
/// Negative and fractional values are rejected.
fn decode_quantity(value: &Value, field: &str) -> Result<u64, DecodeError> {
    match value {
        Value::Number(n) => n.as_u64().ok_or_else(|| DecodeError::OutOfRange {
            field: field.to_string(),
            message: format!("expected non-negative integer, got {n}"),
        }),
        Value::String(s) => s.trim().parse::<u64>().map_err(|_| DecodeError::WrongType {
            field: field.to_string(),
            expected: "integer or numeric string",
        }),
        _ => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "integer or numeric string",
        }),
    }
}

fn require_str<'a>(
    obj: &'a serde_json::Map<String, Value>,
    field: &str,
) -> Result<&'a str, DecodeError> {
    obj.get(field)
        .ok_or_else(|| DecodeError::MissingField {
            field: field.to_string(),
        })?
        .as_str()
        .ok_or_else(|| DecodeError::WrongType {
            field: field.to_string(),
            expected: "string",
        })
}

fn opt_str(
    obj: &serde_json::Map<String, Value>,
    field: &str,
) -> Result<Option<String>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "string",
        }),
    }
}

fn opt_i64(obj: &serde_json::Map<String, Value>, field: &str) -> Result<Option<i64>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| DecodeError::OutOfRange {
                field: field.to_string(),
                message: format!("expected integer, got {n}"),
            }),
        Some(_) => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "integer",
        }),
    }
}

fn opt_f64(obj: &serde_json::Map<String, Value>, field: &str) -> Result<Option<f64>, DecodeError> {
    match obj.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => Ok(n.as_f64()),
        Some(_) => Err(DecodeError::WrongType {
            field: field.to_string(),
            expected: "number",
        }),
    }
}

fn classify_syntax_error(e: &serde_json::Error) -> String {
    if e.is_eof() {
        "unexpected end of input".to_string()
    } else {
        "invalid JSON syntax".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &[u8] = br#"{
        "session_id": "a1",
        "customer_number": 100,
        "city": "Washington",
        "country": "USA",
        "credit_limit": 1000,
        "browse_history": [
            {"product_code": "P1", "quantity": 2, "in_shopping_cart": true},
            {"product_code": "P2", "quantity": 1, "in_shopping_cart": false}
        ]
    }"#;

    #[test]
    fn test_decode_valid_session() {
        let session = decode(VALID).unwrap();
        assert_eq!(session.session_id, "a1");
        assert_eq!(session.customer_number, 100);
        assert_eq!(session.city, "Washington");
        assert_eq!(session.country, "USA");
        assert_eq!(session.credit_limit, 1000.0);
        assert_eq!(session.line_items.len(), 2);
        assert_eq!(session.line_items[0].product_code, "P1");
        assert_eq!(session.line_items[0].quantity, 2);
        assert!(session.line_items[0].in_cart);
        assert!(!session.line_items[1].in_cart);
    }

    #[test]
    fn test_decode_is_pure() {
        let a = decode(VALID).unwrap();
        let b = decode(VALID).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_decode_quantity_as_numeric_string() {
        let payload = br#"{
            "session_id": "a1", "country": "USA",
            "browse_history": [{"product_code": "P1", "quantity": "7", "in_shopping_cart": false}]
        }"#;
        let session = decode(payload).unwrap();
        assert_eq!(session.line_items[0].quantity, 7);
    }

    #[test]
    fn test_decode_rejects_negative_quantity() {
        let payload = br#"{
            "session_id": "a1", "country": "USA",
            "browse_history": [{"product_code": "P1", "quantity": -1, "in_shopping_cart": false}]
        }"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { ref field, .. }
            if field == "browse_history[0].quantity"));
    }

    #[test]
    fn test_decode_rejects_non_numeric_quantity_string() {
        let payload = br#"{
            "session_id": "a1", "country": "USA",
            "browse_history": [{"product_code": "P1", "quantity": "many", "in_shopping_cart": false}]
        }"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { ref field, .. }
            if field == "browse_history[0].quantity"));
    }

    #[test]
    fn test_decode_missing_session_id() {
        let payload = br#"{"country": "USA", "browse_history": []}"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { ref field } if field == "session_id"));
    }

    #[test]
    fn test_decode_missing_country() {
        let payload = br#"{"session_id": "a1", "browse_history": []}"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { ref field } if field == "country"));
    }

    #[test]
    fn test_decode_missing_browse_history() {
        let payload = br#"{"session_id": "a1", "country": "USA"}"#;
        let err = decode(payload).unwrap_err();
        assert!(
            matches!(err, DecodeError::MissingField { ref field } if field == "browse_history")
        );
    }

    #[test]
    fn test_decode_mistyped_browse_history() {
        let payload = br#"{"session_id": "a1", "country": "USA", "browse_history": "none"}"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { ref field, .. }
            if field == "browse_history"));
    }

    #[test]
    fn test_decode_missing_line_item_field_names_path() {
        let payload = br#"{
            "session_id": "a1", "country": "USA",
            "browse_history": [
                {"product_code": "P1", "quantity": 1, "in_shopping_cart": true},
                {"product_code": "P2", "in_shopping_cart": false}
            ]
        }"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::MissingField { ref field }
            if field == "browse_history[1].quantity"));
    }

    #[test]
    fn test_decode_malformed_payload_reports_position() {
        let err = decode(b"{not json").unwrap_err();
        match err {
            DecodeError::Malformed { line, column, .. } => {
                assert_eq!(line, 1);
                assert!(column > 0);
            }
            other => panic!("expected Malformed, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_non_object_payload() {
        let err = decode(b"[1, 2, 3]").unwrap_err();
        assert!(matches!(err, DecodeError::NotAnObject));
    }

    #[test]
    fn test_decode_optional_fields_default() {
        let payload = br#"{"session_id": "a1", "country": "FR", "browse_history": []}"#;
        let session = decode(payload).unwrap();
        assert_eq!(session.customer_number, 0);
        assert_eq!(session.city, "");
        assert_eq!(session.credit_limit, 0.0);
        assert!(session.line_items.is_empty());
    }

    #[test]
    fn test_decode_mistyped_optional_field_still_fails() {
        let payload =
            br#"{"session_id": "a1", "country": "FR", "city": 7, "browse_history": []}"#;
        let err = decode(payload).unwrap_err();
        assert!(matches!(err, DecodeError::WrongType { ref field, .. } if field == "city"));
    }
}
