//! Parsing for payloads that child components hand over as JSON text.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ViewError;

/// Parses `raw` as a JSON object and decodes it into `T`.
///
/// Anything that is not a JSON object is rejected before decoding, so a bare
/// string or number never reaches the typed payload.
pub(crate) fn parse_object<T: DeserializeOwned>(raw: &str) -> Result<T, ViewError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| ViewError::invalid_directive(format!("malformed JSON: {err}")))?;
    decode_object(value)
}

pub(crate) fn decode_object<T: DeserializeOwned>(value: Value) -> Result<T, ViewError> {
    let fields = expect_object(value)?;
    serde_json::from_value(Value::Object(fields))
        .map_err(|err| ViewError::invalid_directive(format!("unexpected shape: {err}")))
}

/// Parses `raw` as JSON and returns its top-level fields undecoded.
pub(crate) fn parse_fields(raw: &str) -> Result<Map<String, Value>, ViewError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|err| ViewError::invalid_directive(format!("malformed JSON: {err}")))?;
    expect_object(value)
}

pub(crate) fn expect_object(value: Value) -> Result<Map<String, Value>, ViewError> {
    match value {
        Value::Object(fields) => Ok(fields),
        other => Err(ViewError::invalid_directive(format!(
            "expected a JSON object, got {}",
            kind_of(&other)
        ))),
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

#[cfg(test)]
mod tests {
    use shared::protocol::UpdateDirective;

    use super::*;

    #[test]
    fn rejects_non_object_json() {
        let err = parse_object::<UpdateDirective>("\"refresh\"").expect_err("should fail");
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn rejects_malformed_text() {
        let err = parse_object::<UpdateDirective>("{refresh: true").expect_err("should fail");
        assert!(matches!(err, ViewError::InvalidDirective { .. }));
    }

    #[test]
    fn parse_fields_keeps_undecoded_values() {
        let fields = parse_fields(r#"{"crates": [1], "x": null}"#).expect("fields");
        assert_eq!(fields.len(), 2);
        assert!(parse_fields("[]").is_err());
    }

    #[test]
    fn decodes_objects() {
        let directive: UpdateDirective = parse_object(r#"{"reload": 1}"#).expect("directive");
        assert!(directive.reload);
    }
}
