pub mod admin;
pub mod health;
pub mod overrides;
pub mod query;
pub mod questions;
pub mod statistics;
pub mod users;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::ApiError;

/// An empty body reads as `null`; anything else must be valid JSON.
pub(crate) fn json_body(bytes: &[u8]) -> Result<Value, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(bytes).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Deserialize a request body, reporting the first missing or malformed field.
pub(crate) fn parse_body<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    serde_json::from_value(json_body(bytes)?).map_err(|e| ApiError::BadRequest(e.to_string()))
}

/// `?limit=` values below 1 fall back to the default.
pub(crate) fn limit_or(limit: Option<usize>, default: usize) -> usize {
    limit.filter(|l| *l > 0).unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        assert_eq!(json_body(b"").unwrap(), Value::Null);
        assert_eq!(json_body(b"  \n").unwrap(), Value::Null);
        assert_eq!(json_body(br#"{"a":1}"#).unwrap(), json!({"a": 1}));
        assert!(json_body(b"{nope").unwrap_err().to_string().starts_with("Invalid JSON body"));
    }

    #[test]
    fn test_limit_or() {
        assert_eq!(limit_or(None, 50), 50);
        assert_eq!(limit_or(Some(0), 50), 50);
        assert_eq!(limit_or(Some(7), 50), 7);
    }
}
