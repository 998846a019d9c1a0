//! Structural validation of inbound JSON frames.

use super::SecurityError;
use crate::config::SecurityConfig;
use serde_json::Value;

/// Validates a JSON frame against `config` and returns the parsed value.
pub fn validate_json_message(message: &[u8], config: &SecurityConfig) -> Result<Value, SecurityError> {
    if message.len() > config.max_message_size {
        return Err(SecurityError::MessageTooLarge(message.len()));
    }

    let json: Value = serde_json::from_slice(message)
        .map_err(|e| SecurityError::InvalidMessageFormat(e.to_string()))?;

    if !json.is_object() {
        return Err(SecurityError::InvalidMessageFormat(
            "Frame must be a JSON object".to_string(),
        ));
    }

    validate_json_value(&json, 0, config)?;
    Ok(json)
}

/// Recursively validates a JSON value
fn validate_json_value(value: &Value, depth: usize, config: &SecurityConfig) -> Result<(), SecurityError> {
    if depth > config.max_json_depth {
        return Err(SecurityError::InvalidMessageFormat(
            "JSON nesting too deep".to_string(),
        ));
    }

    match value {
        Value::String(s) => {
            if s.chars().count() > config.max_string_length {
                return Err(SecurityError::InvalidMessageFormat(format!(
                    "String too long: {} characters",
                    s.chars().count()
                )));
            }
            validate_string_content(s)?;
        }
        Value::Array(arr) => {
            if arr.len() > config.max_collection_size {
                return Err(SecurityError::InvalidMessageFormat(format!(
                    "Array too large: {} elements",
                    arr.len()
                )));
            }
            for item in arr {
                validate_json_value(item, depth + 1, config)?;
            }
        }
        Value::Object(obj) => {
            if obj.len() > config.max_collection_size {
                return Err(SecurityError::InvalidMessageFormat(format!(
                    "Object too large: {} keys",
                    obj.len()
                )));
            }
            for (key, val) in obj {
                if key.chars().count() > config.max_string_length {
                    return Err(SecurityError::InvalidMessageFormat(format!(
                        "Object key too long: {} characters",
                        key.chars().count()
                    )));
                }
                validate_string_content(key)?;
                validate_json_value(val, depth + 1, config)?;
            }
        }
        Value::Number(_) | Value::Bool(_) | Value::Null => {}
    }

    Ok(())
}

/// Rejects null bytes and other control characters.
fn validate_string_content(s: &str) -> Result<(), SecurityError> {
    if s.chars().any(|c| c.is_control()) {
        return Err(SecurityError::MaliciousContent);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_protocol_frame() {
        let json = br#"{"event": "make-move", "data": {"move": {"from": "e2", "to": "e4"}}}"#;
        let value = validate_json_message(json, &SecurityConfig::default()).unwrap();
        assert_eq!(value["event"], "make-move");
    }

    #[test]
    fn test_reject_oversized_frame() {
        let config = SecurityConfig {
            max_message_size: 64,
            ..SecurityConfig::default()
        };
        let json = format!(r#"{{"event": "create-session", "data": {{"nickname": "{}"}}}}"#, "x".repeat(64));
        assert_eq!(
            validate_json_message(json.as_bytes(), &config),
            Err(SecurityError::MessageTooLarge(json.len()))
        );
    }

    #[test]
    fn test_reject_deep_nesting() {
        let mut json = String::from("{");
        for _ in 0..15 {
            json.push_str(r#""nested": {"#);
        }
        json.push_str(r#""value": true"#);
        for _ in 0..15 {
            json.push('}');
        }
        json.push('}');

        assert!(validate_json_message(json.as_bytes(), &SecurityConfig::default()).is_err());
    }

    #[test]
    fn test_reject_control_characters_and_non_objects() {
        let config = SecurityConfig::default();
        let json = br#"{"event": "create-session", "data": {"nickname": "bad\u0000name"}}"#;
        assert_eq!(
            validate_json_message(json, &config),
            Err(SecurityError::MaliciousContent)
        );
        assert!(validate_json_message(b"[1, 2, 3]", &config).is_err());
        assert!(validate_json_message(b"not json", &config).is_err());
    }

    #[test]
    fn test_custom_limits() {
        let config = SecurityConfig {
            max_string_length: 5,
            max_collection_size: 2,
            max_json_depth: 2,
            ..SecurityConfig::default()
        };

        assert!(validate_json_message(br#"{"key": "toolong"}"#, &config).is_err());
        assert!(validate_json_message(br#"{"key": "ok"}"#, &config).is_ok());
        assert!(validate_json_message(br#"{"a": 1, "b": 2, "c": 3}"#, &config).is_err());
    }
}
