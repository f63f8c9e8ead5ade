//! Normalization of capability outcomes into `tool_result` payloads.

use serde_json::{Map, Value};

use crate::capability::{CapabilityError, CapabilityOutput};

/// Reported when a failure carries no message.
pub const UNKNOWN_ERROR_MESSAGE: &str = "An unknown error occurred.";

/// Key wrapping raw text that is not valid JSON.
pub const ORIGINAL_OUTPUT_KEY: &str = "originalOutput";

/// Turn a successful capability output into the `result` payload.
///
/// Structured data passes through. Raw text is parsed as JSON when it can
/// be, otherwise wrapped as `{"originalOutput": text}`.
pub fn normalize_output(output: CapabilityOutput) -> Value {
    match output {
        CapabilityOutput::Structured(value) => value,
        CapabilityOutput::Text(text) => match serde_json::from_str::<Value>(&text) {
            Ok(parsed) => parsed,
            Err(_) => {
                let mut wrapped = Map::new();
                wrapped.insert(ORIGINAL_OUTPUT_KEY.to_string(), Value::String(text));
                Value::Object(wrapped)
            }
        },
    }
}

/// Message reported to the coordinator for a failed invocation.
pub fn error_message(error: &CapabilityError) -> String {
    let message = error.to_string();
    if message.trim().is_empty() {
        UNKNOWN_ERROR_MESSAGE.to_string()
    } else {
        message
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_structured_output_passes_through() {
        let value = json!({"answer": 42});
        assert_eq!(normalize_output(CapabilityOutput::Structured(value.clone())), value);
    }

    #[test]
    fn test_json_text_is_parsed() {
        let output = CapabilityOutput::Text(r#"{"status":"ok","items":[1,2]}"#.into());
        assert_eq!(normalize_output(output), json!({"status": "ok", "items": [1, 2]}));
    }

    #[test]
    fn test_scalar_json_text_is_parsed() {
        assert_eq!(normalize_output(CapabilityOutput::Text("42".into())), json!(42));
    }

    #[test]
    fn test_plain_text_is_wrapped() {
        assert_eq!(
            normalize_output(CapabilityOutput::Text("hello".into())),
            json!({"originalOutput": "hello"})
        );
    }

    #[test]
    fn test_empty_text_is_wrapped() {
        assert_eq!(
            normalize_output(CapabilityOutput::Text(String::new())),
            json!({"originalOutput": ""})
        );
    }

    #[test]
    fn test_error_message_passthrough_and_fallback() {
        assert_eq!(
            error_message(&CapabilityError::failed("t", "capability not found")),
            "capability not found"
        );
        assert_eq!(
            error_message(&CapabilityError::failed("t", "")),
            UNKNOWN_ERROR_MESSAGE
        );
        assert_eq!(
            error_message(&CapabilityError::UnknownTool { name: "t".into() }),
            "unknown tool: 't'"
        );
    }
}
