use serde::Serialize;
use serde_json::{json, Value};

#[derive(Clone, Debug, PartialEq)]
pub enum Payload {
    /// Already serialized content, passed through verbatim.
    Raw(String),
    Structured(Value),
}

/// Outcome of one function invocation. Serialized into history right away and
/// then dropped.
#[derive(Clone, Debug, PartialEq)]
pub struct FunctionResult {
    is_success: bool,
    payload: Payload,
}

impl FunctionResult {
    pub fn new(is_success: bool, payload: Payload) -> Self {
        Self { is_success, payload }
    }

    pub fn raw(is_success: bool, content: impl Into<String>) -> Self {
        Self::new(is_success, Payload::Raw(content.into()))
    }

    /// Falls back to a failure result when `value` has no JSON representation
    /// (for example a map with non-string keys).
    pub fn structured<T>(is_success: bool, value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(value) => Self::new(is_success, Payload::Structured(value)),
            Err(error) => Self::error(format!("result could not be serialized: {error}")),
        }
    }

    pub fn success<T>(value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        Self::structured(true, value)
    }

    pub fn failure<T>(value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        Self::structured(false, value)
    }

    /// Failure carrying `{"error": message}`.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(false, Payload::Structured(json!({ "error": message.into() })))
    }

    pub fn is_success(&self) -> bool {
        self.is_success
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn to_json(&self) -> String {
        match &self.payload {
            Payload::Raw(content) => content.clone(),
            Payload::Structured(value) => value.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use serde::Serialize;
    use serde_json::{json, Value};

    use super::{FunctionResult, Payload};

    #[test]
    fn raw_payload_passes_through_unchanged() {
        let raw = "{ \"not\" : \"reformatted\" }";
        let result = FunctionResult::raw(true, raw);

        assert_eq!(result.to_json(), raw);
        assert_eq!(result.to_json(), result.to_json());
    }

    #[test]
    fn raw_payload_is_not_validated() {
        let result = FunctionResult::raw(true, "plain text, not json");
        assert_eq!(result.to_json(), "plain text, not json");
    }

    #[test]
    fn structured_payload_round_trips() {
        #[derive(Serialize)]
        struct Email {
            subject: String,
            recipients: Vec<String>,
            unread: bool,
        }

        let email = Email {
            subject: "Q3 renewal".to_string(),
            recipients: vec!["ops@example.com".to_string()],
            unread: true,
        };
        let result = FunctionResult::success(&json!({ "emails": [email] }));

        let first = result.to_json();
        let reparsed: Value = serde_json::from_str(&first).expect("valid json");
        assert_eq!(
            reparsed,
            json!({"emails": [{"subject": "Q3 renewal", "recipients": ["ops@example.com"], "unread": true}]})
        );
        assert_eq!(result.to_json(), first);
    }

    #[test]
    fn failure_payload_keeps_flag_and_body() {
        let result = FunctionResult::failure(&json!({"error": "not found"}));

        assert!(!result.is_success());
        let parsed: Value = serde_json::from_str(&result.to_json()).expect("valid json");
        assert_eq!(parsed, json!({"error": "not found"}));
    }

    #[test]
    fn unserializable_value_becomes_failure() {
        let mut keyed: HashMap<(u8, u8), &str> = HashMap::new();
        keyed.insert((1, 2), "pair");

        let result = FunctionResult::success(&keyed);

        assert!(!result.is_success());
        assert!(matches!(result.payload(), Payload::Structured(value) if value.get("error").is_some()));
    }
}
