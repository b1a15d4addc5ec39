use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    #[serde(rename = "function")]
    FunctionResult,
}

/// A call requested by the model. `arguments` stays JSON-encoded text exactly
/// as the endpoint delivered it; decoding is the capability's job.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl FunctionCall {
    pub fn new(name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self { name: name.into(), arguments: arguments.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_call: Option<FunctionCall>,
    #[serde(default, rename = "name", skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    pub fn assistant_call(call: FunctionCall) -> Self {
        Self { role: Role::Assistant, content: None, function_call: Some(call), function_name: None }
    }

    pub fn function_result(function_name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::FunctionResult,
            content: Some(content.into()),
            function_call: None,
            function_name: Some(function_name.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self { role, content: Some(content.into()), function_call: None, function_name: None }
    }

    pub fn is_function_call(&self) -> bool {
        self.function_call.is_some()
    }

    pub fn content_str(&self) -> &str {
        self.content.as_deref().unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{FunctionCall, Message, Role};

    #[test]
    fn function_result_serializes_with_function_role_and_name() {
        let message = Message::function_result("get_entity_by_guid", "{\"ok\":true}");
        let value = serde_json::to_value(&message).expect("serialize");

        assert_eq!(
            value,
            json!({"role": "function", "content": "{\"ok\":true}", "name": "get_entity_by_guid"})
        );
    }

    #[test]
    fn assistant_call_keeps_null_content_and_string_arguments() {
        let message = Message::assistant_call(FunctionCall::new("search_email", "{\"query\":\"q3\"}"));
        let value = serde_json::to_value(&message).expect("serialize");

        assert_eq!(value["content"], serde_json::Value::Null);
        assert_eq!(value["function_call"]["arguments"], json!("{\"query\":\"q3\"}"));
        assert!(value.get("name").is_none());
    }

    #[test]
    fn wire_message_with_function_call_deserializes() {
        let raw = r#"{"role":"assistant","content":null,"function_call":{"name":"b","arguments":"{\"x\":1}"}}"#;
        let message: Message = serde_json::from_str(raw).expect("deserialize");

        assert_eq!(message.role, Role::Assistant);
        assert!(message.is_function_call());
        assert_eq!(message.function_call.as_ref().map(|call| call.arguments.as_str()), Some("{\"x\":1}"));
        assert_eq!(message.content_str(), "");
    }
}
