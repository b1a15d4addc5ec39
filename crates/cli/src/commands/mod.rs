pub mod chat;
pub mod config;
pub mod doctor;
pub mod schemas;

use serde::Serialize;
use switchboard_core::ErrorClass;

#[derive(Debug, Clone)]
pub struct CommandResult {
    pub exit_code: u8,
    pub output: String,
}

#[derive(Debug, Serialize)]
struct CommandOutcome<'a> {
    command: &'a str,
    status: &'static str,
    error_class: Option<&'a str>,
    message: String,
}

impl CommandResult {
    pub fn success(command: &str, message: impl Into<String>) -> Self {
        let payload =
            CommandOutcome { command, status: "ok", error_class: None, message: message.into() };
        Self { exit_code: 0, output: serialize_payload(&payload) }
    }

    pub fn failure(
        command: &str,
        error_class: &str,
        message: impl Into<String>,
        exit_code: u8,
    ) -> Self {
        let payload = CommandOutcome {
            command,
            status: "error",
            error_class: Some(error_class),
            message: message.into(),
        };
        Self { exit_code, output: serialize_payload(&payload) }
    }

    pub fn classified_failure(command: &str, class: ErrorClass, message: impl Into<String>) -> Self {
        Self::failure(command, class.as_str(), message, exit_code_for(class))
    }
}

pub fn exit_code_for(class: ErrorClass) -> u8 {
    match class {
        ErrorClass::Configuration => 2,
        ErrorClass::Transport => 3,
        ErrorClass::UnrecognizedFunction => 4,
        ErrorClass::Input => 5,
        ErrorClass::Cancelled => 130,
    }
}

fn serialize_payload(payload: &CommandOutcome<'_>) -> String {
    serde_json::to_string(payload).unwrap_or_else(|error| {
        format!(
            "{{\"command\":\"unknown\",\"status\":\"error\",\"error_class\":\"serialization\",\"message\":\"{}\"}}",
            error.to_string().replace('\\', "\\\\").replace('"', "\\\"")
        )
    })
}
