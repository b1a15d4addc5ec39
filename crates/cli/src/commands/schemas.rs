use std::sync::Arc;

use switchboard_agent::{CompletionClient, OpenAiChatClient};
use switchboard_core::config::{AppConfig, LoadOptions};
use switchboard_core::ErrorClass;
use switchboard_functions::build_registry;

use crate::commands::CommandResult;

const COMMAND: &str = "schemas";

/// Prints the exact `functions` array a completion request would carry.
pub fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::classified_failure(COMMAND, ErrorClass::Configuration, error.to_string())
        }
    };

    let client: Arc<dyn CompletionClient> =
        match OpenAiChatClient::from_config(&config.llm, config.sampling) {
            Ok(client) => Arc::new(client),
            Err(error) => {
                return CommandResult::classified_failure(
                    COMMAND,
                    ErrorClass::Configuration,
                    error.to_string(),
                )
            }
        };

    let registry = match build_registry(&config, client) {
        Ok(registry) => registry,
        Err(error) => {
            return CommandResult::classified_failure(COMMAND, ErrorClass::Configuration, error.to_string())
        }
    };

    match serde_json::to_string_pretty(registry.schemas()) {
        Ok(output) => CommandResult { exit_code: 0, output },
        Err(error) => CommandResult::failure(COMMAND, "serialization", error.to_string(), 1),
    }
}
