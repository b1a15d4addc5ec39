use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use switchboard_agent::{
    load_system_prompt, CompletionClient, ConversationLoop, ConversationOutput, OpenAiChatClient,
    SessionError,
};
use switchboard_core::config::{AppConfig, LoadOptions};
use switchboard_core::ErrorClass;
use switchboard_functions::build_registry;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::commands::CommandResult;
use crate::console::{ConsoleInput, ConsoleOutput};
use crate::logging::init_logging;

const COMMAND: &str = "chat";

pub fn run(options: LoadOptions) -> CommandResult {
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::classified_failure(COMMAND, ErrorClass::Configuration, error.to_string())
        }
    };
    init_logging(&config.logging);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                COMMAND,
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                6,
            )
        }
    };

    let outcome = runtime.block_on(chat(config));
    // Stdin is read on a detached thread; never wait for it on the way out.
    runtime.shutdown_background();

    match outcome {
        Ok(message) => CommandResult::success(COMMAND, message),
        Err(error) => {
            let class = error
                .downcast_ref::<SessionError>()
                .map_or(ErrorClass::Configuration, SessionError::error_class);
            error!(event_name = "cli.chat.failed", error_class = class.as_str(), error = %error);
            CommandResult::classified_failure(COMMAND, class, format!("{error:#}"))
        }
    }
}

async fn chat(config: AppConfig) -> Result<String> {
    let client: Arc<dyn CompletionClient> = Arc::new(
        OpenAiChatClient::from_config(&config.llm, config.sampling)
            .context("completion client could not be created")?,
    );
    let registry = Arc::new(
        build_registry(&config, Arc::clone(&client)).context("function registry could not be built")?,
    );
    let system_prompt = load_system_prompt(config.session.system_prompt_path.as_deref(), Utc::now())
        .context("system prompt could not be loaded")?;

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_interrupt.cancel();
        }
    });

    let mut conversation = ConversationLoop::new(client, Arc::clone(&registry), system_prompt)
        .with_max_function_calls(config.session.max_function_calls())
        .with_cancellation(cancel);
    info!(
        event_name = "cli.chat.started",
        session_id = conversation.session_id(),
        functions = registry.len(),
        "chat session started"
    );

    let mut input = ConsoleInput::stdin();
    let output = ConsoleOutput;
    loop {
        match conversation.run(&mut input, &output).await {
            Ok(()) => return Ok("session ended".to_string()),
            Err(error) if !error.error_class().is_fatal() => {
                warn!(event_name = "cli.chat.turn_failed", error = %error);
                output.turn_abandoned(&format!("{} ({error})", error.error_class().user_message()));
            }
            Err(error) => return Err(error.into()),
        }
    }
}
