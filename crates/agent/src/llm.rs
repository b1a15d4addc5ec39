use async_trait::async_trait;
use switchboard_core::{FunctionSchema, Message};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("completion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("completion request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("completion request failed: malformed response: {0}")]
    MalformedResponse(String),
    #[error("completion request failed: response contained no choices")]
    NoChoices,
    #[error("completion request failed: model did not call `{0}`")]
    MissingFunctionCall(String),
    #[error("completion client is misconfigured: {0}")]
    Configuration(String),
}

/// One round trip to the chat-completion endpoint.
#[derive(Clone, Copy, Debug)]
pub struct ChatRequest<'a> {
    pub messages: &'a [Message],
    pub functions: &'a [FunctionSchema],
    /// Forces the model to call this function instead of answering.
    pub force_function: Option<&'a str>,
}

#[async_trait]
pub trait CompletionClient: Send + Sync {
    /// Returns the first choice's message as the endpoint produced it.
    async fn complete(&self, request: ChatRequest<'_>) -> Result<Message, CompletionError>;

    async fn next_message(
        &self,
        history: &[Message],
        functions: &[FunctionSchema],
    ) -> Result<Message, CompletionError> {
        self.complete(ChatRequest { messages: history, functions, force_function: None }).await
    }

    /// Single-shot structured extraction: forces `function` and returns only the
    /// JSON-encoded arguments the model produced for it.
    async fn extract_arguments(
        &self,
        function: &FunctionSchema,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, CompletionError> {
        let messages = single_shot_messages(prompt, system);
        let message = self
            .complete(ChatRequest {
                messages: &messages,
                functions: std::slice::from_ref(function),
                force_function: Some(function.name()),
            })
            .await?;

        message
            .function_call
            .map(|call| call.arguments)
            .ok_or_else(|| CompletionError::MissingFunctionCall(function.name().to_string()))
    }

    async fn complete_text(
        &self,
        prompt: &str,
        system: Option<&str>,
    ) -> Result<String, CompletionError> {
        let messages = single_shot_messages(prompt, system);
        let message = self
            .complete(ChatRequest { messages: &messages, functions: &[], force_function: None })
            .await?;

        Ok(message.content.unwrap_or_default())
    }
}

fn single_shot_messages(prompt: &str, system: Option<&str>) -> Vec<Message> {
    let mut messages = Vec::with_capacity(2);
    if let Some(system) = system {
        messages.push(Message::system(system));
    }
    messages.push(Message::user(prompt));
    messages
}
