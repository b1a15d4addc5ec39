use std::sync::Arc;

use switchboard_core::{ErrorClass, Message};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument, Span};
use uuid::Uuid;

use crate::function::InvocationContext;
use crate::history::History;
use crate::io::{ConversationOutput, UserInput};
use crate::llm::{CompletionClient, CompletionError};
use crate::registry::FunctionRegistry;

pub const DEFAULT_MAX_FUNCTION_CALLS: u32 = 10;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("model called unrecognized function `{name}`")]
    UnrecognizedFunction { name: String },
    #[error(transparent)]
    Completion(#[from] CompletionError),
    #[error("session cancelled")]
    Cancelled,
    #[error("reading user input failed: {0}")]
    Input(#[source] std::io::Error),
}

impl SessionError {
    pub fn error_class(&self) -> ErrorClass {
        match self {
            Self::UnrecognizedFunction { .. } => ErrorClass::UnrecognizedFunction,
            Self::Completion(CompletionError::Configuration(_)) => ErrorClass::Configuration,
            Self::Completion(_) => ErrorClass::Transport,
            Self::Cancelled => ErrorClass::Cancelled,
            Self::Input(_) => ErrorClass::Input,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TurnOutcome {
    Reply(String),
    /// The model kept calling functions past the per-turn limit; the turn was
    /// discarded.
    HopLimitExceeded { calls: u32 },
}

/// Drives one chat session: user text in, completion requests and function
/// dispatch until the model answers with content, reply out.
///
/// A turn only reaches history once it completes. Errors, cancellation and the
/// hop limit all leave history exactly as it was before the user message.
pub struct ConversationLoop {
    client: Arc<dyn CompletionClient>,
    registry: Arc<FunctionRegistry>,
    history: History,
    max_function_calls: Option<u32>,
    cancel: CancellationToken,
    session_id: String,
    span: Span,
}

impl ConversationLoop {
    pub fn new(
        client: Arc<dyn CompletionClient>,
        registry: Arc<FunctionRegistry>,
        system_prompt: impl Into<String>,
    ) -> Self {
        let session_id = Uuid::new_v4().to_string();
        let span = tracing::info_span!("session", session_id = %session_id);

        Self {
            client,
            registry,
            history: History::new(system_prompt),
            max_function_calls: Some(DEFAULT_MAX_FUNCTION_CALLS),
            cancel: CancellationToken::new(),
            session_id,
            span,
        }
    }

    /// `None` removes the per-turn limit.
    pub fn with_max_function_calls(mut self, limit: Option<u32>) -> Self {
        self.max_function_calls = limit;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Runs turns until the input is exhausted. Any error ends the call with
    /// history intact, so a caller may resume with another `run`.
    pub async fn run<I>(
        &mut self,
        input: &mut I,
        output: &dyn ConversationOutput,
    ) -> Result<(), SessionError>
    where
        I: UserInput + ?Sized,
    {
        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(SessionError::Cancelled),
                next = input.next_message() => next.map_err(SessionError::Input)?,
            };

            let Some(text) = next else {
                info!(
                    parent: &self.span,
                    event_name = "session.input_closed",
                    messages = self.history.len(),
                    "input closed, ending session"
                );
                return Ok(());
            };

            if let TurnOutcome::HopLimitExceeded { calls } = self.run_turn(&text, output).await? {
                debug!(parent: &self.span, event_name = "session.turn_skipped", calls);
            }
        }
    }

    pub async fn run_turn(
        &mut self,
        text: &str,
        output: &dyn ConversationOutput,
    ) -> Result<TurnOutcome, SessionError> {
        let span = self.span.clone();
        self.drive_turn(text, output).instrument(span).await
    }

    async fn drive_turn(
        &mut self,
        text: &str,
        output: &dyn ConversationOutput,
    ) -> Result<TurnOutcome, SessionError> {
        let Self { client, registry, history, max_function_calls, cancel, session_id, .. } = self;
        let mut turn = history.begin_turn(text);
        let mut calls: u32 = 0;

        loop {
            let message = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                message = client.next_message(turn.messages(), registry.schemas()) => message?,
            };

            let Some(call) = message.function_call.clone() else {
                let Some(content) = message.content.clone() else {
                    return Err(CompletionError::MalformedResponse(
                        "assistant message has neither content nor a function call".to_string(),
                    )
                    .into());
                };
                turn.push(message);
                turn.commit();
                debug!(event_name = "session.turn_completed", function_calls = calls);
                output.assistant_reply(&content);
                return Ok(TurnOutcome::Reply(content));
            };

            let Some(function) = registry.get(&call.name).cloned() else {
                warn!(
                    event_name = "session.unrecognized_function",
                    function = %call.name,
                    "model called a function that is not registered"
                );
                return Err(SessionError::UnrecognizedFunction { name: call.name });
            };

            if let Some(limit) = *max_function_calls {
                if calls >= limit {
                    drop(turn);
                    warn!(event_name = "session.hop_limit_exceeded", limit, "turn abandoned");
                    output.turn_abandoned(&format!(
                        "too many function calls in one turn (limit {limit}); the message was not kept"
                    ));
                    return Ok(TurnOutcome::HopLimitExceeded { calls });
                }
            }

            turn.push(message);
            debug!(
                event_name = "session.function_dispatch",
                function = %call.name,
                argument_bytes = call.arguments.len()
            );

            let context = InvocationContext {
                session_id: session_id.clone(),
                span: Span::current(),
                cancel: cancel.child_token(),
            };
            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(SessionError::Cancelled),
                result = function.invoke(&call, &context) => result,
            };
            calls += 1;

            let payload = result.to_json();
            if !result.is_success() {
                warn!(
                    event_name = "session.function_failed",
                    function = %call.name,
                    payload = %payload,
                    "function reported a failure"
                );
                output.function_failed(&call.name, &payload);
            }
            turn.push(Message::function_result(call.name, payload));
        }
    }
}

impl std::fmt::Debug for ConversationLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConversationLoop")
            .field("session_id", &self.session_id)
            .field("registry", &self.registry)
            .field("messages", &self.history.len())
            .field("max_function_calls", &self.max_function_calls)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::{json, Value};
    use switchboard_core::{
        ErrorClass, FunctionCall, FunctionResult, FunctionSchema, Message, Role, SchemaError,
    };
    use tokio_util::sync::CancellationToken;

    use crate::function::{Function, InvocationContext};
    use crate::llm::CompletionError;
    use crate::registry::FunctionRegistry;
    use crate::testing::{
        OutputEvent, RecordingFunction, RecordingOutput, ScriptedCompletionClient, ScriptedInput,
    };

    use super::{ConversationLoop, SessionError, TurnOutcome};

    fn call(name: &str, arguments: &str) -> Result<Message, CompletionError> {
        Ok(Message::assistant_call(FunctionCall::new(name, arguments)))
    }

    fn reply(text: &str) -> Result<Message, CompletionError> {
        Ok(Message::assistant(text))
    }

    fn registry_of(functions: &[&RecordingFunction]) -> Arc<FunctionRegistry> {
        let mut builder = FunctionRegistry::builder();
        for function in functions {
            builder.register((*function).clone());
        }
        Arc::new(builder.build().expect("registry should build"))
    }

    fn roles(messages: &[Message]) -> Vec<Role> {
        messages.iter().map(|message| message.role).collect()
    }

    #[tokio::test]
    async fn dispatches_named_function_exactly_once_with_raw_arguments() {
        let a = RecordingFunction::new("a", "{\"from\":\"a\"}");
        let b = RecordingFunction::new("b", "{\"from\":\"b\"}");
        let client = Arc::new(ScriptedCompletionClient::new([call("b", "{\"x\":1}"), reply("done")]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client.clone(), registry_of(&[&a, &b]), "sys");

        let outcome = session.run_turn("go", &output).await.expect("turn should complete");

        assert_eq!(outcome, TurnOutcome::Reply("done".to_string()));
        assert!(a.calls().is_empty());
        assert_eq!(b.calls(), vec![FunctionCall::new("b", "{\"x\":1}")]);

        let messages = session.history().messages();
        assert_eq!(
            roles(messages),
            vec![Role::System, Role::User, Role::Assistant, Role::FunctionResult, Role::Assistant]
        );
        assert_eq!(messages[3].function_name.as_deref(), Some("b"));
        assert_eq!(messages[3].content_str(), "{\"from\":\"b\"}");
        assert_eq!(output.replies(), vec!["done".to_string()]);

        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].function_names, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(requests[1].messages.len(), 4);
    }

    #[tokio::test]
    async fn unrecognized_function_is_fatal_and_invokes_nothing() {
        let a = RecordingFunction::new("a", "{}");
        let b = RecordingFunction::new("b", "{}");
        let client = Arc::new(ScriptedCompletionClient::new([call("c", "{}")]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client, registry_of(&[&a, &b]), "sys");

        let error = session.run_turn("go", &output).await.expect_err("c is not registered");

        assert!(matches!(error, SessionError::UnrecognizedFunction { ref name } if name == "c"));
        assert_eq!(error.error_class(), ErrorClass::UnrecognizedFunction);
        assert!(a.calls().is_empty());
        assert!(b.calls().is_empty());
        assert_eq!(session.history().len(), 1);
    }

    #[tokio::test]
    async fn failure_envelope_is_folded_into_history_and_loop_continues() {
        let lookup = RecordingFunction::failing("lookup", "{\"error\":\"not found\"}");
        let client = Arc::new(ScriptedCompletionClient::new([
            call("lookup", "{\"id\":\"missing\"}"),
            reply("I could not find that record."),
        ]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client.clone(), registry_of(&[&lookup]), "sys");

        let outcome = session.run_turn("find it", &output).await.expect("turn should complete");

        assert_eq!(outcome, TurnOutcome::Reply("I could not find that record.".to_string()));
        let requests = client.requests();
        assert_eq!(requests.len(), 2);
        let fed_back = requests[1].messages.last().expect("function result message");
        assert_eq!(fed_back.role, Role::FunctionResult);
        let body: Value = serde_json::from_str(fed_back.content_str()).expect("json");
        assert_eq!(body, json!({"error": "not found"}));
        assert_eq!(
            output.events()[0],
            OutputEvent::FunctionFailed {
                name: "lookup".to_string(),
                payload: "{\"error\":\"not found\"}".to_string()
            }
        );
    }

    #[tokio::test]
    async fn chained_calls_keep_alternating_order() {
        let first = RecordingFunction::new("f", "{\"step\":1}");
        let second = RecordingFunction::new("g", "{\"step\":2}");
        let client = Arc::new(ScriptedCompletionClient::new([
            call("f", "{}"),
            call("g", "{}"),
            reply("both done"),
        ]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client, registry_of(&[&first, &second]), "sys");

        session.run_turn("chain", &output).await.expect("turn should complete");

        let messages = session.history().messages();
        assert_eq!(
            roles(messages),
            vec![
                Role::System,
                Role::User,
                Role::Assistant,
                Role::FunctionResult,
                Role::Assistant,
                Role::FunctionResult,
                Role::Assistant,
            ]
        );
        for (index, message) in messages.iter().enumerate() {
            if message.role == Role::FunctionResult {
                let request = messages[index - 1].function_call.as_ref().expect("preceding call");
                assert_eq!(message.function_name.as_deref(), Some(request.name.as_str()));
            }
        }
        assert_eq!(first.calls().len(), 1);
        assert_eq!(second.calls().len(), 1);
    }

    #[tokio::test]
    async fn reply_only_turns_alternate_user_and_assistant() {
        let client = Arc::new(ScriptedCompletionClient::new([reply("one"), reply("two")]));
        let output = RecordingOutput::default();
        let mut input = ScriptedInput::new(["hello", "again"]);
        let mut session = ConversationLoop::new(client, registry_of(&[]), "sys");

        session.run(&mut input, &output).await.expect("input exhaustion ends the session");

        assert_eq!(
            roles(session.history().messages()),
            vec![Role::System, Role::User, Role::Assistant, Role::User, Role::Assistant]
        );
        assert_eq!(output.replies(), vec!["one".to_string(), "two".to_string()]);
    }

    #[tokio::test]
    async fn hop_limit_discards_turn_and_session_continues() {
        let spin = RecordingFunction::new("spin", "{}");
        let client = Arc::new(ScriptedCompletionClient::new([
            call("spin", "{}"),
            call("spin", "{}"),
            call("spin", "{}"),
            reply("recovered"),
        ]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client.clone(), registry_of(&[&spin]), "sys")
            .with_max_function_calls(Some(2));

        let outcome = session.run_turn("loop forever", &output).await.expect("limit is not an error");

        assert_eq!(outcome, TurnOutcome::HopLimitExceeded { calls: 2 });
        assert_eq!(spin.calls().len(), 2);
        assert_eq!(client.remaining(), 1, "the third call is refused without a further request");
        assert_eq!(session.history().len(), 1);
        assert!(matches!(output.events().last(), Some(OutputEvent::TurnAbandoned(_))));

        let next = session.run_turn("try again", &output).await.expect("next turn");
        assert_eq!(next, TurnOutcome::Reply("recovered".to_string()));
        assert_eq!(roles(session.history().messages()), vec![Role::System, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn transport_error_leaves_history_unchanged() {
        let lookup = RecordingFunction::new("lookup", "{}");
        let client = Arc::new(ScriptedCompletionClient::new([
            reply("first"),
            call("lookup", "{}"),
            Err(CompletionError::Status { status: 503, body: "unavailable".to_string() }),
        ]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client, registry_of(&[&lookup]), "sys");
        session.run_turn("one", &output).await.expect("first turn");
        let before = session.history().messages().to_vec();

        let error = session.run_turn("two", &output).await.expect_err("503 should fail the turn");

        assert_eq!(error.error_class(), ErrorClass::Transport);
        assert!(!error.error_class().is_fatal());
        assert_eq!(session.history().messages(), before.as_slice());
        assert_eq!(lookup.calls().len(), 1);
    }

    #[tokio::test]
    async fn empty_assistant_message_is_malformed() {
        let client = Arc::new(ScriptedCompletionClient::new([Ok(Message {
            role: Role::Assistant,
            content: None,
            function_call: None,
            function_name: None,
        })]));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client, registry_of(&[]), "sys");

        let error = session.run_turn("hi", &output).await.expect_err("malformed");

        assert!(matches!(error, SessionError::Completion(CompletionError::MalformedResponse(_))));
        assert_eq!(session.history().len(), 1);
    }

    struct CancelsSession {
        token: CancellationToken,
    }

    #[async_trait]
    impl Function for CancelsSession {
        fn name(&self) -> &str {
            "hang_up"
        }

        fn schema(&self) -> Result<FunctionSchema, SchemaError> {
            FunctionSchema::builder("hang_up").build()
        }

        async fn invoke(&self, _call: &FunctionCall, _context: &InvocationContext) -> FunctionResult {
            self.token.cancel();
            FunctionResult::raw(true, "{}")
        }
    }

    #[tokio::test]
    async fn cancellation_mid_turn_discards_staged_messages() {
        let token = CancellationToken::new();
        let mut builder = FunctionRegistry::builder();
        builder.register(CancelsSession { token: token.clone() });
        let registry = Arc::new(builder.build().expect("registry"));
        let client = Arc::new(ScriptedCompletionClient::new([call("hang_up", ""), reply("unreachable")]));
        let output = RecordingOutput::default();
        let mut session =
            ConversationLoop::new(client.clone(), registry, "sys").with_cancellation(token);

        let error = session.run_turn("bye", &output).await.expect_err("cancelled");

        assert!(matches!(error, SessionError::Cancelled));
        assert_eq!(session.history().len(), 1);
        assert_eq!(client.requests().len(), 1);
        assert!(output.replies().is_empty());
    }

    #[tokio::test]
    async fn cancelled_session_stops_before_reading_input() {
        let token = CancellationToken::new();
        token.cancel();
        let client = Arc::new(ScriptedCompletionClient::new([reply("unused")]));
        let output = RecordingOutput::default();
        let mut input = ScriptedInput::new(["hello"]);
        let mut session =
            ConversationLoop::new(client.clone(), registry_of(&[]), "sys").with_cancellation(token);

        let error = session.run(&mut input, &output).await.expect_err("cancelled");

        assert_eq!(error.error_class(), ErrorClass::Cancelled);
        assert!(client.requests().is_empty());
    }

    #[tokio::test]
    async fn unlimited_hops_allow_long_chains() {
        let step = RecordingFunction::new("step", "{}");
        let mut script: Vec<Result<Message, CompletionError>> =
            (0..25).map(|_| call("step", "{}")).collect();
        script.push(reply("finally"));
        let client = Arc::new(ScriptedCompletionClient::new(script));
        let output = RecordingOutput::default();
        let mut session = ConversationLoop::new(client, registry_of(&[&step]), "sys")
            .with_max_function_calls(None);

        let outcome = session.run_turn("go long", &output).await.expect("turn");

        assert_eq!(outcome, TurnOutcome::Reply("finally".to_string()));
        assert_eq!(step.calls().len(), 25);
    }
}
