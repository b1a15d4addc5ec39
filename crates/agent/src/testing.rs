//! In-memory collaborators for exercising the conversation loop and
//! capabilities without a network.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use switchboard_core::{
    FunctionCall, FunctionResult, FunctionSchema, Message, ParamType, SchemaError,
};

use crate::function::{Function, InvocationContext};
use crate::io::{ConversationOutput, UserInput};
use crate::llm::{ChatRequest, CompletionClient, CompletionError};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug, PartialEq)]
pub struct RecordedRequest {
    pub messages: Vec<Message>,
    pub function_names: Vec<String>,
    pub forced_function: Option<String>,
}

/// Replays a fixed sequence of responses and records every request it saw.
#[derive(Debug, Default)]
pub struct ScriptedCompletionClient {
    script: Mutex<VecDeque<Result<Message, CompletionError>>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl ScriptedCompletionClient {
    pub fn new<I>(script: I) -> Self
    where
        I: IntoIterator<Item = Result<Message, CompletionError>>,
    {
        Self { script: Mutex::new(script.into_iter().collect()), requests: Mutex::default() }
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.requests).clone()
    }

    pub fn remaining(&self) -> usize {
        lock(&self.script).len()
    }
}

#[async_trait]
impl CompletionClient for ScriptedCompletionClient {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<Message, CompletionError> {
        lock(&self.requests).push(RecordedRequest {
            messages: request.messages.to_vec(),
            function_names: request
                .functions
                .iter()
                .map(|schema| schema.name().to_string())
                .collect(),
            forced_function: request.force_function.map(str::to_string),
        });

        lock(&self.script).pop_front().unwrap_or_else(|| {
            Err(CompletionError::MalformedResponse("scripted responses exhausted".to_string()))
        })
    }
}

/// Capability that returns a canned payload and logs each call. Clones share
/// the same log.
#[derive(Clone, Debug)]
pub struct RecordingFunction {
    name: String,
    result: FunctionResult,
    calls: Arc<Mutex<Vec<FunctionCall>>>,
}

impl RecordingFunction {
    pub fn new(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::with_result(name, FunctionResult::raw(true, payload))
    }

    pub fn failing(name: impl Into<String>, payload: impl Into<String>) -> Self {
        Self::with_result(name, FunctionResult::raw(false, payload))
    }

    pub fn with_result(name: impl Into<String>, result: FunctionResult) -> Self {
        Self { name: name.into(), result, calls: Arc::default() }
    }

    pub fn calls(&self) -> Vec<FunctionCall> {
        lock(&self.calls).clone()
    }
}

#[async_trait]
impl Function for RecordingFunction {
    fn name(&self) -> &str {
        &self.name
    }

    fn schema(&self) -> Result<FunctionSchema, SchemaError> {
        FunctionSchema::builder(self.name.clone())
            .description("Records its calls.")
            .parameter("x", ParamType::Number, "Any number", false)
            .build()
    }

    async fn invoke(&self, call: &FunctionCall, _context: &InvocationContext) -> FunctionResult {
        lock(&self.calls).push(call.clone());
        self.result.clone()
    }
}

#[derive(Debug, Default)]
pub struct ScriptedInput {
    lines: VecDeque<String>,
}

impl ScriptedInput {
    pub fn new<I, S>(lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self { lines: lines.into_iter().map(Into::into).collect() }
    }
}

#[async_trait]
impl UserInput for ScriptedInput {
    async fn next_message(&mut self) -> std::io::Result<Option<String>> {
        Ok(self.lines.pop_front())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutputEvent {
    Reply(String),
    FunctionFailed { name: String, payload: String },
    TurnAbandoned(String),
}

#[derive(Debug, Default)]
pub struct RecordingOutput {
    events: Mutex<Vec<OutputEvent>>,
}

impl RecordingOutput {
    pub fn events(&self) -> Vec<OutputEvent> {
        lock(&self.events).clone()
    }

    pub fn replies(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|event| match event {
                OutputEvent::Reply(text) => Some(text),
                _ => None,
            })
            .collect()
    }
}

impl ConversationOutput for RecordingOutput {
    fn assistant_reply(&self, text: &str) {
        lock(&self.events).push(OutputEvent::Reply(text.to_string()));
    }

    fn function_failed(&self, name: &str, payload: &str) {
        lock(&self.events)
            .push(OutputEvent::FunctionFailed { name: name.to_string(), payload: payload.to_string() });
    }

    fn turn_abandoned(&self, reason: &str) {
        lock(&self.events).push(OutputEvent::TurnAbandoned(reason.to_string()));
    }
}
