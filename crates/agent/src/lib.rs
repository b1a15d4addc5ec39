//! Conversation runtime for function-calling chat sessions.
//!
//! The loop sends the running history plus every registered function schema
//! to a chat-completion endpoint. When the model asks for a function, the
//! matching capability is invoked, its result envelope is appended, and the
//! model is asked again; when it answers with text, the reply goes to the user.
//!
//! # Key Types
//!
//! - `ConversationLoop` - per-session driver (see `runtime`)
//! - `CompletionClient` - pluggable completion endpoint, `OpenAiChatClient` for HTTP
//! - `Function` / `FunctionRegistry` - named capabilities and their schemas
//! - `History` / `Turn` - staged history that only keeps completed turns

pub mod function;
pub mod history;
pub mod io;
pub mod llm;
pub mod openai;
pub mod prompt;
pub mod registry;
pub mod runtime;
pub mod testing;

pub use function::{decode_arguments, Function, InvocationContext};
pub use history::{History, Turn};
pub use io::{ConversationOutput, UserInput};
pub use llm::{ChatRequest, CompletionClient, CompletionError};
pub use openai::OpenAiChatClient;
pub use prompt::{load_system_prompt, PromptError};
pub use registry::{FunctionRegistry, FunctionRegistryBuilder};
pub use runtime::{ConversationLoop, SessionError, TurnOutcome, DEFAULT_MAX_FUNCTION_CALLS};
