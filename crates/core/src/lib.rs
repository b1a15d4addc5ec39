//! Shared building blocks for switchboard: the conversation data model,
//! function schemas, result envelopes, the error taxonomy and configuration.

pub mod config;
pub mod errors;
pub mod message;
pub mod result;
pub mod schema;

pub use errors::{ErrorClass, RegistryError, SchemaError};
pub use message::{FunctionCall, Message, Role};
pub use result::{FunctionResult, Payload};
pub use schema::{FunctionSchema, ParamType, Parameter, SchemaBuilder};
