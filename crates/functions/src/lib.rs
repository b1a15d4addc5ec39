//! Reference capabilities: record lookup by id, plain-language record search
//! and mail search. Each one owns its REST transport and reports every
//! failure as a failure envelope.

pub mod error;
pub mod get_entity;
pub mod graph;
pub mod json;
pub mod query_records;
pub mod records;
pub mod search_email;

use std::sync::Arc;
use std::time::Duration;

use switchboard_agent::{CompletionClient, FunctionRegistry};
use switchboard_core::config::AppConfig;
use switchboard_core::RegistryError;
use thiserror::Error;
use tracing::info;

pub use error::BackendError;
pub use get_entity::GetEntityByGuid;
pub use graph::GraphClient;
pub use query_records::QueryRecords;
pub use records::RecordsClient;
pub use search_email::SearchEmail;

#[derive(Debug, Error)]
pub enum SetupError {
    #[error("failed to build http client: {0}")]
    Backend(#[from] BackendError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Registers every capability whose back-end is configured. Record functions
/// need `records.base_url`; mail search needs `graph.token`.
pub fn build_registry(
    config: &AppConfig,
    completion: Arc<dyn CompletionClient>,
) -> Result<FunctionRegistry, SetupError> {
    let timeout = Duration::from_secs(config.llm.timeout_secs);
    let mut builder = FunctionRegistry::builder();

    if let Some(base_url) = config.records.base_url.as_deref() {
        let records = RecordsClient::new(base_url, config.records.token.clone(), timeout)?;
        builder
            .register(GetEntityByGuid::new(records.clone(), config.records.entity_types.clone()))
            .register(QueryRecords::new(completion, records));
    }

    if let Some(token) = config.graph.token.clone() {
        builder.register(SearchEmail::new(GraphClient::new(&config.graph.base_url, token, timeout)?));
    }

    let registry = builder.build()?;
    info!(
        event_name = "functions.registry.built",
        functions = registry.len(),
        names = %registry.names().collect::<Vec<_>>().join(","),
        "function registry ready"
    );
    Ok(registry)
}
