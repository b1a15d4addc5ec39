use async_trait::async_trait;
use serde::Deserialize;
use switchboard_agent::{decode_arguments, Function, InvocationContext};
use switchboard_core::{FunctionCall, FunctionResult, FunctionSchema, ParamType, SchemaError};
use tracing::warn;
use uuid::Uuid;

use crate::json::strip_nulls;
use crate::records::RecordsClient;

pub const NAME: &str = "get_entity_by_guid";

#[derive(Deserialize)]
struct Arguments {
    entity_id: String,
    entity_type: String,
}

/// Fetches a single record by id from one of the configured entity sets.
#[derive(Debug)]
pub struct GetEntityByGuid {
    client: RecordsClient,
    entity_types: Vec<String>,
}

impl GetEntityByGuid {
    pub fn new(client: RecordsClient, entity_types: Vec<String>) -> Self {
        Self { client, entity_types }
    }
}

#[async_trait]
impl Function for GetEntityByGuid {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> Result<FunctionSchema, SchemaError> {
        FunctionSchema::builder(NAME)
            .description("Retrieve an entity as json, given a guid of its ID.")
            .parameter("entity_id", ParamType::String, "The guid ID of the entity", true)
            .enum_parameter(
                "entity_type",
                "The type of entity to query",
                self.entity_types.iter().cloned(),
                true,
            )
            .build()
    }

    async fn invoke(&self, call: &FunctionCall, context: &InvocationContext) -> FunctionResult {
        let arguments: Arguments = match decode_arguments(call) {
            Ok(arguments) => arguments,
            Err(failure) => return failure,
        };

        let Ok(id) = Uuid::parse_str(arguments.entity_id.trim()) else {
            return FunctionResult::error(
                "The given ID was not a valid guid. This function can only be called on valid guids. Try searching a different way.",
            );
        };

        if !self.entity_types.iter().any(|known| *known == arguments.entity_type) {
            return FunctionResult::error(format!(
                "Unknown entity type `{}`. Expected one of: {}.",
                arguments.entity_type,
                self.entity_types.join(", ")
            ));
        }

        match self.client.get_entity(&arguments.entity_type, id).await {
            Ok(entity) => FunctionResult::success(&strip_nulls(entity)),
            Err(error) => {
                warn!(
                    parent: &context.span,
                    event_name = "functions.get_entity.failed",
                    entity_type = %arguments.entity_type,
                    error = %error,
                    "entity lookup failed"
                );
                FunctionResult::error(format!("Entity lookup failed: {error}"))
            }
        }
    }
}
