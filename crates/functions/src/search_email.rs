use async_trait::async_trait;
use futures::future::try_join_all;
use serde::{Deserialize, Serialize};
use switchboard_agent::{decode_arguments, Function, InvocationContext};
use switchboard_core::{FunctionCall, FunctionResult, FunctionSchema, ParamType, SchemaError};
use tracing::{debug, warn};

use crate::graph::{EmailContent, GraphClient};

pub const NAME: &str = "search_email";

#[derive(Deserialize)]
struct Arguments {
    query: String,
}

#[derive(Serialize)]
struct Emails {
    emails: Vec<EmailContent>,
}

#[derive(Debug)]
pub struct SearchEmail {
    client: GraphClient,
}

impl SearchEmail {
    pub fn new(client: GraphClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Function for SearchEmail {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> Result<FunctionSchema, SchemaError> {
        FunctionSchema::builder(NAME)
            .description("Search Outlook for emails given a query string")
            .parameter("query", ParamType::String, "The query string", true)
            .build()
    }

    async fn invoke(&self, call: &FunctionCall, context: &InvocationContext) -> FunctionResult {
        let arguments: Arguments = match decode_arguments(call) {
            Ok(arguments) => arguments,
            Err(failure) => return failure,
        };

        let ids = match self.client.search_message_ids(&arguments.query).await {
            Ok(ids) => ids,
            Err(error) => {
                warn!(parent: &context.span, event_name = "functions.search_email.failed", error = %error);
                return FunctionResult::error(format!("Email search failed: {error}"));
            }
        };
        debug!(parent: &context.span, event_name = "functions.search_email.hits", hits = ids.len());

        match try_join_all(ids.iter().map(|id| self.client.get_message(id))).await {
            Ok(emails) => FunctionResult::success(&Emails { emails }),
            Err(error) => {
                warn!(parent: &context.span, event_name = "functions.search_email.fetch_failed", error = %error);
                FunctionResult::error(format!("Fetching emails failed: {error}"))
            }
        }
    }
}
