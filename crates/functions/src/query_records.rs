use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use switchboard_agent::{decode_arguments, CompletionClient, Function, InvocationContext};
use switchboard_core::{FunctionCall, FunctionResult, FunctionSchema, ParamType, SchemaError};
use tracing::{debug, info, warn};

use crate::json::strip_nulls;
use crate::records::{DateField, RecordsClient, RelevancyQuery, SearchMode};

pub const NAME: &str = "query_records";
pub const EXTRACTION_FUNCTION: &str = "query_records_relevancy_api";

#[derive(Deserialize)]
struct Arguments {
    plain_text_query: String,
}

/// Entities the search may be narrowed to: the name offered to the model and
/// the logical name the search endpoint expects.
const SEARCHABLE_ENTITIES: [(&str, &str); 1] = [("work_order", "msdyn_workorder")];

#[derive(Debug, Deserialize, PartialEq, Eq)]
struct ExtractedQuery {
    relevancy_search_query: String,
    #[serde(default)]
    not_before_utc: Option<String>,
    #[serde(default)]
    not_after_utc: Option<String>,
    #[serde(default)]
    date_field_name: Option<String>,
    #[serde(default)]
    entity_name: Option<String>,
}

impl TryFrom<ExtractedQuery> for RelevancyQuery {
    type Error = String;

    fn try_from(extracted: ExtractedQuery) -> Result<Self, Self::Error> {
        let date_field = extracted
            .date_field_name
            .as_deref()
            .map(|name| {
                DateField::parse(name).ok_or_else(|| format!("Unsupported date field `{name}`"))
            })
            .transpose()?;
        let entity = extracted
            .entity_name
            .as_deref()
            .map(|name| {
                SEARCHABLE_ENTITIES
                    .iter()
                    .find(|(alias, _)| *alias == name)
                    .map(|(_, logical)| (*logical).to_string())
                    .ok_or_else(|| format!("Unsupported entity `{name}`"))
            })
            .transpose()?;

        Ok(Self {
            search: extracted.relevancy_search_query,
            date_field,
            not_before: parse_bound("not_before_utc", extracted.not_before_utc.as_deref())?,
            not_after: parse_bound("not_after_utc", extracted.not_after_utc.as_deref())?,
            entity,
        })
    }
}

/// Accepts RFC 3339 and the minute-precision form offered in the examples
/// (`1997-07-16T19:20Z`, `2024-05-01T09:30+02:00`).
fn parse_bound(field: &str, value: Option<&str>) -> Result<Option<DateTime<Utc>>, String> {
    let Some(raw) = value.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(None);
    };
    let normalized = match raw.strip_suffix(['Z', 'z']) {
        Some(stem) => format!("{stem}+00:00"),
        None => raw.to_string(),
    };

    DateTime::parse_from_rfc3339(&normalized)
        .or_else(|_| DateTime::parse_from_str(&normalized, "%Y-%m-%dT%H:%M%:z"))
        .map(|parsed| Some(parsed.with_timezone(&Utc)))
        .map_err(|_| format!("`{field}` is not a date: {raw}"))
}

/// Answers a plain-language question about records in two steps: a forced
/// single-function completion turns the prose into a keyword query, then the
/// relevance search endpoint runs it.
pub struct QueryRecords {
    completion: Arc<dyn CompletionClient>,
    records: RecordsClient,
}

impl QueryRecords {
    pub fn new(completion: Arc<dyn CompletionClient>, records: RecordsClient) -> Self {
        Self { completion, records }
    }

    async fn extract_query(&self, plain_text: &str) -> Result<RelevancyQuery, String> {
        let schema = extraction_schema().map_err(|error| error.to_string())?;
        let system = extraction_system_message(Utc::now());

        let arguments = self
            .completion
            .extract_arguments(&schema, plain_text, Some(&system))
            .await
            .map_err(|error| format!("Could not build a search query: {error}"))?;

        let extracted: ExtractedQuery = serde_json::from_str(&arguments)
            .map_err(|error| format!("Could not parse the generated search query: {error}"))?;
        RelevancyQuery::try_from(extracted)
            .map_err(|error| format!("Could not use the generated search query: {error}"))
    }
}

fn extraction_schema() -> Result<FunctionSchema, SchemaError> {
    FunctionSchema::builder(EXTRACTION_FUNCTION)
        .description("Search using the relevancy search API, a Lucene-based index search")
        .parameter(
            "relevancy_search_query",
            ParamType::String,
            "The keyword query text. Should be short and simple. Must not include entity names, only values.",
            true,
        )
        .parameter(
            "not_before_utc",
            ParamType::String,
            "Optional. Exclude results before this date. E.x. '1997-07-16T19:20Z'",
            false,
        )
        .parameter(
            "not_after_utc",
            ParamType::String,
            "Optional. Exclude results after this date. E.x. '1997-07-16T19:20Z'",
            false,
        )
        .enum_parameter(
            "date_field_name",
            "The datetime field name to compare against. Required when not_before_utc or not_after_utc is set.",
            DateField::ALL.map(DateField::as_str),
            false,
        )
        .enum_parameter(
            "entity_name",
            "Limit results to a particular entity type",
            SEARCHABLE_ENTITIES.map(|(alias, _)| alias),
            false,
        )
        .build()
}

fn extraction_system_message(now: DateTime<Utc>) -> String {
    let stamp = |at: DateTime<Utc>| at.format("%Y-%m-%dT%H:%M%:z").to_string();
    let two_weeks_ago = now - Duration::days(14);

    format!(
        "[TIMESTAMP UTC: {now}]\n\
         You are an assistant that can query a record store, given plaintext user queries.\n\
         An example is provided below.\n\n\
         EXAMPLE:\n\
         user input: 'unscheduled work orders for Contoso Coffee Co account'\n\
         expected relevancy_search_query: 'Contoso Coffee Co unscheduled'\n\n\
         The next example demonstrates the optional date filtering:\n\n\
         EXAMPLE:\n\
         user input: 'accounts in atlanta created in the last two weeks'\n\
         expected relevancy_search_query: 'Atlanta'\n\
         expected not_before_utc: '{before}'\n\
         expected date_field_name: 'createdon'",
        now = stamp(now),
        before = stamp(two_weeks_ago),
    )
}

#[async_trait]
impl Function for QueryRecords {
    fn name(&self) -> &str {
        NAME
    }

    fn schema(&self) -> Result<FunctionSchema, SchemaError> {
        FunctionSchema::builder(NAME)
            .description("Search business records using a query in plain English")
            .parameter("plain_text_query", ParamType::String, "The query, in plain English text", true)
            .build()
    }

    async fn invoke(&self, call: &FunctionCall, context: &InvocationContext) -> FunctionResult {
        let arguments: Arguments = match decode_arguments(call) {
            Ok(arguments) => arguments,
            Err(failure) => return failure,
        };

        let query = match self.extract_query(&arguments.plain_text_query).await {
            Ok(query) => query,
            Err(message) => {
                warn!(parent: &context.span, event_name = "functions.query_records.extract_failed", error = %message);
                return FunctionResult::error(message);
            }
        };
        debug!(
            parent: &context.span,
            event_name = "functions.query_records.query",
            search = %query.search,
            filter = %query.date_filter().unwrap_or_default()
        );

        let mut hits = match self.records.search(&query, SearchMode::All).await {
            Ok(hits) => hits,
            Err(error) => return FunctionResult::error(format!("Record search failed: {error}")),
        };

        if hits.is_empty() {
            info!(
                parent: &context.span,
                event_name = "functions.query_records.broadened",
                "no results, retrying with any-term matching"
            );
            hits = match self.records.search(&query, SearchMode::Any).await {
                Ok(hits) => hits,
                Err(error) => return FunctionResult::error(format!("Record search failed: {error}")),
            };
        }

        let hits: Vec<_> = hits.into_iter().map(strip_nulls).collect();
        FunctionResult::success(&hits)
    }
}
