//! Client for the record store's OData and relevance search endpoints.

use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::error::{read_json, BackendError};

const API_VERSION: &str = "v9.2";
pub const SEARCH_TOP: u32 = 10;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    All,
    Any,
}

/// Datetime columns the search filter may compare against.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DateField {
    CreatedOn,
    ModifiedOn,
}

impl DateField {
    pub const ALL: [DateField; 2] = [DateField::CreatedOn, DateField::ModifiedOn];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreatedOn => "createdon",
            Self::ModifiedOn => "modifiedon",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.as_str() == value)
    }
}

/// Keyword search with an optional date window on one datetime column,
/// optionally narrowed to a single entity.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RelevancyQuery {
    pub search: String,
    pub date_field: Option<DateField>,
    pub not_before: Option<DateTime<Utc>>,
    pub not_after: Option<DateTime<Utc>>,
    pub entity: Option<String>,
}

impl RelevancyQuery {
    /// `None` unless a field name and at least one bound are present.
    pub fn date_filter(&self) -> Option<String> {
        let field = self.date_field?.as_str();
        let clauses: Vec<String> = [("gt", self.not_before), ("lt", self.not_after)]
            .into_iter()
            .filter_map(|(op, bound)| {
                bound.map(|bound| format!("{field} {op} {}", bound.to_rfc3339_opts(SecondsFormat::Secs, true)))
            })
            .collect();

        (!clauses.is_empty()).then(|| clauses.join(" and "))
    }
}

#[derive(Serialize)]
struct SearchBody<'a> {
    search: &'a str,
    top: u32,
    searchmode: SearchMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    entities: Option<[&'a str; 1]>,
}

#[derive(Clone)]
pub struct RecordsClient {
    http: Client,
    base_url: String,
    token: Option<SecretString>,
}

impl RecordsClient {
    pub fn new(
        base_url: impl Into<String>,
        token: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, token })
    }

    pub async fn get_entity(&self, entity_set: &str, id: Uuid) -> Result<Value, BackendError> {
        let url = format!("{}/api/data/{API_VERSION}/{entity_set}({id})", self.base_url);
        debug!(event_name = "records.get_entity", entity_set, %id);

        let response = self.authorized(self.http.get(&url)).send().await?;
        read_json(response).await
    }

    /// Returns the `value` array of the search response.
    pub async fn search(
        &self,
        query: &RelevancyQuery,
        mode: SearchMode,
    ) -> Result<Vec<Value>, BackendError> {
        let url = format!("{}/api/search/v1.0/query", self.base_url);
        let body = SearchBody {
            search: &query.search,
            top: SEARCH_TOP,
            searchmode: mode,
            filter: query.date_filter(),
            entities: query.entity.as_deref().map(|entity| [entity]),
        };
        debug!(event_name = "records.search", search = %query.search, mode = ?mode);

        let response = self.authorized(self.http.post(&url).json(&body)).send().await?;
        match read_json(response).await? {
            Value::Object(mut members) => match members.remove("value") {
                Some(Value::Array(hits)) => Ok(hits),
                _ => Err(BackendError::Decode("search response has no `value` array".to_string())),
            },
            _ => Err(BackendError::Decode("search response is not an object".to_string())),
        }
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        let builder = builder
            .header("OData-MaxVersion", "4.0")
            .header("OData-Version", "4.0")
            .header("Accept", "application/json");
        match &self.token {
            Some(token) => builder.bearer_auth(token.expose_secret()),
            None => builder,
        }
    }
}

impl std::fmt::Debug for RecordsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordsClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::{DateField, RecordsClient, RelevancyQuery, SearchMode};

    #[test]
    fn date_filter_needs_field_and_bound() {
        let mut query = RelevancyQuery { search: "Atlanta".to_string(), ..RelevancyQuery::default() };
        assert_eq!(query.date_filter(), None);

        query.not_before = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
        assert_eq!(query.date_filter(), None);

        query.date_field = Some(DateField::CreatedOn);
        assert_eq!(query.date_filter().as_deref(), Some("createdon gt 2024-01-01T00:00:00Z"));

        query.not_after = Utc.with_ymd_and_hms(2024, 2, 1, 12, 30, 0).single();
        assert_eq!(
            query.date_filter().as_deref(),
            Some("createdon gt 2024-01-01T00:00:00Z and createdon lt 2024-02-01T12:30:00Z")
        );
    }

    #[test]
    fn date_field_accepts_only_known_columns() {
        assert_eq!(DateField::parse("modifiedon"), Some(DateField::ModifiedOn));
        assert_eq!(DateField::parse("statecode eq 1"), None);
    }

    #[tokio::test]
    async fn search_narrows_to_entity_when_set() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/search/v1.0/query"))
            .and(body_json(json!({
                "search": "Contoso",
                "top": 10,
                "searchmode": "any",
                "entities": ["msdyn_workorder"]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"value": [{"name": "WO-1"}]})))
            .expect(1)
            .mount(&server)
            .await;
        let client = RecordsClient::new(server.uri(), None, Duration::from_secs(5)).expect("client");
        let query = RelevancyQuery {
            search: "Contoso".to_string(),
            entity: Some("msdyn_workorder".to_string()),
            ..RelevancyQuery::default()
        };

        let hits = client.search(&query, SearchMode::Any).await.expect("search");

        assert_eq!(hits, vec![json!({"name": "WO-1"})]);
    }
}
