//! Mail search through the Graph search and messages endpoints.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::error::{read_json, BackendError};

pub const MESSAGE_SEARCH_SIZE: u32 = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EmailContent {
    pub subject: String,
    pub sent: Option<DateTime<Utc>>,
    pub body: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchResult>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    #[serde(default)]
    hits_containers: Vec<HitsContainer>,
}

#[derive(Deserialize)]
struct HitsContainer {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Hit {
    hit_id: Option<String>,
    #[serde(default)]
    resource: Option<Resource>,
}

#[derive(Deserialize)]
struct Resource {
    #[serde(rename = "@odata.type")]
    odata_type: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    sent_date_time: Option<DateTime<Utc>>,
    #[serde(default)]
    body: Option<ItemBody>,
}

#[derive(Deserialize)]
struct ItemBody {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Clone)]
pub struct GraphClient {
    http: Client,
    base_url: String,
    token: SecretString,
}

impl GraphClient {
    pub fn new(
        base_url: impl Into<String>,
        token: SecretString,
        timeout: Duration,
    ) -> Result<Self, BackendError> {
        let http = Client::builder().timeout(timeout).build()?;
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Ok(Self { http, base_url, token })
    }

    /// Ids of the top message hits for `query`, best first. A response with
    /// no result sets is an empty match, not an error.
    pub async fn search_message_ids(&self, query: &str) -> Result<Vec<String>, BackendError> {
        let url = format!("{}/v1.0/search/query", self.base_url);
        let body = json!({
            "requests": [{
                "entityTypes": ["message"],
                "query": {"queryString": query},
                "enableTopResults": true,
                "from": 0,
                "size": MESSAGE_SEARCH_SIZE,
            }]
        });
        debug!(event_name = "graph.search", query);

        let response = self.authorized(self.http.post(&url).json(&body)).send().await?;
        let parsed: SearchResponse = serde_json::from_value(read_json(response).await?)
            .map_err(|error| BackendError::Decode(error.to_string()))?;

        Ok(parsed
            .value
            .into_iter()
            .take(1)
            .flat_map(|result| result.hits_containers)
            .flat_map(|container| container.hits)
            .filter(|hit| is_message(hit.resource.as_ref()))
            .filter_map(|hit| hit.hit_id)
            .collect())
    }

    pub async fn get_message(&self, id: &str) -> Result<EmailContent, BackendError> {
        let url = format!("{}/v1.0/me/messages/{id}", self.base_url);
        let request = self
            .http
            .get(&url)
            .query(&[("$select", "subject,body,bodyPreview,uniqueBody,sentDateTime")])
            .header("Prefer", "outlook.body-content-type=\"text\"");

        let response = self.authorized(request).send().await?;
        let message: GraphMessage = serde_json::from_value(read_json(response).await?)
            .map_err(|error| BackendError::Decode(error.to_string()))?;

        Ok(EmailContent {
            subject: message.subject.unwrap_or_default(),
            sent: message.sent_date_time,
            body: message.body.and_then(|body| body.content).unwrap_or_default(),
        })
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder.bearer_auth(self.token.expose_secret())
    }
}

fn is_message(resource: Option<&Resource>) -> bool {
    match resource.and_then(|resource| resource.odata_type.as_deref()) {
        Some(kind) => kind.ends_with(".message"),
        None => true,
    }
}

impl std::fmt::Debug for GraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphClient").field("base_url", &self.base_url).finish_non_exhaustive()
    }
}
