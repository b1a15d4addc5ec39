use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use switchboard_core::config::{LlmConfig, LlmProvider, SamplingConfig};
use switchboard_core::{FunctionSchema, Message};
use tracing::debug;

use crate::llm::{ChatRequest, CompletionClient, CompletionError};

#[derive(Clone)]
enum Auth {
    Bearer(SecretString),
    ApiKeyHeader(SecretString),
    None,
}

/// Chat-completions client for OpenAI, Azure OpenAI deployments and
/// OpenAI-compatible local servers such as Ollama.
#[derive(Clone)]
pub struct OpenAiChatClient {
    http: Client,
    endpoint: String,
    model: Option<String>,
    auth: Auth,
    sampling: SamplingConfig,
}

impl OpenAiChatClient {
    pub fn from_config(config: &LlmConfig, sampling: SamplingConfig) -> Result<Self, CompletionError> {
        let base_url = config
            .resolved_base_url()
            .ok_or_else(|| CompletionError::Configuration("llm.base_url is required".to_string()))?
            .trim_end_matches('/');

        let (endpoint, model, auth) = match config.provider {
            LlmProvider::AzureOpenAi => (
                format!(
                    "{base_url}/openai/deployments/{}/chat/completions?api-version={}",
                    config.model, config.api_version
                ),
                None,
                Auth::ApiKeyHeader(required_key(config)?),
            ),
            LlmProvider::OpenAi => (
                format!("{base_url}/chat/completions"),
                Some(config.model.clone()),
                Auth::Bearer(required_key(config)?),
            ),
            LlmProvider::Ollama => (
                format!("{base_url}/chat/completions"),
                Some(config.model.clone()),
                config.api_key.clone().map_or(Auth::None, Auth::Bearer),
            ),
        };

        let http = Client::builder().timeout(Duration::from_secs(config.timeout_secs)).build()?;

        Ok(Self { http, endpoint, model, auth, sampling })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

fn required_key(config: &LlmConfig) -> Result<SecretString, CompletionError> {
    config.api_key.clone().ok_or_else(|| {
        CompletionError::Configuration(format!(
            "llm.api_key is required for provider `{}`",
            config.provider.as_str()
        ))
    })
}

#[derive(Serialize)]
struct WireRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "no_functions")]
    functions: &'a [FunctionSchema],
    #[serde(skip_serializing_if = "Option::is_none")]
    function_call: Option<ForcedCall<'a>>,
    temperature: f32,
    max_tokens: u32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

fn no_functions(functions: &&[FunctionSchema]) -> bool {
    functions.is_empty()
}

#[derive(Serialize)]
struct ForcedCall<'a> {
    name: &'a str,
}

#[derive(Deserialize)]
struct WireResponse {
    #[serde(default)]
    choices: Vec<WireChoice>,
}

#[derive(Deserialize)]
struct WireChoice {
    message: Message,
}

#[async_trait]
impl CompletionClient for OpenAiChatClient {
    async fn complete(&self, request: ChatRequest<'_>) -> Result<Message, CompletionError> {
        let body = WireRequest {
            model: self.model.as_deref(),
            messages: request.messages,
            functions: request.functions,
            function_call: request.force_function.map(|name| ForcedCall { name }),
            temperature: self.sampling.temperature,
            max_tokens: self.sampling.max_tokens,
            frequency_penalty: self.sampling.frequency_penalty,
            presence_penalty: self.sampling.presence_penalty,
        };

        debug!(
            event_name = "llm.request",
            messages = request.messages.len(),
            functions = request.functions.len(),
            forced = request.force_function.unwrap_or_default(),
            "sending chat completion request"
        );

        let builder = self.http.post(&self.endpoint).json(&body);
        let builder = match &self.auth {
            Auth::Bearer(key) => builder.bearer_auth(key.expose_secret()),
            Auth::ApiKeyHeader(key) => builder.header("api-key", key.expose_secret()),
            Auth::None => builder,
        };

        let response = builder.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Status { status: status.as_u16(), body });
        }

        let text = response.text().await?;
        let parsed: WireResponse = serde_json::from_str(&text)
            .map_err(|error| CompletionError::MalformedResponse(error.to_string()))?;
        let message =
            parsed.choices.into_iter().next().map(|choice| choice.message).ok_or(CompletionError::NoChoices)?;

        debug!(
            event_name = "llm.response",
            function_call = message.function_call.as_ref().map(|call| call.name.as_str()).unwrap_or_default(),
            content_bytes = message.content.as_deref().map_or(0, str::len),
            "received chat completion"
        );

        Ok(message)
    }
}

impl std::fmt::Debug for OpenAiChatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiChatClient")
            .field("endpoint", &self.endpoint)
            .field("model", &self.model)
            .field("sampling", &self.sampling)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;
    use serde_json::{json, Value};
    use switchboard_core::config::{LlmConfig, LlmProvider, SamplingConfig};
    use switchboard_core::{FunctionSchema, Message, ParamType, Role};
    use wiremock::matchers::{header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use crate::llm::{CompletionClient, CompletionError};

    use super::OpenAiChatClient;

    fn llm_config(provider: LlmProvider, base_url: &str) -> LlmConfig {
        LlmConfig {
            provider,
            api_key: Some(SecretString::from("sk-test".to_string())),
            base_url: Some(base_url.to_string()),
            model: "gpt-test".to_string(),
            ..LlmConfig::default()
        }
    }

    fn lookup_schema() -> FunctionSchema {
        FunctionSchema::builder("lookup")
            .parameter("id", ParamType::String, "record id", true)
            .build()
            .expect("schema")
    }

    #[tokio::test]
    async fn posts_history_functions_and_sampling() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .and(header("authorization", "Bearer sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "index": 0,
                    "finish_reason": "function_call",
                    "message": {
                        "role": "assistant",
                        "content": null,
                        "function_call": {"name": "lookup", "arguments": "{\"id\":\"7\"}"}
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiChatClient::from_config(
            &llm_config(LlmProvider::OpenAi, &format!("{}/v1", server.uri())),
            SamplingConfig::default(),
        )
        .expect("client");
        let history = vec![Message::system("sys"), Message::user("find 7")];

        let message = client.next_message(&history, &[lookup_schema()]).await.expect("completion");

        assert_eq!(message.role, Role::Assistant);
        let call = message.function_call.expect("function call");
        assert_eq!(call.name, "lookup");
        assert_eq!(call.arguments, "{\"id\":\"7\"}");

        let requests = server.received_requests().await.expect("recorded requests");
        let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
        assert_eq!(body["model"], json!("gpt-test"));
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "find 7"}));
        assert_eq!(body["functions"][0]["name"], json!("lookup"));
        assert_eq!(body["max_tokens"], json!(800));
        assert!(body.get("function_call").is_none());
    }

    #[tokio::test]
    async fn azure_uses_deployment_path_and_api_key_header() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/openai/deployments/gpt-test/chat/completions"))
            .and(query_param("api-version", "2023-07-01-preview"))
            .and(header("api-key", "sk-test"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {"role": "assistant", "content": "hello"}}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = OpenAiChatClient::from_config(
            &llm_config(LlmProvider::AzureOpenAi, &server.uri()),
            SamplingConfig::default(),
        )
        .expect("client");

        let text = client.complete_text("hi", None).await.expect("completion");

        assert_eq!(text, "hello");
        let requests = server.received_requests().await.expect("recorded requests");
        let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
        assert!(body.get("model").is_none());
        assert!(body.get("functions").is_none());
    }

    #[tokio::test]
    async fn forced_function_is_sent_by_name() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{"message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": {"name": "lookup", "arguments": "{\"id\":\"1\"}"}
                }}]
            })))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::from_config(
            &llm_config(LlmProvider::Ollama, &server.uri()),
            SamplingConfig::default(),
        )
        .expect("client");

        let arguments =
            client.extract_arguments(&lookup_schema(), "record one", None).await.expect("arguments");

        assert_eq!(arguments, "{\"id\":\"1\"}");
        let requests = server.received_requests().await.expect("recorded requests");
        let body: Value = serde_json::from_slice(&requests[0].body).expect("json body");
        assert_eq!(body["function_call"], json!({"name": "lookup"}));
    }

    #[tokio::test]
    async fn non_success_status_is_reported_with_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::from_config(
            &llm_config(LlmProvider::OpenAi, &server.uri()),
            SamplingConfig::default(),
        )
        .expect("client");

        let error = client.complete_text("hi", None).await.expect_err("429");

        assert!(
            matches!(error, CompletionError::Status { status: 429, ref body } if body == "slow down")
        );
    }

    #[tokio::test]
    async fn empty_choices_and_garbage_bodies_are_errors() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
            .up_to_n_times(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
            .mount(&server)
            .await;

        let client = OpenAiChatClient::from_config(
            &llm_config(LlmProvider::OpenAi, &server.uri()),
            SamplingConfig::default(),
        )
        .expect("client");

        let first = client.complete_text("hi", None).await.expect_err("no choices");
        let second = client.complete_text("hi", None).await.expect_err("not json");

        assert!(matches!(first, CompletionError::NoChoices));
        assert!(matches!(second, CompletionError::MalformedResponse(_)));
    }

    #[test]
    fn openai_requires_api_key() {
        let config = LlmConfig {
            provider: LlmProvider::OpenAi,
            api_key: None,
            ..LlmConfig::default()
        };

        let error = OpenAiChatClient::from_config(&config, SamplingConfig::default())
            .expect_err("missing key");

        assert!(matches!(error, CompletionError::Configuration(_)));
    }
}
