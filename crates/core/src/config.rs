use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub llm: LlmConfig,
    pub sampling: SamplingConfig,
    pub session: SessionConfig,
    pub records: RecordsConfig,
    pub graph: GraphConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub api_version: String,
    pub timeout_secs: u64,
}

/// Knobs forwarded verbatim to the completion endpoint.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingConfig {
    pub temperature: f32,
    pub max_tokens: u32,
    pub frequency_penalty: f32,
    pub presence_penalty: f32,
}

#[derive(Clone, Debug)]
pub struct SessionConfig {
    pub system_prompt_path: Option<PathBuf>,
    /// `0` disables the limit.
    pub max_function_calls_per_turn: u32,
}

#[derive(Clone, Debug)]
pub struct RecordsConfig {
    pub base_url: Option<String>,
    pub token: Option<SecretString>,
    pub entity_types: Vec<String>,
}

#[derive(Clone, Debug)]
pub struct GraphConfig {
    pub base_url: String,
    pub token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai", alias = "open_ai")]
    OpenAi,
    #[serde(rename = "azure_openai", alias = "azure")]
    AzureOpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_api_key: Option<String>,
    pub system_prompt_path: Option<PathBuf>,
    pub max_function_calls_per_turn: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

pub const DEFAULT_CONFIG_FILES: [&str; 2] = ["switchboard.toml", "config/switchboard.toml"];

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            llm: LlmConfig::default(),
            sampling: SamplingConfig::default(),
            session: SessionConfig { system_prompt_path: None, max_function_calls_per_turn: 10 },
            records: RecordsConfig {
                base_url: None,
                token: None,
                entity_types: vec!["msdyn_workorders".to_string(), "msdyn_bookings".to_string()],
            },
            graph: GraphConfig { base_url: "https://graph.microsoft.com".to_string(), token: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Ollama,
            api_key: None,
            base_url: None,
            model: "llama3.1".to_string(),
            api_version: "2023-07-01-preview".to_string(),
            timeout_secs: 60,
        }
    }
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self { temperature: 0.7, max_tokens: 800, frequency_penalty: 0.0, presence_penalty: 0.0 }
    }
}

impl LlmConfig {
    /// Configured base URL, or the provider's well-known default.
    pub fn resolved_base_url(&self) -> Option<&str> {
        match (&self.base_url, self.provider) {
            (Some(base_url), _) => Some(base_url.as_str()),
            (None, LlmProvider::OpenAi) => Some("https://api.openai.com/v1"),
            (None, LlmProvider::Ollama) => Some("http://localhost:11434/v1"),
            (None, LlmProvider::AzureOpenAi) => None,
        }
    }
}

impl SessionConfig {
    pub fn max_function_calls(&self) -> Option<u32> {
        (self.max_function_calls_per_turn > 0).then_some(self.max_function_calls_per_turn)
    }
}

impl RecordsConfig {
    pub fn is_enabled(&self) -> bool {
        self.base_url.is_some()
    }
}

impl GraphConfig {
    pub fn is_enabled(&self) -> bool {
        self.token.is_some()
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::AzureOpenAi => "azure_openai",
            Self::Ollama => "ollama",
        }
    }
}

impl LogFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Pretty => "pretty",
            Self::Json => "json",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "azure" | "azure_openai" | "azure_open_ai" => Ok(Self::AzureOpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|azure_openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected =
                options.config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILES[0]));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(api_version) = llm.api_version {
                self.llm.api_version = api_version;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(sampling) = patch.sampling {
            if let Some(temperature) = sampling.temperature {
                self.sampling.temperature = temperature;
            }
            if let Some(max_tokens) = sampling.max_tokens {
                self.sampling.max_tokens = max_tokens;
            }
            if let Some(frequency_penalty) = sampling.frequency_penalty {
                self.sampling.frequency_penalty = frequency_penalty;
            }
            if let Some(presence_penalty) = sampling.presence_penalty {
                self.sampling.presence_penalty = presence_penalty;
            }
        }

        if let Some(session) = patch.session {
            if let Some(system_prompt_path) = session.system_prompt_path {
                self.session.system_prompt_path = Some(system_prompt_path);
            }
            if let Some(max_calls) = session.max_function_calls_per_turn {
                self.session.max_function_calls_per_turn = max_calls;
            }
        }

        if let Some(records) = patch.records {
            if let Some(base_url) = records.base_url {
                self.records.base_url = Some(base_url);
            }
            if let Some(records_token_value) = records.token {
                self.records.token = Some(secret_value(records_token_value));
            }
            if let Some(entity_types) = records.entity_types {
                self.records.entity_types = entity_types;
            }
        }

        if let Some(graph) = patch.graph {
            if let Some(base_url) = graph.base_url {
                self.graph.base_url = base_url;
            }
            if let Some(graph_token_value) = graph.token {
                self.graph.token = Some(secret_value(graph_token_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("SWITCHBOARD_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_API_VERSION") {
            self.llm.api_version = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("SWITCHBOARD_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_SAMPLING_TEMPERATURE") {
            self.sampling.temperature = parse_f32("SWITCHBOARD_SAMPLING_TEMPERATURE", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_SAMPLING_MAX_TOKENS") {
            self.sampling.max_tokens = parse_u32("SWITCHBOARD_SAMPLING_MAX_TOKENS", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_SAMPLING_FREQUENCY_PENALTY") {
            self.sampling.frequency_penalty =
                parse_f32("SWITCHBOARD_SAMPLING_FREQUENCY_PENALTY", &value)?;
        }
        if let Some(value) = read_env("SWITCHBOARD_SAMPLING_PRESENCE_PENALTY") {
            self.sampling.presence_penalty =
                parse_f32("SWITCHBOARD_SAMPLING_PRESENCE_PENALTY", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_SESSION_SYSTEM_PROMPT_PATH") {
            self.session.system_prompt_path = Some(PathBuf::from(value));
        }
        if let Some(value) = read_env("SWITCHBOARD_SESSION_MAX_FUNCTION_CALLS_PER_TURN") {
            self.session.max_function_calls_per_turn =
                parse_u32("SWITCHBOARD_SESSION_MAX_FUNCTION_CALLS_PER_TURN", &value)?;
        }

        if let Some(value) = read_env("SWITCHBOARD_RECORDS_BASE_URL") {
            self.records.base_url = Some(value);
        }
        if let Some(value) = read_env("SWITCHBOARD_RECORDS_TOKEN") {
            self.records.token = Some(secret_value(value));
        }
        if let Some(value) = read_env("SWITCHBOARD_RECORDS_ENTITY_TYPES") {
            self.records.entity_types = value
                .split(',')
                .map(str::trim)
                .filter(|entry| !entry.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env("SWITCHBOARD_GRAPH_BASE_URL") {
            self.graph.base_url = value;
        }
        if let Some(value) = read_env("SWITCHBOARD_GRAPH_TOKEN") {
            self.graph.token = Some(secret_value(value));
        }

        let log_level =
            read_env("SWITCHBOARD_LOGGING_LEVEL").or_else(|| read_env("SWITCHBOARD_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("SWITCHBOARD_LOGGING_FORMAT").or_else(|| read_env("SWITCHBOARD_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(llm_base_url) = overrides.llm_base_url {
            self.llm.base_url = Some(llm_base_url);
        }
        if let Some(llm_api_key) = overrides.llm_api_key {
            self.llm.api_key = Some(secret_value(llm_api_key));
        }
        if let Some(system_prompt_path) = overrides.system_prompt_path {
            self.session.system_prompt_path = Some(system_prompt_path);
        }
        if let Some(max_calls) = overrides.max_function_calls_per_turn {
            self.session.max_function_calls_per_turn = max_calls;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_llm(&self.llm)?;
        validate_sampling(&self.sampling)?;
        validate_records(&self.records)?;
        validate_graph(&self.graph)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

pub fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    DEFAULT_CONFIG_FILES.into_iter().map(PathBuf::from).find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 600 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=600".to_string(),
        ));
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    if let Some(base_url) = &llm.base_url {
        if !is_http_url(base_url) {
            return Err(ConfigError::Validation(
                "llm.base_url must start with http:// or https://".to_string(),
            ));
        }
    }

    let missing_key =
        llm.api_key.as_ref().map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true);
    let missing_base_url =
        llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);

    match llm.provider {
        LlmProvider::OpenAi => {
            if missing_key {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::AzureOpenAi => {
            if missing_key || missing_base_url {
                return Err(ConfigError::Validation(
                    "llm.api_key and llm.base_url are required for the azure_openai provider"
                        .to_string(),
                ));
            }
            if llm.api_version.trim().is_empty() {
                return Err(ConfigError::Validation(
                    "llm.api_version is required for the azure_openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {}
    }

    Ok(())
}

fn validate_sampling(sampling: &SamplingConfig) -> Result<(), ConfigError> {
    if !(0.0..=2.0).contains(&sampling.temperature) {
        return Err(ConfigError::Validation(
            "sampling.temperature must be in range 0.0..=2.0".to_string(),
        ));
    }
    if sampling.max_tokens == 0 {
        return Err(ConfigError::Validation(
            "sampling.max_tokens must be greater than zero".to_string(),
        ));
    }
    for (key, value) in [
        ("sampling.frequency_penalty", sampling.frequency_penalty),
        ("sampling.presence_penalty", sampling.presence_penalty),
    ] {
        if !(-2.0..=2.0).contains(&value) {
            return Err(ConfigError::Validation(format!("{key} must be in range -2.0..=2.0")));
        }
    }
    Ok(())
}

fn validate_records(records: &RecordsConfig) -> Result<(), ConfigError> {
    let Some(base_url) = &records.base_url else {
        return Ok(());
    };

    if !is_http_url(base_url) {
        return Err(ConfigError::Validation(
            "records.base_url must start with http:// or https://".to_string(),
        ));
    }
    if records.entity_types.is_empty() {
        return Err(ConfigError::Validation(
            "records.entity_types must list at least one entity set when records.base_url is set"
                .to_string(),
        ));
    }

    Ok(())
}

fn validate_graph(graph: &GraphConfig) -> Result<(), ConfigError> {
    if !is_http_url(&graph.base_url) {
        return Err(ConfigError::Validation(
            "graph.base_url must start with http:// or https://".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f32(key: &str, value: &str) -> Result<f32, ConfigError> {
    value.parse::<f32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    llm: Option<LlmPatch>,
    sampling: Option<SamplingPatch>,
    session: Option<SessionPatch>,
    records: Option<RecordsPatch>,
    graph: Option<GraphPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    api_version: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct SamplingPatch {
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    frequency_penalty: Option<f32>,
    presence_penalty: Option<f32>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionPatch {
    system_prompt_path: Option<PathBuf>,
    max_function_calls_per_turn: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct RecordsPatch {
    base_url: Option<String>,
    token: Option<String>,
    entity_types: Option<Vec<String>>,
}

#[derive(Debug, Default, Deserialize)]
struct GraphPatch {
    base_url: Option<String>,
    token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
