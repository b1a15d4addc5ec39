use std::env;
use std::fs;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use switchboard_core::config::{resolve_config_path, AppConfig, LoadOptions};
use toml::Value;

struct Field {
    key: &'static str,
    env_keys: &'static [&'static str],
    value: String,
}

impl Field {
    fn new(key: &'static str, env_keys: &'static [&'static str], value: impl Into<String>) -> Self {
        Self { key, env_keys, value: value.into() }
    }
}

pub fn run(options: LoadOptions) -> String {
    let config_file_path = resolve_config_path(options.config_path.as_deref());
    let config = match AppConfig::load(options) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = Sources { doc: config_file_doc.as_ref(), path: config_file_path.as_deref() };

    let mut lines = vec!["effective config (source precedence: flag > env > file > default):".to_string()];
    lines.extend(fields(&config).iter().map(|field| {
        format!("- {} = {} (source: {})", field.key, field.value, source.of(field))
    }));
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let optional = |value: Option<&str>| value.unwrap_or("<unset>").to_string();

    vec![
        Field::new("llm.provider", &["SWITCHBOARD_LLM_PROVIDER"], config.llm.provider.as_str()),
        Field::new("llm.model", &["SWITCHBOARD_LLM_MODEL"], config.llm.model.as_str()),
        Field::new(
            "llm.base_url",
            &["SWITCHBOARD_LLM_BASE_URL"],
            optional(config.llm.resolved_base_url()),
        ),
        Field::new("llm.api_key", &["SWITCHBOARD_LLM_API_KEY"], redact(config.llm.api_key.as_ref())),
        Field::new("llm.api_version", &["SWITCHBOARD_LLM_API_VERSION"], config.llm.api_version.as_str()),
        Field::new(
            "llm.timeout_secs",
            &["SWITCHBOARD_LLM_TIMEOUT_SECS"],
            config.llm.timeout_secs.to_string(),
        ),
        Field::new(
            "sampling.temperature",
            &["SWITCHBOARD_SAMPLING_TEMPERATURE"],
            config.sampling.temperature.to_string(),
        ),
        Field::new(
            "sampling.max_tokens",
            &["SWITCHBOARD_SAMPLING_MAX_TOKENS"],
            config.sampling.max_tokens.to_string(),
        ),
        Field::new(
            "sampling.frequency_penalty",
            &["SWITCHBOARD_SAMPLING_FREQUENCY_PENALTY"],
            config.sampling.frequency_penalty.to_string(),
        ),
        Field::new(
            "sampling.presence_penalty",
            &["SWITCHBOARD_SAMPLING_PRESENCE_PENALTY"],
            config.sampling.presence_penalty.to_string(),
        ),
        Field::new(
            "session.system_prompt_path",
            &["SWITCHBOARD_SESSION_SYSTEM_PROMPT_PATH"],
            config
                .session
                .system_prompt_path
                .as_ref()
                .map_or_else(|| "<default>".to_string(), |path| path.display().to_string()),
        ),
        Field::new(
            "session.max_function_calls_per_turn",
            &["SWITCHBOARD_SESSION_MAX_FUNCTION_CALLS_PER_TURN"],
            config.session.max_function_calls_per_turn.to_string(),
        ),
        Field::new(
            "records.base_url",
            &["SWITCHBOARD_RECORDS_BASE_URL"],
            optional(config.records.base_url.as_deref()),
        ),
        Field::new("records.token", &["SWITCHBOARD_RECORDS_TOKEN"], redact(config.records.token.as_ref())),
        Field::new(
            "records.entity_types",
            &["SWITCHBOARD_RECORDS_ENTITY_TYPES"],
            config.records.entity_types.join(","),
        ),
        Field::new("graph.base_url", &["SWITCHBOARD_GRAPH_BASE_URL"], config.graph.base_url.as_str()),
        Field::new("graph.token", &["SWITCHBOARD_GRAPH_TOKEN"], redact(config.graph.token.as_ref())),
        Field::new(
            "logging.level",
            &["SWITCHBOARD_LOGGING_LEVEL", "SWITCHBOARD_LOG_LEVEL"],
            config.logging.level.as_str(),
        ),
        Field::new(
            "logging.format",
            &["SWITCHBOARD_LOGGING_FORMAT", "SWITCHBOARD_LOG_FORMAT"],
            config.logging.format.as_str(),
        ),
    ]
}

struct Sources<'a> {
    doc: Option<&'a Value>,
    path: Option<&'a Path>,
}

impl Sources<'_> {
    fn of(&self, field: &Field) -> String {
        if let Some(env_key) = field.env_keys.iter().find(|key| env::var_os(key).is_some()) {
            return format!("env ({env_key})");
        }

        if self.doc.is_some_and(|doc| contains_path(doc, field.key)) {
            let file_path = self
                .path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }

        "default".to_string()
    }
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret.map(|secret| secret.expose_secret().trim()) {
        None => "<unset>".to_string(),
        Some("") => "<empty>".to_string(),
        Some(value) => match value.split_once('-') {
            Some((prefix, _)) if prefix.len() <= 4 => format!("{prefix}-***"),
            _ => "<redacted>".to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use secrecy::SecretString;

    use super::{contains_path, redact};

    #[test]
    fn redaction_keeps_only_short_prefixes() {
        let key = SecretString::from("sk-live-abcdef".to_string());
        let opaque = SecretString::from("eyJ0eXAiOiJKV1Qi".to_string());

        assert_eq!(redact(Some(&key)), "sk-***");
        assert_eq!(redact(Some(&opaque)), "<redacted>");
        assert_eq!(redact(None), "<unset>");
    }

    #[test]
    fn dotted_paths_resolve_into_tables() {
        let doc: toml::Value = "[llm]\nmodel = \"gpt-4o\"\n".parse().expect("toml");

        assert!(contains_path(&doc, "llm.model"));
        assert!(!contains_path(&doc, "llm.base_url"));
        assert!(!contains_path(&doc, "graph.token"));
    }
}
