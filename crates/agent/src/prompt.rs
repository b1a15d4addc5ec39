use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

pub const DEFAULT_SYSTEM_PROMPT_FILE: &str = "systemprompt.txt";
pub const TIMESTAMP_PLACEHOLDER: &str = "{{timestamp}}";

const BUILTIN_SYSTEM_PROMPT: &str = "You are a helpful assistant for field service staff. \
The current time is {{timestamp}}. \
Use the available functions to look up records and email before answering, \
and say so plainly when a lookup returns nothing.";

#[derive(Debug, Error)]
pub enum PromptError {
    #[error("failed to read system prompt `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("system prompt `{0}` is empty")]
    Empty(PathBuf),
}

/// Loads the session preamble. An explicit `path` must exist; otherwise
/// `systemprompt.txt` in the working directory is used when present, falling
/// back to a built-in preamble.
pub fn load_system_prompt(path: Option<&Path>, now: DateTime<Utc>) -> Result<String, PromptError> {
    let template = match path {
        Some(path) => read_prompt(path)?,
        None => {
            let default_path = Path::new(DEFAULT_SYSTEM_PROMPT_FILE);
            if default_path.is_file() {
                read_prompt(default_path)?
            } else {
                BUILTIN_SYSTEM_PROMPT.to_string()
            }
        }
    };

    Ok(render_system_prompt(&template, now))
}

pub fn render_system_prompt(template: &str, now: DateTime<Utc>) -> String {
    template
        .trim()
        .replace(TIMESTAMP_PLACEHOLDER, &now.to_rfc3339_opts(SecondsFormat::Secs, true))
}

fn read_prompt(path: &Path) -> Result<String, PromptError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|source| PromptError::Read { path: path.to_path_buf(), source })?;
    if raw.trim().is_empty() {
        return Err(PromptError::Empty(path.to_path_buf()));
    }
    Ok(raw)
}
