use thiserror::Error;

/// Failure talking to a record or mail back-end. Capabilities turn these into
/// failure envelopes; they never reach the conversation loop.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Decode(String),
}

pub(crate) async fn read_json(response: reqwest::Response) -> Result<serde_json::Value, BackendError> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(BackendError::Status { status: status.as_u16(), body });
    }
    serde_json::from_str(&body).map_err(|error| BackendError::Decode(error.to_string()))
}
