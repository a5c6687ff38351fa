use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use super::query::LookupQuery;
use super::records::{normalize_response, LookupOutcome};

/// Port onto the Secretary of State voter registry.
#[async_trait]
pub trait VoterLookup: Send + Sync {
    async fn lookup(&self, query: &LookupQuery) -> Result<LookupOutcome, LookupError>;
}

#[derive(Debug, thiserror::Error)]
pub enum LookupError {
    #[error("lookup requires {0}")]
    MissingField(&'static str),
    #[error("registry lookup is not configured")]
    Unconfigured,
    #[error("registry transport failed: {0}")]
    Transport(String),
    #[error("registry answered with status {0}")]
    Status(u16),
    #[error("registry response could not be decoded: {0}")]
    Decode(String),
}

impl LookupError {
    /// Short code persisted as the registrant's `sos_failure`.
    pub fn failure_reason(&self) -> String {
        match self {
            LookupError::MissingField(field) => format!("missing_{field}"),
            LookupError::Unconfigured => "unconfigured".to_string(),
            LookupError::Transport(_) => "transport".to_string(),
            LookupError::Status(code) => format!("http_{code}"),
            LookupError::Decode(_) => "decode".to_string(),
        }
    }
}

/// `reqwest`-backed registry client posting the query as JSON.
#[derive(Debug, Clone)]
pub struct HttpVoterLookup {
    client: reqwest::Client,
    url: String,
}

impl HttpVoterLookup {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, LookupError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| LookupError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl VoterLookup for HttpVoterLookup {
    async fn lookup(&self, query: &LookupQuery) -> Result<LookupOutcome, LookupError> {
        query.validate()?;

        let response = self
            .client
            .post(&self.url)
            .json(query)
            .send()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND || status == reqwest::StatusCode::NO_CONTENT {
            debug!(status = status.as_u16(), "registry reported no match");
            return Ok(LookupOutcome::NoMatch);
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), "registry lookup rejected");
            return Err(LookupError::Status(status.as_u16()));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|err| LookupError::Transport(err.to_string()))?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(LookupOutcome::NoMatch);
        }

        let body: Value =
            serde_json::from_slice(&bytes).map_err(|err| LookupError::Decode(err.to_string()))?;
        Ok(normalize_response(body))
    }
}

/// Stand-in used when no registry URL is configured; every lookup fails softly.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredLookup;

#[async_trait]
impl VoterLookup for UnconfiguredLookup {
    async fn lookup(&self, query: &LookupQuery) -> Result<LookupOutcome, LookupError> {
        query.validate()?;
        Err(LookupError::Unconfigured)
    }
}
