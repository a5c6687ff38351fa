use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::header::CONTENT_TYPE;
use tracing::{debug, warn};

use super::payload::FormPayload;

/// Base URL that switches the filler into canned-image mode.
pub const TESTING_URL: &str = "TESTING";

const MAX_ATTEMPTS: u32 = 3;

/// Small transparent PNG returned in canned mode.
pub const SIGNATURE_IMG_STRING: &str = "data:image/png;base64,iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAQAAAC1HAwCAAAAC0lEQVR42mNkYAAAAAYAAjCB0C8AAAAASUVORK5CYII=";

/// Port onto the external service that renders filled government forms.
#[async_trait]
pub trait FormFiller: Send + Sync {
    /// Render `form_name` (e.g. `/vr/en`) and return the image as a data URL.
    async fn fill(&self, form_name: &str, payload: &FormPayload) -> Result<String, FormFillerError>;
}

#[derive(Debug, thiserror::Error)]
pub enum FormFillerError {
    #[error("form filler is not configured")]
    Unconfigured,
    #[error("form filler client could not be built: {0}")]
    Client(String),
    #[error("form filler rejected the request with status {0}")]
    Rejected(u16),
    #[error("form filler returned an empty document")]
    EmptyBody,
    #[error("form filler unavailable after {attempts} attempts: {last}")]
    AttemptsExhausted { attempts: u32, last: String },
    #[error("filled forms could not be stored: {0}")]
    Encode(#[from] serde_json::Error),
}

/// `reqwest`-backed filler posting payloads to `{base_url}{form_name}`.
#[derive(Debug, Clone)]
pub struct HttpFormFiller {
    client: reqwest::Client,
    base_url: String,
}

impl HttpFormFiller {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, FormFillerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| FormFillerError::Client(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn attempt(&self, url: &str, payload: &FormPayload) -> Result<String, AttemptError> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|err| AttemptError::Retryable(err.to_string()))?;

        let status = response.status();
        if status.is_server_error() {
            return Err(AttemptError::Retryable(format!("status {}", status.as_u16())));
        }
        if !status.is_success() {
            return Err(AttemptError::Fatal(FormFillerError::Rejected(status.as_u16())));
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<mime::Mime>().ok());

        let bytes = response
            .bytes()
            .await
            .map_err(|err| AttemptError::Retryable(err.to_string()))?;
        if bytes.is_empty() {
            return Err(AttemptError::Fatal(FormFillerError::EmptyBody));
        }

        match content_type {
            Some(content) if content.type_() == mime::IMAGE => Ok(format!(
                "data:{}/{};base64,{}",
                content.type_(),
                content.subtype(),
                STANDARD.encode(&bytes)
            )),
            _ => {
                let text = String::from_utf8_lossy(&bytes).trim().to_string();
                if text.is_empty() {
                    Err(AttemptError::Fatal(FormFillerError::EmptyBody))
                } else {
                    Ok(text)
                }
            }
        }
    }
}

enum AttemptError {
    Retryable(String),
    Fatal(FormFillerError),
}

#[async_trait]
impl FormFiller for HttpFormFiller {
    async fn fill(&self, form_name: &str, payload: &FormPayload) -> Result<String, FormFillerError> {
        let url = format!("{}{}", self.base_url, form_name);
        let mut last = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            match self.attempt(&url, payload).await {
                Ok(image) => {
                    debug!(form = form_name, attempt, "form filler responded");
                    return Ok(image);
                }
                Err(AttemptError::Fatal(err)) => return Err(err),
                Err(AttemptError::Retryable(reason)) => {
                    warn!(form = form_name, attempt, %reason, "form filler attempt failed");
                    last = reason;
                }
            }
        }

        Err(FormFillerError::AttemptsExhausted {
            attempts: MAX_ATTEMPTS,
            last,
        })
    }
}

/// Canned filler used when the base URL is the `TESTING` marker.
#[derive(Debug, Clone, Copy, Default)]
pub struct CannedFormFiller;

#[async_trait]
impl FormFiller for CannedFormFiller {
    async fn fill(&self, _form_name: &str, _payload: &FormPayload) -> Result<String, FormFillerError> {
        Ok(SIGNATURE_IMG_STRING.to_string())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredFormFiller;

#[async_trait]
impl FormFiller for UnconfiguredFormFiller {
    async fn fill(&self, _form_name: &str, _payload: &FormPayload) -> Result<String, FormFillerError> {
        Err(FormFillerError::Unconfigured)
    }
}

/// Pick the filler for a configured base URL.
pub fn filler_for_url(
    base_url: Option<&str>,
    timeout: Duration,
) -> Result<Arc<dyn FormFiller>, FormFillerError> {
    match base_url.map(str::trim) {
        None | Some("") => Ok(Arc::new(UnconfiguredFormFiller)),
        Some(TESTING_URL) => Ok(Arc::new(CannedFormFiller)),
        Some(url) => Ok(Arc::new(HttpFormFiller::new(url, timeout)?)),
    }
}
