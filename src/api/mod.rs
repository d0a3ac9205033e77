// Command Handlers
// Caller-facing entry points for the presentation layer. Blank input is rejected
// here, transient failures are retried with the configured policy, and failures
// are returned as a serializable CommandError the UI can branch on.

use crate::models::{ErrorKind, PipelineError};
use crate::services::authenticity::{retry_transient, AuthenticityService, RetryPolicy};
use crate::services::config_store::{app_config, ConfigError};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, OnceLock};
use tracing::{error, info};

static SERVICE: OnceLock<Arc<AuthenticityService>> = OnceLock::new();

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandError {
    pub kind: ErrorKind,
    pub message: String,
    pub retryable: bool,
}

impl From<PipelineError> for CommandError {
    fn from(err: PipelineError) -> Self {
        Self {
            kind: err.kind,
            retryable: err.is_transient(),
            message: err.detail,
        }
    }
}

/// Configuration faults are permanent; retrying cannot fix them.
impl From<ConfigError> for CommandError {
    fn from(err: ConfigError) -> Self {
        Self {
            kind: ErrorKind::TransportFailure,
            message: format!("model endpoint is not configured: {}", err),
            retryable: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectResponse {
    pub ai_detection_score: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizeResponse {
    pub original_text: String,
    pub humanized_text: String,
    pub is_rewritten: bool,
}

fn service() -> Result<Arc<AuthenticityService>, CommandError> {
    if let Some(svc) = SERVICE.get() {
        return Ok(svc.clone());
    }
    let built = AuthenticityService::from_settings(&app_config().model).map_err(|e| {
        error!(error = %e, "api.service_init_failed");
        CommandError::from(e)
    })?;
    info!(adapter = %built.adapter_name(), "api.service_ready");
    Ok(SERVICE.get_or_init(|| Arc::new(built)).clone())
}

fn require_text(text: &str) -> Result<(), CommandError> {
    if text.trim().is_empty() {
        return Err(PipelineError::invalid_input("text is empty").into());
    }
    Ok(())
}

pub async fn detect_text(text: String) -> Result<DetectResponse, CommandError> {
    let svc = service()?;
    detect_text_with(&svc, &text, &app_config().retry).await
}

pub async fn humanize_text(text: String) -> Result<HumanizeResponse, CommandError> {
    let svc = service()?;
    humanize_text_with(&svc, &text, &app_config().retry).await
}

pub async fn detect_text_with(
    svc: &AuthenticityService,
    text: &str,
    policy: &RetryPolicy,
) -> Result<DetectResponse, CommandError> {
    require_text(text)?;
    let score = retry_transient(policy, || svc.detect(text)).await?;
    Ok(DetectResponse {
        ai_detection_score: score.value(),
    })
}

pub async fn humanize_text_with(
    svc: &AuthenticityService,
    text: &str,
    policy: &RetryPolicy,
) -> Result<HumanizeResponse, CommandError> {
    require_text(text)?;
    let result = retry_transient(policy, || svc.humanize(text)).await?;
    Ok(HumanizeResponse {
        original_text: text.to_string(),
        humanized_text: result.humanized_text,
        is_rewritten: result.is_rewritten,
    })
}
