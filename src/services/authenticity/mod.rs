// Authenticity Module
// Detection and humanization pipelines over a shared four-stage skeleton:
// - normalizer: shapes raw caller input into an AnalysisRequest
// - pipeline: one adapter round trip + coercion + fallback settlement
// - coercion: typed extraction from untrusted replies
// - fallback: failure classification and caller-side retry policy
// - decision_gate / detector / humanizer: the concrete pipelines

pub mod coercion;
pub mod decision_gate;
pub mod detector;
pub mod fallback;
pub mod humanizer;
pub mod normalizer;
pub mod pipeline;

#[cfg(test)]
pub(crate) mod testing;

pub use fallback::{classify, retry_transient, FailureClass, RetryPolicy};
pub use normalizer::{normalize_detection_input, normalize_humanization_input};

use crate::models::{AnalysisRequest, DetectionScore, HumanizationResult, PipelineOutcome};
use crate::services::config_store::{ConfigError, ModelSettings};
use crate::services::providers::{get_api_key, HttpModelAdapter, InvocationConfig, ModelAdapter};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info_span, Instrument};

/// Entry points for both pipelines. Holds no per-call state, so one instance
/// can serve any number of concurrent calls. Dropping a returned future
/// cancels its in-flight request.
#[derive(Clone)]
pub struct AuthenticityService {
    adapter: Arc<dyn ModelAdapter>,
    config: InvocationConfig,
}

impl AuthenticityService {
    pub fn new(adapter: Arc<dyn ModelAdapter>, config: InvocationConfig) -> Self {
        Self { adapter, config }
    }

    /// Build an HTTP-backed service from validated model settings.
    pub fn from_settings(settings: &ModelSettings) -> Result<Self, ConfigError> {
        Self::from_settings_with_key(settings, get_api_key(settings.provider))
    }

    /// A missing key is a configuration fault, rejected here rather than on every call.
    pub fn from_settings_with_key(
        settings: &ModelSettings,
        api_key: Option<String>,
    ) -> Result<Self, ConfigError> {
        settings.validate()?;
        let api_key = api_key.ok_or(ConfigError::MissingApiKey(settings.provider.as_str()))?;
        let adapter = HttpModelAdapter::new(
            settings.provider,
            settings.base_url.clone(),
            settings.model.clone(),
            api_key,
            Duration::from_secs(settings.timeout_secs),
        )
        .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        Ok(Self::new(Arc::new(adapter), settings.invocation_config()))
    }

    pub fn adapter_name(&self) -> String {
        self.adapter.describe()
    }

    pub async fn detect(&self, text: &str) -> PipelineOutcome<DetectionScore> {
        self.detect_request(&AnalysisRequest::new(text)).await
    }

    /// Detection from loosely-typed caller input (must be a JSON string).
    pub async fn detect_raw(&self, raw: &Value) -> PipelineOutcome<DetectionScore> {
        let request = normalize_detection_input(raw)?;
        self.detect_request(&request).await
    }

    pub async fn humanize(&self, text: &str) -> PipelineOutcome<HumanizationResult> {
        self.humanize_request(&AnalysisRequest::new(text)).await
    }

    /// Humanization from loosely-typed caller input (must be `{ "text": string }`).
    pub async fn humanize_raw(&self, raw: &Value) -> PipelineOutcome<HumanizationResult> {
        let request = normalize_humanization_input(raw)?;
        self.humanize_request(&request).await
    }

    async fn detect_request(&self, request: &AnalysisRequest) -> PipelineOutcome<DetectionScore> {
        let span = info_span!("detect", request_id = %uuid::Uuid::new_v4());
        detector::detect(self.adapter.as_ref(), &self.config, request)
            .instrument(span)
            .await
    }

    async fn humanize_request(
        &self,
        request: &AnalysisRequest,
    ) -> PipelineOutcome<HumanizationResult> {
        let span = info_span!("humanize", request_id = %uuid::Uuid::new_v4());
        humanizer::humanize(self.adapter.as_ref(), &self.config, request)
            .instrument(span)
            .await
    }
}
