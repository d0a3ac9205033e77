// Model Invocation Adapter
// One structured round trip to a generative-model endpoint (OpenAI-compatible chat or Anthropic messages)

use crate::models::{AnalysisRequest, PipelineError, PipelineOutcome};
use crate::services::prompts::{InstructionTemplate, ReplySchema};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::env;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, warn};

const OPENAI_DEFAULT_URL: &str = "https://api.openai.com/v1/chat/completions";
const ANTHROPIC_DEFAULT_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Substrings in an error body or finish reason that mean the endpoint refused on safety grounds.
const REFUSAL_MARKERS: &[&str] = &["content_filter", "content_policy", "safety", "refusal", "blocked"];

#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("API error: {status} - {message}")]
    ApiError { status: u16, message: String },
    #[error("Request refused by content filter: {0}")]
    Refused(String),
    #[error("JSON parse error: {0}")]
    JsonError(String),
}

impl From<ProviderError> for PipelineError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::HttpError(e) if e.is_timeout() => {
                PipelineError::transport(format!("request timed out: {}", e))
            }
            ProviderError::HttpError(e) => PipelineError::transport(e.to_string()),
            ProviderError::ApiError { status, message } => {
                if is_refusal_text(&message) {
                    PipelineError::refusal(format!("endpoint returned {}: {}", status, message))
                } else {
                    PipelineError::transport(format!("endpoint returned {}: {}", status, message))
                }
            }
            ProviderError::Refused(reason) => PipelineError::refusal(reason),
            ProviderError::JsonError(msg) => PipelineError::malformed(msg),
        }
    }
}

fn is_refusal_text(text: &str) -> bool {
    let lower = text.to_lowercase();
    REFUSAL_MARKERS.iter().any(|m| lower.contains(m))
}

// ============ Invocation Options ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseFormat {
    /// Ask the endpoint for a machine-parseable JSON reply.
    #[default]
    Structured,
    /// Plain text reply; JSON is still requested through the instructions.
    Freeform,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentFilter {
    pub category: String,
    pub threshold: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Any endpoint speaking the OpenAI chat-completions dialect.
    #[default]
    Openai,
    Anthropic,
}

impl ProviderKind {
    pub fn default_url(self) -> &'static str {
        match self {
            ProviderKind::Openai => OPENAI_DEFAULT_URL,
            ProviderKind::Anthropic => ANTHROPIC_DEFAULT_URL,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::Openai => "openai",
            ProviderKind::Anthropic => "anthropic",
        }
    }
}

/// Per-call option bag handed to the adapter. Read-only; built once from configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvocationConfig {
    pub temperature: f64,
    pub max_output_tokens: u32,
    #[serde(default)]
    pub response_format: ResponseFormat,
    #[serde(default)]
    pub content_filters: Vec<ContentFilter>,
}

impl Default for InvocationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.2,
            max_output_tokens: 1024,
            response_format: ResponseFormat::Structured,
            content_filters: Vec::new(),
        }
    }
}

/// Everything the adapter needs for one round trip.
#[derive(Debug, Clone, Copy)]
pub struct ModelInvocation<'a> {
    pub payload: &'a AnalysisRequest,
    pub template: &'a InstructionTemplate,
    pub schema: &'a ReplySchema,
    pub config: &'a InvocationConfig,
}

impl ModelInvocation<'_> {
    pub fn system_prompt(&self) -> String {
        self.template.render_system(self.schema)
    }

    pub fn user_prompt(&self) -> String {
        self.template.render_user(&self.payload.text)
    }
}

// ============ Raw Reply ============

/// Untrusted structured answer from the endpoint. Field types are not checked here.
#[derive(Debug, Clone, PartialEq)]
pub enum RawReply {
    Object(Map<String, Value>),
    /// JSON that is not an object (array, number, string, bool).
    Other(Value),
    /// Empty content or a literal `null`.
    Absent,
}

impl RawReply {
    /// Parse the text content of a reply. Tolerates code fences and prose around one JSON value.
    pub fn from_content(content: &str) -> PipelineOutcome<Self> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(RawReply::Absent);
        }
        if let Ok(value) = serde_json::from_str::<Value>(content) {
            return Ok(Self::from_value(value));
        }
        let value = first_embedded_object(content)
            .ok_or_else(|| PipelineError::malformed("reply is not JSON"))?
            .map_err(|e| PipelineError::malformed(format!("reply JSON parse error: {}", e)))?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Null => RawReply::Absent,
            Value::Object(map) => RawReply::Object(map),
            other => RawReply::Other(other),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        match self {
            RawReply::Object(map) => map.get(field),
            _ => None,
        }
    }
}

/// Read the first JSON object starting at the first `{`, ignoring whatever follows it.
fn first_embedded_object(content: &str) -> Option<Result<Value, serde_json::Error>> {
    let start = content.find('{')?;
    serde_json::Deserializer::from_str(&content[start..])
        .into_iter::<Value>()
        .next()
}

// ============ Adapter Boundary ============

/// The single external collaborator of the pipelines. Implementations make
/// exactly one round trip per call and never retry.
#[async_trait]
pub trait ModelAdapter: Send + Sync {
    async fn invoke(&self, invocation: ModelInvocation<'_>) -> PipelineOutcome<RawReply>;

    fn describe(&self) -> String;
}

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormatBody>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<ContentFilter>,
}

#[derive(Debug, Clone, Serialize)]
struct ResponseFormatBody {
    r#type: String,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Option<Vec<ChatChoice>>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatChoice {
    message: Option<ChatMessageResponse>,
    finish_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
    refusal: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    temperature: f64,
    system: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicResponse {
    content: Option<Vec<AnthropicContent>>,
    stop_reason: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct AnthropicContent {
    text: Option<String>,
}

pub struct HttpModelAdapter {
    client: Client,
    provider: ProviderKind,
    url: String,
    model: String,
    api_key: String,
}

impl HttpModelAdapter {
    pub fn new(
        provider: ProviderKind,
        url: Option<String>,
        model: impl Into<String>,
        api_key: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ProviderError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            provider,
            url: url.unwrap_or_else(|| provider.default_url().to_string()),
            model: model.into(),
            api_key: api_key.into(),
        })
    }

    async fn round_trip(&self, invocation: &ModelInvocation<'_>) -> Result<String, ProviderError> {
        let api_key = self.api_key.as_str();
        match self.provider {
            ProviderKind::Openai => self.call_chat_api(api_key, invocation).await,
            ProviderKind::Anthropic => self.call_anthropic_api(api_key, invocation).await,
        }
    }

    async fn post_json<B: Serialize>(
        &self,
        request: reqwest::RequestBuilder,
        body: &B,
    ) -> Result<String, ProviderError> {
        let response = request
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ProviderError::ApiError {
                status: status.as_u16(),
                message: text,
            });
        }
        Ok(text)
    }

    async fn call_chat_api(
        &self,
        api_key: &str,
        invocation: &ModelInvocation<'_>,
    ) -> Result<String, ProviderError> {
        let config = invocation.config;
        let request = ChatRequest {
            model: self.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: invocation.system_prompt(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: invocation.user_prompt(),
                },
            ],
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            response_format: match config.response_format {
                ResponseFormat::Structured => Some(ResponseFormatBody {
                    r#type: "json_object".to_string(),
                }),
                ResponseFormat::Freeform => None,
            },
            safety_settings: config.content_filters.clone(),
        };

        let builder = self
            .client
            .post(&self.url)
            .header("Authorization", format!("Bearer {}", api_key));
        let body = self.post_json(builder, &request).await?;

        let data: ChatResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
        let choice = data
            .choices
            .and_then(|c| c.into_iter().next())
            .ok_or_else(|| ProviderError::JsonError("response has no choices".to_string()))?;

        if let Some(reason) = choice.finish_reason.as_deref() {
            if is_refusal_text(reason) {
                return Err(ProviderError::Refused(format!("finish_reason={}", reason)));
            }
        }
        let message = choice.message;
        if let Some(refusal) = message.as_ref().and_then(|m| m.refusal.clone()) {
            return Err(ProviderError::Refused(refusal));
        }
        Ok(message.and_then(|m| m.content).unwrap_or_default())
    }

    async fn call_anthropic_api(
        &self,
        api_key: &str,
        invocation: &ModelInvocation<'_>,
    ) -> Result<String, ProviderError> {
        let config = invocation.config;
        if !config.content_filters.is_empty() {
            debug!(
                filters = config.content_filters.len(),
                "adapter.content_filters_unsupported_by_anthropic"
            );
        }
        let request = AnthropicRequest {
            model: self.model.clone(),
            max_tokens: config.max_output_tokens,
            temperature: config.temperature,
            system: invocation.system_prompt(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: invocation.user_prompt(),
            }],
        };

        let builder = self
            .client
            .post(&self.url)
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION);
        let body = self.post_json(builder, &request).await?;

        let data: AnthropicResponse =
            serde_json::from_str(&body).map_err(|e| ProviderError::JsonError(e.to_string()))?;
        if data.stop_reason.as_deref() == Some("refusal") {
            return Err(ProviderError::Refused("stop_reason=refusal".to_string()));
        }
        Ok(data
            .content
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.text)
            .unwrap_or_default())
    }
}

#[async_trait]
impl ModelAdapter for HttpModelAdapter {
    async fn invoke(&self, invocation: ModelInvocation<'_>) -> PipelineOutcome<RawReply> {
        let start = Instant::now();
        let content = match self.round_trip(&invocation).await {
            Ok(content) => content,
            Err(e) => {
                warn!(
                    provider = self.provider.as_str(),
                    schema = invocation.schema.name,
                    latency_ms = start.elapsed().as_millis() as u64,
                    error = %e,
                    "adapter.round_trip_failed"
                );
                return Err(e.into());
            }
        };
        debug!(
            provider = self.provider.as_str(),
            schema = invocation.schema.name,
            latency_ms = start.elapsed().as_millis() as u64,
            reply_chars = content.chars().count(),
            "adapter.reply_received"
        );
        RawReply::from_content(&content)
    }

    fn describe(&self) -> String {
        format!("{}:{}", self.provider.as_str(), self.model)
    }
}

/// Get API key from environment or config file
pub fn get_api_key(provider: ProviderKind) -> Option<String> {
    let env_keys = match provider {
        ProviderKind::Openai => ["VERAZ_API_KEY", "OPENAI_API_KEY"],
        ProviderKind::Anthropic => ["VERAZ_API_KEY", "ANTHROPIC_API_KEY"],
    };

    for key in env_keys {
        if let Ok(val) = env::var(key) {
            let v = val.trim();
            if !v.is_empty() {
                return Some(v.to_string());
            }
        }
    }

    if let Some(config_dir) = super::ConfigStore::default_config_dir() {
        let store = super::ConfigStore::new(config_dir);
        if let Ok(Some(key)) = store.get_api_key(provider.as_str()) {
            return Some(key);
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ErrorKind;
    use serde_json::json;

    #[test]
    fn test_raw_reply_from_plain_json() {
        let reply = RawReply::from_content(r#"{"aiDetectionScore": 87}"#).unwrap();
        assert_eq!(reply.get("aiDetectionScore"), Some(&json!(87)));
    }

    #[test]
    fn test_raw_reply_strips_code_fence() {
        let reply = RawReply::from_content("```json\n{\"needsRewrite\": true}\n```").unwrap();
        assert_eq!(reply.get("needsRewrite"), Some(&json!(true)));
    }

    #[test]
    fn test_raw_reply_absent_on_empty_or_null() {
        assert_eq!(RawReply::from_content("   ").unwrap(), RawReply::Absent);
        assert_eq!(RawReply::from_content("null").unwrap(), RawReply::Absent);
    }

    #[test]
    fn test_raw_reply_non_object() {
        let reply = RawReply::from_content("[1, 2]").unwrap();
        assert_eq!(reply, RawReply::Other(json!([1, 2])));
        assert!(reply.get("aiDetectionScore").is_none());
    }

    #[test]
    fn test_raw_reply_bare_scalars() {
        assert_eq!(RawReply::from_content("87").unwrap(), RawReply::Other(json!(87)));
        assert_eq!(RawReply::from_content("\"87\"").unwrap(), RawReply::Other(json!("87")));
        assert_eq!(RawReply::from_content("true").unwrap(), RawReply::Other(json!(true)));
    }

    #[test]
    fn test_raw_reply_tolerates_surrounding_prose() {
        let trailing = RawReply::from_content("{\"aiDetectionScore\": 87}\nHope this helps!").unwrap();
        assert_eq!(trailing.get("aiDetectionScore"), Some(&json!(87)));

        let leading = RawReply::from_content("Sure! {\"aiDetectionScore\": 87}").unwrap();
        assert_eq!(leading, trailing);

        let both = RawReply::from_content("Here you go: {\"needsRewrite\": false} (based on tone)").unwrap();
        assert_eq!(both.get("needsRewrite"), Some(&json!(false)));
    }

    #[test]
    fn test_raw_reply_rejects_prose() {
        let err = RawReply::from_content("The score is about 80 percent.").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedReply);

        let err = RawReply::from_content("{\"aiDetectionScore\": 8").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedReply);
    }

    #[test]
    fn test_provider_error_mapping() {
        let refused: PipelineError = ProviderError::ApiError {
            status: 400,
            message: "{\"error\":{\"code\":\"content_filter\"}}".to_string(),
        }
        .into();
        assert_eq!(refused.kind, ErrorKind::ModelRefusal);

        let outage: PipelineError = ProviderError::ApiError {
            status: 503,
            message: "upstream unavailable".to_string(),
        }
        .into();
        assert_eq!(outage.kind, ErrorKind::TransportFailure);

        let malformed: PipelineError = ProviderError::JsonError("eof".to_string()).into();
        assert_eq!(malformed.kind, ErrorKind::MalformedReply);
    }

    #[test]
    fn test_structured_request_body() {
        let request = ChatRequest {
            model: "gpt-4o-mini".to_string(),
            messages: vec![],
            max_tokens: 256,
            temperature: 0.0,
            response_format: Some(ResponseFormatBody {
                r#type: "json_object".to_string(),
            }),
            safety_settings: vec![],
        };
        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["response_format"]["type"], "json_object");
        assert!(body.get("safety_settings").is_none());
    }

    #[test]
    fn test_adapter_defaults_url() {
        let adapter = HttpModelAdapter::new(
            ProviderKind::Anthropic,
            None,
            "claude-3-5-haiku-latest",
            "sk-test",
            Duration::from_secs(5),
        )
        .unwrap();
        assert_eq!(adapter.url, ANTHROPIC_DEFAULT_URL);
        assert_eq!(adapter.describe(), "anthropic:claude-3-5-haiku-latest");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_transport_failure() {
        let adapter = HttpModelAdapter::new(
            ProviderKind::Openai,
            Some("http://127.0.0.1:9/v1/chat/completions".to_string()),
            "gpt-4o-mini",
            "sk-test",
            Duration::from_secs(1),
        )
        .unwrap();
        let request = AnalysisRequest::new("hello");
        let config = InvocationConfig::default();
        let invocation = ModelInvocation {
            payload: &request,
            template: &crate::services::prompts::DETECTION_TEMPLATE,
            schema: &crate::services::prompts::DETECTION_SCHEMA,
            config: &config,
        };
        let err = adapter.invoke(invocation).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportFailure);
    }
}
