// Detection Pipeline
// Scores how likely a text is to be machine-generated

use super::coercion::coerce_detection_score;
use super::pipeline::{run_stage, StageSpec};
use crate::models::{AnalysisRequest, DetectionScore, PipelineOutcome};
use crate::services::prompts::{DETECTION_SCHEMA, DETECTION_TEMPLATE};
use crate::services::providers::{InvocationConfig, ModelAdapter};
use tracing::info;

pub const DETECTION_STAGE: StageSpec<DetectionScore> = StageSpec {
    name: "detection",
    template: &DETECTION_TEMPLATE,
    schema: &DETECTION_SCHEMA,
    coerce: coerce_detection_score,
};

pub async fn detect(
    adapter: &dyn ModelAdapter,
    config: &InvocationConfig,
    request: &AnalysisRequest,
) -> PipelineOutcome<DetectionScore> {
    let score = run_stage(adapter, config, &DETECTION_STAGE, request).await?;
    info!(score = score.value(), text_chars = request.char_len(), "detection.scored");
    Ok(score)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, PipelineError};
    use crate::services::authenticity::testing::ScriptedAdapter;
    use serde_json::json;

    async fn run(adapter: &ScriptedAdapter) -> PipelineOutcome<DetectionScore> {
        detect(adapter, &InvocationConfig::default(), &AnalysisRequest::new("Some sample text.")).await
    }

    #[tokio::test]
    async fn test_string_encoded_score() {
        let adapter = ScriptedAdapter::new().reply(json!({"aiDetectionScore": "87"}));
        assert_eq!(run(&adapter).await.unwrap().value(), 87);
    }

    #[tokio::test]
    async fn test_null_score_is_malformed() {
        let adapter = ScriptedAdapter::new().reply(json!({"aiDetectionScore": null}));
        let err = run(&adapter).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedReply);
    }

    #[tokio::test]
    async fn test_out_of_range_scores_are_bounded() {
        for (raw, expected) in [(142.7, 100), (-3.2, 0), (62.4, 62)] {
            let adapter = ScriptedAdapter::new().reply(json!({ "aiDetectionScore": raw }));
            assert_eq!(run(&adapter).await.unwrap().value(), expected);
        }
    }

    #[tokio::test]
    async fn test_absent_reply_never_fabricates_score() {
        let adapter = ScriptedAdapter::new().reply(serde_json::Value::Null);
        let err = run(&adapter).await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedReply);
    }

    #[tokio::test]
    async fn test_adapter_failures_propagate_unchanged() {
        for err in [
            PipelineError::transport("timeout"),
            PipelineError::refusal("content_filter"),
            PipelineError::malformed("not json"),
        ] {
            let adapter = ScriptedAdapter::new().fail(err.clone());
            assert_eq!(run(&adapter).await, Err(err));
            assert_eq!(adapter.calls().len(), 1);
        }
    }

    #[tokio::test]
    async fn test_prompt_carries_text_and_config() {
        let adapter = ScriptedAdapter::new().reply(json!({"aiDetectionScore": 12}));
        let config = InvocationConfig {
            temperature: 0.0,
            ..InvocationConfig::default()
        };
        detect(&adapter, &config, &AnalysisRequest::new("lorem ipsum")).await.unwrap();
        let calls = adapter.calls();
        assert_eq!(calls[0].schema, "detection");
        assert_eq!(calls[0].user_prompt, "Text:\nlorem ipsum");
        assert_eq!(calls[0].temperature, 0.0);
    }
}
