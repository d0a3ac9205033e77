// Humanization Pipeline
// Gate first, then rewrite only when the gate says so:
//   gate Ok(false) -> original text, is_rewritten = false
//   gate Ok(true)  -> rewrite; Ok -> rewritten text, is_rewritten = true; Err -> propagated
//   gate Err       -> propagated
// The two round trips are strictly sequential.

use super::coercion::coerce_rewrite;
use super::decision_gate::needs_rewrite;
use super::pipeline::{run_stage, StageSpec};
use crate::models::{AnalysisRequest, HumanizationResult, PipelineOutcome};
use crate::services::prompts::{REWRITE_SCHEMA, REWRITE_TEMPLATE};
use crate::services::providers::{InvocationConfig, ModelAdapter};
use tracing::info;

pub const REWRITE_STAGE: StageSpec<HumanizationResult> = StageSpec {
    name: "rewrite",
    template: &REWRITE_TEMPLATE,
    schema: &REWRITE_SCHEMA,
    coerce: coerce_rewrite,
};

pub async fn humanize(
    adapter: &dyn ModelAdapter,
    config: &InvocationConfig,
    request: &AnalysisRequest,
) -> PipelineOutcome<HumanizationResult> {
    if !needs_rewrite(adapter, config, request).await? {
        info!(text_chars = request.char_len(), "humanize.passthrough");
        return Ok(HumanizationResult::passthrough(&request.text));
    }

    let result = run_stage(adapter, config, &REWRITE_STAGE, request).await?;
    info!(
        text_chars = request.char_len(),
        rewritten_chars = result.humanized_text.chars().count(),
        "humanize.rewritten"
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ErrorKind, PipelineError};
    use crate::services::authenticity::testing::ScriptedAdapter;
    use serde_json::json;

    async fn run(adapter: &ScriptedAdapter, text: &str) -> PipelineOutcome<HumanizationResult> {
        humanize(adapter, &InvocationConfig::default(), &AnalysisRequest::new(text)).await
    }

    #[tokio::test]
    async fn test_passthrough_when_gate_says_no() {
        let adapter = ScriptedAdapter::new().reply(json!({"needsRewrite": false}));
        let result = run(&adapter, "Hola, ¿qué tal?").await.unwrap();
        assert_eq!(
            result,
            HumanizationResult {
                humanized_text: "Hola, ¿qué tal?".to_string(),
                is_rewritten: false,
            }
        );
        // No rewrite call was made.
        assert_eq!(adapter.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_passthrough_is_byte_exact() {
        let text = "  trailing spaces\tand\r\nCRLF \u{00A0}";
        let adapter = ScriptedAdapter::new().reply(json!({"needsRewrite": false}));
        let result = run(&adapter, text).await.unwrap();
        assert_eq!(result.humanized_text.as_bytes(), text.as_bytes());
        assert!(!result.is_rewritten);
    }

    #[tokio::test]
    async fn test_rewrite_when_gate_says_yes() {
        let adapter = ScriptedAdapter::new()
            .reply(json!({"needsRewrite": true}))
            .reply(json!({"humanizedText": "Honestly, it works pretty well.", "isRewritten": true}));
        let result = run(&adapter, "The solution demonstrates robust efficacy.").await.unwrap();
        assert!(result.is_rewritten);
        assert_eq!(result.humanized_text, "Honestly, it works pretty well.");

        let calls = adapter.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].schema, "needs_rewriting");
        assert_eq!(calls[1].schema, "humanize");
    }

    #[tokio::test]
    async fn test_rewrite_output_marked_even_if_identical() {
        let adapter = ScriptedAdapter::new()
            .reply(json!({"needsRewrite": true}))
            .reply(json!({"humanizedText": "same text", "isRewritten": false}));
        let result = run(&adapter, "same text").await.unwrap();
        assert!(result.is_rewritten);
    }

    #[tokio::test]
    async fn test_transport_failure_on_rewrite() {
        let adapter = ScriptedAdapter::new()
            .reply(json!({"needsRewrite": true}))
            .fail(PipelineError::transport("connection reset by peer"));
        let err = run(&adapter, "Some text").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportFailure);
    }

    #[tokio::test]
    async fn test_partial_rewrite_reply_is_malformed() {
        let adapter = ScriptedAdapter::new()
            .reply(json!({"needsRewrite": true}))
            .reply(json!({"isRewritten": true}));
        let err = run(&adapter, "Some text").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedReply);
    }

    #[tokio::test]
    async fn test_gate_failure_skips_rewrite() {
        let adapter = ScriptedAdapter::new()
            .fail(PipelineError::transport("timeout"))
            .reply(json!({"humanizedText": "never used", "isRewritten": true}));
        let err = run(&adapter, "Some text").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::TransportFailure);
        assert_eq!(adapter.calls().len(), 1);
    }
}
