// Decision Gate
// Nested run of the stage skeleton that decides whether a text needs rewriting

use super::coercion::coerce_rewrite_verdict;
use super::pipeline::{run_stage, StageSpec};
use crate::models::{AnalysisRequest, PipelineOutcome, RewriteVerdict};
use crate::services::prompts::{DECISION_GATE_SCHEMA, DECISION_GATE_TEMPLATE};
use crate::services::providers::{InvocationConfig, ModelAdapter};

pub const DECISION_GATE_STAGE: StageSpec<RewriteVerdict> = StageSpec {
    name: "decision_gate",
    template: &DECISION_GATE_TEMPLATE,
    schema: &DECISION_GATE_SCHEMA,
    coerce: coerce_rewrite_verdict,
};

pub async fn needs_rewrite(
    adapter: &dyn ModelAdapter,
    config: &InvocationConfig,
    request: &AnalysisRequest,
) -> PipelineOutcome<RewriteVerdict> {
    run_stage(adapter, config, &DECISION_GATE_STAGE, request).await
}
