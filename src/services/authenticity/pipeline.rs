// Stage Composition
// One invocation of the shared skeleton: build the invocation, make the single
// adapter round trip, coerce the reply, then let the fallback policy settle it.

use super::fallback::settle;
use crate::models::{AnalysisRequest, PipelineOutcome};
use crate::services::prompts::{InstructionTemplate, ReplySchema};
use crate::services::providers::{InvocationConfig, ModelAdapter, ModelInvocation, RawReply};
use std::time::Instant;
use tracing::debug;

/// Static description of one model-backed stage.
pub struct StageSpec<T> {
    pub name: &'static str,
    pub template: &'static InstructionTemplate,
    pub schema: &'static ReplySchema,
    pub coerce: fn(&RawReply) -> PipelineOutcome<T>,
}

pub async fn run_stage<T>(
    adapter: &dyn ModelAdapter,
    config: &InvocationConfig,
    stage: &StageSpec<T>,
    request: &AnalysisRequest,
) -> PipelineOutcome<T> {
    let started = Instant::now();
    let invocation = ModelInvocation {
        payload: request,
        template: stage.template,
        schema: stage.schema,
        config,
    };

    let outcome = adapter
        .invoke(invocation)
        .await
        .and_then(|reply| (stage.coerce)(&reply));

    debug!(
        stage = stage.name,
        ok = outcome.is_ok(),
        latency_ms = started.elapsed().as_millis() as u64,
        "stage.completed"
    );
    settle(stage.name, outcome)
}
