// Fallback/Error Policy
// Turns adapter and coercion failures into the final outcome. Failures are
// reported faithfully; no default score or result is ever substituted.
// Pipelines make one attempt; retrying transient failures is the caller's choice.

use crate::models::{ErrorKind, PipelineOutcome};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Network/timeout; a later attempt may succeed.
    Transient,
    /// Shape or policy problem; the same input will fail the same way.
    Structural,
}

pub fn classify(kind: ErrorKind) -> FailureClass {
    if kind.is_transient() {
        FailureClass::Transient
    } else {
        FailureClass::Structural
    }
}

/// Final step of every stage: log the failure by class and pass the outcome through untouched.
pub fn settle<T>(stage: &'static str, outcome: PipelineOutcome<T>) -> PipelineOutcome<T> {
    if let Err(err) = &outcome {
        match classify(err.kind) {
            FailureClass::Transient => warn!(
                stage,
                kind = %err.kind,
                detail = %err.detail,
                "pipeline.transient_failure"
            ),
            FailureClass::Structural => warn!(
                stage,
                kind = %err.kind,
                detail = %err.detail,
                "pipeline.structural_failure"
            ),
        }
    }
    outcome
}

/// Bounded exponential backoff for callers that want to retry transient failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_delay_ms: u64,
    pub max_delay_ms: u64,
    pub backoff_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay_ms: 400,
            max_delay_ms: 5_000,
            backoff_factor: 2.0,
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Delay before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let exp = self.backoff_factor.max(1.0).powi(retry.saturating_sub(1) as i32);
        let ms = (self.initial_delay_ms as f64 * exp).min(self.max_delay_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Run `op` until it succeeds, fails structurally, or attempts run out.
pub async fn retry_transient<T, F, Fut>(policy: &RetryPolicy, mut op: F) -> PipelineOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PipelineOutcome<T>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        match op().await {
            Err(err) if err.is_transient() && attempt < max_attempts => {
                let delay = policy.delay_for(attempt);
                info!(
                    attempt,
                    max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    detail = %err.detail,
                    "retry.transient_failure"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            outcome => return outcome,
        }
    }
}
