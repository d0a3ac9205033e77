// Scripted in-memory adapter for pipeline tests

use crate::models::{PipelineError, PipelineOutcome};
use crate::services::providers::{ModelAdapter, ModelInvocation, RawReply};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCall {
    pub schema: &'static str,
    pub template: &'static str,
    pub user_prompt: String,
    pub temperature: f64,
}

/// Replays queued outcomes in order and records every invocation.
#[derive(Default)]
pub struct ScriptedAdapter {
    replies: Mutex<VecDeque<PipelineOutcome<RawReply>>>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, value: Value) -> Self {
        self.push(Ok(RawReply::from_value(value)))
    }

    pub fn fail(self, err: PipelineError) -> Self {
        self.push(Err(err))
    }

    pub fn push(self, outcome: PipelineOutcome<RawReply>) -> Self {
        self.replies.lock().unwrap().push_back(outcome);
        self
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelAdapter for ScriptedAdapter {
    async fn invoke(&self, invocation: ModelInvocation<'_>) -> PipelineOutcome<RawReply> {
        let schema = invocation.schema.name;
        let template = invocation.template.name;
        self.calls.lock().unwrap().push(RecordedCall {
            schema,
            template,
            user_prompt: invocation.user_prompt(),
            temperature: invocation.config.temperature,
        });
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(PipelineError::transport("no scripted reply left")))
    }

    fn describe(&self) -> String {
        "scripted".to_string()
    }
}
