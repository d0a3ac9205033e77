// Input Normalizer
// Shapes raw caller input into the request the adapter expects. Trimming and
// emptiness checks belong to the caller; this stage only rejects wrong shapes.

use crate::models::{AnalysisRequest, PipelineError, PipelineOutcome};
use serde_json::Value;

/// Detection input: a bare JSON string.
pub fn normalize_detection_input(raw: &Value) -> PipelineOutcome<AnalysisRequest> {
    match raw {
        Value::String(text) => Ok(AnalysisRequest::new(text.clone())),
        other => Err(PipelineError::invalid_input(format!(
            "expected a string, got {}",
            json_type_name(other)
        ))),
    }
}

/// Humanization input: an object with a string `text` field.
pub fn normalize_humanization_input(raw: &Value) -> PipelineOutcome<AnalysisRequest> {
    let obj = raw.as_object().ok_or_else(|| {
        PipelineError::invalid_input(format!(
            "expected an object with a `text` field, got {}",
            json_type_name(raw)
        ))
    })?;
    match obj.get("text") {
        Some(Value::String(text)) => Ok(AnalysisRequest::new(text.clone())),
        Some(other) => Err(PipelineError::invalid_input(format!(
            "`text` must be a string, got {}",
            json_type_name(other)
        ))),
        None => Err(PipelineError::invalid_input("missing `text` field")),
    }
}

pub(crate) fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
