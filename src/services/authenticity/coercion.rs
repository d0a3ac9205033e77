// Output Coercion
// Extracts well-typed values from an untrusted RawReply. Ordered attempts, first success wins:
// 1. field present with the expected type
// 2. numeric field encoded as a numeral string
// 3. anything else is a MalformedReply; nothing is guessed from other fields or free text

use super::normalizer::json_type_name;
use crate::models::{
    DetectionScore, HumanizationResult, PipelineError, PipelineOutcome, RewriteVerdict,
};
use crate::services::prompts::{
    HUMANIZED_TEXT_FIELD, IS_REWRITTEN_FIELD, NEEDS_REWRITE_FIELD, SCORE_FIELD,
};
use crate::services::providers::RawReply;
use serde_json::Value;
use tracing::debug;

fn require_field<'a>(reply: &'a RawReply, field: &str) -> PipelineOutcome<&'a Value> {
    match reply {
        RawReply::Absent => Err(PipelineError::malformed(format!(
            "reply is empty; expected `{}`",
            field
        ))),
        RawReply::Other(v) => Err(PipelineError::malformed(format!(
            "reply is a JSON {}, not an object",
            json_type_name(v)
        ))),
        RawReply::Object(_) => match reply.get(field) {
            None | Some(Value::Null) => {
                Err(PipelineError::malformed(format!("`{}` is missing or null", field)))
            }
            Some(v) => Ok(v),
        },
    }
}

/// Finite number from a JSON number or a string holding one.
pub fn coerce_number(reply: &RawReply, field: &str) -> PipelineOutcome<f64> {
    let value = require_field(reply, field)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let parsed = s.trim().parse::<f64>().ok();
            if parsed.is_some() {
                debug!(field, "coercion.numeral_string");
            }
            parsed
        }
        other => {
            return Err(PipelineError::malformed(format!(
                "`{}` must be a number, got {}",
                field,
                json_type_name(other)
            )))
        }
    };
    match parsed {
        Some(n) if n.is_finite() => Ok(n),
        _ => Err(PipelineError::malformed(format!(
            "`{}` is not a parseable number: {}",
            field, value
        ))),
    }
}

pub fn coerce_string(reply: &RawReply, field: &str) -> PipelineOutcome<String> {
    match require_field(reply, field)? {
        Value::String(s) => Ok(s.clone()),
        other => Err(PipelineError::malformed(format!(
            "`{}` must be a string, got {}",
            field,
            json_type_name(other)
        ))),
    }
}

pub fn coerce_bool(reply: &RawReply, field: &str) -> PipelineOutcome<bool> {
    match require_field(reply, field)? {
        Value::Bool(b) => Ok(*b),
        other => Err(PipelineError::malformed(format!(
            "`{}` must be a boolean, got {}",
            field,
            json_type_name(other)
        ))),
    }
}

/// Score is clamped to `[0, 100]` and rounded whatever the model reported.
pub fn coerce_detection_score(reply: &RawReply) -> PipelineOutcome<DetectionScore> {
    let raw = coerce_number(reply, SCORE_FIELD)?;
    let score = DetectionScore::from_raw(raw).ok_or_else(|| {
        PipelineError::malformed(format!("`{}` is not a finite number", SCORE_FIELD))
    })?;
    if score.value() as f64 != raw {
        debug!(raw, score = score.value(), "coercion.score_clamped");
    }
    Ok(score)
}

pub fn coerce_rewrite_verdict(reply: &RawReply) -> PipelineOutcome<RewriteVerdict> {
    coerce_bool(reply, NEEDS_REWRITE_FIELD)
}

/// Both fields must be present with the right types. The rewrite stage only
/// runs after the gate said yes, so the result is always marked rewritten.
pub fn coerce_rewrite(reply: &RawReply) -> PipelineOutcome<HumanizationResult> {
    let text = coerce_string(reply, HUMANIZED_TEXT_FIELD)?;
    let reported = coerce_bool(reply, IS_REWRITTEN_FIELD)?;
    if !reported {
        debug!("coercion.rewrite_reported_unchanged");
    }
    Ok(HumanizationResult::rewritten(text))
}
