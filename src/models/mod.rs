// Veraz Data Models
// Request, result and failure types shared by the detection and humanization pipelines

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

// ============ Requests ============

/// Text submitted for analysis. The pipelines never alter `text`; the
/// humanization pass-through path returns it byte-for-byte.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub text: String,
}

impl AnalysisRequest {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

// ============ Results ============

/// Likelihood (percent) that a text was machine-generated.
/// Always an integer in `[0, 100]`; 0 = certainly human, 100 = certainly machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct DetectionScore(u8);

impl DetectionScore {
    pub const MIN: u8 = 0;
    pub const MAX: u8 = 100;

    /// Clamp to `[0, 100]` and round to the nearest integer.
    /// `None` for NaN and infinities; there is no meaningful score for them.
    pub fn from_raw(value: f64) -> Option<Self> {
        if !value.is_finite() {
            return None;
        }
        let clamped = value.clamp(Self::MIN as f64, Self::MAX as f64);
        Some(Self(clamped.round() as u8))
    }

    pub fn value(self) -> u8 {
        self.0
    }
}

impl fmt::Display for DetectionScore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}%", self.0)
    }
}

/// Decision Gate verdict: `true` when the text should be rewritten.
pub type RewriteVerdict = bool;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanizationResult {
    pub humanized_text: String,
    pub is_rewritten: bool,
}

impl HumanizationResult {
    /// The identity result used when the gate says no rewrite is needed.
    pub fn passthrough(original: &str) -> Self {
        Self {
            humanized_text: original.to_string(),
            is_rewritten: false,
        }
    }

    pub fn rewritten(text: String) -> Self {
        Self {
            humanized_text: text,
            is_rewritten: true,
        }
    }
}

// ============ Failures ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ErrorKind {
    /// Request shape was wrong (null, non-string, missing field).
    InvalidInput,
    /// Network fault, timeout or endpoint outage.
    TransportFailure,
    /// The endpoint refused to answer on safety/content grounds.
    ModelRefusal,
    /// The reply did not conform to the expected schema after coercion.
    MalformedReply,
}

impl ErrorKind {
    /// Transient failures may be retried by the caller with backoff.
    pub fn is_transient(self) -> bool {
        matches!(self, ErrorKind::TransportFailure)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::InvalidInput => "invalid_input",
            ErrorKind::TransportFailure => "transport_failure",
            ErrorKind::ModelRefusal => "model_refusal",
            ErrorKind::MalformedReply => "malformed_reply",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single failure channel of every pipeline stage.
/// `detail` is informational; callers branch on `kind`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {detail}")]
pub struct PipelineError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl PipelineError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: detail.into(),
        }
    }

    pub fn invalid_input(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidInput, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportFailure, detail)
    }

    pub fn refusal(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ModelRefusal, detail)
    }

    pub fn malformed(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::MalformedReply, detail)
    }

    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

/// `Ok` is Success, `Err` is Failure(kind, detail).
pub type PipelineOutcome<T> = Result<T, PipelineError>;
