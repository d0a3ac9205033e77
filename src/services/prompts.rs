// Prompt Templates & Reply Schemas
// Instruction templates sent to the model and the closed field sets we ask it to answer with

use regex::Regex;
use std::sync::OnceLock;

/// Field carrying the detection percentage.
pub const SCORE_FIELD: &str = "aiDetectionScore";
/// Field carrying the Decision Gate verdict.
pub const NEEDS_REWRITE_FIELD: &str = "needsRewrite";
pub const HUMANIZED_TEXT_FIELD: &str = "humanizedText";
pub const IS_REWRITTEN_FIELD: &str = "isRewritten";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Number,
    String,
    Boolean,
}

impl FieldType {
    pub fn as_str(self) -> &'static str {
        match self {
            FieldType::Number => "number",
            FieldType::String => "string",
            FieldType::Boolean => "boolean",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldSpec {
    pub name: &'static str,
    pub field_type: FieldType,
    pub description: &'static str,
}

/// Expected shape of a structured reply: a small closed set of primitive fields.
#[derive(Debug, Clone, Copy)]
pub struct ReplySchema {
    pub name: &'static str,
    pub fields: &'static [FieldSpec],
}

impl ReplySchema {
    /// Answer-format instructions appended to the system prompt.
    pub fn answer_instructions(&self) -> String {
        let mut out = String::from(
            "Respond with a single JSON object and nothing else. The object must contain exactly these fields:\n",
        );
        for field in self.fields {
            out.push_str(&format!(
                "- {} ({}): {}\n",
                field.name,
                field.field_type.as_str(),
                field.description
            ));
        }
        out
    }
}

/// System instruction plus a user message with `{{text}}` placeholders.
#[derive(Debug, Clone, Copy)]
pub struct InstructionTemplate {
    pub name: &'static str,
    pub system: &'static str,
    pub user: &'static str,
}

impl InstructionTemplate {
    /// Substitute the payload into the user message. Unknown placeholders are left as-is.
    pub fn render_user(&self, text: &str) -> String {
        placeholder_re()
            .replace_all(self.user, |caps: &regex::Captures| match &caps[1] {
                "text" => text.to_string(),
                _ => caps[0].to_string(),
            })
            .into_owned()
    }

    pub fn render_system(&self, schema: &ReplySchema) -> String {
        format!("{}\n\n{}", self.system.trim_end(), schema.answer_instructions())
    }
}

fn placeholder_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z_]+)\s*\}\}").expect("placeholder regex is valid"))
}

// ============ Detection ============

pub const DETECTION_SCHEMA: ReplySchema = ReplySchema {
    name: "detection",
    fields: &[FieldSpec {
        name: SCORE_FIELD,
        field_type: FieldType::Number,
        description: "The percentage likelihood (0-100) of the text being AI-generated.",
    }],
};

pub const DETECTION_TEMPLATE: InstructionTemplate = InstructionTemplate {
    name: "detect_ai_content",
    system: "You are an AI content detection expert. Analyze the text you are given and determine \
the likelihood of it being AI-generated. Consider fluency, uniformity of sentence structure, \
absence of personal voice, and repetitive or formulaic phrasing. Return a percentage score \
between 0 and 100.",
    user: "Text:\n{{text}}",
};

// ============ Decision Gate ============

pub const DECISION_GATE_SCHEMA: ReplySchema = ReplySchema {
    name: "needs_rewriting",
    fields: &[FieldSpec {
        name: NEEDS_REWRITE_FIELD,
        field_type: FieldType::Boolean,
        description: "true if the text needs rewriting to sound more human, false otherwise.",
    }],
};

pub const DECISION_GATE_TEMPLATE: InstructionTemplate = InstructionTemplate {
    name: "needs_rewriting",
    system: "You decide whether a text needs rewriting to sound more human. Answer false when the \
text already reads as written by a person, true when it shows typical machine-generated traits.",
    user: "Text to analyze:\n{{text}}",
};

// ============ Rewrite ============

pub const REWRITE_SCHEMA: ReplySchema = ReplySchema {
    name: "humanize",
    fields: &[
        FieldSpec {
            name: HUMANIZED_TEXT_FIELD,
            field_type: FieldType::String,
            description: "The humanized version of the input text.",
        },
        FieldSpec {
            name: IS_REWRITTEN_FIELD,
            field_type: FieldType::Boolean,
            description: "Whether the text was rewritten.",
        },
    ],
};

pub const REWRITE_TEMPLATE: InstructionTemplate = InstructionTemplate {
    name: "humanize_ai_content",
    system: "You are an assistant that rewrites text to sound more natural and human-like. Keep \
the original language, meaning and level of detail. Vary sentence length, prefer plain wording \
and avoid formulaic transitions.",
    user: "Original Text:\n{{text}}",
};
