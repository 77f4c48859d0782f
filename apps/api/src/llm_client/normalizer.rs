//! Response normalizer: recovers structured JSON from raw model text.
//!
//! Stages, in order; the first stage whose output parses AND validates wins:
//! 1. sanitize: drop code fences and control characters, collapse whitespace
//! 2. extract the first balanced `[...]` / `{...}` span, discarding surrounding prose
//! 3. syntax repair: trailing commas, missing commas between objects, colon spacing
//! 4. parse; on failure escape stray quotes inside strings and parse again
//! 5. (array only) rebuild question/answer pairs from key-value matches
//!
//! Everything failing yields `AiError::ParseFailure`; callers substitute fallback content.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{json, Value};
use tracing::debug;

use crate::llm_client::AiError;
use crate::models::interview::{AnswerFeedback, QaPair};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[A-Za-z]*").expect("valid regex"));
static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([}\]])").expect("valid regex"));
static ADJACENT_OBJECTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\}\s*\{").expect("valid regex"));
static COLON_SPACING: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""\s*:\s*""#).expect("valid regex"));
static QUESTION_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""question"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex"));
static ANSWER_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#""answer"\s*:\s*"((?:[^"\\]|\\.)*)""#).expect("valid regex"));

/// Expected top-level JSON shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    Array,
    Object,
}

impl Shape {
    fn delimiters(self) -> (char, char) {
        match self {
            Shape::Array => ('[', ']'),
            Shape::Object => ('{', '}'),
        }
    }
}

/// Repairs `raw` into a JSON value of the given shape, preserving every field.
pub fn recover_json(raw: &str, shape: Shape) -> Result<Value, AiError> {
    recover(raw, shape, |value| {
        let matches = match shape {
            Shape::Array => value.is_array(),
            Shape::Object => value.is_object(),
        };
        matches.then_some(value)
    })
}

/// Parses a list of interview questions. Items without a non-empty question and answer are dropped.
pub fn parse_questions(raw: &str) -> Result<Vec<QaPair>, AiError> {
    recover(raw, Shape::Array, validate_questions)
}

/// Parses a single answer evaluation. The rating is rounded and clamped to 1..=10.
pub fn parse_feedback(raw: &str) -> Result<AnswerFeedback, AiError> {
    recover(raw, Shape::Object, validate_feedback)
}

fn recover<T>(
    raw: &str,
    shape: Shape,
    accept: impl Fn(Value) -> Option<T>,
) -> Result<T, AiError> {
    let sanitized = sanitize(raw);
    let candidate = extract_span(&sanitized, shape).unwrap_or(&sanitized);
    let repaired = repair_syntax(candidate);

    if let Some(value) = parse(&repaired).and_then(&accept) {
        return Ok(value);
    }

    let escaped = escape_stray_quotes(&repaired);
    if let Some(value) = parse(&escaped).and_then(&accept) {
        debug!("Model response recovered after escaping stray quotes");
        return Ok(value);
    }

    if shape == Shape::Array {
        if let Some(value) = rebuild_pairs(&sanitized).and_then(&accept) {
            debug!("Model response recovered from question/answer fields");
            return Ok(value);
        }
    }

    Err(AiError::ParseFailure(format!(
        "no valid JSON {} found in response starting with {:?}",
        match shape {
            Shape::Array => "array",
            Shape::Object => "object",
        },
        raw.chars().take(80).collect::<String>()
    )))
}

fn parse(text: &str) -> Option<Value> {
    serde_json::from_str(text).ok()
}

// ────────────────────────────────────────────────────────────────────────────
// Stages
// ────────────────────────────────────────────────────────────────────────────

/// Stage 1: strips fences and control characters, collapses whitespace to single spaces.
fn sanitize(raw: &str) -> String {
    let unfenced = CODE_FENCE.replace_all(raw, " ");
    let cleaned: String = unfenced
        .chars()
        .map(|c| if matches!(c, '\n' | '\r' | '\t') { ' ' } else { c })
        .filter(|c| !is_stripped_control(*c))
        .collect();
    cleaned.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn is_stripped_control(c: char) -> bool {
    matches!(c as u32, 0x00..=0x1F | 0x7F..=0x9F)
}

/// Stage 2: first balanced span of the requested shape.
///
/// In array mode a span that contains objects is preferred over one that does not
/// (`"see [1]: [{...}]"`). Unbalanced input falls back to first-open .. last-close.
fn extract_span(text: &str, shape: Shape) -> Option<&str> {
    let (open, close) = shape.delimiters();
    let mut first_balanced = None;

    for (start, _) in text.match_indices(open) {
        let Some(end) = balanced_end(text, start, open, close) else {
            continue;
        };
        let span = &text[start..end];
        if shape == Shape::Object || span.contains('{') {
            return Some(span);
        }
        first_balanced.get_or_insert(span);
    }

    if first_balanced.is_some() {
        return first_balanced;
    }

    let start = text.find(open)?;
    let end = text.rfind(close)?;
    (end > start).then(|| &text[start..=end])
}

/// Byte index just past the delimiter closing the one at `start`. Ignores delimiters in strings.
fn balanced_end(text: &str, start: usize, open: char, close: char) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            _ if c == open => depth += 1,
            _ if c == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + offset + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

/// Stage 3: common syntax slips in generated JSON.
fn repair_syntax(text: &str) -> String {
    let text = TRAILING_COMMA.replace_all(text, "$1");
    let text = ADJACENT_OBJECTS.replace_all(&text, "},{");
    let text = COLON_SPACING.replace_all(&text, "\":\"");
    text.trim().to_string()
}

/// Stage 4b: escapes quotes that cannot be closing a string.
///
/// Inside a string, a `"` only closes it when the next non-space character is `,` `}` `]` `:`
/// or the end of input; every other quote is escaped.
fn escape_stray_quotes(text: &str) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if !in_string {
            if c == '"' {
                in_string = true;
            }
            out.push(c);
        } else if c == '\\' {
            out.push(c);
            if let Some(&next) = chars.get(i + 1) {
                out.push(next);
                i += 1;
            }
        } else if c == '"' {
            let next = chars[i + 1..].iter().find(|c| !c.is_whitespace());
            if matches!(next, None | Some(',' | '}' | ']' | ':')) {
                in_string = false;
                out.push('"');
            } else {
                out.push_str("\\\"");
            }
        } else {
            out.push(c);
        }
        i += 1;
    }
    out
}

/// Stage 5: rebuilds `[{question, answer}, ...]` from field matches when counts agree.
fn rebuild_pairs(text: &str) -> Option<Value> {
    let questions: Vec<String> = QUESTION_FIELD
        .captures_iter(text)
        .map(|c| unescape(&c[1]))
        .collect();
    let answers: Vec<String> = ANSWER_FIELD
        .captures_iter(text)
        .map(|c| unescape(&c[1]))
        .collect();

    if questions.is_empty() || questions.len() != answers.len() {
        return None;
    }

    Some(Value::Array(
        questions
            .into_iter()
            .zip(answers)
            .map(|(question, answer)| json!({ "question": question, "answer": answer }))
            .collect(),
    ))
}

fn unescape(fragment: &str) -> String {
    serde_json::from_str::<String>(&format!("\"{fragment}\"")).unwrap_or_else(|_| fragment.to_string())
}

// ────────────────────────────────────────────────────────────────────────────
// Validation
// ────────────────────────────────────────────────────────────────────────────

fn validate_questions(value: Value) -> Option<Vec<QaPair>> {
    let items = value.as_array()?;
    let pairs: Vec<QaPair> = items
        .iter()
        .filter_map(|item| {
            let question = non_empty_str(item.get("question"))?;
            let answer = non_empty_str(item.get("answer"))?;
            Some(QaPair { question, answer })
        })
        .collect();
    (!pairs.is_empty()).then_some(pairs)
}

fn validate_feedback(value: Value) -> Option<AnswerFeedback> {
    let rating = value.get("rating")?.as_f64()?;
    let feedback = non_empty_str(value.get("feedback"))?;
    Some(AnswerFeedback {
        rating: clamp_rating(rating),
        feedback,
    })
}

/// Rounds to the nearest integer and clamps to 1..=10.
pub fn clamp_rating(raw: f64) -> u8 {
    if !raw.is_finite() {
        return 1;
    }
    raw.round().clamp(1.0, 10.0) as u8
}

fn non_empty_str(value: Option<&Value>) -> Option<String> {
    let text = value?.as_str()?.trim();
    (!text.is_empty()).then(|| text.to_string())
}
