//! Normalization of loosely formatted agent output.
//!
//! Agents answer with a single text blob whose format is only enforced by the
//! prompt. Each rule below is a separate function so it can be tested alone:
//!
//! 1. [`strip_fences`]: drop code-fence markers (```` ```json ````, ```` ```hcl ````, ...).
//! 2. [`unescape_newlines`]: turn escaped `\n` sequences into real line breaks.
//! 3. [`flatten_line_breaks`]: collapse line breaks to spaces (verdicts only).
//! 4. [`normalize_literals`]: `True`/`False`/`None` outside strings become
//!    `true`/`false`/`null`.
//! 5. [`unescape_quotes`]: `\"` becomes `"` (templates only).
//!
//! Surrounding whitespace is trimmed, but trailing garbage after the structured
//! content is left in place so decoding fails loudly.

use std::sync::LazyLock;

use jsonschema::Draft;
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

use crate::core::types::ValidationVerdict;
use crate::error::DecodeError;

const VERDICT_SCHEMA: &str = include_str!("../../schemas/verdict.schema.json");

static VERDICT_VALIDATOR: LazyLock<jsonschema::Validator> = LazyLock::new(|| {
    let schema: Value =
        serde_json::from_str(VERDICT_SCHEMA).expect("verdict schema is valid JSON");
    jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .expect("verdict schema compiles")
});

static FENCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("fence regex is valid"));

/// Remove code-fence markers, with or without a language tag.
pub fn strip_fences(text: &str) -> String {
    FENCE_RE.replace_all(text, "").into_owned()
}

/// Replace escaped newline sequences (`\n`, `\\n`) with real line breaks.
pub fn unescape_newlines(text: &str) -> String {
    text.replace("\\\\n", "\n").replace("\\n", "\n")
}

/// Collapse every line break into a single space.
pub fn flatten_line_breaks(text: &str) -> String {
    text.replace("\r\n", " ").replace(['\n', '\r'], " ")
}

/// Replace `\"` with `"`.
pub fn unescape_quotes(text: &str) -> String {
    text.replace("\\\"", "\"")
}

/// Rewrite bare `True`, `False` and `None` tokens to their JSON spelling.
///
/// Tokens inside double-quoted strings are left alone, as are identifiers that
/// merely start with one of the keywords (`Trueish`).
pub fn normalize_literals(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut word = String::new();
    let mut in_string = false;
    let mut escaped = false;

    for ch in text.chars() {
        if in_string {
            out.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        if ch.is_alphanumeric() || ch == '_' {
            word.push(ch);
            continue;
        }
        flush_word(&mut out, &mut word);
        if ch == '"' {
            in_string = true;
        }
        out.push(ch);
    }
    flush_word(&mut out, &mut word);
    out
}

fn flush_word(out: &mut String, word: &mut String) {
    let replacement = match word.as_str() {
        "True" => "true",
        "False" => "false",
        "None" => "null",
        other => other,
    };
    out.push_str(replacement);
    word.clear();
}

/// Apply every verdict rule in order.
pub fn normalize_verdict_text(raw: &str) -> String {
    let text = strip_fences(raw);
    let text = unescape_newlines(&text);
    let text = flatten_line_breaks(&text);
    normalize_literals(&text).trim().to_string()
}

/// Clean candidate template text before it is persisted or returned.
pub fn clean_template(raw: &str) -> String {
    let text = strip_fences(raw);
    let text = unescape_newlines(&text);
    unescape_quotes(&text).trim().to_string()
}

#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum Messages {
    #[default]
    Missing,
    One(String),
    Many(Vec<String>),
}

impl Messages {
    fn into_vec(self) -> Vec<String> {
        match self {
            Messages::Missing => Vec::new(),
            Messages::One(message) if message.trim().is_empty() => Vec::new(),
            Messages::One(message) => vec![message],
            Messages::Many(messages) => messages,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawVerdict {
    valid: bool,
    #[serde(default)]
    errors: Messages,
    #[serde(default)]
    suggestions: Messages,
}

/// Normalize and decode agent verdict text.
///
/// `errors` and `suggestions` may be a list, a single string, `null` or absent;
/// `valid` is required.
pub fn decode_verdict(raw: &str) -> Result<ValidationVerdict, DecodeError> {
    let text = normalize_verdict_text(raw);
    if text.is_empty() {
        return Err(DecodeError::Empty);
    }
    let value: Value =
        serde_json::from_str(&text).map_err(|err| DecodeError::Syntax(err.to_string()))?;
    check_schema(&value)?;
    let verdict: RawVerdict =
        serde_json::from_value(value).map_err(|err| DecodeError::Syntax(err.to_string()))?;
    Ok(ValidationVerdict {
        valid: verdict.valid,
        errors: verdict.errors.into_vec(),
        suggestions: verdict.suggestions.into_vec(),
    })
}

fn check_schema(instance: &Value) -> Result<(), DecodeError> {
    let messages: Vec<String> = VERDICT_VALIDATOR
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        return Err(DecodeError::Schema(messages));
    }
    Ok(())
}
