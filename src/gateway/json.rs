//! Deterministic cleanup of model text before JSON parsing.
//!
//! Even with a response format attached, models and proxies occasionally
//! return the object wrapped in artefacts:
//!
//! - ` ```json ... ``` ` fences despite the prompt saying "no fences"
//! - a leading sentence ("Here is the extracted data:") before the object
//! - a BOM or zero-width characters copied from the source text
//!
//! The rules below remove those wrappers without touching the object itself.
//! Whether the object then satisfies the schema is the agent's decision, not
//! this module's.

use crate::error::ProviderError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

/// Parse the JSON object contained in a model reply.
///
/// Rules (applied in order):
/// 1. Strip invisible Unicode (BOM, zero-width spaces and joiners)
/// 2. Strip outer Markdown fences
/// 3. Parse the remaining text as JSON
/// 4. If that fails, parse the outermost `{ … }` span
pub fn extract_json(text: &str) -> Result<Value, ProviderError> {
    let cleaned = remove_invisible_chars(text);
    let cleaned = strip_code_fences(cleaned.trim());
    let cleaned = cleaned.trim();

    if cleaned.is_empty() {
        return Err(ProviderError::EmptyResponse);
    }

    match serde_json::from_str::<Value>(cleaned) {
        Ok(v) => Ok(v),
        Err(first_err) => {
            if let Some(span) = outermost_object(cleaned) {
                if let Ok(v) = serde_json::from_str::<Value>(span) {
                    return Ok(v);
                }
            }
            Err(ProviderError::MalformedResponse {
                detail: format!("{first_err}. Content preview: '{}'", preview(cleaned, 100)),
            })
        }
    }
}

// ── Rule 1: Strip invisible characters ───────────────────────────────────────

static RE_INVISIBLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\x{FEFF}\x{200B}\x{200C}\x{200D}\x{2060}]").unwrap());

fn remove_invisible_chars(input: &str) -> String {
    RE_INVISIBLE.replace_all(input, "").into_owned()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)\r?\n?```$").unwrap());

fn strip_code_fences(input: &str) -> &str {
    match RE_OUTER_FENCES.captures(input).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => input,
    }
}

// ── Rule 4: Outermost object span ────────────────────────────────────────────

fn outermost_object(input: &str) -> Option<&str> {
    let start = input.find('{')?;
    let end = input.rfind('}')?;
    (end > start).then(|| &input[start..=end])
}

fn preview(input: &str, max_chars: usize) -> String {
    if input.chars().count() > max_chars {
        let cut: String = input.chars().take(max_chars).collect();
        format!("{cut}...")
    } else {
        input.to_string()
    }
}
