//! Post-processing: turn the raw enrichment reply into validated records.
//!
//! Even a well-prompted model sometimes wraps its JSON in ```` ```json ````
//! fences, prefixes a BOM, or returns a number where a string was asked
//! for. The rules here fix those quirks deterministically so the prompt
//! can stay focused on the content.
//!
//! Rules (applied in order):
//! 1. Strip invisible Unicode (BOM, zero-width spaces)
//! 2. Strip outer code fences
//! 3. Parse JSON; anything but an array is rejected
//! 4. Every element must be an object; scalar fields are stringified
//! 5. Trim fields and normalise line endings
//! 6. Drop records with neither a term nor a translation

use crate::error::CardError;
use crate::record::WordRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Parse the model output into displayable records.
pub fn parse_records(raw: &str) -> Result<Vec<WordRecord>, CardError> {
    let cleaned = remove_invisible_chars(raw);
    let body = strip_code_fences(&cleaned);

    let value: Value = serde_json::from_str(body.trim()).map_err(|e| {
        CardError::MalformedResponse {
            detail: format!("not valid JSON ({e}); reply began with {:?}", preview(body.trim())),
        }
    })?;

    let items = match value {
        Value::Array(items) => items,
        other => {
            return Err(CardError::MalformedResponse {
                detail: format!("expected a JSON array, got {}", json_kind(&other)),
            })
        }
    };

    let mut records = Vec::with_capacity(items.len());
    for (i, item) in items.into_iter().enumerate() {
        let obj = match item {
            Value::Object(obj) => obj,
            other => {
                return Err(CardError::MalformedResponse {
                    detail: format!(
                        "element {} is {}, expected an object",
                        i + 1,
                        json_kind(&other)
                    ),
                })
            }
        };
        let record = record_from_object(&obj);
        if record.is_displayable() {
            records.push(record);
        } else {
            warn!("Dropping enrichment element {}: no term and no translation", i + 1);
        }
    }

    if records.is_empty() {
        return Err(CardError::MalformedResponse {
            detail: "the reply contained no displayable records".into(),
        });
    }

    debug!("Parsed {} records from enrichment reply", records.len());
    Ok(records)
}

// ── Rule 1: Strip invisible Unicode ──────────────────────────────────────────

fn remove_invisible_chars(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{FEFF}' | '\u{200B}' | '\u{200C}' | '\u{200D}' | '\u{2060}'))
        .collect()
}

// ── Rule 2: Strip outer code fences ──────────────────────────────────────────

static RE_OUTER_FENCES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)^```[A-Za-z]*[ \t]*\r?\n(.*?)\r?\n?```\s*$").unwrap());

fn strip_code_fences(input: &str) -> &str {
    let trimmed = input.trim();
    match RE_OUTER_FENCES.captures(trimmed).and_then(|c| c.get(1)) {
        Some(m) => m.as_str(),
        None => trimmed,
    }
}

// ── Rules 4–5: Field extraction ──────────────────────────────────────────────

fn record_from_object(obj: &Map<String, Value>) -> WordRecord {
    WordRecord {
        english_term: field(obj, "englishTerm"),
        phonetic_uk: field(obj, "phoneticUK"),
        phonetic_us: field(obj, "phoneticUS"),
        chinese_translation: field(obj, "chineseTranslation"),
        chinese_explanation: field(obj, "chineseExplanation"),
    }
}

fn field(obj: &Map<String, Value>, key: &str) -> String {
    let raw = match obj.get(key) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Array(parts)) => parts
            .iter()
            .filter_map(|p| p.as_str())
            .collect::<Vec<_>>()
            .join("\n"),
        Some(Value::Null) | Some(Value::Object(_)) | None => String::new(),
    };
    raw.replace("\r\n", "\n").trim().to_string()
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

fn preview(s: &str) -> String {
    s.chars().take(40).collect()
}
