//! Input parsing: raw text → one record, or raw text → word tokens.
//!
//! Two input shapes exist:
//!
//! * A **single entry** typed by hand, one field per line:
//!
//!   ```text
//!   apple
//!   /ˈæp.əl/, /ˈæp.əl/
//!   n. 苹果
//!   一种常见的水果。
//!   ```
//!
//! * A **word list** for batch enrichment: `apple, banana; take off`.
//!
//! Parsing never fails. Whether the result is usable is decided by the
//! `validate_*` functions, so the caller can reject input before any
//! network call is made.

use crate::error::CardError;
use crate::record::WordRecord;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static RE_PHONETIC_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,，]").unwrap());

static RE_TOKEN_SPLIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"[,，;；\r\n]").unwrap());

/// Parse a hand-typed entry by line position.
///
/// | Line | Field |
/// |------|-------|
/// | 1    | `english_term` |
/// | 2    | `phonetic_uk`, `phonetic_us` (comma separated, ASCII or full-width) |
/// | 3    | `chinese_translation` |
/// | 4+   | `chinese_explanation` (line breaks kept) |
pub fn parse_single(text: &str) -> WordRecord {
    let normalised = text.replace("\r\n", "\n");
    let lines: Vec<&str> = normalised.split('\n').collect();
    let line = |i: usize| lines.get(i).map(|l| l.trim()).unwrap_or("");

    let mut phonetics = RE_PHONETIC_SPLIT
        .split(line(1))
        .map(str::trim)
        .filter(|p| !p.is_empty());
    let phonetic_uk = phonetics.next().unwrap_or("").to_string();
    let phonetic_us = phonetics.next().unwrap_or("").to_string();

    let chinese_explanation = if lines.len() > 3 {
        lines[3..].join("\n").trim().to_string()
    } else {
        String::new()
    };

    WordRecord {
        english_term: line(0).to_string(),
        phonetic_uk,
        phonetic_us,
        chinese_translation: line(2).to_string(),
        chinese_explanation,
    }
}

/// Split a word list into trimmed, non-empty tokens.
///
/// Commas and semicolons (ASCII and full-width) and line breaks all
/// separate tokens; spaces inside a token are kept so phrases survive.
pub fn parse_tokens(text: &str) -> Vec<String> {
    let tokens: Vec<String> = RE_TOKEN_SPLIT
        .split(text)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect();
    debug!("Parsed {} tokens", tokens.len());
    tokens
}

/// Parse and validate a hand-typed entry.
pub fn validate_single(text: &str) -> Result<WordRecord, CardError> {
    if text.trim().is_empty() {
        return Err(CardError::validation(
            "please enter some text into the input field",
        ));
    }
    let record = parse_single(text);
    if !record.is_displayable() {
        return Err(CardError::validation(
            "couldn't extract an English term or Chinese translation; \
line 1 is the term and line 3 the translation",
        ));
    }
    Ok(record)
}

/// Parse and validate a word list for enrichment.
pub fn validate_tokens(text: &str) -> Result<Vec<String>, CardError> {
    let tokens = parse_tokens(text);
    if tokens.is_empty() {
        return Err(CardError::validation(
            "nothing to generate; enter words separated by commas or semicolons",
        ));
    }
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_full_entry() {
        let r = parse_single("  apple \n/ˈæp.əl/ ，/ˈæp.əl/\nn. 苹果\n一种水果。\n\n常见于秋季。");
        assert_eq!(r.english_term, "apple");
        assert_eq!(r.phonetic_uk, "/ˈæp.əl/");
        assert_eq!(r.phonetic_us, "/ˈæp.əl/");
        assert_eq!(r.chinese_translation, "n. 苹果");
        assert_eq!(r.chinese_explanation, "一种水果。\n\n常见于秋季。");
    }

    #[test]
    fn single_extra_phonetics_discarded() {
        let r = parse_single("word\na, b, c\n词");
        assert_eq!(r.phonetic_uk, "a");
        assert_eq!(r.phonetic_us, "b");
        assert_eq!(r.chinese_explanation, "");
    }

    #[test]
    fn single_missing_lines_default_empty() {
        let r = parse_single("only");
        assert_eq!(r.english_term, "only");
        assert_eq!(r.phonetic_uk, "");
        assert_eq!(r.phonetic_us, "");
        assert_eq!(r.chinese_translation, "");
    }

    #[test]
    fn single_recovers_term_and_translation_from_three_lines() {
        for text in [
            "run\n/rʌn/\n跑",
            " run  \r\n/rʌn/, /rʌn/\r\n  跑 \r\nextra",
            "take off\n\n起飞\n",
        ] {
            let first = text.replace("\r\n", "\n");
            let lines: Vec<&str> = first.split('\n').collect();
            let r = parse_single(text);
            assert_eq!(r.english_term, lines[0].trim());
            assert_eq!(r.chinese_translation, lines[2].trim());
        }
    }

    #[test]
    fn tokens_drop_empty_segments() {
        assert_eq!(parse_tokens("a, b ,, c"), vec!["a", "b", "c"]);
        assert_eq!(
            parse_tokens("apple；banana;take off，\nkiwi"),
            vec!["apple", "banana", "take off", "kiwi"]
        );
        assert!(parse_tokens(" , ; ").is_empty());
    }

    #[test]
    fn validate_rejects_blank_and_unusable() {
        assert!(matches!(
            validate_single("   \n  "),
            Err(CardError::Validation { .. })
        ));
        // Phonetics alone are not displayable.
        assert!(matches!(
            validate_single("\n/rʌn/\n"),
            Err(CardError::Validation { .. })
        ));
        assert!(validate_single("\n\n跑").is_ok());
        assert!(matches!(
            validate_tokens(",,;"),
            Err(CardError::Validation { .. })
        ));
        assert_eq!(validate_tokens("x").unwrap(), vec!["x"]);
    }
}
