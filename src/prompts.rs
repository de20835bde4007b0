//! System prompt for the enrichment call.
//!
//! Every prompt lives here so the wording can change without touching the
//! request or validation logic in [`crate::pipeline::llm`]. Callers can
//! override the default via [`crate::config::CardConfig::system_prompt`].

/// Default system prompt for expanding word tokens into card records.
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a bilingual English–Chinese lexicographer preparing vocabulary cards.

For every English word or phrase you receive, produce exactly one record.

Rules:
1. Output a JSON array with one object per input word, in the same order.
2. Each object has exactly these string fields:
   - "englishTerm": the word or phrase as given (fix obvious typos only)
   - "phoneticUK": British IPA transcription between slashes, e.g. /ˈæp.əl/
   - "phoneticUS": American IPA transcription between slashes
   - "chineseTranslation": a concise Simplified Chinese translation (part of speech prefix allowed, e.g. "n. 苹果")
   - "chineseExplanation": one or two short Simplified Chinese sentences explaining usage; use \n between sentences
3. Use an empty string for any field you cannot fill. Never omit a field.
4. Output ONLY the JSON array. Do NOT wrap it in ```json fences. Do NOT add commentary."#;

/// Build the user message listing the words to enrich.
pub fn enrichment_request(tokens: &[String]) -> String {
    let listed = tokens
        .iter()
        .enumerate()
        .map(|(i, t)| format!("{}. {}", i + 1, t))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Create {} vocabulary records for these words:\n{}\n\nReturn a JSON array of {} objects.",
        tokens.len(),
        listed,
        tokens.len()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_names_every_field() {
        for field in [
            "englishTerm",
            "phoneticUK",
            "phoneticUS",
            "chineseTranslation",
            "chineseExplanation",
        ] {
            assert!(DEFAULT_SYSTEM_PROMPT.contains(field), "missing {field}");
        }
    }

    #[test]
    fn request_lists_all_tokens_in_order() {
        let tokens = vec!["apple".to_string(), "take off".to_string()];
        let msg = enrichment_request(&tokens);
        assert!(msg.contains("1. apple\n2. take off"));
        assert!(msg.contains("JSON array of 2 objects"));
    }
}
