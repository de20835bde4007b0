//! The vocabulary record that every card is built from.

use serde::{Deserialize, Serialize};

/// One vocabulary entry: term, phonetics, translation, explanation.
///
/// Records are immutable once built; regenerating a batch replaces them
/// wholesale. The JSON field names are the exact names the enrichment
/// service is asked to produce.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WordRecord {
    pub english_term: String,
    #[serde(rename = "phoneticUK")]
    pub phonetic_uk: String,
    #[serde(rename = "phoneticUS")]
    pub phonetic_us: String,
    pub chinese_translation: String,
    pub chinese_explanation: String,
}

impl WordRecord {
    /// A record can be shown on a card when it has a term or a translation.
    pub fn is_displayable(&self) -> bool {
        !self.english_term.trim().is_empty() || !self.chinese_translation.trim().is_empty()
    }

    /// `UK: …, US: …` with only the parts that are present.
    pub fn phonetics_line(&self) -> Option<String> {
        let mut parts = Vec::with_capacity(2);
        if !self.phonetic_uk.trim().is_empty() {
            parts.push(format!("UK: {}", self.phonetic_uk.trim()));
        }
        if !self.phonetic_us.trim().is_empty() {
            parts.push(format!("US: {}", self.phonetic_us.trim()));
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join(", "))
        }
    }

    /// Label used in logs and progress lines.
    pub fn label(&self) -> &str {
        if self.english_term.trim().is_empty() {
            self.chinese_translation.trim()
        } else {
            self.english_term.trim()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialises_with_service_field_names() {
        let r = WordRecord {
            english_term: "apple".into(),
            phonetic_uk: "/ˈæp.əl/".into(),
            phonetic_us: "/ˈæp.əl/".into(),
            chinese_translation: "苹果".into(),
            chinese_explanation: "一种水果".into(),
        };
        let v = serde_json::to_value(&r).unwrap();
        let obj = v.as_object().unwrap();
        let mut keys: Vec<&str> = obj.keys().map(|k| k.as_str()).collect();
        keys.sort_unstable();
        assert_eq!(
            keys,
            vec![
                "chineseExplanation",
                "chineseTranslation",
                "englishTerm",
                "phoneticUK",
                "phoneticUS"
            ]
        );
    }

    #[test]
    fn displayable_needs_term_or_translation() {
        assert!(!WordRecord::default().is_displayable());
        let only_translation = WordRecord {
            chinese_translation: "苹果".into(),
            ..Default::default()
        };
        assert!(only_translation.is_displayable());
        let blank_term = WordRecord {
            english_term: "   ".into(),
            phonetic_uk: "x".into(),
            ..Default::default()
        };
        assert!(!blank_term.is_displayable());
    }

    #[test]
    fn phonetics_line_joins_present_parts() {
        let mut r = WordRecord::default();
        assert_eq!(r.phonetics_line(), None);
        r.phonetic_us = "/tə'meɪtoʊ/".into();
        assert_eq!(r.phonetics_line().as_deref(), Some("US: /tə'meɪtoʊ/"));
        r.phonetic_uk = "/tə'mɑːtəʊ/".into();
        assert_eq!(
            r.phonetics_line().as_deref(),
            Some("UK: /tə'mɑːtəʊ/, US: /tə'meɪtoʊ/")
        );
    }
}
