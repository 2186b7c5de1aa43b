//! Text normalization for free-text spreadsheet fields
//!
//! The synonym tables are loaded once by the caller and handed to
//! [`normalize_token`] explicitly; nothing here holds global state.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Canonical spelling for a lower-cased token
pub type SynonymMap = HashMap<String, String>;

/// Synonym tables for the two tokenized free-text fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Synonyms {
    #[serde(default)]
    pub technologies: SynonymMap,
    #[serde(default)]
    pub skills: SynonymMap,
}

impl Synonyms {
    /// Load synonym tables from a JSON side file
    ///
    /// A missing file is not an error: it yields empty tables so the
    /// pipeline runs without a taxonomy.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No synonyms file, using empty tables");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path)?;
        let synonyms: Synonyms = serde_json::from_str(&raw)?;
        tracing::debug!(
            technologies = synonyms.technologies.len(),
            skills = synonyms.skills.len(),
            "Loaded synonym tables"
        );
        Ok(synonyms)
    }
}

/// Trim and collapse internal whitespace runs to a single space
pub fn clean_string(value: &str) -> String {
    value.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Lower-case a token, strip surrounding punctuation and map it through
/// the synonym table
pub fn normalize_token(token: &str, synonyms: &SynonymMap) -> String {
    let lowered = token.trim().to_lowercase();
    let stripped = lowered.trim_matches(|c: char| !(c.is_alphanumeric() || c == '_' || c.is_whitespace()));

    match synonyms.get(stripped) {
        Some(canonical) => canonical.clone(),
        None => stripped.to_string(),
    }
}

/// Split a delimited field into trimmed, non-empty tokens
pub fn tokenize_field(value: &str, delimiter: char) -> Vec<String> {
    value
        .split(delimiter)
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_string)
        .collect()
}

/// Tokenize a field and canonicalize every token, dropping duplicates while
/// keeping first-seen order
pub fn canonical_tokens(value: &str, delimiter: char, synonyms: &SynonymMap) -> Vec<String> {
    let mut seen = std::collections::HashSet::new();
    tokenize_field(value, delimiter)
        .iter()
        .map(|token| normalize_token(token, synonyms))
        .filter(|token| !token.is_empty() && seen.insert(token.clone()))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_clean_string_collapses_whitespace() {
        assert_eq!(clean_string("  Project \t  Title \n"), "Project Title");
        assert_eq!(clean_string(""), "");
        assert_eq!(clean_string("   "), "");
    }

    #[test]
    fn test_normalize_token_strips_punctuation_and_maps() {
        let mut synonyms = SynonymMap::new();
        synonyms.insert("reactjs".to_string(), "react".to_string());

        assert_eq!(normalize_token("  ReactJS. ", &synonyms), "react");
        assert_eq!(normalize_token("(Python)", &synonyms), "python");
        assert_eq!(normalize_token("node.js", &synonyms), "node.js");
        assert_eq!(normalize_token("", &synonyms), "");
    }

    #[test]
    fn test_tokenize_field_drops_empty_tokens() {
        assert_eq!(tokenize_field("rust, ,go,, python ", ','), vec!["rust", "go", "python"]);
        assert!(tokenize_field("", ',').is_empty());
    }

    #[test]
    fn test_canonical_tokens_dedupes_after_mapping() {
        let mut synonyms = SynonymMap::new();
        synonyms.insert("js".to_string(), "javascript".to_string());

        let tokens = canonical_tokens("JavaScript; js; Rust", ';', &synonyms);
        assert_eq!(tokens, vec!["javascript", "rust"]);
    }

    #[test]
    fn test_load_missing_file_yields_empty_tables() {
        let synonyms = Synonyms::load("/no/such/synonyms.json").unwrap();
        assert!(synonyms.technologies.is_empty());
        assert!(synonyms.skills.is_empty());
    }

    #[test]
    fn test_load_partial_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("synonyms.json");
        std::fs::write(&path, r#"{"skills": {"ml": "machine learning"}}"#).unwrap();

        let synonyms = Synonyms::load(&path).unwrap();
        assert!(synonyms.technologies.is_empty());
        assert_eq!(synonyms.skills.get("ml").map(String::as_str), Some("machine learning"));
    }

    proptest! {
        #[test]
        fn prop_clean_string_is_idempotent(s in "\\PC*") {
            let once = clean_string(&s);
            prop_assert_eq!(clean_string(&once), once.clone());
        }

        #[test]
        fn prop_clean_string_has_no_edge_or_double_spaces(s in "[ a-z\\t\\n]{0,40}") {
            let cleaned = clean_string(&s);
            prop_assert!(!cleaned.starts_with(' '));
            prop_assert!(!cleaned.ends_with(' '));
            prop_assert!(!cleaned.contains("  "));
        }
    }
}
