use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use docgraph_core::error::{DocGraphError, Result};
use docgraph_core::extraction::EntityExtractor;

static ASCII_LETTER_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("[A-Za-z]+").expect("static pattern compiles"));

/// Lexical stand-in for NER: any maximal run of ASCII letters that starts with
/// an uppercase letter and is at least two letters long.
///
/// Position in the sentence is ignored, so a sentence-initial "The" is an
/// entity just like "Paris". Non-ASCII letters end a run ("JoséMaría" yields
/// "Jos" and "Mar").
#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalizedWordExtractor;

impl CapitalizedWordExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl EntityExtractor for CapitalizedWordExtractor {
    fn name(&self) -> &str {
        "capitalized_words"
    }

    fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        // NUL only shows up when binary garbage leaked through text extraction.
        if let Some(pos) = text.find('\0') {
            return Err(DocGraphError::Extraction(format!(
                "chunk contains a NUL character at byte {pos}"
            )));
        }

        Ok(ASCII_LETTER_RUN
            .find_iter(text)
            .map(|m| m.as_str())
            .filter(|word| word.len() >= 2 && word.starts_with(|c: char| c.is_ascii_uppercase()))
            .map(str::to_string)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extract(text: &str) -> Vec<String> {
        CapitalizedWordExtractor::new()
            .extract(text)
            .unwrap()
            .into_iter()
            .collect()
    }

    #[test]
    fn test_reference_sentence() {
        assert_eq!(
            extract("Alice met Bob near the Eiffel Tower."),
            vec!["Alice", "Bob", "Eiffel", "Tower"]
        );
    }

    #[test]
    fn test_sentence_initial_words_are_candidates() {
        assert_eq!(extract("The cat sat. Then it left."), vec!["The", "Then"]);
    }

    #[test]
    fn test_single_letters_are_skipped() {
        assert_eq!(extract("I saw A and B with Al."), vec!["Al"]);
    }

    #[test]
    fn test_duplicates_collapse() {
        assert_eq!(extract("Alice, Alice and ALICE"), vec!["ALICE", "Alice"]);
    }

    #[test]
    fn test_runs_are_maximal_ascii_letters() {
        assert_eq!(extract("McDonald's R2D2 Abc1def"), vec!["Abc", "McDonald"]);
        assert_eq!(extract("JoséMaría"), vec!["Jos", "Mar"]);
    }

    #[test]
    fn test_no_candidates() {
        assert!(extract("all lowercase, 123 and punctuation!").is_empty());
        assert!(extract("").is_empty());
    }

    #[test]
    fn test_nul_character_is_an_extraction_error() {
        let result = CapitalizedWordExtractor::new().extract("Alice\0Bob");
        assert!(matches!(result, Err(DocGraphError::Extraction(_))));
    }

    #[test]
    fn test_closure_extractor() {
        let upper_only = |text: &str| -> BTreeSet<String> {
            text.split_whitespace()
                .filter(|w| w.chars().all(|c| c.is_ascii_uppercase()))
                .map(str::to_string)
                .collect()
        };
        let found = upper_only.extract("NASA and ESA met Bob").unwrap();
        assert_eq!(found.into_iter().collect::<Vec<_>>(), vec!["ESA", "NASA"]);
    }
}
