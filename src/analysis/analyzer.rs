//! Analyzer implementations that convert query tokens into index terms.

use std::collections::HashSet;
use std::fmt::Debug;
use std::sync::LazyLock;

use unicode_segmentation::UnicodeSegmentation;

use crate::error::Result;

/// Default English stop words list.
const DEFAULT_ENGLISH_STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is", "it",
    "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there", "these",
    "they", "this", "to", "was", "will", "with",
];

static ENGLISH_STOP_WORDS: LazyLock<HashSet<&'static str>> =
    LazyLock::new(|| DEFAULT_ENGLISH_STOP_WORDS.iter().copied().collect());

/// Trait for analyzers that convert text into index terms.
///
/// A single query token may produce zero terms (a stop word), one term, or
/// several terms (e.g. `near-death` becomes `near` and `death`).
pub trait Analyzer: Send + Sync + Debug {
    /// Analyze the given text and return the resulting terms in order.
    fn analyze(&self, text: &str) -> Result<Vec<String>>;

    /// Get the name of this analyzer (for debugging and configuration).
    fn name(&self) -> &'static str;
}

/// Unicode word segmentation, lowercasing and English stop-word removal.
#[derive(Debug, Clone)]
pub struct StandardAnalyzer {
    stop_words: HashSet<String>,
}

impl Default for StandardAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

impl StandardAnalyzer {
    /// Create a new analyzer with the default English stop words.
    pub fn new() -> Self {
        StandardAnalyzer {
            stop_words: ENGLISH_STOP_WORDS.iter().map(|w| w.to_string()).collect(),
        }
    }

    /// Check whether a (normalized) word is a stop word.
    pub fn is_stop_word(&self, word: &str) -> bool {
        self.stop_words.contains(word)
    }
}

impl Analyzer for StandardAnalyzer {
    fn analyze(&self, text: &str) -> Result<Vec<String>> {
        let terms = text
            .unicode_words()
            .map(str::to_lowercase)
            .filter(|word| !self.is_stop_word(word))
            .collect();

        Ok(terms)
    }

    fn name(&self) -> &'static str {
        "standard"
    }
}
