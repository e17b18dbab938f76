//! The analyzer turns raw document or query text into a token sequence.
//!
//! It is deterministic and side-effect-free after the one-time
//! initialization of its static tables (spec §4.10): the same input text
//! always yields the same tokens, and the pipeline used to build the index
//! (`AnalyzerMode::Document`) must be the exact pipeline used at query time
//! for terms to line up.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

/// `\b[a-zA-Z]{2,}\b` — only fully-alphabetic runs of length >= 2 count as
/// words; this is cheaper than a general tokenizer and, for a search index,
/// throwing away punctuation and single letters is exactly what we want.
static WORD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z]{2,}\b").expect("valid regex"));

/// English stop words (a standard NLTK-derived list).
static STOP_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    const WORDS: &[&str] = &[
        "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "you're", "you've",
        "you'll", "you'd", "your", "yours", "yourself", "yourselves", "he", "him", "his",
        "himself", "she", "she's", "her", "hers", "herself", "it", "it's", "its", "itself",
        "they", "them", "their", "theirs", "themselves", "this", "that", "that'll", "these",
        "those", "am", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "having", "do", "does", "did", "doing", "a", "an", "the", "and", "but", "if", "or",
        "because", "as", "until", "while", "of", "at", "by", "for", "with", "about", "against",
        "between", "into", "through", "during", "before", "after", "above", "below", "to",
        "from", "up", "down", "in", "out", "on", "off", "over", "under", "again", "further",
        "then", "once", "here", "there", "all", "any", "both", "each", "few", "more", "most",
        "other", "some", "such", "no", "nor", "not", "only", "own", "same", "so", "than", "too",
        "very", "s", "t", "can", "will", "just", "don", "don't", "should", "should've", "now",
        "d", "ll", "m", "o", "re", "ve", "y", "ain", "what", "which", "who", "whom", "why",
        "how", "when", "where",
    ];
    WORDS.iter().copied().collect()
});

/// Query mode keeps interrogatives in the text (spec §4.10) so a query like
/// "what is pagerank" can still match on "what" if a document happens to
/// contain it verbatim, instead of silently dropping the query's own intent
/// word.
static QUERY_KEEP: &[&str] = &["what", "which", "who", "whom", "why", "how", "when", "where"];

/// Controls which stop-word set the analyzer filters against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalyzerMode {
    /// Used to build the index (spec §3: "the index must be built with the
    /// document mode").
    Document,
    /// Used at query time; keeps interrogatives.
    Query,
}

/// The deterministic token pipeline. Zero-sized: all state is the static
/// regex/stemmer/stop-word tables above, shared and immutable after first
/// use, so `Analyzer` is trivially `Send + Sync`.
#[derive(Debug, Default, Clone, Copy)]
pub struct Analyzer;

impl Analyzer {
    /// `lower-case -> word-boundary split -> stop-word filter -> stem`.
    pub fn analyze(&self, text: &str, mode: AnalyzerMode) -> Vec<String> {
        if text.is_empty() {
            return Vec::new();
        }
        let stemmer = Stemmer::create(Algorithm::English);
        let lower = text.to_lowercase();
        WORD_RE
            .find_iter(&lower)
            .map(|m| m.as_str())
            .filter(|word| !Self::is_stop_word(word, mode))
            .map(|word| stemmer.stem(word).into_owned())
            .collect()
    }

    fn is_stop_word(word: &str, mode: AnalyzerMode) -> bool {
        if mode == AnalyzerMode::Query && QUERY_KEEP.contains(&word) {
            return false;
        }
        STOP_WORDS.contains(word)
    }
}
