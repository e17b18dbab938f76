//! Shared data model for the indexing and PageRank pipelines.
//!
//! Types here are intentionally dumb: parsing/validation lives close to the
//! wire (JSON lines, TSV edges), while the pipelines operate on the
//! normalized forms defined below.
#![deny(rustdoc::broken_intra_doc_links, rustdoc::bare_urls, rust_2018_idioms)]
#![warn(missing_debug_implementations, clippy::clone_on_ref_ptr)]

use std::collections::BTreeMap;

use observability_deps::tracing::debug;
use serde::{Deserialize, Serialize};

/// An inverted-index term longer than this is discarded as garbage (spec §3).
pub const MAX_TERM_BYTES: usize = 512;

/// A document record as it appears, one per line, in the input corpus file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub out_links: Vec<String>,
}

/// A [`DocumentRecord`] after identifier canonicalization and self-loop
/// removal. The mapper, stats writer and graph loader all consume this form
/// so canonicalization never has to be repeated (or re-implemented slightly
/// differently) downstream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedDocument {
    pub id: String,
    pub text: String,
    pub out_links: Vec<String>,
}

/// Trim surrounding whitespace and collapse internal whitespace runs to a
/// single `_`, per spec §3's identifier canonicalization rule.
pub fn canonicalize_id(raw: &str) -> String {
    raw.trim().split_whitespace().collect::<Vec<_>>().join("_")
}

impl From<DocumentRecord> for NormalizedDocument {
    fn from(record: DocumentRecord) -> Self {
        let id = canonicalize_id(&record.id);
        let before = record.out_links.len();
        let out_links: Vec<String> = record
            .out_links
            .into_iter()
            .map(|t| canonicalize_id(&t))
            .filter(|t| t != &id)
            .collect();
        if out_links.len() != before {
            debug!(doc_id = %id, "dropped self-loop out-link(s)");
        }
        Self {
            id,
            text: record.text,
            out_links,
        }
    }
}

/// One `(term, doc_id, tf)` tuple as written to a shuffle partition file
/// (spec §4.2). `bincode`-encoded; order within a file is by `term`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShuffleTuple {
    pub term: String,
    pub doc_id: String,
    pub tf: u32,
}

/// A row of the `inverted_index` table (spec §6).
///
/// Invariant: `df == postings.len()`. `postings` is a `BTreeMap` rather than
/// a `HashMap` so the JSON emitted for the `postings` column is
/// deterministic, which the round-trip idempotence tests in spec §8 rely on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvertedIndexRow {
    pub term: String,
    pub df: i64,
    pub postings: BTreeMap<String, i64>,
}

impl InvertedIndexRow {
    pub fn new(term: String, postings: BTreeMap<String, i64>) -> Self {
        let df = postings.len() as i64;
        Self { term, df, postings }
    }

    /// `true` if this row should be discarded per spec §3/§4.5 (oversize term).
    pub fn is_oversize(term: &str) -> bool {
        term.len() > MAX_TERM_BYTES
    }
}

/// A row of the `pagerank` table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RankRow {
    pub doc_id: String,
    pub score: f64,
}

impl RankRow {
    pub fn new(doc_id: impl Into<String>, score: f64) -> Self {
        Self {
            doc_id: doc_id.into(),
            score,
        }
    }
}

/// A row of the `metadata` table (spec §4.11 / §6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRow {
    pub doc_id: String,
    pub length: i64,
    pub text: String,
}

/// Remove embedded NUL bytes, which Postgres `TEXT` columns reject outright.
pub fn clean_text(text: &str) -> String {
    if text.contains('\0') {
        text.replace('\0', "")
    } else {
        text.to_string()
    }
}

/// A row of the `config` table. Only `avgdl` is required by the core, but
/// the type is generic over any `key`/`value` pair the store might hold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConfigRow {
    pub key_hash: ConfigKey,
    pub value: f64,
}

/// Well-known config keys. A newtype instead of a bare `&'static str` so a
/// typo in a key name is a compile error, not a silent cache miss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConfigKey {
    AverageDocumentLength,
}

impl ConfigKey {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AverageDocumentLength => "avgdl",
        }
    }
}

/// An edge in the link graph, parsed from one `source\ttarget` line of the
/// edge-list file (spec §6). Self-edges are rejected at parse time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Edge {
    pub source: String,
    pub target: String,
}

impl Edge {
    /// Parse a single edge-list line. Returns `None` for blank lines,
    /// malformed lines (not exactly `source\ttarget`), and self-edges.
    pub fn parse_line(line: &str) -> Option<Self> {
        let mut parts = line.split('\t');
        let source = parts.next()?.trim();
        let target = parts.next()?.trim();
        if parts.next().is_some() || source.is_empty() || target.is_empty() {
            return None;
        }
        if source == target {
            return None;
        }
        Some(Self {
            source: source.to_string(),
            target: target.to_string(),
        })
    }
}

/// A node in the link graph, as held by the graph loader and PageRank
/// workers. `out_degree == 0` makes a node dangling (spec §3).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub out_links: Vec<String>,
}

impl GraphNode {
    pub fn out_degree(&self) -> usize {
        self.out_links.len()
    }

    pub fn is_dangling(&self) -> bool {
        self.out_links.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalizes_whitespace() {
        assert_eq!(canonicalize_id("  doc   one  "), "doc_one");
        assert_eq!(canonicalize_id("doc1"), "doc1");
    }

    #[test]
    fn drops_self_loops() {
        let record = DocumentRecord {
            id: "d1".into(),
            text: String::new(),
            out_links: vec!["d1".into(), "d2".into(), " d1 ".into()],
        };
        let normalized: NormalizedDocument = record.into();
        assert_eq!(normalized.out_links, vec!["d2".to_string()]);
    }

    #[test]
    fn inverted_index_row_df_matches_postings() {
        let mut postings = BTreeMap::new();
        postings.insert("d1".to_string(), 3);
        postings.insert("d2".to_string(), 1);
        let row = InvertedIndexRow::new("cat".into(), postings);
        assert_eq!(row.df, 2);
    }

    #[test]
    fn oversize_term_detected() {
        let term = "a".repeat(513);
        assert!(InvertedIndexRow::is_oversize(&term));
        assert!(!InvertedIndexRow::is_oversize(&"a".repeat(512)));
    }

    #[test]
    fn edge_parsing_rejects_self_edges_and_malformed_lines() {
        assert_eq!(
            Edge::parse_line("a\tb"),
            Some(Edge {
                source: "a".into(),
                target: "b".into()
            })
        );
        assert_eq!(Edge::parse_line("a\ta"), None);
        assert_eq!(Edge::parse_line("a"), None);
        assert_eq!(Edge::parse_line(""), None);
    }

    #[test]
    fn clean_text_strips_nul_bytes() {
        assert_eq!(clean_text("hello\0world"), "helloworld");
        assert_eq!(clean_text("plain"), "plain");
    }
}
