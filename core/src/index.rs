use crate::tokenizer::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub type PageId = u64;
pub type WordId = u64;

/// A parsed web document ready for ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Document {
    pub uri: String,
    pub title: String,
    pub terms: HashMap<String, u32>,
    pub max_tf: u32,
    /// Ascending token offsets of every term, in document order.
    #[serde(default)]
    pub positions: HashMap<String, Vec<u32>>,
}

impl Document {
    pub fn new(
        uri: impl Into<String>,
        title: impl Into<String>,
        terms: HashMap<String, u32>,
    ) -> Self {
        let max_tf = terms.values().copied().max().unwrap_or(0);
        Self { uri: uri.into(), title: title.into(), terms, max_tf, positions: HashMap::new() }
    }

    /// Build a document by running the body through the tokenizer.
    pub fn from_text(uri: impl Into<String>, title: impl Into<String>, body: &str) -> Self {
        let mut terms: HashMap<String, u32> = HashMap::new();
        let mut positions: HashMap<String, Vec<u32>> = HashMap::new();
        for (term, pos) in tokenize(body) {
            *terms.entry(term.clone()).or_insert(0) += 1;
            positions.entry(term).or_default().push(pos as u32);
        }
        let mut doc = Self::new(uri, title, terms);
        doc.positions = positions;
        doc
    }

    pub fn with_positions(mut self, positions: HashMap<String, Vec<u32>>) -> Self {
        self.positions = positions;
        self
    }

    pub(crate) fn record(&self) -> PageRecord {
        PageRecord { uri: self.uri.clone(), title: self.title.clone(), max_tf: self.max_tf }
    }
}

/// Metadata kept per page for materializing results.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub uri: String,
    pub title: String,
    pub max_tf: u32,
}

/// Two adjacent query terms, in query order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Bigram {
    pub first: String,
    pub second: String,
}

/// One ranked result.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub page_id: PageId,
    pub uri: String,
    pub title: String,
    pub score: f64,
    pub keywords: Vec<(String, u32)>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_text_counts_terms_and_offsets() {
        let doc = Document::from_text("u", "t", "fox jumps over the fox");
        assert_eq!(doc.terms["fox"], 2);
        assert_eq!(doc.max_tf, 2);
        // "over" and "the" are stop words but still consume offsets
        assert_eq!(doc.positions["fox"], vec![0, 4]);
        assert_eq!(doc.positions["jump"], vec![1]);
    }

    #[test]
    fn new_derives_max_tf() {
        let terms = HashMap::from([("a".to_string(), 3), ("b".to_string(), 7)]);
        assert_eq!(Document::new("u", "t", terms).max_tf, 7);
        assert_eq!(Document::new("u", "t", HashMap::new()).max_tf, 0);
    }
}
