//! Vector-space ranking.
//!
//! A document's weight for term `t` is `tf(t) / max_tf(doc) * idf(t)` with
//! `idf(t) = ln(N / df(t))` (or `ln(1 + N / df(t))` when smoothed), where `N`
//! is the number of pages with metadata and `df` the length of the term's
//! posting list. The query is weighted the same way using its own term
//! counts. Pages are scored by the cosine of the two vectors.

use crate::error::Result;
use crate::search::SearchEngine;
use crate::store::{decode_u32, IdSpace, Table};
use crate::tokenizer::query_terms;
use crate::{PageId, SearchHit, WordId};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::debug;

impl SearchEngine {
    /// Tokenize a free-text query and rank pages against it.
    pub fn retrieve_ranked(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.rank_terms(&query_terms(query))
    }

    /// Rank every page containing at least one of `terms`, best first.
    /// Equal scores are ordered by ascending page id.
    pub fn rank_terms<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<SearchHit>> {
        let n = self.page_count()? as f64;
        if n == 0.0 {
            return Ok(Vec::new());
        }

        let mut query_tf: BTreeMap<WordId, u32> = BTreeMap::new();
        for term in terms {
            if let Some(word_id) = self.store.word_id(term.as_ref())? {
                *query_tf.entry(word_id).or_insert(0) += 1;
            }
        }
        let max_query_tf = query_tf.values().copied().max().unwrap_or(1) as f64;

        let mut idf_cache: HashMap<WordId, f64> = HashMap::new();
        let mut query_vec: HashMap<WordId, f64> = HashMap::new();
        let mut candidates: BTreeSet<PageId> = BTreeSet::new();
        for (&word_id, &tf) in &query_tf {
            let postings = self.postings_for(word_id)?;
            if postings.is_empty() {
                continue;
            }
            let idf = self.idf(n, postings.len());
            idf_cache.insert(word_id, idf);
            query_vec.insert(word_id, tf as f64 / max_query_tf * idf);
            candidates.extend(postings);
        }
        let query_norm = query_vec.values().map(|w| w * w).sum::<f64>().sqrt();

        let mut scored: Vec<(PageId, f64)> = Vec::with_capacity(candidates.len());
        for page_id in candidates {
            let score = self.cosine(page_id, n, &query_vec, query_norm, &mut idf_cache)?;
            scored.push((page_id, score));
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal).then(a.0.cmp(&b.0)));
        scored.truncate(self.options.limit);
        debug!(terms = terms.len(), hits = scored.len(), "ranked query");

        scored.into_iter().map(|(page_id, score)| self.hit(page_id, score)).collect()
    }

    fn idf(&self, n: f64, df: usize) -> f64 {
        if df == 0 {
            return 0.0;
        }
        let ratio = n / df as f64;
        let idf = if self.options.smoothed_idf { (1.0 + ratio).ln() } else { ratio.ln() };
        idf.max(0.0)
    }

    fn cosine(
        &self,
        page_id: PageId,
        n: f64,
        query_vec: &HashMap<WordId, f64>,
        query_norm: f64,
        idf_cache: &mut HashMap<WordId, f64>,
    ) -> Result<f64> {
        let mut forward = Vec::new();
        for (word_id, tf) in self.store.scan_pairs(Table::Forward, page_id)? {
            forward.push((word_id, decode_u32(Table::Forward, &tf)?));
        }
        let max_tf = match self.store.get(Table::MaxTf, &page_id.to_be_bytes())? {
            Some(bytes) => decode_u32(Table::MaxTf, &bytes)?,
            None => forward.iter().map(|(_, tf)| *tf).max().unwrap_or(0),
        }
        .max(1) as f64;

        let (mut dot, mut norm_sq) = (0.0, 0.0);
        for (word_id, tf) in forward {
            let idf = match idf_cache.get(&word_id) {
                Some(idf) => *idf,
                None => {
                    let df = self.store.count_pairs(Table::Inverted, word_id)?;
                    let idf = self.idf(n, df);
                    idf_cache.insert(word_id, idf);
                    idf
                }
            };
            let weight = tf as f64 / max_tf * idf;
            norm_sq += weight * weight;
            if let Some(q) = query_vec.get(&word_id) {
                dot += q * weight;
            }
        }
        if norm_sq == 0.0 || query_norm == 0.0 {
            return Ok(0.0);
        }
        Ok(dot / (norm_sq.sqrt() * query_norm))
    }

    fn hit(&self, page_id: PageId, score: f64) -> Result<SearchHit> {
        let (uri, title) = match self.page(page_id)? {
            Some(record) => (record.uri, record.title),
            None => {
                let uri = self.store.lookup_text(page_id, IdSpace::Page)?.unwrap_or_default();
                (uri, String::new())
            }
        };
        let keywords = self.keywords(page_id, self.options.keywords_per_hit)?;
        Ok(SearchHit { page_id, uri, title, score, keywords })
    }
}
