use crate::error::Result;
use crate::search::{intersect_sorted, SearchEngine};
use crate::{Bigram, PageId};

/// Adjacent pairs of a query, in order. Fewer than two terms give none.
pub fn split_to_bigrams<S: AsRef<str>>(terms: &[S]) -> Vec<Bigram> {
    terms
        .windows(2)
        .map(|pair| Bigram {
            first: pair[0].as_ref().to_string(),
            second: pair[1].as_ref().to_string(),
        })
        .collect()
}

impl SearchEngine {
    /// Pages where `bigram.second` occurs at the offset right after an
    /// occurrence of `bigram.first`, ascending.
    pub fn has_phrase(&self, bigram: &Bigram) -> Result<Vec<PageId>> {
        let candidates = self.boolean_filter(&[bigram.first.as_str(), bigram.second.as_str()])?;
        let mut out = Vec::new();
        for page_id in candidates {
            let first = self.store.position_indices(page_id, &bigram.first)?;
            // shift the second term back one slot so adjacent offsets line up
            let second: Vec<u32> = self
                .store
                .position_indices(page_id, &bigram.second)?
                .into_iter()
                .filter_map(|pos| pos.checked_sub(1))
                .collect();
            if !intersect_sorted(&first, &second).is_empty() {
                out.push(page_id);
            }
        }
        Ok(out)
    }

    /// Pages containing `terms` as a contiguous, ordered phrase.
    pub fn search_phrase<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<PageId>> {
        if terms.len() <= 1 {
            return self.boolean_filter(terms);
        }
        let mut per_bigram = split_to_bigrams(terms)
            .iter()
            .map(|bigram| self.has_phrase(bigram))
            .collect::<Result<Vec<_>>>()?;
        // most selective bigram first
        per_bigram.sort_by_key(Vec::len);

        let mut sets = per_bigram.into_iter();
        let mut result = sets.next().unwrap_or_default();
        for set in sets {
            if result.is_empty() {
                break;
            }
            result = intersect_sorted(&result, &set);
        }
        Ok(result)
    }
}
