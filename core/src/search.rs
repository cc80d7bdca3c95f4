use crate::config::{RankingOptions, StoreConfig};
use crate::error::Result;
use crate::store::{decode_u32, IdSpace, Store, Table};
use crate::{PageId, PageRecord, WordId};

/// Read side of the index: boolean, phrase and ranked retrieval.
pub struct SearchEngine {
    pub(crate) store: Store,
    pub(crate) options: RankingOptions,
}

/// Intersect two ascending sequences with a two-pointer merge.
pub fn intersect_sorted<T: Ord + Copy>(a: &[T], b: &[T]) -> Vec<T> {
    let mut out = Vec::with_capacity(a.len().min(b.len()));
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        match a[i].cmp(&b[j]) {
            std::cmp::Ordering::Less => i += 1,
            std::cmp::Ordering::Greater => j += 1,
            std::cmp::Ordering::Equal => {
                out.push(a[i]);
                i += 1;
                j += 1;
            }
        }
    }
    out
}

impl SearchEngine {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(Store::open(config)?))
    }

    pub fn new(store: Store) -> Self {
        Self { store, options: RankingOptions::default() }
    }

    pub fn with_options(mut self, options: RankingOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Pages whose posting list for `term` is set, ascending.
    pub fn posting_list(&self, term: &str) -> Result<Vec<PageId>> {
        match self.store.word_id(term)? {
            Some(word_id) => self.postings_for(word_id),
            None => Ok(Vec::new()),
        }
    }

    pub(crate) fn postings_for(&self, word_id: WordId) -> Result<Vec<PageId>> {
        let postings = self.store.scan_pairs(Table::Inverted, word_id)?;
        Ok(postings.into_iter().map(|(page_id, _)| page_id).collect())
    }

    /// Pages containing every term, ascending.
    ///
    /// Posting lists are intersected smallest first and the merge stops as
    /// soon as the running result is empty.
    pub fn boolean_filter<S: AsRef<str>>(&self, terms: &[S]) -> Result<Vec<PageId>> {
        let mut lists = Vec::with_capacity(terms.len());
        for term in terms {
            let list = self.posting_list(term.as_ref())?;
            if list.is_empty() {
                return Ok(Vec::new());
            }
            lists.push(list);
        }
        lists.sort_by_key(Vec::len);

        let mut lists = lists.into_iter();
        let mut result = lists.next().unwrap_or_default();
        for list in lists {
            if result.is_empty() {
                break;
            }
            result = intersect_sorted(&result, &list);
        }
        Ok(result)
    }

    pub fn page_count(&self) -> Result<u64> {
        self.store.page_count()
    }

    pub fn page(&self, page_id: PageId) -> Result<Option<PageRecord>> {
        match self.store.get(Table::PageInfo, &page_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    /// The `n` most frequent terms of a page, ties broken by term text.
    pub fn keywords(&self, page_id: PageId, n: usize) -> Result<Vec<(String, u32)>> {
        let mut out = Vec::new();
        for (word_id, tf) in self.store.scan_pairs(Table::Forward, page_id)? {
            if let Some(term) = self.store.lookup_text(word_id, IdSpace::Word)? {
                out.push((term, decode_u32(Table::Forward, &tf)?));
            }
        }
        out.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        out.truncate(n);
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersect_merges_sorted_lists() {
        assert_eq!(intersect_sorted(&[1u64, 3, 5, 7], &[2, 3, 7, 9]), vec![3, 7]);
        assert!(intersect_sorted::<u64>(&[], &[1, 2]).is_empty());
        assert!(intersect_sorted(&[1u32, 2], &[3, 4]).is_empty());
    }
}
