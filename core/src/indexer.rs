use crate::config::StoreConfig;
use crate::error::{IndexError, Result};
use crate::staging::{PostingDelta, Staging};
use crate::store::{pair_key, IdSpace, Store, Table, PAGE_COUNT_KEY};
use crate::{Document, PageId, WordId};
use rayon::prelude::*;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Write side of the index. Only one indexer should operate on a store at a
/// time; any number of [`crate::SearchEngine`]s may share it for reading.
///
/// Ingestion writes the forward index and page metadata eagerly and stages
/// posting-list changes in memory. Call [`Indexer::flush_inverted`] to merge
/// the staged changes into the inverted index.
pub struct Indexer {
    store: Store,
    staging: Staging,
    #[cfg(test)]
    failing_words: parking_lot::Mutex<HashSet<WordId>>,
}

impl Indexer {
    pub fn open(config: &StoreConfig) -> Result<Self> {
        Ok(Self::new(Store::open(config)?))
    }

    pub fn new(store: Store) -> Self {
        Self {
            store,
            staging: Staging::new(),
            #[cfg(test)]
            failing_words: Default::default(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn contains_url(&self, uri: &str) -> Result<bool> {
        Ok(self.store.page_id(uri)?.is_some())
    }

    /// Number of distinct words with posting-list changes awaiting a flush.
    pub fn staged_words(&self) -> usize {
        self.staging.len()
    }

    /// Make `doc` searchable, replacing whatever was indexed for its URI.
    ///
    /// Terms are processed in parallel; the page's max term frequency and
    /// metadata are written only once every term has been recorded. Tables
    /// are updated in separate transactions, so a failure part way through
    /// can leave the page partially indexed. Re-running the call repairs it.
    pub fn update_or_add_page(&self, doc: &Document) -> Result<PageId> {
        let page_id = self.store.get_or_create_id(&doc.uri, IdSpace::Page)?;

        let word_ids: HashSet<WordId> = doc
            .terms
            .par_iter()
            .filter(|(_, tf)| **tf > 0)
            .map(|(term, &tf)| -> Result<WordId> {
                let word_id = self.store.get_or_create_id(term, IdSpace::Word)?;
                let ((), written) = rayon::join(
                    || self.staging.add(word_id, page_id),
                    || self.write_forward(page_id, word_id, tf, doc.positions.get(term)),
                );
                written.map(|()| word_id)
            })
            .collect::<Result<_>>()?;

        let stale = self.remove_stale_terms(page_id, &word_ids)?;

        let key = page_id.to_be_bytes();
        let record = serde_json::to_vec(&doc.record())?;
        self.store.write_transaction(&[Table::MaxTf, Table::PageInfo, Table::Sequences], |tx| {
            if tx.get(Table::PageInfo, &key)?.is_none() {
                let pages = tx.get_u64(Table::Sequences, PAGE_COUNT_KEY)?.unwrap_or(0) + 1;
                tx.insert(Table::Sequences, PAGE_COUNT_KEY, &pages.to_be_bytes())?;
            }
            tx.insert(Table::MaxTf, &key, &doc.max_tf.to_be_bytes())?;
            tx.insert(Table::PageInfo, &key, &record)
        })?;

        debug!(page_id, uri = %doc.uri, terms = word_ids.len(), stale, "indexed page");
        Ok(page_id)
    }

    fn write_forward(
        &self,
        page_id: PageId,
        word_id: WordId,
        tf: u32,
        positions: Option<&Vec<u32>>,
    ) -> Result<()> {
        let key = pair_key(page_id, word_id);
        let encoded = match positions {
            Some(positions) => {
                let mut sorted = positions.clone();
                sorted.sort_unstable();
                Some(bincode::serialize(&sorted)?)
            }
            None => None,
        };
        self.store.write_transaction(&[Table::Forward, Table::Positions], |tx| {
            tx.insert(Table::Forward, &key, &tf.to_be_bytes())?;
            match &encoded {
                Some(bytes) => tx.insert(Table::Positions, &key, bytes),
                None => tx.remove(Table::Positions, &key),
            }
        })
    }

    /// Drop forward entries of words the page no longer contains and stage
    /// their removal from the inverted index.
    fn remove_stale_terms(&self, page_id: PageId, current: &HashSet<WordId>) -> Result<usize> {
        let stale: Vec<WordId> = self
            .store
            .scan_pairs(Table::Forward, page_id)?
            .into_iter()
            .map(|(word_id, _)| word_id)
            .filter(|word_id| !current.contains(word_id))
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        self.store.write_transaction(&[Table::Forward, Table::Positions], |tx| {
            for &word_id in &stale {
                let key = pair_key(page_id, word_id);
                tx.remove(Table::Forward, &key)?;
                tx.remove(Table::Positions, &key)?;
            }
            Ok(())
        })?;
        for &word_id in &stale {
            self.staging.remove(word_id, page_id);
        }
        Ok(stale.len())
    }

    /// Merge staged posting-list changes into the inverted index.
    ///
    /// Words are taken in ascending id order and each word's changes are
    /// written in their own transaction, in parallel. Returns once every word
    /// has been handled. Words whose write failed are staged again and the
    /// first failure is returned.
    pub fn flush_inverted(&self) -> Result<usize> {
        let staged = self.staging.drain();
        let total = staged.len();
        info!(words = total, "merging staged postings");

        let failures: Vec<(WordId, PostingDelta, IndexError)> = staged
            .into_par_iter()
            .filter_map(|(word_id, delta)| match self.merge_postings(word_id, &delta) {
                Ok(()) => None,
                Err(err) => Some((word_id, delta, err)),
            })
            .collect();

        let mut first_err = None;
        for (word_id, delta, err) in failures {
            warn!(word_id, error = %err, "posting list merge failed, re-staging");
            self.staging.restore(word_id, delta);
            if first_err.is_none() {
                first_err = Some(err);
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => {
                info!(words = total, "inverted index flushed");
                Ok(total)
            }
        }
    }

    fn merge_postings(&self, word_id: WordId, delta: &PostingDelta) -> Result<()> {
        self.injected_failure(word_id)?;
        self.store.write_transaction(&[Table::Inverted], |tx| {
            for (&page_id, &present) in delta {
                let key = pair_key(word_id, page_id);
                if present {
                    tx.insert(Table::Inverted, &key, &[1])?;
                } else {
                    tx.remove(Table::Inverted, &key)?;
                }
            }
            Ok(())
        })
    }

    #[cfg(not(test))]
    fn injected_failure(&self, _word_id: WordId) -> Result<()> {
        Ok(())
    }

    #[cfg(test)]
    fn injected_failure(&self, word_id: WordId) -> Result<()> {
        if self.failing_words.lock().contains(&word_id) {
            let reason = format!("posting write for word {word_id} refused");
            return Err(IndexError::TransactionFailed(sled::Error::Unsupported(reason)));
        }
        Ok(())
    }

    /// Reset the whole index, including anything staged.
    pub fn drop_all(&self) -> Result<()> {
        self.staging.clear();
        self.store.drop_all()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::decode_u32;
    use std::collections::HashMap;

    fn doc(uri: &str, terms: &[(&str, u32)]) -> Document {
        let terms: HashMap<String, u32> =
            terms.iter().map(|(t, tf)| (t.to_string(), *tf)).collect();
        Document::new(uri, uri.to_uppercase(), terms)
    }

    fn indexer() -> (tempfile::TempDir, Indexer) {
        let dir = tempfile::tempdir().unwrap();
        let indexer = Indexer::open(&StoreConfig::new(dir.path().join("db"))).unwrap();
        (dir, indexer)
    }

    fn postings(indexer: &Indexer, term: &str) -> Vec<PageId> {
        let word_id = indexer.store().word_id(term).unwrap().unwrap();
        let pairs = indexer.store().scan_pairs(Table::Inverted, word_id).unwrap();
        pairs.into_iter().map(|(p, _)| p).collect()
    }

    #[test]
    fn forward_entries_and_metadata_are_written_eagerly() {
        let (_dir, indexer) = indexer();
        let page = indexer.update_or_add_page(&doc("u1", &[("quick", 1), ("fox", 2)])).unwrap();
        assert!(indexer.contains_url("u1").unwrap());
        assert!(!indexer.contains_url("u2").unwrap());

        let fox = indexer.store().word_id("fox").unwrap().unwrap();
        let tf = indexer.store().get(Table::Forward, &pair_key(page, fox)).unwrap().unwrap();
        assert_eq!(decode_u32(Table::Forward, &tf).unwrap(), 2);
        let max_tf = indexer.store().get(Table::MaxTf, &page.to_be_bytes()).unwrap().unwrap();
        assert_eq!(decode_u32(Table::MaxTf, &max_tf).unwrap(), 2);
        assert_eq!(indexer.store().len(Table::PageInfo), 1);
        // the inverted index only changes on flush
        assert_eq!(indexer.store().len(Table::Inverted), 0);
        assert_eq!(indexer.staged_words(), 2);
    }

    #[test]
    fn flush_materializes_postings() {
        let (_dir, indexer) = indexer();
        let u1 = indexer.update_or_add_page(&doc("u1", &[("quick", 1), ("fox", 2)])).unwrap();
        let u2 = indexer.update_or_add_page(&doc("u2", &[("quick", 3), ("brown", 1)])).unwrap();
        assert_eq!(indexer.flush_inverted().unwrap(), 3);
        assert_eq!(indexer.staged_words(), 0);
        assert_eq!(postings(&indexer, "quick"), vec![u1, u2]);
        assert_eq!(postings(&indexer, "fox"), vec![u1]);
    }

    #[test]
    fn failed_merge_is_restaged_and_retried() {
        let (_dir, indexer) = indexer();
        let page = indexer.update_or_add_page(&doc("u1", &[("quick", 1), ("fox", 2)])).unwrap();
        let fox = indexer.store().word_id("fox").unwrap().unwrap();
        indexer.failing_words.lock().insert(fox);

        let err = indexer.flush_inverted().unwrap_err();
        assert!(err.is_retriable());
        assert_eq!(indexer.staged_words(), 1);
        assert_eq!(postings(&indexer, "quick"), vec![page]);
        assert!(postings(&indexer, "fox").is_empty());

        indexer.failing_words.lock().clear();
        assert_eq!(indexer.flush_inverted().unwrap(), 1);
        assert_eq!(indexer.staged_words(), 0);
        assert_eq!(postings(&indexer, "fox"), vec![page]);
    }

    #[test]
    fn page_counter_counts_new_pages_only() {
        let (_dir, indexer) = indexer();
        indexer.update_or_add_page(&doc("u1", &[("quick", 1)])).unwrap();
        indexer.update_or_add_page(&doc("u2", &[("fox", 1)])).unwrap();
        indexer.update_or_add_page(&doc("u1", &[("fox", 3)])).unwrap();
        assert_eq!(indexer.store().page_count().unwrap(), 2);
        assert_eq!(indexer.store().len(Table::PageInfo), 2);

        indexer.drop_all().unwrap();
        assert_eq!(indexer.store().page_count().unwrap(), 0);
        indexer.update_or_add_page(&doc("u3", &[("fox", 1)])).unwrap();
        assert_eq!(indexer.store().page_count().unwrap(), 1);
    }

    #[test]
    fn reingestion_replaces_terms() {
        let (_dir, indexer) = indexer();
        let page = indexer.update_or_add_page(&doc("u1", &[("quick", 1), ("fox", 2)])).unwrap();
        indexer.flush_inverted().unwrap();

        let again = indexer.update_or_add_page(&doc("u1", &[("quick", 4)])).unwrap();
        assert_eq!(page, again);
        indexer.flush_inverted().unwrap();

        assert_eq!(postings(&indexer, "quick"), vec![page]);
        assert!(postings(&indexer, "fox").is_empty());
        assert_eq!(indexer.store().scan_pairs(Table::Forward, page).unwrap().len(), 1);
        assert_eq!(indexer.store().len(Table::PageInfo), 1);
    }

    #[test]
    fn zero_frequency_terms_are_skipped() {
        let (_dir, indexer) = indexer();
        indexer.update_or_add_page(&doc("u1", &[("quick", 1), ("ghost", 0)])).unwrap();
        indexer.flush_inverted().unwrap();
        assert_eq!(indexer.store().word_id("ghost").unwrap(), None);
    }

    #[test]
    fn drop_all_discards_staged_changes() {
        let (_dir, indexer) = indexer();
        indexer.update_or_add_page(&doc("u1", &[("quick", 1)])).unwrap();
        indexer.drop_all().unwrap();
        assert_eq!(indexer.staged_words(), 0);
        assert_eq!(indexer.flush_inverted().unwrap(), 0);
        assert!(!indexer.contains_url("u1").unwrap());
    }
}
