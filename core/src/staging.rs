use crate::config::STAGING_SHARDS;
use crate::{PageId, WordId};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};

/// Pending posting-list changes for one word: page -> present.
pub type PostingDelta = BTreeMap<PageId, bool>;

/// In-memory inverted-index updates waiting for the next flush.
///
/// Words are partitioned over independently locked shards by id, so
/// concurrent ingestions only contend when they stage words of the same
/// shard. For any (word, page) pair the most recent change wins.
pub struct Staging {
    shards: Vec<Mutex<HashMap<WordId, PostingDelta>>>,
}

impl Default for Staging {
    fn default() -> Self {
        Self::new()
    }
}

impl Staging {
    pub fn new() -> Self {
        Self { shards: (0..STAGING_SHARDS).map(|_| Mutex::new(HashMap::new())).collect() }
    }

    fn shard(&self, word_id: WordId) -> &Mutex<HashMap<WordId, PostingDelta>> {
        &self.shards[(word_id % self.shards.len() as u64) as usize]
    }

    pub fn add(&self, word_id: WordId, page_id: PageId) {
        self.shard(word_id).lock().entry(word_id).or_default().insert(page_id, true);
    }

    pub fn remove(&self, word_id: WordId, page_id: PageId) {
        self.shard(word_id).lock().entry(word_id).or_default().insert(page_id, false);
    }

    /// Put back a delta taken by [`Staging::drain`]. Changes staged since the
    /// drain are newer and take precedence.
    pub fn restore(&self, word_id: WordId, delta: PostingDelta) {
        let mut shard = self.shard(word_id).lock();
        let current = shard.entry(word_id).or_default();
        for (page_id, present) in delta {
            current.entry(page_id).or_insert(present);
        }
    }

    /// Take every staged delta, sorted by ascending word id.
    pub fn drain(&self) -> Vec<(WordId, PostingDelta)> {
        let mut out: Vec<(WordId, PostingDelta)> =
            self.shards.iter().flat_map(|shard| std::mem::take(&mut *shard.lock())).collect();
        out.sort_unstable_by_key(|(word_id, _)| *word_id);
        out
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|shard| shard.lock().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        for shard in &self.shards {
            shard.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drain_sorts_words_and_empties_shards() {
        let staging = Staging::new();
        staging.add(40, 1);
        staging.add(3, 1);
        staging.add(19, 2);
        staging.add(3, 2);
        let drained = staging.drain();
        let words: Vec<WordId> = drained.iter().map(|(w, _)| *w).collect();
        assert_eq!(words, vec![3, 19, 40]);
        assert_eq!(drained[0].1, BTreeMap::from([(1, true), (2, true)]));
        assert!(staging.is_empty());
    }

    #[test]
    fn latest_change_wins() {
        let staging = Staging::new();
        staging.add(5, 1);
        staging.remove(5, 1);
        assert_eq!(staging.drain(), vec![(5, BTreeMap::from([(1, false)]))]);
    }

    #[test]
    fn restore_does_not_override_newer_changes() {
        let staging = Staging::new();
        staging.remove(5, 1);
        staging.restore(5, BTreeMap::from([(1, true), (2, true)]));
        assert_eq!(staging.drain(), vec![(5, BTreeMap::from([(1, false), (2, true)]))]);
    }
}
