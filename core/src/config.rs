use std::path::{Path, PathBuf};

/// Number of independently locked shards in the inverted-index staging area.
pub const STAGING_SHARDS: usize = 16;

/// Options used to open the sled database backing the index.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub path: PathBuf,
    pub cache_capacity_bytes: u64,
    pub flush_every_ms: Option<u64>,
    /// Delete the database when the last handle is dropped.
    pub temporary: bool,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache_capacity_bytes: 1024 * 1024 * 1024,
            flush_every_ms: Some(500),
            temporary: false,
        }
    }

    pub fn temporary(mut self, temporary: bool) -> Self {
        self.temporary = temporary;
        self
    }

    pub fn cache_capacity(mut self, bytes: u64) -> Self {
        self.cache_capacity_bytes = bytes;
        self
    }

    pub(crate) fn to_sled(&self) -> sled::Config {
        sled::Config::new()
            .path(&self.path)
            .cache_capacity(self.cache_capacity_bytes)
            .flush_every_ms(self.flush_every_ms)
            .temporary(self.temporary)
    }
}

/// Tuning for vector-space ranking.
#[derive(Debug, Clone)]
pub struct RankingOptions {
    /// Maximum number of hits returned.
    pub limit: usize,
    /// Use idf = ln(1 + N/df) instead of ln(N/df).
    pub smoothed_idf: bool,
    pub keywords_per_hit: usize,
}

impl Default for RankingOptions {
    fn default() -> Self {
        Self { limit: 50, smoothed_idf: false, keywords_per_hit: 5 }
    }
}
