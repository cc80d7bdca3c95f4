//! Durable table storage backed by sled.
//!
//! Every logical table is a sled tree. Ids are stored big-endian so that
//! composite keys (`page|word`, `word|page`) sort numerically and a prefix
//! scan over the leading id returns the "sub-table" for that id in ascending
//! order of the trailing id.

use crate::config::StoreConfig;
use crate::error::{IndexError, Result};
use crate::{PageId, WordId};
use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, Transactional, TransactionalTree,
};
use sled::{Batch, IVec, Tree};
use tracing::{debug, info};

pub type TxResult<T> = ConflictableTransactionResult<T, IndexError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Table {
    UrlToPageId,
    PageIdToUrl,
    TermToWordId,
    WordIdToTerm,
    /// `page|word` -> term frequency (u32)
    Forward,
    /// page -> max term frequency (u32)
    MaxTf,
    /// `word|page` -> presence marker
    Inverted,
    /// `page|word` -> bincode `Vec<u32>` of token offsets
    Positions,
    /// page -> JSON `PageRecord`
    PageInfo,
    /// forward-map table name -> last allocated id, plus the page counter
    Sequences,
}

impl Table {
    pub const ALL: [Table; 10] = [
        Table::UrlToPageId,
        Table::PageIdToUrl,
        Table::TermToWordId,
        Table::WordIdToTerm,
        Table::Forward,
        Table::MaxTf,
        Table::Inverted,
        Table::Positions,
        Table::PageInfo,
        Table::Sequences,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Table::UrlToPageId => "url_to_page_id",
            Table::PageIdToUrl => "page_id_to_url",
            Table::TermToWordId => "term_to_word_id",
            Table::WordIdToTerm => "word_id_to_term",
            Table::Forward => "forward_index",
            Table::MaxTf => "max_tf",
            Table::Inverted => "inverted_index",
            Table::Positions => "positions",
            Table::PageInfo => "page_info",
            Table::Sequences => "sequences",
        }
    }
}

/// A pair of mapping tables translating text to a stable id and back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdSpace {
    Page,
    Word,
}

impl IdSpace {
    pub fn forward(self) -> Table {
        match self {
            IdSpace::Page => Table::UrlToPageId,
            IdSpace::Word => Table::TermToWordId,
        }
    }

    pub fn inverse(self) -> Table {
        match self {
            IdSpace::Page => Table::PageIdToUrl,
            IdSpace::Word => Table::WordIdToTerm,
        }
    }
}

/// Key in `Sequences` counting pages that have a metadata record.
pub const PAGE_COUNT_KEY: &[u8] = b"page_count";

pub fn pair_key(a: u64, b: u64) -> [u8; 16] {
    let mut key = [0u8; 16];
    key[..8].copy_from_slice(&a.to_be_bytes());
    key[8..].copy_from_slice(&b.to_be_bytes());
    key
}

pub fn decode_u64(table: Table, bytes: &[u8]) -> Result<u64> {
    <[u8; 8]>::try_from(bytes)
        .map(u64::from_be_bytes)
        .map_err(|_| IndexError::CorruptValue { table: table.name(), len: bytes.len() })
}

pub fn decode_u32(table: Table, bytes: &[u8]) -> Result<u32> {
    <[u8; 4]>::try_from(bytes)
        .map(u32::from_be_bytes)
        .map_err(|_| IndexError::CorruptValue { table: table.name(), len: bytes.len() })
}

fn abort<T>(res: Result<T>) -> TxResult<T> {
    res.map_err(ConflictableTransactionError::Abort)
}

/// The tables opened by one transaction.
pub struct TxTables<'a> {
    tables: &'a [Table],
    trees: &'a [TransactionalTree],
    writable: bool,
}

impl<'a> TxTables<'a> {
    fn tree(&self, table: Table) -> TxResult<&'a TransactionalTree> {
        let trees = self.trees;
        self.tables
            .iter()
            .position(|t| *t == table)
            .map(|i| &trees[i])
            .ok_or(ConflictableTransactionError::Abort(IndexError::TableNotInScope(table.name())))
    }

    fn writable_tree(&self, table: Table) -> TxResult<&'a TransactionalTree> {
        if !self.writable {
            return Err(ConflictableTransactionError::Abort(IndexError::ReadOnly(table.name())));
        }
        self.tree(table)
    }

    pub fn get(&self, table: Table, key: &[u8]) -> TxResult<Option<IVec>> {
        Ok(self.tree(table)?.get(key)?)
    }

    pub fn get_u64(&self, table: Table, key: &[u8]) -> TxResult<Option<u64>> {
        match self.get(table, key)? {
            Some(v) => abort(decode_u64(table, &v)).map(Some),
            None => Ok(None),
        }
    }

    pub fn insert(&self, table: Table, key: &[u8], value: &[u8]) -> TxResult<()> {
        self.writable_tree(table)?.insert(key, value)?;
        Ok(())
    }

    pub fn remove(&self, table: Table, key: &[u8]) -> TxResult<()> {
        self.writable_tree(table)?.remove(key)?;
        Ok(())
    }

    pub fn apply_batch(&self, table: Table, batch: &Batch) -> TxResult<()> {
        self.writable_tree(table)?.apply_batch(batch)?;
        Ok(())
    }
}

/// Handle to the persistent index. Cloning shares the underlying database.
#[derive(Clone)]
pub struct Store {
    db: sled::Db,
    trees: Vec<Tree>,
}

impl Store {
    /// Open (or create) the database and make sure every table exists.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        let unavailable = |source: sled::Error| IndexError::StoreUnavailable {
            path: config.path.clone(),
            source,
        };
        let db = config.to_sled().open().map_err(unavailable)?;
        let trees = Table::ALL
            .iter()
            .map(|t| db.open_tree(t.name()))
            .collect::<sled::Result<Vec<_>>>()
            .map_err(unavailable)?;
        let store = Self { db, trees };
        info!(path = %config.path.display(), pages = store.page_count()?, "opened index store");
        Ok(store)
    }

    pub fn tree(&self, table: Table) -> &Tree {
        &self.trees[table as usize]
    }

    pub fn len(&self, table: Table) -> usize {
        self.tree(table).len()
    }

    pub fn get(&self, table: Table, key: &[u8]) -> Result<Option<IVec>> {
        Ok(self.tree(table).get(key)?)
    }

    /// Number of pages with a metadata record. Kept as a counter so callers
    /// never walk `page_info`.
    pub fn page_count(&self) -> Result<u64> {
        match self.get(Table::Sequences, PAGE_COUNT_KEY)? {
            Some(bytes) => decode_u64(Table::Sequences, &bytes),
            None => Ok(0),
        }
    }

    /// Scan the sub-table of `id` in a composite-key table, returning the
    /// trailing id of each key with its value, ascending.
    pub fn scan_pairs(&self, table: Table, id: u64) -> Result<Vec<(u64, IVec)>> {
        self.tree(table)
            .scan_prefix(id.to_be_bytes())
            .map(|entry| -> Result<(u64, IVec)> {
                let (key, value) = entry?;
                Ok((decode_u64(table, &key[8..])?, value))
            })
            .collect()
    }

    pub fn count_pairs(&self, table: Table, id: u64) -> Result<usize> {
        let mut count = 0;
        for entry in self.tree(table).scan_prefix(id.to_be_bytes()).keys() {
            entry?;
            count += 1;
        }
        Ok(count)
    }

    /// Run `f` over `tables` in one transaction that may not write.
    pub fn read_transaction<A, F>(&self, tables: &[Table], f: F) -> Result<A>
    where
        F: Fn(&TxTables<'_>) -> TxResult<A>,
    {
        self.run_transaction(tables, false, f)
    }

    /// Run `f` over `tables` in one atomic transaction. Returning an error
    /// aborts it and none of its writes become visible.
    pub fn write_transaction<A, F>(&self, tables: &[Table], f: F) -> Result<A>
    where
        F: Fn(&TxTables<'_>) -> TxResult<A>,
    {
        self.run_transaction(tables, true, f)
    }

    fn run_transaction<A, F>(&self, tables: &[Table], writable: bool, f: F) -> Result<A>
    where
        F: Fn(&TxTables<'_>) -> TxResult<A>,
    {
        let trees: Vec<Tree> = tables.iter().map(|t| self.tree(*t).clone()).collect();
        let out = trees.as_slice().transaction(|view| {
            f(&TxTables { tables, trees: &view[..], writable })
        })?;
        Ok(out)
    }

    pub fn lookup_id(&self, text: &str, space: IdSpace) -> Result<Option<u64>> {
        let table = space.forward();
        self.get(table, text.as_bytes())?.map(|v| decode_u64(table, &v)).transpose()
    }

    pub fn lookup_text(&self, id: u64, space: IdSpace) -> Result<Option<String>> {
        match self.get(space.inverse(), &id.to_be_bytes())? {
            Some(v) => Ok(Some(String::from_utf8_lossy(&v).into_owned())),
            None => Ok(None),
        }
    }

    /// Resolve `text` to its id, allocating the next id of the space if it
    /// has none. The existence check, sequence bump and both mapping writes
    /// share one serializable transaction, so concurrent first sightings of
    /// the same text agree on a single id.
    pub fn get_or_create_id(&self, text: &str, space: IdSpace) -> Result<u64> {
        if let Some(id) = self.lookup_id(text, space)? {
            return Ok(id);
        }
        let (fw, inv) = (space.forward(), space.inverse());
        let seq_key = fw.name().as_bytes();
        let (id, created) = self.write_transaction(&[fw, inv, Table::Sequences], |tx| {
            if let Some(existing) = tx.get_u64(fw, text.as_bytes())? {
                return Ok((existing, false));
            }
            let next = tx.get_u64(Table::Sequences, seq_key)?.unwrap_or(0) + 1;
            let bytes = next.to_be_bytes();
            tx.insert(Table::Sequences, seq_key, &bytes)?;
            tx.insert(fw, text.as_bytes(), &bytes)?;
            tx.insert(inv, &bytes, text.as_bytes())?;
            Ok((next, true))
        })?;
        if created {
            debug!(table = fw.name(), id, text, "allocated id");
        }
        Ok(id)
    }

    pub fn page_id(&self, uri: &str) -> Result<Option<PageId>> {
        self.lookup_id(uri, IdSpace::Page)
    }

    pub fn word_id(&self, term: &str) -> Result<Option<WordId>> {
        self.lookup_id(term, IdSpace::Word)
    }

    /// Token offsets of `term` in page `page_id`, ascending. Empty when the
    /// term is unknown or absent from the page.
    pub fn position_indices(&self, page_id: PageId, term: &str) -> Result<Vec<u32>> {
        let Some(word_id) = self.word_id(term)? else {
            return Ok(Vec::new());
        };
        match self.get(Table::Positions, &pair_key(page_id, word_id))? {
            Some(bytes) => Ok(bincode::deserialize(&bytes)?),
            None => Ok(Vec::new()),
        }
    }

    /// Empty every table in a single transaction.
    pub fn drop_all(&self) -> Result<()> {
        let mut batches = Vec::with_capacity(Table::ALL.len());
        for table in Table::ALL {
            let mut batch = Batch::default();
            for key in self.tree(table).iter().keys() {
                batch.remove(key?);
            }
            batches.push((table, batch));
        }
        self.write_transaction(&Table::ALL, |tx| {
            for (table, batch) in &batches {
                tx.apply_batch(*table, batch)?;
            }
            Ok(())
        })?;
        info!("dropped all index tables");
        Ok(())
    }

    /// Block until all written data is durable.
    pub fn flush(&self) -> Result<usize> {
        Ok(self.db.flush()?)
    }
}
