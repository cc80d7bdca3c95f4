//! Persistent inverted/forward index with boolean, phrase and ranked
//! retrieval.

pub mod config;
pub mod error;
pub mod index;
pub mod indexer;
pub mod phrase;
pub mod ranking;
pub mod search;
pub mod staging;
pub mod store;
pub mod tokenizer;

pub use config::{RankingOptions, StoreConfig};
pub use error::{IndexError, Result};
pub use index::{Bigram, Document, PageId, PageRecord, SearchHit, WordId};
pub use indexer::Indexer;
pub use phrase::split_to_bigrams;
pub use search::{intersect_sorted, SearchEngine};
pub use store::{IdSpace, Store, Table};
