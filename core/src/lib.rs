pub mod config;
pub mod document;
pub mod engine;
pub mod error;
pub mod fuzzy;
pub mod index;
pub mod persist;
pub mod query;
pub mod ranking;
pub mod snippet;
pub mod store;
pub mod tokenizer;

pub use config::EngineConfig;
pub use document::{DocId, Document};
pub use engine::{EngineStats, Mutation, SearchEngine, Snapshot};
pub use error::{Result, SearchError};
pub use index::{InvertedIndex, Posting};
pub use query::{Pagination, SearchPage, SearchResult};
pub use snippet::{Highlight, Snippet};
