//! Out-of-core SPIMI indexing of a zipped text corpus into two sparse
//! document-term matrices (raw term frequencies and tf-idf weights).

pub mod arff;
pub mod block;
pub mod config;
pub mod error;
pub mod indexer;
pub mod lookahead;
pub mod matrix;
pub mod merge;
pub mod persist;
pub mod stats;
pub mod tokenizer;
pub mod vocabulary;

mod index;

pub use config::IndexConfig;
pub use error::{IndexError, Result};
pub use index::{DocId, Document, DocumentTable, TermId, Token, Weight};
pub use indexer::{BlockIndexer, BuildSummary};
pub use stats::CollectionStatistics;
pub use vocabulary::{Vocabulary, VocabularyBuilder, VocabularyEntry};
