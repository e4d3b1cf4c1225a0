//! Index module for qeval.
//!
//! The index store is an external collaborator: the engine only reads
//! postings, term statistics, field lengths, term vectors and document
//! attributes through the [`IndexReader`] trait. [`MemoryIndex`] is an
//! in-memory implementation used by the command line tool and the tests.

pub mod memory;
pub mod posting;
pub mod reader;

// Re-export commonly used types
pub use memory::{CorpusDocument, IndexDocument, MemoryIndex};
pub use posting::{DocId, Posting, PostingList};
pub use reader::{IndexReader, TermStats, TermVector, TermVectorEntry};
