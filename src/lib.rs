//! # qeval
//!
//! A document-at-a-time evaluation engine for structured queries over an
//! inverted index.
//!
//! ## Features
//!
//! - Structured query language with `#and`, `#or`, `#sum`, `#wand`, `#wsum`,
//!   `#syn`, `#near/N` and `#window/N`
//! - Unranked and ranked Boolean, BM25 and query likelihood retrieval models
//! - Pseudo-relevance feedback
//! - Learning-to-rank re-ranking through an external SVM-rank toolkit
//! - TREC-format batch runs driven by a parameter file
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use qeval::analysis::analyzer::StandardAnalyzer;
//! use qeval::engine::QueryEngine;
//! use qeval::index::{IndexDocument, MemoryIndex};
//! use qeval::model::RetrievalModel;
//! use qeval::schema::Field;
//!
//! let mut index = MemoryIndex::new();
//! index
//!     .add_document(IndexDocument::new("doc-1").field(Field::Body, ["hot", "dog"]))
//!     .unwrap();
//!
//! let engine = QueryEngine::new(Arc::new(index), Arc::new(StandardAnalyzer::new()));
//! let results = engine
//!     .search("#near/1(hot dog)", &RetrievalModel::RankedBoolean)
//!     .unwrap();
//! assert_eq!(results.len(), 1);
//! ```

pub mod analysis;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod feedback;
pub mod index;
pub mod letor;
pub mod model;
pub mod query;
pub mod schema;
pub mod scoring;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
