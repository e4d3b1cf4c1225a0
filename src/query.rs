//! Structured queries: parsing, optimization and document-at-a-time evaluation.
//!
//! A query string is parsed into a [`QueryNode`] tree, simplified by the
//! [`optimizer`], and turned into an evaluation tree. Inverted-list
//! operators (`#syn`, `#near/N`, `#window/N`) are materialized into derived
//! posting lists up front; score operators (`#and`, `#or`, `#sum`, `#wand`,
//! `#wsum`) are evaluated one document at a time in increasing id order.

pub mod cursor;
pub mod inverted;
pub mod node;
pub mod optimizer;
pub mod parser;
pub mod results;
pub mod score;

pub use cursor::{DocCursor, PositionCursor, PostingCursor};
pub use node::{OperatorKind, QueryNode, TermNode, Weighted};
pub use optimizer::optimize;
pub use parser::QueryParser;
pub use results::{ResultList, ScoredDoc};
pub use score::{ScoreNode, ScoringContext};
