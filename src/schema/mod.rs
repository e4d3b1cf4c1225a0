//! Schema module for qeval.
//!
//! The collection has a fixed, closed set of text fields; queries name them
//! with a `.field` suffix.

pub mod field;

// Re-export commonly used types
pub use field::Field;
