//! Text analysis used to map raw query tokens onto index terms.
//!
//! The index store owns the real lexical processing; the engine only needs
//! the same analysis applied to query tokens so that they line up with the
//! indexed vocabulary.

pub mod analyzer;
