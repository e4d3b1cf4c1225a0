//! Read-only access to the index store.

use std::fmt::Debug;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::posting::{DocId, PostingList};
use crate::schema::Field;

/// Trait for index readers.
///
/// Everything the evaluator needs from the store goes through this trait.
/// Implementations must be safe to share across threads; evaluation itself
/// only ever reads.
pub trait IndexReader: Send + Sync + Debug {
    /// Get the number of documents in the index.
    fn doc_count(&self) -> u64;

    /// Number of documents with a non-empty value for a field.
    fn field_doc_count(&self, field: Field) -> u64;

    /// Total number of term occurrences in a field across the collection.
    fn sum_of_field_lengths(&self, field: Field) -> u64;

    /// Length (in terms) of a field in one document.
    fn field_length(&self, field: Field, doc_id: DocId) -> Result<u64>;

    /// Get the posting list for a field and term.
    fn postings(&self, field: Field, term: &str) -> Result<Option<Arc<PostingList>>>;

    /// Get the term vector of a document field.
    fn term_vector(&self, doc_id: DocId, field: Field) -> Result<Option<TermVector>>;

    /// Map an internal document ID to its external ID.
    fn external_id(&self, doc_id: DocId) -> Result<String>;

    /// Map an external document ID to its internal ID.
    fn internal_id(&self, external_id: &str) -> Result<Option<DocId>>;

    /// Look up a stored document attribute.
    fn attribute(&self, name: &str, doc_id: DocId) -> Result<Option<String>>;

    /// Get document and collection frequency for a term in a field.
    fn term_stats(&self, field: Field, term: &str) -> Result<TermStats> {
        match self.postings(field, term)? {
            Some(list) => Ok(TermStats {
                doc_freq: list.df(),
                total_freq: list.ctf(),
            }),
            None => Ok(TermStats::default()),
        }
    }

    /// Average length of a field over the documents that have it.
    fn average_field_length(&self, field: Field) -> f64 {
        let docs = self.field_doc_count(field);
        if docs == 0 {
            return 0.0;
        }
        self.sum_of_field_lengths(field) as f64 / docs as f64
    }
}

/// Document and collection frequency of a term.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermStats {
    /// Number of documents containing this term.
    pub doc_freq: u64,

    /// Total number of occurrences of this term.
    pub total_freq: u64,
}

/// One distinct term of a document field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermVectorEntry {
    /// The term text.
    pub term: String,

    /// Occurrences of the term in this document field.
    pub freq: u64,

    /// Number of documents containing this term in the field.
    pub doc_freq: u64,

    /// Total occurrences of this term in the field across the collection.
    pub total_freq: u64,
}

/// The distinct terms of one document field, sorted by term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermVector {
    /// The document ID.
    pub doc_id: DocId,

    /// The field.
    pub field: Field,

    entries: Vec<TermVectorEntry>,
}

impl TermVector {
    /// Build a term vector; entries are sorted by term.
    pub fn new(doc_id: DocId, field: Field, mut entries: Vec<TermVectorEntry>) -> Self {
        entries.sort_by(|a, b| a.term.cmp(&b.term));
        TermVector {
            doc_id,
            field,
            entries,
        }
    }

    /// Entries in term order.
    pub fn entries(&self) -> &[TermVectorEntry] {
        &self.entries
    }

    /// Look up a term.
    pub fn get(&self, term: &str) -> Option<&TermVectorEntry> {
        self.entries
            .binary_search_by(|e| e.term.as_str().cmp(term))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// Number of distinct terms.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the field had no terms.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field length: the sum of all term frequencies.
    pub fn field_length(&self) -> u64 {
        self.entries.iter().map(|e| e.freq).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(term: &str, freq: u64) -> TermVectorEntry {
        TermVectorEntry {
            term: term.to_string(),
            freq,
            doc_freq: 1,
            total_freq: freq,
        }
    }

    #[test]
    fn test_term_vector_lookup() {
        let vector = TermVector::new(
            4,
            Field::Body,
            vec![entry("zebra", 1), entry("apple", 3), entry("mango", 2)],
        );

        assert_eq!(vector.len(), 3);
        assert_eq!(vector.entries()[0].term, "apple");
        assert_eq!(vector.get("mango").unwrap().freq, 2);
        assert!(vector.get("kiwi").is_none());
        assert_eq!(vector.field_length(), 6);
    }
}
