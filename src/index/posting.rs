//! Postings and posting lists.
//!
//! A posting list is the inverted list of one term (or one derived
//! inverted-list operator) in one field. Postings are kept in strictly
//! increasing document order and every posting's positions are strictly
//! increasing and duplicate-free; [`PostingList::append_posting`] enforces
//! both before anything is exposed to a cursor.

use serde::{Deserialize, Serialize};

use crate::error::{QevalError, Result};
use crate::schema::Field;

/// Internal document identifier.
pub type DocId = u64;

/// Occurrences of a term in one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    /// The document ID.
    pub doc_id: DocId,
    /// Occurrence positions, strictly increasing.
    pub positions: Vec<u64>,
}

impl Posting {
    /// Create a new posting, validating the position list.
    pub fn new(doc_id: DocId, positions: Vec<u64>) -> Result<Self> {
        if positions.is_empty() {
            return Err(QevalError::index(format!(
                "posting for document {doc_id} has no positions"
            )));
        }
        if positions.windows(2).any(|w| w[0] >= w[1]) {
            return Err(QevalError::index(format!(
                "positions for document {doc_id} are not strictly increasing"
            )));
        }

        Ok(Posting { doc_id, positions })
    }

    /// Term frequency in this document.
    pub fn tf(&self) -> u64 {
        self.positions.len() as u64
    }
}

/// An inverted list for one field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingList {
    field: Field,
    postings: Vec<Posting>,
    ctf: u64,
}

impl PostingList {
    /// Create an empty posting list.
    pub fn new(field: Field) -> Self {
        PostingList {
            field,
            postings: Vec::new(),
            ctf: 0,
        }
    }

    /// Append a posting for a document beyond every document already in the list.
    pub fn append_posting(&mut self, doc_id: DocId, positions: Vec<u64>) -> Result<()> {
        if let Some(last) = self.postings.last() {
            if doc_id <= last.doc_id {
                return Err(QevalError::index(format!(
                    "document {doc_id} appended after document {}",
                    last.doc_id
                )));
            }
        }

        let posting = Posting::new(doc_id, positions)?;
        self.ctf += posting.tf();
        self.postings.push(posting);
        Ok(())
    }

    /// The field this list belongs to.
    pub fn field(&self) -> Field {
        self.field
    }

    /// Document frequency.
    pub fn df(&self) -> u64 {
        self.postings.len() as u64
    }

    /// Collection term frequency (total occurrences).
    pub fn ctf(&self) -> u64 {
        self.ctf
    }

    /// All postings in document order.
    pub fn postings(&self) -> &[Posting] {
        &self.postings
    }

    /// Get the posting at an index.
    pub fn get(&self, index: usize) -> Option<&Posting> {
        self.postings.get(index)
    }

    /// Number of postings.
    pub fn len(&self) -> usize {
        self.postings.len()
    }

    /// Check if the list has no postings.
    pub fn is_empty(&self) -> bool {
        self.postings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_posting_tracks_statistics() {
        let mut list = PostingList::new(Field::Body);
        list.append_posting(3, vec![1, 4]).unwrap();
        list.append_posting(7, vec![2]).unwrap();

        assert_eq!(list.df(), 2);
        assert_eq!(list.ctf(), 3);
        assert_eq!(list.postings().iter().map(|p| p.doc_id).collect::<Vec<_>>(), vec![3, 7]);
        assert_eq!(list.get(0).unwrap().tf(), 2);
    }

    #[test]
    fn test_append_posting_rejects_out_of_order_document() {
        let mut list = PostingList::new(Field::Title);
        list.append_posting(5, vec![0]).unwrap();

        assert!(list.append_posting(5, vec![1]).is_err());
        assert!(list.append_posting(2, vec![1]).is_err());
        assert_eq!(list.df(), 1);
    }

    #[test]
    fn test_posting_rejects_unsorted_or_duplicate_positions() {
        assert!(Posting::new(1, vec![3, 2]).is_err());
        assert!(Posting::new(1, vec![2, 2]).is_err());
        assert!(Posting::new(1, vec![]).is_err());
        assert!(Posting::new(1, vec![0, 9]).is_ok());
    }
}
