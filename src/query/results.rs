//! Ranked result lists.

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::index::posting::DocId;
use crate::index::reader::IndexReader;

/// A document with its score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoredDoc {
    /// Internal document ID.
    pub doc_id: DocId,
    /// The score.
    pub score: f64,
}

/// The results of one query.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultList {
    docs: Vec<ScoredDoc>,
}

impl ResultList {
    /// Create an empty result list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a document.
    pub fn add(&mut self, doc_id: DocId, score: f64) {
        self.docs.push(ScoredDoc { doc_id, score });
    }

    /// Number of documents.
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    /// Check if the list is empty.
    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    /// Get the entry at a rank (0-based).
    pub fn get(&self, index: usize) -> Option<&ScoredDoc> {
        self.docs.get(index)
    }

    /// Iterate in the current order.
    pub fn iter(&self) -> impl Iterator<Item = &ScoredDoc> {
        self.docs.iter()
    }

    /// Keep the first `n` entries of the current order.
    pub fn truncate(&mut self, n: usize) {
        self.docs.truncate(n);
    }

    /// Sort by score descending. Equal scores are ordered by external
    /// document id, then by internal id.
    pub fn sort(&mut self, index: &dyn IndexReader) -> Result<()> {
        let mut keyed = Vec::with_capacity(self.docs.len());
        for doc in self.docs.drain(..) {
            keyed.push((index.external_id(doc.doc_id)?, doc));
        }

        keyed.sort_by(|(a_ext, a), (b_ext, b)| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a_ext.cmp(b_ext))
                .then_with(|| a.doc_id.cmp(&b.doc_id))
        });

        self.docs = keyed.into_iter().map(|(_, doc)| doc).collect();
        Ok(())
    }
}

impl IntoIterator for ResultList {
    type Item = ScoredDoc;
    type IntoIter = std::vec::IntoIter<ScoredDoc>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultList {
    type Item = &'a ScoredDoc;
    type IntoIter = std::slice::Iter<'a, ScoredDoc>;

    fn into_iter(self) -> Self::IntoIter {
        self.docs.iter()
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{IndexDocument, MemoryIndex};

    #[test]
    fn test_sort_breaks_ties_by_external_id() {
        let mut index = MemoryIndex::new();
        for ext in ["zeta", "alpha", "mid"] {
            index.add_document(IndexDocument::new(ext)).unwrap();
        }

        let mut results = ResultList::new();
        results.add(0, 1.5);
        results.add(1, 1.5);
        results.add(2, 3.0);
        results.sort(&index).unwrap();

        let order: Vec<DocId> = results.iter().map(|d| d.doc_id).collect();
        assert_eq!(order, vec![2, 1, 0]);

        results.truncate(2);
        assert_eq!(results.len(), 2);
        assert_eq!(results.get(1).unwrap().doc_id, 1);
    }
}
