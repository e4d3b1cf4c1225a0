//! Iterator protocol shared by all query operators.
//!
//! Document cursors yield document ids in strictly increasing order and
//! only move forward. Position cursors do the same over the occurrence
//! positions of the document the owning cursor is currently on, and start
//! over whenever that document changes.

use std::sync::Arc;

use crate::index::posting::{DocId, Posting, PostingList};

/// A forward-only cursor over document ids.
pub trait DocCursor {
    /// The current document, or `None` once exhausted.
    fn current(&self) -> Option<DocId>;

    /// Move to the first document `>= target`. No-op if already there.
    fn advance_to(&mut self, target: DocId);

    /// Move to the first document `> target`.
    fn advance_past(&mut self, target: DocId);

    /// Check if the cursor has no more documents.
    fn is_exhausted(&self) -> bool {
        self.current().is_none()
    }
}

/// A forward-only cursor over the positions of the current document.
pub trait PositionCursor: DocCursor {
    /// The current position, or `None` when the positions are used up.
    fn current_position(&self) -> Option<u64>;

    /// Move to the next position.
    fn advance_position(&mut self);

    /// Move to the first position `> target`.
    fn advance_position_past(&mut self, target: u64);
}

/// Document and position cursor over a posting list.
#[derive(Debug, Clone)]
pub struct PostingCursor {
    list: Arc<PostingList>,
    index: usize,
    position: usize,
}

impl PostingCursor {
    /// Create a cursor at the first posting.
    pub fn new(list: Arc<PostingList>) -> Self {
        PostingCursor {
            list,
            index: 0,
            position: 0,
        }
    }

    /// The underlying list.
    pub fn list(&self) -> &Arc<PostingList> {
        &self.list
    }

    /// The posting the cursor is on.
    pub fn posting(&self) -> Option<&Posting> {
        self.list.get(self.index)
    }

    /// Term frequency in the current document (0 when exhausted).
    pub fn tf(&self) -> u64 {
        self.posting().map_or(0, Posting::tf)
    }

    /// All positions in the current document.
    pub fn positions(&self) -> &[u64] {
        self.posting().map_or(&[], |p| p.positions.as_slice())
    }

    fn seek(&mut self, skip: usize) {
        if skip > 0 {
            self.index += skip;
            self.position = 0;
        }
    }
}

impl DocCursor for PostingCursor {
    fn current(&self) -> Option<DocId> {
        self.posting().map(|p| p.doc_id)
    }

    fn advance_to(&mut self, target: DocId) {
        let rest = &self.list.postings()[self.index.min(self.list.len())..];
        let skip = rest.partition_point(|p| p.doc_id < target);
        self.seek(skip);
    }

    fn advance_past(&mut self, target: DocId) {
        let rest = &self.list.postings()[self.index.min(self.list.len())..];
        let skip = rest.partition_point(|p| p.doc_id <= target);
        self.seek(skip);
    }
}

impl PositionCursor for PostingCursor {
    fn current_position(&self) -> Option<u64> {
        self.positions().get(self.position).copied()
    }

    fn advance_position(&mut self) {
        if self.position < self.positions().len() {
            self.position += 1;
        }
    }

    fn advance_position_past(&mut self, target: u64) {
        let positions = self.positions();
        let skip = positions[self.position.min(positions.len())..].partition_point(|&p| p <= target);
        self.position += skip;
    }
}

/// Align all cursors on one document.
///
/// Every cursor is advanced to the largest current id; if that moves any
/// cursor beyond it, the round starts over with the new maximum. Returns
/// the common document, or `None` as soon as any cursor is exhausted.
pub fn match_all<C: DocCursor>(cursors: &mut [C]) -> Option<DocId> {
    if cursors.is_empty() {
        return None;
    }

    let mut target = 0;
    for cursor in cursors.iter() {
        target = target.max(cursor.current()?);
    }

    loop {
        let mut agreed = true;
        for cursor in cursors.iter_mut() {
            cursor.advance_to(target);
            let doc = cursor.current()?;
            if doc != target {
                target = doc;
                agreed = false;
            }
        }
        if agreed {
            return Some(target);
        }
    }
}

/// The smallest current document among cursors that are not exhausted.
pub fn match_min<C: DocCursor>(cursors: &[C]) -> Option<DocId> {
    cursors.iter().filter_map(DocCursor::current).min()
}
