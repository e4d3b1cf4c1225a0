//! Inverted-list operators.
//!
//! `#syn`, `#near/N` and `#window/N` derive a new posting list from their
//! children's postings. The derived list is built once per query, before
//! document-at-a-time scoring starts, and obeys the same invariants as a
//! stored list: increasing documents, strictly increasing positions, and
//! no document without positions.

use std::sync::Arc;

use ahash::AHashMap;
use log::trace;

use crate::error::{QevalError, Result};
use crate::index::posting::{DocId, PostingList};
use crate::index::reader::IndexReader;
use crate::query::cursor::{DocCursor, PositionCursor, PostingCursor, match_min};
use crate::query::node::QueryNode;
use crate::schema::Field;

/// Per-query cache of term posting lists.
#[derive(Debug)]
pub struct InvertedListCache<'a> {
    index: &'a dyn IndexReader,
    terms: AHashMap<(Field, String), Arc<PostingList>>,
}

impl<'a> InvertedListCache<'a> {
    /// Create an empty cache over an index.
    pub fn new(index: &'a dyn IndexReader) -> Self {
        InvertedListCache {
            index,
            terms: AHashMap::new(),
        }
    }

    /// The index this cache reads from.
    pub fn index(&self) -> &'a dyn IndexReader {
        self.index
    }

    /// Get the postings of a term; unknown terms give an empty list.
    pub fn term(&mut self, field: Field, term: &str) -> Result<Arc<PostingList>> {
        if let Some(list) = self.terms.get(&(field, term.to_string())) {
            return Ok(Arc::clone(list));
        }

        let list = self
            .index
            .postings(field, term)?
            .unwrap_or_else(|| Arc::new(PostingList::new(field)));
        self.terms
            .insert((field, term.to_string()), Arc::clone(&list));
        Ok(list)
    }
}

/// Evaluate an inverted-list node into a posting list.
pub fn materialize(node: &QueryNode, cache: &mut InvertedListCache<'_>) -> Result<Arc<PostingList>> {
    let (field, lists) = match node {
        QueryNode::Term(t) => return cache.term(t.field, &t.term),
        QueryNode::Syn(args) | QueryNode::Near { args, .. } | QueryNode::Window { args, .. } => {
            let field = node.field().unwrap_or_default();
            let mut lists = Vec::with_capacity(args.len());
            for arg in args {
                let list = materialize(arg, cache)?;
                if list.field() != field {
                    return Err(QevalError::query_syntax(format!(
                        "{} mixes fields {} and {}",
                        node.kind(),
                        field,
                        list.field()
                    )));
                }
                lists.push(list);
            }
            (field, lists)
        }
        other => {
            return Err(QevalError::query_syntax(format!(
                "{} does not produce an inverted list",
                other.kind()
            )));
        }
    };

    let derived = match node {
        QueryNode::Near { distance, .. } => near(field, &lists, *distance)?,
        QueryNode::Window { span, .. } => window(field, &lists, *span)?,
        _ => syn(field, &lists)?,
    };

    trace!(
        "{} over {} lists: df={} ctf={}",
        node.kind(),
        lists.len(),
        derived.df(),
        derived.ctf()
    );

    Ok(Arc::new(derived))
}

/// Union of the children's documents; positions are merged.
pub fn syn(field: Field, lists: &[Arc<PostingList>]) -> Result<PostingList> {
    let mut result = PostingList::new(field);
    let mut cursors: Vec<PostingCursor> = lists.iter().cloned().map(PostingCursor::new).collect();

    while let Some(doc) = match_min(&cursors) {
        let mut positions = Vec::new();
        for cursor in cursors.iter_mut() {
            if cursor.current() == Some(doc) {
                positions.extend_from_slice(cursor.positions());
                cursor.advance_past(doc);
            }
        }
        positions.sort_unstable();
        positions.dedup();
        result.append_posting(doc, positions)?;
    }

    Ok(result)
}

/// Ordered proximity: each child occurs after the previous child's match
/// and at most `distance` positions later. Records the chain's last position.
pub fn near(field: Field, lists: &[Arc<PostingList>], distance: u32) -> Result<PostingList> {
    derive_positional(field, lists, |cursors| near_positions(cursors, u64::from(distance)))
}

/// Unordered proximity: all children inside a window narrower than `span`.
/// Records the window's first position.
pub fn window(field: Field, lists: &[Arc<PostingList>], span: u32) -> Result<PostingList> {
    derive_positional(field, lists, |cursors| window_positions(cursors, u64::from(span)))
}

/// Walk the documents common to all lists, using the rarest list as the
/// driver, and keep documents for which `positions` finds any match.
fn derive_positional<F>(field: Field, lists: &[Arc<PostingList>], positions: F) -> Result<PostingList>
where
    F: Fn(&mut [PostingCursor]) -> Vec<u64>,
{
    let mut result = PostingList::new(field);
    if lists.is_empty() {
        return Ok(result);
    }

    let mut cursors: Vec<PostingCursor> = lists.iter().cloned().map(PostingCursor::new).collect();
    let driver = lists
        .iter()
        .enumerate()
        .min_by_key(|(_, list)| list.df())
        .map_or(0, |(i, _)| i);

    while let Some(doc) = next_common_doc(&mut cursors, driver) {
        let mut matched = positions(&mut cursors);
        if !matched.is_empty() {
            matched.sort_unstable();
            matched.dedup();
            result.append_posting(doc, matched)?;
        }
        cursors[driver].advance_past(doc);
    }

    Ok(result)
}

fn next_common_doc(cursors: &mut [PostingCursor], driver: usize) -> Option<DocId> {
    loop {
        let target = cursors[driver].current()?;
        let mut max = target;
        for cursor in cursors.iter_mut() {
            cursor.advance_to(target);
            max = max.max(cursor.current()?);
        }
        if max == target {
            return Some(target);
        }
        cursors[driver].advance_to(max);
    }
}

fn near_positions(cursors: &mut [PostingCursor], distance: u64) -> Vec<u64> {
    let mut matches = Vec::new();
    let Some((first, rest)) = cursors.split_first_mut() else {
        return matches;
    };

    'chains: while let Some(start) = first.current_position() {
        first.advance_position();

        let mut last = start;
        for cursor in rest.iter_mut() {
            cursor.advance_position_past(last);
            match cursor.current_position() {
                Some(next) if next - last <= distance => last = next,
                Some(_) => continue 'chains,
                None => break 'chains,
            }
        }
        matches.push(last);
    }

    matches
}

fn window_positions(cursors: &mut [PostingCursor], span: u64) -> Vec<u64> {
    let mut matches = Vec::new();

    loop {
        let mut min: Option<(usize, u64)> = None;
        let mut max = 0;
        for (i, cursor) in cursors.iter().enumerate() {
            let Some(pos) = cursor.current_position() else {
                return matches;
            };
            if min.is_none_or(|(_, m)| pos < m) {
                min = Some((i, pos));
            }
            max = max.max(pos);
        }
        let Some((min_index, min_pos)) = min else {
            return matches;
        };

        if max - min_pos < span {
            matches.push(min_pos);
            for cursor in cursors.iter_mut() {
                cursor.advance_position();
            }
        } else {
            cursors[min_index].advance_position();
        }
    }
}
