//! Query tree simplification.
//!
//! A post-order pass that removes operators left without arguments (e.g. a
//! `#near` whose terms were all stop words) and replaces single-argument
//! operators by their argument. Score wrappers keep their single child.

use crate::query::node::{QueryNode, Weighted};

/// Optimize a query tree. Returns `None` if nothing is left.
pub fn optimize(node: QueryNode) -> Option<QueryNode> {
    match node {
        QueryNode::Term(_) => Some(node),
        QueryNode::Score(child) => optimize(*child).map(QueryNode::score),
        QueryNode::Syn(args) => collapse(args, QueryNode::Syn),
        QueryNode::Near { distance, args } => {
            collapse(args, |args| QueryNode::Near { distance, args })
        }
        QueryNode::Window { span, args } => collapse(args, |args| QueryNode::Window { span, args }),
        QueryNode::And(args) => collapse(args, QueryNode::And),
        QueryNode::Or(args) => collapse(args, QueryNode::Or),
        QueryNode::Sum(args) => collapse(args, QueryNode::Sum),
        QueryNode::WAnd(args) => collapse_weighted(args, QueryNode::WAnd),
        QueryNode::WSum(args) => collapse_weighted(args, QueryNode::WSum),
    }
}

fn collapse<F>(args: Vec<QueryNode>, rebuild: F) -> Option<QueryNode>
where
    F: FnOnce(Vec<QueryNode>) -> QueryNode,
{
    let mut args: Vec<QueryNode> = args.into_iter().filter_map(optimize).collect();
    match args.len() {
        0 => None,
        1 => args.pop(),
        _ => Some(rebuild(args)),
    }
}

fn collapse_weighted<F>(args: Vec<Weighted>, rebuild: F) -> Option<QueryNode>
where
    F: FnOnce(Vec<Weighted>) -> QueryNode,
{
    let mut args: Vec<Weighted> = args
        .into_iter()
        .filter_map(|w| optimize(w.node).map(|node| Weighted::new(w.weight, node)))
        .collect();
    match args.len() {
        0 => None,
        1 => args.pop().map(|w| w.node),
        _ => Some(rebuild(args)),
    }
}
