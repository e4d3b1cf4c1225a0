//! Query tree nodes.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::schema::Field;

/// A single index term in one field.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TermNode {
    /// The analyzed term.
    pub term: String,
    /// The field to search.
    pub field: Field,
}

impl TermNode {
    /// Create a new term node.
    pub fn new<S: Into<String>>(term: S, field: Field) -> Self {
        TermNode {
            term: term.into(),
            field,
        }
    }
}

/// An argument of a weighted operator together with its weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Weighted {
    /// Positive weight.
    pub weight: f64,
    /// The argument.
    pub node: QueryNode,
}

impl Weighted {
    /// Create a new weighted argument.
    pub fn new(weight: f64, node: QueryNode) -> Self {
        Weighted { weight, node }
    }
}

/// A node of a structured query.
///
/// Weighted operators keep each weight next to its argument, so the weight
/// list always has exactly one entry per child.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum QueryNode {
    /// A term leaf.
    Term(TermNode),
    /// Synonym: union of the children's occurrences.
    Syn(Vec<QueryNode>),
    /// Ordered proximity: each child within `distance` after the previous one.
    Near { distance: u32, args: Vec<QueryNode> },
    /// Unordered proximity: all children inside a window of `span` positions.
    Window { span: u32, args: Vec<QueryNode> },
    /// Conjunction.
    And(Vec<QueryNode>),
    /// Disjunction.
    Or(Vec<QueryNode>),
    /// BM25 sum.
    Sum(Vec<QueryNode>),
    /// Weighted conjunction.
    WAnd(Vec<Weighted>),
    /// Weighted sum.
    WSum(Vec<Weighted>),
    /// Turns an inverted list into a score source.
    Score(Box<QueryNode>),
}

/// The kind of a query node, without its arguments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OperatorKind {
    Term,
    Syn,
    Near,
    Window,
    And,
    Or,
    Sum,
    WAnd,
    WSum,
    Score,
}

impl OperatorKind {
    /// The operator name as written in queries.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Term => "term",
            OperatorKind::Syn => "#syn",
            OperatorKind::Near => "#near",
            OperatorKind::Window => "#window",
            OperatorKind::And => "#and",
            OperatorKind::Or => "#or",
            OperatorKind::Sum => "#sum",
            OperatorKind::WAnd => "#wand",
            OperatorKind::WSum => "#wsum",
            OperatorKind::Score => "#score",
        }
    }

    /// Whether nodes of this kind produce inverted lists.
    pub fn is_inverted_list(&self) -> bool {
        matches!(
            self,
            OperatorKind::Term | OperatorKind::Syn | OperatorKind::Near | OperatorKind::Window
        )
    }

    /// Whether weighted operators of this kind expect a weight before each argument.
    pub fn is_weighted(&self) -> bool {
        matches!(self, OperatorKind::WAnd | OperatorKind::WSum)
    }
}

impl fmt::Display for OperatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl QueryNode {
    /// Create a term leaf.
    pub fn term<S: Into<String>>(term: S, field: Field) -> Self {
        QueryNode::Term(TermNode::new(term, field))
    }

    /// Wrap an inverted-list node into a score source.
    pub fn score(node: QueryNode) -> Self {
        QueryNode::Score(Box::new(node))
    }

    /// Get the kind of this node.
    pub fn kind(&self) -> OperatorKind {
        match self {
            QueryNode::Term(_) => OperatorKind::Term,
            QueryNode::Syn(_) => OperatorKind::Syn,
            QueryNode::Near { .. } => OperatorKind::Near,
            QueryNode::Window { .. } => OperatorKind::Window,
            QueryNode::And(_) => OperatorKind::And,
            QueryNode::Or(_) => OperatorKind::Or,
            QueryNode::Sum(_) => OperatorKind::Sum,
            QueryNode::WAnd(_) => OperatorKind::WAnd,
            QueryNode::WSum(_) => OperatorKind::WSum,
            QueryNode::Score(_) => OperatorKind::Score,
        }
    }

    /// Whether this node produces an inverted list.
    pub fn is_inverted_list(&self) -> bool {
        self.kind().is_inverted_list()
    }

    /// Whether this node produces scores.
    pub fn is_score_operator(&self) -> bool {
        !self.is_inverted_list()
    }

    /// The field of an inverted-list node (the first child's for operators).
    pub fn field(&self) -> Option<Field> {
        match self {
            QueryNode::Term(t) => Some(t.field),
            QueryNode::Syn(args)
            | QueryNode::Near { args, .. }
            | QueryNode::Window { args, .. } => args.first().and_then(QueryNode::field),
            _ => None,
        }
    }

    /// Direct children in argument order.
    pub fn children(&self) -> Vec<&QueryNode> {
        match self {
            QueryNode::Term(_) => Vec::new(),
            QueryNode::Syn(args)
            | QueryNode::Near { args, .. }
            | QueryNode::Window { args, .. }
            | QueryNode::And(args)
            | QueryNode::Or(args)
            | QueryNode::Sum(args) => args.iter().collect(),
            QueryNode::WAnd(args) | QueryNode::WSum(args) => {
                args.iter().map(|w| &w.node).collect()
            }
            QueryNode::Score(child) => vec![child.as_ref()],
        }
    }

    /// Distinct term strings of all leaves, in order of first appearance.
    pub fn terms(&self) -> Vec<String> {
        let mut terms = Vec::new();
        self.collect_terms(&mut terms);
        terms
    }

    fn collect_terms(&self, out: &mut Vec<String>) {
        if let QueryNode::Term(t) = self {
            if !out.contains(&t.term) {
                out.push(t.term.clone());
            }
            return;
        }
        for child in self.children() {
            child.collect_terms(out);
        }
    }
}

fn write_args(f: &mut fmt::Formatter<'_>, args: &[QueryNode]) -> fmt::Result {
    for arg in args {
        write!(f, " {arg}")?;
    }
    f.write_str(" )")
}

fn write_weighted(f: &mut fmt::Formatter<'_>, args: &[Weighted]) -> fmt::Result {
    for arg in args {
        write!(f, " {} {}", arg.weight, arg.node)?;
    }
    f.write_str(" )")
}

/// Prints the query back in the query language. Score wrappers are implicit
/// in the language and are not printed.
impl fmt::Display for QueryNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryNode::Term(t) => write!(f, "{}.{}", t.term, t.field),
            QueryNode::Near { distance, args } => {
                write!(f, "#near/{distance}(")?;
                write_args(f, args)
            }
            QueryNode::Window { span, args } => {
                write!(f, "#window/{span}(")?;
                write_args(f, args)
            }
            QueryNode::Syn(args) | QueryNode::And(args) | QueryNode::Or(args) | QueryNode::Sum(args) => {
                write!(f, "{}(", self.kind())?;
                write_args(f, args)
            }
            QueryNode::WAnd(args) | QueryNode::WSum(args) => {
                write!(f, "{}(", self.kind())?;
                write_weighted(f, args)
            }
            QueryNode::Score(child) => write!(f, "{child}"),
        }
    }
}
