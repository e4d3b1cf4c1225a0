//! Score operators.
//!
//! The evaluation tree mirrors the optimized query: every inverted-list
//! argument of a score operator becomes a [`ScoreNode::Leaf`] over its
//! materialized postings, every score operator a [`ScoreNode::Compound`].
//! How an operator combines its children under a retrieval model is decided
//! once, when the tree is built, by [`combine_rule`]; an operator the model
//! does not define is rejected there.

use std::fmt;

use crate::error::{QevalError, Result};
use crate::index::posting::DocId;
use crate::index::reader::IndexReader;
use crate::model::{Bm25TermStats, ModelKind, RetrievalModel};
use crate::query::cursor::{DocCursor, PostingCursor, match_all, match_min};
use crate::query::inverted::{InvertedListCache, materialize};
use crate::query::node::QueryNode;
use crate::schema::Field;

/// Everything a scoring call needs to know about the document being scored.
#[derive(Debug, Clone, Copy)]
pub struct ScoringContext<'a> {
    /// The index being searched.
    pub index: &'a dyn IndexReader,
    /// The active retrieval model.
    pub model: &'a RetrievalModel,
    /// The document under evaluation.
    pub doc: DocId,
}

/// Score operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOperator {
    And,
    Or,
    Sum,
    WAnd,
    WSum,
}

impl fmt::Display for ScoreOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScoreOperator::And => "#and",
            ScoreOperator::Or => "#or",
            ScoreOperator::Sum => "#sum",
            ScoreOperator::WAnd => "#wand",
            ScoreOperator::WSum => "#wsum",
        };
        f.write_str(name)
    }
}

/// How a compound operator combines its children's scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CombineRule {
    /// Every match scores 1.
    Constant,
    /// Minimum of the matching children.
    Min,
    /// Maximum of the matching children.
    Max,
    /// Sum of the matching children.
    Sum,
    /// `Π s_i^(w_i/Σw)`, defaults for children not on the document.
    GeometricMean,
    /// `1 − Π(1 − s_i)`, defaults for children not on the document.
    ProbabilisticOr,
    /// `Σ (w_i/Σw)·s_i`, defaults for children not on the document.
    WeightedMean,
}

impl CombineRule {
    /// Whether children that do not match contribute a default score.
    fn uses_defaults(&self) -> bool {
        matches!(
            self,
            CombineRule::GeometricMean | CombineRule::ProbabilisticOr | CombineRule::WeightedMean
        )
    }
}

/// Which documents a compound operator matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchMode {
    /// Documents matched by every child.
    All,
    /// Documents matched by any child.
    Any,
}

/// The operator × model dispatch table.
pub fn combine_rule(op: ScoreOperator, model: ModelKind) -> Result<CombineRule> {
    use CombineRule::*;
    use ModelKind::*;

    let rule = match (op, model) {
        (ScoreOperator::And | ScoreOperator::WAnd | ScoreOperator::Or, UnrankedBoolean) => {
            Constant
        }
        (ScoreOperator::And | ScoreOperator::WAnd, RankedBoolean) => Min,
        (ScoreOperator::Or, RankedBoolean) => Max,
        (ScoreOperator::Sum, Bm25) => Sum,
        (ScoreOperator::And | ScoreOperator::WAnd, QueryLikelihood) => GeometricMean,
        (ScoreOperator::Or, QueryLikelihood) => ProbabilisticOr,
        (ScoreOperator::WSum, QueryLikelihood) => WeightedMean,
        (ScoreOperator::And | ScoreOperator::WAnd | ScoreOperator::Or, Bm25)
        | (ScoreOperator::Sum, UnrankedBoolean | RankedBoolean | QueryLikelihood)
        | (ScoreOperator::WSum, UnrankedBoolean | RankedBoolean | Bm25) => {
            return Err(QevalError::model_mismatch(format!(
                "{op} is not supported by the {model} retrieval model"
            )));
        }
    };

    Ok(rule)
}

/// Conjunctions need every child, except under query likelihood, where a
/// missing term still contributes its smoothed probability.
pub fn match_mode(op: ScoreOperator, model: ModelKind) -> MatchMode {
    match (op, model) {
        (ScoreOperator::And | ScoreOperator::WAnd, ModelKind::QueryLikelihood) => MatchMode::Any,
        (ScoreOperator::And | ScoreOperator::WAnd, _) => MatchMode::All,
        (ScoreOperator::Or | ScoreOperator::Sum | ScoreOperator::WSum, _) => MatchMode::Any,
    }
}

/// A score source over one inverted list.
#[derive(Debug, Clone)]
pub struct ScoreLeaf {
    cursor: PostingCursor,
    field: Field,
}

impl ScoreLeaf {
    fn score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        match ctx.model {
            RetrievalModel::UnrankedBoolean => Ok(1.0),
            RetrievalModel::RankedBoolean => Ok(self.cursor.tf() as f64),
            RetrievalModel::Bm25(bm25) => {
                let stats = Bm25TermStats {
                    doc_count: ctx.index.doc_count(),
                    doc_freq: self.cursor.list().df(),
                    term_freq: self.cursor.tf(),
                    doc_length: ctx.index.field_length(self.field, ctx.doc)?,
                    avg_doc_length: bm25.average_field_length(ctx.index, self.field),
                };
                Ok(bm25.term_score(&stats))
            }
            RetrievalModel::QueryLikelihood(_) => self.query_likelihood(ctx, self.cursor.tf()),
        }
    }

    fn default_score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        match ctx.model {
            RetrievalModel::QueryLikelihood(_) => self.query_likelihood(ctx, 0),
            _ => Ok(0.0),
        }
    }

    fn query_likelihood(&self, ctx: &ScoringContext<'_>, tf: u64) -> Result<f64> {
        let RetrievalModel::QueryLikelihood(ql) = ctx.model else {
            return Ok(0.0);
        };
        Ok(ql.term_score(
            tf,
            self.cursor.list().ctf(),
            ctx.index.sum_of_field_lengths(self.field),
            ctx.index.field_length(self.field, ctx.doc)?,
        ))
    }
}

/// A score operator over child score nodes.
#[derive(Debug, Clone)]
pub struct CompoundScore {
    op: ScoreOperator,
    rule: CombineRule,
    mode: MatchMode,
    children: Vec<ScoreNode>,
    weights: Vec<f64>,
    weight_total: f64,
    current: Option<DocId>,
}

impl CompoundScore {
    fn new(
        op: ScoreOperator,
        model: ModelKind,
        children: Vec<ScoreNode>,
        weights: Vec<f64>,
    ) -> Result<Self> {
        let rule = combine_rule(op, model)?;
        let weight_total = weights.iter().sum();
        let mut compound = CompoundScore {
            op,
            rule,
            mode: match_mode(op, model),
            children,
            weights,
            weight_total,
            current: None,
        };
        compound.sync();
        Ok(compound)
    }

    /// The operator.
    pub fn op(&self) -> ScoreOperator {
        self.op
    }

    /// The combination rule chosen for the active model.
    pub fn rule(&self) -> CombineRule {
        self.rule
    }

    fn sync(&mut self) {
        self.current = match self.mode {
            MatchMode::All => match_all(&mut self.children),
            MatchMode::Any => match_min(&self.children),
        };
    }

    fn combine(&self, ctx: &ScoringContext<'_>, on_document: bool) -> Result<f64> {
        if self.rule == CombineRule::Constant {
            return Ok(1.0);
        }

        let mut matched = Vec::with_capacity(self.children.len());
        for child in &self.children {
            let score = if on_document && child.current() == Some(ctx.doc) {
                Some(child.score(ctx)?)
            } else if self.rule.uses_defaults() {
                Some(child.default_score(ctx)?)
            } else {
                None
            };
            matched.push(score);
        }

        let score: f64 = match self.rule {
            CombineRule::Constant => 1.0,
            CombineRule::Min => matched.iter().flatten().copied().reduce(f64::min).unwrap_or(0.0),
            CombineRule::Max => matched.iter().flatten().copied().reduce(f64::max).unwrap_or(0.0),
            CombineRule::Sum => matched.iter().flatten().sum(),
            CombineRule::GeometricMean => matched
                .iter()
                .zip(&self.weights)
                .map(|(s, w)| s.unwrap_or(0.0).powf(w / self.weight_total))
                .product(),
            CombineRule::ProbabilisticOr => {
                1.0 - matched
                    .iter()
                    .map(|s| 1.0 - s.unwrap_or(0.0))
                    .product::<f64>()
            }
            CombineRule::WeightedMean => matched
                .iter()
                .zip(&self.weights)
                .map(|(s, w)| w / self.weight_total * s.unwrap_or(0.0))
                .sum(),
        };

        Ok(score)
    }
}

/// A node of the evaluation tree.
#[derive(Debug, Clone)]
pub enum ScoreNode {
    Leaf(ScoreLeaf),
    Compound(CompoundScore),
}

impl ScoreNode {
    /// Build the evaluation tree of an optimized query.
    ///
    /// Inverted-list subtrees are materialized here, so all postings are
    /// fixed before the first document is scored.
    pub fn build(
        node: &QueryNode,
        model: &RetrievalModel,
        cache: &mut InvertedListCache<'_>,
    ) -> Result<ScoreNode> {
        let kind = model.kind();

        let (op, children, weights) = match node {
            QueryNode::Score(child) => return Self::leaf(child, cache),
            QueryNode::Term(_)
            | QueryNode::Syn(_)
            | QueryNode::Near { .. }
            | QueryNode::Window { .. } => return Self::leaf(node, cache),
            QueryNode::And(args) => (ScoreOperator::And, args.iter().collect::<Vec<_>>(), None),
            QueryNode::Or(args) => (ScoreOperator::Or, args.iter().collect(), None),
            QueryNode::Sum(args) => (ScoreOperator::Sum, args.iter().collect(), None),
            QueryNode::WAnd(args) => (
                ScoreOperator::WAnd,
                args.iter().map(|w| &w.node).collect(),
                Some(args.iter().map(|w| w.weight).collect::<Vec<_>>()),
            ),
            QueryNode::WSum(args) => (
                ScoreOperator::WSum,
                args.iter().map(|w| &w.node).collect(),
                Some(args.iter().map(|w| w.weight).collect()),
            ),
        };

        // Reject the operator before materializing anything below it.
        combine_rule(op, kind)?;

        let mut built = Vec::with_capacity(children.len());
        for child in children {
            built.push(Self::build(child, model, cache)?);
        }
        let weights = weights.unwrap_or_else(|| vec![1.0; built.len()]);

        Ok(ScoreNode::Compound(CompoundScore::new(
            op, kind, built, weights,
        )?))
    }

    fn leaf(node: &QueryNode, cache: &mut InvertedListCache<'_>) -> Result<ScoreNode> {
        let list = materialize(node, cache)?;
        Ok(ScoreNode::Leaf(ScoreLeaf {
            field: list.field(),
            cursor: PostingCursor::new(list),
        }))
    }

    /// Score of the document in `ctx`, which this node must be on.
    pub fn score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        match self {
            ScoreNode::Leaf(leaf) => leaf.score(ctx),
            ScoreNode::Compound(compound) => compound.combine(ctx, true),
        }
    }

    /// Score of a document this node does not match.
    pub fn default_score(&self, ctx: &ScoringContext<'_>) -> Result<f64> {
        match self {
            ScoreNode::Leaf(leaf) => leaf.default_score(ctx),
            ScoreNode::Compound(compound) if compound.rule.uses_defaults() => {
                compound.combine(ctx, false)
            }
            ScoreNode::Compound(_) => Ok(0.0),
        }
    }
}

impl DocCursor for ScoreNode {
    fn current(&self) -> Option<DocId> {
        match self {
            ScoreNode::Leaf(leaf) => leaf.cursor.current(),
            ScoreNode::Compound(compound) => compound.current,
        }
    }

    fn advance_to(&mut self, target: DocId) {
        match self {
            ScoreNode::Leaf(leaf) => leaf.cursor.advance_to(target),
            ScoreNode::Compound(compound) => {
                if compound.current.is_none_or(|doc| doc >= target) {
                    return;
                }
                for child in compound.children.iter_mut() {
                    child.advance_to(target);
                }
                compound.sync();
            }
        }
    }

    fn advance_past(&mut self, target: DocId) {
        match self {
            ScoreNode::Leaf(leaf) => leaf.cursor.advance_past(target),
            ScoreNode::Compound(compound) => {
                if compound.current.is_none_or(|doc| doc > target) {
                    return;
                }
                for child in compound.children.iter_mut() {
                    child.advance_past(target);
                }
                compound.sync();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{IndexDocument, MemoryIndex};
    use crate::model::QueryLikelihoodModel;
    use crate::query::node::Weighted;

    fn index() -> MemoryIndex {
        let mut index = MemoryIndex::new();
        let docs: [&[&str]; 6] = [
            &["dog", "cat", "dog"],
            &["dog", "bird"],
            &["cat"],
            &["fish"],
            &["fish", "bird"],
            &["cow"],
        ];
        for (i, terms) in docs.iter().enumerate() {
            index
                .add_document(IndexDocument::new(format!("d{i}")).field(Field::Body, terms.iter().copied()))
                .unwrap();
        }
        index
    }

    fn term(t: &str) -> QueryNode {
        QueryNode::score(QueryNode::term(t, Field::Body))
    }

    fn run(index: &MemoryIndex, query: &QueryNode, model: &RetrievalModel) -> Result<Vec<(DocId, f64)>> {
        let mut cache = InvertedListCache::new(index);
        let mut root = ScoreNode::build(query, model, &mut cache)?;
        let mut out = Vec::new();
        while let Some(doc) = root.current() {
            let ctx = ScoringContext { index, model, doc };
            out.push((doc, root.score(&ctx)?));
            root.advance_past(doc);
        }
        Ok(out)
    }

    fn ql(index: &MemoryIndex, model: &QueryLikelihoodModel, t: &str, tf: u64, doc: DocId) -> f64 {
        let stats = index.term_stats(Field::Body, t).unwrap();
        model.term_score(
            tf,
            stats.total_freq,
            index.sum_of_field_lengths(Field::Body),
            index.field_length(Field::Body, doc).unwrap(),
        )
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!((actual - expected).abs() < 1e-12, "{actual} != {expected}");
    }

    #[test]
    fn test_unranked_and_is_intersection() {
        let index = index();
        let query = QueryNode::And(vec![term("dog"), term("cat")]);

        let results = run(&index, &query, &RetrievalModel::UnrankedBoolean).unwrap();
        assert_eq!(results, vec![(0, 1.0)]);
    }

    #[test]
    fn test_ranked_boolean() {
        let index = index();
        let model = RetrievalModel::RankedBoolean;

        let or = QueryNode::Or(vec![term("dog"), term("cat")]);
        assert_eq!(
            run(&index, &or, &model).unwrap(),
            vec![(0, 2.0), (1, 1.0), (2, 1.0)]
        );

        let and = QueryNode::And(vec![term("dog"), term("cat")]);
        assert_eq!(run(&index, &and, &model).unwrap(), vec![(0, 1.0)]);
    }

    #[test]
    fn test_bm25_sum() {
        let index = index();
        let model = RetrievalModel::bm25(1.2, 0.75, 0.0);
        let RetrievalModel::Bm25(bm25) = &model else {
            unreachable!()
        };

        let query = QueryNode::Sum(vec![term("dog"), term("bird")]);
        let results = run(&index, &query, &model).unwrap();
        let docs: Vec<DocId> = results.iter().map(|r| r.0).collect();
        assert_eq!(docs, vec![0, 1, 4]);

        let avg = 10.0 / 6.0;
        let stat = |tf, len| Bm25TermStats {
            doc_count: 6,
            doc_freq: 2,
            term_freq: tf,
            doc_length: len,
            avg_doc_length: avg,
        };
        assert_close(results[0].1, bm25.term_score(&stat(2, 3)));
        assert_close(
            results[1].1,
            bm25.term_score(&stat(1, 2)) + bm25.term_score(&stat(1, 2)),
        );
        assert!(results[0].1 > 0.0);
    }

    #[test]
    fn test_query_likelihood_and_uses_defaults() {
        let index = index();
        let params = QueryLikelihoodModel::new(10.0, 0.4);
        let model = RetrievalModel::QueryLikelihood(params);

        let query = QueryNode::And(vec![term("dog"), term("cat")]);
        let results = run(&index, &query, &model).unwrap();
        let docs: Vec<DocId> = results.iter().map(|r| r.0).collect();
        assert_eq!(docs, vec![0, 1, 2]);

        let expected =
            (ql(&index, &params, "dog", 1, 1) * ql(&index, &params, "cat", 0, 1)).sqrt();
        assert_close(results[1].1, expected);
    }

    #[test]
    fn test_query_likelihood_or_and_wsum() {
        let index = index();
        let params = QueryLikelihoodModel::new(10.0, 0.4);
        let model = RetrievalModel::QueryLikelihood(params);

        let or = QueryNode::Or(vec![term("dog"), term("cat")]);
        let results = run(&index, &or, &model).unwrap();
        let expected = 1.0
            - (1.0 - ql(&index, &params, "dog", 1, 1)) * (1.0 - ql(&index, &params, "cat", 0, 1));
        assert_close(results[1].1, expected);

        let wsum = QueryNode::WSum(vec![
            Weighted::new(3.0, term("dog")),
            Weighted::new(1.0, term("cat")),
        ]);
        let results = run(&index, &wsum, &model).unwrap();
        let expected =
            0.75 * ql(&index, &params, "dog", 0, 2) + 0.25 * ql(&index, &params, "cat", 1, 2);
        assert_eq!(results[2].0, 2);
        assert_close(results[2].1, expected);
    }

    #[test]
    fn test_nested_default_score() {
        let index = index();
        let params = QueryLikelihoodModel::new(10.0, 0.4);
        let model = RetrievalModel::QueryLikelihood(params);

        let query = QueryNode::And(vec![
            term("cat"),
            QueryNode::Or(vec![term("dog"), term("bird")]),
        ]);
        let results = run(&index, &query, &model).unwrap();
        let doc2 = results.iter().find(|r| r.0 == 2).unwrap().1;

        let or_default = 1.0
            - (1.0 - ql(&index, &params, "dog", 0, 2)) * (1.0 - ql(&index, &params, "bird", 0, 2));
        let expected = (ql(&index, &params, "cat", 1, 2) * or_default).sqrt();
        assert_close(doc2, expected);
    }

    #[test]
    fn test_weighted_and_under_boolean_requires_all() {
        let index = index();
        let query = QueryNode::WAnd(vec![
            Weighted::new(0.2, term("fish")),
            Weighted::new(0.8, term("bird")),
        ]);

        let results = run(&index, &query, &RetrievalModel::UnrankedBoolean).unwrap();
        assert_eq!(results, vec![(4, 1.0)]);
    }

    #[test]
    fn test_model_mismatch() {
        let index = index();

        let sum = QueryNode::Sum(vec![term("dog"), term("cat")]);
        let err = run(&index, &sum, &RetrievalModel::UnrankedBoolean).unwrap_err();
        assert!(matches!(err, QevalError::ModelMismatch(_)));

        let and = QueryNode::And(vec![term("dog"), term("cat")]);
        let err = run(&index, &and, &RetrievalModel::bm25(1.2, 0.75, 0.0)).unwrap_err();
        assert!(matches!(err, QevalError::ModelMismatch(_)));

        let wsum = QueryNode::WSum(vec![Weighted::new(1.0, term("dog"))]);
        let err = run(&index, &wsum, &RetrievalModel::RankedBoolean).unwrap_err();
        assert!(matches!(err, QevalError::ModelMismatch(_)));
    }

    #[test]
    fn test_advance_to_skips_documents() {
        let index = index();
        let model = RetrievalModel::UnrankedBoolean;
        let mut cache = InvertedListCache::new(&index);
        let query = QueryNode::Or(vec![term("dog"), term("fish"), term("cow")]);
        let mut root = ScoreNode::build(&query, &model, &mut cache).unwrap();

        assert_eq!(root.current(), Some(0));
        root.advance_to(2);
        assert_eq!(root.current(), Some(3));
        root.advance_to(1);
        assert_eq!(root.current(), Some(3));
        root.advance_past(4);
        assert_eq!(root.current(), Some(5));
        root.advance_past(5);
        assert!(root.is_exhausted());
    }
}
