//! Parser for the structured query language.
//!
//! ```text
//! #and( #near/1( white house ) obama.title )
//! #wsum( 0.7 #syn( car automobile ) 0.3 engine.body )
//! ```
//!
//! Parsing is a single left-to-right pass over the tokens with an explicit
//! operator stack. The whole query is wrapped in the retrieval model's
//! default operator before parsing, so bare term lists are valid queries.

use std::sync::Arc;

use log::debug;

use crate::analysis::analyzer::Analyzer;
use crate::error::{QevalError, Result};
use crate::model::RetrievalModel;
use crate::query::node::{OperatorKind, QueryNode, TermNode, Weighted};
use crate::query::optimizer::optimize;
use crate::schema::Field;

/// Query parser.
#[derive(Debug, Clone)]
pub struct QueryParser {
    analyzer: Arc<dyn Analyzer>,
}

/// An operator waiting for its closing parenthesis.
#[derive(Debug)]
struct Frame {
    kind: OperatorKind,
    param: u32,
    args: Vec<QueryNode>,
    weights: Vec<f64>,
    pending_weight: Option<f64>,
}

impl Frame {
    fn new(kind: OperatorKind, param: u32) -> Self {
        Frame {
            kind,
            param,
            args: Vec::new(),
            weights: Vec::new(),
            pending_weight: None,
        }
    }

    /// Add a finished argument, consuming the pending weight of weighted operators.
    fn push_arg(&mut self, node: QueryNode, weight: Option<f64>) -> Result<()> {
        let node = if self.kind.is_inverted_list() {
            if node.is_score_operator() {
                return Err(QevalError::query_syntax(format!(
                    "{} cannot be an argument of {}",
                    node.kind(),
                    self.kind
                )));
            }
            if let Some(first) = self.args.first().and_then(QueryNode::field) {
                if node.field().is_some_and(|field| field != first) {
                    return Err(QevalError::query_syntax(format!(
                        "arguments of {} must share one field",
                        self.kind
                    )));
                }
            }
            node
        } else if node.is_inverted_list() {
            QueryNode::score(node)
        } else {
            node
        };

        if self.kind.is_weighted() {
            let weight = weight.ok_or_else(|| {
                QevalError::query_syntax(format!("missing weight in {}", self.kind))
            })?;
            self.weights.push(weight);
        }
        self.args.push(node);
        Ok(())
    }

    fn finish(self) -> Result<QueryNode> {
        if self.pending_weight.is_some() {
            return Err(QevalError::query_syntax(format!(
                "weight without an argument in {}",
                self.kind
            )));
        }

        let node = match self.kind {
            OperatorKind::Syn => QueryNode::Syn(self.args),
            OperatorKind::Near => QueryNode::Near {
                distance: self.param,
                args: self.args,
            },
            OperatorKind::Window => QueryNode::Window {
                span: self.param,
                args: self.args,
            },
            OperatorKind::And => QueryNode::And(self.args),
            OperatorKind::Or => QueryNode::Or(self.args),
            OperatorKind::Sum => QueryNode::Sum(self.args),
            OperatorKind::WAnd | OperatorKind::WSum => {
                if self.weights.len() != self.args.len() {
                    return Err(QevalError::query_syntax(format!(
                        "{} has {} weights for {} arguments",
                        self.kind,
                        self.weights.len(),
                        self.args.len()
                    )));
                }
                let args = self
                    .weights
                    .into_iter()
                    .zip(self.args)
                    .map(|(weight, node)| Weighted::new(weight, node))
                    .collect();
                if self.kind == OperatorKind::WAnd {
                    QueryNode::WAnd(args)
                } else {
                    QueryNode::WSum(args)
                }
            }
            OperatorKind::Term | OperatorKind::Score => {
                return Err(QevalError::query_syntax(format!(
                    "{} is not a query operator",
                    self.kind
                )));
            }
        };

        Ok(node)
    }
}

impl QueryParser {
    /// Create a new query parser using the given analyzer for query terms.
    pub fn new(analyzer: Arc<dyn Analyzer>) -> Self {
        QueryParser { analyzer }
    }

    /// Get the analyzer.
    pub fn analyzer(&self) -> &Arc<dyn Analyzer> {
        &self.analyzer
    }

    /// Parse a query, wrapped in the model's default operator.
    pub fn parse(&self, query: &str, model: &RetrievalModel) -> Result<QueryNode> {
        self.parse_with_default(query, model.default_operator())
    }

    /// Parse a query wrapped in the given default operator (e.g. `#and`).
    pub fn parse_with_default(&self, query: &str, default_operator: &str) -> Result<QueryNode> {
        let wrapped = format!("{default_operator}({query})");
        self.parse_raw(&wrapped)
    }

    /// Parse and optimize. Returns `None` when nothing searchable remains.
    pub fn parse_optimized(&self, query: &str, model: &RetrievalModel) -> Result<Option<QueryNode>> {
        let parsed = self.parse(query, model)?;
        let optimized = optimize(parsed);
        match &optimized {
            Some(node) => debug!("Optimized query: {node}"),
            None => debug!("Query '{query}' has no searchable terms"),
        }
        Ok(optimized)
    }

    /// Parse a query that must consist of exactly one top-level operator.
    pub fn parse_raw(&self, query: &str) -> Result<QueryNode> {
        let tokens = tokenize(query);
        let mut stack: Vec<Frame> = Vec::new();
        let mut root: Option<QueryNode> = None;
        let mut i = 0;

        while i < tokens.len() {
            let token = tokens[i];
            i += 1;

            if root.is_some() {
                return Err(QevalError::query_syntax(format!(
                    "unexpected token '{token}' after the end of the query"
                )));
            }

            match token {
                "(" => {
                    return Err(QevalError::query_syntax(
                        "'(' must follow an operator name",
                    ));
                }
                ")" => {
                    let frame = stack.pop().ok_or_else(|| {
                        QevalError::query_syntax("unbalanced parentheses: unexpected ')'")
                    })?;
                    let node = frame.finish()?;
                    match stack.last_mut() {
                        Some(parent) => {
                            let weight = parent.pending_weight.take();
                            parent.push_arg(node, weight)?;
                        }
                        None => root = Some(node),
                    }
                }
                _ if token.starts_with('#') => {
                    if let Some(parent) = stack.last() {
                        if parent.kind.is_weighted() && parent.pending_weight.is_none() {
                            return Err(QevalError::query_syntax(format!(
                                "malformed weight: expected a weight before '{token}'"
                            )));
                        }
                    }
                    let (kind, param) = parse_operator(token)?;
                    if tokens.get(i) != Some(&"(") {
                        return Err(QevalError::query_syntax(format!(
                            "operator '{token}' must be followed by '('"
                        )));
                    }
                    i += 1;
                    stack.push(Frame::new(kind, param));
                }
                _ => {
                    let frame = stack.last_mut().ok_or_else(|| {
                        QevalError::query_syntax(format!("term '{token}' outside of an operator"))
                    })?;

                    if frame.kind.is_weighted() && frame.pending_weight.is_none() {
                        frame.pending_weight = Some(parse_weight(token)?);
                        continue;
                    }

                    let weight = frame.pending_weight.take();
                    for term in self.analyze_token(token)? {
                        frame.push_arg(QueryNode::Term(term), weight)?;
                    }
                }
            }
        }

        if !stack.is_empty() {
            return Err(QevalError::query_syntax(
                "unbalanced parentheses: missing ')'",
            ));
        }

        root.ok_or_else(|| QevalError::query_syntax("empty query"))
    }

    /// Split an optional `.field` suffix and run the analyzer. A token may
    /// produce no terms (a stop word) or several.
    fn analyze_token(&self, token: &str) -> Result<Vec<TermNode>> {
        let (text, field) = match token.split_once('.') {
            Some((text, field)) => (text, field.parse::<Field>()?),
            None => (token, Field::default()),
        };

        Ok(self
            .analyzer
            .analyze(text)?
            .into_iter()
            .map(|term| TermNode::new(term, field))
            .collect())
    }
}

/// Split a query into tokens. Whitespace and commas separate tokens;
/// parentheses are tokens of their own.
fn tokenize(query: &str) -> Vec<&str> {
    let mut tokens = Vec::new();
    let mut start = None;

    for (i, c) in query.char_indices() {
        let is_delimiter = matches!(c, ' ' | '\t' | '\n' | '\r' | ',' | '(' | ')');
        if is_delimiter {
            if let Some(s) = start.take() {
                tokens.push(&query[s..i]);
            }
            if c == '(' || c == ')' {
                tokens.push(&query[i..i + 1]);
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        tokens.push(&query[s..]);
    }

    tokens
}

fn parse_operator(token: &str) -> Result<(OperatorKind, u32)> {
    let lower = token.to_ascii_lowercase();
    let (name, param) = match lower.split_once('/') {
        Some((name, param)) => (name.to_string(), Some(param.to_string())),
        None => (lower, None),
    };

    let kind = match name.as_str() {
        "#syn" => OperatorKind::Syn,
        "#near" => OperatorKind::Near,
        "#window" => OperatorKind::Window,
        "#and" => OperatorKind::And,
        "#or" => OperatorKind::Or,
        "#sum" => OperatorKind::Sum,
        "#wand" => OperatorKind::WAnd,
        "#wsum" => OperatorKind::WSum,
        _ => {
            return Err(QevalError::query_syntax(format!(
                "unknown operator '{token}'"
            )));
        }
    };

    match (kind, param) {
        (OperatorKind::Near | OperatorKind::Window, Some(param)) => {
            let value = param
                .parse::<u32>()
                .ok()
                .filter(|v| *v > 0)
                .ok_or_else(|| {
                    QevalError::query_syntax(format!("malformed distance in '{token}'"))
                })?;
            Ok((kind, value))
        }
        (OperatorKind::Near | OperatorKind::Window, None) => Err(QevalError::query_syntax(
            format!("operator '{token}' requires a distance, e.g. {kind}/3"),
        )),
        (_, Some(_)) => Err(QevalError::query_syntax(format!(
            "operator '{token}' takes no distance"
        ))),
        (_, None) => Ok((kind, 0)),
    }
}

fn parse_weight(token: &str) -> Result<f64> {
    token
        .parse::<f64>()
        .ok()
        .filter(|w| w.is_finite() && *w > 0.0)
        .ok_or_else(|| QevalError::query_syntax(format!("malformed weight '{token}'")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::analyzer::StandardAnalyzer;

    fn parser() -> QueryParser {
        QueryParser::new(Arc::new(StandardAnalyzer::new()))
    }

    fn score(term: &str, field: Field) -> QueryNode {
        QueryNode::score(QueryNode::term(term, field))
    }

    #[test]
    fn test_tokenize() {
        assert_eq!(
            tokenize("#and(a,b  #near/2( c.title d))"),
            vec!["#and", "(", "a", "b", "#near/2", "(", "c.title", "d", ")", ")"]
        );
    }

    #[test]
    fn test_bare_terms_wrapped_in_default_operator() {
        let node = parser()
            .parse_with_default("dog cat.title", "#or")
            .unwrap();

        assert_eq!(
            node,
            QueryNode::Or(vec![score("dog", Field::Body), score("cat", Field::Title)])
        );
    }

    #[test]
    fn test_nested_operators() {
        let node = parser()
            .parse_with_default("#near/3(white house) obama", "#and")
            .unwrap();

        let expected = QueryNode::And(vec![
            QueryNode::score(QueryNode::Near {
                distance: 3,
                args: vec![
                    QueryNode::term("white", Field::Body),
                    QueryNode::term("house", Field::Body),
                ],
            }),
            score("obama", Field::Body),
        ]);
        assert_eq!(node, expected);
    }

    #[test]
    fn test_weighted_operator() {
        let node = parser()
            .parse_raw("#wsum( 0.7 #syn(car automobile) 0.3 engine )")
            .unwrap();

        match node {
            QueryNode::WSum(args) => {
                assert_eq!(args.len(), 2);
                assert_eq!(args[0].weight, 0.7);
                assert!(matches!(args[0].node, QueryNode::Score(_)));
                assert_eq!(args[1].weight, 0.3);
                assert_eq!(args[1].node, score("engine", Field::Body));
            }
            other => panic!("expected #wsum, got {other:?}"),
        }
    }

    #[test]
    fn test_stop_word_drops_argument_and_weight() {
        let node = parser()
            .parse_raw("#wand( 0.2 the 0.8 dog )")
            .unwrap();

        assert_eq!(
            node,
            QueryNode::WAnd(vec![Weighted::new(0.8, score("dog", Field::Body))])
        );
    }

    #[test]
    fn test_multi_term_token_duplicates_weight() {
        let node = parser().parse_raw("#wsum( 2 near-death )").unwrap();

        assert_eq!(
            node,
            QueryNode::WSum(vec![
                Weighted::new(2.0, score("near", Field::Body)),
                Weighted::new(2.0, score("death", Field::Body)),
            ])
        );
    }

    #[test]
    fn test_unbalanced_parentheses() {
        let p = parser();
        assert!(p.parse_raw("#and( dog").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#and( dog ) )").unwrap_err().is_query_syntax());
        assert!(p.parse_with_default("dog )", "#and").unwrap_err().is_query_syntax());
    }

    #[test]
    fn test_leftover_tokens() {
        let err = parser().parse_raw("#and( dog ) cat").unwrap_err();
        assert!(err.is_query_syntax());
    }

    #[test]
    fn test_unknown_field() {
        let err = parser().parse_with_default("dog.author", "#and").unwrap_err();
        assert!(err.is_query_syntax());
    }

    #[test]
    fn test_malformed_weight() {
        let p = parser();
        assert!(p.parse_raw("#wand( heavy dog )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#wand( -1 dog )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#wand( 0.5 dog 0.5 )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#wand( #and(dog) )").unwrap_err().is_query_syntax());
    }

    #[test]
    fn test_unknown_operator_and_bad_distance() {
        let p = parser();
        assert!(p.parse_raw("#phrase( a b )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#near( a b )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#near/x( a b )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#and/2( a b )").unwrap_err().is_query_syntax());
        assert!(p.parse_raw("#and dog").unwrap_err().is_query_syntax());
    }

    #[test]
    fn test_score_operator_inside_inverted_operator() {
        let err = parser().parse_raw("#syn( #and( a b ) c )").unwrap_err();
        assert!(err.is_query_syntax());
    }

    #[test]
    fn test_inverted_operator_fields_must_agree() {
        let err = parser().parse_raw("#near/2( a.title b.body )").unwrap_err();
        assert!(err.is_query_syntax());
        assert!(parser().parse_raw("#near/2( a.title b.title )").is_ok());
    }

    #[test]
    fn test_parse_optimized_collapses_nested_and() {
        let node = parser()
            .parse_optimized("#and(#and(dog))", &RetrievalModel::query_likelihood(2500.0, 0.4))
            .unwrap();
        assert_eq!(node, Some(score("dog", Field::Body)));
    }

    #[test]
    fn test_parse_optimized_all_stop_words() {
        let node = parser()
            .parse_optimized("the of and", &RetrievalModel::UnrankedBoolean)
            .unwrap();
        assert_eq!(node, None);
    }
}
