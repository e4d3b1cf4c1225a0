//! Property tests for the Boolean operators and the optimizer.

use std::collections::BTreeSet;
use std::sync::Arc;

use proptest::prelude::*;

use qeval::analysis::analyzer::StandardAnalyzer;
use qeval::engine::QueryEngine;
use qeval::index::{DocId, IndexDocument, MemoryIndex};
use qeval::model::RetrievalModel;
use qeval::query::{QueryNode, QueryParser, Weighted, optimize};
use qeval::schema::Field;

const MAX_DOCS: u64 = 40;

/// Build an index where document `d` contains `t{i}` iff `d` is in `sets[i]`.
fn engine_for(sets: &[BTreeSet<DocId>]) -> QueryEngine {
    let mut index = MemoryIndex::new();
    for doc in 0..MAX_DOCS {
        let mut body = vec!["filler".to_string()];
        for (i, set) in sets.iter().enumerate() {
            if set.contains(&doc) {
                body.push(format!("t{i}"));
            }
        }
        index
            .add_document(IndexDocument::new(format!("d{doc:03}")).field(Field::Body, body))
            .unwrap();
    }
    QueryEngine::new(Arc::new(index), Arc::new(StandardAnalyzer::new()))
}

fn query_over(op: &str, count: usize) -> String {
    let terms: Vec<String> = (0..count).map(|i| format!("t{i}")).collect();
    format!("{op}({})", terms.join(" "))
}

fn matched(engine: &QueryEngine, query: &str) -> BTreeSet<DocId> {
    engine
        .search(query, &RetrievalModel::UnrankedBoolean)
        .unwrap()
        .iter()
        .map(|d| d.doc_id)
        .collect()
}

fn doc_sets() -> impl Strategy<Value = Vec<BTreeSet<DocId>>> {
    prop::collection::vec(prop::collection::btree_set(0..MAX_DOCS, 0..20), 1..5)
}

proptest! {
    #[test]
    fn and_matches_the_intersection(sets in doc_sets()) {
        let engine = engine_for(&sets);

        let mut expected = sets[0].clone();
        for set in &sets[1..] {
            expected = expected.intersection(set).copied().collect();
        }

        prop_assert_eq!(matched(&engine, &query_over("#and", sets.len())), expected);
    }

    #[test]
    fn or_matches_the_union(sets in doc_sets()) {
        let engine = engine_for(&sets);

        let expected: BTreeSet<DocId> = sets.iter().flatten().copied().collect();

        prop_assert_eq!(matched(&engine, &query_over("#or", sets.len())), expected);
    }

    #[test]
    fn syn_matches_the_union(sets in doc_sets()) {
        let engine = engine_for(&sets);

        let expected: BTreeSet<DocId> = sets.iter().flatten().copied().collect();

        prop_assert_eq!(matched(&engine, &query_over("#syn", sets.len())), expected);
    }

    #[test]
    fn optimize_is_idempotent(query in score_tree()) {
        let once = optimize(query);
        let twice = once.clone().and_then(optimize);
        prop_assert_eq!(once, twice);
    }
}

fn term() -> impl Strategy<Value = QueryNode> {
    prop::sample::select(vec!["apple", "pie", "tart", "plum"])
        .prop_map(|t| QueryNode::term(t, Field::Body))
}

fn inverted_tree() -> impl Strategy<Value = QueryNode> {
    term().prop_recursive(3, 12, 3, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(QueryNode::Syn),
            (1u32..5, prop::collection::vec(inner.clone(), 0..3))
                .prop_map(|(distance, args)| QueryNode::Near { distance, args }),
            (1u32..5, prop::collection::vec(inner, 0..3))
                .prop_map(|(span, args)| QueryNode::Window { span, args }),
        ]
    })
}

fn score_tree() -> impl Strategy<Value = QueryNode> {
    let leaf = prop_oneof![
        inverted_tree(),
        inverted_tree().prop_map(QueryNode::score),
    ];
    leaf.prop_recursive(3, 16, 3, |inner| {
        let weighted = prop::collection::vec(
            (0.1f64..5.0, inner.clone()).prop_map(|(w, n)| Weighted::new(w, n)),
            0..3,
        );
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..3).prop_map(QueryNode::And),
            prop::collection::vec(inner.clone(), 0..3).prop_map(QueryNode::Or),
            prop::collection::vec(inner, 0..3).prop_map(QueryNode::Sum),
            weighted.clone().prop_map(QueryNode::WAnd),
            weighted.prop_map(QueryNode::WSum),
        ]
    })
}

#[test]
fn test_nested_single_argument_and_collapses_to_scored_term() {
    let parser = QueryParser::new(Arc::new(StandardAnalyzer::new()));
    let parsed = parser.parse_raw("#and(#and(dog))").unwrap();
    assert_eq!(
        optimize(parsed),
        Some(QueryNode::score(QueryNode::term("dog", Field::Body)))
    );
}
