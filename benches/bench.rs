//! Criterion benchmarks for qeval.
//!
//! Covers the proximity operators and end-to-end evaluation under each
//! retrieval model, over a synthetic corpus with a skewed term distribution.

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use qeval::analysis::analyzer::StandardAnalyzer;
use qeval::engine::QueryEngine;
use qeval::index::{IndexDocument, MemoryIndex};
use qeval::model::RetrievalModel;
use qeval::schema::Field;

const VOCABULARY: &[&str] = &[
    "search", "engine", "query", "document", "field", "term", "phrase", "boolean", "proximity",
    "window", "relevance", "score", "ranking", "feedback", "expansion", "model", "smoothing",
    "retrieval", "index", "posting", "cursor", "corpus", "collection", "frequency",
];

/// Generate a corpus where low-index vocabulary words are more frequent.
fn generate_index(doc_count: usize, seed: u64) -> MemoryIndex {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut index = MemoryIndex::new();

    for i in 0..doc_count {
        let length = rng.random_range(20..120);
        let body: Vec<&str> = (0..length)
            .map(|_| {
                let a = rng.random_range(0..VOCABULARY.len());
                let b = rng.random_range(0..VOCABULARY.len());
                VOCABULARY[a.min(b)]
            })
            .collect();
        let title: Vec<&str> = body.iter().take(4).copied().collect();

        index
            .add_document(
                IndexDocument::new(format!("doc-{i:06}"))
                    .field(Field::Body, body)
                    .field(Field::Title, title),
            )
            .unwrap();
    }

    index
}

fn engine(doc_count: usize) -> QueryEngine {
    QueryEngine::new(
        Arc::new(generate_index(doc_count, 42)),
        Arc::new(StandardAnalyzer::new()),
    )
}

/// Benchmark derived posting lists.
fn bench_proximity(c: &mut Criterion) {
    let mut group = c.benchmark_group("proximity");
    let engine = engine(5_000);
    let model = RetrievalModel::RankedBoolean;

    group.throughput(Throughput::Elements(5_000));
    group.bench_function("near_2", |b| {
        b.iter(|| black_box(engine.search(black_box("#near/2(search engine)"), &model)))
    });
    group.bench_function("window_8", |b| {
        b.iter(|| black_box(engine.search(black_box("#window/8(query document term)"), &model)))
    });
    group.bench_function("syn", |b| {
        b.iter(|| black_box(engine.search(black_box("#syn(score ranking relevance)"), &model)))
    });

    group.finish();
}

/// Benchmark full query evaluation under every model.
fn bench_models(c: &mut Criterion) {
    let mut group = c.benchmark_group("evaluation");
    let engine = engine(5_000);

    let cases = [
        ("unranked_and", RetrievalModel::UnrankedBoolean, "#and(search engine query)"),
        ("ranked_or", RetrievalModel::RankedBoolean, "search engine query"),
        ("bm25_sum", RetrievalModel::bm25(1.2, 0.75, 0.0), "search engine #near/3(query term)"),
        (
            "indri_and",
            RetrievalModel::query_likelihood(2500.0, 0.4),
            "#wand(0.7 search 0.3 #window/6(engine query))",
        ),
    ];

    group.throughput(Throughput::Elements(5_000));
    for (name, model, query) in cases {
        group.bench_function(name, |b| {
            b.iter(|| black_box(engine.search(black_box(query), &model)))
        });
    }

    group.finish();
}

/// Benchmark building the in-memory index.
fn bench_indexing(c: &mut Criterion) {
    let mut group = c.benchmark_group("indexing");
    group.sample_size(20);

    group.throughput(Throughput::Elements(1_000));
    group.bench_function("memory_index_1000_docs", |b| {
        b.iter(|| black_box(generate_index(1_000, 7)))
    });

    group.finish();
}

criterion_group!(benches, bench_proximity, bench_models, bench_indexing);
criterion_main!(benches);
