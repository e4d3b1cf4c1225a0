//! Learning to rank.
//!
//! Every (query, document) pair is described by [`FEATURE_COUNT`] features:
//! four document-level signals followed by BM25, query likelihood and term
//! overlap for each of the body, title, url and inlink fields. Features are
//! min/max normalized per query and written in the SVM-rank sparse format.
//! An external SVM-rank trainer learns a model from the training queries
//! and an external classifier scores the BM25 candidates of the test
//! queries, which are then re-sorted by that score.
//!
//! Feature numbers are 1-based, as in the feature files.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::Command;

use ahash::AHashMap;
use log::{debug, info, warn};

use crate::config::{LetorConfig, ModelConfig};
use crate::engine::{QueryEngine, parse_query_line, read_query_lines, write_trec_results};
use crate::error::{QevalError, Result};
use crate::index::posting::DocId;
use crate::index::reader::IndexReader;
use crate::model::{Bm25Model, QueryLikelihoodModel, RetrievalModel};
use crate::query::results::ResultList;
use crate::schema::Field;
use crate::scoring::{field_bm25, field_query_likelihood, term_overlap};

/// Number of features per (query, document) pair.
pub const FEATURE_COUNT: usize = 16;

/// Candidates re-ranked per test query.
pub const RERANK_DEPTH: usize = 100;

const SPAM_SCORE: usize = 1;
const URL_DEPTH: usize = 2;
const WIKIPEDIA: usize = 3;
const PAGE_RANK: usize = 4;
const FIRST_FIELD_FEATURE: usize = 5;

/// Feature values of one (query, document) pair.
///
/// A feature without a value (for example BM25 over a field the document
/// does not have) normalizes to 0.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureVector {
    values: [Option<f64>; FEATURE_COUNT],
}

impl FeatureVector {
    /// Create a vector without values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a feature by number.
    pub fn get(&self, feature: usize) -> Option<f64> {
        feature
            .checked_sub(1)
            .and_then(|i| self.values.get(i).copied().flatten())
    }

    /// Set a feature by number. Numbers outside `1..=FEATURE_COUNT` are ignored.
    pub fn set(&mut self, feature: usize, value: Option<f64>) {
        if let Some(slot) = feature.checked_sub(1).and_then(|i| self.values.get_mut(i)) {
            *slot = value;
        }
    }
}

/// Min/max normalize the vectors of one query in place.
///
/// Each feature becomes `(v - min) / (max - min)` over the vectors that have
/// it. A feature with `max == min`, and every missing value, becomes 0.
pub fn normalize(vectors: &mut [FeatureVector]) {
    for i in 0..FEATURE_COUNT {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        for v in vectors.iter().filter_map(|v| v.values[i]) {
            min = min.min(v);
            max = max.max(v);
        }

        for vector in vectors.iter_mut() {
            let normalized = match vector.values[i] {
                Some(v) if max > min => (v - min) / (max - min),
                _ => 0.0,
            };
            vector.values[i] = Some(normalized);
        }
    }
}

/// One line of a feature file: `label qid:Q 1:v1 2:v2 ... #extId`.
///
/// Disabled features are left out entirely.
pub fn format_feature_line(
    label: &str,
    query_id: &str,
    vector: &FeatureVector,
    disabled: &BTreeSet<usize>,
    external_id: &str,
) -> String {
    let mut line = format!("{label} qid:{query_id}");
    for feature in (1..=FEATURE_COUNT).filter(|f| !disabled.contains(f)) {
        line.push_str(&format!(" {}:{}", feature, vector.get(feature).unwrap_or(0.0)));
    }
    line.push_str(&format!(" #{external_id}"));
    line
}

/// Computes the features of (query, document) pairs.
#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    bm25: Bm25Model,
    query_likelihood: QueryLikelihoodModel,
    page_rank: AHashMap<String, f64>,
}

impl FeatureExtractor {
    /// Create an extractor without PageRank scores.
    pub fn new(bm25: Bm25Model, query_likelihood: QueryLikelihoodModel) -> Self {
        FeatureExtractor {
            bm25,
            query_likelihood,
            page_rank: AHashMap::new(),
        }
    }

    /// Use PageRank scores keyed by external document id.
    pub fn with_page_rank(mut self, page_rank: AHashMap<String, f64>) -> Self {
        self.page_rank = page_rank;
        self
    }

    /// Compute all features of one document for the given query terms.
    pub fn extract(&self, index: &dyn IndexReader, terms: &[String], doc: DocId) -> Result<FeatureVector> {
        let mut vector = FeatureVector::new();

        let spam = index
            .attribute("score", doc)?
            .and_then(|s| s.trim().parse::<f64>().ok());
        vector.set(SPAM_SCORE, spam);

        let url = index.attribute("rawUrl", doc)?;
        vector.set(
            URL_DEPTH,
            url.as_ref().map(|u| u.matches('/').count() as f64),
        );
        vector.set(
            WIKIPEDIA,
            url.as_ref()
                .map(|u| if u.contains("wikipedia.org") { 1.0 } else { 0.0 }),
        );

        let external_id = index.external_id(doc)?;
        vector.set(PAGE_RANK, self.page_rank.get(&external_id).copied());

        for (i, field) in Field::TEXT_FIELDS.into_iter().enumerate() {
            let base = FIRST_FIELD_FEATURE + 3 * i;
            vector.set(base, field_bm25(index, &self.bm25, terms, doc, field)?);
            vector.set(
                base + 1,
                field_query_likelihood(index, &self.query_likelihood, terms, doc, field)?,
            );
            vector.set(base + 2, term_overlap(index, terms, doc, field)?);
        }

        Ok(vector)
    }
}

/// The external SVM-rank programs.
#[derive(Debug, Clone)]
pub struct SvmRank {
    learn_path: PathBuf,
    classify_path: PathBuf,
    param_c: f64,
}

impl SvmRank {
    /// Create a wrapper around the learn and classify executables.
    pub fn new<P: Into<PathBuf>, Q: Into<PathBuf>>(learn_path: P, classify_path: Q, param_c: f64) -> Self {
        SvmRank {
            learn_path: learn_path.into(),
            classify_path: classify_path.into(),
            param_c,
        }
    }

    /// Train a model: `learn -c C features model`.
    pub fn train(&self, features: &Path, model: &Path) -> Result<()> {
        let mut command = Command::new(&self.learn_path);
        command
            .arg("-c")
            .arg(self.param_c.to_string())
            .arg(features)
            .arg(model);
        run_tool(command, &self.learn_path)
    }

    /// Score a feature file: `classify features model scores`.
    pub fn classify(&self, features: &Path, model: &Path, scores: &Path) -> Result<()> {
        let mut command = Command::new(&self.classify_path);
        command.arg(features).arg(model).arg(scores);
        run_tool(command, &self.classify_path)
    }
}

fn run_tool(mut command: Command, program: &Path) -> Result<()> {
    let output = command.output().map_err(|e| {
        QevalError::external_tool(format!("cannot start '{}': {e}", program.display()))
    })?;

    for line in String::from_utf8_lossy(&output.stdout).lines() {
        debug!("{}: {line}", program.display());
    }
    for line in String::from_utf8_lossy(&output.stderr).lines() {
        debug!("{}: {line}", program.display());
    }

    if !output.status.success() {
        return Err(QevalError::external_tool(format!(
            "'{}' failed with {}",
            program.display(),
            output.status
        )));
    }
    Ok(())
}

fn open(path: &Path, what: &str) -> Result<BufReader<File>> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| QevalError::config(format!("cannot read {what} '{}': {e}", path.display())))
}

/// Read classifier output: one score per line.
pub fn read_scores<R: BufRead>(reader: R) -> Result<Vec<f64>> {
    let mut scores = Vec::new();
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let score = line
            .parse::<f64>()
            .map_err(|_| QevalError::external_tool(format!("malformed classifier score '{line}'")))?;
        scores.push(score);
    }
    Ok(scores)
}

/// Read `extId score` PageRank lines (tab or space separated).
pub fn read_page_rank<R: BufRead>(reader: R) -> Result<AHashMap<String, f64>> {
    let mut page_rank = AHashMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        match fields.as_slice() {
            [] => continue,
            [id, score] => {
                let score = score.parse::<f64>().map_err(|_| {
                    QevalError::config(format!(
                        "PageRank line {}: malformed score '{score}'",
                        line_no + 1
                    ))
                })?;
                page_rank.insert(id.to_string(), score);
            }
            _ => {
                return Err(QevalError::config(format!(
                    "PageRank line {} has {} columns, expected 2",
                    line_no + 1,
                    fields.len()
                )));
            }
        }
    }
    Ok(page_rank)
}

/// A relevance judgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Judgment {
    pub external_id: String,
    pub label: i32,
}

/// Read `qid 0 extId label` relevance judgments, in file order per query.
pub fn read_qrels<R: BufRead>(reader: R) -> Result<BTreeMap<String, Vec<Judgment>>> {
    let mut qrels: BTreeMap<String, Vec<Judgment>> = BTreeMap::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.is_empty() {
            continue;
        }
        if fields.len() != 4 {
            return Err(QevalError::config(format!(
                "qrels line {} has {} columns, expected 4",
                line_no + 1,
                fields.len()
            )));
        }
        let label = fields[3].parse::<i32>().map_err(|_| {
            QevalError::config(format!(
                "qrels line {}: malformed label '{}'",
                line_no + 1,
                fields[3]
            ))
        })?;
        qrels.entry(fields[0].to_string()).or_default().push(Judgment {
            external_id: fields[2].to_string(),
            label,
        });
    }
    Ok(qrels)
}

/// Trains a ranker on judged queries and re-ranks BM25 results with it.
#[derive(Debug)]
pub struct LetorPipeline {
    config: LetorConfig,
    model: RetrievalModel,
    extractor: FeatureExtractor,
    svm: SvmRank,
}

impl LetorPipeline {
    /// Set up the pipeline of a learning-to-rank run.
    pub fn new(config: &LetorConfig, model: &ModelConfig) -> Result<Self> {
        let ModelConfig::Letor { bm25, indri } = model else {
            return Err(QevalError::config(
                "learning to rank needs retrievalAlgorithm=letor",
            ));
        };

        let mut extractor = FeatureExtractor::new(
            Bm25Model::new(bm25.k1, bm25.b, bm25.k3),
            QueryLikelihoodModel::new(indri.mu, indri.lambda),
        );
        if let Some(path) = &config.page_rank_file {
            extractor = extractor.with_page_rank(read_page_rank(open(path, "PageRank file")?)?);
        }

        Ok(LetorPipeline {
            config: config.clone(),
            model: model.build(),
            extractor,
            svm: SvmRank::new(
                &config.svm_rank_learn_path,
                &config.svm_rank_classify_path,
                config.svm_rank_param_c,
            ),
        })
    }

    fn query_terms(&self, engine: &QueryEngine, query: &str) -> Result<Vec<String>> {
        Ok(engine
            .parse(query, &self.model)?
            .map(|node| node.terms())
            .unwrap_or_default())
    }

    /// Write the training feature file and train the model.
    pub fn train(&self, engine: &QueryEngine) -> Result<()> {
        let index = engine.index();
        let qrels = read_qrels(open(&self.config.training_qrels_file, "qrels file")?)?;
        let mut writer = BufWriter::new(File::create(&self.config.training_feature_vectors_file)?);

        for line in read_query_lines(&self.config.training_query_file)? {
            let (query_id, query) = parse_query_line(&line)?;
            let terms = self.query_terms(engine, &query)?;

            let mut labels = Vec::new();
            let mut vectors = Vec::new();
            for judgment in qrels.get(&query_id).into_iter().flatten() {
                let Some(doc) = index.internal_id(&judgment.external_id)? else {
                    warn!(
                        "Judged document '{}' of query {query_id} is not in the index",
                        judgment.external_id
                    );
                    continue;
                };
                vectors.push(self.extractor.extract(index, &terms, doc)?);
                labels.push(judgment);
            }

            normalize(&mut vectors);
            for (judgment, vector) in labels.iter().zip(&vectors) {
                writeln!(
                    writer,
                    "{}",
                    format_feature_line(
                        &judgment.label.to_string(),
                        &query_id,
                        vector,
                        &self.config.feature_disable,
                        &judgment.external_id,
                    )
                )?;
            }
            debug!("Training query {query_id}: {} judged documents", vectors.len());
        }
        writer.flush()?;

        info!("Training ranker on {}", self.config.training_feature_vectors_file.display());
        self.svm.train(
            &self.config.training_feature_vectors_file,
            &self.config.svm_rank_model_file,
        )
    }

    /// Re-rank the BM25 candidates of each query and write TREC lines.
    pub fn rerank<W: Write>(
        &self,
        engine: &QueryEngine,
        queries: &[(String, String)],
        output: &mut W,
        run_id: &str,
        max_results: usize,
    ) -> Result<()> {
        let index = engine.index();

        let mut candidates: Vec<(&str, Vec<DocId>)> = Vec::with_capacity(queries.len());
        {
            let mut writer = BufWriter::new(File::create(&self.config.testing_feature_vectors_file)?);
            for (query_id, query) in queries {
                let mut initial = engine.search(query, &self.model)?;
                initial.truncate(RERANK_DEPTH);
                let terms = self.query_terms(engine, query)?;

                let docs: Vec<DocId> = initial.iter().map(|d| d.doc_id).collect();
                let mut vectors = Vec::with_capacity(docs.len());
                for &doc in &docs {
                    vectors.push(self.extractor.extract(index, &terms, doc)?);
                }

                normalize(&mut vectors);
                for (&doc, vector) in docs.iter().zip(&vectors) {
                    writeln!(
                        writer,
                        "{}",
                        format_feature_line(
                            "0",
                            query_id,
                            vector,
                            &self.config.feature_disable,
                            &index.external_id(doc)?,
                        )
                    )?;
                }
                candidates.push((query_id.as_str(), docs));
            }
            writer.flush()?;
        }

        self.svm.classify(
            &self.config.testing_feature_vectors_file,
            &self.config.svm_rank_model_file,
            &self.config.testing_document_scores,
        )?;
        let scores = read_scores(open(&self.config.testing_document_scores, "score file")?)?;

        let expected: usize = candidates.iter().map(|(_, docs)| docs.len()).sum();
        if scores.len() != expected {
            return Err(QevalError::external_tool(format!(
                "classifier wrote {} scores for {expected} documents",
                scores.len()
            )));
        }

        let mut scores = scores.into_iter();
        for (query_id, docs) in candidates {
            let mut results = ResultList::new();
            for (doc, score) in docs.into_iter().zip(scores.by_ref()) {
                results.add(doc, score);
            }
            results.sort(index)?;
            write_trec_results(output, query_id, &results, index, run_id, max_results)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{IndexDocument, MemoryIndex};

    fn index() -> MemoryIndex {
        let mut index = MemoryIndex::new();
        index
            .add_document(
                IndexDocument::new("clueweb-a")
                    .field(Field::Body, ["apple", "pie", "recipe"])
                    .field(Field::Title, ["apple", "pie"])
                    .attribute("score", "87")
                    .attribute("rawUrl", "http://en.wikipedia.org/wiki/Apple_pie"),
            )
            .unwrap();
        index
            .add_document(
                IndexDocument::new("clueweb-b")
                    .field(Field::Body, ["cherry", "pie"])
                    .attribute("score", "12")
                    .attribute("rawUrl", "http://example.com/pies"),
            )
            .unwrap();
        index
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_extract_document_features() {
        let index = index();
        let mut page_rank = AHashMap::new();
        page_rank.insert("clueweb-a".to_string(), 3.5);
        let extractor = FeatureExtractor::new(Bm25Model::default(), QueryLikelihoodModel::default())
            .with_page_rank(page_rank);

        let a = extractor.extract(&index, &terms(&["apple", "pie"]), 0).unwrap();
        assert_eq!(a.get(SPAM_SCORE), Some(87.0));
        assert_eq!(a.get(URL_DEPTH), Some(4.0));
        assert_eq!(a.get(WIKIPEDIA), Some(1.0));
        assert_eq!(a.get(PAGE_RANK), Some(3.5));
        assert_eq!(a.get(7), Some(1.0));
        assert_eq!(a.get(10), Some(1.0));
        // No url or inlink field.
        assert_eq!(a.get(11), None);
        assert_eq!(a.get(16), None);

        let b = extractor.extract(&index, &terms(&["apple", "pie"]), 1).unwrap();
        assert_eq!(b.get(WIKIPEDIA), Some(0.0));
        assert_eq!(b.get(PAGE_RANK), None);
        assert_eq!(b.get(7), Some(0.5));
        assert_eq!(b.get(8), None);
    }

    #[test]
    fn test_normalize_per_feature() {
        let mut a = FeatureVector::new();
        a.set(1, Some(2.0));
        a.set(2, Some(5.0));
        let mut b = FeatureVector::new();
        b.set(1, Some(4.0));
        b.set(2, Some(5.0));
        let mut c = FeatureVector::new();
        c.set(1, Some(3.0));

        let mut vectors = vec![a, b, c];
        normalize(&mut vectors);

        assert_eq!(vectors[0].get(1), Some(0.0));
        assert_eq!(vectors[1].get(1), Some(1.0));
        assert_eq!(vectors[2].get(1), Some(0.5));
        // max == min, and a missing value.
        assert_eq!(vectors[0].get(2), Some(0.0));
        assert_eq!(vectors[2].get(2), Some(0.0));
        assert_eq!(vectors[0].get(16), Some(0.0));
    }

    #[test]
    fn test_format_feature_line_omits_disabled_features() {
        let mut vector = FeatureVector::new();
        for f in 1..=FEATURE_COUNT {
            vector.set(f, Some(f as f64 / 100.0));
        }
        let disabled: BTreeSet<usize> = (3..=16).collect();

        let line = format_feature_line("2", "10", &vector, &disabled, "doc-1");
        assert_eq!(line, "2 qid:10 1:0.01 2:0.02 #doc-1");

        let all = format_feature_line("0", "10", &vector, &BTreeSet::new(), "doc-1");
        assert!(all.contains(" 16:0.16 #doc-1"));
        assert_eq!(all.split_whitespace().count(), 2 + FEATURE_COUNT + 1);
    }

    #[test]
    fn test_read_helpers() {
        let scores = read_scores("0.5\n-1.25\n\n3\n".as_bytes()).unwrap();
        assert_eq!(scores, vec![0.5, -1.25, 3.0]);
        assert!(read_scores("x\n".as_bytes()).is_err());

        let page_rank = read_page_rank("a\t0.25\nb 1.5\n".as_bytes()).unwrap();
        assert_eq!(page_rank.get("a"), Some(&0.25));
        assert_eq!(page_rank.get("b"), Some(&1.5));
        assert!(read_page_rank("a\n".as_bytes()).is_err());

        let qrels = read_qrels("10 0 d2 1\n10 0 d1 0\n11 0 d1 2\n".as_bytes()).unwrap();
        let ids: Vec<&str> = qrels["10"].iter().map(|j| j.external_id.as_str()).collect();
        assert_eq!(ids, vec!["d2", "d1"]);
        assert_eq!(qrels["11"][0].label, 2);
    }

    #[test]
    fn test_missing_tool_is_external_failure() {
        let svm = SvmRank::new("/nonexistent/svm_rank_learn", "/nonexistent/svm_rank_classify", 0.1);
        let err = svm
            .train(Path::new("features"), Path::new("model"))
            .unwrap_err();
        assert!(matches!(err, QevalError::ExternalTool(_)));
    }
}
