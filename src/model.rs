//! Retrieval models and their per-term scoring formulas.

use std::fmt;
use std::str::FromStr;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::error::{QevalError, Result};
use crate::index::reader::IndexReader;
use crate::schema::Field;

/// The kind of a retrieval model, used for operator dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    UnrankedBoolean,
    RankedBoolean,
    #[serde(rename = "BM25")]
    Bm25,
    #[serde(rename = "Indri")]
    QueryLikelihood,
}

impl ModelKind {
    /// The model name as used in parameter files.
    pub fn name(&self) -> &'static str {
        match self {
            ModelKind::UnrankedBoolean => "UnrankedBoolean",
            ModelKind::RankedBoolean => "RankedBoolean",
            ModelKind::Bm25 => "BM25",
            ModelKind::QueryLikelihood => "Indri",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = QevalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "unrankedboolean" => Ok(ModelKind::UnrankedBoolean),
            "rankedboolean" => Ok(ModelKind::RankedBoolean),
            "bm25" => Ok(ModelKind::Bm25),
            "indri" | "querylikelihood" => Ok(ModelKind::QueryLikelihood),
            _ => Err(QevalError::config(format!("unknown retrieval model '{s}'"))),
        }
    }
}

/// A retrieval model with its hyperparameters.
#[derive(Debug, Clone)]
pub enum RetrievalModel {
    /// Every match scores 1.
    UnrankedBoolean,
    /// Term frequency, min for `#and`, max for `#or`.
    RankedBoolean,
    /// Okapi BM25.
    Bm25(Bm25Model),
    /// Query likelihood with Dirichlet and Jelinek-Mercer smoothing.
    QueryLikelihood(QueryLikelihoodModel),
}

impl RetrievalModel {
    /// Create a BM25 model.
    pub fn bm25(k1: f64, b: f64, k3: f64) -> Self {
        RetrievalModel::Bm25(Bm25Model::new(k1, b, k3))
    }

    /// Create a query likelihood model.
    pub fn query_likelihood(mu: f64, lambda: f64) -> Self {
        RetrievalModel::QueryLikelihood(QueryLikelihoodModel::new(mu, lambda))
    }

    /// The kind of this model.
    pub fn kind(&self) -> ModelKind {
        match self {
            RetrievalModel::UnrankedBoolean => ModelKind::UnrankedBoolean,
            RetrievalModel::RankedBoolean => ModelKind::RankedBoolean,
            RetrievalModel::Bm25(_) => ModelKind::Bm25,
            RetrievalModel::QueryLikelihood(_) => ModelKind::QueryLikelihood,
        }
    }

    /// The operator wrapped around raw query strings.
    pub fn default_operator(&self) -> &'static str {
        match self {
            RetrievalModel::UnrankedBoolean | RetrievalModel::RankedBoolean => "#or",
            RetrievalModel::Bm25(_) => "#sum",
            RetrievalModel::QueryLikelihood(_) => "#and",
        }
    }
}

impl fmt::Display for RetrievalModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrievalModel::Bm25(m) => write!(f, "BM25(k1={}, b={}, k3={})", m.k1, m.b, m.k3),
            RetrievalModel::QueryLikelihood(m) => {
                write!(f, "Indri(mu={}, lambda={})", m.mu, m.lambda)
            }
            other => f.write_str(other.kind().name()),
        }
    }
}

/// Statistics needed for one BM25 term score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bm25TermStats {
    /// Total number of documents.
    pub doc_count: u64,
    /// Documents containing the term.
    pub doc_freq: u64,
    /// Occurrences in the scored document.
    pub term_freq: u64,
    /// Field length of the scored document.
    pub doc_length: u64,
    /// Average field length.
    pub avg_doc_length: f64,
}

/// BM25 parameters plus a per-field average length cache.
///
/// The cache is filled on first use and safe to share between threads.
#[derive(Debug)]
pub struct Bm25Model {
    /// Term frequency saturation.
    pub k1: f64,
    /// Length normalization.
    pub b: f64,
    /// Query term frequency saturation.
    pub k3: f64,
    avg_lengths: RwLock<AHashMap<Field, f64>>,
}

impl Clone for Bm25Model {
    fn clone(&self) -> Self {
        Bm25Model {
            k1: self.k1,
            b: self.b,
            k3: self.k3,
            avg_lengths: RwLock::new(self.avg_lengths.read().clone()),
        }
    }
}

impl Default for Bm25Model {
    fn default() -> Self {
        Self::new(1.2, 0.75, 0.0)
    }
}

impl Bm25Model {
    /// Create a new BM25 model.
    pub fn new(k1: f64, b: f64, k3: f64) -> Self {
        Bm25Model {
            k1,
            b,
            k3,
            avg_lengths: RwLock::new(AHashMap::new()),
        }
    }

    /// Average length of a field, computed once per field.
    pub fn average_field_length(&self, index: &dyn IndexReader, field: Field) -> f64 {
        if let Some(avg) = self.avg_lengths.read().get(&field) {
            return *avg;
        }

        let avg = index.average_field_length(field);
        self.avg_lengths.write().insert(field, avg);
        avg
    }

    /// BM25 score of one query term (query term frequency 1).
    pub fn term_score(&self, stats: &Bm25TermStats) -> f64 {
        let n = stats.doc_count as f64;
        let df = stats.doc_freq as f64;
        let tf = stats.term_freq as f64;
        let qtf = 1.0;

        let idf = ((n - df + 0.5) / (df + 0.5)).ln().max(0.0);
        let length_ratio = if stats.avg_doc_length > 0.0 {
            stats.doc_length as f64 / stats.avg_doc_length
        } else {
            0.0
        };
        let tf_weight = tf / (tf + self.k1 * (1.0 - self.b + self.b * length_ratio));
        let user_weight = (self.k3 + 1.0) * qtf / (self.k3 + qtf);

        idf * tf_weight * user_weight
    }
}

/// Query likelihood parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueryLikelihoodModel {
    /// Dirichlet prior.
    pub mu: f64,
    /// Jelinek-Mercer mixing weight.
    pub lambda: f64,
}

impl Default for QueryLikelihoodModel {
    fn default() -> Self {
        Self::new(2500.0, 0.4)
    }
}

impl QueryLikelihoodModel {
    /// Create a new query likelihood model.
    pub fn new(mu: f64, lambda: f64) -> Self {
        QueryLikelihoodModel { mu, lambda }
    }

    /// Smoothed probability of a term in a document field.
    ///
    /// With `term_freq == 0` this is the default score of a document that
    /// does not contain the term.
    pub fn term_score(
        &self,
        term_freq: u64,
        collection_freq: u64,
        collection_length: u64,
        doc_length: u64,
    ) -> f64 {
        let p_c = if collection_length > 0 {
            collection_freq as f64 / collection_length as f64
        } else {
            0.0
        };

        (1.0 - self.lambda) * (term_freq as f64 + self.mu * p_c) / (doc_length as f64 + self.mu)
            + self.lambda * p_c
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{IndexDocument, MemoryIndex};

    #[test]
    fn test_bm25_term_score() {
        let model = Bm25Model::new(1.2, 0.75, 0.0);
        let score = model.term_score(&Bm25TermStats {
            doc_count: 500_000,
            doc_freq: 1000,
            term_freq: 3,
            doc_length: 200,
            avg_doc_length: 150.0,
        });

        assert!((score - 4.141405).abs() < 1e-6, "score = {score}");
    }

    #[test]
    fn test_bm25_idf_is_clamped() {
        let model = Bm25Model::default();
        let score = model.term_score(&Bm25TermStats {
            doc_count: 10,
            doc_freq: 9,
            term_freq: 1,
            doc_length: 5,
            avg_doc_length: 5.0,
        });
        assert_eq!(score, 0.0);
    }

    #[test]
    fn test_query_likelihood_term_score() {
        let model = QueryLikelihoodModel::new(2500.0, 0.4);

        let score = model.term_score(2, 1000, 100_000_000, 120);
        assert!((score - 0.000467740458).abs() < 1e-12, "score = {score}");

        let default = model.term_score(0, 1000, 100_000_000, 120);
        assert!((default - 0.0000097251908).abs() < 1e-12);
    }

    #[test]
    fn test_average_length_is_cached() {
        let mut index = MemoryIndex::new();
        index
            .add_document(IndexDocument::new("a").field(Field::Body, ["x", "y"]))
            .unwrap();
        index
            .add_document(IndexDocument::new("b").field(Field::Body, ["x", "y", "z", "w"]))
            .unwrap();

        let model = Bm25Model::default();
        assert_eq!(model.average_field_length(&index, Field::Body), 3.0);

        let copy = model.clone();
        let empty = MemoryIndex::new();
        assert_eq!(copy.average_field_length(&empty, Field::Body), 3.0);
    }

    #[test]
    fn test_default_operators() {
        assert_eq!(RetrievalModel::UnrankedBoolean.default_operator(), "#or");
        assert_eq!(RetrievalModel::RankedBoolean.default_operator(), "#or");
        assert_eq!(RetrievalModel::bm25(1.2, 0.75, 0.0).default_operator(), "#sum");
        assert_eq!(
            RetrievalModel::query_likelihood(2500.0, 0.4).default_operator(),
            "#and"
        );
    }

    #[test]
    fn test_model_kind_names() {
        assert_eq!("bm25".parse::<ModelKind>().unwrap(), ModelKind::Bm25);
        assert_eq!("Indri".parse::<ModelKind>().unwrap(), ModelKind::QueryLikelihood);
        assert!("vector".parse::<ModelKind>().is_err());
    }
}
