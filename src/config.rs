//! Run configuration.
//!
//! A run is described by a parameter file with one `key=value` pair per
//! line. [`Parameters`] holds the raw pairs; [`EngineConfig`] is the typed
//! view the rest of the crate works with. Typed configs serialize to JSON so
//! they can be inspected from the command line.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{QevalError, Result};
use crate::letor::FEATURE_COUNT;
use crate::model::RetrievalModel;

/// Raw `key=value` parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters {
    values: BTreeMap<String, String>,
}

impl Parameters {
    /// Parse parameter lines. Blank lines are ignored, keys and values are
    /// trimmed, and a later line overrides an earlier one.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut values = BTreeMap::new();
        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                return Err(QevalError::config(format!(
                    "parameter line {} is not key=value: '{line}'",
                    line_no + 1
                )));
            };
            values.insert(key.trim().to_string(), value.trim().to_string());
        }
        Ok(Parameters { values })
    }

    /// Read a parameter file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            QevalError::config(format!("cannot read parameter file '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// Set a parameter.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) {
        self.values.insert(key.into(), value.into());
    }

    /// Get a parameter.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    /// Get a parameter that must be present.
    pub fn require(&self, key: &str) -> Result<&str> {
        self.get(key)
            .ok_or_else(|| QevalError::config(format!("missing required parameter '{key}'")))
    }

    /// Parse an optional parameter.
    pub fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.parse::<T>().map(Some).map_err(|e| {
                QevalError::config(format!("malformed value '{raw}' for '{key}': {e}"))
            }),
            None => Ok(None),
        }
    }

    /// Parse a parameter that must be present.
    pub fn parse_required<T>(&self, key: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: fmt::Display,
    {
        self.parse(key)?
            .ok_or_else(|| QevalError::config(format!("missing required parameter '{key}'")))
    }

    fn path(&self, key: &str) -> Result<PathBuf> {
        self.require(key).map(PathBuf::from)
    }

    fn optional_path(&self, key: &str) -> Option<PathBuf> {
        self.get(key).filter(|v| !v.is_empty()).map(PathBuf::from)
    }
}

/// BM25 hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bm25Params {
    pub k1: f64,
    pub b: f64,
    pub k3: f64,
}

impl Bm25Params {
    fn from_parameters(params: &Parameters) -> Result<Self> {
        let config = Bm25Params {
            k1: params.parse_required("BM25:k_1")?,
            b: params.parse_required("BM25:b")?,
            k3: params.parse_required("BM25:k_3")?,
        };
        if config.k1 < 0.0 || config.k3 < 0.0 || !(0.0..=1.0).contains(&config.b) {
            return Err(QevalError::config(format!(
                "BM25 parameters out of range: k_1={}, b={}, k_3={}",
                config.k1, config.b, config.k3
            )));
        }
        Ok(config)
    }
}

/// Query likelihood hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IndriParams {
    pub mu: f64,
    pub lambda: f64,
}

impl IndriParams {
    fn from_parameters(params: &Parameters) -> Result<Self> {
        let config = IndriParams {
            mu: params.parse_required("Indri:mu")?,
            lambda: params.parse_required("Indri:lambda")?,
        };
        if config.mu < 0.0 || !(0.0..=1.0).contains(&config.lambda) {
            return Err(QevalError::config(format!(
                "Indri parameters out of range: mu={}, lambda={}",
                config.mu, config.lambda
            )));
        }
        Ok(config)
    }
}

/// The retrieval algorithm of a run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "algorithm")]
pub enum ModelConfig {
    UnrankedBoolean,
    RankedBoolean,
    #[serde(rename = "BM25")]
    Bm25(Bm25Params),
    Indri(IndriParams),
    /// Learning to rank: BM25 picks the candidates, the per-field
    /// features use both parameter sets.
    Letor { bm25: Bm25Params, indri: IndriParams },
}

impl ModelConfig {
    /// Read the `retrievalAlgorithm` and the keys it needs.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let algorithm = params.require("retrievalAlgorithm")?;
        match algorithm.to_ascii_lowercase().as_str() {
            "unrankedboolean" => Ok(ModelConfig::UnrankedBoolean),
            "rankedboolean" => Ok(ModelConfig::RankedBoolean),
            "bm25" => Ok(ModelConfig::Bm25(Bm25Params::from_parameters(params)?)),
            "indri" => Ok(ModelConfig::Indri(IndriParams::from_parameters(params)?)),
            "letor" => Ok(ModelConfig::Letor {
                bm25: Bm25Params::from_parameters(params)?,
                indri: IndriParams::from_parameters(params)?,
            }),
            _ => Err(QevalError::config(format!(
                "unknown retrievalAlgorithm '{algorithm}'"
            ))),
        }
    }

    /// The model queries are evaluated with.
    pub fn build(&self) -> RetrievalModel {
        match self {
            ModelConfig::UnrankedBoolean => RetrievalModel::UnrankedBoolean,
            ModelConfig::RankedBoolean => RetrievalModel::RankedBoolean,
            ModelConfig::Bm25(p) | ModelConfig::Letor { bm25: p, .. } => {
                RetrievalModel::bm25(p.k1, p.b, p.k3)
            }
            ModelConfig::Indri(p) => RetrievalModel::query_likelihood(p.mu, p.lambda),
        }
    }

    /// Check if this is a learning-to-rank run.
    pub fn is_letor(&self) -> bool {
        matches!(self, ModelConfig::Letor { .. })
    }
}

/// Pseudo-relevance feedback settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedbackConfig {
    /// Number of top documents assumed relevant.
    pub fb_docs: usize,
    /// Number of expansion terms.
    pub fb_terms: usize,
    /// Dirichlet prior of the expansion term scores.
    pub fb_mu: f64,
    /// Weight of the original query in the expanded query.
    pub fb_orig_weight: f64,
    /// Read the initial ranking from this file instead of searching.
    pub initial_ranking_file: Option<PathBuf>,
    /// Write the expansion queries to this file.
    pub expansion_query_file: Option<PathBuf>,
}

impl FeedbackConfig {
    /// Read the feedback keys. Returns `None` unless `fb=true`.
    pub fn from_parameters(params: &Parameters) -> Result<Option<Self>> {
        let enabled = match params.get("fb") {
            Some(raw) => raw.to_ascii_lowercase().parse::<bool>().map_err(|e| {
                QevalError::config(format!("malformed value '{raw}' for 'fb': {e}"))
            })?,
            None => false,
        };
        if !enabled {
            return Ok(None);
        }

        let config = FeedbackConfig {
            fb_docs: params.parse_required("fbDocs")?,
            fb_terms: params.parse_required("fbTerms")?,
            fb_mu: params.parse_required("fbMu")?,
            fb_orig_weight: params.parse_required("fbOrigWeight")?,
            initial_ranking_file: params.optional_path("fbInitialRankingFile"),
            expansion_query_file: params.optional_path("fbExpansionQueryFile"),
        };
        if config.fb_docs == 0 || config.fb_terms == 0 {
            return Err(QevalError::config("fbDocs and fbTerms must be positive"));
        }
        if config.fb_mu < 0.0 || !(0.0..=1.0).contains(&config.fb_orig_weight) {
            return Err(QevalError::config(format!(
                "feedback parameters out of range: fbMu={}, fbOrigWeight={}",
                config.fb_mu, config.fb_orig_weight
            )));
        }
        Ok(Some(config))
    }
}

/// Learning-to-rank settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LetorConfig {
    pub training_query_file: PathBuf,
    pub training_qrels_file: PathBuf,
    pub training_feature_vectors_file: PathBuf,
    pub page_rank_file: Option<PathBuf>,
    /// 1-based indices of features left out of the feature files.
    pub feature_disable: BTreeSet<usize>,
    pub svm_rank_learn_path: PathBuf,
    pub svm_rank_classify_path: PathBuf,
    pub svm_rank_param_c: f64,
    pub svm_rank_model_file: PathBuf,
    pub testing_feature_vectors_file: PathBuf,
    pub testing_document_scores: PathBuf,
}

impl LetorConfig {
    /// Read the `letor:*` keys.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let mut feature_disable = BTreeSet::new();
        if let Some(list) = params.get("letor:featureDisable") {
            for item in list.split(',').map(str::trim).filter(|s| !s.is_empty()) {
                let feature = item.parse::<usize>().map_err(|e| {
                    QevalError::config(format!("malformed feature number '{item}': {e}"))
                })?;
                if !(1..=FEATURE_COUNT).contains(&feature) {
                    return Err(QevalError::config(format!(
                        "feature number {feature} is outside 1..={FEATURE_COUNT}"
                    )));
                }
                feature_disable.insert(feature);
            }
        }

        Ok(LetorConfig {
            training_query_file: params.path("letor:trainingQueryFile")?,
            training_qrels_file: params.path("letor:trainingQrelsFile")?,
            training_feature_vectors_file: params.path("letor:trainingFeatureVectorsFile")?,
            page_rank_file: params.optional_path("letor:pageRankFile"),
            feature_disable,
            svm_rank_learn_path: params.path("letor:svmRankLearnPath")?,
            svm_rank_classify_path: params.path("letor:svmRankClassifyPath")?,
            svm_rank_param_c: params.parse("letor:svmRankParamC")?.unwrap_or(0.001),
            svm_rank_model_file: params.path("letor:svmRankModelFile")?,
            testing_feature_vectors_file: params.path("letor:testingFeatureVectorsFile")?,
            testing_document_scores: params.path("letor:testingDocumentScores")?,
        })
    }
}

/// What a batch run does when one query fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BatchErrorPolicy {
    /// Stop the run at the first failing query.
    #[default]
    FailFast,
    /// Log queries with syntax errors and go on with the next one.
    Skip,
}

impl FromStr for BatchErrorPolicy {
    type Err = QevalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "fail-fast" | "failfast" => Ok(BatchErrorPolicy::FailFast),
            "skip" => Ok(BatchErrorPolicy::Skip),
            _ => Err(QevalError::config(format!("unknown batch error policy '{s}'"))),
        }
    }
}

impl fmt::Display for BatchErrorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BatchErrorPolicy::FailFast => f.write_str("fail-fast"),
            BatchErrorPolicy::Skip => f.write_str("skip"),
        }
    }
}

/// Typed configuration of a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// JSON corpus the index is built from.
    pub index_path: PathBuf,
    /// Query file, one `qid: query` per line.
    pub query_file_path: PathBuf,
    /// Where TREC result lines are written.
    pub trec_eval_output_path: PathBuf,
    pub model: ModelConfig,
    pub feedback: Option<FeedbackConfig>,
    pub letor: Option<LetorConfig>,
    /// Run tag of the result lines.
    pub run_id: String,
    pub batch_error_policy: BatchErrorPolicy,
    /// Result lines written per query.
    pub max_results: usize,
}

impl EngineConfig {
    /// Build the typed configuration from raw parameters.
    pub fn from_parameters(params: &Parameters) -> Result<Self> {
        let model = ModelConfig::from_parameters(params)?;
        let letor = if model.is_letor() {
            Some(LetorConfig::from_parameters(params)?)
        } else {
            None
        };

        let feedback = FeedbackConfig::from_parameters(params)?;
        if feedback.is_some() && !matches!(model, ModelConfig::Indri(_)) {
            return Err(QevalError::config(format!(
                "fb=true requires retrievalAlgorithm=Indri, got '{}'",
                params.get("retrievalAlgorithm").unwrap_or_default()
            )));
        }

        let max_results = params.parse("maxResults")?.unwrap_or(100);
        if max_results == 0 {
            return Err(QevalError::config("maxResults must be positive"));
        }

        Ok(EngineConfig {
            index_path: params.path("indexPath")?,
            query_file_path: params.path("queryFilePath")?,
            trec_eval_output_path: params.path("trecEvalOutputPath")?,
            model,
            feedback,
            letor,
            run_id: params.get("runId").unwrap_or("run-1").to_string(),
            batch_error_policy: params.parse("batchErrorPolicy")?.unwrap_or_default(),
            max_results,
        })
    }

    /// Read and type a parameter file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::from_parameters(&Parameters::from_file(path)?)
    }
}
