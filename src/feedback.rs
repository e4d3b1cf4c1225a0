//! Pseudo-relevance feedback.
//!
//! The top documents of an initial ranking are assumed relevant. Every term
//! of their feedback field is scored by how much it contributes to those
//! documents, weighted by each document's score and by the term's inverse
//! collection frequency, and the best terms become a weighted expansion
//! query that is combined with the original query.

use std::collections::BTreeMap;
use std::fmt;
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use ahash::AHashMap;
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::error::{QevalError, Result};
use crate::index::reader::IndexReader;
use crate::query::results::ScoredDoc;
use crate::schema::Field;

/// Expansion terms are drawn from document bodies.
const FEEDBACK_FIELD: Field = Field::Body;

/// A scored expansion term.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpansionTerm {
    pub term: String,
    pub score: f64,
}

/// Expansion terms, best first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Expansion {
    terms: Vec<ExpansionTerm>,
}

impl Expansion {
    /// The expansion terms, best first.
    pub fn terms(&self) -> &[ExpansionTerm] {
        &self.terms
    }

    /// Check if there are no expansion terms.
    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }
}

/// `#wand ( s1 t1 s2 t2 ... )`
impl fmt::Display for Expansion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("#wand (")?;
        for t in &self.terms {
            write!(f, " {} {}", t.score, t.term)?;
        }
        f.write_str(" )")
    }
}

#[derive(Debug)]
struct Candidate {
    collection_freq: u64,
    score: f64,
}

/// Derives expansion terms from top-ranked documents.
#[derive(Debug, Clone)]
pub struct QueryExpander {
    mu: f64,
    num_terms: usize,
}

impl QueryExpander {
    /// Create an expander over the body field.
    pub fn new(mu: f64, num_terms: usize) -> Self {
        QueryExpander { mu, num_terms }
    }

    /// Score the candidate terms of `top_docs` and keep the best ones.
    ///
    /// Each candidate gets exactly one contribution per feedback document:
    /// its smoothed in-document probability (zero occurrences when the
    /// document lacks it) times the document score times
    /// `ln(collection_length / ctf)`.
    pub fn expand(&self, index: &dyn IndexReader, top_docs: &[ScoredDoc]) -> Result<Expansion> {
        let collection_length = index.sum_of_field_lengths(FEEDBACK_FIELD) as f64;

        let mut vectors = Vec::with_capacity(top_docs.len());
        let mut candidates: BTreeMap<String, Candidate> = BTreeMap::new();
        for doc in top_docs {
            let vector = index.term_vector(doc.doc_id, FEEDBACK_FIELD)?;
            if let Some(vector) = &vector {
                for entry in vector.entries() {
                    if entry.term.contains('.') || entry.term.contains(',') {
                        continue;
                    }
                    candidates
                        .entry(entry.term.clone())
                        .or_insert(Candidate {
                            collection_freq: entry.total_freq,
                            score: 0.0,
                        });
                }
            }
            vectors.push((doc, vector));
        }

        if collection_length == 0.0 {
            return Ok(Expansion::default());
        }

        for (doc, vector) in &vectors {
            let doc_length = index.field_length(FEEDBACK_FIELD, doc.doc_id)? as f64;
            for (term, candidate) in candidates.iter_mut() {
                let tf = vector
                    .as_ref()
                    .and_then(|v| v.get(term))
                    .map_or(0, |e| e.freq) as f64;
                let ctf = candidate.collection_freq as f64;
                let p_c = ctf / collection_length;
                let p_d = (tf + self.mu * p_c) / (doc_length + self.mu);
                candidate.score += p_d * doc.score * (collection_length / ctf).ln();
            }
        }

        let mut terms: Vec<ExpansionTerm> = candidates
            .into_iter()
            .filter(|(_, c)| c.score.is_finite() && c.score > 0.0)
            .map(|(term, c)| ExpansionTerm {
                term,
                score: c.score,
            })
            .collect();
        terms.sort_by(|a, b| b.score.total_cmp(&a.score).then_with(|| a.term.cmp(&b.term)));
        terms.truncate(self.num_terms);

        let expansion = Expansion { terms };
        debug!("Expansion: {expansion}");
        Ok(expansion)
    }
}

/// Combine the original query with an expansion.
///
/// The original query is wrapped in the model's default operator so its
/// terms keep their usual combination inside the outer `#wand`.
pub fn expanded_query(
    original: &str,
    default_operator: &str,
    expansion: &Expansion,
    original_weight: f64,
) -> String {
    if expansion.is_empty() || original_weight >= 1.0 {
        return original.to_string();
    }
    if original_weight <= 0.0 {
        return expansion.to_string();
    }

    format!(
        "#wand ( {} {}({}) {} {} )",
        original_weight,
        default_operator,
        original,
        1.0 - original_weight,
        expansion
    )
}

/// Write one line of the expansion file: `qid: #wand ( ... )`.
pub fn write_expansion<W: Write>(writer: &mut W, query_id: &str, expansion: &Expansion) -> Result<()> {
    writeln!(writer, "{query_id}: {expansion}")?;
    Ok(())
}

/// An initial ranking read from a TREC-format run file.
#[derive(Debug, Clone, Default)]
pub struct InitialRanking {
    rankings: AHashMap<String, Vec<(String, f64)>>,
}

impl InitialRanking {
    /// Parse `qid Q0 extId rank score run` lines, keeping file order per query.
    pub fn from_reader<R: BufRead>(reader: R) -> Result<Self> {
        let mut rankings: AHashMap<String, Vec<(String, f64)>> = AHashMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            if fields.is_empty() {
                continue;
            }
            if fields.len() != 6 {
                return Err(QevalError::config(format!(
                    "ranking line {} has {} columns, expected 6",
                    line_no + 1,
                    fields.len()
                )));
            }
            let score = fields[4].parse::<f64>().map_err(|_| {
                QevalError::config(format!(
                    "ranking line {}: malformed score '{}'",
                    line_no + 1,
                    fields[4]
                ))
            })?;
            rankings
                .entry(fields[0].to_string())
                .or_default()
                .push((fields[2].to_string(), score));
        }

        Ok(InitialRanking { rankings })
    }

    /// Read a ranking file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            QevalError::config(format!("cannot read ranking file '{}': {e}", path.display()))
        })?;
        Self::from_reader(BufReader::new(file))
    }

    /// The first `n` documents ranked for a query, as internal ids.
    ///
    /// Documents unknown to the index are skipped.
    pub fn top_docs(&self, query_id: &str, n: usize, index: &dyn IndexReader) -> Result<Vec<ScoredDoc>> {
        let mut docs = Vec::new();
        for (external_id, score) in self.rankings.get(query_id).into_iter().flatten() {
            if docs.len() == n {
                break;
            }
            match index.internal_id(external_id)? {
                Some(doc_id) => docs.push(ScoredDoc {
                    doc_id,
                    score: *score,
                }),
                None => warn!("Ranked document '{external_id}' is not in the index"),
            }
        }
        Ok(docs)
    }
}
