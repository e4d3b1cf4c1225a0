//! Per-field ranking features.
//!
//! These score a whole query against one field of one document without
//! running the query: they read the document's term vector directly. They
//! are the engine-side inputs of the learning-to-rank features.
//!
//! Each function returns `None` when the document has nothing in the field,
//! so callers can tell "no field" apart from "no matching terms" (which
//! scores 0).

use crate::error::Result;
use crate::index::posting::DocId;
use crate::index::reader::{IndexReader, TermVector};
use crate::model::{Bm25Model, Bm25TermStats, QueryLikelihoodModel};
use crate::schema::Field;

fn field_vector(index: &dyn IndexReader, doc: DocId, field: Field) -> Result<Option<TermVector>> {
    if index.field_length(field, doc)? == 0 {
        return Ok(None);
    }
    index.term_vector(doc, field)
}

/// Sum of the BM25 scores of the query terms that occur in the field.
pub fn field_bm25(
    index: &dyn IndexReader,
    model: &Bm25Model,
    terms: &[String],
    doc: DocId,
    field: Field,
) -> Result<Option<f64>> {
    let Some(vector) = field_vector(index, doc, field)? else {
        return Ok(None);
    };

    let doc_length = vector.field_length();
    let avg_doc_length = model.average_field_length(index, field);
    let doc_count = index.doc_count();

    let score: f64 = terms
        .iter()
        .filter_map(|term| vector.get(term))
        .map(|entry| {
            model.term_score(&Bm25TermStats {
                doc_count,
                doc_freq: entry.doc_freq,
                term_freq: entry.freq,
                doc_length,
                avg_doc_length,
            })
        })
        .sum();

    Ok(Some(score))
}

/// Geometric mean of the smoothed term probabilities of the query terms.
///
/// Scores 0 when none of the query terms occur in the field.
pub fn field_query_likelihood(
    index: &dyn IndexReader,
    model: &QueryLikelihoodModel,
    terms: &[String],
    doc: DocId,
    field: Field,
) -> Result<Option<f64>> {
    let Some(vector) = field_vector(index, doc, field)? else {
        return Ok(None);
    };
    if terms.is_empty() {
        return Ok(Some(0.0));
    }

    let doc_length = vector.field_length();
    let collection_length = index.sum_of_field_lengths(field);
    let exponent = 1.0 / terms.len() as f64;

    let mut score = 1.0;
    let mut seen = false;
    for term in terms {
        let (tf, ctf) = match vector.get(term) {
            Some(entry) => {
                seen = true;
                (entry.freq, entry.total_freq)
            }
            None => (0, index.term_stats(field, term)?.total_freq),
        };
        score *= model
            .term_score(tf, ctf, collection_length, doc_length)
            .powf(exponent);
    }

    Ok(Some(if seen { score } else { 0.0 }))
}

/// Fraction of the query terms that occur in the field.
pub fn term_overlap(
    index: &dyn IndexReader,
    terms: &[String],
    doc: DocId,
    field: Field,
) -> Result<Option<f64>> {
    let Some(vector) = field_vector(index, doc, field)? else {
        return Ok(None);
    };
    if terms.is_empty() {
        return Ok(Some(0.0));
    }

    let matched = terms.iter().filter(|t| vector.get(t).is_some()).count();
    Ok(Some(matched as f64 / terms.len() as f64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::index::memory::{IndexDocument, MemoryIndex};

    fn index() -> MemoryIndex {
        let mut index = MemoryIndex::new();
        index
            .add_document(
                IndexDocument::new("a")
                    .field(Field::Body, ["apple", "pie", "apple"])
                    .field(Field::Title, ["pie"]),
            )
            .unwrap();
        index
            .add_document(IndexDocument::new("b").field(Field::Body, ["cherry", "tart"]))
            .unwrap();
        index
            .add_document(IndexDocument::new("c").field(Field::Body, ["plum"]))
            .unwrap();
        index
    }

    fn terms(words: &[&str]) -> Vec<String> {
        words.iter().map(|w| w.to_string()).collect()
    }

    #[test]
    fn test_term_overlap() {
        let index = index();
        let q = terms(&["apple", "tart", "pie"]);

        assert_eq!(term_overlap(&index, &q, 0, Field::Body).unwrap(), Some(2.0 / 3.0));
        assert_eq!(term_overlap(&index, &q, 1, Field::Body).unwrap(), Some(1.0 / 3.0));
        assert_eq!(term_overlap(&index, &q, 1, Field::Title).unwrap(), None);
    }

    #[test]
    fn test_field_bm25_sums_matching_terms() {
        let index = index();
        let model = Bm25Model::new(1.2, 0.75, 0.0);
        let q = terms(&["apple", "pie", "missing"]);

        let score = field_bm25(&index, &model, &q, 0, Field::Body).unwrap().unwrap();
        let avg = 6.0 / 3.0;
        let apple = model.term_score(&Bm25TermStats {
            doc_count: 3,
            doc_freq: 1,
            term_freq: 2,
            doc_length: 3,
            avg_doc_length: avg,
        });
        let pie = model.term_score(&Bm25TermStats {
            doc_count: 3,
            doc_freq: 1,
            term_freq: 1,
            doc_length: 3,
            avg_doc_length: avg,
        });
        assert!((score - (apple + pie)).abs() < 1e-12);

        let none = field_bm25(&index, &model, &q, 2, Field::Body).unwrap();
        assert_eq!(none, Some(0.0));
    }

    #[test]
    fn test_field_query_likelihood() {
        let index = index();
        let model = QueryLikelihoodModel::new(100.0, 0.2);
        let q = terms(&["apple", "tart"]);

        let score = field_query_likelihood(&index, &model, &q, 0, Field::Body)
            .unwrap()
            .unwrap();
        let apple = model.term_score(2, 2, 6, 3);
        let tart = model.term_score(0, 1, 6, 3);
        assert!((score - (apple * tart).sqrt()).abs() < 1e-12);

        let unmatched = field_query_likelihood(&index, &model, &q, 2, Field::Body).unwrap();
        assert_eq!(unmatched, Some(0.0));
        assert_eq!(
            field_query_likelihood(&index, &model, &q, 2, Field::Url).unwrap(),
            None
        );
    }
}
