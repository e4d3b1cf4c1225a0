//! In-memory index store.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::Analyzer;
use crate::error::{QevalError, Result};
use crate::index::posting::{DocId, PostingList};
use crate::index::reader::{IndexReader, TermVector, TermVectorEntry};
use crate::schema::Field;

/// A document to be added to a [`MemoryIndex`], with pre-analyzed fields.
#[derive(Debug, Clone, Default)]
pub struct IndexDocument {
    external_id: String,
    fields: BTreeMap<Field, Vec<String>>,
    attributes: BTreeMap<String, String>,
}

impl IndexDocument {
    /// Create a new document with the given external ID.
    pub fn new<S: Into<String>>(external_id: S) -> Self {
        IndexDocument {
            external_id: external_id.into(),
            ..Default::default()
        }
    }

    /// Set the terms of a field, in position order.
    pub fn field<I, S>(mut self, field: Field, terms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields
            .insert(field, terms.into_iter().map(Into::into).collect());
        self
    }

    /// Set a stored attribute.
    pub fn attribute<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

/// A raw document as stored in a JSON corpus file.
///
/// ```json
/// [{"id": "clueweb09-en0000-00-00000",
///   "fields": {"body": "...", "title": "..."},
///   "attributes": {"rawUrl": "http://...", "score": "71"}}]
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorpusDocument {
    /// External document ID.
    pub id: String,

    /// Raw field text, analyzed on load.
    #[serde(default)]
    pub fields: BTreeMap<Field, String>,

    /// Stored attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

#[derive(Debug, Clone)]
struct StoredDocument {
    external_id: String,
    fields: BTreeMap<Field, Vec<String>>,
    attributes: BTreeMap<String, String>,
}

/// An index held entirely in memory.
#[derive(Debug, Default)]
pub struct MemoryIndex {
    postings: AHashMap<(Field, String), Arc<PostingList>>,
    documents: BTreeMap<DocId, StoredDocument>,
    external_ids: AHashMap<String, DocId>,
    field_lengths: AHashMap<Field, u64>,
    field_doc_counts: AHashMap<Field, u64>,
    next_doc_id: DocId,
}

impl MemoryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a document under the next free internal ID.
    pub fn add_document(&mut self, doc: IndexDocument) -> Result<DocId> {
        let doc_id = self.next_doc_id;
        self.add_document_with_id(doc_id, doc)?;
        Ok(doc_id)
    }

    /// Add a document under a specific internal ID.
    ///
    /// IDs must be added in increasing order so posting lists stay sorted.
    pub fn add_document_with_id(&mut self, doc_id: DocId, doc: IndexDocument) -> Result<()> {
        if doc_id < self.next_doc_id {
            return Err(QevalError::index(format!(
                "document id {doc_id} is below the next free id {}",
                self.next_doc_id
            )));
        }
        if self.external_ids.contains_key(&doc.external_id) {
            return Err(QevalError::index(format!(
                "duplicate external id '{}'",
                doc.external_id
            )));
        }

        for (&field, terms) in &doc.fields {
            if terms.is_empty() {
                continue;
            }

            let mut positions: BTreeMap<&str, Vec<u64>> = BTreeMap::new();
            for (pos, term) in terms.iter().enumerate() {
                positions.entry(term.as_str()).or_default().push(pos as u64);
            }

            for (term, term_positions) in positions {
                let list = self
                    .postings
                    .entry((field, term.to_string()))
                    .or_insert_with(|| Arc::new(PostingList::new(field)));
                Arc::make_mut(list).append_posting(doc_id, term_positions)?;
            }

            *self.field_lengths.entry(field).or_insert(0) += terms.len() as u64;
            *self.field_doc_counts.entry(field).or_insert(0) += 1;
        }

        self.external_ids.insert(doc.external_id.clone(), doc_id);
        self.documents.insert(
            doc_id,
            StoredDocument {
                external_id: doc.external_id,
                fields: doc.fields,
                attributes: doc.attributes,
            },
        );
        self.next_doc_id = doc_id + 1;

        Ok(())
    }

    /// Build an index from a JSON corpus, analyzing every field.
    pub fn from_json_corpus<R: Read>(reader: R, analyzer: &dyn Analyzer) -> Result<Self> {
        let corpus: Vec<CorpusDocument> = serde_json::from_reader(reader)?;
        let mut index = MemoryIndex::new();

        for raw in corpus {
            let mut doc = IndexDocument::new(raw.id);
            for (field, text) in &raw.fields {
                doc = doc.field(*field, analyzer.analyze(text)?);
            }
            for (name, value) in raw.attributes {
                doc = doc.attribute(name, value);
            }
            index.add_document(doc)?;
        }

        log::debug!(
            "Loaded {} documents, {} inverted lists",
            index.documents.len(),
            index.postings.len()
        );

        Ok(index)
    }

    /// Build an index from a JSON corpus file.
    pub fn from_json_file<P: AsRef<Path>>(path: P, analyzer: &dyn Analyzer) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| {
            QevalError::config(format!("cannot open index '{}': {e}", path.display()))
        })?;
        Self::from_json_corpus(std::io::BufReader::new(file), analyzer)
    }

    fn document(&self, doc_id: DocId) -> Result<&StoredDocument> {
        self.documents
            .get(&doc_id)
            .ok_or_else(|| QevalError::not_found(format!("document {doc_id}")))
    }
}

impl IndexReader for MemoryIndex {
    fn doc_count(&self) -> u64 {
        self.documents.len() as u64
    }

    fn field_doc_count(&self, field: Field) -> u64 {
        self.field_doc_counts.get(&field).copied().unwrap_or(0)
    }

    fn sum_of_field_lengths(&self, field: Field) -> u64 {
        self.field_lengths.get(&field).copied().unwrap_or(0)
    }

    fn field_length(&self, field: Field, doc_id: DocId) -> Result<u64> {
        let doc = self.document(doc_id)?;
        Ok(doc.fields.get(&field).map_or(0, |terms| terms.len() as u64))
    }

    fn postings(&self, field: Field, term: &str) -> Result<Option<Arc<PostingList>>> {
        Ok(self.postings.get(&(field, term.to_string())).cloned())
    }

    fn term_vector(&self, doc_id: DocId, field: Field) -> Result<Option<TermVector>> {
        let doc = self.document(doc_id)?;
        let terms = match doc.fields.get(&field) {
            Some(terms) if !terms.is_empty() => terms,
            _ => return Ok(None),
        };

        let mut freqs: AHashMap<&str, u64> = AHashMap::new();
        for term in terms {
            *freqs.entry(term.as_str()).or_insert(0) += 1;
        }

        let mut entries = Vec::with_capacity(freqs.len());
        for (term, freq) in freqs {
            let stats = self.term_stats(field, term)?;
            entries.push(TermVectorEntry {
                term: term.to_string(),
                freq,
                doc_freq: stats.doc_freq,
                total_freq: stats.total_freq,
            });
        }

        Ok(Some(TermVector::new(doc_id, field, entries)))
    }

    fn external_id(&self, doc_id: DocId) -> Result<String> {
        Ok(self.document(doc_id)?.external_id.clone())
    }

    fn internal_id(&self, external_id: &str) -> Result<Option<DocId>> {
        Ok(self.external_ids.get(external_id).copied())
    }

    fn attribute(&self, name: &str, doc_id: DocId) -> Result<Option<String>> {
        Ok(self.document(doc_id)?.attributes.get(name).cloned())
    }
}
