//! Query evaluation and batch runs.
//!
//! [`QueryEngine`] evaluates one structured query document-at-a-time over an
//! index. [`BatchRunner`] drives a whole run from an [`EngineConfig`]: it reads
//! the query file, optionally expands each query with pseudo-relevance
//! feedback or re-ranks it with a learned model, and writes TREC result
//! lines.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::analysis::analyzer::{Analyzer, StandardAnalyzer};
use crate::config::{BatchErrorPolicy, EngineConfig, FeedbackConfig};
use crate::error::{QevalError, Result};
use crate::feedback::{InitialRanking, QueryExpander, expanded_query, write_expansion};
use crate::index::memory::MemoryIndex;
use crate::index::reader::IndexReader;
use crate::letor::LetorPipeline;
use crate::model::RetrievalModel;
use crate::query::cursor::DocCursor;
use crate::query::inverted::InvertedListCache;
use crate::query::node::QueryNode;
use crate::query::parser::QueryParser;
use crate::query::results::{ResultList, ScoredDoc};
use crate::query::score::{ScoreNode, ScoringContext};

/// Evaluates queries over one index.
#[derive(Debug, Clone)]
pub struct QueryEngine {
    index: Arc<dyn IndexReader>,
    parser: QueryParser,
}

impl QueryEngine {
    /// Create an engine whose query terms are processed by `analyzer`.
    pub fn new(index: Arc<dyn IndexReader>, analyzer: Arc<dyn Analyzer>) -> Self {
        QueryEngine {
            index,
            parser: QueryParser::new(analyzer),
        }
    }

    /// The index being searched.
    pub fn index(&self) -> &dyn IndexReader {
        self.index.as_ref()
    }

    /// The query parser.
    pub fn parser(&self) -> &QueryParser {
        &self.parser
    }

    /// Parse and optimize a query for a model.
    pub fn parse(&self, query: &str, model: &RetrievalModel) -> Result<Option<QueryNode>> {
        self.parser.parse_optimized(query, model)
    }

    /// Score every document the query matches.
    ///
    /// The returned list is sorted by score descending; equal scores are
    /// ordered by external document id.
    pub fn evaluate(&self, query: &QueryNode, model: &RetrievalModel) -> Result<ResultList> {
        let index = self.index.as_ref();
        let mut cache = InvertedListCache::new(index);
        let mut root = ScoreNode::build(query, model, &mut cache)?;

        let mut results = ResultList::new();
        while let Some(doc) = root.current() {
            let ctx = ScoringContext { index, model, doc };
            results.add(doc, root.score(&ctx)?);
            root.advance_past(doc);
        }

        results.sort(index)?;
        Ok(results)
    }

    /// Parse, optimize and evaluate a query string.
    pub fn search(&self, query: &str, model: &RetrievalModel) -> Result<ResultList> {
        match self.parse(query, model)? {
            Some(node) => self.evaluate(&node, model),
            None => Ok(ResultList::new()),
        }
    }
}

/// Split a query file line `qid: query` into its id and query text.
pub fn parse_query_line(line: &str) -> Result<(String, String)> {
    let Some((id, query)) = line.split_once(':') else {
        return Err(QevalError::query_syntax(format!(
            "query line has no ':' separator: '{line}'"
        )));
    };
    let id = id.trim();
    if id.is_empty() {
        return Err(QevalError::query_syntax(format!("query line has no id: '{line}'")));
    }
    Ok((id.to_string(), query.trim().to_string()))
}

/// Read the non-blank lines of a query file.
pub fn read_query_lines<P: AsRef<Path>>(path: P) -> Result<Vec<String>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| {
        QevalError::config(format!("cannot read query file '{}': {e}", path.display()))
    })?;

    let mut lines = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        if !line.trim().is_empty() {
            lines.push(line);
        }
    }
    Ok(lines)
}

/// Write the top `max_results` documents of one query as TREC lines.
///
/// A query without results gets a single `dummy` line so that every query
/// appears in the run.
pub fn write_trec_results<W: Write>(
    writer: &mut W,
    query_id: &str,
    results: &ResultList,
    index: &dyn IndexReader,
    run_id: &str,
    max_results: usize,
) -> Result<()> {
    if results.is_empty() {
        writeln!(writer, "{query_id} Q0 dummy 1 0.000000000000 {run_id}")?;
        return Ok(());
    }

    for (rank, doc) in results.iter().take(max_results).enumerate() {
        writeln!(
            writer,
            "{} Q0 {} {} {:.12} {}",
            query_id,
            index.external_id(doc.doc_id)?,
            rank + 1,
            doc.score,
            run_id
        )?;
    }
    Ok(())
}

/// Counts of a finished batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    /// Queries evaluated.
    pub queries: usize,
    /// Queries skipped because of syntax errors.
    pub skipped: usize,
}

/// Runs every query of a query file.
#[derive(Debug)]
pub struct BatchRunner {
    config: EngineConfig,
    engine: QueryEngine,
    model: RetrievalModel,
}

impl BatchRunner {
    /// Create a runner over an existing engine.
    pub fn new(config: EngineConfig, engine: QueryEngine) -> Self {
        let model = config.model.build();
        BatchRunner {
            config,
            engine,
            model,
        }
    }

    /// Load the index named by the configuration and create a runner.
    pub fn from_config(config: EngineConfig) -> Result<Self> {
        let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
        let index = MemoryIndex::from_json_file(&config.index_path, analyzer.as_ref())?;
        info!(
            "Loaded {} documents from {}",
            index.doc_count(),
            config.index_path.display()
        );
        let engine = QueryEngine::new(Arc::new(index), analyzer);
        Ok(Self::new(config, engine))
    }

    /// The configuration of this run.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The engine queries are evaluated with.
    pub fn engine(&self) -> &QueryEngine {
        &self.engine
    }

    /// Evaluate the query file and write the result file.
    pub fn run(&self) -> Result<BatchSummary> {
        let lines = read_query_lines(&self.config.query_file_path)?;
        let mut output = BufWriter::new(File::create(&self.config.trec_eval_output_path)?);
        info!("Running {} queries with {}", lines.len(), self.model);

        let summary = match &self.config.letor {
            Some(letor) => {
                let (queries, mut summary) = self.collect_queries(&lines)?;
                let pipeline = LetorPipeline::new(letor, &self.config.model)?;
                pipeline.train(&self.engine)?;
                pipeline.rerank(
                    &self.engine,
                    &queries,
                    &mut output,
                    &self.config.run_id,
                    self.config.max_results,
                )?;
                summary.queries = queries.len();
                summary
            }
            None => self.run_queries(&lines, &mut output)?,
        };

        output.flush()?;
        info!(
            "Finished run: {} queries, {} skipped",
            summary.queries, summary.skipped
        );
        Ok(summary)
    }

    fn run_queries<W: Write>(&self, lines: &[String], output: &mut W) -> Result<BatchSummary> {
        let ranking = match self
            .config
            .feedback
            .as_ref()
            .and_then(|fb| fb.initial_ranking_file.as_ref())
        {
            Some(path) => Some(InitialRanking::from_file(path)?),
            None => None,
        };
        let mut expansion_output = match self
            .config
            .feedback
            .as_ref()
            .and_then(|fb| fb.expansion_query_file.as_ref())
        {
            Some(path) => Some(BufWriter::new(File::create(path)?)),
            None => None,
        };

        let mut summary = BatchSummary::default();
        for line in lines {
            let outcome = parse_query_line(line).and_then(|(id, query)| {
                let results = self.process_query(
                    &id,
                    &query,
                    ranking.as_ref(),
                    expansion_output.as_mut().map(|w| w as &mut dyn Write),
                )?;
                write_trec_results(
                    output,
                    &id,
                    &results,
                    self.engine.index(),
                    &self.config.run_id,
                    self.config.max_results,
                )
            });
            if self.handle_outcome(line, outcome)? {
                summary.queries += 1;
            } else {
                summary.skipped += 1;
            }
        }

        if let Some(writer) = expansion_output.as_mut() {
            writer.flush()?;
        }
        Ok(summary)
    }

    /// Parse every query line, applying the error policy.
    fn collect_queries(&self, lines: &[String]) -> Result<(Vec<(String, String)>, BatchSummary)> {
        let mut queries = Vec::with_capacity(lines.len());
        let mut summary = BatchSummary::default();
        for line in lines {
            let outcome = parse_query_line(line).and_then(|(id, query)| {
                // Surface syntax errors here so the policy applies per query.
                self.engine.parse(&query, &self.model)?;
                Ok((id, query))
            });
            match outcome {
                Ok(query) => queries.push(query),
                Err(e) => {
                    self.handle_outcome(line, Err(e))?;
                    summary.skipped += 1;
                }
            }
        }
        Ok((queries, summary))
    }

    /// `Ok(true)` for a finished query, `Ok(false)` for a skipped one.
    fn handle_outcome(&self, line: &str, outcome: Result<()>) -> Result<bool> {
        match outcome {
            Ok(()) => Ok(true),
            Err(e) if e.is_query_syntax() && self.config.batch_error_policy == BatchErrorPolicy::Skip => {
                warn!("Skipping query '{line}': {e}");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn process_query(
        &self,
        query_id: &str,
        query: &str,
        ranking: Option<&InitialRanking>,
        expansion_output: Option<&mut dyn Write>,
    ) -> Result<ResultList> {
        debug!("Query {query_id}: {query}");
        let results = match &self.config.feedback {
            None => self.engine.search(query, &self.model)?,
            Some(feedback) => {
                let expanded = self.expand(query_id, query, feedback, ranking, expansion_output)?;
                debug!("Expanded query {query_id}: {expanded}");
                self.engine.search(&expanded, &self.model)?
            }
        };
        info!("Query {query_id}: {} documents matched", results.len());
        Ok(results)
    }

    fn expand(
        &self,
        query_id: &str,
        query: &str,
        feedback: &FeedbackConfig,
        ranking: Option<&InitialRanking>,
        expansion_output: Option<&mut dyn Write>,
    ) -> Result<String> {
        let index = self.engine.index();
        let top_docs: Vec<ScoredDoc> = match ranking {
            Some(ranking) => ranking.top_docs(query_id, feedback.fb_docs, index)?,
            None => {
                let mut initial = self.engine.search(query, &self.model)?;
                initial.truncate(feedback.fb_docs);
                initial.into_iter().collect()
            }
        };

        let expansion = QueryExpander::new(feedback.fb_mu, feedback.fb_terms).expand(index, &top_docs)?;
        if let Some(mut writer) = expansion_output {
            write_expansion(&mut writer, query_id, &expansion)?;
        }

        Ok(expanded_query(
            query,
            self.model.default_operator(),
            &expansion,
            feedback.fb_orig_weight,
        ))
    }
}
