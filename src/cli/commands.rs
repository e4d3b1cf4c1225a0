//! Command implementations for the qeval CLI.

use std::sync::Arc;
use std::time::Instant;

use crate::analysis::analyzer::{Analyzer, StandardAnalyzer};
use crate::cli::args::*;
use crate::cli::output::*;
use crate::config::EngineConfig;
use crate::engine::{BatchRunner, QueryEngine};
use crate::error::Result;
use crate::index::memory::MemoryIndex;
use crate::query::parser::QueryParser;

/// Execute a CLI command.
pub fn execute_command(args: QevalArgs) -> Result<()> {
    match &args.command {
        Command::Run(run_args) => run_batch(run_args, &args),
        Command::Parse(parse_args) => parse_query(parse_args, &args),
        Command::Search(search_args) => search_corpus(search_args, &args),
        Command::Config(config_args) => show_config(config_args, &args),
    }
}

/// Run every query of a parameter file.
fn run_batch(args: &RunArgs, cli_args: &QevalArgs) -> Result<()> {
    let start_time = Instant::now();
    let config = EngineConfig::from_file(&args.param_file)?;
    let output_path = config.trec_eval_output_path.to_string_lossy().to_string();

    let summary = BatchRunner::from_config(config)?.run()?;

    output_result(
        "Batch run finished",
        &RunResult {
            queries: summary.queries,
            skipped: summary.skipped,
            output_path,
            duration_ms: start_time.elapsed().as_millis() as u64,
        },
        cli_args,
    )
}

/// Parse and optimize a query.
fn parse_query(args: &ParseArgs, cli_args: &QevalArgs) -> Result<()> {
    let model = args.model.build();
    let parser = QueryParser::new(Arc::new(StandardAnalyzer::new()));
    let optimized = parser.parse_optimized(&args.query, &model)?;

    output_result(
        "Parsed query",
        &ParsedQuery {
            model: model.to_string(),
            query: args.query.clone(),
            terms: optimized.as_ref().map(|q| q.terms()).unwrap_or_default(),
            optimized: optimized.map(|q| q.to_string()),
        },
        cli_args,
    )
}

/// Evaluate one query over a JSON corpus.
fn search_corpus(args: &SearchArgs, cli_args: &QevalArgs) -> Result<()> {
    let analyzer: Arc<dyn Analyzer> = Arc::new(StandardAnalyzer::new());
    let index = MemoryIndex::from_json_file(&args.corpus, analyzer.as_ref())?;
    let engine = QueryEngine::new(Arc::new(index), analyzer);
    let model = args.model.build();

    let start_time = Instant::now();
    let results = engine.search(&args.query, &model)?;
    let duration_ms = start_time.elapsed().as_millis() as u64;

    let mut hits = Vec::with_capacity(args.limit.min(results.len()));
    for (i, doc) in results.iter().take(args.limit).enumerate() {
        hits.push(Hit {
            rank: i + 1,
            external_id: engine.index().external_id(doc.doc_id)?,
            score: doc.score,
        });
    }

    output_result(
        &format!("Search results for '{}'", args.query),
        &SearchResults {
            hits,
            total_hits: results.len(),
            duration_ms,
        },
        cli_args,
    )
}

/// Show the typed configuration of a parameter file.
fn show_config(args: &ConfigArgs, cli_args: &QevalArgs) -> Result<()> {
    let config = EngineConfig::from_file(&args.param_file)?;
    output_result(
        &format!("Configuration of {}", args.param_file.display()),
        &config,
        cli_args,
    )
}
