//! Command line argument parsing for the qeval CLI using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::model::RetrievalModel;

/// qeval - structured query evaluation over a document collection
#[derive(Parser, Debug, Clone)]
#[command(name = "qeval")]
#[command(about = "Document-at-a-time evaluation of structured queries")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = None)]
pub struct QevalArgs {
    /// Verbosity level (0=quiet, 1=normal, 2=verbose, 3=debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Quiet mode (overrides verbose)
    #[arg(short, long)]
    pub quiet: bool,

    /// Output format
    #[arg(short = 'f', long = "format", default_value = "human")]
    pub output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long)]
    pub pretty: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,
}

impl QevalArgs {
    /// Get the effective verbosity level
    pub fn verbosity(&self) -> u8 {
        if self.quiet {
            0
        } else {
            match self.verbose {
                0 => 1,
                n => n,
            }
        }
    }
}

/// Available CLI commands
#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run every query of a parameter file's query file
    Run(RunArgs),

    /// Parse and optimize a query without evaluating it
    Parse(ParseArgs),

    /// Evaluate one query over a JSON corpus
    Search(SearchArgs),

    /// Show the typed configuration of a parameter file
    Config(ConfigArgs),
}

/// Arguments for a batch run
#[derive(Parser, Debug, Clone)]
pub struct RunArgs {
    /// Parameter file (key=value lines)
    #[arg(value_name = "PARAM_FILE")]
    pub param_file: PathBuf,
}

/// Retrieval model options shared by `parse` and `search`
#[derive(Parser, Debug, Clone)]
pub struct ModelArgs {
    /// Retrieval model
    #[arg(short = 'm', long, default_value = "bm25")]
    pub model: ModelChoice,

    /// BM25 term frequency saturation
    #[arg(long, default_value = "1.2")]
    pub k1: f64,

    /// BM25 length normalization
    #[arg(long, default_value = "0.75")]
    pub b: f64,

    /// BM25 query term frequency saturation
    #[arg(long, default_value = "0")]
    pub k3: f64,

    /// Query likelihood Dirichlet prior
    #[arg(long, default_value = "2500")]
    pub mu: f64,

    /// Query likelihood Jelinek-Mercer weight
    #[arg(long, default_value = "0.4")]
    pub lambda: f64,
}

impl ModelArgs {
    /// Build the selected retrieval model.
    pub fn build(&self) -> RetrievalModel {
        match self.model {
            ModelChoice::UnrankedBoolean => RetrievalModel::UnrankedBoolean,
            ModelChoice::RankedBoolean => RetrievalModel::RankedBoolean,
            ModelChoice::Bm25 => RetrievalModel::bm25(self.k1, self.b, self.k3),
            ModelChoice::Indri => RetrievalModel::query_likelihood(self.mu, self.lambda),
        }
    }
}

/// Retrieval models selectable on the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelChoice {
    /// Every match scores 1
    UnrankedBoolean,
    /// Term frequency scores
    RankedBoolean,
    /// Okapi BM25
    Bm25,
    /// Query likelihood with smoothing
    Indri,
}

/// Arguments for parsing a query
#[derive(Parser, Debug, Clone)]
pub struct ParseArgs {
    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    #[command(flatten)]
    pub model: ModelArgs,
}

/// Arguments for searching
#[derive(Parser, Debug, Clone)]
pub struct SearchArgs {
    /// JSON corpus file
    #[arg(short, long, value_name = "CORPUS_FILE")]
    pub corpus: PathBuf,

    /// Query string
    #[arg(value_name = "QUERY")]
    pub query: String,

    #[command(flatten)]
    pub model: ModelArgs,

    /// Maximum number of results to return
    #[arg(short, long, default_value = "10")]
    pub limit: usize,
}

/// Arguments for showing a configuration
#[derive(Parser, Debug, Clone)]
pub struct ConfigArgs {
    /// Parameter file (key=value lines)
    #[arg(value_name = "PARAM_FILE")]
    pub param_file: PathBuf,
}

/// Output formats for CLI
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable output
    Human,
    /// JSON output
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ModelKind;

    #[test]
    fn test_search_command() {
        let args = QevalArgs::try_parse_from([
            "qeval",
            "search",
            "--corpus",
            "corpus.json",
            "#and(dog cat)",
            "--model",
            "indri",
            "--mu",
            "1000",
            "--limit",
            "20",
        ])
        .unwrap();

        if let Command::Search(search_args) = args.command {
            assert_eq!(search_args.corpus, PathBuf::from("corpus.json"));
            assert_eq!(search_args.query, "#and(dog cat)");
            assert_eq!(search_args.limit, 20);
            assert_eq!(search_args.model.model, ModelChoice::Indri);
            assert_eq!(search_args.model.mu, 1000.0);
            assert_eq!(search_args.model.build().kind(), ModelKind::QueryLikelihood);
        } else {
            panic!("Expected Search command");
        }
    }

    #[test]
    fn test_parse_command_defaults_to_bm25() {
        let args = QevalArgs::try_parse_from(["qeval", "parse", "apple pie"]).unwrap();

        if let Command::Parse(parse_args) = args.command {
            assert_eq!(parse_args.model.model, ModelChoice::Bm25);
            assert_eq!(parse_args.model.build().default_operator(), "#sum");
        } else {
            panic!("Expected Parse command");
        }
    }

    #[test]
    fn test_run_command() {
        let args = QevalArgs::try_parse_from(["qeval", "-vv", "run", "params.txt"]).unwrap();

        assert_eq!(args.verbosity(), 2);
        if let Command::Run(run_args) = args.command {
            assert_eq!(run_args.param_file, PathBuf::from("params.txt"));
        } else {
            panic!("Expected Run command");
        }
    }

    #[test]
    fn test_verbosity_levels() {
        let args = QevalArgs::try_parse_from(["qeval", "config", "p.txt"]).unwrap();
        assert_eq!(args.verbosity(), 1);

        let args = QevalArgs::try_parse_from(["qeval", "-q", "-vvv", "config", "p.txt"]).unwrap();
        assert_eq!(args.verbosity(), 0);
    }

    #[test]
    fn test_output_format() {
        let args =
            QevalArgs::try_parse_from(["qeval", "--format", "json", "--pretty", "config", "p.txt"])
                .unwrap();
        assert_eq!(args.output_format, OutputFormat::Json);
        assert!(args.pretty);
    }
}
