//! Output formatting for CLI commands.

use serde::{Deserialize, Serialize};

use crate::cli::args::{OutputFormat, QevalArgs};
use crate::config::EngineConfig;
use crate::error::Result;

/// Result of a batch run.
#[derive(Debug, Serialize, Deserialize)]
pub struct RunResult {
    pub queries: usize,
    pub skipped: usize,
    pub output_path: String,
    pub duration_ms: u64,
}

/// A parsed and optimized query.
#[derive(Debug, Serialize, Deserialize)]
pub struct ParsedQuery {
    pub model: String,
    pub query: String,
    /// `None` when no searchable term is left.
    pub optimized: Option<String>,
    pub terms: Vec<String>,
}

/// One ranked document.
#[derive(Debug, Serialize, Deserialize)]
pub struct Hit {
    pub rank: usize,
    pub external_id: String,
    pub score: f64,
}

/// Result structure for search operations.
#[derive(Debug, Serialize, Deserialize)]
pub struct SearchResults {
    pub hits: Vec<Hit>,
    pub total_hits: usize,
    pub duration_ms: u64,
}

/// Human-readable rendering of a command result.
pub trait HumanOutput: Serialize {
    /// Print the result for a person. Defaults to `key: value` lines.
    fn print_human(&self) -> Result<()> {
        output_generic_human(&serde_json::to_value(self)?);
        Ok(())
    }
}

impl HumanOutput for RunResult {}

impl HumanOutput for ParsedQuery {
    fn print_human(&self) -> Result<()> {
        println!("Model: {}", self.model);
        match &self.optimized {
            Some(query) => println!("Query: {query}"),
            None => println!("Query: (no searchable terms)"),
        }
        if !self.terms.is_empty() {
            println!("Terms: {}", self.terms.join(", "));
        }
        Ok(())
    }
}

impl HumanOutput for SearchResults {
    fn print_human(&self) -> Result<()> {
        println!("Search Results:");
        println!("═══════════════");
        for hit in &self.hits {
            println!("{:>4}  {:<32} {:.6}", hit.rank, hit.external_id, hit.score);
        }
        println!();
        println!("Total hits: {}", self.total_hits);
        println!("Search time: {}ms", self.duration_ms);
        Ok(())
    }
}

impl HumanOutput for EngineConfig {}

/// Output a result in the specified format.
pub fn output_result<T: HumanOutput>(message: &str, result: &T, args: &QevalArgs) -> Result<()> {
    match args.output_format {
        OutputFormat::Human => {
            if args.verbosity() > 0 {
                println!("{message}");
                println!();
            }
            result.print_human()
        }
        OutputFormat::Json => output_json(result, args),
    }
}

/// Output generic data in human format.
fn output_generic_human(value: &serde_json::Value) {
    match value {
        serde_json::Value::Object(obj) => {
            for (key, val) in obj {
                println!("{key}: {}", format_value(val));
            }
        }
        _ => println!("{}", format_value(value)),
    }
}

/// Output in JSON format.
fn output_json<T: Serialize>(result: &T, args: &QevalArgs) -> Result<()> {
    let json = if args.pretty {
        serde_json::to_string_pretty(result)?
    } else {
        serde_json::to_string(result)?
    };

    println!("{json}");
    Ok(())
}

/// Format a JSON value for display.
fn format_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Number(n) => n.to_string(),
        serde_json::Value::Bool(b) => b.to_string(),
        serde_json::Value::Array(arr) => {
            let formatted_values = arr.iter().map(format_value).collect::<Vec<_>>().join(", ");
            format!("[{formatted_values}]")
        }
        serde_json::Value::Object(obj) => {
            let formatted_values = obj
                .iter()
                .map(|(k, v)| format!("{k}={}", format_value(v)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{formatted_values}}}")
        }
        serde_json::Value::Null => "null".to_string(),
    }
}
