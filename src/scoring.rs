//! Boundary to the external record scorer.
//!
//! The scorer receives the page cache file of a keyword and answers with
//! a table of columns per URL. Records may carry any extra fields; the
//! scorer is expected to ignore what it does not understand.

use std::collections::BTreeMap;
use std::path::Path;

use async_trait::async_trait;
use serde_json::Value;
use tokio::process::Command;
use tracing::debug;

use crate::app::{GleanerError, Result};
use crate::domain::Fields;

/// Score columns keyed by record URL.
pub type ScoreTable = BTreeMap<String, Fields>;

#[async_trait]
pub trait RecordScorer: Send + Sync {
    async fn score(&self, pages_path: &Path) -> Result<ScoreTable>;
}

/// Runs an external program with the cache path as its last argument.
///
/// The program must print `{"<url>": {"<column>": <value>, ...}, ...}` on
/// stdout and exit successfully.
#[derive(Debug, Clone)]
pub struct CommandScorer {
    program: String,
    args: Vec<String>,
}

impl CommandScorer {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Split a whitespace-separated command line. No shell quoting.
    pub fn parse(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace();
        let program = parts
            .next()
            .ok_or_else(|| GleanerError::Scorer("empty scorer command".into()))?;
        Ok(parts.fold(Self::new(program), Self::arg))
    }
}

#[async_trait]
impl RecordScorer for CommandScorer {
    async fn score(&self, pages_path: &Path) -> Result<ScoreTable> {
        debug!("Running scorer {} on {}", self.program, pages_path.display());
        let output = Command::new(&self.program)
            .args(&self.args)
            .arg(pages_path)
            .output()
            .await
            .map_err(|e| GleanerError::Scorer(format!("could not run {}: {}", self.program, e)))?;

        if !output.status.success() {
            return Err(GleanerError::Scorer(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        parse_table(&output.stdout)
    }
}

/// Parse scorer output into a table, rejecting anything but an object of objects.
pub fn parse_table(bytes: &[u8]) -> Result<ScoreTable> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| GleanerError::Scorer(format!("unreadable scorer output: {}", e)))?;
    let Value::Object(rows) = value else {
        return Err(GleanerError::Scorer("scorer output is not a JSON object".into()));
    };

    rows.into_iter()
        .map(|(url, row)| match row {
            Value::Object(columns) => Ok((url, columns)),
            _ => Err(GleanerError::Scorer(format!("row for {} is not an object", url))),
        })
        .collect()
}
