//! Error types for the tabular question-answering pipeline
//!
//! One enum per concern, using thiserror. Provider clients keep returning
//! `anyhow::Result`; their failures are folded into [`GenerationError`] at the
//! call site together with the timeout handling.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Errors raised while validating or executing an analytics plan.
///
/// These always abort the current query; they are never downgraded to a
/// silent no-op.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CompileError {
    #[error("Unknown column: {0}")]
    UnknownColumn(String),

    #[error("Unknown operation: {0}")]
    UnknownOperation(String),

    #[error("Unknown aggregate kind: {0}")]
    UnknownAggregateKind(String),

    #[error("Unknown sort order: {0}")]
    UnknownSortOrder(String),

    #[error("Step '{op}' is missing required field '{field}'")]
    MissingField { op: String, field: &'static str },

    #[error("Invalid value for '{field}' in step '{op}': {reason}")]
    InvalidField {
        op: String,
        field: &'static str,
        reason: String,
    },

    #[error("Malformed plan step: {0}")]
    MalformedStep(String),

    #[error("Cannot aggregate an already-reduced relation")]
    AlreadyReduced,

    #[error("Cannot sort grouped rows before aggregating them")]
    SortBeforeAggregate,

    #[error("Step '{op}' is not valid on a {shape} relation")]
    InvalidTransition {
        op: &'static str,
        shape: &'static str,
    },

    #[error("Sorting rows requires a 'by' column")]
    MissingSortKey,

    #[error("Grouped rows must be aggregated before a result can be returned")]
    UnreducedGroups,

    #[error("Column '{column}' contains non-numeric value '{value}'")]
    NonNumeric { column: String, value: String },
}

/// The planner's response could not be read as a plan at all.
///
/// Recovered locally by falling back to an explain plan.
#[derive(Error, Debug)]
pub enum PlanParseError {
    #[error("Planner response is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Planner response is not a JSON object")]
    NotAnObject,

    #[error("Planner response has no 'type' field")]
    MissingType,
}

/// Outcome of parsing raw planner text.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error(transparent)]
    Parse(#[from] PlanParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

/// Semantic key problems found while building a schema.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Columns '{first}' and '{second}' both normalize to '{key}'")]
    DuplicateKey {
        key: String,
        first: String,
        second: String,
    },

    #[error("Column '{0}' has no characters usable in a semantic key")]
    EmptyKey(String),
}

/// Failures of the blocking worker pool.
#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Worker pool is closed")]
    Closed,

    #[error("Blocking task failed: {0}")]
    Join(String),
}

/// Failures while (re)building the dataset state.
#[derive(Error, Debug)]
pub enum BuildError {
    #[error("No dataset files found in {}", .0.display())]
    NoFiles(PathBuf),

    #[error("IO error for {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read CSV {}: {source}", path.display())]
    Csv {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("Failed to read workbook {}: {message}", path.display())]
    Workbook { path: PathBuf, message: String },

    #[error("Column '{column}' appears more than once in {}", path.display())]
    DuplicateHeader { path: PathBuf, column: String },

    #[error("Unsupported dataset file: {}", .0.display())]
    UnsupportedFile(PathBuf),

    #[error("No data found in the dataset files")]
    NoRows,

    #[error("Schema error: {0}")]
    Schema(#[from] SchemaError),

    #[error("Planner prompt error: {0}")]
    Prompt(String),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

/// Invalid vector store input or query.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VectorStoreError {
    #[error("Got {embeddings} embeddings for {texts} texts")]
    LengthMismatch { embeddings: usize, texts: usize },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// A call to an external text-generation or embedding model failed.
#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("{operation} timed out after {}s", timeout.as_secs_f64())]
    Timeout {
        operation: &'static str,
        timeout: Duration,
    },

    #[error("{operation} failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },
}

/// Failures of the retrieval path.
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] GenerationError),

    #[error("Vector index error: {0}")]
    Index(#[from] VectorStoreError),

    #[error("Embedder returned no vector for the question")]
    EmptyEmbedding,
}

/// Everything that can abort a single question.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Compilation error: {0}")]
    Compile(#[from] CompileError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Retrieval error: {0}")]
    Retrieval(#[from] RetrievalError),

    #[error("Worker error: {0}")]
    Worker(#[from] WorkerError),
}

impl QueryError {
    /// True when the failure was an elapsed timeout on an external call.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            QueryError::Generation(GenerationError::Timeout { .. })
                | QueryError::Retrieval(RetrievalError::Embedding(GenerationError::Timeout { .. }))
        )
    }
}

/// Invalid configuration values.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value '{value}' for {name}: expected {expected}")]
    Invalid {
        name: &'static str,
        value: String,
        expected: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_error_messages() {
        assert_eq!(
            CompileError::UnknownColumn("region".into()).to_string(),
            "Unknown column: region"
        );
        assert_eq!(
            CompileError::AlreadyReduced.to_string(),
            "Cannot aggregate an already-reduced relation"
        );
    }

    #[test]
    fn test_timeout_detection() {
        let timeout = GenerationError::Timeout {
            operation: "generation",
            timeout: Duration::from_secs(2),
        };
        assert!(QueryError::from(timeout).is_timeout());

        let nested = RetrievalError::Embedding(GenerationError::Timeout {
            operation: "embedding",
            timeout: Duration::from_secs(1),
        });
        assert!(QueryError::from(nested).is_timeout());

        let provider = GenerationError::Provider {
            operation: "generation",
            message: "boom".into(),
        };
        assert!(!QueryError::from(provider).is_timeout());
    }
}
