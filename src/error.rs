//! Error types for the album catalog

use thiserror::Error;

use crate::schema::Direction;
use crate::validation::Violation;

/// Result type for catalog operations
pub type Result<T> = std::result::Result<T, CatalogError>;

/// Catalog errors
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Failed to load contracts from {origin}: {}", join_issues(.issues))]
    SchemaLoad { origin: String, issues: Vec<String> },

    #[error("Unknown operation: {operation} ({direction}){}", did_you_mean(.suggestion))]
    UnknownOperation {
        operation: String,
        direction: Direction,
        suggestion: Option<String>,
    },

    #[error("Validation failed for {operation} ({direction}): {}", summarize(.violations))]
    Validation {
        operation: String,
        direction: Direction,
        violations: Vec<Violation>,
    },

    #[error("Album not found: {query}")]
    NotFound { query: String },

    #[error("Schema registry already installed for this process")]
    AlreadyInstalled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CatalogError {
    /// Shorthand for a load failure with a single issue
    pub fn load(origin: impl Into<String>, issue: impl Into<String>) -> Self {
        CatalogError::SchemaLoad {
            origin: origin.into(),
            issues: vec![issue.into()],
        }
    }

    /// Whether the error is caller-facing (bad input, missing album) rather
    /// than a startup or configuration failure
    pub fn is_recoverable(&self) -> bool {
        matches!(self, CatalogError::Validation { .. } | CatalogError::NotFound { .. })
    }

    /// HTTP status a web front end answers with for this error
    pub fn http_status(&self) -> u16 {
        match self {
            CatalogError::Validation { .. } => 400,
            CatalogError::NotFound { .. } => 404,
            _ => 500,
        }
    }

    /// Violations carried by a validation failure
    pub fn violations(&self) -> &[Violation] {
        match self {
            CatalogError::Validation { violations, .. } => violations,
            _ => &[],
        }
    }
}

fn join_issues(issues: &[String]) -> String {
    issues.join("; ")
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    match suggestion {
        Some(s) => format!(", did you mean '{}'?", s),
        None => String::new(),
    }
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}
