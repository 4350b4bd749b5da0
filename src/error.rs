use serde_json::json;
use std::path::PathBuf;
use thiserror::Error;

/// Failures that abort a whole describe/import/export/clean-up call.
///
/// Per-row problems never surface here; they are collected as
/// [`crate::exchange::RowError`] and reported alongside the result.
#[derive(Debug, Error)]
pub enum ExchangeError {
    #[error("unknown model: {0}")]
    UnknownModel(String),

    #[error("invalid declaration for model {model}: {message}")]
    InvalidSchema { model: String, message: String },

    #[error("failed to read source {}: {source}", path.to_string_lossy())]
    Source {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("failed to write destination {}: {message}", path.to_string_lossy())]
    Destination { path: PathBuf, message: String },

    #[error("missing required fields for {model}: {}", missing.join(", "))]
    SchemaMismatch { model: String, missing: Vec<String> },

    #[error("{model} already holds {existing} records; choose replace, merge or cancel")]
    PolicyRequired { model: String, existing: usize },

    #[error("unique constraint rejected record {index} of {model}: {message}")]
    UniqueViolation {
        model: String,
        index: usize,
        message: String,
    },

    #[error("line {line}: {model} conflicts with an existing record ({message}); nothing was imported")]
    ReconciliationConflict {
        model: String,
        line: u64,
        message: String,
    },

    #[error("invalid setting: {0}")]
    Settings(String),

    #[error(transparent)]
    Store(#[from] rusqlite::Error),
}

impl ExchangeError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownModel(_) => "unknown_model",
            Self::InvalidSchema { .. } => "invalid_schema",
            Self::Source { .. } | Self::Destination { .. } => "io_failed",
            Self::SchemaMismatch { .. } => "schema_mismatch",
            Self::PolicyRequired { .. } => "policy_required",
            Self::UniqueViolation { .. } | Self::ReconciliationConflict { .. } => {
                "reconciliation_conflict"
            }
            Self::Settings(_) => "bad_settings",
            Self::Store(_) => "db_failed",
        }
    }

    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            Self::UnknownModel(model) => Some(json!({ "model": model })),
            Self::Source { path, .. } | Self::Destination { path, .. } => {
                Some(json!({ "path": path.to_string_lossy() }))
            }
            Self::SchemaMismatch { model, missing } => {
                Some(json!({ "model": model, "missing": missing }))
            }
            Self::PolicyRequired { model, existing } => {
                Some(json!({ "model": model, "existing": existing }))
            }
            Self::ReconciliationConflict { model, line, .. } => {
                Some(json!({ "model": model, "line": line }))
            }
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, ExchangeError>;
