//! Derivation error taxonomy.
//!
//! Every variant names the dataset being derived so a failed stage can be
//! reported without further context. Row-level violations carry the keys of
//! the offending rows.

use thiserror::Error;

/// How many offending keys are spelled out in error messages.
const MAX_KEYS_IN_MESSAGE: usize = 5;

#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DerivationError {
    /// A required upstream table is absent.
    #[error("{dataset}: required input table {table} is not available")]
    MissingInput { dataset: String, table: String },

    /// A required column is absent from an input table.
    #[error("{dataset}: required column {column} is missing from {table}")]
    MissingColumn {
        dataset: String,
        table: String,
        column: String,
    },

    /// The specification does not define the dataset.
    #[error("{dataset}: no dataset definition in the analysis specification")]
    MissingSpec { dataset: String },

    /// The specification does not define a referenced codelist.
    #[error("{dataset}: codelist {codelist} is not defined in the analysis specification")]
    MissingCodelist { dataset: String, codelist: String },

    /// An observed value has no mapping in the codelist.
    #[error(
        "{dataset}: value '{value}' of {variable} has no entry in codelist {codelist} (key {key})"
    )]
    TerminologyMismatch {
        dataset: String,
        variable: String,
        codelist: String,
        value: String,
        key: String,
    },

    /// More than one row exists for a key that must be unique.
    #[error("{dataset}: cardinality rule '{rule}' violated for {}", summarize_keys(.keys))]
    Cardinality {
        dataset: String,
        rule: String,
        keys: Vec<String>,
    },

    /// A derived value breaks a table invariant.
    #[error("{dataset}: invariant '{rule}' violated for {}", summarize_keys(.keys))]
    InvariantViolation {
        dataset: String,
        rule: String,
        keys: Vec<String>,
    },

    /// Subjects with neither a qualifying event nor a censoring date.
    #[error("{dataset}: no event or censoring date for {}", summarize_keys(.keys))]
    UnresolvedCensoring { dataset: String, keys: Vec<String> },

    /// Validation found blocking issues in a finalized table.
    #[error("{dataset}: {count} blocking validation issue(s)")]
    ValidationFailed { dataset: String, count: usize },

    /// Building or reading a polars frame failed.
    #[error("{dataset}: frame operation failed: {source}")]
    Frame {
        dataset: String,
        #[source]
        source: polars::prelude::PolarsError,
    },
}

impl DerivationError {
    /// Dataset whose stage failed.
    pub fn dataset(&self) -> &str {
        match self {
            DerivationError::MissingInput { dataset, .. }
            | DerivationError::MissingColumn { dataset, .. }
            | DerivationError::MissingSpec { dataset }
            | DerivationError::MissingCodelist { dataset, .. }
            | DerivationError::TerminologyMismatch { dataset, .. }
            | DerivationError::Cardinality { dataset, .. }
            | DerivationError::InvariantViolation { dataset, .. }
            | DerivationError::UnresolvedCensoring { dataset, .. }
            | DerivationError::ValidationFailed { dataset, .. }
            | DerivationError::Frame { dataset, .. } => dataset,
        }
    }

    /// Short category name used in summaries.
    pub fn kind(&self) -> &'static str {
        match self {
            DerivationError::MissingInput { .. }
            | DerivationError::MissingColumn { .. }
            | DerivationError::MissingSpec { .. }
            | DerivationError::MissingCodelist { .. } => "missing-input",
            DerivationError::TerminologyMismatch { .. } => "terminology",
            DerivationError::Cardinality { .. } => "cardinality",
            DerivationError::InvariantViolation { .. }
            | DerivationError::UnresolvedCensoring { .. }
            | DerivationError::ValidationFailed { .. } => "invariant",
            DerivationError::Frame { .. } => "frame",
        }
    }

    pub fn frame(dataset: &str, source: polars::prelude::PolarsError) -> Self {
        DerivationError::Frame {
            dataset: dataset.to_string(),
            source,
        }
    }
}

fn summarize_keys(keys: &[String]) -> String {
    let shown: Vec<&str> = keys
        .iter()
        .take(MAX_KEYS_IN_MESSAGE)
        .map(String::as_str)
        .collect();
    if keys.len() > MAX_KEYS_IN_MESSAGE {
        format!(
            "{} key(s): {} (+{} more)",
            keys.len(),
            shown.join(", "),
            keys.len() - MAX_KEYS_IN_MESSAGE
        )
    } else {
        format!("{} key(s): {}", keys.len(), shown.join(", "))
    }
}

pub type Result<T> = std::result::Result<T, DerivationError>;
