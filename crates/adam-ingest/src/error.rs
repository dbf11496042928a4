//! Error types for SDTM domain loading.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while loading source domains.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum IngestError {
    // === File System Errors ===
    /// Directory not found or not readable.
    #[error("directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    /// Failed to read directory entries.
    #[error("failed to read directory {path}: {source}")]
    DirectoryRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to read a file.
    #[error("failed to read {path}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A required domain has no file in the source directory.
    #[error("required domain {domain} not found in {dir}")]
    MissingDomain { domain: String, dir: PathBuf },

    // === CSV Parsing Errors ===
    /// Failed to parse CSV with Polars.
    #[error("failed to parse CSV {path}: {message}")]
    CsvParse { path: PathBuf, message: String },

    // === Schema Errors ===
    /// Required column not found in a domain file.
    #[error("required column '{column}' of domain {domain} not found in {path}")]
    MissingColumn {
        domain: String,
        column: String,
        path: PathBuf,
    },

    /// Cell does not match the declared column type.
    #[error("invalid {column} value '{value}' in {path} (row {row})")]
    InvalidValue {
        column: String,
        value: String,
        row: usize,
        path: PathBuf,
    },

    /// Same qualifier recorded twice for one parent record.
    #[error("duplicate qualifier {qnam} for {usubjid}/{idvarval} in {domain}")]
    DuplicateQualifier {
        domain: String,
        usubjid: String,
        idvarval: String,
        qnam: String,
    },

    // === DataFrame Errors ===
    /// Failed DataFrame operation.
    #[error("DataFrame operation failed: {message}")]
    DataFrame { message: String },
}

/// Result type for ingest operations.
pub type Result<T> = std::result::Result<T, IngestError>;
