#![deny(unsafe_code)]

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum StandardsError {
    #[error("specification directory not found: {path}")]
    DirectoryNotFound { path: PathBuf },

    #[error("missing specification sheet: {path}")]
    MissingFile { path: PathBuf },

    #[error("failed to read file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse CSV {path}: {message}")]
    Csv { path: PathBuf, message: String },

    #[error("required column '{column}' not found in {path}")]
    MissingColumn { path: PathBuf, column: String },

    #[error("invalid {column} value '{value}' in {path} (row {row})")]
    InvalidValue {
        path: PathBuf,
        row: usize,
        column: String,
        value: String,
    },

    #[error("{path} references dataset {dataset} which is not declared in Datasets.csv")]
    UnknownDataset { path: PathBuf, dataset: String },
}

impl StandardsError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, StandardsError>;
