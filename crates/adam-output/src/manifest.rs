//! Run manifest.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::atomic::write_atomic;
use crate::error::{OutputError, Result};

pub const MANIFEST_FILE: &str = "manifest.json";

/// One stored table as recorded in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Table file name relative to the output directory.
    pub file: String,
    pub records: usize,
    pub sha256: String,
}

/// A stage that produced no table in this run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedStage {
    pub dataset: String,
    pub kind: String,
    pub message: String,
}

/// Summary of one pipeline run, written as `manifest.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunManifest {
    pub created_at: DateTime<Utc>,
    pub tool_version: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sdtm_dir: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub spec_dir: Option<PathBuf>,
    /// Tables written in this run, keyed by dataset name.
    #[serde(default)]
    pub tables: BTreeMap<String, ManifestEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<FailedStage>,
}

impl RunManifest {
    pub fn new(tool_version: impl Into<String>) -> Self {
        Self {
            created_at: Utc::now(),
            tool_version: tool_version.into(),
            sdtm_dir: None,
            spec_dir: None,
            tables: BTreeMap::new(),
            failed: Vec::new(),
        }
    }

    pub fn record_table(&mut self, dataset: &str, entry: ManifestEntry) {
        self.tables.insert(dataset.to_string(), entry);
    }

    pub fn record_failure(&mut self, dataset: &str, kind: &str, message: impl Into<String>) {
        self.failed.push(FailedStage {
            dataset: dataset.to_string(),
            kind: kind.to_string(),
            message: message.into(),
        });
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self).map_err(|e| OutputError::Metadata {
            path: path.to_path_buf(),
            source: e,
        })?;
        write_atomic(path, &json)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = fs::read(path).map_err(|e| OutputError::io("read", path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| OutputError::Metadata {
            path: path.to_path_buf(),
            source: e,
        })
    }
}
