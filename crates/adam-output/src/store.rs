//! Directory-backed table store.

use std::fs;
use std::path::{Path, PathBuf};

use adam_model::polars::{any_to_string_non_empty, cell_value, num_column, parse_f64, text_column};
use adam_model::{AnalysisTable, ColumnType};
use polars::prelude::*;
use tracing::{debug, info};

use crate::atomic::write_atomic;
use crate::error::{OutputError, Result};
use crate::hash::{compute_file_hash, sha256_hex};
use crate::manifest::{MANIFEST_FILE, ManifestEntry, RunManifest};
use crate::metadata::TableMetadata;

/// Persists and reloads analysis tables under one output directory.
#[derive(Debug, Clone)]
pub struct TableStore {
    dir: PathBuf,
}

impl TableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn table_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.csv", name.to_uppercase()))
    }

    pub fn metadata_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{}.json", name.to_uppercase()))
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.dir.join(MANIFEST_FILE)
    }

    /// Whether both the table file and its sidecar exist.
    pub fn contains(&self, name: &str) -> bool {
        self.table_path(name).is_file() && self.metadata_path(name).is_file()
    }

    /// Writes `table` and its metadata sidecar, replacing any earlier copy.
    pub fn persist(&self, table: &AnalysisTable) -> Result<ManifestEntry> {
        let path = self.table_path(&table.name);
        let metadata = TableMetadata::for_table(table);
        let stored_columns = table.column_names();
        if stored_columns != metadata.column_names() {
            return Err(OutputError::InvalidTable {
                path,
                reason: format!(
                    "frame columns [{}] differ from column metadata [{}]",
                    stored_columns.join(", "),
                    metadata.column_names().join(", ")
                ),
            });
        }

        let bytes = render_csv(table, &path)?;
        write_atomic(&path, &bytes)?;

        let metadata_path = self.metadata_path(&table.name);
        let json =
            serde_json::to_vec_pretty(&metadata).map_err(|e| OutputError::Metadata {
                path: metadata_path.clone(),
                source: e,
            })?;
        write_atomic(&metadata_path, &json)?;

        let entry = ManifestEntry {
            file: format!("{}.csv", table.name.to_uppercase()),
            records: table.record_count(),
            sha256: sha256_hex(&bytes),
        };
        info!(
            dataset = %table.name,
            records = entry.records,
            path = %path.display(),
            "table persisted"
        );
        Ok(entry)
    }

    pub fn load_metadata(&self, name: &str) -> Result<TableMetadata> {
        let path = self.metadata_path(name);
        if !path.is_file() {
            return Err(OutputError::TableNotFound {
                name: name.to_uppercase(),
                dir: self.dir.clone(),
            });
        }
        let bytes = fs::read(&path).map_err(|e| OutputError::io("read", &path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| OutputError::Metadata { path, source: e })
    }

    /// Reads a stored table back with the column types from its sidecar.
    pub fn load(&self, name: &str) -> Result<AnalysisTable> {
        let metadata = self.load_metadata(name)?;
        let path = self.table_path(name);
        if !path.is_file() {
            return Err(OutputError::TableNotFound {
                name: name.to_uppercase(),
                dir: self.dir.clone(),
            });
        }

        let raw = CsvReadOptions::default()
            .with_has_header(true)
            .with_infer_schema_length(Some(0))
            .try_into_reader_with_file_path(Some(path.clone()))
            .map_err(|e| OutputError::Frame {
                path: path.clone(),
                source: e,
            })?
            .finish()
            .map_err(|e| OutputError::Frame {
                path: path.clone(),
                source: e,
            })?;

        let header: Vec<String> = raw
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect();
        if header != metadata.column_names() {
            return Err(OutputError::InvalidTable {
                path,
                reason: format!("header [{}] differs from metadata", header.join(", ")),
            });
        }
        if raw.height() != metadata.records {
            return Err(OutputError::InvalidTable {
                path,
                reason: format!(
                    "{} record(s) stored, metadata declares {}",
                    raw.height(),
                    metadata.records
                ),
            });
        }

        let mut columns = Vec::with_capacity(metadata.columns.len());
        for meta in &metadata.columns {
            let column = raw.column(&meta.name).map_err(|e| OutputError::Frame {
                path: path.clone(),
                source: e,
            })?;
            let cells: Vec<Option<String>> = (0..raw.height())
                .map(|idx| {
                    column
                        .get(idx)
                        .ok()
                        .and_then(any_to_string_non_empty)
                })
                .collect();
            columns.push(match meta.column_type {
                ColumnType::Num => num_column(&meta.name, parse_numeric(&cells, &meta.name, &path)?),
                _ => text_column(&meta.name, cells),
            });
        }
        let data = DataFrame::new(columns).map_err(|e| OutputError::Frame {
            path: path.clone(),
            source: e,
        })?;
        debug!(dataset = %metadata.name, records = data.height(), "table loaded");

        Ok(AnalysisTable {
            name: metadata.name,
            label: metadata.label,
            data,
            columns: metadata.columns,
        })
    }

    pub fn write_manifest(&self, manifest: &RunManifest) -> Result<PathBuf> {
        let path = self.manifest_path();
        manifest.save(&path)?;
        info!(
            path = %path.display(),
            tables = manifest.tables.len(),
            failed = manifest.failed.len(),
            "run manifest written"
        );
        Ok(path)
    }

    pub fn load_manifest(&self) -> Result<RunManifest> {
        RunManifest::load(&self.manifest_path())
    }

    /// Checks that a stored table file still matches its manifest checksum.
    pub fn verify(&self, entry: &ManifestEntry) -> Result<()> {
        let path = self.dir.join(&entry.file);
        let actual = compute_file_hash(&path)?;
        if actual != entry.sha256 {
            return Err(OutputError::ChecksumMismatch {
                path,
                expected: entry.sha256.clone(),
                actual,
            });
        }
        Ok(())
    }
}

/// Renders the table as CSV with a header row; missing cells are empty.
fn render_csv(table: &AnalysisTable, path: &Path) -> Result<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    let csv_error = |source: csv::Error| OutputError::Csv {
        path: path.to_path_buf(),
        source,
    };

    writer
        .write_record(table.columns.iter().map(|meta| meta.name.as_str()))
        .map_err(csv_error)?;

    let mut data_columns = Vec::with_capacity(table.columns.len());
    for meta in &table.columns {
        let column = table.data.column(&meta.name).map_err(|e| OutputError::Frame {
            path: path.to_path_buf(),
            source: e,
        })?;
        data_columns.push((column, meta.column_type));
    }

    for idx in 0..table.record_count() {
        let row = data_columns
            .iter()
            .map(|(column, column_type)| cell_value(column, idx, *column_type).render().unwrap_or_default());
        writer.write_record(row).map_err(csv_error)?;
    }

    writer
        .into_inner()
        .map_err(|e| OutputError::io("write", path, e.into_error()))
}

fn parse_numeric(cells: &[Option<String>], column: &str, path: &Path) -> Result<Vec<Option<f64>>> {
    cells
        .iter()
        .enumerate()
        .map(|(idx, cell)| match cell {
            None => Ok(None),
            Some(text) => parse_f64(text).map(Some).ok_or_else(|| OutputError::InvalidTable {
                path: path.to_path_buf(),
                reason: format!("{column} row {}: '{text}' is not numeric", idx + 1),
            }),
        })
        .collect()
}
