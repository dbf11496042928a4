//! Domain CSV reading and normalization.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use adam_model::polars::{any_to_string_non_empty, num_column, parse_f64, text_column};
use polars::prelude::*;
use regex::Regex;
use tracing::{debug, info};

use crate::discovery::find_domain_file;
use crate::error::{IngestError, Result};
use crate::schema::{ColumnKind, SdtmDomain};

/// Complete or partial ISO 8601 date with optional time. Any component may be
/// the SDTM `-` placeholder, as in `2014---09` or `2014-06-10T-:30`.
static ISO8601_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}|-)(-(0[1-9]|1[0-2]|-)(-(0[1-9]|[12]\d|3[01]|-)(T([01]\d|2[0-3]|-)(:([0-5]\d|-)(:([0-5]\d(\.\d+)?|-))?)?)?)?)?$",
    )
    .expect("Invalid ISO 8601 regex")
});

/// True for ISO 8601 text with at least one known component.
fn is_iso8601(text: &str) -> bool {
    ISO8601_REGEX.is_match(text) && text.bytes().any(|b| b.is_ascii_digit())
}

/// Source domain frames for one study.
#[derive(Debug, Clone)]
pub struct SourceTables {
    dir: PathBuf,
    tables: BTreeMap<SdtmDomain, DataFrame>,
}

impl SourceTables {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tables: BTreeMap::new(),
        }
    }

    /// Directory the tables were read from.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn get(&self, domain: SdtmDomain) -> Option<&DataFrame> {
        self.tables.get(&domain)
    }

    pub fn insert(&mut self, domain: SdtmDomain, data: DataFrame) {
        self.tables.insert(domain, data);
    }

    pub fn contains(&self, domain: SdtmDomain) -> bool {
        self.tables.contains_key(&domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = SdtmDomain> + '_ {
        self.tables.keys().copied()
    }

    pub fn record_count(&self, domain: SdtmDomain) -> usize {
        self.get(domain).map_or(0, DataFrame::height)
    }
}

/// Loads `domains` from `dir`.
///
/// A missing primary domain aborts the load; a missing supplemental domain is
/// skipped.
pub fn load_study(dir: &Path, domains: &[SdtmDomain]) -> Result<SourceTables> {
    let mut tables = SourceTables::new(dir);
    for &domain in domains {
        let Some(path) = find_domain_file(dir, domain)? else {
            if domain.is_supplemental() {
                debug!(domain = %domain, dir = %dir.display(), "supplemental domain not present");
                continue;
            }
            return Err(IngestError::MissingDomain {
                domain: domain.code().to_string(),
                dir: dir.to_path_buf(),
            });
        };
        let data = read_domain(&path, domain)?;
        debug!(domain = %domain, records = data.height(), path = %path.display(), "domain loaded");
        tables.insert(domain, data);
    }
    info!(
        sdtm_dir = %dir.display(),
        domains = tables.tables.len(),
        "source domains loaded"
    );
    Ok(tables)
}

/// Reads one domain file and applies its schema.
pub fn read_domain(path: &Path, domain: SdtmDomain) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(IngestError::FileRead {
            path: path.to_path_buf(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        });
    }
    let raw = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?
        .finish()
        .map_err(|e| IngestError::CsvParse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
    normalize_frame(&raw, path, domain)
}

/// Trims cells, turns blanks into nulls, and types columns per schema.
fn normalize_frame(raw: &DataFrame, path: &Path, domain: SdtmDomain) -> Result<DataFrame> {
    let schema = domain.schema();
    let names: Vec<String> = raw
        .get_column_names()
        .iter()
        .map(|name| name.trim().trim_start_matches('\u{feff}').to_uppercase())
        .collect();

    for (column, _) in schema.required {
        if !names.iter().any(|name| name == column) {
            return Err(IngestError::MissingColumn {
                domain: domain.code().to_string(),
                column: (*column).to_string(),
                path: path.to_path_buf(),
            });
        }
    }

    let mut columns = Vec::with_capacity(names.len());
    for (source, name) in raw.get_columns().iter().zip(&names) {
        let cells: Vec<Option<String>> = (0..raw.height())
            .map(|idx| any_to_string_non_empty(source.get(idx).unwrap_or(AnyValue::Null)))
            .collect();
        let column = match schema.kind(name) {
            ColumnKind::Text => text_column(name, cells),
            ColumnKind::Number => {
                let mut values = Vec::with_capacity(cells.len());
                for (idx, cell) in cells.iter().enumerate() {
                    values.push(match cell {
                        None => None,
                        Some(text) => Some(
                            parse_f64(text)
                                .filter(|v| v.is_finite())
                                .ok_or_else(|| invalid_value(path, name, idx, text))?,
                        ),
                    });
                }
                num_column(name, values)
            }
            ColumnKind::IsoDateTime => {
                if let Some((idx, text)) = cells.iter().enumerate().find_map(|(idx, cell)| {
                    cell.as_ref()
                        .filter(|text| !is_iso8601(text))
                        .map(|text| (idx, text))
                }) {
                    return Err(invalid_value(path, name, idx, text));
                }
                text_column(name, cells)
            }
        };
        columns.push(column);
    }

    DataFrame::new(columns).map_err(|e| IngestError::DataFrame {
        message: e.to_string(),
    })
}

fn invalid_value(path: &Path, column: &str, idx: usize, value: &str) -> IngestError {
    IngestError::InvalidValue {
        column: column.to_string(),
        value: value.to_string(),
        row: idx + 2,
        path: path.to_path_buf(),
    }
}
