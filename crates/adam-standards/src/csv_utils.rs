//! Shared CSV utilities for specification sheets.

use std::path::{Path, PathBuf};

use csv::{ReaderBuilder, StringRecord};

use crate::error::{Result, StandardsError};

/// A specification sheet read into memory.
#[derive(Debug, Clone)]
pub struct CsvSheet {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub rows: Vec<StringRecord>,
}

impl CsvSheet {
    /// Index of `name` among the headers (case-insensitive).
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers
            .iter()
            .position(|header| header.eq_ignore_ascii_case(name))
    }

    /// Index of a column that must exist.
    pub fn require(&self, name: &str) -> Result<usize> {
        self.column_index(name)
            .ok_or_else(|| StandardsError::MissingColumn {
                path: self.path.clone(),
                column: name.to_string(),
            })
    }
}

/// Reads a sheet, trimming BOM characters and whitespace from headers.
pub fn read_sheet(path: &Path) -> Result<CsvSheet> {
    if !path.is_file() {
        return Err(StandardsError::MissingFile {
            path: path.to_path_buf(),
        });
    }
    let bytes = std::fs::read(path).map_err(|e| StandardsError::io(path, e))?;
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(bytes.as_slice());
    let headers = reader
        .headers()
        .map_err(|e| csv_error(path, &e))?
        .iter()
        .map(|header| header.trim_matches('\u{feff}').trim().to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| csv_error(path, &e))?;
        if record.iter().all(|cell| cell.trim().is_empty()) {
            continue;
        }
        rows.push(record);
    }
    Ok(CsvSheet {
        path: path.to_path_buf(),
        headers,
        rows,
    })
}

/// Trimmed cell value, `None` when blank or absent.
pub fn get_string(row: &StringRecord, idx: Option<usize>) -> Option<String> {
    idx.and_then(|i| row.get(i))
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Parses an optional unsigned integer cell.
pub fn get_u32(sheet: &CsvSheet, row_number: usize, column: &str) -> Result<Option<u32>> {
    let Some(row) = sheet.rows.get(row_number) else {
        return Ok(None);
    };
    let Some(value) = get_string(row, sheet.column_index(column)) else {
        return Ok(None);
    };
    // Workbook exports often write integers as "8.0".
    let parsed = value
        .parse::<u32>()
        .ok()
        .or_else(|| {
            value
                .parse::<f64>()
                .ok()
                .filter(|v| v.fract() == 0.0 && *v >= 0.0)
                .map(|v| v as u32)
        });
    parsed.map(Some).ok_or_else(|| StandardsError::InvalidValue {
        path: sheet.path.clone(),
        row: row_number + 2,
        column: column.to_string(),
        value,
    })
}

fn csv_error(path: &Path, error: &csv::Error) -> StandardsError {
    StandardsError::Csv {
        path: path.to_path_buf(),
        message: error.to_string(),
    }
}
