//! Finalized analysis tables.

use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use crate::spec::DatasetSpec;
use crate::value::ColumnType;

/// Column metadata carried alongside a finalized table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnMeta {
    pub name: String,
    pub label: Option<String>,
    pub column_type: ColumnType,
}

/// A finalized analysis dataset.
///
/// Produced once per run by its derivation stage and never mutated
/// afterwards; downstream stages receive their own copy.
#[derive(Debug, Clone)]
pub struct AnalysisTable {
    /// Dataset name (e.g. "ADSL").
    pub name: String,
    pub label: Option<String>,
    pub data: DataFrame,
    /// Column metadata in column order.
    pub columns: Vec<ColumnMeta>,
}

impl AnalysisTable {
    /// Wraps a frame whose columns follow `spec`.
    pub fn from_spec(spec: &DatasetSpec, data: DataFrame) -> Self {
        let columns = spec
            .ordered_variables()
            .into_iter()
            .map(|variable| ColumnMeta {
                name: variable.name.clone(),
                label: variable.label.clone(),
                column_type: variable.column_type,
            })
            .collect();
        Self {
            name: spec.name.clone(),
            label: spec.label.clone(),
            data,
            columns,
        }
    }

    pub fn record_count(&self) -> usize {
        self.data.height()
    }

    pub fn column_names(&self) -> Vec<String> {
        self.data
            .get_column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect()
    }

    pub fn label_for(&self, column: &str) -> Option<&str> {
        self.columns
            .iter()
            .find(|meta| meta.name == column)
            .and_then(|meta| meta.label.as_deref())
    }
}
