//! Table metadata sidecars.

use adam_model::{AnalysisTable, ColumnMeta};
use serde::{Deserialize, Serialize};

/// Contents of `<NAME>.json` written next to each stored table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableMetadata {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    pub records: usize,
    /// Columns in stored order.
    pub columns: Vec<ColumnMeta>,
}

impl TableMetadata {
    pub fn for_table(table: &AnalysisTable) -> Self {
        Self {
            name: table.name.clone(),
            label: table.label.clone(),
            records: table.record_count(),
            columns: table.columns.clone(),
        }
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}
