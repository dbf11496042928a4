//! Finalization of derived records into specification-shaped tables.

use std::cmp::Ordering;

use adam_model::polars::values_column;
use adam_model::{
    AnalysisTable, DataQualityIssue, DatasetSpec, DerivationError, Record, Result, Value,
};
use polars::prelude::*;

/// A finalized table plus the data-quality issues raised while deriving it.
#[derive(Debug, Clone)]
pub struct DerivationOutput {
    pub table: AnalysisTable,
    pub issues: Vec<DataQualityIssue>,
}

/// Compares two records on `keys`, in order.
pub fn compare_on(a: &Record, b: &Record, keys: &[&str]) -> Ordering {
    keys.iter()
        .map(|key| {
            let left = a.get(*key).unwrap_or(&Value::Missing);
            let right = b.get(*key).unwrap_or(&Value::Missing);
            left.sort_cmp(right)
        })
        .find(|ordering| ordering.is_ne())
        .unwrap_or(Ordering::Equal)
}

/// Grouping key: the rendered value of each key variable, `None` when missing.
pub type GroupKey = Vec<Option<String>>;

pub fn group_key(record: &Record, keys: &[&str]) -> GroupKey {
    keys.iter()
        .map(|key| record.get(*key).and_then(Value::render))
        .collect()
}

/// Identifying key text such as `01-701-1015/ALB`, for messages.
pub fn key_of(record: &Record, keys: &[&str]) -> String {
    render_key(&group_key(record, keys))
}

pub fn render_key(key: &GroupKey) -> String {
    key.iter()
        .map(|part| part.as_deref().unwrap_or_default())
        .collect::<Vec<_>>()
        .join("/")
}

/// Restricts records to the declared variables, in declared order, sorted by
/// the declared key variables.
pub fn finalize(spec: &DatasetSpec, mut records: Vec<Record>) -> Result<AnalysisTable> {
    let keys: Vec<&str> = spec.key_variables.iter().map(String::as_str).collect();
    records.sort_by(|a, b| compare_on(a, b, &keys));

    let columns: Vec<Column> = spec
        .ordered_variables()
        .into_iter()
        .map(|variable| {
            let values: Vec<Value> = records
                .iter()
                .map(|record| record.get(&variable.name).cloned().unwrap_or_default())
                .collect();
            values_column(&variable.name, variable.column_type, &values)
        })
        .collect();

    let data = DataFrame::new(columns).map_err(|e| DerivationError::frame(&spec.name, e))?;
    Ok(AnalysisTable::from_spec(spec, data))
}
