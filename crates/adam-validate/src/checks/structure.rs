//! Column layout and key uniqueness.

use std::collections::BTreeMap;

use adam_derive::frame::{GroupKey, group_key, render_key};
use adam_model::{AnalysisTable, DataQualityIssue, DatasetSpec, IssueSeverity, Record};
use polars::prelude::DataType;

use super::violation;

/// Columns must equal the declared variables, in declared order, with
/// numeric variables stored as Float64.
pub fn check_columns(spec: &DatasetSpec, table: &AnalysisTable) -> Vec<DataQualityIssue> {
    let mut issues = Vec::new();
    let expected = spec.variable_names();
    let actual = table.column_names();

    let missing: Vec<String> = expected
        .iter()
        .filter(|name| !actual.contains(name))
        .cloned()
        .collect();
    let extra: Vec<String> = actual
        .iter()
        .filter(|name| !expected.contains(name))
        .cloned()
        .collect();
    issues.extend(violation(
        &table.name,
        "missing-variable",
        "declared variables absent from the table",
        missing,
    ));
    issues.extend(violation(
        &table.name,
        "undeclared-variable",
        "table columns not declared in the specification",
        extra,
    ));
    if issues.is_empty() && expected != actual {
        issues.push(DataQualityIssue::new(
            &table.name,
            "variable-order",
            IssueSeverity::Error,
            format!("columns are not in declared order: {}", actual.join(", ")),
        ));
    }

    let mistyped: Vec<String> = spec
        .ordered_variables()
        .into_iter()
        .filter(|variable| variable.column_type.is_numeric())
        .filter(|variable| {
            table
                .data
                .column(&variable.name)
                .is_ok_and(|column| column.dtype() != &DataType::Float64)
        })
        .map(|variable| variable.name.clone())
        .collect();
    issues.extend(violation(
        &table.name,
        "numeric-type",
        "numeric variables not stored as numbers",
        mistyped,
    ));
    issues
}

/// Key variables must identify exactly one record.
pub fn check_keys(spec: &DatasetSpec, records: &[Record]) -> Vec<DataQualityIssue> {
    let keys: Vec<&str> = spec.key_variables.iter().map(String::as_str).collect();
    if keys.is_empty() {
        return Vec::new();
    }
    let mut counts: BTreeMap<GroupKey, usize> = BTreeMap::new();
    for record in records {
        *counts.entry(group_key(record, &keys)).or_default() += 1;
    }
    let duplicates = counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| render_key(&key))
        .collect();
    violation(
        &spec.name,
        "duplicate-key",
        &format!("more than one record per {}", keys.join(", ")),
        duplicates,
    )
    .into_iter()
    .collect()
}
