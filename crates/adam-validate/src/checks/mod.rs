//! Validation check modules.
//!
//! Each module checks one dataset family and returns the issues it found.

mod adae;
mod adlbc;
mod adsl;
mod adtte;
mod structure;

use adam_derive::reader::table_records;
use adam_derive::{
    adae as adae_stage, adlbc as adlbc_stage, adsl as adsl_stage, adtte as adtte_stage,
};
use adam_model::{
    AnalysisTable, DataQualityIssue, DatasetSpec, IssueSeverity, Record, Result, StageReport,
    Value,
};
use tracing::debug;

/// Runs all checks that apply to `table`.
///
/// Row-level checks are skipped when the columns do not match `spec`.
pub fn validate_table(spec: &DatasetSpec, table: &AnalysisTable) -> Result<StageReport> {
    let mut report = StageReport::new(&table.name);

    // 1. Column set, order and storage types
    report.extend(structure::check_columns(spec, table));
    if report.has_errors() {
        return Ok(report);
    }

    let records = table_records(table)?;

    // 2. Key uniqueness
    report.extend(structure::check_keys(spec, &records));

    // 3. Dataset invariants
    let dataset = table.name.as_str();
    let issues = match dataset {
        adsl_stage::DATASET => adsl::check(&records),
        adae_stage::DATASET => adae::check(&records),
        adlbc_stage::DATASET => adlbc::check(&records),
        adtte_stage::DATASET => adtte::check(&records),
        _ => Vec::new(),
    };
    report.extend(issues);

    debug!(
        dataset,
        errors = report.error_count(),
        warnings = report.warning_count(),
        "table validated"
    );
    Ok(report)
}

/// An error issue listing `keys`, or nothing when no row is affected.
fn violation(
    dataset: &str,
    rule: &str,
    message: &str,
    mut keys: Vec<String>,
) -> Option<DataQualityIssue> {
    if keys.is_empty() {
        return None;
    }
    keys.sort();
    keys.dedup();
    Some(
        DataQualityIssue::new(dataset, rule, IssueSeverity::Error, message).with_keys(keys),
    )
}

fn text<'a>(record: &'a Record, name: &str) -> Option<&'a str> {
    record.get(name).and_then(Value::as_str)
}

fn num(record: &Record, name: &str) -> Option<f64> {
    record.get(name).and_then(Value::as_f64)
}

fn is_yes(record: &Record, name: &str) -> bool {
    record.get(name).is_some_and(Value::is_yes)
}
