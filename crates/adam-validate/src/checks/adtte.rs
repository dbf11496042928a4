//! Time-to-event invariants.

use adam_derive::adtte::DATASET;
use adam_derive::frame::key_of;
use adam_model::{DataQualityIssue, Record, Value};

use super::{num, violation};

const KEYS: [&str; 2] = ["USUBJID", "PARAMCD"];

pub fn check(records: &[Record]) -> Vec<DataQualityIssue> {
    let date = |record: &Record, name: &str| record.get(name).and_then(Value::as_date);
    let mut censor = Vec::new();
    let mut negative = Vec::new();
    let mut arithmetic = Vec::new();
    for record in records {
        let key = key_of(record, &KEYS);
        if !matches!(num(record, "CNSR"), Some(value) if value == 0.0 || value == 1.0) {
            censor.push(key.clone());
        }
        let aval = num(record, "AVAL");
        if aval.is_some_and(|days| days < 0.0) {
            negative.push(key.clone());
        }
        let expected = date(record, "ADT")
            .zip(date(record, "STARTDT"))
            .map(|(end, start)| (end - start).num_days() as f64);
        if aval != expected {
            arithmetic.push(key);
        }
    }

    let mut issues = Vec::new();
    issues.extend(violation(DATASET, "censor-value", "CNSR is not 0 or 1", censor));
    issues.extend(violation(DATASET, "non-negative-duration", "AVAL is negative", negative));
    issues.extend(violation(
        DATASET,
        "duration-arithmetic",
        "AVAL differs from ADT - STARTDT",
        arithmetic,
    ));
    issues
}
