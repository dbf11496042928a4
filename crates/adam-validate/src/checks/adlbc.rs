//! Basic data structure invariants for lab chemistry.

use std::collections::BTreeMap;

use adam_derive::adlbc::{DATASET, END_OF_TREATMENT_VISIT};
use adam_derive::frame::{GroupKey, group_key, key_of, render_key};
use adam_model::{DataQualityIssue, Record};

use super::{is_yes, num, violation};

const SUBJECT_PARAMETER: [&str; 2] = ["USUBJID", "PARAMCD"];

pub fn check(records: &[Record]) -> Vec<DataQualityIssue> {
    let mut issues = Vec::new();
    let end_of_treatment =
        |record: &Record| num(record, "AVISITN") == Some(END_OF_TREATMENT_VISIT);

    issues.extend(violation(
        DATASET,
        "single-baseline",
        "more than one baseline record per subject and parameter",
        repeated(records, |record| is_yes(record, "ABLFL")),
    ));

    let change_at_baseline = records
        .iter()
        .filter(|record| is_yes(record, "ABLFL") && num(record, "CHG").is_some())
        .map(|record| key_of(record, &["USUBJID", "PARAMCD", "LBSEQ"]))
        .collect();
    issues.extend(violation(
        DATASET,
        "baseline-change",
        "CHG populated on a baseline record",
        change_at_baseline,
    ));

    issues.extend(violation(
        DATASET,
        "single-end-of-treatment",
        "more than one end-of-treatment record per subject and parameter",
        repeated(records, end_of_treatment),
    ));
    issues.extend(violation(
        DATASET,
        "single-analysis-record",
        "ANL01FL set more than once per subject and parameter",
        repeated(records, |record| is_yes(record, "ANL01FL")),
    ));
    issues
}

/// Subject/parameter keys with more than one record matching `select`.
fn repeated(records: &[Record], select: impl Fn(&Record) -> bool) -> Vec<String> {
    let mut counts: BTreeMap<GroupKey, usize> = BTreeMap::new();
    for record in records.iter().filter(|record| select(record)) {
        *counts.entry(group_key(record, &SUBJECT_PARAMETER)).or_default() += 1;
    }
    counts
        .into_iter()
        .filter(|(_, count)| *count > 1)
        .map(|(key, _)| render_key(&key))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_model::Value;

    fn lab(seq: f64, visit: f64, baseline: bool, chg: Option<f64>, analysis: bool) -> Record {
        let mut record = Record::new();
        record.insert("USUBJID".to_string(), Value::from("A"));
        record.insert("PARAMCD".to_string(), Value::from("ALB"));
        record.insert("LBSEQ".to_string(), Value::Num(seq));
        record.insert("AVISITN".to_string(), Value::Num(visit));
        record.insert("ABLFL".to_string(), Value::yes_or_missing(baseline));
        record.insert("CHG".to_string(), Value::from(chg));
        record.insert("ANL01FL".to_string(), Value::yes_or_missing(analysis));
        record
    }

    #[test]
    fn well_formed_parameter_passes() {
        let records = vec![
            lab(1.0, 0.0, true, None, false),
            lab(2.0, 8.0, false, Some(1.0), true),
            lab(2.0, END_OF_TREATMENT_VISIT, false, Some(1.0), false),
        ];
        assert!(check(&records).is_empty());
    }

    #[test]
    fn baseline_change_and_duplicates_are_reported() {
        let records = vec![
            lab(1.0, 0.0, true, Some(0.0), false),
            lab(2.0, 0.0, true, None, false),
            lab(3.0, END_OF_TREATMENT_VISIT, false, None, true),
            lab(4.0, END_OF_TREATMENT_VISIT, false, None, true),
        ];
        let issues = check(&records);
        let rules: Vec<&str> = issues.iter().map(|issue| issue.rule.as_str()).collect();
        assert_eq!(
            rules,
            vec![
                "single-baseline",
                "baseline-change",
                "single-end-of-treatment",
                "single-analysis-record"
            ]
        );
        assert_eq!(issues[0].keys, vec!["A/ALB"]);
        assert_eq!(issues[1].keys, vec!["A/ALB/1"]);
    }
}
