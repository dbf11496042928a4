//! Subject-level invariants.

use adam_derive::adsl::DATASET;
use adam_model::numeric::inclusive_days;
use adam_model::{DataQualityIssue, Record, Value};

use super::{is_yes, num, text, violation};

/// Each population flag implies the previous one: EFFFL ⇒ SAFFL ⇒ ITTFL.
const POPULATION_CHAIN: [(&str, &str); 2] = [("EFFFL", "SAFFL"), ("SAFFL", "ITTFL")];

pub fn check(records: &[Record]) -> Vec<DataQualityIssue> {
    let subject = |record: &Record| text(record, "USUBJID").unwrap_or_default().to_string();
    let mut issues = Vec::new();

    for (flag, prerequisite) in POPULATION_CHAIN {
        let keys = records
            .iter()
            .filter(|record| is_yes(record, flag) && !is_yes(record, prerequisite))
            .map(subject)
            .collect();
        issues.extend(violation(
            DATASET,
            "population-implication",
            &format!("{flag} = Y without {prerequisite} = Y"),
            keys,
        ));
    }

    let date = |record: &Record, name: &str| record.get(name).and_then(Value::as_date);
    let mut reversed = Vec::new();
    let mut duration = Vec::new();
    for record in records {
        let expected = match (date(record, "TRTSDT"), date(record, "TRTEDT")) {
            (Some(start), Some(end)) => {
                if end < start {
                    reversed.push(subject(record));
                }
                Some(inclusive_days(start, end) as f64)
            }
            _ => None,
        };
        if num(record, "TRTDURD") != expected {
            duration.push(subject(record));
        }
    }
    issues.extend(violation(
        DATASET,
        "treatment-dates",
        "TRTEDT precedes TRTSDT",
        reversed,
    ));
    issues.extend(violation(
        DATASET,
        "treatment-duration",
        "TRTDURD differs from TRTEDT - TRTSDT + 1",
        duration,
    ));
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn subject(
        id: &str,
        flags: [&str; 3],
        start: Option<u32>,
        end: Option<u32>,
        days: Option<f64>,
    ) -> Record {
        let day = |d: u32| NaiveDate::from_ymd_opt(2014, 1, d).unwrap();
        let mut record = Record::new();
        record.insert("USUBJID".to_string(), Value::from(id));
        for (name, value) in ["ITTFL", "SAFFL", "EFFFL"].into_iter().zip(flags) {
            record.insert(name.to_string(), Value::from(value));
        }
        record.insert("TRTSDT".to_string(), Value::from(start.map(day)));
        record.insert("TRTEDT".to_string(), Value::from(end.map(day)));
        record.insert("TRTDURD".to_string(), Value::from(days));
        record
    }

    #[test]
    fn consistent_subjects_pass() {
        let records = vec![
            subject("A", ["Y", "Y", "Y"], Some(1), Some(10), Some(10.0)),
            subject("B", ["Y", "N", "N"], None, None, None),
        ];
        assert!(check(&records).is_empty());
    }

    #[test]
    fn efficacy_without_safety_is_reported() {
        let records = vec![subject("A", ["Y", "N", "Y"], Some(1), Some(2), Some(2.0))];
        let issues = check(&records);
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].rule, "population-implication");
        assert_eq!(issues[0].keys, vec!["A"]);
    }

    #[test]
    fn duration_arithmetic_is_checked() {
        let records = vec![
            subject("A", ["Y", "Y", "N"], Some(5), Some(3), Some(-1.0)),
            subject("B", ["Y", "Y", "N"], Some(1), Some(3), Some(2.0)),
        ];
        let issues = check(&records);
        let rules: Vec<&str> = issues.iter().map(|issue| issue.rule.as_str()).collect();
        assert_eq!(rules, vec!["treatment-dates", "treatment-duration"]);
        assert_eq!(issues[0].keys, vec!["A"]);
        assert_eq!(issues[1].keys, vec!["B"]);
    }
}
