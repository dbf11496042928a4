//! First-occurrence flag invariants.

use std::collections::BTreeMap;

use adam_derive::adae::{CATEGORY_FLAG, CATEGORY_GROUP, DATASET, EVENT_ORDER, OCCURRENCE_FLAGS};
use adam_derive::frame::{GroupKey, compare_on, group_key, key_of, render_key};
use adam_model::{DataQualityIssue, Record};

use super::{is_yes, text, violation};

pub fn check(records: &[Record]) -> Vec<DataQualityIssue> {
    let emergent = |record: &Record| is_yes(record, "TRTEMFL");
    let mut issues = Vec::new();
    for (flag, group_by, serious_only) in OCCURRENCE_FLAGS {
        issues.extend(check_flag(records, flag, group_by, |record| {
            emergent(record) && (!serious_only || is_yes(record, "AESER"))
        }));
    }
    issues.extend(check_flag(records, CATEGORY_FLAG, &CATEGORY_GROUP, |record| {
        emergent(record) && text(record, "CQ01NAM").is_some()
    }));
    issues
}

/// The flag marks exactly the earliest eligible record of each group.
fn check_flag(
    records: &[Record],
    flag: &str,
    group_by: &[&str],
    eligible: impl Fn(&Record) -> bool,
) -> Vec<DataQualityIssue> {
    let event_key = |record: &Record| key_of(record, &["USUBJID", "AESEQ"]);
    let mut groups: BTreeMap<GroupKey, (Vec<&Record>, Vec<&Record>)> = BTreeMap::new();
    let mut ineligible = Vec::new();
    for record in records {
        let flagged = is_yes(record, flag);
        if !eligible(record) {
            if flagged {
                ineligible.push(event_key(record));
            }
            continue;
        }
        let (candidates, winners) = groups.entry(group_key(record, group_by)).or_default();
        candidates.push(record);
        if flagged {
            winners.push(record);
        }
    }

    let mut repeated = Vec::new();
    let mut not_first = Vec::new();
    for (group, (candidates, winners)) in &groups {
        match winners.as_slice() {
            [] => not_first.push(render_key(group)),
            [winner] => {
                let earlier = candidates
                    .iter()
                    .any(|candidate| compare_on(candidate, winner, &EVENT_ORDER).is_lt());
                if earlier {
                    not_first.push(render_key(group));
                }
            }
            _ => repeated.push(render_key(group)),
        }
    }

    let mut issues = Vec::new();
    issues.extend(violation(
        DATASET,
        "first-occurrence-eligibility",
        &format!("{flag} set on a record outside its population"),
        ineligible,
    ));
    issues.extend(violation(
        DATASET,
        "first-occurrence-unique",
        &format!("{flag} set more than once in a group"),
        repeated,
    ));
    issues.extend(violation(
        DATASET,
        "first-occurrence-minimal",
        &format!("{flag} not on the earliest eligible record of its group"),
        not_first,
    ));
    issues
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_model::Value;
    use chrono::NaiveDate;

    fn event(seq: f64, day: u32, flag: bool) -> Record {
        let mut record = Record::new();
        record.insert("USUBJID".to_string(), Value::from("A"));
        record.insert("AESEQ".to_string(), Value::Num(seq));
        record.insert(
            "ASTDT".to_string(),
            Value::Date(NaiveDate::from_ymd_opt(2014, 1, day).unwrap()),
        );
        record.insert("TRTEMFL".to_string(), Value::from("Y"));
        record.insert("AOCCFL".to_string(), Value::yes_or_missing(flag));
        record
    }

    fn rules(issues: &[DataQualityIssue]) -> Vec<&str> {
        issues.iter().map(|issue| issue.rule.as_str()).collect()
    }

    #[test]
    fn earliest_flagged_event_passes() {
        let records = vec![event(1.0, 5, false), event(2.0, 3, true)];
        let issues = check_flag(&records, "AOCCFL", &["USUBJID"], |_| true);
        assert!(issues.is_empty());
    }

    #[test]
    fn later_event_flagged_is_not_minimal() {
        let records = vec![event(1.0, 5, true), event(2.0, 3, false)];
        let issues = check_flag(&records, "AOCCFL", &["USUBJID"], |_| true);
        assert_eq!(rules(&issues), vec!["first-occurrence-minimal"]);
        assert_eq!(issues[0].keys, vec!["A"]);
    }

    #[test]
    fn two_flags_in_a_group_are_reported() {
        let records = vec![event(1.0, 3, true), event(2.0, 4, true)];
        let issues = check_flag(&records, "AOCCFL", &["USUBJID"], |_| true);
        assert_eq!(rules(&issues), vec!["first-occurrence-unique"]);
    }

    #[test]
    fn flag_outside_population_is_reported() {
        let mut record = event(1.0, 3, true);
        record.insert("TRTEMFL".to_string(), Value::Missing);
        let issues = check(&[record]);
        assert_eq!(rules(&issues), vec!["first-occurrence-eligibility"]);
        assert_eq!(issues[0].keys, vec!["A/1"]);
    }
}
