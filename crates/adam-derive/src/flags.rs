//! Per-group record flags.

use std::collections::BTreeMap;

use adam_model::{Record, Value};

use crate::frame::{GroupKey, compare_on, group_key};

/// Sets `flag` to `"Y"` on the first eligible record of each group and to
/// missing everywhere else.
///
/// Records are ranked by `order_by`, then by their position.
pub fn flag_first(
    records: &mut [Record],
    flag: &str,
    group_by: &[&str],
    order_by: &[&str],
    eligible: impl Fn(&Record) -> bool,
) {
    let mut winners: BTreeMap<GroupKey, usize> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        if !eligible(record) {
            continue;
        }
        let group = group_key(record, group_by);
        match winners.get(&group) {
            Some(&best) if compare_on(&records[best], record, order_by).is_le() => {}
            _ => {
                winners.insert(group, idx);
            }
        }
    }
    apply(records, flag, winners.into_values());
}

/// Sets `flag` to `"Y"` on the eligible record with the highest score in each
/// group; ties go to the record first in `tie_order`.
pub fn flag_highest(
    records: &mut [Record],
    flag: &str,
    group_by: &[&str],
    tie_order: &[&str],
    score: impl Fn(&Record) -> Option<f64>,
) {
    let mut winners: BTreeMap<GroupKey, (usize, f64)> = BTreeMap::new();
    for (idx, record) in records.iter().enumerate() {
        let Some(value) = score(record) else {
            continue;
        };
        let group = group_key(record, group_by);
        let replace = match winners.get(&group) {
            None => true,
            Some(&(best, best_score)) => {
                value > best_score
                    || (value == best_score
                        && compare_on(record, &records[best], tie_order).is_lt())
            }
        };
        if replace {
            winners.insert(group, (idx, value));
        }
    }
    apply(records, flag, winners.into_values().map(|(idx, _)| idx));
}

fn apply(records: &mut [Record], flag: &str, winners: impl Iterator<Item = usize>) {
    for record in records.iter_mut() {
        record.insert(flag.to_string(), Value::Missing);
    }
    for idx in winners {
        records[idx].insert(flag.to_string(), Value::yes_or_missing(true));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn event(usubjid: &str, day: u32, seq: f64, emergent: bool) -> Record {
        let mut record = Record::new();
        record.insert("USUBJID".to_string(), Value::from(usubjid));
        record.insert(
            "ASTDT".to_string(),
            Value::Date(NaiveDate::from_ymd_opt(2014, 1, day).unwrap()),
        );
        record.insert("AESEQ".to_string(), Value::Num(seq));
        record.insert("TRTEMFL".to_string(), Value::yes_or_missing(emergent));
        record
    }

    #[test]
    fn first_flag_uses_date_then_sequence() {
        let mut records = vec![
            event("A", 5, 1.0, true),
            event("A", 3, 3.0, true),
            event("A", 3, 2.0, true),
            event("A", 1, 4.0, false),
            event("B", 9, 1.0, true),
        ];
        flag_first(&mut records, "AOCCFL", &["USUBJID"], &["ASTDT", "AESEQ"], |r| {
            r.get("TRTEMFL").is_some_and(Value::is_yes)
        });
        let flagged: Vec<bool> = records.iter().map(|r| r["AOCCFL"].is_yes()).collect();
        assert_eq!(flagged, vec![false, false, true, false, true]);
    }

    #[test]
    fn highest_score_breaks_ties_by_order() {
        let mut records = vec![
            event("A", 5, 1.0, true),
            event("A", 3, 2.0, true),
            event("A", 4, 3.0, true),
        ];
        let scores = [1.0, 2.0, 2.0];
        for (record, score) in records.iter_mut().zip(scores) {
            record.insert("SCORE".to_string(), Value::Num(score));
        }
        flag_highest(&mut records, "ANL01FL", &["USUBJID"], &["ASTDT", "AESEQ"], |r| {
            r.get("SCORE").and_then(Value::as_f64)
        });
        let flagged: Vec<bool> = records.iter().map(|r| r["ANL01FL"].is_yes()).collect();
        assert_eq!(flagged, vec![false, true, false]);
    }

    #[test]
    fn groups_with_slashes_in_values_stay_distinct() {
        let mut records = vec![event("A", 1, 1.0, true), event("A", 2, 2.0, true)];
        records[0].insert("AEBODSYS".to_string(), Value::from("A/B"));
        records[0].insert("AEDECOD".to_string(), Value::from("C"));
        records[1].insert("AEBODSYS".to_string(), Value::from("A"));
        records[1].insert("AEDECOD".to_string(), Value::from("B/C"));
        flag_first(
            &mut records,
            "AOCCPFL",
            &["USUBJID", "AEBODSYS", "AEDECOD"],
            &["ASTDT", "AESEQ"],
            |_| true,
        );
        assert!(records.iter().all(|r| r["AOCCPFL"].is_yes()));
    }
}
