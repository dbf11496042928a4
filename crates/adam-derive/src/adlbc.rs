//! Laboratory chemistry analysis dataset (ADLBC).

use std::collections::BTreeMap;
use std::sync::LazyLock;

use adam_ingest::{SdtmDomain, SourceTables, pivot_supplemental, qualifier_key};
use adam_model::{
    AnalysisSpec, AnalysisTable, DerivationError, Record, Result, Value, round_half_up,
};
use regex::Regex;
use tracing::{debug, info};

use crate::datetime::{first_day_date, study_day};
use crate::flags::flag_highest;
use crate::frame::{DerivationOutput, GroupKey, compare_on, finalize, group_key, key_of};
use crate::params::DerivationParams;
use crate::reader::{TableReader, copy_subject_context, filter_rows, subject_records};

pub const DATASET: &str = "ADLBC";

/// Source domains read by [`derive_adlbc`]; SUPPLB may be absent.
pub const INPUTS: [SdtmDomain; 2] = [SdtmDomain::Lb, SdtmDomain::SuppLb];

/// Visit number of the synthesized end-of-treatment visit.
pub const END_OF_TREATMENT_VISIT: f64 = 99.0;
pub const END_OF_TREATMENT: &str = "End of Treatment";

static WEEK_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bWEEK\s*(\d+)\b").expect("Invalid week regex"));

const SUBJECT_CONTEXT: [(&str, &str); 17] = [
    ("SUBJID", "SUBJID"),
    ("TRT01P", "TRTP"),
    ("TRT01PN", "TRTPN"),
    ("TRT01A", "TRTA"),
    ("TRT01AN", "TRTAN"),
    ("TRTSDT", "TRTSDT"),
    ("TRTEDT", "TRTEDT"),
    ("AGE", "AGE"),
    ("AGEGR1", "AGEGR1"),
    ("AGEGR1N", "AGEGR1N"),
    ("RACE", "RACE"),
    ("RACEN", "RACEN"),
    ("SEX", "SEX"),
    ("COMP24FL", "COMP24FL"),
    ("DSRAEFL", "DSRAEFL"),
    ("SAFFL", "SAFFL"),
    ("VISNUMEN", "VISNUMEN"),
];

const SUBJECT_PARAMETER: [&str; 2] = ["USUBJID", "PARAMCD"];

/// Canonical analysis visit of a source visit label.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisVisit {
    Baseline,
    Week(f64),
    Unscheduled,
    Screening,
}

impl AnalysisVisit {
    /// Maps a source visit; `None` drops the record.
    pub fn classify(label: &str, baseline: bool) -> Option<Self> {
        if baseline {
            return Some(AnalysisVisit::Baseline);
        }
        let upper = label.to_uppercase();
        if upper.contains("UNSCHEDULED") {
            Some(AnalysisVisit::Unscheduled)
        } else if let Some(captures) = WEEK_REGEX.captures(&upper) {
            captures[1].parse::<f64>().ok().map(AnalysisVisit::Week)
        } else if upper.contains("SCREENING") {
            Some(AnalysisVisit::Screening)
        } else {
            None
        }
    }

    pub fn label(&self) -> String {
        match self {
            AnalysisVisit::Baseline => "Baseline".to_string(),
            AnalysisVisit::Week(week) => format!("Week {week}"),
            AnalysisVisit::Unscheduled => "Unscheduled".to_string(),
            AnalysisVisit::Screening => "Screening".to_string(),
        }
    }

    pub fn number(&self) -> Option<f64> {
        match self {
            AnalysisVisit::Baseline => Some(0.0),
            AnalysisVisit::Week(week) => Some(*week),
            AnalysisVisit::Unscheduled | AnalysisVisit::Screening => None,
        }
    }
}

/// Reference-range indicator: `L` below the low factor times the lower
/// limit, `H` above the high factor times the upper limit, else `N`.
pub fn range_indicator(
    value: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
    params: &DerivationParams,
) -> &'static str {
    let Some(value) = value else {
        return "N";
    };
    if low.is_some_and(|low| value < params.low_limit_factor * low) {
        "L"
    } else if high.is_some_and(|high| value > params.high_limit_factor * high) {
        "H"
    } else {
        "N"
    }
}

/// Distance outside the scaled normal range; positive when out of range.
pub fn range_distance(
    value: Option<f64>,
    low: Option<f64>,
    high: Option<f64>,
    params: &DerivationParams,
) -> Option<f64> {
    let value = value?;
    let below = low.map(|low| params.low_limit_factor * low - value);
    let above = high.map(|high| value - params.high_limit_factor * high);
    match (below, above) {
        (Some(below), Some(above)) => Some(below.max(above)),
        (below, above) => below.or(above),
    }
}

/// Builds ADLBC from LB, SUPPLB and ADSL.
pub fn derive_adlbc(
    sources: &SourceTables,
    adsl: &AnalysisTable,
    spec: &AnalysisSpec,
    params: &DerivationParams,
) -> Result<DerivationOutput> {
    let dataset_spec = spec.dataset(DATASET)?;
    let parameters = spec.variable_codelist(DATASET, "PARAMN")?;
    let source = TableReader::source(DATASET, sources, SdtmDomain::Lb)?;
    let in_category: Vec<bool> = source
        .text("LBCAT")?
        .iter()
        .map(|value| {
            value
                .as_deref()
                .is_some_and(|value| value.eq_ignore_ascii_case(&params.lab_category))
        })
        .collect();
    let lab = filter_rows(DATASET, source.data(), &in_category)?;
    let lb = TableReader::new(DATASET, SdtmDomain::Lb.code(), &lab);
    debug!(
        category = %params.lab_category,
        kept = lb.height(),
        read = source.height(),
        "lab records selected"
    );

    let subjects = subject_records(adsl)?;

    let qualifiers = match sources.get(SdtmDomain::SuppLb) {
        Some(supp) => pivot_supplemental(supp, SdtmDomain::SuppLb).map_err(|error| {
            DerivationError::Cardinality {
                dataset: DATASET.to_string(),
                rule: "one qualifier value per lab record".to_string(),
                keys: vec![error.to_string()],
            }
        })?,
        None => {
            debug!("no SUPPLB qualifiers");
            BTreeMap::new()
        }
    };

    let studyid = lb.text("STUDYID")?;
    let usubjid = lb.text("USUBJID")?;
    let lbseq = lb.num("LBSEQ")?;
    let testcd = lb.text("LBTESTCD")?;
    let test = lb.text("LBTEST")?;
    let category = lb.text("LBCAT")?;
    let result = lb.num("LBSTRESN")?;
    let result_text = lb.optional_text("LBSTRESC");
    let unit = lb.optional_text("LBSTRESU");
    let low = lb.num("LBSTNRLO")?;
    let high = lb.num("LBSTNRHI")?;
    let baseline_flag = lb.optional_text("LBBLFL");
    let nrind = lb.optional_text("LBNRIND");
    let visit = lb.text("VISIT")?;
    let visitnum = lb.num("VISITNUM")?;
    let lbdtc = lb.text("LBDTC")?;

    let mut records = Vec::new();
    for idx in 0..lb.height() {
        let Some(subject) = usubjid[idx].clone() else {
            continue;
        };
        let is_baseline = baseline_flag[idx].as_deref() == Some("Y");
        let Some(analysis_visit) =
            AnalysisVisit::classify(visit[idx].as_deref().unwrap_or_default(), is_baseline)
        else {
            continue;
        };

        let mut record = Record::new();
        if let Some(context) = subjects.get(&subject) {
            copy_subject_context(&mut record, context, &SUBJECT_CONTEXT);
        }
        if let Some(seq) = lbseq[idx] {
            let key = (subject.clone(), qualifier_key(&seq.to_string()));
            for (name, value) in qualifiers.get(&key).into_iter().flatten() {
                record.insert(name.clone(), Value::from(value.as_str()));
            }
        }

        let paramcd = testcd[idx].clone();
        let paramn = match paramcd.as_deref() {
            Some(code) => Some(parameters.numeric_code_for(code).ok_or_else(|| {
                DerivationError::TerminologyMismatch {
                    dataset: DATASET.to_string(),
                    variable: "PARAMN".to_string(),
                    codelist: parameters.id.clone(),
                    value: code.to_string(),
                    key: subject.clone(),
                }
            })?),
            None => None,
        };
        let param = match (&test[idx], &unit[idx]) {
            (Some(test), Some(unit)) => Some(format!("{test} ({unit})")),
            (test, _) => test.clone(),
        };

        let aval = result[idx];
        let avalc = aval.and_then(|value| {
            result_text[idx]
                .clone()
                .or_else(|| Value::Num(value).render())
        });
        let adt = first_day_date(lbdtc[idx].as_deref());
        let trtsdt = record.get("TRTSDT").and_then(Value::as_date);

        let mut set = |name: &str, value: Value| {
            record.insert(name.to_string(), value);
        };
        set("STUDYID", Value::from(studyid[idx].clone()));
        set("USUBJID", Value::from(subject.clone()));
        set("LBSEQ", Value::from(lbseq[idx]));
        set("PARAMCD", Value::from(paramcd));
        set("PARAM", Value::from(param));
        set("PARAMN", Value::from(paramn));
        set("PARCAT1", Value::from(category[idx].clone()));
        set("VISIT", Value::from(visit[idx].clone()));
        set("VISITNUM", Value::from(visitnum[idx]));
        set("AVISIT", Value::from(analysis_visit.label()));
        set("AVISITN", Value::from(analysis_visit.number()));
        set("ADT", Value::from(adt));
        set(
            "ADY",
            Value::from(adt.zip(trtsdt).map(|(date, reference)| study_day(date, reference) as f64)),
        );
        set("AVAL", Value::from(aval));
        set("AVALC", Value::from(avalc));
        set("A1LO", Value::from(low[idx]));
        set("A1HI", Value::from(high[idx]));
        set("R2A1LO", Value::from(ratio(aval, low[idx])));
        set("R2A1HI", Value::from(ratio(aval, high[idx])));
        set("ANRIND", Value::from(range_indicator(aval, low[idx], high[idx], params)));
        set(
            "ALBTRVAL",
            Value::from(range_distance(aval, low[idx], high[idx], params)),
        );
        set("LBNRIND", Value::from(nrind[idx].clone()));
        set("ABLFL", Value::yes_or_missing(is_baseline));
        records.push(record);
    }

    derive_baseline(&mut records)?;
    let mut records = add_end_of_treatment(records, params);
    flag_highest(
        &mut records,
        "ANL01FL",
        &SUBJECT_PARAMETER,
        &["ADT", "LBSEQ"],
        |record| {
            let week = record.get("AVISITN").and_then(Value::as_f64)?;
            let in_window = week > params.window_lower_week && week < params.final_week;
            in_window
                .then(|| record.get("ALBTRVAL").and_then(Value::as_f64))
                .flatten()
        },
    );

    let table = finalize(dataset_spec, records)?;
    info!(dataset = DATASET, records = table.record_count(), "derived");
    Ok(DerivationOutput {
        table,
        issues: Vec::new(),
    })
}

fn ratio(value: Option<f64>, limit: Option<f64>) -> Option<f64> {
    let limit = limit.filter(|limit| *limit != 0.0)?;
    Some(value? / limit)
}

/// BASE, BNRIND, BR2A1LO/HI and CHG from the single baseline record of each
/// subject and parameter.
fn derive_baseline(records: &mut [Record]) -> Result<()> {
    let mut baselines: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut duplicates = Vec::new();
    for (idx, record) in records.iter().enumerate() {
        if !record.get("ABLFL").is_some_and(Value::is_yes) {
            continue;
        }
        if baselines
            .insert(group_key(record, &SUBJECT_PARAMETER), idx)
            .is_some()
        {
            duplicates.push(key_of(record, &SUBJECT_PARAMETER));
        }
    }
    if !duplicates.is_empty() {
        duplicates.sort();
        duplicates.dedup();
        return Err(DerivationError::Cardinality {
            dataset: DATASET.to_string(),
            rule: "one baseline record per subject and parameter".to_string(),
            keys: duplicates,
        });
    }

    let baseline_values: BTreeMap<GroupKey, (Option<f64>, Value)> = baselines
        .iter()
        .map(|(key, idx)| {
            let record = &records[*idx];
            let base = record.get("AVAL").and_then(Value::as_f64);
            let indicator = record.get("ANRIND").cloned().unwrap_or_default();
            (key.clone(), (base, indicator))
        })
        .collect();

    for record in records.iter_mut() {
        let key = group_key(record, &SUBJECT_PARAMETER);
        let (base, bnrind) = baseline_values
            .get(&key)
            .cloned()
            .unwrap_or((None, Value::Missing));
        let aval = record.get("AVAL").and_then(Value::as_f64);
        let is_baseline = record.get("ABLFL").is_some_and(Value::is_yes);
        // Drop binary representation noise from the difference.
        let change = match (aval, base, is_baseline) {
            (Some(aval), Some(base), false) => Some(round_half_up(aval - base, 8)),
            _ => None,
        };
        let low = record.get("A1LO").and_then(Value::as_f64);
        let high = record.get("A1HI").and_then(Value::as_f64);
        record.insert("BASE".to_string(), Value::from(base));
        record.insert("BNRIND".to_string(), bnrind);
        record.insert("BR2A1LO".to_string(), Value::from(ratio(base, low)));
        record.insert("BR2A1HI".to_string(), Value::from(ratio(base, high)));
        record.insert("CHG".to_string(), Value::from(change));
    }
    Ok(())
}

/// Appends one end-of-treatment record per subject and parameter.
///
/// The source is the latest scheduled record at the subject's end-of-study
/// visit or the final week; without one, the last scheduled non-missing
/// record before the final week is carried forward.
fn add_end_of_treatment(mut records: Vec<Record>, params: &DerivationParams) -> Vec<Record> {
    let mut terminal: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let mut carried: BTreeMap<GroupKey, usize> = BTreeMap::new();
    let later = |candidate: &Record, current: Option<&Record>| {
        current.is_none_or(|current| {
            compare_on(candidate, current, &["AVISITN", "LBSEQ"]).is_gt()
        })
    };

    for (idx, record) in records.iter().enumerate() {
        let num = |name: &str| record.get(name).and_then(Value::as_f64);
        let (Some(week), Some(_)) = (num("AVISITN"), num("AVAL")) else {
            continue;
        };
        if week <= 0.0 {
            continue;
        }
        let key = group_key(record, &SUBJECT_PARAMETER);
        let at_end_visit = num("VISITNUM").is_some() && num("VISITNUM") == num("VISNUMEN");
        if at_end_visit || week == params.final_week {
            if later(record, terminal.get(&key).map(|best| &records[*best])) {
                terminal.insert(key, idx);
            }
        } else if week < params.final_week
            && later(record, carried.get(&key).map(|best| &records[*best]))
        {
            carried.insert(key, idx);
        }
    }

    for (key, idx) in carried {
        terminal.entry(key).or_insert(idx);
    }
    let copies: Vec<Record> = terminal
        .into_values()
        .map(|idx| {
            let mut copy = records[idx].clone();
            copy.insert("AVISIT".to_string(), Value::from(END_OF_TREATMENT));
            copy.insert("AVISITN".to_string(), Value::Num(END_OF_TREATMENT_VISIT));
            copy.insert("ABLFL".to_string(), Value::Missing);
            copy
        })
        .collect();
    records.extend(copies);
    records
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn visits_map_to_canonical_labels() {
        assert_eq!(
            AnalysisVisit::classify("WEEK 12", false),
            Some(AnalysisVisit::Week(12.0))
        );
        assert_eq!(AnalysisVisit::classify("SCREENING 1", true), Some(AnalysisVisit::Baseline));
        assert_eq!(
            AnalysisVisit::classify("UNSCHEDULED 3.1", false),
            Some(AnalysisVisit::Unscheduled)
        );
        assert_eq!(AnalysisVisit::classify("AMBUL ECG REMOVAL", false), None);
        assert_eq!(AnalysisVisit::Week(8.0).label(), "Week 8");
        assert_eq!(AnalysisVisit::Unscheduled.number(), None);
    }

    #[test]
    fn indicator_uses_scaled_limits() {
        let params = DerivationParams::default();
        let (low, high) = (Some(10.0), Some(20.0));
        assert_eq!(range_indicator(Some(4.0), low, high, &params), "L");
        assert_eq!(range_indicator(Some(32.0), low, high, &params), "H");
        assert_eq!(range_indicator(Some(5.0), low, high, &params), "N");
        assert_eq!(range_indicator(Some(30.0), low, high, &params), "N");
        assert_eq!(range_indicator(None, low, high, &params), "N");
    }

    #[test]
    fn distance_takes_worse_side() {
        let params = DerivationParams::default();
        assert_eq!(range_distance(Some(4.0), Some(10.0), Some(20.0), &params), Some(1.0));
        assert_eq!(range_distance(Some(35.0), Some(10.0), Some(20.0), &params), Some(5.0));
        assert_eq!(range_distance(Some(35.0), None, Some(20.0), &params), Some(5.0));
        assert_eq!(range_distance(None, Some(10.0), Some(20.0), &params), None);
    }

    fn lab(subject: &str, seq: f64, week: Option<f64>, aval: f64, baseline: bool) -> Record {
        let mut record = Record::new();
        record.insert("USUBJID".to_string(), Value::from(subject));
        record.insert("PARAMCD".to_string(), Value::from("ALB"));
        record.insert("LBSEQ".to_string(), Value::Num(seq));
        record.insert("AVISITN".to_string(), Value::from(week));
        record.insert("VISITNUM".to_string(), Value::from(week.map(|w| w + 3.0)));
        record.insert("AVAL".to_string(), Value::Num(aval));
        record.insert("ABLFL".to_string(), Value::yes_or_missing(baseline));
        record
    }

    #[test]
    fn change_is_missing_at_baseline() {
        let mut records = vec![lab("A", 1.0, Some(0.0), 40.0, true), lab("A", 2.0, Some(2.0), 42.5, false)];
        derive_baseline(&mut records).unwrap();
        assert!(records[0]["CHG"].is_missing());
        assert_eq!(records[0]["BASE"], Value::Num(40.0));
        assert_eq!(records[1]["CHG"], Value::Num(2.5));
    }

    #[test]
    fn duplicate_baseline_is_a_cardinality_error() {
        let mut records = vec![lab("A", 1.0, Some(0.0), 40.0, true), lab("A", 2.0, Some(0.0), 41.0, true)];
        let error = derive_baseline(&mut records).unwrap_err();
        assert_eq!(error.kind(), "cardinality");
        assert!(error.to_string().contains("A/ALB"));
    }

    #[test]
    fn end_of_treatment_carries_last_visit_forward() {
        let params = DerivationParams::default();
        let records = vec![
            lab("A", 1.0, Some(0.0), 40.0, true),
            lab("A", 2.0, Some(2.0), 41.0, false),
            lab("A", 3.0, Some(8.0), 43.0, false),
            lab("A", 4.0, None, 50.0, false),
            lab("B", 5.0, Some(8.0), 38.0, false),
            lab("B", 6.0, Some(26.0), 39.0, false),
        ];
        let records = add_end_of_treatment(records, &params);
        let eot: Vec<&Record> = records
            .iter()
            .filter(|record| record["AVISITN"] == Value::Num(END_OF_TREATMENT_VISIT))
            .collect();
        assert_eq!(eot.len(), 2);
        assert_eq!(eot[0]["LBSEQ"], Value::Num(3.0));
        assert_eq!(eot[1]["LBSEQ"], Value::Num(6.0));
        assert_eq!(eot[0]["AVISIT"], Value::from(END_OF_TREATMENT));
    }
}
