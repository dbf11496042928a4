//! Time-to-event analysis dataset (ADTTE).
//!
//! One record per safety subject and endpoint. The event is the first
//! treatment-emergent ADAE record of the endpoint's category; subjects
//! without one are censored at their completion date.

use std::collections::BTreeMap;

use adam_ingest::{SdtmDomain, SourceTables};
use adam_model::{
    AnalysisSpec, AnalysisTable, DataQualityIssue, DerivationError, IssueSeverity, Record, Result,
    Value,
};
use chrono::NaiveDate;
use tracing::{info, warn};

use crate::datetime::first_day_date;
use crate::frame::{DerivationOutput, finalize};
use crate::params::{DerivationParams, TimeToEventEndpoint};
use crate::reader::{TableReader, table_records};

pub const DATASET: &str = "ADTTE";

/// Source domains read by [`derive_adtte`].
pub const INPUTS: [SdtmDomain; 1] = [SdtmDomain::Ds];

const DEATH: &str = "DEATH";
const IGNORED_DISPOSITIONS: [&str; 2] = ["SCREEN FAILURE", "FINAL LAB VISIT"];

const SUBJECT_CONTEXT: [(&str, &str); 15] = [
    ("STUDYID", "STUDYID"),
    ("SITEID", "SITEID"),
    ("AGE", "AGE"),
    ("AGEGR1", "AGEGR1"),
    ("AGEGR1N", "AGEGR1N"),
    ("RACE", "RACE"),
    ("RACEN", "RACEN"),
    ("SEX", "SEX"),
    ("TRTSDT", "TRTSDT"),
    ("TRTEDT", "TRTEDT"),
    ("TRTDURD", "TRTDURD"),
    ("TRT01A", "TRTA"),
    ("TRT01AN", "TRTAN"),
    ("SAFFL", "SAFFL"),
    ("USUBJID", "USUBJID"),
];

/// Date that ends a subject's time at risk, with its source record.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceDate {
    pub date: NaiveDate,
    pub seq: Option<f64>,
}

/// Completion date per subject: the death date when the subject died,
/// otherwise the latest disposition date.
pub fn censor_dates(sources: &SourceTables) -> Result<BTreeMap<String, SourceDate>> {
    let ds = TableReader::source(DATASET, sources, SdtmDomain::Ds)?;
    let usubjid = ds.text("USUBJID")?;
    let decod = ds.text("DSDECOD")?;
    let term = ds.text("DSTERM")?;
    let start = ds.text("DSSTDTC")?;
    let seq = ds.num("DSSEQ")?;

    let mut deaths: BTreeMap<String, SourceDate> = BTreeMap::new();
    let mut latest: BTreeMap<String, SourceDate> = BTreeMap::new();
    for idx in 0..ds.height() {
        let (Some(subject), Some(date)) =
            (usubjid[idx].clone(), first_day_date(start[idx].as_deref()))
        else {
            continue;
        };
        let has_disposition = |name: &str| {
            [&decod[idx], &term[idx]]
                .into_iter()
                .flatten()
                .any(|text| text.eq_ignore_ascii_case(name))
        };
        if IGNORED_DISPOSITIONS.into_iter().any(has_disposition) {
            continue;
        }
        let candidate = SourceDate {
            date,
            seq: seq[idx],
        };
        if decod[idx].as_deref() == Some(DEATH) {
            deaths.entry(subject.clone()).or_insert_with(|| candidate.clone());
        }
        let replace = latest.get(&subject).is_none_or(|current| date > current.date);
        if replace {
            latest.insert(subject, candidate);
        }
    }
    latest.extend(deaths);
    Ok(latest)
}

/// Builds ADTTE from ADSL, ADAE and DS.
pub fn derive_adtte(
    sources: &SourceTables,
    adsl: &AnalysisTable,
    adae: &AnalysisTable,
    spec: &AnalysisSpec,
    params: &DerivationParams,
) -> Result<DerivationOutput> {
    let dataset_spec = spec.dataset(DATASET)?;
    let censors = censor_dates(sources)?;
    let subjects = table_records(adsl)?;
    let events = table_records(adae)?;

    let mut records = Vec::new();
    let mut unresolved = Vec::new();
    let mut negative = Vec::new();
    for endpoint in &params.endpoints {
        let first_events = first_events(&events, endpoint);
        for subject in subjects.iter().filter(|s| s.get("SAFFL").is_some_and(Value::is_yes)) {
            let Some(usubjid) = subject.get("USUBJID").and_then(Value::as_str) else {
                continue;
            };
            let mut record = Record::new();
            for (source, target) in SUBJECT_CONTEXT {
                record.insert(
                    target.to_string(),
                    subject.get(source).cloned().unwrap_or_default(),
                );
            }
            record.insert("PARAMCD".to_string(), Value::from(endpoint.paramcd.as_str()));
            record.insert("PARAM".to_string(), Value::from(endpoint.param.as_str()));

            let (adt, cnsr) = if let Some(event) = first_events.get(usubjid) {
                let description = &endpoint.event_description;
                set_source(&mut record, description, "ADAE", "ASTDT", event.seq);
                (Some(event.date), 0.0)
            } else if let Some(censor) = censors.get(usubjid) {
                let description = &endpoint.censor_description;
                set_source(&mut record, description, "DS", "DSSTDTC", censor.seq);
                (Some(censor.date), 1.0)
            } else {
                unresolved.push(format!("{usubjid}/{}", endpoint.paramcd));
                (None, 1.0)
            };

            let startdt = subject.get("TRTSDT").and_then(Value::as_date);
            let aval = adt
                .zip(startdt)
                .map(|(end, start)| (end - start).num_days() as f64);
            if aval.is_some_and(|days| days < 0.0) {
                negative.push(format!("{usubjid}/{}", endpoint.paramcd));
            }
            record.insert("STARTDT".to_string(), Value::from(startdt));
            record.insert("ADT".to_string(), Value::from(adt));
            record.insert("AVAL".to_string(), Value::from(aval));
            record.insert("CNSR".to_string(), Value::Num(cnsr));
            records.push(record);
        }
    }

    if !negative.is_empty() {
        return Err(DerivationError::InvariantViolation {
            dataset: DATASET.to_string(),
            rule: "analysis duration is non-negative".to_string(),
            keys: negative,
        });
    }

    let mut issues = Vec::new();
    if !unresolved.is_empty() {
        if params.strict_censoring {
            return Err(DerivationError::UnresolvedCensoring {
                dataset: DATASET.to_string(),
                keys: unresolved,
            });
        }
        warn!(
            dataset = DATASET,
            count = unresolved.len(),
            "subjects without event or censoring date"
        );
        issues.push(
            DataQualityIssue::new(
                DATASET,
                "unresolved-censoring",
                IssueSeverity::Warning,
                "no qualifying event and no censoring date; duration left missing",
            )
            .with_keys(unresolved),
        );
    }

    let table = finalize(dataset_spec, records)?;
    info!(dataset = DATASET, records = table.record_count(), "derived");
    Ok(DerivationOutput { table, issues })
}

fn set_source(
    record: &mut Record,
    description: &str,
    domain: &str,
    variable: &str,
    seq: Option<f64>,
) {
    record.insert("EVNTDESC".to_string(), Value::from(description));
    record.insert("SRCDOM".to_string(), Value::from(domain));
    record.insert("SRCVAR".to_string(), Value::from(variable));
    record.insert("SRCSEQ".to_string(), Value::from(seq));
}

/// Earliest flagged event of the endpoint's category per subject.
fn first_events(
    events: &[Record],
    endpoint: &TimeToEventEndpoint,
) -> BTreeMap<String, SourceDate> {
    let mut first: BTreeMap<String, SourceDate> = BTreeMap::new();
    for event in events {
        let text = |name: &str| event.get(name).and_then(Value::as_str);
        let qualifies = event.get("AOCC01FL").is_some_and(Value::is_yes)
            && event.get("SAFFL").is_some_and(Value::is_yes)
            && text("CQ01NAM")
                .is_some_and(|category| category.eq_ignore_ascii_case(&endpoint.category));
        let (Some(subject), Some(date)) =
            (text("USUBJID"), event.get("ASTDT").and_then(Value::as_date))
        else {
            continue;
        };
        if !qualifies {
            continue;
        }
        let seq = event.get("AESEQ").and_then(Value::as_f64);
        let replace = first
            .get(subject)
            .is_none_or(|current| (date, seq) < (current.date, current.seq));
        if replace {
            first.insert(subject.to_string(), SourceDate { date, seq });
        }
    }
    first
}
