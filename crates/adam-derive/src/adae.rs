//! Adverse event analysis dataset (ADAE).

use std::collections::BTreeMap;

use adam_ingest::{SdtmDomain, SourceTables, pivot_supplemental, qualifier_key};
use adam_model::{
    AnalysisSpec, AnalysisTable, DataQualityIssue, DerivationError, IssueSeverity, Record, Result,
    Value,
};
use tracing::{debug, info};

use crate::datetime::{DatePart, Imputation, ImputationRule, impute_datetime, study_day};
use crate::flags::flag_first;
use crate::frame::{DerivationOutput, finalize};
use crate::params::DerivationParams;
use crate::reader::{TableReader, copy_subject_context, subject_records};

pub const DATASET: &str = "ADAE";

/// Source domains read by [`derive_adae`]; SUPPAE may be absent.
pub const INPUTS: [SdtmDomain; 2] = [SdtmDomain::Ae, SdtmDomain::SuppAe];

/// First occurrence within the customized event category.
pub const CATEGORY_FLAG: &str = "AOCC01FL";
pub const CATEGORY_GROUP: [&str; 2] = ["USUBJID", "CQ01NAM"];

const START_RULE: ImputationRule =
    ImputationRule::new(DatePart::Day, Imputation::First, Imputation::First);
const END_RULE: ImputationRule =
    ImputationRule::new(DatePart::Hour, Imputation::Last, Imputation::Last);

/// ADSL variables carried onto every event, renamed where needed.
const SUBJECT_CONTEXT: [(&str, &str); 13] = [
    ("SITEID", "SITEID"),
    ("TRT01A", "TRTA"),
    ("TRT01AN", "TRTAN"),
    ("AGE", "AGE"),
    ("AGEGR1", "AGEGR1"),
    ("AGEGR1N", "AGEGR1N"),
    ("RACE", "RACE"),
    ("RACEN", "RACEN"),
    ("SEX", "SEX"),
    ("SAFFL", "SAFFL"),
    ("TRTSDT", "TRTSDT"),
    ("TRTEDT", "TRTEDT"),
    ("RFENDT", "RFENDT"),
];

/// First-occurrence flags: name, grouping, serious events only.
pub const OCCURRENCE_FLAGS: [(&str, &[&str], bool); 6] = [
    ("AOCCFL", &["USUBJID"], false),
    ("AOCCSFL", &["USUBJID", "AEBODSYS"], false),
    ("AOCCPFL", &["USUBJID", "AEBODSYS", "AEDECOD"], false),
    ("AOCC02FL", &["USUBJID"], true),
    ("AOCC03FL", &["USUBJID", "AEBODSYS"], true),
    ("AOCC04FL", &["USUBJID", "AEBODSYS", "AEDECOD"], true),
];

/// Ranking of events within a first-occurrence group.
pub const EVENT_ORDER: [&str; 2] = ["ASTDT", "AESEQ"];

/// Builds ADAE from AE, SUPPAE and ADSL.
pub fn derive_adae(
    sources: &SourceTables,
    adsl: &AnalysisTable,
    spec: &AnalysisSpec,
    params: &DerivationParams,
) -> Result<DerivationOutput> {
    let dataset_spec = spec.dataset(DATASET)?;
    let ae = TableReader::source(DATASET, sources, SdtmDomain::Ae)?;

    let subjects = subject_records(adsl)?;

    let qualifiers = match sources.get(SdtmDomain::SuppAe) {
        Some(supp) => pivot_supplemental(supp, SdtmDomain::SuppAe).map_err(|error| {
            DerivationError::Cardinality {
                dataset: DATASET.to_string(),
                rule: "one qualifier value per event".to_string(),
                keys: vec![error.to_string()],
            }
        })?,
        None => {
            debug!("no SUPPAE qualifiers");
            BTreeMap::new()
        }
    };

    let text_columns = [
        "STUDYID", "USUBJID", "AETERM", "AEDECOD", "AEBODSYS", "AESTDTC", "AEENDTC",
    ];
    let optional_columns = ["AELLT", "AESEV", "AESER", "AEREL", "AEOUT"];
    let mut columns: BTreeMap<&str, Vec<Option<String>>> = BTreeMap::new();
    for name in text_columns {
        columns.insert(name, ae.text(name)?);
    }
    for name in optional_columns {
        columns.insert(name, ae.optional_text(name));
    }
    let aeseq = ae.num("AESEQ")?;

    let mut unmatched = Vec::new();
    let mut records = Vec::with_capacity(ae.height());
    for idx in 0..ae.height() {
        let mut record = Record::new();
        for (name, values) in &columns {
            record.insert((*name).to_string(), Value::from(values[idx].clone()));
        }
        record.insert("AESEQ".to_string(), Value::from(aeseq[idx]));

        let subject = columns["USUBJID"][idx].clone().unwrap_or_default();
        match subjects.get(&subject) {
            Some(context) => copy_subject_context(&mut record, context, &SUBJECT_CONTEXT),
            None => unmatched.push(subject.clone()),
        }

        if let Some(seq) = aeseq[idx] {
            let key = (subject, qualifier_key(&seq.to_string()));
            for (name, value) in qualifiers.get(&key).into_iter().flatten() {
                record.insert(name.clone(), Value::from(value.as_str()));
            }
        }

        derive_timing(&mut record);
        record.insert(
            "CQ01NAM".to_string(),
            Value::from(event_category(&record, params)),
        );
        records.push(record);
    }

    let is_emergent = |record: &Record| record.get("TRTEMFL").is_some_and(Value::is_yes);
    for (flag, group_by, serious_only) in OCCURRENCE_FLAGS {
        flag_first(&mut records, flag, group_by, &EVENT_ORDER, |record| {
            is_emergent(record)
                && (!serious_only || record.get("AESER").is_some_and(Value::is_yes))
        });
    }
    flag_first(
        &mut records,
        CATEGORY_FLAG,
        &CATEGORY_GROUP,
        &EVENT_ORDER,
        |record| is_emergent(record) && record.get("CQ01NAM").is_some_and(|v| !v.is_missing()),
    );

    let mut issues = Vec::new();
    if !unmatched.is_empty() {
        unmatched.sort();
        unmatched.dedup();
        issues.push(
            DataQualityIssue::new(
                DATASET,
                "subject-not-in-adsl",
                IssueSeverity::Warning,
                format!(
                    "{} subject(s) with adverse events have no ADSL record",
                    unmatched.len()
                ),
            )
            .with_keys(unmatched),
        );
    }

    let table = finalize(dataset_spec, records)?;
    info!(dataset = DATASET, records = table.record_count(), "derived");
    Ok(DerivationOutput { table, issues })
}

/// Analysis start/end timing, study days, duration and the
/// treatment-emergent flag.
fn derive_timing(record: &mut Record) {
    let text = |name: &str| record.get(name).and_then(Value::as_str).map(str::to_string);
    let trtsdt = record.get("TRTSDT").and_then(Value::as_date);
    let rfendt = record.get("RFENDT").and_then(Value::as_date);

    let start = text("AESTDTC").and_then(|value| impute_datetime(&value, START_RULE, &[trtsdt], &[]));
    let end = text("AEENDTC").and_then(|value| impute_datetime(&value, END_RULE, &[], &[rfendt]));
    let astdt = start.map(|imputed| imputed.datetime.date());
    let aendt = end.map(|imputed| imputed.datetime.date());
    let duration = match (astdt, aendt) {
        (Some(first), Some(last)) => Some((last - first).num_days() as f64 + 1.0),
        _ => None,
    };
    let emergent = match (astdt, trtsdt) {
        (Some(date), Some(reference)) => Value::yes_or_missing(date >= reference),
        _ => Value::Missing,
    };

    let mut set = |name: &str, value: Value| {
        record.insert(name.to_string(), value);
    };
    set("ASTDTM", Value::opt_datetime(start.map(|imputed| imputed.datetime)));
    set("ASTDT", Value::from(astdt));
    set("ASTDTF", Value::opt_text(start.and_then(|imputed| imputed.date_flag)));
    set("ASTTMF", Value::opt_text(start.and_then(|imputed| imputed.time_flag)));
    set("AENDTM", Value::opt_datetime(end.map(|imputed| imputed.datetime)));
    set("AENDT", Value::from(aendt));
    set("AENTMF", Value::opt_text(end.and_then(|imputed| imputed.time_flag)));
    set(
        "ASTDY",
        Value::from(astdt.zip(trtsdt).map(|(date, reference)| study_day(date, reference) as f64)),
    );
    set(
        "AENDY",
        Value::from(aendt.zip(trtsdt).map(|(date, reference)| study_day(date, reference) as f64)),
    );
    set("ADURN", Value::from(duration));
    set("ADURU", Value::from(duration.map(|_| "DAY".to_string())));
    set("TRTEMFL", emergent);
}

/// Customized event category from keyword and body-system matches.
fn event_category(record: &Record, params: &DerivationParams) -> Option<String> {
    let text = |name: &str| {
        record
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_uppercase)
            .unwrap_or_default()
    };
    let decod = text("AEDECOD");
    let term = text("AETERM");
    let body_system = text("AEBODSYS");

    let keyword = params.category_keywords.iter().any(|keyword| {
        let keyword = keyword.to_uppercase();
        decod.contains(&keyword) || term.contains(&keyword)
    });
    let skin = body_system == params.category_body_system.to_uppercase()
        && !params
            .category_exclusions
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(&decod));
    (keyword || skin).then(|| params.event_category.clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(decod: &str, body_system: &str) -> Record {
        let mut record = Record::new();
        record.insert("AEDECOD".to_string(), Value::from(decod));
        record.insert("AETERM".to_string(), Value::from(decod));
        record.insert("AEBODSYS".to_string(), Value::from(body_system));
        record
    }

    #[test]
    fn category_matches_keywords_and_skin_disorders() {
        let params = DerivationParams::default();
        let category = |decod, soc| event_category(&event(decod, soc), &params);
        assert_eq!(
            category("APPLICATION SITE PRURITUS", "GENERAL DISORDERS").as_deref(),
            Some("DERMATOLOGIC EVENTS")
        );
        assert!(category("RASH", "SKIN AND SUBCUTANEOUS TISSUE DISORDERS").is_some());
        assert!(category("HYPERHIDROSIS", "SKIN AND SUBCUTANEOUS TISSUE DISORDERS").is_none());
        assert!(category("HEADACHE", "NERVOUS SYSTEM DISORDERS").is_none());
    }

    #[test]
    fn timing_imputes_and_flags_emergence() {
        let mut record = event("RASH", "SKIN AND SUBCUTANEOUS TISSUE DISORDERS");
        record.insert("AESTDTC".to_string(), Value::from("2014-01"));
        record.insert("AEENDTC".to_string(), Value::from("2014-01-20"));
        record.insert(
            "TRTSDT".to_string(),
            Value::Date(chrono::NaiveDate::from_ymd_opt(2014, 1, 10).unwrap()),
        );
        derive_timing(&mut record);

        assert_eq!(record["ASTDT"].render().as_deref(), Some("2014-01-10"));
        assert_eq!(record["ASTDTF"], Value::from("D"));
        assert_eq!(record["ASTTMF"], Value::from("H"));
        assert_eq!(record["AENDTM"].render().as_deref(), Some("2014-01-20T23:59:59"));
        assert_eq!(record["ASTDY"], Value::Num(1.0));
        assert_eq!(record["ADURN"], Value::Num(11.0));
        assert_eq!(record["ADURU"], Value::from("DAY"));
        assert!(record["TRTEMFL"].is_yes());
    }

    #[test]
    fn undated_events_are_not_emergent() {
        let mut record = event("RASH", "SKIN AND SUBCUTANEOUS TISSUE DISORDERS");
        record.insert("AESTDTC".to_string(), Value::from("2014"));
        derive_timing(&mut record);
        assert!(record["ASTDT"].is_missing());
        assert!(record["TRTEMFL"].is_missing());
    }
}
