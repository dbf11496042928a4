//! Subject-level analysis dataset (ADSL).
//!
//! One row per randomized or enrolled subject who did not fail screening.
//! Each concern (disposition, exposure, populations, visits, baseline
//! characteristics) is summarized per subject first and then folded into the
//! subject row.

use std::collections::{BTreeMap, BTreeSet};

use adam_ingest::{SdtmDomain, SourceTables};
use adam_model::numeric::inclusive_days;
use adam_model::{
    AnalysisSpec, DataQualityIssue, DerivationError, IssueSeverity, Record, Result, Value,
    round_half_up,
};
use chrono::NaiveDate;
use tracing::{debug, info};

use crate::datetime::first_day_date;
use crate::frame::{DerivationOutput, finalize};
use crate::params::DerivationParams;
use crate::reader::TableReader;

pub const DATASET: &str = "ADSL";

/// Source domains read by [`derive_adsl`].
pub const INPUTS: [SdtmDomain; 8] = [
    SdtmDomain::Dm,
    SdtmDomain::Ds,
    SdtmDomain::Ex,
    SdtmDomain::Qs,
    SdtmDomain::Sv,
    SdtmDomain::Vs,
    SdtmDomain::Sc,
    SdtmDomain::Mh,
];

const SCREEN_FAILURE: &str = "SCREEN FAILURE";
const DISPOSITION_EVENT: &str = "DISPOSITION EVENT";
const COMPLETED: &str = "COMPLETED";
const ADVERSE_EVENT: &str = "ADVERSE EVENT";
const MONTH_DAYS: f64 = 365.25 / 12.0;

/// End-of-study disposition of one subject.
#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
    pub eosdt: Option<NaiveDate>,
    pub decod: Option<String>,
    pub term: Option<String>,
    pub visitnum: Option<f64>,
}

impl Disposition {
    pub fn completed(&self) -> bool {
        self.decod.as_deref() == Some(COMPLETED)
    }

    /// End-of-study date present and status other than completed.
    pub fn discontinued(&self) -> bool {
        self.eosdt.is_some() && !self.completed()
    }

    fn adverse_event(&self) -> bool {
        [&self.decod, &self.term]
            .into_iter()
            .flatten()
            .any(|text| text.eq_ignore_ascii_case(ADVERSE_EVENT))
    }
}

/// Dosing totals of one subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Exposure {
    pub trtsdt: Option<NaiveDate>,
    pub trtedt: Option<NaiveDate>,
    pub cumdose: Option<f64>,
    pub treatments: BTreeSet<String>,
}

impl Exposure {
    pub fn duration(&self) -> Option<i64> {
        Some(inclusive_days(self.trtsdt?, self.trtedt?))
    }

    /// Total dose over duration, rounded half-up to one decimal.
    pub fn average_daily_dose(&self) -> Option<f64> {
        let duration = self.duration().filter(|days| *days > 0)?;
        Some(round_half_up(self.cumdose? / duration as f64, 1))
    }
}

#[derive(Debug, Clone, Default)]
struct Baseline {
    height: Option<f64>,
    weight: Option<f64>,
    education: Option<f64>,
    onset: Option<NaiveDate>,
    cognitive_total: Option<f64>,
}

/// Builds ADSL from the subject-level source domains.
pub fn derive_adsl(
    sources: &SourceTables,
    spec: &AnalysisSpec,
    params: &DerivationParams,
) -> Result<DerivationOutput> {
    let dataset_spec = spec.dataset(DATASET)?;
    let dm = TableReader::source(DATASET, sources, SdtmDomain::Dm)?;
    let screen_failures = screen_failures(sources)?;
    let dispositions = disposition_summary(sources)?;
    let exposures = exposure_summary(sources, &dispositions)?;
    let efficacy = efficacy_subjects(sources, params)?;
    let (visits, first_visits) = visit_summary(sources, params)?;
    let baselines = baseline_summary(sources, params)?;

    let trt_codes = spec.variable_codelist(DATASET, "TRT01PN")?;
    let race_codes = spec.variable_codelist(DATASET, "RACEN")?;
    let age_groups = spec.variable_codelist(DATASET, "AGEGR1")?;
    let age_group_codes = spec.variable_codelist(DATASET, "AGEGR1N")?;
    let bmi_groups = spec.variable_codelist(DATASET, "BMIBLGR1")?;
    let duration_groups = spec.variable_codelist(DATASET, "DURDSGR1")?;
    let reasons = spec.variable_codelist(DATASET, "DCSREAS")?;

    let studyid = dm.text("STUDYID")?;
    let usubjid = dm.text("USUBJID")?;
    let subjid = dm.text("SUBJID")?;
    let siteid = dm.text("SITEID")?;
    let age = dm.num("AGE")?;
    let ageu = dm.text("AGEU")?;
    let sex = dm.text("SEX")?;
    let race = dm.text("RACE")?;
    let ethnic = dm.text("ETHNIC")?;
    let arm = dm.text("ARM")?;
    let armcd = dm.text("ARMCD")?;
    let rfstdtc = dm.text("RFSTDTC")?;
    let rfendtc = dm.text("RFENDTC")?;
    let dthfl = dm.optional_text("DTHFL");

    let mut issues = Vec::new();
    let mut records = Vec::with_capacity(dm.height());
    let mut excluded = 0usize;
    for idx in 0..dm.height() {
        let Some(subject) = usubjid[idx].clone() else {
            continue;
        };
        let arm_label = arm[idx].clone();
        if screen_failures.contains(&subject)
            || arm_label
                .as_deref()
                .is_some_and(|label| label.eq_ignore_ascii_case(&params.screen_failure_arm))
        {
            excluded += 1;
            continue;
        }

        let mut record = Record::new();
        let mut set = |name: &str, value: Value| {
            record.insert(name.to_string(), value);
        };
        set("STUDYID", Value::from(studyid[idx].clone()));
        set("USUBJID", Value::from(subject.clone()));
        set("SUBJID", Value::from(subjid[idx].clone()));
        set("SITEID", Value::from(siteid[idx].clone()));
        set("ARM", Value::from(arm_label.clone()));
        set("ARMCD", Value::from(armcd[idx].clone()));

        // Actual treatment is taken to equal planned treatment.
        let trt_code = match arm_label.as_deref() {
            Some(label) => Some(trt_codes.numeric_code_for(label).ok_or_else(|| {
                DerivationError::TerminologyMismatch {
                    dataset: DATASET.to_string(),
                    variable: "TRT01PN".to_string(),
                    codelist: trt_codes.id.clone(),
                    value: label.to_string(),
                    key: subject.clone(),
                }
            })?),
            None => None,
        };
        set("TRT01P", Value::from(arm_label.clone()));
        set("TRT01PN", Value::from(trt_code));
        set("TRT01A", Value::from(arm_label.clone()));
        set("TRT01AN", Value::from(trt_code));

        let exposure = exposures.get(&subject).cloned().unwrap_or_default();
        if exposure.treatments.len() > 1 {
            issues.push(
                DataQualityIssue::new(
                    DATASET,
                    "multiple-treatments",
                    IssueSeverity::Note,
                    format!(
                        "subject received more than one treatment: {}",
                        exposure
                            .treatments
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                )
                .with_keys(vec![subject.clone()]),
            );
        }
        set("TRTSDT", Value::from(exposure.trtsdt));
        set("TRTEDT", Value::from(exposure.trtedt));
        set("TRTDURD", Value::from(exposure.duration().map(|d| d as f64)));
        set("CUMDOSE", Value::from(exposure.cumdose));
        set("AVGDD", Value::from(exposure.average_daily_dose()));

        let subject_age = age[idx];
        let age_group = subject_age.and_then(|value| age_groups.group_for(value));
        let age_group_code = age_group
            .as_deref()
            .and_then(|group| age_group_codes.numeric_code_for(group));
        set("AGE", Value::from(subject_age));
        set("AGEU", Value::from(ageu[idx].clone()));
        set("AGEGR1", Value::from(age_group));
        set("AGEGR1N", Value::from(age_group_code));

        let race_code = match race[idx].as_deref() {
            Some(value) => Some(race_codes.numeric_code_for(value).ok_or_else(|| {
                DerivationError::TerminologyMismatch {
                    dataset: DATASET.to_string(),
                    variable: "RACEN".to_string(),
                    codelist: race_codes.id.clone(),
                    value: value.to_string(),
                    key: subject.clone(),
                }
            })?),
            None => None,
        };
        set("RACE", Value::from(race[idx].clone()));
        set("RACEN", Value::from(race_code));
        set("SEX", Value::from(sex[idx].clone()));
        set("ETHNIC", Value::from(ethnic[idx].clone()));

        // Population flags, each requiring the previous one.
        let itt = armcd[idx].is_some();
        let safety = itt && exposure.trtsdt.is_some();
        let eff = safety && efficacy.contains(&subject);
        set("ITTFL", Value::yes_no(itt));
        set("SAFFL", Value::yes_no(safety));
        set("EFFFL", Value::yes_no(eff));

        let attended = visits.get(&subject);
        for milestone in &params.milestone_visits {
            let done = attended.is_some_and(|labels| labels.contains(&milestone.visit.to_uppercase()));
            set(&milestone.flag, Value::yes_no(done));
        }

        let disposition = dispositions.get(&subject);
        match disposition {
            Some(disposition) => {
                let status = if disposition.completed() {
                    COMPLETED
                } else {
                    "DISCONTINUED"
                };
                set("EOSDT", Value::from(disposition.eosdt));
                set("EOSSTT", Value::from(status));
                set("DCDECOD", Value::from(disposition.decod.clone()));
                let reason = match (&disposition.decod, disposition.completed()) {
                    (Some(decod), false) => Some(
                        reasons
                            .decode_for(decod)
                            .ok_or_else(|| DerivationError::TerminologyMismatch {
                                dataset: DATASET.to_string(),
                                variable: "DCSREAS".to_string(),
                                codelist: reasons.id.clone(),
                                value: decod.clone(),
                                key: subject.clone(),
                            })?
                            .to_string(),
                    ),
                    _ => None,
                };
                set("DCSREAS", Value::from(reason));
                set("DISCONFL", Value::yes_or_missing(disposition.discontinued()));
                set("DSRAEFL", Value::yes_or_missing(disposition.adverse_event()));
                set(
                    "VISNUMEN",
                    Value::from(disposition.visitnum.map(|visit| {
                        if visit >= params.end_of_study_cap_from {
                            params.end_of_study_visit
                        } else {
                            visit
                        }
                    })),
                );
            }
            None => {
                for name in [
                    "EOSDT", "EOSSTT", "DCDECOD", "DCSREAS", "DISCONFL", "DSRAEFL", "VISNUMEN",
                ] {
                    set(name, Value::Missing);
                }
            }
        }

        let baseline = baselines.get(&subject).cloned().unwrap_or_default();
        let bmi = match (baseline.weight, baseline.height) {
            (Some(weight), Some(height)) if height > 0.0 => {
                Some(round_half_up(weight / (height / 100.0).powi(2), 1))
            }
            _ => None,
        };
        set("HEIGHTBL", Value::from(baseline.height.map(|h| round_half_up(h, 1))));
        set("WEIGHTBL", Value::from(baseline.weight.map(|w| round_half_up(w, 1))));
        set("BMIBL", Value::from(bmi));
        set("BMIBLGR1", Value::from(bmi.and_then(|value| bmi_groups.group_for(value))));
        set("EDUCLVL", Value::from(baseline.education));
        set("MMSETOT", Value::from(baseline.cognitive_total));

        let visit1dt = first_visits.get(&subject).copied();
        let durdis = match (baseline.onset, visit1dt) {
            (Some(onset), Some(visit)) => Some(round_half_up(
                (visit - onset).num_days() as f64 / MONTH_DAYS,
                1,
            )),
            _ => None,
        };
        set("DISONSDT", Value::from(baseline.onset));
        set("VISIT1DT", Value::from(visit1dt));
        set("DURDIS", Value::from(durdis));
        set(
            "DURDSGR1",
            Value::from(durdis.and_then(|value| duration_groups.group_for(value))),
        );

        set("RFSTDTC", Value::from(rfstdtc[idx].clone()));
        set("RFENDTC", Value::from(rfendtc[idx].clone()));
        set("RFENDT", Value::from(first_day_date(rfendtc[idx].as_deref())));
        set("DTHFL", Value::from(dthfl[idx].clone()));

        records.push(record);
    }

    assign_site_groups(&mut records, params);
    debug!(excluded, "screen failures excluded");

    let table = finalize(dataset_spec, records)?;
    info!(dataset = DATASET, records = table.record_count(), "derived");
    Ok(DerivationOutput { table, issues })
}

/// Subjects with a screen-failure disposition record.
fn screen_failures(sources: &SourceTables) -> Result<BTreeSet<String>> {
    let ds = TableReader::source(DATASET, sources, SdtmDomain::Ds)?;
    let usubjid = ds.text("USUBJID")?;
    let decod = ds.text("DSDECOD")?;
    Ok(usubjid
        .into_iter()
        .zip(decod)
        .filter(|(_, decod)| decod.as_deref() == Some(SCREEN_FAILURE))
        .filter_map(|(subject, _)| subject)
        .collect())
}

/// Latest disposition event of each subject, screen failures excluded.
pub fn disposition_summary(sources: &SourceTables) -> Result<BTreeMap<String, Disposition>> {
    let ds = TableReader::source(DATASET, sources, SdtmDomain::Ds)?;
    let usubjid = ds.text("USUBJID")?;
    let category = ds.text("DSCAT")?;
    let decod = ds.text("DSDECOD")?;
    let term = ds.text("DSTERM")?;
    let start = ds.text("DSSTDTC")?;
    let seq = ds.num("DSSEQ")?;
    let visitnum = ds.optional_num("VISITNUM");

    let mut latest: BTreeMap<String, (Option<NaiveDate>, Option<f64>, Disposition)> =
        BTreeMap::new();
    for idx in 0..ds.height() {
        let Some(subject) = usubjid[idx].clone() else {
            continue;
        };
        if category[idx].as_deref() != Some(DISPOSITION_EVENT)
            || decod[idx].as_deref() == Some(SCREEN_FAILURE)
        {
            continue;
        }
        let eosdt = first_day_date(start[idx].as_deref());
        let rank = (eosdt, seq[idx]);
        let replace = latest.get(&subject).is_none_or(|(date, seq, _)| {
            (rank.0, rank.1.unwrap_or(f64::MIN)) >= (*date, seq.unwrap_or(f64::MIN))
        });
        if replace {
            latest.insert(
                subject,
                (
                    eosdt,
                    seq[idx],
                    Disposition {
                        eosdt,
                        decod: decod[idx].clone(),
                        term: term[idx].clone(),
                        visitnum: visitnum[idx],
                    },
                ),
            );
        }
    }
    Ok(latest
        .into_iter()
        .map(|(subject, (_, _, disposition))| (subject, disposition))
        .collect())
}

/// Treatment dates and cumulative dose from qualifying dosing records.
///
/// A record qualifies with a positive dose, or a zero dose of placebo. A
/// missing end date falls back to the end-of-study date when the subject
/// discontinued after randomization.
pub fn exposure_summary(
    sources: &SourceTables,
    dispositions: &BTreeMap<String, Disposition>,
) -> Result<BTreeMap<String, Exposure>> {
    let ex = TableReader::source(DATASET, sources, SdtmDomain::Ex)?;
    let usubjid = ex.text("USUBJID")?;
    let treatment = ex.text("EXTRT")?;
    let dose = ex.num("EXDOSE")?;
    let start = ex.text("EXSTDTC")?;
    let end = ex.text("EXENDTC")?;

    let mut exposures: BTreeMap<String, Exposure> = BTreeMap::new();
    for idx in 0..ex.height() {
        let Some(subject) = usubjid[idx].clone() else {
            continue;
        };
        let Some(amount) = dose[idx] else {
            continue;
        };
        let placebo = treatment[idx]
            .as_deref()
            .is_some_and(|name| name.to_uppercase().contains("PLACEBO"));
        if !(amount > 0.0 || (amount == 0.0 && placebo)) {
            continue;
        }

        let exstdt = first_day_date(start[idx].as_deref());
        let exendt = first_day_date(end[idx].as_deref()).or_else(|| {
            dispositions
                .get(&subject)
                .filter(|disposition| disposition.discontinued())
                .and_then(|disposition| disposition.eosdt)
        });

        let exposure = exposures.entry(subject).or_default();
        if let Some(name) = treatment[idx].clone() {
            exposure.treatments.insert(name);
        }
        exposure.trtsdt = min_date(exposure.trtsdt, exstdt);
        exposure.trtedt = max_date(exposure.trtedt, exendt);
        if let (Some(first), Some(last)) = (exstdt, exendt) {
            let record_dose = amount * inclusive_days(first, last) as f64;
            exposure.cumdose = Some(exposure.cumdose.unwrap_or(0.0) + record_dose);
        }
    }
    Ok(exposures)
}

fn min_date(current: Option<NaiveDate>, candidate: Option<NaiveDate>) -> Option<NaiveDate> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn max_date(current: Option<NaiveDate>, candidate: Option<NaiveDate>) -> Option<NaiveDate> {
    match (current, candidate) {
        (Some(a), Some(b)) => Some(a.max(b)),
        (a, b) => a.or(b),
    }
}

/// Subjects with every efficacy test recorded after the minimum visit.
fn efficacy_subjects(
    sources: &SourceTables,
    params: &DerivationParams,
) -> Result<BTreeSet<String>> {
    let qs = TableReader::source(DATASET, sources, SdtmDomain::Qs)?;
    let usubjid = qs.text("USUBJID")?;
    let testcd = qs.text("QSTESTCD")?;
    let visitnum = qs.num("VISITNUM")?;

    let mut tests: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for idx in 0..qs.height() {
        let (Some(subject), Some(code), Some(visit)) =
            (usubjid[idx].clone(), testcd[idx].clone(), visitnum[idx])
        else {
            continue;
        };
        if visit > params.efficacy_min_visit && params.efficacy_tests.contains(&code) {
            tests.entry(subject).or_default().insert(code);
        }
    }
    Ok(tests
        .into_iter()
        .filter(|(_, codes)| codes.len() == params.efficacy_tests.len())
        .map(|(subject, _)| subject)
        .collect())
}

type VisitSummary = (BTreeMap<String, BTreeSet<String>>, BTreeMap<String, NaiveDate>);

/// Attended visit labels and first-visit date per subject.
fn visit_summary(sources: &SourceTables, params: &DerivationParams) -> Result<VisitSummary> {
    let sv = TableReader::source(DATASET, sources, SdtmDomain::Sv)?;
    let usubjid = sv.text("USUBJID")?;
    let visit = sv.text("VISIT")?;
    let visitnum = sv.num("VISITNUM")?;
    let start = sv.text("SVSTDTC")?;

    let mut attended: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    let mut first_visit = BTreeMap::new();
    for idx in 0..sv.height() {
        let Some(subject) = usubjid[idx].clone() else {
            continue;
        };
        if let Some(label) = &visit[idx] {
            attended
                .entry(subject.clone())
                .or_default()
                .insert(label.to_uppercase());
        }
        if visitnum[idx] == Some(params.first_visit) {
            if let Some(date) = first_day_date(start[idx].as_deref()) {
                first_visit.insert(subject, date);
            }
        }
    }
    Ok((attended, first_visit))
}

/// Height, weight, education, diagnosis onset and cognitive score.
fn baseline_summary(
    sources: &SourceTables,
    params: &DerivationParams,
) -> Result<BTreeMap<String, Baseline>> {
    let mut baselines: BTreeMap<String, Baseline> = BTreeMap::new();

    let vs = TableReader::source(DATASET, sources, SdtmDomain::Vs)?;
    let usubjid = vs.text("USUBJID")?;
    let testcd = vs.text("VSTESTCD")?;
    let result = vs.num("VSSTRESN")?;
    let visitnum = vs.num("VISITNUM")?;
    for idx in 0..vs.height() {
        let (Some(subject), Some(code), Some(value)) =
            (usubjid[idx].clone(), testcd[idx].as_deref(), result[idx])
        else {
            continue;
        };
        let baseline = baselines.entry(subject).or_default();
        match code {
            "HEIGHT" if visitnum[idx] == Some(params.height_visit) => {
                baseline.height.get_or_insert(value);
            }
            "WEIGHT" if visitnum[idx] == Some(params.weight_visit) => {
                baseline.weight.get_or_insert(value);
            }
            _ => {}
        }
    }

    let sc = TableReader::source(DATASET, sources, SdtmDomain::Sc)?;
    let usubjid = sc.text("USUBJID")?;
    let testcd = sc.text("SCTESTCD")?;
    let result = sc.num("SCSTRESN")?;
    for idx in 0..sc.height() {
        if let (Some(subject), Some(value)) = (usubjid[idx].clone(), result[idx])
            && testcd[idx].as_deref() == Some(params.education_test.as_str())
        {
            baselines
                .entry(subject)
                .or_default()
                .education
                .get_or_insert(value);
        }
    }

    let mh = TableReader::source(DATASET, sources, SdtmDomain::Mh)?;
    let usubjid = mh.text("USUBJID")?;
    let category = mh.text("MHCAT")?;
    let start = mh.text("MHSTDTC")?;
    for idx in 0..mh.height() {
        let Some(subject) = usubjid[idx].clone() else {
            continue;
        };
        if category[idx].as_deref() != Some(params.diagnosis_category.as_str()) {
            continue;
        }
        if let Some(onset) = first_day_date(start[idx].as_deref()) {
            baselines.entry(subject).or_default().onset.get_or_insert(onset);
        }
    }

    let qs = TableReader::source(DATASET, sources, SdtmDomain::Qs)?;
    let usubjid = qs.text("USUBJID")?;
    let category = qs.text("QSCAT")?;
    let result = qs.num("QSSTRESN")?;
    for idx in 0..qs.height() {
        if let (Some(subject), Some(value)) = (usubjid[idx].clone(), result[idx])
            && category[idx].as_deref() == Some(params.cognitive_category.as_str())
        {
            let baseline = baselines.entry(subject).or_default();
            baseline.cognitive_total = Some(baseline.cognitive_total.unwrap_or(0.0) + value);
        }
    }

    Ok(baselines)
}

/// Pools sites where any study arm has fewer subjects than the threshold.
fn assign_site_groups(records: &mut [Record], params: &DerivationParams) {
    let text = |record: &Record, name: &str| record.get(name).and_then(Value::as_str).map(str::to_string);
    let arms: BTreeSet<String> = records.iter().filter_map(|r| text(r, "ARM")).collect();
    let mut counts: BTreeMap<(String, String), usize> = BTreeMap::new();
    for record in records.iter() {
        if let (Some(site), Some(arm)) = (text(record, "SITEID"), text(record, "ARM")) {
            *counts.entry((site, arm)).or_default() += 1;
        }
    }
    let pooled: BTreeSet<String> = counts
        .keys()
        .map(|(site, _)| site.clone())
        .filter(|site| {
            arms.iter().any(|arm| {
                counts.get(&(site.clone(), arm.clone())).copied().unwrap_or(0)
                    < params.site_pool_threshold
            })
        })
        .collect();
    for record in records.iter_mut() {
        let group = text(record, "SITEID").map(|site| {
            if pooled.contains(&site) {
                params.pooled_site.clone()
            } else {
                site
            }
        });
        record.insert("SITEGR1".to_string(), Value::from(group));
    }
}

