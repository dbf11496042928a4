//! End-to-end derivations over the pilot fixture study.

use std::path::{Path, PathBuf};

use adam_derive::reader::table_records;
use adam_derive::{DerivationParams, Stage, derive_adae, derive_adlbc, derive_adsl, derive_adtte};
use adam_ingest::{SdtmDomain, SourceTables, load_study};
use adam_model::{AnalysisSpec, AnalysisTable, IssueSeverity, Record, Value};
use chrono::NaiveDate;
use tempfile::TempDir;

fn fixture_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../testdata/sdtm")
}

fn spec() -> AnalysisSpec {
    adam_standards::load_analysis_spec(&adam_standards::default_spec_dir()).unwrap()
}

fn sources(dir: &Path) -> SourceTables {
    let domains: Vec<SdtmDomain> = Stage::ALL
        .iter()
        .flat_map(|stage| stage.source_domains().iter().copied())
        .collect();
    load_study(dir, &domains).unwrap()
}

/// Copy of the fixture study with `file` rewritten by `edit`.
fn edited_fixture(file: &str, edit: impl Fn(&str) -> String) -> TempDir {
    let dir = TempDir::new().unwrap();
    for entry in std::fs::read_dir(fixture_dir()).unwrap() {
        let path = entry.unwrap().path();
        std::fs::copy(&path, dir.path().join(path.file_name().unwrap())).unwrap();
    }
    let content = std::fs::read_to_string(dir.path().join(file)).unwrap();
    std::fs::write(dir.path().join(file), edit(&content)).unwrap();
    dir
}

fn records(table: &AnalysisTable) -> Vec<Record> {
    table_records(table).unwrap()
}

/// First record whose columns match all `(name, rendered value)` pairs.
fn find<'a>(records: &'a [Record], matches: &[(&str, &str)]) -> &'a Record {
    records
        .iter()
        .find(|record| {
            matches
                .iter()
                .all(|(name, value)| text(record, name).as_deref() == Some(*value))
        })
        .unwrap_or_else(|| panic!("no record matching {matches:?}"))
}

fn text(record: &Record, name: &str) -> Option<String> {
    record.get(name).and_then(Value::render)
}

fn num(record: &Record, name: &str) -> Option<f64> {
    record.get(name).and_then(Value::as_f64)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

#[test]
fn adsl_excludes_screen_failures_and_derives_exposure() {
    let spec = spec();
    let output = derive_adsl(&sources(&fixture_dir()), &spec, &DerivationParams::default()).unwrap();
    assert_eq!(
        output.table.column_names(),
        spec.dataset("ADSL").unwrap().variable_names()
    );
    let rows = records(&output.table);
    let subjects: Vec<String> = rows.iter().filter_map(|r| text(r, "USUBJID")).collect();
    assert_eq!(
        subjects,
        vec!["01-701-1015", "01-701-1023", "01-702-1034", "01-702-1040"]
    );

    let low_dose = find(&rows, &[("USUBJID", "01-702-1034")]);
    assert_eq!(low_dose["TRTSDT"].as_date(), Some(date(2014, 1, 1)));
    assert_eq!(low_dose["TRTEDT"].as_date(), Some(date(2014, 6, 17)));
    assert_eq!(num(low_dose, "TRTDURD"), Some(168.0));
    assert_eq!(num(low_dose, "CUMDOSE"), Some(8400.0));
    assert_eq!(num(low_dose, "AVGDD"), Some(50.0));
    assert_eq!(num(low_dose, "TRT01PN"), Some(54.0));
    assert_eq!(text(low_dose, "SAFFL").as_deref(), Some("Y"));
    assert_eq!(text(low_dose, "EFFFL").as_deref(), Some("N"));
    assert_eq!(text(low_dose, "COMP24FL").as_deref(), Some("Y"));
    assert_eq!(num(low_dose, "VISNUMEN"), Some(12.0));
    assert_eq!(text(low_dose, "AGEGR1").as_deref(), Some("65-80"));
    assert!(low_dose["BMIBL"].is_missing());

    let placebo = find(&rows, &[("USUBJID", "01-701-1015")]);
    assert_eq!(num(placebo, "CUMDOSE"), Some(0.0));
    assert_eq!(num(placebo, "TRTDURD"), Some(167.0));
    assert_eq!(text(placebo, "EFFFL").as_deref(), Some("Y"));
    assert_eq!(text(placebo, "COMP8FL").as_deref(), Some("Y"));
    assert_eq!(text(placebo, "COMP24FL").as_deref(), Some("N"));
    assert_eq!(num(placebo, "VISNUMEN"), Some(12.0));
    assert_eq!(text(placebo, "EOSSTT").as_deref(), Some("COMPLETED"));
    assert!(placebo["DCSREAS"].is_missing());
    assert!(placebo["DISCONFL"].is_missing());
    assert_eq!(num(placebo, "BMIBL"), Some(25.1));
    assert_eq!(text(placebo, "BMIBLGR1").as_deref(), Some("25-<30"));
    assert_eq!(num(placebo, "MMSETOT"), Some(23.0));
    assert_eq!(num(placebo, "EDUCLVL"), Some(16.0));
    assert_eq!(placebo["DISONSDT"].as_date(), Some(date(2010, 4, 1)));
    assert_eq!(num(placebo, "DURDIS"), Some(44.8));
    assert_eq!(text(placebo, "DURDSGR1").as_deref(), Some(">=12"));
    assert_eq!(text(placebo, "AGEGR1").as_deref(), Some("<65"));
    assert_eq!(num(placebo, "AGEGR1N"), Some(1.0));
    assert_eq!(text(placebo, "SITEGR1").as_deref(), Some("900"));
}

#[test]
fn adsl_subject_without_dosing_is_not_in_safety_population() {
    let output =
        derive_adsl(&sources(&fixture_dir()), &spec(), &DerivationParams::default()).unwrap();
    let rows = records(&output.table);
    let undosed = find(&rows, &[("USUBJID", "01-701-1023")]);
    assert!(undosed["TRTSDT"].is_missing());
    assert!(undosed["TRTDURD"].is_missing());
    assert_eq!(text(undosed, "ITTFL").as_deref(), Some("Y"));
    assert_eq!(text(undosed, "SAFFL").as_deref(), Some("N"));
    assert_eq!(text(undosed, "EFFFL").as_deref(), Some("N"));
    assert_eq!(text(undosed, "EOSSTT").as_deref(), Some("DISCONTINUED"));
    assert_eq!(text(undosed, "DCSREAS").as_deref(), Some("Adverse Event"));
    assert_eq!(text(undosed, "DISCONFL").as_deref(), Some("Y"));
    assert_eq!(text(undosed, "DSRAEFL").as_deref(), Some("Y"));
    assert_eq!(num(undosed, "TRT01AN"), Some(81.0));

    let elderly = find(&rows, &[("USUBJID", "01-702-1040")]);
    assert_eq!(text(elderly, "AGEGR1").as_deref(), Some(">80"));
    assert_eq!(num(elderly, "RACEN"), Some(2.0));
    assert_eq!(num(elderly, "VISNUMEN"), Some(8.0));
}

#[test]
fn adsl_first_visit_number_comes_from_params() {
    let sources = sources(&fixture_dir());
    let default_rows = records(
        &derive_adsl(&sources, &spec(), &DerivationParams::default())
            .unwrap()
            .table,
    );
    let placebo = find(&default_rows, &[("USUBJID", "01-701-1015")]);
    assert_eq!(placebo["VISIT1DT"].as_date(), Some(date(2013, 12, 26)));

    let params = DerivationParams {
        first_visit: 3.0,
        ..DerivationParams::default()
    };
    let rows = records(&derive_adsl(&sources, &spec(), &params).unwrap().table);
    let placebo = find(&rows, &[("USUBJID", "01-701-1015")]);
    assert_eq!(placebo["VISIT1DT"].as_date(), Some(date(2014, 1, 2)));
    let no_baseline_visit = find(&rows, &[("USUBJID", "01-702-1034")]);
    assert!(no_baseline_visit["VISIT1DT"].is_missing());
}

#[test]
fn adsl_unknown_arm_is_a_terminology_error() {
    let dir = edited_fixture("dm.csv", |dm| {
        dm.replace("Xanomeline Low Dose", "Xanomeline Medium Dose")
    });

    let error = derive_adsl(&sources(dir.path()), &spec(), &DerivationParams::default())
        .unwrap_err();
    assert_eq!(error.kind(), "terminology");
    assert!(error.to_string().contains("Xanomeline Medium Dose"));
}

#[test]
fn adae_imputes_partial_dates_and_flags_first_occurrences() {
    let spec = spec();
    let params = DerivationParams::default();
    let sources = sources(&fixture_dir());
    let adsl = derive_adsl(&sources, &spec, &params).unwrap().table;
    let output = derive_adae(&sources, &adsl, &spec, &params).unwrap();
    let rows = records(&output.table);
    assert_eq!(rows.len(), 9);

    let first = find(&rows, &[("USUBJID", "01-701-1015"), ("AESEQ", "1")]);
    assert_eq!(first["ASTDT"].as_date(), Some(date(2014, 1, 3)));
    assert_eq!(num(first, "ASTDY"), Some(2.0));
    assert_eq!(num(first, "ADURN"), Some(8.0));
    assert_eq!(text(first, "AENTMF").as_deref(), Some("H"));
    assert_eq!(text(first, "AETRTEM").as_deref(), Some("Y"));
    assert_eq!(text(first, "CQ01NAM").as_deref(), Some("DERMATOLOGIC EVENTS"));
    for flag in ["TRTEMFL", "AOCCFL", "AOCCSFL", "AOCCPFL", "AOCC01FL"] {
        assert_eq!(text(first, flag).as_deref(), Some("Y"), "{flag}");
    }
    assert!(first["AOCC02FL"].is_missing());

    // Same day and body system as AESEQ 1, but serious.
    let serious = find(&rows, &[("USUBJID", "01-701-1015"), ("AESEQ", "3")]);
    assert!(serious["AOCCFL"].is_missing());
    assert!(serious["AOCCSFL"].is_missing());
    assert!(serious["AOCC01FL"].is_missing());
    assert!(serious["AENDT"].is_missing());
    for flag in ["AOCCPFL", "AOCC02FL", "AOCC03FL", "AOCC04FL"] {
        assert_eq!(text(serious, flag).as_deref(), Some("Y"), "{flag}");
    }

    let month_only = find(&rows, &[("USUBJID", "01-701-1015"), ("AESEQ", "4")]);
    assert_eq!(month_only["ASTDT"].as_date(), Some(date(2014, 6, 1)));
    assert_eq!(text(month_only, "ASTDTF").as_deref(), Some("D"));
    assert_eq!(text(month_only, "ASTTMF").as_deref(), Some("H"));
    // End dates are completed down to the hour only.
    assert!(month_only["AENDT"].is_missing());
    assert!(month_only["ADURN"].is_missing());
    assert_eq!(text(month_only, "AOCCSFL").as_deref(), Some("Y"));

    let before_treatment = find(&rows, &[("USUBJID", "01-701-1015"), ("AESEQ", "5")]);
    assert_eq!(before_treatment["ASTDT"].as_date(), Some(date(2013, 12, 1)));
    assert_eq!(num(before_treatment, "ASTDY"), Some(-32.0));
    assert!(before_treatment["TRTEMFL"].is_missing());
    assert!(before_treatment["AOCCPFL"].is_missing());

    let year_only = find(&rows, &[("USUBJID", "01-701-1015"), ("AESEQ", "6")]);
    assert!(year_only["ASTDT"].is_missing());
    assert!(year_only["TRTEMFL"].is_missing());

    let untreated = find(&rows, &[("USUBJID", "01-701-1023")]);
    assert!(untreated["TRTEMFL"].is_missing());

    let orphan = &output.issues[0];
    assert_eq!(orphan.rule, "subject-not-in-adsl");
    assert_eq!(orphan.severity, IssueSeverity::Warning);
    assert_eq!(orphan.keys, vec!["01-709-9999"]);
}

#[test]
fn adae_keeps_events_with_unknown_start_month() {
    let dir = edited_fixture("ae.csv", |ae| {
        ae.replace(",2014-01-09,2014-01-11", ",2014---09,2014-01-11")
    });
    let spec = spec();
    let params = DerivationParams::default();
    let sources = sources(dir.path());
    let adsl = derive_adsl(&sources, &spec, &params).unwrap().table;
    let rows = records(&derive_adae(&sources, &adsl, &spec, &params).unwrap().table);
    assert_eq!(rows.len(), 9);

    let unknown_month = find(&rows, &[("USUBJID", "01-701-1015"), ("AESEQ", "2")]);
    assert!(unknown_month["ASTDT"].is_missing());
    assert!(unknown_month["ASTDTF"].is_missing());
    assert!(unknown_month["ASTDY"].is_missing());
    assert_eq!(unknown_month["AENDT"].as_date(), Some(date(2014, 1, 11)));
}

#[test]
fn adlbc_derives_baseline_ranges_and_end_of_treatment() {
    let spec = spec();
    let params = DerivationParams::default();
    let sources = sources(&fixture_dir());
    let adsl = derive_adsl(&sources, &spec, &params).unwrap().table;
    let output = derive_adlbc(&sources, &adsl, &spec, &params).unwrap();
    let rows = records(&output.table);
    assert_eq!(rows.len(), 10);
    assert!(rows.iter().all(|r| text(r, "PARAMCD").as_deref() == Some("ALB")));
    assert!(rows.iter().all(|r| text(r, "LBSEQ").as_deref() != Some("6")));

    let baseline = find(&rows, &[("USUBJID", "01-701-1015"), ("LBSEQ", "1")]);
    assert_eq!(text(baseline, "AVISIT").as_deref(), Some("Baseline"));
    assert_eq!(num(baseline, "AVISITN"), Some(0.0));
    assert_eq!(text(baseline, "ABLFL").as_deref(), Some("Y"));
    assert_eq!(text(baseline, "PARAM").as_deref(), Some("Albumin (g/L)"));
    assert_eq!(num(baseline, "PARAMN"), Some(1.0));
    assert_eq!(num(baseline, "ADY"), Some(-7.0));
    assert!(baseline["CHG"].is_missing());

    let low = find(&rows, &[("USUBJID", "01-701-1015"), ("LBSEQ", "3")]);
    assert_eq!(text(low, "ANRIND").as_deref(), Some("L"));
    assert_eq!(num(low, "ALBTRVAL"), Some(1.5));
    assert!(low["ANL01FL"].is_missing());

    let high = find(&rows, &[("USUBJID", "01-701-1015"), ("LBSEQ", "4")]);
    assert_eq!(text(high, "AVISIT").as_deref(), Some("Week 6"));
    assert_eq!(text(high, "ANRIND").as_deref(), Some("H"));
    assert_eq!(text(high, "BNRIND").as_deref(), Some("N"));
    assert_eq!(num(high, "ALBTRVAL"), Some(6.5));
    assert_eq!(num(high, "BASE"), Some(38.0));
    assert_eq!(num(high, "CHG"), Some(42.0));
    assert_eq!(text(high, "ANL01FL").as_deref(), Some("Y"));

    let unscheduled = find(&rows, &[("USUBJID", "01-701-1015"), ("LBSEQ", "5")]);
    assert_eq!(text(unscheduled, "AVISIT").as_deref(), Some("Unscheduled"));
    assert!(unscheduled["AVISITN"].is_missing());

    let eot = find(&rows, &[("USUBJID", "01-701-1015"), ("AVISITN", "99")]);
    assert_eq!(text(eot, "AVISIT").as_deref(), Some("End of Treatment"));
    assert_eq!(text(eot, "LBSEQ").as_deref(), Some("7"));
    assert_eq!(num(eot, "CHG"), Some(2.0));

    let carried = find(&rows, &[("USUBJID", "01-702-1034"), ("AVISITN", "99")]);
    assert_eq!(text(carried, "LBSEQ").as_deref(), Some("2"));
    assert_eq!(num(carried, "AVAL"), Some(42.0));

    let flagged: Vec<&Record> = rows
        .iter()
        .filter(|r| text(r, "ANL01FL").as_deref() == Some("Y"))
        .collect();
    assert_eq!(flagged.len(), 2);
}

#[test]
fn adtte_uses_first_event_or_completion_date() {
    let spec = spec();
    let params = DerivationParams::default();
    let sources = sources(&fixture_dir());
    let adsl = derive_adsl(&sources, &spec, &params).unwrap().table;
    let adae = derive_adae(&sources, &adsl, &spec, &params).unwrap().table;
    let output = derive_adtte(&sources, &adsl, &adae, &spec, &params).unwrap();
    assert!(output.issues.is_empty());
    let rows = records(&output.table);
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert_eq!(text(row, "PARAMCD").as_deref(), Some("TTDE"));
        assert_eq!(text(row, "SAFFL").as_deref(), Some("Y"));
        assert!(num(row, "AVAL").is_some_and(|days| days >= 0.0));
    }

    let event = find(&rows, &[("USUBJID", "01-701-1015")]);
    assert_eq!(num(event, "CNSR"), Some(0.0));
    assert_eq!(event["ADT"].as_date(), Some(date(2014, 1, 3)));
    assert_eq!(num(event, "AVAL"), Some(1.0));
    assert_eq!(text(event, "SRCDOM").as_deref(), Some("ADAE"));
    assert_eq!(text(event, "SRCVAR").as_deref(), Some("ASTDT"));
    assert_eq!(num(event, "SRCSEQ"), Some(1.0));
    assert_eq!(text(event, "EVNTDESC").as_deref(), Some("Dermatologic Event Occurred"));

    let rash = find(&rows, &[("USUBJID", "01-702-1034")]);
    assert_eq!(num(rash, "AVAL"), Some(40.0));

    let censored = find(&rows, &[("USUBJID", "01-702-1040")]);
    assert_eq!(num(censored, "CNSR"), Some(1.0));
    assert_eq!(censored["ADT"].as_date(), Some(date(2014, 5, 2)));
    assert_eq!(num(censored, "AVAL"), Some(90.0));
    assert_eq!(text(censored, "SRCDOM").as_deref(), Some("DS"));
    assert_eq!(text(censored, "SRCVAR").as_deref(), Some("DSSTDTC"));
    assert_eq!(num(censored, "SRCSEQ"), Some(1.0));
}

#[test]
fn adtte_without_censoring_date_warns_or_fails_when_strict() {
    let spec = spec();
    let mut params = DerivationParams::default();
    let full = sources(&fixture_dir());
    let adsl = derive_adsl(&full, &spec, &params).unwrap().table;
    let adae = derive_adae(&full, &adsl, &spec, &params).unwrap().table;

    let dir = TempDir::new().unwrap();
    let ds = std::fs::read_to_string(fixture_dir().join("ds.csv")).unwrap();
    let kept: Vec<&str> = ds.lines().filter(|line| !line.contains("01-702-1040")).collect();
    std::fs::write(dir.path().join("ds.csv"), kept.join("\n")).unwrap();
    let trimmed = load_study(dir.path(), &[SdtmDomain::Ds]).unwrap();

    let output = derive_adtte(&trimmed, &adsl, &adae, &spec, &params).unwrap();
    let rows = records(&output.table);
    let unresolved = find(&rows, &[("USUBJID", "01-702-1040")]);
    assert_eq!(num(unresolved, "CNSR"), Some(1.0));
    assert!(unresolved["ADT"].is_missing());
    assert!(unresolved["AVAL"].is_missing());
    assert_eq!(output.issues.len(), 1);
    assert_eq!(output.issues[0].rule, "unresolved-censoring");
    assert_eq!(output.issues[0].keys, vec!["01-702-1040/TTDE"]);

    params.strict_censoring = true;
    let error = derive_adtte(&trimmed, &adsl, &adae, &spec, &params).unwrap_err();
    assert_eq!(error.kind(), "invariant");
    assert_eq!(error.dataset(), "ADTTE");
}
