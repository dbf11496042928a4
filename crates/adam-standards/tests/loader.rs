//! Integration tests for specification loading.

use std::fs;
use std::path::PathBuf;

use adam_model::{ColumnType, DatasetClass};
use adam_standards::{StandardsError, dataset_inventory, load_analysis_spec};

fn pilot_spec_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../specs/adam-pilot")
}

#[test]
fn loads_pilot_specification() {
    let spec = load_analysis_spec(&pilot_spec_dir()).expect("load pilot spec");
    assert_eq!(
        spec.datasets.keys().cloned().collect::<Vec<_>>(),
        vec!["ADAE", "ADLBC", "ADSL", "ADTTE"]
    );

    let adsl = spec.dataset("ADSL").expect("ADSL");
    assert_eq!(adsl.class, DatasetClass::SubjectLevel);
    assert_eq!(adsl.key_variables, vec!["STUDYID", "USUBJID"]);
    let names = adsl.variable_names();
    assert_eq!(names.first().map(String::as_str), Some("STUDYID"));
    assert_eq!(adsl.column_type("TRTSDT"), Some(ColumnType::Date));
    assert_eq!(adsl.column_type("TRT01PN"), Some(ColumnType::Num));

    let adlbc = spec.dataset("ADLBC").expect("ADLBC");
    assert_eq!(
        adlbc.key_variables,
        vec!["STUDYID", "USUBJID", "PARAMCD", "AVISITN", "LBSEQ"]
    );
}

#[test]
fn codelists_support_mapping_and_grouping() {
    let spec = load_analysis_spec(&pilot_spec_dir()).expect("load pilot spec");
    let trt = spec.variable_codelist("ADSL", "TRT01AN").expect("treatment codelist");
    assert_eq!(trt.numeric_code_for("Xanomeline High Dose"), Some(81.0));

    let bmi = spec.codelist("ADSL", "BMIBLGR1").expect("bmi groups");
    assert_eq!(bmi.group_for(24.9).as_deref(), Some("<25"));
    assert_eq!(bmi.group_for(25.0).as_deref(), Some("25-<30"));
    assert_eq!(bmi.group_for(30.0).as_deref(), Some(">=30"));

    let reasons = spec.codelist("ADSL", "DCSREAS").expect("reasons");
    assert_eq!(reasons.decode_for("ADVERSE EVENT"), Some("Adverse Event"));
}

#[test]
fn inventory_reports_dependencies() {
    let spec = load_analysis_spec(&pilot_spec_dir()).expect("load pilot spec");
    let inventory = dataset_inventory(&spec);
    let rendered: Vec<String> = inventory
        .iter()
        .map(|entry| {
            format!(
                "{}: analysis={:?} source={:?}",
                entry.name, entry.dependencies.analysis, entry.dependencies.source
            )
        })
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r#"
    ADAE: analysis={"ADSL"} source={"AE"}
    ADLBC: analysis={"ADSL"} source={"LB"}
    ADSL: analysis={} source={"DS", "EX", "QS"}
    ADTTE: analysis={"ADAE", "ADSL"} source={"DS"}
    "#);
}

#[test]
fn inventory_reports_purposes_and_key_labels() {
    let spec = load_analysis_spec(&pilot_spec_dir()).expect("load pilot spec");
    let rendered: Vec<String> = dataset_inventory(&spec)
        .iter()
        .map(|entry| {
            let purposes: Vec<&str> = entry.purposes.iter().map(|p| p.label()).collect();
            let keys: Vec<String> = entry
                .key_variables
                .iter()
                .map(|key| format!("{}={}", key.name, key.label.as_deref().unwrap_or("?")))
                .collect();
            format!("{}: [{}] {}", entry.name, purposes.join(", "), keys.join("; "))
        })
        .collect();
    insta::assert_snapshot!(rendered.join("\n"), @r"
    ADAE: [Safety] STUDYID=Study Identifier; USUBJID=Unique Subject Identifier; AESEQ=Sequence Number
    ADLBC: [Efficacy, Safety] STUDYID=Study Identifier; USUBJID=Unique Subject Identifier; PARAMCD=Parameter Code; AVISITN=Analysis Visit (N); LBSEQ=Sequence Number
    ADSL: [Baseline or other subject characteristics] STUDYID=Study Identifier; USUBJID=Unique Subject Identifier
    ADTTE: [Safety] STUDYID=Study Identifier; USUBJID=Unique Subject Identifier; PARAMCD=Parameter Code
    ");
}

#[test]
fn missing_sheet_is_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("Datasets.csv"),
        "Dataset,Label,Class,Structure,Key Variables\nADSL,Subject,ADSL,,USUBJID\n",
    )
    .expect("write datasets");
    let error = load_analysis_spec(dir.path()).unwrap_err();
    assert!(matches!(error, StandardsError::MissingFile { path } if path.ends_with("Variables.csv")));
}

#[test]
fn invalid_data_type_names_row() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("Datasets.csv"),
        "Dataset,Label,Class,Structure,Key Variables\nADSL,Subject,ADSL,,USUBJID\n",
    )
    .expect("write datasets");
    fs::write(
        dir.path().join("Variables.csv"),
        "Dataset,Variable,Label,Data Type,Length,Order,Codelist\nADSL,USUBJID,Subject,blob,11,1,\n",
    )
    .expect("write variables");
    fs::write(dir.path().join("Codelists.csv"), "ID,Name,Term,Decoded Value,Order\n")
        .expect("write codelists");
    let error = load_analysis_spec(dir.path()).unwrap_err();
    assert_eq!(
        error.to_string(),
        format!(
            "invalid Data Type value 'blob' in {} (row 2)",
            dir.path().join("Variables.csv").display()
        )
    );
}

#[test]
fn variables_for_undeclared_dataset_are_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    fs::write(
        dir.path().join("Datasets.csv"),
        "Dataset,Label,Class,Structure,Key Variables\nADSL,Subject,ADSL,,USUBJID\n",
    )
    .expect("write datasets");
    fs::write(
        dir.path().join("Variables.csv"),
        "Dataset,Variable,Label,Data Type,Length,Order,Codelist\nADXX,USUBJID,Subject,text,11,1,\n",
    )
    .expect("write variables");
    fs::write(dir.path().join("Codelists.csv"), "ID,Name,Term,Decoded Value,Order\n")
        .expect("write codelists");
    let error = load_analysis_spec(dir.path()).unwrap_err();
    assert!(matches!(error, StandardsError::UnknownDataset { dataset, .. } if dataset == "ADXX"));
}
