use std::fs;

use adam_model::polars::{num_column, text_column};
use adam_model::{AnalysisTable, ColumnMeta, ColumnType};
use adam_output::{OutputError, RunManifest, TableStore, compute_file_hash};
use polars::prelude::DataFrame;

fn meta(name: &str, label: &str, column_type: ColumnType) -> ColumnMeta {
    ColumnMeta {
        name: name.to_string(),
        label: Some(label.to_string()),
        column_type,
    }
}

fn adsl_table() -> AnalysisTable {
    let data = DataFrame::new(vec![
        text_column(
            "USUBJID",
            vec![Some("01-701-1015".to_string()), Some("01-702-1034".to_string())],
        ),
        num_column("AGE", vec![Some(63.0), None]),
        text_column(
            "TRTSDT",
            vec![Some("2014-01-02".to_string()), Some("2014-01-01".to_string())],
        ),
        text_column("SITEGR1", vec![Some("701".to_string()), Some("900, pooled".to_string())]),
    ])
    .unwrap();
    AnalysisTable {
        name: "ADSL".to_string(),
        label: Some("Subject-Level Analysis Dataset".to_string()),
        data,
        columns: vec![
            meta("USUBJID", "Unique Subject Identifier", ColumnType::Char),
            meta("AGE", "Age", ColumnType::Num),
            meta("TRTSDT", "Date of First Exposure to Treatment", ColumnType::Date),
            meta("SITEGR1", "Pooled Site Group 1", ColumnType::Char),
        ],
    }
}

#[test]
fn persisted_table_loads_back_with_types_and_labels() {
    let dir = tempfile::tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let table = adsl_table();

    let entry = store.persist(&table).unwrap();
    assert_eq!(entry.file, "ADSL.csv");
    assert_eq!(entry.records, 2);
    assert!(store.contains("adsl"));

    let loaded = store.load("ADSL").unwrap();
    assert_eq!(loaded.columns, table.columns);
    assert_eq!(loaded.label, table.label);
    assert_eq!(loaded.column_names(), vec!["USUBJID", "AGE", "TRTSDT", "SITEGR1"]);
    assert!(loaded.data.equals_missing(&table.data));
    assert_eq!(loaded.label_for("AGE"), Some("Age"));
}

#[test]
fn missing_cells_are_written_as_empty_fields() {
    let dir = tempfile::tempdir().unwrap();
    let store = TableStore::new(dir.path());
    store.persist(&adsl_table()).unwrap();

    let text = fs::read_to_string(store.table_path("ADSL")).unwrap();
    assert_eq!(
        text,
        "USUBJID,AGE,TRTSDT,SITEGR1\n\
         01-701-1015,63,2014-01-02,701\n\
         01-702-1034,,2014-01-01,\"900, pooled\"\n"
    );
}

#[test]
fn manifest_checksums_match_files_and_detect_changes() {
    let dir = tempfile::tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let entry = store.persist(&adsl_table()).unwrap();
    assert_eq!(compute_file_hash(&store.table_path("ADSL")).unwrap(), entry.sha256);

    let mut manifest = RunManifest::new("0.1.0");
    manifest.record_table("ADSL", entry.clone());
    store.write_manifest(&manifest).unwrap();
    let loaded = store.load_manifest().unwrap();
    assert_eq!(loaded.tables["ADSL"], entry);
    store.verify(&entry).unwrap();

    fs::write(store.table_path("ADSL"), "USUBJID\n").unwrap();
    let error = store.verify(&entry).unwrap_err();
    assert!(matches!(error, OutputError::ChecksumMismatch { .. }));
}

#[test]
fn unknown_table_is_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let error = store.load("ADAE").unwrap_err();
    assert!(matches!(error, OutputError::TableNotFound { name, .. } if name == "ADAE"));
}

#[test]
fn edited_numeric_cell_is_rejected_on_load() {
    let dir = tempfile::tempdir().unwrap();
    let store = TableStore::new(dir.path());
    store.persist(&adsl_table()).unwrap();
    fs::write(
        store.table_path("ADSL"),
        "USUBJID,AGE,TRTSDT,SITEGR1\n01-701-1015,sixty,2014-01-02,701\n01-702-1034,,2014-01-01,900\n",
    )
    .unwrap();

    let error = store.load("ADSL").unwrap_err();
    match error {
        OutputError::InvalidTable { reason, .. } => {
            assert_eq!(reason, "AGE row 1: 'sixty' is not numeric")
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn column_metadata_must_match_the_frame() {
    let dir = tempfile::tempdir().unwrap();
    let store = TableStore::new(dir.path());
    let mut table = adsl_table();
    table.columns.swap(0, 1);

    let error = store.persist(&table).unwrap_err();
    assert!(matches!(error, OutputError::InvalidTable { .. }));
    assert!(!store.table_path("ADSL").exists());
}
