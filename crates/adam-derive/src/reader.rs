//! Typed column access on source and analysis frames.

use std::collections::BTreeMap;

use adam_ingest::{SdtmDomain, SourceTables};
use adam_model::polars::{any_to_f64, any_to_string_non_empty, cell_value};
use adam_model::{AnalysisTable, ColumnType, DerivationError, Record, Result, Value};
use polars::prelude::*;

/// Reads columns of one input frame on behalf of a dataset being derived.
///
/// Missing columns surface as [`DerivationError::MissingColumn`] naming both
/// the dataset and the input table.
#[derive(Debug, Clone, Copy)]
pub struct TableReader<'a> {
    dataset: &'a str,
    table: &'a str,
    data: &'a DataFrame,
}

impl<'a> TableReader<'a> {
    pub fn new(dataset: &'a str, table: &'a str, data: &'a DataFrame) -> Self {
        Self {
            dataset,
            table,
            data,
        }
    }

    /// Reader over a required source domain.
    pub fn source(
        dataset: &'a str,
        sources: &'a SourceTables,
        domain: SdtmDomain,
    ) -> Result<Self> {
        let data = sources
            .get(domain)
            .ok_or_else(|| DerivationError::MissingInput {
                dataset: dataset.to_string(),
                table: domain.code().to_string(),
            })?;
        Ok(Self::new(dataset, domain.code(), data))
    }

    pub fn data(&self) -> &'a DataFrame {
        self.data
    }

    pub fn height(&self) -> usize {
        self.data.height()
    }

    fn column(&self, name: &str) -> Result<&'a Column> {
        self.data
            .column(name)
            .map_err(|_| DerivationError::MissingColumn {
                dataset: self.dataset.to_string(),
                table: self.table.to_string(),
                column: name.to_string(),
            })
    }

    /// Trimmed text cells; blanks are `None`.
    pub fn text(&self, name: &str) -> Result<Vec<Option<String>>> {
        let column = self.column(name)?;
        Ok((0..self.height())
            .map(|idx| any_to_string_non_empty(column.get(idx).unwrap_or(AnyValue::Null)))
            .collect())
    }

    /// Like [`TableReader::text`], but an absent column reads as all missing.
    pub fn optional_text(&self, name: &str) -> Vec<Option<String>> {
        self.text(name)
            .unwrap_or_else(|_| vec![None; self.height()])
    }

    pub fn num(&self, name: &str) -> Result<Vec<Option<f64>>> {
        let column = self.column(name)?;
        Ok((0..self.height())
            .map(|idx| any_to_f64(column.get(idx).unwrap_or(AnyValue::Null)))
            .collect())
    }

    pub fn optional_num(&self, name: &str) -> Vec<Option<f64>> {
        self.num(name).unwrap_or_else(|_| vec![None; self.height()])
    }

    pub fn values(&self, name: &str, column_type: ColumnType) -> Result<Vec<Value>> {
        let column = self.column(name)?;
        Ok((0..self.height())
            .map(|idx| cell_value(column, idx, column_type))
            .collect())
    }
}

/// Keeps the rows of `data` where `keep` is true.
pub fn filter_rows(dataset: &str, data: &DataFrame, keep: &[bool]) -> Result<DataFrame> {
    let mask = BooleanChunked::from_slice("keep".into(), keep);
    data.filter(&mask)
        .map_err(|e| DerivationError::frame(dataset, e))
}

/// ADSL records keyed by USUBJID.
pub fn subject_records(adsl: &AnalysisTable) -> Result<BTreeMap<String, Record>> {
    Ok(table_records(adsl)?
        .into_iter()
        .filter_map(|record| {
            let subject = record.get("USUBJID")?.as_str()?.to_string();
            Some((subject, record))
        })
        .collect())
}

/// Copies `(source, target)` variables from the subject's ADSL record.
pub fn copy_subject_context(record: &mut Record, subject: &Record, pairs: &[(&str, &str)]) {
    for (source, target) in pairs {
        let value = subject.get(*source).cloned().unwrap_or_default();
        record.insert((*target).to_string(), value);
    }
}

/// Reads every row of a finalized analysis table as typed records.
pub fn table_records(table: &AnalysisTable) -> Result<Vec<Record>> {
    let reader = TableReader::new(&table.name, &table.name, &table.data);
    let mut records = vec![Record::new(); table.record_count()];
    for meta in &table.columns {
        let values = reader.values(&meta.name, meta.column_type)?;
        for (record, value) in records.iter_mut().zip(values) {
            record.insert(meta.name.clone(), value);
        }
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_model::polars::{num_column, text_column};

    #[test]
    fn missing_column_names_dataset_and_table() {
        let df = DataFrame::new(vec![text_column("USUBJID", vec![Some("01".to_string())])]).unwrap();
        let reader = TableReader::new("ADSL", "DM", &df);
        let error = reader.text("ARM").unwrap_err();
        assert_eq!(error.to_string(), "ADSL: required column ARM is missing from DM");
        assert_eq!(reader.optional_text("ARM"), vec![None]);
    }

    #[test]
    fn numbers_read_as_f64() {
        let df = DataFrame::new(vec![num_column("AGE", vec![Some(63.0), None])]).unwrap();
        let reader = TableReader::new("ADSL", "DM", &df);
        assert_eq!(reader.num("AGE").unwrap(), vec![Some(63.0), None]);
    }

    #[test]
    fn filter_rows_keeps_masked_rows() {
        let df = DataFrame::new(vec![
            text_column(
                "LBCAT",
                vec![Some("CHEMISTRY".to_string()), Some("HEMATOLOGY".to_string()), None],
            ),
            num_column("LBSEQ", vec![Some(1.0), Some(2.0), Some(3.0)]),
        ])
        .unwrap();
        let kept = filter_rows("ADLBC", &df, &[true, false, true]).unwrap();
        let reader = TableReader::new("ADLBC", "LB", &kept);
        assert_eq!(reader.num("LBSEQ").unwrap(), vec![Some(1.0), Some(3.0)]);
    }

    #[test]
    fn subject_context_copies_and_renames() {
        let mut subject = Record::new();
        subject.insert("TRT01A".to_string(), Value::from("Placebo"));
        let mut record = Record::new();
        copy_subject_context(&mut record, &subject, &[("TRT01A", "TRTA"), ("AGE", "AGE")]);
        assert_eq!(record["TRTA"], Value::from("Placebo"));
        assert!(record["AGE"].is_missing());
    }

    #[test]
    fn absent_source_domain_is_missing_input() {
        let sources = SourceTables::new("sdtm");
        let error = TableReader::source("ADAE", &sources, SdtmDomain::Ae).unwrap_err();
        assert_eq!(error.kind(), "missing-input");
        assert_eq!(error.to_string(), "ADAE: required input table AE is not available");
    }
}
