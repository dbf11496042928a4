//! Supplemental-qualifier pivot.

use std::collections::BTreeMap;
use std::path::PathBuf;

use adam_model::polars::{any_to_string_non_empty, format_numeric, parse_f64};
use polars::prelude::*;

use crate::error::{IngestError, Result};
use crate::schema::SdtmDomain;

/// Qualifier values keyed by (USUBJID, IDVARVAL), then by QNAM.
pub type QualifierMap = BTreeMap<(String, String), BTreeMap<String, String>>;

/// Normalizes a parent-record identifier so `"3"`, `"3.0"` and `3.0` agree.
pub fn qualifier_key(value: &str) -> String {
    let trimmed = value.trim();
    parse_f64(trimmed).map_or_else(|| trimmed.to_string(), format_numeric)
}

/// Pivots QNAM/QVAL rows of a supplemental domain into per-record maps.
///
/// Rows without a QVAL are skipped. The same QNAM twice for one parent record
/// is an error.
pub fn pivot_supplemental(supp: &DataFrame, domain: SdtmDomain) -> Result<QualifierMap> {
    let column = |name: &str| {
        supp.column(name).map_err(|_| IngestError::MissingColumn {
            domain: domain.code().to_string(),
            column: name.to_string(),
            path: PathBuf::from(format!("{}.csv", domain.code().to_lowercase())),
        })
    };
    let usubjid = column("USUBJID")?;
    let idvarval = column("IDVARVAL")?;
    let qnam = column("QNAM")?;
    let qval = column("QVAL")?;
    let cell = |column: &Column, idx: usize| {
        any_to_string_non_empty(column.get(idx).unwrap_or(AnyValue::Null))
    };

    let mut pivot = QualifierMap::new();
    for idx in 0..supp.height() {
        let (Some(subject), Some(record), Some(name)) = (
            cell(usubjid, idx),
            cell(idvarval, idx),
            cell(qnam, idx),
        ) else {
            continue;
        };
        let Some(value) = cell(qval, idx) else {
            continue;
        };
        let record = qualifier_key(&record);
        let qualifiers = pivot.entry((subject.clone(), record.clone())).or_default();
        let name = name.to_uppercase();
        if qualifiers.contains_key(&name) {
            return Err(IngestError::DuplicateQualifier {
                domain: domain.code().to_string(),
                usubjid: subject,
                idvarval: record,
                qnam: name,
            });
        }
        qualifiers.insert(name, value);
    }
    Ok(pivot)
}

#[cfg(test)]
mod tests {
    use super::*;
    use adam_model::polars::text_column;

    fn supp(rows: &[[&str; 4]]) -> DataFrame {
        let columns = ["USUBJID", "IDVARVAL", "QNAM", "QVAL"]
            .iter()
            .enumerate()
            .map(|(position, name)| {
                text_column(
                    name,
                    rows.iter().map(|row| Some(row[position].to_string())).collect(),
                )
            })
            .collect();
        DataFrame::new(columns).unwrap()
    }

    #[test]
    fn pivots_qualifiers_per_record() {
        let df = supp(&[
            ["01-701-1015", "1", "AETRTEM", "Y"],
            ["01-701-1015", "2.0", "AETRTEM", "N"],
            ["01-701-1015", "1", "AESOSP", "RASH"],
        ]);
        let pivot = pivot_supplemental(&df, SdtmDomain::SuppAe).unwrap();
        let first = &pivot[&("01-701-1015".to_string(), "1".to_string())];
        assert_eq!(first["AETRTEM"], "Y");
        assert_eq!(first["AESOSP"], "RASH");
        assert_eq!(
            pivot[&("01-701-1015".to_string(), "2".to_string())]["AETRTEM"],
            "N"
        );
    }

    #[test]
    fn duplicate_qualifier_is_rejected() {
        let df = supp(&[
            ["01-701-1015", "1", "AETRTEM", "Y"],
            ["01-701-1015", "1.0", "AETRTEM", "N"],
        ]);
        let error = pivot_supplemental(&df, SdtmDomain::SuppAe).unwrap_err();
        assert!(matches!(error, IngestError::DuplicateQualifier { qnam, .. } if qnam == "AETRTEM"));
    }
}
