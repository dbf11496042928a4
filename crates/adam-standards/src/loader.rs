//! Specification directory loader.

use std::collections::BTreeMap;
use std::path::Path;

use adam_model::{
    AnalysisSpec, Codelist, CodelistTerm, ColumnType, DatasetClass, DatasetSpec, MethodSpec,
    VariableSpec,
};
use tracing::{debug, info};

use crate::csv_utils::{get_string, get_u32, read_sheet};
use crate::error::{Result, StandardsError};

pub const DATASETS_FILE: &str = "Datasets.csv";
pub const VARIABLES_FILE: &str = "Variables.csv";
pub const CODELISTS_FILE: &str = "Codelists.csv";
pub const METHODS_FILE: &str = "Methods.csv";

/// Loads the specification sheets from `dir`.
///
/// `Datasets.csv`, `Variables.csv` and `Codelists.csv` are required;
/// `Methods.csv` is optional.
pub fn load_analysis_spec(dir: &Path) -> Result<AnalysisSpec> {
    if !dir.is_dir() {
        return Err(StandardsError::DirectoryNotFound {
            path: dir.to_path_buf(),
        });
    }
    let mut datasets = load_datasets(&dir.join(DATASETS_FILE))?;
    load_variables(&dir.join(VARIABLES_FILE), &mut datasets)?;
    let codelists = load_codelists(&dir.join(CODELISTS_FILE))?;
    let methods_path = dir.join(METHODS_FILE);
    let methods = if methods_path.is_file() {
        load_methods(&methods_path)?
    } else {
        debug!(path = %methods_path.display(), "no methods sheet");
        Vec::new()
    };
    info!(
        spec_dir = %dir.display(),
        datasets = datasets.len(),
        codelists = codelists.len(),
        methods = methods.len(),
        "analysis specification loaded"
    );
    Ok(AnalysisSpec {
        datasets,
        codelists,
        methods,
    })
}

fn load_datasets(path: &Path) -> Result<BTreeMap<String, DatasetSpec>> {
    let sheet = read_sheet(path)?;
    let name_idx = sheet.require("Dataset")?;
    let label_idx = sheet.column_index("Label");
    let class_idx = sheet.column_index("Class");
    let structure_idx = sheet.column_index("Structure");
    let keys_idx = sheet.require("Key Variables")?;

    let mut datasets = BTreeMap::new();
    for row in &sheet.rows {
        let Some(name) = get_string(row, Some(name_idx)) else {
            continue;
        };
        let name = name.to_uppercase();
        let class = get_string(row, class_idx)
            .and_then(|value| value.parse::<DatasetClass>().ok())
            .unwrap_or(DatasetClass::Other);
        let key_variables = get_string(row, Some(keys_idx))
            .map(|keys| split_list(&keys))
            .unwrap_or_default();
        datasets.insert(
            name.clone(),
            DatasetSpec {
                name,
                label: get_string(row, label_idx),
                class,
                structure: get_string(row, structure_idx),
                key_variables,
                variables: Vec::new(),
            },
        );
    }
    Ok(datasets)
}

fn load_variables(path: &Path, datasets: &mut BTreeMap<String, DatasetSpec>) -> Result<()> {
    let sheet = read_sheet(path)?;
    let dataset_idx = sheet.require("Dataset")?;
    let variable_idx = sheet.require("Variable")?;
    let type_column = "Data Type";
    let type_idx = sheet.require(type_column)?;
    let label_idx = sheet.column_index("Label");
    let codelist_idx = sheet.column_index("Codelist");

    for (row_number, row) in sheet.rows.iter().enumerate() {
        let (Some(dataset), Some(name)) = (
            get_string(row, Some(dataset_idx)),
            get_string(row, Some(variable_idx)),
        ) else {
            continue;
        };
        let dataset = dataset.to_uppercase();
        let raw_type = get_string(row, Some(type_idx)).unwrap_or_default();
        let column_type =
            raw_type
                .parse::<ColumnType>()
                .map_err(|_| StandardsError::InvalidValue {
                    path: path.to_path_buf(),
                    row: row_number + 2,
                    column: type_column.to_string(),
                    value: raw_type.clone(),
                })?;
        let length = get_u32(&sheet, row_number, "Length")?;
        let order = get_u32(&sheet, row_number, "Order")?;
        let spec = datasets
            .get_mut(&dataset)
            .ok_or_else(|| StandardsError::UnknownDataset {
                path: path.to_path_buf(),
                dataset: dataset.clone(),
            })?;
        spec.variables.push(VariableSpec {
            name: name.to_uppercase(),
            label: get_string(row, label_idx),
            column_type,
            length,
            order,
            codelist: get_string(row, codelist_idx),
        });
    }
    Ok(())
}

fn load_codelists(path: &Path) -> Result<BTreeMap<String, Codelist>> {
    let sheet = read_sheet(path)?;
    let id_idx = sheet.require("ID")?;
    let name_idx = sheet.column_index("Name");
    let term_idx = sheet.require("Term")?;
    let decode_idx = sheet.column_index("Decoded Value");

    let mut codelists: BTreeMap<String, Codelist> = BTreeMap::new();
    for (row_number, row) in sheet.rows.iter().enumerate() {
        let (Some(id), Some(code)) = (get_string(row, Some(id_idx)), get_string(row, Some(term_idx)))
        else {
            continue;
        };
        let decode = get_string(row, decode_idx).unwrap_or_else(|| code.clone());
        let order = get_u32(&sheet, row_number, "Order")?;
        let codelist = codelists.entry(id.clone()).or_insert_with(|| Codelist {
            id,
            name: get_string(row, name_idx),
            terms: Vec::new(),
        });
        codelist.terms.push(CodelistTerm {
            code,
            decode,
            order,
        });
    }
    Ok(codelists)
}

fn load_methods(path: &Path) -> Result<Vec<MethodSpec>> {
    let sheet = read_sheet(path)?;
    let id_idx = sheet.require("ID")?;
    let description_idx = sheet.require("Description")?;
    let expression_idx = sheet.column_index("Expression Code");

    let mut methods = Vec::new();
    for row in &sheet.rows {
        let Some(id) = get_string(row, Some(id_idx)) else {
            continue;
        };
        let (dataset, variable) = match id.split_once('.') {
            Some((dataset, variable)) => (
                Some(dataset.trim().to_uppercase()),
                Some(variable.trim().to_uppercase()),
            ),
            None => (None, None),
        };
        methods.push(MethodSpec {
            id,
            dataset,
            variable,
            description: get_string(row, Some(description_idx)).unwrap_or_default(),
            expression: get_string(row, expression_idx),
        });
    }
    Ok(methods)
}

/// Splits a comma- or whitespace-separated variable list.
fn split_list(value: &str) -> Vec<String> {
    value
        .split(|ch: char| ch == ',' || ch.is_whitespace())
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_uppercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_accepts_commas_and_spaces() {
        assert_eq!(
            split_list("STUDYID, USUBJID PARAMCD"),
            vec!["STUDYID", "USUBJID", "PARAMCD"]
        );
        assert!(split_list(" , ").is_empty());
    }
}
