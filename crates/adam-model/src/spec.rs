//! Analysis dataset specifications.
//!
//! A specification declares, per output dataset, the variables to keep (with
//! order, labels, and storage type), the key sort order, and the codelists
//! used for controlled terminology and category groupings.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{DerivationError, Result};
use crate::terminology::Codelist;
use crate::value::ColumnType;

/// ADaM dataset class per ADaMIG.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum DatasetClass {
    /// One record per subject.
    SubjectLevel,
    /// One or more records per subject, parameter, and timepoint.
    BasicDataStructure,
    /// Occurrence data such as adverse events.
    Occurrence,
    /// Time-to-event subclass of BDS.
    TimeToEvent,
    Other,
}

impl DatasetClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            DatasetClass::SubjectLevel => "SUBJECT LEVEL ANALYSIS DATASET",
            DatasetClass::BasicDataStructure => "BASIC DATA STRUCTURE",
            DatasetClass::Occurrence => "OCCURRENCE DATA STRUCTURE",
            DatasetClass::TimeToEvent => "TIME-TO-EVENT",
            DatasetClass::Other => "OTHER",
        }
    }
}

impl fmt::Display for DatasetClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DatasetClass {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized = s.trim().to_uppercase();
        Ok(match normalized.as_str() {
            "ADSL" | "SUBJECT LEVEL ANALYSIS DATASET" => DatasetClass::SubjectLevel,
            "BDS" | "BASIC DATA STRUCTURE" => DatasetClass::BasicDataStructure,
            "OCCDS" | "OCCURRENCE DATA STRUCTURE" | "ADAM OTHER" => DatasetClass::Occurrence,
            "TTE" | "TIME-TO-EVENT" | "TIME TO EVENT" => DatasetClass::TimeToEvent,
            _ => DatasetClass::Other,
        })
    }
}

/// Declared variable of an output dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VariableSpec {
    pub name: String,
    pub label: Option<String>,
    pub column_type: ColumnType,
    pub length: Option<u32>,
    /// Position within the dataset (1-based).
    pub order: Option<u32>,
    /// Codelist identifier for controlled terminology.
    pub codelist: Option<String>,
}

/// Declared output dataset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSpec {
    pub name: String,
    pub label: Option<String>,
    pub class: DatasetClass,
    pub structure: Option<String>,
    /// Key variables in sort order.
    pub key_variables: Vec<String>,
    pub variables: Vec<VariableSpec>,
}

impl DatasetSpec {
    /// Variables in declared order; variables without an order keep their
    /// position after the ordered ones.
    pub fn ordered_variables(&self) -> Vec<&VariableSpec> {
        let mut ordered: Vec<(usize, &VariableSpec)> = self.variables.iter().enumerate().collect();
        ordered.sort_by_key(|(position, variable)| (variable.order.unwrap_or(u32::MAX), *position));
        ordered.into_iter().map(|(_, variable)| variable).collect()
    }

    pub fn variable_names(&self) -> Vec<String> {
        self.ordered_variables()
            .into_iter()
            .map(|variable| variable.name.clone())
            .collect()
    }

    pub fn variable(&self, name: &str) -> Option<&VariableSpec> {
        self.variables
            .iter()
            .find(|variable| variable.name.eq_ignore_ascii_case(name))
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.variable(name).map(|variable| variable.column_type)
    }
}

/// A derivation method description attached to a dataset or variable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodSpec {
    /// Method identifier, usually `DATASET.VARIABLE`.
    pub id: String,
    pub dataset: Option<String>,
    pub variable: Option<String>,
    pub description: String,
    pub expression: Option<String>,
}

/// The full specification document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisSpec {
    pub datasets: BTreeMap<String, DatasetSpec>,
    pub codelists: BTreeMap<String, Codelist>,
    #[serde(default)]
    pub methods: Vec<MethodSpec>,
}

impl AnalysisSpec {
    pub fn dataset(&self, name: &str) -> Result<&DatasetSpec> {
        self.datasets
            .get(&name.to_uppercase())
            .ok_or_else(|| DerivationError::MissingSpec {
                dataset: name.to_uppercase(),
            })
    }

    /// Looks up a codelist on behalf of `dataset`.
    pub fn codelist(&self, dataset: &str, id: &str) -> Result<&Codelist> {
        self.codelists
            .get(id)
            .ok_or_else(|| DerivationError::MissingCodelist {
                dataset: dataset.to_string(),
                codelist: id.to_string(),
            })
    }

    /// Codelist declared for `dataset.variable`, falling back to a codelist
    /// named after the variable.
    pub fn variable_codelist(&self, dataset: &str, variable: &str) -> Result<&Codelist> {
        let declared = self
            .dataset(dataset)
            .ok()
            .and_then(|spec| spec.variable(variable))
            .and_then(|spec| spec.codelist.clone());
        self.codelist(dataset, declared.as_deref().unwrap_or(variable))
    }
}
