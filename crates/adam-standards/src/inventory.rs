//! Dataset inventory and inter-dataset dependency analysis.
//!
//! Dependencies are read from derivation method text: explicit
//! `DATASET.VARIABLE` references and phrases such as "from ADSL" or
//! "merge ... ADSL" both count. Purposes are inferred from the dataset name,
//! label and class.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use adam_model::{AnalysisSpec, DatasetClass, DatasetSpec};
use regex::Regex;
use serde::Serialize;

/// `DATASET.VARIABLE` references in method text.
static DATASET_VARIABLE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Z]{2,5})\.([A-Z][A-Z0-9]+)\b").expect("Invalid dataset reference regex")
});

/// Upstream datasets referenced by one dataset's methods.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DatasetDependencies {
    /// Analysis datasets declared in the same specification.
    pub analysis: BTreeSet<String>,
    /// Other referenced datasets (SDTM domains).
    pub source: BTreeSet<String>,
}

/// Analysis purpose a dataset supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum DatasetPurpose {
    Efficacy,
    Safety,
    SubjectCharacteristics,
    PharmacokineticsDynamics,
    PrimaryObjective,
}

impl DatasetPurpose {
    pub const ALL: [DatasetPurpose; 5] = [
        DatasetPurpose::Efficacy,
        DatasetPurpose::Safety,
        DatasetPurpose::SubjectCharacteristics,
        DatasetPurpose::PharmacokineticsDynamics,
        DatasetPurpose::PrimaryObjective,
    ];

    pub fn label(self) -> &'static str {
        match self {
            DatasetPurpose::Efficacy => "Efficacy",
            DatasetPurpose::Safety => "Safety",
            DatasetPurpose::SubjectCharacteristics => "Baseline or other subject characteristics",
            DatasetPurpose::PharmacokineticsDynamics => "PK/PD",
            DatasetPurpose::PrimaryObjective => "Primary Objective",
        }
    }
}

impl fmt::Display for DatasetPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A key variable with its label from the variables sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyVariable {
    pub name: String,
    pub label: Option<String>,
}

/// One row of the dataset inventory.
#[derive(Debug, Clone, Serialize)]
pub struct DatasetInventoryEntry {
    pub name: String,
    pub label: Option<String>,
    pub class: DatasetClass,
    pub structure: Option<String>,
    pub purposes: BTreeSet<DatasetPurpose>,
    pub key_variables: Vec<KeyVariable>,
    pub variable_count: usize,
    pub dependencies: DatasetDependencies,
}

/// Builds the inventory of all declared datasets, in name order.
pub fn dataset_inventory(spec: &AnalysisSpec) -> Vec<DatasetInventoryEntry> {
    let dependencies = method_dependencies(spec);
    spec.datasets
        .values()
        .map(|dataset| DatasetInventoryEntry {
            name: dataset.name.clone(),
            label: dataset.label.clone(),
            class: dataset.class,
            structure: dataset.structure.clone(),
            purposes: dataset_purposes(dataset),
            key_variables: key_variables(dataset),
            variable_count: dataset.variables.len(),
            dependencies: dependencies.get(&dataset.name).cloned().unwrap_or_default(),
        })
        .collect()
}

fn key_variables(dataset: &DatasetSpec) -> Vec<KeyVariable> {
    dataset
        .key_variables
        .iter()
        .map(|name| KeyVariable {
            name: name.clone(),
            label: dataset
                .variable(name)
                .and_then(|variable| variable.label.clone()),
        })
        .collect()
}

/// Infers the analysis purposes of a dataset.
///
/// The subject-level dataset only carries subject characteristics. Other
/// datasets are matched on name prefixes and label keywords; keywords of two
/// letters ("AE", "PK") must appear as whole words.
pub fn dataset_purposes(dataset: &DatasetSpec) -> BTreeSet<DatasetPurpose> {
    let name = dataset.name.to_lowercase();
    let label = dataset.label.as_deref().unwrap_or_default().to_lowercase();
    let words: Vec<&str> = label
        .split(|ch: char| !ch.is_ascii_alphanumeric())
        .filter(|word| !word.is_empty())
        .collect();
    let named = |prefixes: &[&str]| prefixes.iter().any(|prefix| name.contains(prefix));
    let mentions = |keywords: &[&str]| {
        keywords.iter().any(|keyword| {
            if keyword.len() <= 2 {
                words.contains(keyword)
            } else {
                label.contains(keyword)
            }
        })
    };

    let mut purposes = BTreeSet::new();
    if name == "adsl" || dataset.class == DatasetClass::SubjectLevel {
        purposes.insert(DatasetPurpose::SubjectCharacteristics);
        return purposes;
    }

    let safety_label = mentions(&["adverse", "ae", "safety", "conmed", "medication", "vital"]);
    if named(&["adae", "adcm", "advs"]) || safety_label {
        purposes.insert(DatasetPurpose::Safety);
    }
    if named(&["adeff", "adas", "admh", "adqs"])
        || mentions(&["efficacy", "adas", "mmse", "response", "outcome", "endpoint"])
    {
        purposes.insert(DatasetPurpose::Efficacy);
    }
    if named(&["adtte"]) || dataset.class == DatasetClass::TimeToEvent || mentions(&["time"]) {
        if mentions(&["adverse", "ae", "safety"]) {
            purposes.insert(DatasetPurpose::Safety);
        } else {
            purposes.insert(DatasetPurpose::Efficacy);
        }
    }
    if named(&["adlb"]) {
        purposes.insert(DatasetPurpose::Efficacy);
        purposes.insert(DatasetPurpose::Safety);
    }
    if named(&["adpc", "adpp", "adpk"])
        || mentions(&["pk", "pd", "pharmacokinetic", "pharmacodynamic", "concentration"])
    {
        purposes.insert(DatasetPurpose::PharmacokineticsDynamics);
    }
    if mentions(&["primary"]) {
        purposes.insert(DatasetPurpose::PrimaryObjective);
    }
    purposes
}

/// Maps each declared dataset to the datasets its methods reference.
pub fn method_dependencies(spec: &AnalysisSpec) -> BTreeMap<String, DatasetDependencies> {
    let declared: BTreeSet<&str> = spec.datasets.keys().map(String::as_str).collect();
    let phrases: Vec<(&str, Regex)> = declared
        .iter()
        .filter_map(|name| phrase_pattern(name).map(|pattern| (*name, pattern)))
        .collect();

    let mut dependencies: BTreeMap<String, DatasetDependencies> = declared
        .iter()
        .map(|name| ((*name).to_string(), DatasetDependencies::default()))
        .collect();

    for method in &spec.methods {
        let Some(target) = method.dataset.as_deref() else {
            continue;
        };
        let Some(entry) = dependencies.get_mut(target) else {
            continue;
        };
        let texts = std::iter::once(method.description.as_str()).chain(method.expression.as_deref());
        for text in texts {
            for captures in DATASET_VARIABLE_REGEX.captures_iter(text) {
                let dataset = &captures[1];
                if dataset == target {
                    continue;
                }
                if declared.contains(dataset) {
                    entry.analysis.insert(dataset.to_string());
                } else if dataset.len() == 2 || dataset.starts_with("SUPP") {
                    entry.source.insert(dataset.to_string());
                }
            }
            for (dataset, pattern) in &phrases {
                if *dataset != target && pattern.is_match(text) {
                    entry.analysis.insert((*dataset).to_string());
                }
            }
        }
    }
    dependencies
}

fn phrase_pattern(dataset: &str) -> Option<Regex> {
    let name = regex::escape(dataset);
    Regex::new(&format!(
        r"(?i)\bfrom\s+{name}\b|\b{name}\s+(dataset|data|table)\b|\b(join|merge)\b.*\b{name}\b"
    ))
    .ok()
}
