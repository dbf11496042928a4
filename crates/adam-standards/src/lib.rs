#![deny(unsafe_code)]

//! Loading of analysis dataset specifications.
//!
//! A specification directory holds CSV sheets exported from a define or
//! metacore workbook: `Datasets.csv`, `Variables.csv`, `Codelists.csv` and an
//! optional `Methods.csv`.

pub mod csv_utils;
pub mod error;
pub mod inventory;
pub mod loader;
pub mod paths;

pub use crate::error::{Result, StandardsError};
pub use crate::inventory::{
    DatasetDependencies, DatasetInventoryEntry, DatasetPurpose, KeyVariable, dataset_inventory,
};
pub use crate::loader::load_analysis_spec;
pub use crate::paths::default_spec_dir;
