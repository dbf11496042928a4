//! Invariant checks for finalized ADaM datasets.
//!
//! [`validate_table`] runs the structural checks on every table, then the
//! checks specific to the dataset. Issues with
//! [`IssueSeverity::Error`](adam_model::IssueSeverity::Error) block
//! persistence of the table; warnings are only reported.

mod checks;

pub use checks::validate_table;
