//! Shared data model for ADaM analysis dataset derivation.
//!
//! Holds the scalar [`Value`] type used by row-level derivations, the
//! specification types that declare every output dataset, the finalized
//! [`AnalysisTable`], and the error and issue types reported by each stage.

pub mod error;
pub mod issue;
pub mod numeric;
pub mod polars;
pub mod spec;
pub mod table;
pub mod terminology;
pub mod value;

pub use error::{DerivationError, Result};
pub use issue::{DataQualityIssue, IssueSeverity, StageReport};
pub use numeric::round_half_up;
pub use spec::{AnalysisSpec, DatasetClass, DatasetSpec, MethodSpec, VariableSpec};
pub use table::{AnalysisTable, ColumnMeta};
pub use terminology::{Codelist, CodelistTerm, Grouping};
pub use value::{ColumnType, Record, Value};
