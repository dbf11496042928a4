//! Domain Loader for SDTM source tables.
//!
//! Reads raw domain CSV files into polars frames with a typed schema per
//! domain. Every blank cell becomes null, numeric columns are Float64, and
//! date/time columns are validated as (partial) ISO 8601 text.

pub mod discovery;
pub mod error;
pub mod loader;
pub mod schema;
pub mod supp;

pub use discovery::{find_domain_file, list_csv_files};
pub use error::{IngestError, Result};
pub use loader::{SourceTables, load_study, read_domain};
pub use schema::{ColumnKind, DomainSchema, SdtmDomain};
pub use supp::{QualifierMap, pivot_supplemental, qualifier_key};
