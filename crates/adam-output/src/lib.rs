//! Durable storage for finalized analysis tables.
//!
//! Each table is written as `<NAME>.csv` next to a `<NAME>.json` metadata
//! sidecar holding labels and column types, so a later run can load it back
//! with the same typing. A run ends by writing `manifest.json` with record
//! counts and SHA-256 checksums of every table file.

mod atomic;
mod error;
mod hash;
mod manifest;
mod metadata;
mod store;

pub use error::{OutputError, Result};
pub use hash::{compute_file_hash, sha256_hex};
pub use manifest::{FailedStage, MANIFEST_FILE, ManifestEntry, RunManifest};
pub use metadata::TableMetadata;
pub use store::TableStore;
