//! ADaM derivations.
//!
//! Each stage reads source domains from [`adam_ingest::SourceTables`] and
//! already finalized upstream [`adam_model::AnalysisTable`]s, and returns a
//! new table shaped by the analysis specification. Study constants come in
//! through [`DerivationParams`].

pub mod adae;
pub mod adlbc;
pub mod adsl;
pub mod adtte;
pub mod datetime;
pub mod flags;
pub mod frame;
pub mod params;
pub mod reader;
pub mod stage;

pub use adae::derive_adae;
pub use adlbc::derive_adlbc;
pub use adsl::derive_adsl;
pub use adtte::derive_adtte;
pub use frame::{DerivationOutput, finalize};
pub use params::{DerivationParams, MilestoneVisit, TimeToEventEndpoint};
pub use stage::Stage;
