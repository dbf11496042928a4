//! Derivation stages in dependency order.

use std::fmt;
use std::str::FromStr;

use adam_ingest::SdtmDomain;
use serde::{Deserialize, Serialize};

use crate::{adae, adlbc, adsl, adtte};

/// One derivation stage, producing one analysis dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Stage {
    Adsl,
    Adae,
    Adlbc,
    Adtte,
}

impl Stage {
    /// All stages; every stage follows the stages it depends on.
    pub const ALL: [Stage; 4] = [Stage::Adsl, Stage::Adae, Stage::Adlbc, Stage::Adtte];

    pub fn dataset(&self) -> &'static str {
        match self {
            Stage::Adsl => adsl::DATASET,
            Stage::Adae => adae::DATASET,
            Stage::Adlbc => adlbc::DATASET,
            Stage::Adtte => adtte::DATASET,
        }
    }

    /// Analysis datasets this stage reads.
    pub fn upstream(&self) -> &'static [Stage] {
        match self {
            Stage::Adsl => &[],
            Stage::Adae | Stage::Adlbc => &[Stage::Adsl],
            Stage::Adtte => &[Stage::Adsl, Stage::Adae],
        }
    }

    /// Source domains this stage reads.
    pub fn source_domains(&self) -> &'static [SdtmDomain] {
        match self {
            Stage::Adsl => &adsl::INPUTS,
            Stage::Adae => &adae::INPUTS,
            Stage::Adlbc => &adlbc::INPUTS,
            Stage::Adtte => &adtte::INPUTS,
        }
    }

    /// `selected` plus everything it transitively depends on, in run order.
    pub fn with_upstream(selected: &[Stage]) -> Vec<Stage> {
        let mut needed: Vec<Stage> = Vec::new();
        let mut pending: Vec<Stage> = selected.to_vec();
        while let Some(stage) = pending.pop() {
            if !needed.contains(&stage) {
                needed.push(stage);
                pending.extend_from_slice(stage.upstream());
            }
        }
        needed.sort();
        needed
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dataset())
    }
}

impl FromStr for Stage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim().to_uppercase();
        Stage::ALL
            .into_iter()
            .find(|stage| stage.dataset() == name)
            .ok_or_else(|| format!("unknown dataset: {s}"))
    }
}
