use std::path::PathBuf;

use adam_derive::Stage;
use adam_model::StageReport;

/// How a stage ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageStatus {
    /// Derived, validated, and written to the output directory.
    Persisted { path: PathBuf },
    /// Derived and validated; nothing written (dry run).
    Validated,
    /// Loaded from an earlier run's output to feed a selected stage.
    Reused { path: PathBuf },
    /// Derivation, validation, or persistence failed.
    Failed { kind: String, message: String },
    /// Not attempted because an upstream stage failed.
    Skipped { upstream: Stage },
}

impl StageStatus {
    pub fn label(&self) -> &'static str {
        match self {
            StageStatus::Persisted { .. } => "written",
            StageStatus::Validated => "validated",
            StageStatus::Reused { .. } => "reused",
            StageStatus::Failed { .. } => "failed",
            StageStatus::Skipped { .. } => "skipped",
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, StageStatus::Failed { .. } | StageStatus::Skipped { .. })
    }
}

#[derive(Debug, Clone)]
pub struct StageOutcome {
    pub stage: Stage,
    pub status: StageStatus,
    pub records: Option<usize>,
    pub report: StageReport,
    pub duration_ms: u128,
}

#[derive(Debug)]
pub struct RunResult {
    pub sdtm_dir: PathBuf,
    pub output_dir: PathBuf,
    pub outcomes: Vec<StageOutcome>,
    /// `manifest.json`, absent on dry runs.
    pub manifest: Option<PathBuf>,
}

impl RunResult {
    pub fn has_failures(&self) -> bool {
        self.outcomes.iter().any(|outcome| outcome.status.is_failure())
    }

    pub fn outcome(&self, stage: Stage) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|outcome| outcome.stage == stage)
    }
}
