//! Stage orchestration.
//!
//! Stages run one after another in dependency order:
//! 1. **Plan**: selected datasets plus their upstream datasets
//! 2. **Load**: source domains for every stage that will be derived
//! 3. **Derive**: build the table from sources and upstream tables
//! 4. **Validate**: structural and dataset invariants; errors block the table
//! 5. **Persist**: CSV, metadata sidecar, and finally the run manifest
//!
//! A failed stage never stops the run; stages that depend on it are skipped.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Instant;

use adam_derive::{
    DerivationOutput, DerivationParams, Stage, derive_adae, derive_adlbc, derive_adsl,
    derive_adtte,
};
use adam_ingest::{SdtmDomain, SourceTables, load_study};
use adam_model::{AnalysisSpec, AnalysisTable, DerivationError, IssueSeverity, StageReport};
use adam_output::{ManifestEntry, RunManifest, TableStore};
use adam_standards::load_analysis_spec;
use adam_validate::validate_table;
use anyhow::{Context, Result};
use tracing::{debug, error, info, info_span, warn};

use crate::types::{RunResult, StageOutcome, StageStatus};

/// Resolved inputs for one pipeline run.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub sdtm_dir: PathBuf,
    pub spec_dir: PathBuf,
    pub output_dir: PathBuf,
    /// Requested stages; empty means all.
    pub stages: Vec<Stage>,
    pub params: DerivationParams,
    pub dry_run: bool,
}

/// Which stages run and which are read back from the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagePlan {
    pub derive: Vec<Stage>,
    pub reuse: Vec<Stage>,
}

/// Expands the requested stages with their upstream stages.
///
/// Upstream stages that were not requested are reused when an earlier run
/// stored them, and derived otherwise.
pub fn plan_stages(requested: &[Stage], store: &TableStore) -> StagePlan {
    let requested: Vec<Stage> = if requested.is_empty() {
        Stage::ALL.to_vec()
    } else {
        requested.to_vec()
    };
    let mut plan = StagePlan {
        derive: Vec::new(),
        reuse: Vec::new(),
    };
    for stage in Stage::with_upstream(&requested) {
        if !requested.contains(&stage) && store.contains(stage.dataset()) {
            plan.reuse.push(stage);
        } else {
            plan.derive.push(stage);
        }
    }
    plan
}

/// Source domains needed by `stages`, without duplicates.
pub fn required_domains(stages: &[Stage]) -> Vec<SdtmDomain> {
    let mut domains: Vec<SdtmDomain> = Vec::new();
    for stage in stages {
        for domain in stage.source_domains() {
            if !domains.contains(domain) {
                domains.push(*domain);
            }
        }
    }
    domains.sort();
    domains
}

pub fn run_pipeline(options: &PipelineOptions) -> Result<RunResult> {
    let run_span = info_span!("run", sdtm_dir = %options.sdtm_dir.display());
    let _run_guard = run_span.enter();
    let run_start = Instant::now();

    let spec = load_analysis_spec(&options.spec_dir).with_context(|| {
        format!(
            "load analysis specification from {}",
            options.spec_dir.display()
        )
    })?;
    let store = TableStore::new(&options.output_dir);
    let plan = plan_stages(&options.stages, &store);
    debug!(derive = ?plan.derive, reuse = ?plan.reuse, "stage plan");

    let domains = required_domains(&plan.derive);
    let sources = info_span!("load").in_scope(|| {
        load_study(&options.sdtm_dir, &domains)
            .with_context(|| format!("load SDTM domains from {}", options.sdtm_dir.display()))
    })?;

    let mut tables: BTreeMap<Stage, AnalysisTable> = BTreeMap::new();
    let mut outcomes = Vec::new();
    let mut manifest = RunManifest::new(env!("CARGO_PKG_VERSION"));
    manifest.sdtm_dir = Some(options.sdtm_dir.clone());
    manifest.spec_dir = Some(options.spec_dir.clone());

    for &stage in &plan.reuse {
        let start = Instant::now();
        let path = store.table_path(stage.dataset());
        let outcome = match store.load(stage.dataset()) {
            Ok(table) => {
                info!(dataset = %stage, records = table.record_count(), "reusing stored table");
                let records = table.record_count();
                tables.insert(stage, table);
                StageOutcome {
                    stage,
                    status: StageStatus::Reused { path },
                    records: Some(records),
                    report: StageReport::new(stage.dataset()),
                    duration_ms: start.elapsed().as_millis(),
                }
            }
            Err(e) => {
                error!(dataset = %stage, error = %e, "stored table could not be read");
                StageOutcome {
                    stage,
                    status: StageStatus::Failed {
                        kind: "storage".to_string(),
                        message: e.to_string(),
                    },
                    records: None,
                    report: StageReport::new(stage.dataset()),
                    duration_ms: start.elapsed().as_millis(),
                }
            }
        };
        outcomes.push(outcome);
    }

    for &stage in &plan.derive {
        let run = run_stage(
            stage,
            &sources,
            &spec,
            &options.params,
            &store,
            options.dry_run,
            &mut tables,
        );
        match &run.outcome.status {
            StageStatus::Failed { kind, message } => {
                manifest.record_failure(stage.dataset(), kind, message.clone());
            }
            StageStatus::Skipped { upstream } => {
                manifest.record_failure(
                    stage.dataset(),
                    "skipped",
                    format!("upstream dataset {upstream} is not available"),
                );
            }
            StageStatus::Persisted { .. }
            | StageStatus::Validated
            | StageStatus::Reused { .. } => {}
        }
        if let Some(entry) = run.manifest_entry {
            manifest.record_table(stage.dataset(), entry);
        }
        outcomes.push(run.outcome);
    }
    outcomes.sort_by_key(|outcome| outcome.stage);

    let manifest_path = if options.dry_run {
        None
    } else {
        Some(store.write_manifest(&manifest).context("write run manifest")?)
    };

    info!(
        stages = outcomes.len(),
        failed = outcomes.iter().filter(|o| o.status.is_failure()).count(),
        duration_ms = run_start.elapsed().as_millis(),
        "pipeline complete"
    );
    Ok(RunResult {
        sdtm_dir: options.sdtm_dir.clone(),
        output_dir: options.output_dir.clone(),
        outcomes,
        manifest: manifest_path,
    })
}

struct StageRun {
    outcome: StageOutcome,
    manifest_entry: Option<ManifestEntry>,
}

fn run_stage(
    stage: Stage,
    sources: &SourceTables,
    spec: &AnalysisSpec,
    params: &DerivationParams,
    store: &TableStore,
    dry_run: bool,
    tables: &mut BTreeMap<Stage, AnalysisTable>,
) -> StageRun {
    let span = info_span!("stage", dataset = %stage);
    let _guard = span.enter();
    let start = Instant::now();
    let mut report = StageReport::new(stage.dataset());
    let finish = |status: StageStatus, records: Option<usize>, report: StageReport| StageOutcome {
        stage,
        status,
        records,
        report,
        duration_ms: start.elapsed().as_millis(),
    };

    if let Some(&upstream) = stage
        .upstream()
        .iter()
        .find(|upstream| !tables.contains_key(*upstream))
    {
        warn!(upstream = %upstream, "skipping stage, upstream dataset unavailable");
        return StageRun {
            outcome: finish(StageStatus::Skipped { upstream }, None, report),
            manifest_entry: None,
        };
    }

    let derived = derive_stage(stage, sources, tables, spec, params).and_then(|output| {
        let dataset_spec = spec.dataset(stage.dataset())?;
        let validation = validate_table(dataset_spec, &output.table)?;
        Ok((output, validation))
    });
    let (output, validation) = match derived {
        Ok(result) => result,
        Err(e) => {
            error!(kind = e.kind(), error = %e, "derivation failed");
            let status = StageStatus::Failed {
                kind: e.kind().to_string(),
                message: e.to_string(),
            };
            return StageRun {
                outcome: finish(status, None, report),
                manifest_entry: None,
            };
        }
    };

    report.extend(output.issues);
    report.extend(validation.issues);
    log_issues(&report);
    let table = output.table;
    let records = table.record_count();

    if report.has_errors() {
        let e = DerivationError::ValidationFailed {
            dataset: stage.dataset().to_string(),
            count: report.error_count(),
        };
        error!(error = %e, "table not written");
        let status = StageStatus::Failed {
            kind: e.kind().to_string(),
            message: e.to_string(),
        };
        return StageRun {
            outcome: finish(status, Some(records), report),
            manifest_entry: None,
        };
    }

    let (status, manifest_entry) = if dry_run {
        (StageStatus::Validated, None)
    } else {
        match store.persist(&table) {
            Ok(entry) => (
                StageStatus::Persisted {
                    path: store.table_path(stage.dataset()),
                },
                Some(entry),
            ),
            Err(e) => {
                error!(error = %e, "table could not be written");
                let status = StageStatus::Failed {
                    kind: "storage".to_string(),
                    message: e.to_string(),
                };
                return StageRun {
                    outcome: finish(status, Some(records), report),
                    manifest_entry: None,
                };
            }
        }
    };

    info!(
        records,
        warnings = report.warning_count(),
        duration_ms = start.elapsed().as_millis(),
        "stage complete"
    );
    tables.insert(stage, table);
    StageRun {
        outcome: finish(status, Some(records), report),
        manifest_entry,
    }
}

fn derive_stage(
    stage: Stage,
    sources: &SourceTables,
    tables: &BTreeMap<Stage, AnalysisTable>,
    spec: &AnalysisSpec,
    params: &DerivationParams,
) -> adam_model::Result<DerivationOutput> {
    let upstream = |needed: Stage| {
        tables
            .get(&needed)
            .ok_or_else(|| DerivationError::MissingInput {
                dataset: stage.dataset().to_string(),
                table: needed.dataset().to_string(),
            })
    };
    match stage {
        Stage::Adsl => derive_adsl(sources, spec, params),
        Stage::Adae => derive_adae(sources, upstream(Stage::Adsl)?, spec, params),
        Stage::Adlbc => derive_adlbc(sources, upstream(Stage::Adsl)?, spec, params),
        Stage::Adtte => derive_adtte(
            sources,
            upstream(Stage::Adsl)?,
            upstream(Stage::Adae)?,
            spec,
            params,
        ),
    }
}

fn log_issues(report: &StageReport) {
    for issue in &report.issues {
        match issue.severity {
            IssueSeverity::Error => error!(rule = %issue.rule, "{}", issue.message),
            IssueSeverity::Warning => warn!(rule = %issue.rule, "{}", issue.message),
            IssueSeverity::Note => info!(rule = %issue.rule, "{}", issue.message),
        }
        if !issue.keys.is_empty() {
            debug!(rule = %issue.rule, keys = ?issue.keys, "affected records");
        }
    }
}
