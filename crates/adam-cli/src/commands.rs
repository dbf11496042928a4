use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use comfy_table::Table;

use adam_cli::config::AdamConfig;
use adam_cli::pipeline::{PipelineOptions, run_pipeline};
use adam_cli::types::RunResult;
use adam_derive::Stage;
use adam_standards::{dataset_inventory, default_spec_dir, load_analysis_spec};

use crate::cli::{DatasetsArgs, DeriveArgs};
use crate::summary::apply_table_style;

/// Default output directory name under the SDTM directory.
const DEFAULT_OUTPUT_SUBDIR: &str = "adam";

pub fn run_derive(args: &DeriveArgs) -> Result<RunResult> {
    let options = derive_options(args)?;
    run_pipeline(&options)
}

/// Merges command-line flags over the configuration file.
pub fn derive_options(args: &DeriveArgs) -> Result<PipelineOptions> {
    let config = AdamConfig::load(args.config.as_deref())?;
    let sdtm_dir = args
        .sdtm_dir
        .clone()
        .or(config.paths.sdtm_dir)
        .ok_or_else(|| anyhow!("no SDTM directory: pass --sdtm-dir or set paths.sdtm_dir"))?;
    let spec_dir = args
        .spec_dir
        .clone()
        .or(config.paths.spec_dir)
        .unwrap_or_else(default_spec_dir);
    let output_dir = args
        .output_dir
        .clone()
        .or(config.paths.output_dir)
        .unwrap_or_else(|| sdtm_dir.join(DEFAULT_OUTPUT_SUBDIR));
    let stages = args
        .datasets
        .iter()
        .map(|name| name.parse::<Stage>().map_err(|e| anyhow!(e)))
        .collect::<Result<Vec<_>>>()
        .context("parse --dataset")?;
    let mut params = config.params;
    if args.strict {
        params.strict_censoring = true;
    }
    Ok(PipelineOptions {
        sdtm_dir,
        spec_dir,
        output_dir,
        stages,
        params,
        dry_run: args.dry_run,
    })
}

pub fn run_datasets(args: &DatasetsArgs) -> Result<()> {
    let config = AdamConfig::load(args.config.as_deref())?;
    let spec_dir: PathBuf = args
        .spec_dir
        .clone()
        .or(config.paths.spec_dir)
        .unwrap_or_else(default_spec_dir);
    let spec = load_analysis_spec(&spec_dir)
        .with_context(|| format!("load analysis specification from {}", spec_dir.display()))?;

    let mut table = Table::new();
    table.set_header(vec![
        "Dataset",
        "Label",
        "Class",
        "Purpose",
        "Keys",
        "Variables",
        "Depends on",
    ]);
    apply_table_style(&mut table);
    for entry in dataset_inventory(&spec) {
        let depends_on: Vec<String> = entry
            .dependencies
            .analysis
            .iter()
            .chain(entry.dependencies.source.iter())
            .cloned()
            .collect();
        let purposes: Vec<&str> = entry.purposes.iter().map(|purpose| purpose.label()).collect();
        let keys: Vec<String> = entry
            .key_variables
            .iter()
            .map(|key| match &key.label {
                Some(label) => format!("{} ({label})", key.name),
                None => key.name.clone(),
            })
            .collect();
        table.add_row(vec![
            entry.name,
            entry.label.unwrap_or_default(),
            entry.class.to_string(),
            purposes.join("\n"),
            keys.join("\n"),
            entry.variable_count.to_string(),
            if depends_on.is_empty() {
                "-".to_string()
            } else {
                depends_on.join(", ")
            },
        ]);
    }
    println!("{table}");
    Ok(())
}
