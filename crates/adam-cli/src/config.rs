//! `adam.toml` configuration.
//!
//! ```toml
//! [paths]
//! sdtm_dir = "data/sdtm"
//! spec_dir = "specs/adam-pilot"
//! output_dir = "data/adam"
//!
//! [params]
//! strict_censoring = true
//! ```
//!
//! Relative paths resolve against the directory holding the file. Command-line
//! flags take precedence over file values.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use adam_derive::DerivationParams;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

pub const CONFIG_FILENAME: &str = "adam.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PathsConfig {
    pub sdtm_dir: Option<PathBuf>,
    pub spec_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdamConfig {
    pub paths: PathsConfig,
    pub params: DerivationParams,
}

impl AdamConfig {
    /// Loads the configuration for a run.
    ///
    /// An explicit `path` must exist. Without one, `adam.toml` in the current
    /// directory is used when present and defaults otherwise.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_file(path),
            None => {
                let default_path = PathBuf::from(CONFIG_FILENAME);
                match fs::read_to_string(&default_path) {
                    Ok(content) => Self::parse(&content, &default_path),
                    Err(e) if e.kind() == ErrorKind::NotFound => {
                        debug!("no {CONFIG_FILENAME} in the working directory, using defaults");
                        Ok(Self::default())
                    }
                    Err(e) => Err(e)
                        .with_context(|| format!("read config {}", default_path.display())),
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content =
            fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self> {
        let mut config: Self =
            toml::from_str(content).with_context(|| format!("parse config {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.paths.resolve_against(base);
        }
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }
}

impl PathsConfig {
    fn resolve_against(&mut self, base: &Path) {
        for dir in [&mut self.sdtm_dir, &mut self.spec_dir, &mut self.output_dir]
            .into_iter()
            .flatten()
        {
            if dir.is_relative() {
                *dir = base.join(&*dir);
            }
        }
    }
}
