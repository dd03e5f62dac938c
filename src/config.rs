// Sweep settings that may be overridden without touching the command line.
//
// Priority order (highest to lowest):
// 1. Environment variables with the VSBENCH_ prefix (VSBENCH_QUERYS, VSBENCH_NQ, VSBENCH_TOPKS)
// 2. Properties file (`key=value` lines: querys, nq, topks)
// 3. Legacy `QUERYS` environment variable (repetitions only, numeric values only)
// 4. Built-in defaults

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

use crate::workload::parse_list;

pub const DEFAULT_REPETITIONS: usize = 10;
pub const DEFAULT_BATCH_SIZES: &str = "1,10,30,50";
pub const DEFAULT_TOP_KS: &str = "10,100,500,1024";
pub const DEFAULT_PROPERTIES_FILE: &str = "conf.properties";

const ENV_PREFIX: &str = "VSBENCH";
const LEGACY_REPETITIONS_VAR: &str = "QUERYS";

/// Raw values as they appear in the sources; lists stay comma-separated strings.
#[derive(Debug, Deserialize)]
struct RawSettings {
    querys: usize,
    nq: String,
    topks: String,
}

/// Resolved repetitions, batch sizes and topK values for a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepSettings {
    pub repetitions: usize,
    pub batch_sizes: Vec<usize>,
    pub top_ks: Vec<usize>,
}

impl Default for SweepSettings {
    fn default() -> Self {
        Self {
            repetitions: DEFAULT_REPETITIONS,
            batch_sizes: vec![1, 10, 30, 50],
            top_ks: vec![10, 100, 500, 1024],
        }
    }
}

impl SweepSettings {
    /// Load settings from the properties file (if it exists) and the environment.
    pub fn load(properties: Option<&Path>) -> Result<Self> {
        let legacy = std::env::var(LEGACY_REPETITIONS_VAR).ok();
        Self::from_sources(properties, legacy)
    }

    pub(crate) fn from_sources(properties: Option<&Path>, legacy_querys: Option<String>) -> Result<Self> {
        // Non-numeric values are ignored, as they always have been.
        let legacy_querys = legacy_querys.and_then(|v| match v.trim().parse::<u64>() {
            Ok(querys) => Some(querys),
            Err(_) => {
                tracing::warn!(value = %v, "ignoring non-numeric {}", LEGACY_REPETITIONS_VAR);
                None
            }
        });

        let mut builder = config::Config::builder()
            .set_default("querys", legacy_querys.unwrap_or(DEFAULT_REPETITIONS as u64))?
            .set_default("nq", DEFAULT_BATCH_SIZES)?
            .set_default("topks", DEFAULT_TOP_KS)?;

        if let Some(path) = properties {
            if path.exists() {
                tracing::info!(path = %path.display(), "loading sweep overrides");
            }
            builder = builder.add_source(
                config::File::from(path.to_path_buf())
                    .format(config::FileFormat::Ini)
                    .required(false),
            );
        }

        builder = builder.add_source(config::Environment::with_prefix(ENV_PREFIX));

        let raw: RawSettings = builder
            .build()
            .context("Failed to build sweep settings")?
            .try_deserialize()
            .context("Failed to deserialize sweep settings")?;

        let settings = Self {
            repetitions: raw.querys,
            batch_sizes: parse_list(&raw.nq).context("invalid nq list")?,
            top_ks: parse_list(&raw.topks).context("invalid topks list")?,
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        anyhow::ensure!(self.repetitions > 0, "querys must be > 0, got {}", self.repetitions);
        anyhow::ensure!(!self.batch_sizes.is_empty(), "nq list cannot be empty");
        anyhow::ensure!(!self.top_ks.is_empty(), "topks list cannot be empty");
        anyhow::ensure!(
            !self.batch_sizes.contains(&0),
            "nq values must be > 0, got {:?}",
            self.batch_sizes
        );
        anyhow::ensure!(
            !self.top_ks.contains(&0),
            "topk values must be > 0, got {:?}",
            self.top_ks
        );
        Ok(())
    }
}
