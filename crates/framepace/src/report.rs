use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Outcome of a `simulate` session, kept in the cache directory so
/// `defaults where` can show the last one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationReport {
    pub source: PathBuf,
    pub output: Option<PathBuf>,
    pub frames: u64,
    pub completed_runs: u64,
    pub final_budget: f32,
    pub min_budget: f32,
    pub max_budget: f32,
    pub mean_frame_ms: f64,
    pub max_frame_ms: f64,
    pub submissions: u64,
    pub commands: u64,
    pub status: String,
}

impl SimulationReport {
    /// Average number of frames one run was spread across.
    pub fn frames_per_run(&self) -> Option<f64> {
        (self.completed_runs > 0).then(|| self.frames as f64 / self.completed_runs as f64)
    }

    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(path)
            .with_context(|| format!("failed to read report at {}", path.display()))?;
        let report: Self = toml::from_str(&contents)
            .with_context(|| format!("failed to parse report at {}", path.display()))?;
        Ok(Some(report))
    }

    pub fn persist(&self, path: &Path) -> Result<()> {
        let dir = path
            .parent()
            .ok_or_else(|| anyhow!("report path has no parent: {}", path.display()))?;
        fs::create_dir_all(dir).with_context(|| {
            format!("failed to prepare directory for report at {}", dir.display())
        })?;
        let serialized =
            toml::to_string_pretty(self).context("failed to serialize report to TOML")?;
        fs::write(path, serialized)
            .with_context(|| format!("failed to write report to {}", path.display()))?;
        Ok(())
    }
}
