use std::env;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use directories_next::ProjectDirs;

pub const ENV_CONFIG_DIR: &str = "FRAMEPACE_CONFIG_DIR";
pub const ENV_DATA_DIR: &str = "FRAMEPACE_DATA_DIR";
pub const ENV_CACHE_DIR: &str = "FRAMEPACE_CACHE_DIR";

const QUALIFIER: &str = "org";
const ORGANISATION: &str = "Framepace";
const APPLICATION: &str = "framepace";

#[derive(Debug, Clone)]
pub struct AppPaths {
    config_dir: PathBuf,
    data_dir: PathBuf,
    cache_dir: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let project_dirs = ProjectDirs::from(QUALIFIER, ORGANISATION, APPLICATION)
            .ok_or_else(|| anyhow!("failed to determine user directories"))?;

        let config_dir = resolve_dir(ENV_CONFIG_DIR, project_dirs.config_dir())
            .context("failed to resolve framepace config directory")?;
        let data_dir = resolve_dir(ENV_DATA_DIR, project_dirs.data_dir())
            .context("failed to resolve framepace data directory")?;
        let cache_dir = resolve_dir(ENV_CACHE_DIR, project_dirs.cache_dir())
            .context("failed to resolve framepace cache directory")?;

        Ok(Self {
            config_dir,
            data_dir,
            cache_dir,
        })
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.config_dir.join("config.toml")
    }

    pub fn weights_dir(&self) -> PathBuf {
        self.config_dir.join("weights")
    }

    pub fn samples_dir(&self) -> PathBuf {
        self.data_dir.join("samples")
    }

    /// Where `simulate` writes its final output when no path is given.
    pub fn default_output(&self) -> PathBuf {
        self.cache_dir.join("last-run.png")
    }

    pub fn last_simulation_file(&self) -> PathBuf {
        self.cache_dir.join("last-simulation.toml")
    }
}

#[cfg(test)]
impl AppPaths {
    pub fn from_raw(config_dir: PathBuf, data_dir: PathBuf, cache_dir: PathBuf) -> Self {
        Self {
            config_dir,
            data_dir,
            cache_dir,
        }
    }
}

fn resolve_dir(env_var: &str, default: &Path) -> Result<PathBuf> {
    if let Some(value) = env_override(env_var) {
        return Ok(value);
    }
    Ok(default.to_path_buf())
}

fn env_override(name: &str) -> Option<PathBuf> {
    match env::var_os(name) {
        Some(value) if !value.as_os_str().is_empty() => Some(PathBuf::from(value)),
        _ => None,
    }
}
