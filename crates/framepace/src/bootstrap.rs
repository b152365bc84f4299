use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use paceconfig::PaceConfig;
use tracing::{debug, info};

use crate::paths::AppPaths;

/// Configuration together with the file it came from, if any.
#[derive(Debug)]
pub struct LoadedConfig {
    pub config: PaceConfig,
    pub origin: Option<PathBuf>,
}

pub fn bootstrap_filesystem(paths: &AppPaths) -> Result<()> {
    let directories = [
        paths.config_dir().to_path_buf(),
        paths.data_dir().to_path_buf(),
        paths.cache_dir().to_path_buf(),
    ];

    for dir in directories {
        ensure_directory(&dir)?;
    }
    Ok(())
}

/// Loads `explicit`, else `config.toml` from the config directory, else the
/// built-in defaults resolved against the config directory.
pub fn load_config(paths: &AppPaths, explicit: Option<&Path>) -> Result<LoadedConfig> {
    if let Some(path) = explicit {
        let config = PaceConfig::load(path)
            .with_context(|| format!("failed to load configuration from {}", path.display()))?;
        debug!(path = %path.display(), "loaded configuration");
        return Ok(LoadedConfig {
            config,
            origin: Some(path.to_path_buf()),
        });
    }

    let default_path = paths.config_file();
    if default_path.exists() {
        let config = PaceConfig::load(&default_path).with_context(|| {
            format!(
                "failed to load configuration from {}",
                default_path.display()
            )
        })?;
        debug!(path = %default_path.display(), "loaded configuration");
        return Ok(LoadedConfig {
            config,
            origin: Some(default_path),
        });
    }

    let mut config = PaceConfig::default();
    config.resolve_relative_to(paths.config_dir());
    info!(
        expected = %default_path.display(),
        "no configuration file found; using built-in defaults"
    );
    Ok(LoadedConfig {
        config,
        origin: None,
    })
}

fn ensure_directory(path: &Path) -> Result<()> {
    if path.exists() {
        if path.is_dir() {
            debug!(path = %path.display(), "reusing existing directory");
            Ok(())
        } else {
            bail!("filesystem entry at {} is not a directory", path.display());
        }
    } else {
        fs::create_dir_all(path).with_context(|| {
            format!("failed to create framepace directory at {}", path.display())
        })?;
        info!(path = %path.display(), "created framepace directory");
        Ok(())
    }
}
