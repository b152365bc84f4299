use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use convnet::{write_weights, Texture, TextureError, WeightTable};
use paceconfig::{PaceConfig, DEFAULT_CONFIG_TOML};
use tracing::{debug, info};

use crate::paths::AppPaths;

const SAMPLE_SIZE: u32 = 256;

#[derive(Debug, Default)]
pub struct InitReport {
    pub written: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
}

impl InitReport {
    pub fn wrote_any(&self) -> bool {
        !self.written.is_empty()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InitOptions {
    pub force: bool,
}

/// Installs the starter configuration, the identity weight table it points
/// at, and a gradient sample image to feed `simulate`.
pub fn init_defaults(paths: &AppPaths, options: InitOptions) -> Result<InitReport> {
    let mut report = InitReport::default();

    let config_path = paths.config_file();
    install(&config_path, options, &mut report, |path| {
        fs::write(path, DEFAULT_CONFIG_TOML)
            .with_context(|| format!("failed to write {}", path.display()))
    })?;

    let weights_path = starter_weights_path(paths)?;
    install(&weights_path, options, &mut report, |path| {
        write_weights(path, &WeightTable::identity())
            .with_context(|| format!("failed to write {}", path.display()))
    })?;

    let sample_path = sample_image_path(paths);
    install(&sample_path, options, &mut report, |path| {
        gradient(SAMPLE_SIZE, SAMPLE_SIZE)?
            .save(path)
            .with_context(|| format!("failed to write {}", path.display()))
    })?;

    Ok(report)
}

pub fn sample_image_path(paths: &AppPaths) -> PathBuf {
    paths.samples_dir().join("gradient.png")
}

/// Weight path the starter configuration refers to, resolved the way the
/// config loader resolves it.
fn starter_weights_path(paths: &AppPaths) -> Result<PathBuf> {
    let mut config =
        PaceConfig::from_toml_str(DEFAULT_CONFIG_TOML).context("starter configuration is invalid")?;
    config.resolve_relative_to(paths.config_dir());
    Ok(config.generator.weights)
}

fn install<F>(path: &Path, options: InitOptions, report: &mut InitReport, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    if path.exists() && !options.force {
        debug!(path = %path.display(), "keeping existing file");
        report.skipped.push(path.to_path_buf());
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    write(path)?;
    info!(path = %path.display(), "installed default");
    report.written.push(path.to_path_buf());
    Ok(())
}

fn gradient(width: u32, height: u32) -> Result<Texture, TextureError> {
    let mut data = Vec::with_capacity((width * height * 3) as usize);
    for y in 0..height {
        for x in 0..width {
            let u = x as f32 / (width.max(2) - 1) as f32;
            let v = y as f32 / (height.max(2) - 1) as f32;
            data.extend_from_slice(&[u, v, 1.0 - 0.5 * (u + v)]);
        }
    }
    Texture::from_rgb(width, height, data)
}

#[derive(Debug, Clone)]
pub struct PathOverview {
    pub config_dir: PathBuf,
    pub data_dir: PathBuf,
    pub cache_dir: PathBuf,
    pub config_file: PathBuf,
    pub weights_dir: PathBuf,
    pub sample_image: PathBuf,
    pub last_simulation: PathBuf,
}

pub fn describe_paths(paths: &AppPaths) -> PathOverview {
    PathOverview {
        config_dir: paths.config_dir().to_path_buf(),
        data_dir: paths.data_dir().to_path_buf(),
        cache_dir: paths.cache_dir().to_path_buf(),
        config_file: paths.config_file(),
        weights_dir: paths.weights_dir(),
        sample_image: sample_image_path(paths),
        last_simulation: paths.last_simulation_file(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use convnet::JsonWeights;
    use scheduler::WeightSource;
    use tempfile::TempDir;

    fn temp_paths(root: &Path) -> AppPaths {
        AppPaths::from_raw(
            root.join("config"),
            root.join("data"),
            root.join("cache"),
        )
    }

    #[test]
    fn init_writes_config_weights_and_sample() {
        let root = TempDir::new().unwrap();
        let paths = temp_paths(root.path());

        let report = init_defaults(&paths, InitOptions::default()).unwrap();

        assert_eq!(report.written.len(), 3);
        let config = PaceConfig::load(&paths.config_file()).unwrap();
        assert_eq!(config.generator.weights, paths.weights_dir().join("identity.json"));
        let table = JsonWeights::new().load(&config.generator.weights).unwrap();
        assert_eq!(table, WeightTable::identity());
        let sample = Texture::open(&sample_image_path(&paths), None).unwrap();
        assert_eq!((sample.width(), sample.height()), (SAMPLE_SIZE, SAMPLE_SIZE));
    }

    #[test]
    fn init_keeps_existing_files_unless_forced() {
        let root = TempDir::new().unwrap();
        let paths = temp_paths(root.path());
        fs::create_dir_all(paths.config_dir()).unwrap();
        fs::write(paths.config_file(), "version = 1\n").unwrap();

        let report = init_defaults(&paths, InitOptions::default()).unwrap();
        assert_eq!(report.skipped, vec![paths.config_file()]);
        assert_eq!(
            fs::read_to_string(paths.config_file()).unwrap(),
            "version = 1\n"
        );

        let forced = init_defaults(&paths, InitOptions { force: true }).unwrap();
        assert_eq!(forced.written.len(), 3);
        assert!(forced.skipped.is_empty());
        assert_eq!(
            fs::read_to_string(paths.config_file()).unwrap(),
            DEFAULT_CONFIG_TOML
        );
    }

    #[test]
    fn gradient_stays_in_unit_range() {
        let texture = gradient(4, 3).unwrap();
        assert!(texture.data().iter().all(|v| (0.0..=1.0).contains(v)));
        assert_eq!(texture.pixel(3, 2).map(|p| p[0]), Some(1.0));
    }
}
