use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::de::{self, Deserializer};
use serde::Deserialize;

/// Starter configuration written by `framepace defaults init`.
pub const DEFAULT_CONFIG_TOML: &str = r#"version = 1

[budget]
initial = 100
min = 150
max = 1200
adjust_rate = 10
adjust_decay = 0.05
adjust_floor = 0.5
target_hz = 60
tolerance = 1.25
calibrated_below = 1

[generator]
weights = "weights/identity.json"
width = 256
height = 256
rows_per_step = 8
on_complete = "restart"

[simulation]
frames = 600
host_frame = "12ms"
unit_cost = "10us"
jitter = "1ms"
seed = 7
"#;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read configuration at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaceConfig {
    pub version: u32,
    #[serde(default)]
    pub budget: BudgetConfig,
    #[serde(default)]
    pub generator: GeneratorConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    #[serde(default)]
    pub bake: BakeConfig,
}

/// Tuning for the per-frame work budget feedback loop.
///
/// Budgets are expressed in abstract work units; the generator decides what a
/// unit costs.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Budget before the first update. May sit outside `[min, max]`; the first
    /// update clamps it.
    pub initial: f32,
    pub min: f32,
    pub max: f32,
    /// Starting magnitude of the per-frame correction.
    pub adjust_rate: f32,
    /// Linear decay applied to the correction magnitude on every update.
    pub adjust_decay: f32,
    pub adjust_floor: f32,
    /// Frame rate the control law aims for.
    pub target_hz: f32,
    /// Error, in frames, tolerated before the budget shrinks.
    pub tolerance: f32,
    /// Adjust rate below which the controller counts as calibrated.
    pub calibrated_below: f32,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            initial: 100.0,
            min: 150.0,
            max: 1200.0,
            adjust_rate: 10.0,
            adjust_decay: 0.05,
            adjust_floor: 0.5,
            target_hz: 60.0,
            tolerance: 1.25,
            calibrated_below: 1.0,
        }
    }
}

impl BudgetConfig {
    /// Frame duration at which the control law produces no correction.
    pub fn neutral_frame_secs(&self) -> f32 {
        self.tolerance / self.target_hz
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("initial", self.initial),
            ("min", self.min),
            ("max", self.max),
            ("adjust_rate", self.adjust_rate),
            ("adjust_decay", self.adjust_decay),
            ("adjust_floor", self.adjust_floor),
            ("target_hz", self.target_hz),
            ("tolerance", self.tolerance),
            ("calibrated_below", self.calibrated_below),
        ];
        for (name, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::Invalid(format!(
                    "budget.{name} must be a finite number"
                )));
            }
        }

        if self.min <= 0.0 {
            return Err(ConfigError::Invalid("budget.min must be > 0".into()));
        }
        if self.min > self.max {
            return Err(ConfigError::Invalid(format!(
                "budget.min ({}) must not exceed budget.max ({})",
                self.min, self.max
            )));
        }
        if self.initial < 0.0 {
            return Err(ConfigError::Invalid("budget.initial must be >= 0".into()));
        }
        if self.adjust_floor <= 0.0 {
            return Err(ConfigError::Invalid(
                "budget.adjust_floor must be > 0".into(),
            ));
        }
        if self.adjust_rate < self.adjust_floor {
            return Err(ConfigError::Invalid(format!(
                "budget.adjust_rate ({}) must be >= budget.adjust_floor ({})",
                self.adjust_rate, self.adjust_floor
            )));
        }
        if self.adjust_decay < 0.0 {
            return Err(ConfigError::Invalid(
                "budget.adjust_decay must be >= 0".into(),
            ));
        }
        if self.target_hz <= 0.0 {
            return Err(ConfigError::Invalid("budget.target_hz must be > 0".into()));
        }
        if self.tolerance <= 0.0 {
            return Err(ConfigError::Invalid("budget.tolerance must be > 0".into()));
        }
        Ok(())
    }
}

/// What the scheduler does when a run finishes with budget left in the frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompletionMode {
    /// Start a fresh run on the same input and keep spending the budget.
    #[default]
    Restart,
    /// Give control back to the frame loop at the first completion.
    Stop,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    /// Weight table location. Relative paths resolve against the config file.
    pub weights: PathBuf,
    pub width: u32,
    pub height: u32,
    /// Image rows one generator step processes.
    pub rows_per_step: u32,
    pub on_complete: CompletionMode,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            weights: PathBuf::from("weights/identity.json"),
            width: 256,
            height: 256,
            rows_per_step: 8,
            on_complete: CompletionMode::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub frames: u32,
    /// Host frame time spent outside the generator.
    #[serde(deserialize_with = "deserialize_duration")]
    pub host_frame: Duration,
    /// Wall-clock cost of one budget work unit.
    #[serde(deserialize_with = "deserialize_duration")]
    pub unit_cost: Duration,
    /// Maximum random deviation added to every simulated frame.
    #[serde(deserialize_with = "deserialize_duration")]
    pub jitter: Duration,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            frames: 600,
            host_frame: Duration::from_millis(12),
            unit_cost: Duration::from_micros(10),
            jitter: Duration::from_millis(1),
            seed: 7,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct BakeConfig {
    #[serde(default)]
    pub views: Vec<BakeView>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct BakeView {
    pub name: String,
    pub source: PathBuf,
    pub output: PathBuf,
}

fn deserialize_duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    struct Visitor;
    impl<'de> de::Visitor<'de> for Visitor {
        type Value = Duration;

        fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
            formatter.write_str("a duration as number of seconds or human-readable string")
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            humantime::parse_duration(v)
                .map_err(|err| E::custom(format!("invalid duration '{v}': {err}")))
        }

        fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            Ok(Duration::from_secs(v))
        }

        fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if v < 0 {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs(v as u64))
        }

        fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
        where
            E: de::Error,
        {
            if !v.is_finite() || v.is_sign_negative() {
                return Err(E::custom("duration must be non-negative"));
            }
            Ok(Duration::from_secs_f64(v))
        }
    }

    deserializer.deserialize_any(Visitor)
}

impl Default for PaceConfig {
    fn default() -> Self {
        Self {
            version: 1,
            budget: BudgetConfig::default(),
            generator: GeneratorConfig::default(),
            simulation: SimulationConfig::default(),
            bake: BakeConfig::default(),
        }
    }
}

impl PaceConfig {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let raw: PaceConfig = toml::from_str(input)?;
        raw.validate()?;
        Ok(raw)
    }

    /// Reads and validates a config file, resolving relative paths against
    /// the file's directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_toml_str(&contents)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn resolve_relative_to(&mut self, base: &Path) {
        self.generator.weights = absolutize(base, &self.generator.weights);
        for view in &mut self.bake.views {
            view.source = absolutize(base, &view.source);
            view.output = absolutize(base, &view.output);
        }
    }

    pub fn view(&self, name: &str) -> Option<&BakeView> {
        self.bake.views.iter().find(|view| view.name == name)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != 1 {
            return Err(ConfigError::Invalid(format!(
                "unsupported config version {}; expected 1",
                self.version
            )));
        }

        self.budget.validate()?;

        let generator = &self.generator;
        if generator.weights.as_os_str().is_empty() {
            return Err(ConfigError::Invalid(
                "generator.weights must not be empty".into(),
            ));
        }
        if generator.width == 0 || generator.height == 0 {
            return Err(ConfigError::Invalid(
                "generator dimensions must be greater than zero".into(),
            ));
        }
        if generator.rows_per_step == 0 {
            return Err(ConfigError::Invalid(
                "generator.rows_per_step must be greater than zero".into(),
            ));
        }

        if self.simulation.frames == 0 {
            return Err(ConfigError::Invalid(
                "simulation.frames must be greater than zero".into(),
            ));
        }

        let mut names = BTreeSet::new();
        for view in &self.bake.views {
            if view.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "bake view name must not be empty".into(),
                ));
            }
            if !names.insert(view.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "bake view '{}' is defined more than once",
                    view.name
                )));
            }
            if view.source.as_os_str().is_empty() || view.output.as_os_str().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "bake view '{}' requires both source and output paths",
                    view.name
                )));
            }
        }

        Ok(())
    }
}

fn absolutize(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}
