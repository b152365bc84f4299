use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use scheduler::WeightSource;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// Current on-disk weight file format.
pub const WEIGHTS_FORMAT: u32 = 1;

#[derive(Debug, Error)]
pub enum WeightError {
    #[error("failed to read weights {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse weights {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("unsupported weights format {0}; expected {WEIGHTS_FORMAT}")]
    Format(u32),
    #[error("tensor '{name}' declares shape {shape:?} but holds {len} values")]
    Size {
        name: String,
        shape: Vec<usize>,
        len: usize,
    },
    #[error("tensor '{name}' has shape {actual:?}; expected {expected}")]
    Shape {
        name: String,
        expected: String,
        actual: Vec<usize>,
    },
    #[error("missing tensor '{0}'")]
    Missing(String),
    #[error("weight table defines no convolution layers")]
    Empty,
}

/// Dense row-major tensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub shape: Vec<usize>,
    pub data: Vec<f32>,
}

impl Tensor {
    pub fn new(shape: Vec<usize>, data: Vec<f32>) -> Self {
        Self { shape, data }
    }

    pub fn zeros(shape: Vec<usize>) -> Self {
        let len = shape.iter().product();
        Self {
            shape,
            data: vec![0.0; len],
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub(crate) fn check(&self, name: &str) -> Result<(), WeightError> {
        let expected: usize = self.shape.iter().product();
        if expected != self.data.len() {
            return Err(WeightError::Size {
                name: name.to_string(),
                shape: self.shape.clone(),
                len: self.data.len(),
            });
        }
        Ok(())
    }
}

/// Named tensors making up a model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightTable {
    format: u32,
    tensors: BTreeMap<String, Tensor>,
}

impl WeightTable {
    pub fn new() -> Self {
        Self {
            format: WEIGHTS_FORMAT,
            tensors: BTreeMap::new(),
        }
    }

    /// Identity network: one RGB to RGB layer passing every pixel through.
    pub fn identity() -> Self {
        let mut weight = Tensor::zeros(vec![3, 3, 3, 3]);
        for channel in 0..3 {
            // Centre tap of the kernel mapping channel to itself.
            let index = ((channel * 3 + channel) * 3 + 1) * 3 + 1;
            weight.data[index] = 1.0;
        }
        let mut table = Self::new();
        table.insert("conv0.weight", weight);
        table.insert("conv0.bias", Tensor::zeros(vec![3]));
        table
    }

    pub fn from_json_str(raw: &str, origin: &Path) -> Result<Self, WeightError> {
        let table: WeightTable =
            serde_json::from_str(raw).map_err(|source| WeightError::Parse {
                path: origin.to_path_buf(),
                source,
            })?;
        table.validate()?;
        Ok(table)
    }

    pub fn to_json_string(&self) -> String {
        // Only string keys and plain numbers; serialisation cannot fail.
        serde_json::to_string_pretty(self).unwrap_or_default()
    }

    pub fn insert(&mut self, name: impl Into<String>, tensor: Tensor) {
        self.tensors.insert(name.into(), tensor);
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.tensors.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Tensor, WeightError> {
        self.get(name)
            .ok_or_else(|| WeightError::Missing(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.tensors.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    /// Total number of scalar parameters.
    pub fn parameter_count(&self) -> usize {
        self.tensors.values().map(Tensor::len).sum()
    }

    pub fn validate(&self) -> Result<(), WeightError> {
        if self.format != WEIGHTS_FORMAT {
            return Err(WeightError::Format(self.format));
        }
        for (name, tensor) in &self.tensors {
            tensor.check(name)?;
        }
        Ok(())
    }
}

impl Default for WeightTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Loads weight tables from JSON files on disk.
#[derive(Debug, Default)]
pub struct JsonWeights {
    loaded: u32,
    released: u32,
}

impl JsonWeights {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tables currently handed out.
    pub fn outstanding(&self) -> u32 {
        self.loaded - self.released
    }
}

impl WeightSource for JsonWeights {
    type Table = WeightTable;
    type Error = WeightError;

    fn load(&mut self, path: &Path) -> Result<WeightTable, WeightError> {
        let raw = fs::read_to_string(path).map_err(|source| WeightError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = WeightTable::from_json_str(&raw, path)?;
        self.loaded += 1;
        debug!(
            path = %path.display(),
            tensors = table.len(),
            parameters = table.parameter_count(),
            "loaded weight table"
        );
        Ok(table)
    }

    fn release(&mut self, table: WeightTable) {
        self.released += 1;
        debug!(tensors = table.len(), "released weight table");
    }
}

/// Writes `table` as pretty JSON, creating parent directories.
pub fn write_weights(path: &Path, table: &WeightTable) -> Result<(), WeightError> {
    let io_err = |source| WeightError::Io {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(io_err)?;
    }
    fs::write(path, table.to_json_string()).map_err(io_err)
}
