//! Benchmark configuration read from a TOML document:
//!
//! ```toml
//! [jacobi]
//! rows = 1024
//! accuracy = 1e-6
//! iterations = 1000
//! device = "gpu"
//!
//! [integral]
//! steps = 4096
//! device = "cpu"
//!
//! [logging]
//! level = "info"
//! file = "jacobi.log"
//! ```
//! Every key is optional; missing keys keep their defaults.
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use toml::{Table, Value};

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    Io(String),
    Parse(String),
    /// key present with a value of the wrong type
    WrongType { key: String, expected: &'static str },
    /// value of the right type outside of its allowed range
    Invalid(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::Io(msg) => write!(f, "cannot read config: {}", msg),
            ConfigError::Parse(msg) => write!(f, "malformed config: {}", msg),
            ConfigError::WrongType { key, expected } => {
                write!(f, "config key '{}' must be {}", key, expected)
            }
            ConfigError::Invalid(msg) => write!(f, "invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Clone, PartialEq)]
pub struct JacobiSettings {
    pub rows: usize,
    pub accuracy: f32,
    pub iterations: usize,
    pub device: String,
}

impl JacobiSettings {
    /// Device bytes held during a run: the matrix, b and the two iterates.
    /// `None` when the count does not fit in `usize`.
    pub fn device_bytes(&self) -> Option<usize> {
        let n = self.rows;
        n.checked_add(3)?
            .checked_mul(n)?
            .checked_mul(std::mem::size_of::<f32>())
    }

    /// Rejects systems that do not fit into `global_mem_bytes` of device memory.
    pub fn check_fits(&self, global_mem_bytes: usize) -> Result<(), ConfigError> {
        match self.device_bytes() {
            Some(bytes) if bytes <= global_mem_bytes => Ok(()),
            Some(bytes) => Err(ConfigError::Invalid(format!(
                "{} rows need {} bytes of device memory, the device has {}",
                self.rows, bytes, global_mem_bytes
            ))),
            None => Err(ConfigError::Invalid(format!(
                "{} rows is too large to address",
                self.rows
            ))),
        }
    }
}

impl Default for JacobiSettings {
    fn default() -> Self {
        Self {
            rows: 1024,
            accuracy: 1e-6,
            iterations: 1000,
            device: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegralSettings {
    /// rectangles per dimension, a multiple of the work-group edge
    pub steps: usize,
    pub device: String,
}

impl Default for IntegralSettings {
    fn default() -> Self {
        Self {
            steps: 4096,
            device: "default".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub file: Option<PathBuf>,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BenchConfig {
    pub jacobi: JacobiSettings,
    pub integral: IntegralSettings,
    pub logging: LoggingSettings,
}

impl BenchConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let table: Table = text
            .parse()
            .map_err(|e: toml::de::Error| ConfigError::Parse(e.to_string()))?;
        let mut config = BenchConfig::default();

        if let Some(jacobi) = section(&table, "jacobi")? {
            let s = &mut config.jacobi;
            if let Some(v) = get_usize(jacobi, "jacobi.rows")? {
                s.rows = v;
            }
            if let Some(v) = get_f32(jacobi, "jacobi.accuracy")? {
                s.accuracy = v;
            }
            if let Some(v) = get_usize(jacobi, "jacobi.iterations")? {
                s.iterations = v;
            }
            if let Some(v) = get_str(jacobi, "jacobi.device")? {
                s.device = v;
            }
        }
        if let Some(integral) = section(&table, "integral")? {
            if let Some(v) = get_usize(integral, "integral.steps")? {
                config.integral.steps = v;
            }
            if let Some(v) = get_str(integral, "integral.device")? {
                config.integral.device = v;
            }
        }
        if let Some(logging) = section(&table, "logging")? {
            if let Some(v) = get_str(logging, "logging.level")? {
                config.logging.level = v;
            }
            if let Some(v) = get_str(logging, "logging.file")? {
                config.logging.file = Some(PathBuf::from(v));
            }
        }
        Ok(config)
    }

    /// Checks the ranges the solver core takes for granted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let j = &self.jacobi;
        if j.rows == 0 {
            return Err(ConfigError::Invalid("rows must be positive".to_string()));
        }
        j.check_fits(usize::MAX)?;
        if !(j.accuracy.is_finite() && j.accuracy > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "accuracy must be a positive number, got {}",
                j.accuracy
            )));
        }
        if j.iterations == 0 {
            return Err(ConfigError::Invalid("iterations must be positive".to_string()));
        }
        if self.integral.steps == 0 {
            return Err(ConfigError::Invalid("steps must be positive".to_string()));
        }
        Ok(())
    }
}

fn section<'t>(table: &'t Table, name: &str) -> Result<Option<&'t Table>, ConfigError> {
    match table.get(name) {
        None => Ok(None),
        Some(Value::Table(t)) => Ok(Some(t)),
        Some(_) => Err(ConfigError::WrongType {
            key: name.to_string(),
            expected: "a table",
        }),
    }
}

fn leaf<'t>(table: &'t Table, key: &str) -> Option<&'t Value> {
    let name = key.rsplit('.').next().unwrap_or(key);
    table.get(name)
}

fn get_usize(table: &Table, key: &str) -> Result<Option<usize>, ConfigError> {
    match leaf(table, key) {
        None => Ok(None),
        Some(Value::Integer(v)) if *v >= 0 => Ok(Some(*v as usize)),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "a non-negative integer",
        }),
    }
}

fn get_f32(table: &Table, key: &str) -> Result<Option<f32>, ConfigError> {
    match leaf(table, key) {
        None => Ok(None),
        Some(Value::Float(v)) => Ok(Some(*v as f32)),
        Some(Value::Integer(v)) => Ok(Some(*v as f32)),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "a number",
        }),
    }
}

fn get_str(table: &Table, key: &str) -> Result<Option<String>, ConfigError> {
    match leaf(table, key) {
        None => Ok(None),
        Some(Value::String(v)) => Ok(Some(v.clone())),
        Some(_) => Err(ConfigError::WrongType {
            key: key.to_string(),
            expected: "a string",
        }),
    }
}
