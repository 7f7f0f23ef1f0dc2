//! Key/value parameter file with typed accessors.
//!
//! The parameter file is plain text: one `key value` pair per line, blank
//! lines and lines starting with `#` are ignored. Reading happens once per
//! run, so the store favors readability over speed.

use std::collections::BTreeMap;
use std::fs;

use crate::errors::{AllefitError, Result};

#[derive(Clone, Debug, Default)]
pub struct ParameterStore {
    params: BTreeMap<String, String>,
}

impl ParameterStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|err| {
            AllefitError::DataError(format!("Failed to read parameter file {path}: {err}"))
        })?;
        Self::parse(&content)
            .map_err(|err| AllefitError::DataError(format!("In parameter file {path}: {err}")))
    }

    pub fn parse(content: &str) -> Result<Self> {
        let mut params = BTreeMap::new();
        for (lineno, line) in content.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split_whitespace();
            let key = fields.next();
            let value = fields.next();
            match (key, value) {
                (Some(key), Some(value)) => {
                    params.insert(key.to_string(), value.to_string());
                }
                _ => {
                    return Err(AllefitError::DataError(format!(
                        "line {}: expected `key value`, got `{line}`",
                        lineno + 1
                    )));
                }
            }
        }
        Ok(Self { params })
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.params.contains_key(name)
    }

    /// Add a parameter that was not present in the file, e.g. one derived
    /// from the observed data. Existing values are not overwritten.
    pub fn fill(&mut self, name: &str, value: String) {
        self.params.entry(name.to_string()).or_insert(value);
    }

    pub fn get_string(&self, name: &str, default: &str) -> String {
        self.params
            .get(name)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_f64(&self, name: &str, default: f64) -> Result<f64> {
        match self.params.get(name) {
            Some(value) => value.parse::<f64>().map_err(|_| {
                AllefitError::ConfigError(format!("Parameter {name} is not a number: {value}"))
            }),
            None => Ok(default),
        }
    }

    pub fn get_usize(&self, name: &str, default: usize) -> Result<usize> {
        match self.params.get(name) {
            Some(value) => value.parse::<usize>().map_err(|_| {
                AllefitError::ConfigError(format!("Parameter {name} is not an integer: {value}"))
            }),
            None => Ok(default),
        }
    }

    pub fn get_bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.params.get(name) {
            Some(value) => match value.as_str() {
                "0" | "false" => Ok(false),
                "1" | "true" => Ok(true),
                _ => Err(AllefitError::ConfigError(format!(
                    "Parameter {name} is not a flag: {value}"
                ))),
            },
            None => Ok(default),
        }
    }

    /// Required-parameter variants fail instead of defaulting.
    pub fn require_f64(&self, name: &str) -> Result<f64> {
        self.require(name)?.parse::<f64>().map_err(|_| {
            AllefitError::ConfigError(format!("Parameter {name} is not a number"))
        })
    }

    pub fn require_usize(&self, name: &str) -> Result<usize> {
        self.require(name)?.parse::<usize>().map_err(|_| {
            AllefitError::ConfigError(format!("Parameter {name} is not an integer"))
        })
    }

    fn require(&self, name: &str) -> Result<&String> {
        self.params.get(name).ok_or_else(|| {
            AllefitError::ConfigError(format!("Missing required parameter: {name}"))
        })
    }
}
