//! One-hot encoding of a biomarker observation onto the saved column order.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use histofuse_types::{Context, JsonSchema, Result, anyhow, json};
use serde::{Deserialize, Serialize};

use crate::biomarker::BiomarkerObservation;

pub const BIOMARKER_PREFIX: &str = "biomarker_";
pub const INTENSITY_PREFIX: &str = "intensity_";
pub const STAINING_PREFIX: &str = "staining_";

/// Dense encoder input, one value per feature column
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct FeatureVector {
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.values
    }

    /// Number of columns set to 1.0
    pub fn active(&self) -> usize {
        self.values.iter().filter(|v| **v != 0.0).count()
    }
}

/// Ordered feature column names the fusion head was trained on
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureColumns {
    names: Vec<String>,
}

impl TryFrom<Vec<String>> for FeatureColumns {
    type Error = histofuse_types::Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        FeatureColumns::new(names)
    }
}

impl From<FeatureColumns> for Vec<String> {
    fn from(columns: FeatureColumns) -> Self {
        columns.names
    }
}

impl FeatureColumns {
    pub fn new(names: Vec<String>) -> Result<Self> {
        if names.is_empty() {
            return Err(anyhow!("Feature column list is empty"));
        }
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(anyhow!("Duplicate feature column '{}'", name));
            }
        }
        Ok(Self { names })
    }

    /// Load a JSON array of column names
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let names: Vec<String> =
            json::from_slice(bytes).context("Feature columns must be a JSON array of strings")?;
        Self::new(names)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read feature columns '{}'", path.display()))?;
        Self::from_slice(&bytes)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Distinct values of one categorical axis, e.g. every known intensity
    pub fn axis_values<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.names.iter().filter_map(move |n| n.strip_prefix(prefix))
    }
}

/// Encodes observations against a fixed column order
#[derive(Clone, Debug)]
pub struct BiomarkerEncoder {
    columns: FeatureColumns,
}

impl BiomarkerEncoder {
    pub fn new(columns: FeatureColumns) -> Self {
        Self { columns }
    }

    pub fn columns(&self) -> &FeatureColumns {
        &self.columns
    }

    pub fn dim(&self) -> usize {
        self.columns.len()
    }

    /// Values that were never seen when the columns were built contribute nothing.
    pub fn encode(&self, observation: &BiomarkerObservation) -> FeatureVector {
        let mut keys: HashMap<String, f32> = HashMap::with_capacity(3);
        keys.insert(format!("{BIOMARKER_PREFIX}{}", observation.marker), 1.0);
        keys.insert(format!("{INTENSITY_PREFIX}{}", observation.intensity), 1.0);
        keys.insert(format!("{STAINING_PREFIX}{}", observation.staining), 1.0);

        let values = self
            .columns
            .names()
            .iter()
            .map(|name| keys.get(name).copied().unwrap_or(0.0))
            .collect();
        FeatureVector { values }
    }
}
