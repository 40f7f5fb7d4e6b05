//! Class index <-> subtype label mapping and the clinical notes attached to
//! each known subtype.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use histofuse_types::{Context, JsonSchema, Result, Value, anyhow, json};
use serde::{Deserialize, Serialize};

/// Read-only after load
#[derive(Clone, Debug, PartialEq)]
pub struct LabelMapping {
    labels: Vec<String>,
}

impl LabelMapping {
    pub fn new(labels: Vec<String>) -> Result<Self> {
        if labels.is_empty() {
            return Err(anyhow!("Label mapping is empty"));
        }
        let mut seen = HashSet::with_capacity(labels.len());
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(anyhow!("Duplicate label '{}'", label));
            }
        }
        Ok(Self { labels })
    }

    /// Accepts `["IDC", "TNBC", ...]` or `{"IDC": 0, "TNBC": 1, ...}`
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: Value = json::from_slice(bytes).context("Label mapping is not valid JSON")?;
        match value {
            Value::Array(items) => {
                let labels: Vec<String> = json::from_value(Value::Array(items))
                    .context("Label list must contain only strings")?;
                Self::new(labels)
            }
            Value::Object(entries) => {
                let by_name: HashMap<String, usize> = json::from_value(Value::Object(entries))
                    .context("Label object must map names to class indices")?;
                Self::from_index_map(by_name)
            }
            _ => Err(anyhow!("Label mapping must be a JSON array or object")),
        }
    }

    fn from_index_map(by_name: HashMap<String, usize>) -> Result<Self> {
        let count = by_name.len();
        let by_index: BTreeMap<usize, String> =
            by_name.into_iter().map(|(name, i)| (i, name)).collect();
        if by_index.len() != count {
            return Err(anyhow!("Two labels share a class index"));
        }
        let labels: Vec<String> = by_index
            .into_iter()
            .enumerate()
            .map(|(expected, (i, name))| {
                if expected == i {
                    Ok(name)
                } else {
                    Err(anyhow!("Class indices must be 0..n without gaps, missing {}", expected))
                }
            })
            .collect::<Result<_>>()?;
        Self::new(labels)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read label mapping '{}'", path.display()))?;
        Self::from_slice(&bytes)
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn label(&self, index: usize) -> Option<&str> {
        self.labels.get(index).map(String::as_str)
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }
}

#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
pub enum RiskLevel {
    High,
    Moderate,
    Standard,
}

impl RiskLevel {
    pub fn for_subtype(label: &str) -> Self {
        match label {
            "TNBC" | "MBC" => RiskLevel::High,
            "ILC" => RiskLevel::Moderate,
            _ => RiskLevel::Standard,
        }
    }
}

/// How soon the case should be followed up, from the top confidence
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq)]
pub enum FollowUp {
    Immediate,
    Prompt,
    Standard,
}

impl FollowUp {
    pub fn for_confidence(confidence: f32) -> Self {
        if confidence > 0.8 {
            FollowUp::Immediate
        } else if confidence > 0.6 {
            FollowUp::Prompt
        } else {
            FollowUp::Standard
        }
    }
}

/// Clinical interpretation shown next to a predicted subtype
pub fn subtype_notes(label: &str) -> Option<&'static str> {
    match label {
        "IDC" => Some(
            "Most common breast cancer type. Generally responds well to standard treatments.",
        ),
        "TNBC" => Some(
            "Aggressive subtype lacking hormone receptors. May require intensive chemotherapy.",
        ),
        "MBC" => Some("Rare and aggressive. Often requires specialized treatment protocols."),
        "ILC" => Some(
            "Grows in single-file pattern. May require additional imaging for staging.",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_form() {
        let m = LabelMapping::from_slice(br#"["IDC", "TNBC", "MBC", "ILC"]"#).unwrap();
        assert_eq!(m.len(), 4);
        assert_eq!(m.label(2), Some("MBC"));
        assert_eq!(m.label(3), Some("ILC"));
        assert_eq!(m.label(4), None);
    }

    #[test]
    fn object_form_is_ordered_by_index() {
        let m = LabelMapping::from_slice(br#"{"TNBC": 1, "ILC": 3, "IDC": 0, "MBC": 2}"#).unwrap();
        assert_eq!(m.labels(), &["IDC", "TNBC", "MBC", "ILC"]);
    }

    #[test]
    fn object_form_with_gap_is_rejected() {
        assert!(LabelMapping::from_slice(br#"{"IDC": 0, "TNBC": 2}"#).is_err());
        assert!(LabelMapping::from_slice(br#"{"IDC": 0, "TNBC": 0}"#).is_err());
    }

    #[test]
    fn malformed_mappings() {
        assert!(LabelMapping::from_slice(b"[]").is_err());
        assert!(LabelMapping::from_slice(br#"["IDC", "IDC"]"#).is_err());
        assert!(LabelMapping::from_slice(br#""IDC""#).is_err());
        assert!(LabelMapping::from_slice(br#"[1, 2]"#).is_err());
        assert!(LabelMapping::from_slice(b"{not json").is_err());
    }

    #[test]
    fn risk_levels() {
        assert_eq!(RiskLevel::for_subtype("TNBC"), RiskLevel::High);
        assert_eq!(RiskLevel::for_subtype("MBC"), RiskLevel::High);
        assert_eq!(RiskLevel::for_subtype("ILC"), RiskLevel::Moderate);
        assert_eq!(RiskLevel::for_subtype("IDC"), RiskLevel::Standard);
    }

    #[test]
    fn follow_up_thresholds() {
        assert_eq!(FollowUp::for_confidence(0.95), FollowUp::Immediate);
        assert_eq!(FollowUp::for_confidence(0.8), FollowUp::Prompt);
        assert_eq!(FollowUp::for_confidence(0.6), FollowUp::Standard);
    }

    #[test]
    fn notes_exist_for_known_subtypes() {
        for label in ["IDC", "TNBC", "MBC", "ILC"] {
            assert!(subtype_notes(label).is_some());
        }
        assert!(subtype_notes("DCIS").is_none());
    }
}
