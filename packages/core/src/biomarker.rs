//! Biomarker observations and the catalog of markers the dashboard offers.

use histofuse_types::JsonSchema;
use serde::{Deserialize, Serialize};

/// Where in the cell the stain was observed
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CellularLocation {
    Nuclear,
    Cytoplasmic,
    Membranous,
}

impl CellularLocation {
    pub const ALL: [CellularLocation; 3] = [
        CellularLocation::Nuclear,
        CellularLocation::Cytoplasmic,
        CellularLocation::Membranous,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "nuclear" => Some(CellularLocation::Nuclear),
            "cytoplasmic" => Some(CellularLocation::Cytoplasmic),
            "membranous" => Some(CellularLocation::Membranous),
            _ => None,
        }
    }
}

/// One user-selected biomarker reading.
///
/// Categorical values are kept verbatim; values the feature columns do not
/// know about simply encode to zeros.
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct BiomarkerObservation {
    pub marker: String,
    pub intensity: String,
    pub staining: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<CellularLocation>,
}

impl BiomarkerObservation {
    pub fn new(
        marker: impl Into<String>,
        intensity: impl Into<String>,
        staining: impl Into<String>,
    ) -> Self {
        Self {
            marker: marker.into(),
            intensity: intensity.into(),
            staining: staining.into(),
            location: None,
        }
    }

    pub fn with_location(mut self, location: CellularLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// The catalog entry for this marker, if it is a known one
    pub fn known_marker(&self) -> Option<Biomarker> {
        Biomarker::from_name(&self.marker)
    }
}

/// Markers offered for selection
#[derive(Serialize, Deserialize, JsonSchema, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Biomarker {
    Ki67,
    Egfr,
    Esr1,
    Pgr,
    Brca1,
    Tp53,
    Erbb2,
    Her2,
    Rb1,
    Snai1,
    Snai,
    Pten,
    Cdh1,
    Mki67,
}

impl Biomarker {
    pub const ALL: [Biomarker; 14] = [
        Biomarker::Ki67,
        Biomarker::Egfr,
        Biomarker::Esr1,
        Biomarker::Pgr,
        Biomarker::Brca1,
        Biomarker::Tp53,
        Biomarker::Erbb2,
        Biomarker::Her2,
        Biomarker::Rb1,
        Biomarker::Snai1,
        Biomarker::Snai,
        Biomarker::Pten,
        Biomarker::Cdh1,
        Biomarker::Mki67,
    ];

    /// Name as used in feature column keys
    pub fn name(&self) -> &'static str {
        match self {
            Biomarker::Ki67 => "Ki-67",
            Biomarker::Egfr => "EGFR",
            Biomarker::Esr1 => "ESR1",
            Biomarker::Pgr => "PGR",
            Biomarker::Brca1 => "BRCA1",
            Biomarker::Tp53 => "TP53",
            Biomarker::Erbb2 => "ERBB2",
            Biomarker::Her2 => "HER2",
            Biomarker::Rb1 => "RB1",
            Biomarker::Snai1 => "SNAI1",
            Biomarker::Snai => "SNAI",
            Biomarker::Pten => "PTEN",
            Biomarker::Cdh1 => "CDH1",
            Biomarker::Mki67 => "MKI67",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|b| b.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn description(&self) -> &'static str {
        match self {
            Biomarker::Ki67 | Biomarker::Mki67 => {
                "Proliferation marker - indicates cell division rate and tumor aggressiveness"
            }
            Biomarker::Her2 | Biomarker::Erbb2 => {
                "Human Epidermal Growth Factor Receptor 2 - target for specific therapies"
            }
            Biomarker::Egfr => {
                "Epidermal Growth Factor Receptor - associated with aggressive behavior"
            }
            Biomarker::Tp53 => "Tumor suppressor gene - mutations common in aggressive cancers",
            Biomarker::Cdh1 => {
                "E-cadherin adhesion protein - loss associated with invasive lobular carcinoma"
            }
            Biomarker::Pten => "Phosphatase tumor suppressor - regulates cell growth and survival",
            Biomarker::Brca1 => "DNA repair gene - mutations increase cancer susceptibility",
            Biomarker::Rb1 => "Retinoblastoma tumor suppressor - controls cell cycle progression",
            Biomarker::Esr1 => "Estrogen receptor alpha - determines hormone sensitivity",
            Biomarker::Pgr => "Progesterone Receptor - hormone receptor",
            Biomarker::Snai1 => {
                "Snail transcription factor - drives epithelial-mesenchymal transition"
            }
            Biomarker::Snai => {
                "Snail family transcription factors - markers of epithelial-mesenchymal transition"
            }
        }
    }

    /// Typical expression of this marker per subtype, where one is characteristic
    pub fn expected_pattern(&self, subtype: &str) -> Option<&'static str> {
        let pattern = match (subtype, self) {
            ("IDC", Biomarker::Ki67) => "Moderate to Strong",
            ("IDC", Biomarker::Her2) => "Variable",
            ("IDC", Biomarker::Egfr) => "Variable",
            ("IDC", Biomarker::Tp53) => "Variable",
            ("IDC", Biomarker::Esr1) => "Often Positive",
            ("TNBC", Biomarker::Ki67) => "Strong",
            ("TNBC", Biomarker::Her2) => "Negative",
            ("TNBC", Biomarker::Egfr) => "Strong",
            ("TNBC", Biomarker::Tp53) => "Strong",
            ("TNBC", Biomarker::Esr1) => "Negative",
            ("MBC", Biomarker::Ki67) => "Strong",
            ("MBC", Biomarker::Her2) => "Usually Negative",
            ("MBC", Biomarker::Egfr) => "Strong",
            ("MBC", Biomarker::Tp53) => "Strong",
            ("MBC", Biomarker::Esr1) => "Variable",
            ("ILC", Biomarker::Ki67) => "Weak to Moderate",
            ("ILC", Biomarker::Cdh1) => "Negative/Loss",
            ("ILC", Biomarker::Esr1) => "Usually Positive",
            ("ILC", Biomarker::Pten) => "Variable",
            ("ILC", Biomarker::Her2) => "Usually Negative",
            _ => return None,
        };
        Some(pattern)
    }
}
