//! Fusion classifier head: biomarker projection, concatenation with the image
//! embedding, one hidden ReLU layer and the per-subtype logits.
//!
//! Weights come from a serialized artifact exported after training, either JSON
//! or MessagePack. Dropout is recorded for reference but never applied, the
//! head is only ever run in inference mode.

use std::fmt;
use std::path::Path;

use histofuse_types::{Context, Result, anyhow, json};
use ndarray::{Array1, Array2, ArrayView1, Axis, concatenate};
use serde::{Deserialize, Serialize};

use crate::encoder::FeatureVector;
use crate::error::{FusionError, FusionResult};

fn default_dropout() -> f32 {
    0.3
}

/// Row-major `[out][in]` weight matrix plus bias, as exported from training
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct LinearWeights {
    pub weight: Vec<Vec<f32>>,
    pub bias: Vec<f32>,
}

/// Serialized form of the whole head
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FusionHeadWeights {
    pub biomarker_projection: LinearWeights,
    pub hidden: LinearWeights,
    pub classifier: LinearWeights,
    #[serde(default = "default_dropout")]
    pub dropout: f32,
}

impl FusionHeadWeights {
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        Ok(json::from_slice(bytes)?)
    }

    pub fn from_msgpack_slice(bytes: &[u8]) -> Result<Self> {
        rmp_serde::from_slice(bytes)
            .map_err(|e| anyhow!("MessagePack deserialization failed: {}", e))
    }

    pub fn to_msgpack_vec(&self) -> Result<Vec<u8>> {
        rmp_serde::to_vec_named(self)
            .map_err(|e| anyhow!("MessagePack serialization failed: {}", e))
    }

    /// Load by extension: `.json` is JSON, `.msgpack` and `.bin` are MessagePack
    pub fn load(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read head weights '{}'", path.display()))?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase());
        let weights = match ext.as_deref() {
            Some("json") => Self::from_json_slice(&bytes),
            Some("msgpack") | Some("bin") => Self::from_msgpack_slice(&bytes),
            other => Err(anyhow!(
                "Unsupported head weights format {:?} for '{}'",
                other,
                path.display()
            )),
        };
        weights.with_context(|| format!("Malformed head weights '{}'", path.display()))
    }
}

/// Dense layer `y = W x + b`
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Array2<f32>,
    bias: Array1<f32>,
}

impl Linear {
    pub fn new(weight: Array2<f32>, bias: Array1<f32>) -> Result<Self> {
        if weight.nrows() != bias.len() {
            return Err(anyhow!(
                "bias has {} entries but weight has {} rows",
                bias.len(),
                weight.nrows()
            ));
        }
        if weight.ncols() == 0 || weight.nrows() == 0 {
            return Err(anyhow!("layer has an empty weight matrix"));
        }
        Ok(Self { weight, bias })
    }

    pub fn in_features(&self) -> usize {
        self.weight.ncols()
    }

    pub fn out_features(&self) -> usize {
        self.weight.nrows()
    }

    pub fn forward(&self, x: ArrayView1<'_, f32>) -> Array1<f32> {
        self.weight.dot(&x) + &self.bias
    }
}

impl TryFrom<&LinearWeights> for Linear {
    type Error = histofuse_types::Error;

    fn try_from(w: &LinearWeights) -> Result<Self> {
        let rows = w.weight.len();
        let cols = w.weight.first().map(Vec::len).unwrap_or(0);
        if w.weight.iter().any(|row| row.len() != cols) {
            return Err(anyhow!("weight matrix rows have inconsistent lengths"));
        }
        let flat: Vec<f32> = w.weight.iter().flatten().copied().collect();
        let weight = Array2::from_shape_vec((rows, cols), flat)?;
        Linear::new(weight, Array1::from(w.bias.clone()))
    }
}

#[derive(Clone)]
pub struct FusionHead {
    biomarker_projection: Linear,
    hidden: Linear,
    classifier: Linear,
    dropout: f32,
}

impl fmt::Debug for FusionHead {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FusionHead")
            .field("biomarker_dim", &self.biomarker_dim())
            .field("projection_dim", &self.projection_dim())
            .field("image_dim", &self.image_dim())
            .field("hidden_dim", &self.hidden.out_features())
            .field("num_classes", &self.num_classes())
            .field("dropout", &self.dropout)
            .finish()
    }
}

impl FusionHead {
    pub fn new(
        biomarker_projection: Linear,
        hidden: Linear,
        classifier: Linear,
        dropout: f32,
    ) -> Result<Self> {
        if hidden.in_features() <= biomarker_projection.out_features() {
            return Err(anyhow!(
                "hidden layer takes {} inputs, leaving no room for an image embedding next to the {}-d biomarker projection",
                hidden.in_features(),
                biomarker_projection.out_features()
            ));
        }
        if classifier.in_features() != hidden.out_features() {
            return Err(anyhow!(
                "classifier expects {} inputs but hidden layer produces {}",
                classifier.in_features(),
                hidden.out_features()
            ));
        }
        if !(0.0..1.0).contains(&dropout) {
            return Err(anyhow!("dropout rate {} is outside [0, 1)", dropout));
        }
        Ok(Self {
            biomarker_projection,
            hidden,
            classifier,
            dropout,
        })
    }

    pub fn from_weights(weights: &FusionHeadWeights) -> Result<Self> {
        let projection = Linear::try_from(&weights.biomarker_projection)
            .context("biomarker_projection")?;
        let hidden = Linear::try_from(&weights.hidden).context("hidden")?;
        let classifier = Linear::try_from(&weights.classifier).context("classifier")?;
        Self::new(projection, hidden, classifier, weights.dropout)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let weights = FusionHeadWeights::load(path)?;
        Self::from_weights(&weights)
    }

    /// Length of the encoded biomarker vector
    pub fn biomarker_dim(&self) -> usize {
        self.biomarker_projection.in_features()
    }

    pub fn projection_dim(&self) -> usize {
        self.biomarker_projection.out_features()
    }

    /// Length of the backbone embedding the head was trained against
    pub fn image_dim(&self) -> usize {
        self.hidden.in_features() - self.projection_dim()
    }

    pub fn num_classes(&self) -> usize {
        self.classifier.out_features()
    }

    pub fn dropout(&self) -> f32 {
        self.dropout
    }

    /// Per-class logits for one image embedding and one encoded observation
    pub fn forward(
        &self,
        image_embedding: &[f32],
        features: &FeatureVector,
    ) -> FusionResult<Vec<f32>> {
        if image_embedding.len() != self.image_dim() {
            return Err(FusionError::inference(format!(
                "image embedding has {} values, head expects {}",
                image_embedding.len(),
                self.image_dim()
            )));
        }
        if features.len() != self.biomarker_dim() {
            return Err(FusionError::inference(format!(
                "feature vector has {} values, head expects {}",
                features.len(),
                self.biomarker_dim()
            )));
        }

        let projected = self
            .biomarker_projection
            .forward(ArrayView1::from(features.as_slice()));
        let joint = concatenate(
            Axis(0),
            &[ArrayView1::from(image_embedding), projected.view()],
        )
        .map_err(|e| FusionError::inference(e.to_string()))?;

        let hidden = self.hidden.forward(joint.view()).mapv_into(|v| v.max(0.0));
        let logits = self.classifier.forward(hidden.view());
        Ok(logits.to_vec())
    }
}
