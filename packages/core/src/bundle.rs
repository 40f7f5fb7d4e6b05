//! Everything the prediction path needs, loaded once at startup.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use histofuse_model_provider::{BackboneConfig, VisionBackbone, load_backbone};
use serde::{Deserialize, Serialize};

use crate::encoder::{BiomarkerEncoder, FeatureColumns};
use crate::error::{FusionError, FusionResult};
use crate::head::FusionHead;
use crate::labels::LabelMapping;

/// Locations of the startup artifacts
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ArtifactPaths {
    pub labels: PathBuf,
    pub feature_columns: PathBuf,
    pub head_weights: PathBuf,
    pub backbone: BackboneConfig,
}

impl ArtifactPaths {
    /// Conventional file names inside one artifact directory
    pub fn in_dir(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        Self {
            labels: dir.join("labels.json"),
            feature_columns: dir.join("feature_columns.json"),
            head_weights: dir.join("fusion_head.json"),
            backbone: BackboneConfig::new(dir.join("backbone.onnx")),
        }
    }
}

/// Backbone handle, head weights, label mapping and feature column order.
///
/// Immutable once built; share it behind an `Arc` between workers.
#[derive(Clone)]
pub struct ModelBundle {
    backbone: Arc<dyn VisionBackbone>,
    head: FusionHead,
    labels: LabelMapping,
    encoder: BiomarkerEncoder,
}

impl fmt::Debug for ModelBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelBundle")
            .field("backbone", &self.backbone.name())
            .field("head", &self.head)
            .field("labels", &self.labels.labels())
            .field("feature_columns", &self.encoder.dim())
            .finish()
    }
}

impl ModelBundle {
    /// Assemble a bundle, checking that every artifact agrees on its dimensions
    pub fn new(
        backbone: Arc<dyn VisionBackbone>,
        head: FusionHead,
        labels: LabelMapping,
        columns: FeatureColumns,
    ) -> FusionResult<Self> {
        if head.biomarker_dim() != columns.len() {
            return Err(FusionError::model_unavailable(format!(
                "fusion head expects {} biomarker features but {} feature columns were loaded",
                head.biomarker_dim(),
                columns.len()
            )));
        }
        if head.image_dim() != backbone.embedding_dim() {
            return Err(FusionError::model_unavailable(format!(
                "fusion head expects a {}-d image embedding but backbone '{}' produces {}",
                head.image_dim(),
                backbone.name(),
                backbone.embedding_dim()
            )));
        }
        if head.num_classes() != labels.len() {
            return Err(FusionError::model_unavailable(format!(
                "fusion head produces {} logits but the label mapping has {} subtypes",
                head.num_classes(),
                labels.len()
            )));
        }

        Ok(Self {
            backbone,
            head,
            labels,
            encoder: BiomarkerEncoder::new(columns),
        })
    }

    /// Load every artifact from disk, including the backbone
    pub fn load(paths: &ArtifactPaths) -> FusionResult<Self> {
        let backbone = load_backbone(&paths.backbone).map_err(|e| {
            FusionError::model_unavailable_with_source("backbone failed to load", e)
        })?;
        Self::load_with_backbone(paths, backbone)
    }

    /// Load the head-side artifacts around an already constructed backbone
    pub fn load_with_backbone(
        paths: &ArtifactPaths,
        backbone: Arc<dyn VisionBackbone>,
    ) -> FusionResult<Self> {
        let labels = LabelMapping::load(&paths.labels).map_err(|e| {
            FusionError::model_unavailable_with_source("label mapping failed to load", e)
        })?;
        let columns = FeatureColumns::load(&paths.feature_columns).map_err(|e| {
            FusionError::model_unavailable_with_source("feature columns failed to load", e)
        })?;
        let head = FusionHead::load(&paths.head_weights).map_err(|e| {
            FusionError::model_unavailable_with_source("fusion head weights failed to load", e)
        })?;

        let bundle = Self::new(backbone, head, labels, columns)?;
        tracing::info!(
            backbone = %bundle.backbone.name(),
            subtypes = ?bundle.labels.labels(),
            feature_columns = bundle.encoder.dim(),
            "Model bundle ready"
        );
        Ok(bundle)
    }

    pub fn backbone(&self) -> &dyn VisionBackbone {
        self.backbone.as_ref()
    }

    pub fn head(&self) -> &FusionHead {
        &self.head
    }

    pub fn labels(&self) -> &LabelMapping {
        &self.labels
    }

    pub fn encoder(&self) -> &BiomarkerEncoder {
        &self.encoder
    }
}
