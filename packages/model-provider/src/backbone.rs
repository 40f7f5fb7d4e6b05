/// # Vision Backbones
/// Frozen, pretrained image feature extractors
use std::path::PathBuf;
use std::sync::Arc;

use histofuse_types::Result;
#[cfg(not(feature = "local-ml"))]
use histofuse_types::anyhow;
use ndarray::ArrayView4;
use serde::{Deserialize, Serialize};

#[cfg(feature = "local-ml")]
pub mod execution_providers;
#[cfg(feature = "local-ml")]
pub mod onnx;

#[cfg(feature = "local-ml")]
pub use execution_providers::{ExecutionProviderInfo, initialize_ort};
#[cfg(feature = "local-ml")]
pub use onnx::OnnxBackbone;

/// Default square input resolution for ViT/ResNet style backbones
pub const DEFAULT_RESOLUTION: u32 = 224;

/// A frozen image embedding provider.
///
/// Implementations are loaded once and shared read-only between requests, so
/// `embed` must be deterministic and free of side effects.
pub trait VisionBackbone: Send + Sync {
    /// Human readable identifier, e.g. the model file or hub name
    fn name(&self) -> &str;

    /// Side length of the square input the backbone expects
    fn input_resolution(&self) -> u32;

    /// Length of the vector returned by [`VisionBackbone::embed`]
    fn embedding_dim(&self) -> usize;

    /// Embed a normalized `[1, 3, R, R]` tensor
    fn embed(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>>;
}

/// Where and how to load a backbone
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BackboneConfig {
    /// Path to the exported model file
    pub path: PathBuf,
    /// Input tensor name, first session input if unset
    #[serde(default)]
    pub input_name: Option<String>,
    /// Output tensor name, first session output if unset
    #[serde(default)]
    pub output_name: Option<String>,
    /// Used when the model declares a dynamic spatial size
    #[serde(default)]
    pub resolution: Option<u32>,
    /// Used when the model declares a dynamic output size
    #[serde(default)]
    pub embedding_dim: Option<usize>,
}

impl BackboneConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            input_name: None,
            output_name: None,
            resolution: None,
            embedding_dim: None,
        }
    }
}

/// Load the backbone described by `config`.
#[cfg(feature = "local-ml")]
pub fn load_backbone(config: &BackboneConfig) -> Result<Arc<dyn VisionBackbone>> {
    Ok(Arc::new(OnnxBackbone::load(config)?))
}

/// Load the backbone described by `config`.
#[cfg(not(feature = "local-ml"))]
pub fn load_backbone(config: &BackboneConfig) -> Result<Arc<dyn VisionBackbone>> {
    Err(anyhow!(
        "Cannot load backbone '{}': ONNX inference requires the 'local-ml' feature. Rebuild with --features local-ml",
        config.path.display()
    ))
}
