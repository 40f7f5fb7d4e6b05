//! Histopathology image + biomarker fusion scoring.
//!
//! A [`ModelBundle`] is loaded once from disk and shared read-only. Each
//! request runs one image and one [`BiomarkerObservation`] through
//! [`PredictionService::predict`]:
//!
//! 1. the observation is one-hot encoded onto the saved feature columns,
//! 2. the image is resized and normalized into an NCHW tensor,
//! 3. the frozen backbone embeds the tensor,
//! 4. the fusion head turns embedding + features into per-subtype logits,
//! 5. a softmax and argmax pick the subtype.

pub mod attention;
pub mod biomarker;
pub mod bundle;
pub mod encoder;
pub mod error;
pub mod head;
pub mod labels;
pub mod preprocess;
pub mod service;

pub use attention::{AttentionMap, SyntheticAttention, render_overlay_png};
pub use biomarker::{Biomarker, BiomarkerObservation, CellularLocation};
pub use bundle::{ArtifactPaths, ModelBundle};
pub use encoder::{BiomarkerEncoder, FeatureColumns, FeatureVector};
pub use error::{FusionError, FusionResult};
pub use head::{FusionHead, FusionHeadWeights, Linear, LinearWeights};
pub use labels::{FollowUp, LabelMapping, RiskLevel, subtype_notes};
pub use preprocess::{ImagePreprocessor, ImageTensor};
pub use service::{PredictionResult, PredictionService, softmax};

pub use histofuse_model_provider as model_provider;
pub use histofuse_types as types;
