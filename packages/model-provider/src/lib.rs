//! Vision backbone providers for histofuse.
//!
//! The fusion head never sees the backbone's internals; it only consumes the
//! embedding produced by a [`backbone::VisionBackbone`]. The ONNX Runtime
//! implementation lives behind the `local-ml` feature.

pub mod backbone;

pub mod ml {
    pub use ndarray;
    #[cfg(feature = "local-ml")]
    pub use ort;
}

pub use backbone::{BackboneConfig, VisionBackbone, load_backbone};
#[cfg(feature = "local-ml")]
pub use backbone::{OnnxBackbone, initialize_ort};
