/// # ONNX Runtime Backbone
/// Runs an exported, frozen feature extractor through ONNX Runtime
use std::sync::Mutex;

use histofuse_types::{Context, Result, anyhow};
use ndarray::ArrayView4;
use ort::{
    inputs,
    session::{Session, builder::GraphOptimizationLevel},
    value::Value,
};

use super::{BackboneConfig, DEFAULT_RESOLUTION, VisionBackbone};

pub struct OnnxBackbone {
    name: String,
    /// `Session::run` needs `&mut`, the lock is only held for one forward pass
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    resolution: u32,
    embedding_dim: usize,
}

impl OnnxBackbone {
    pub fn load(config: &BackboneConfig) -> Result<Self> {
        super::initialize_ort();
        let session = Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .commit_from_file(&config.path)
            .with_context(|| format!("Failed to load ONNX backbone '{}'", config.path.display()))?;

        let input_name = match &config.input_name {
            Some(name) => name.clone(),
            None => session
                .inputs
                .first()
                .map(|i| i.name.clone())
                .ok_or_else(|| anyhow!("Backbone declares no inputs"))?,
        };
        let output_name = match &config.output_name {
            Some(name) => name.clone(),
            None => session
                .outputs
                .first()
                .map(|o| o.name.clone())
                .ok_or_else(|| anyhow!("Backbone declares no outputs"))?,
        };

        let resolution = determine_resolution(&session, &input_name)
            .or(config.resolution)
            .unwrap_or(DEFAULT_RESOLUTION);
        let embedding_dim = determine_embedding_dim(&session, &output_name)
            .or(config.embedding_dim)
            .ok_or_else(|| {
                anyhow!(
                    "Backbone output '{}' has a dynamic size, set embedding_dim explicitly",
                    output_name
                )
            })?;

        tracing::info!(
            path = %config.path.display(),
            input = %input_name,
            output = %output_name,
            resolution,
            embedding_dim,
            "Loaded ONNX backbone"
        );

        Ok(Self {
            name: config.path.display().to_string(),
            session: Mutex::new(session),
            input_name,
            output_name,
            resolution,
            embedding_dim,
        })
    }
}

/// Square spatial size of an NCHW input, if the model fixes it
fn determine_resolution(session: &Session, input_name: &str) -> Option<u32> {
    let input = session.inputs.iter().find(|i| i.name == input_name)?;
    let dims = input.input_type.tensor_shape()?;
    let d = dims.len();
    if d < 2 {
        return None;
    }
    let (h, w) = (dims[d - 2], dims[d - 1]);
    if h > 0 && h == w { Some(h as u32) } else { None }
}

/// Product of all non-batch output dimensions, if every one is fixed
fn determine_embedding_dim(session: &Session, output_name: &str) -> Option<usize> {
    let output = session.outputs.iter().find(|o| o.name == output_name)?;
    let dims = output.output_type.tensor_shape()?;
    let rest: Vec<i64> = dims.iter().skip(1).copied().collect();
    if rest.is_empty() || rest.iter().any(|&d| d <= 0) {
        return None;
    }
    Some(rest.iter().product::<i64>() as usize)
}

impl VisionBackbone for OnnxBackbone {
    fn name(&self) -> &str {
        &self.name
    }

    fn input_resolution(&self) -> u32 {
        self.resolution
    }

    fn embedding_dim(&self) -> usize {
        self.embedding_dim
    }

    fn embed(&self, input: ArrayView4<'_, f32>) -> Result<Vec<f32>> {
        let value = Value::from_array(input.to_owned())?;
        let session_inputs = inputs![self.input_name.as_str() => value];

        let mut session = self
            .session
            .lock()
            .map_err(|_| anyhow!("ONNX backbone session lock poisoned"))?;
        let outputs = session.run(session_inputs)?;
        let output = outputs[self.output_name.as_str()].try_extract_array::<f32>()?;

        // Flatten to 1D feature vector
        let values: Vec<f32> = output.iter().copied().collect();
        if values.len() != self.embedding_dim {
            return Err(anyhow!(
                "Backbone produced {} values, expected {}",
                values.len(),
                self.embedding_dim
            ));
        }
        Ok(values)
    }
}
