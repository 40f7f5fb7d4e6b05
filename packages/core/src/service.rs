//! Prediction orchestration: encode, preprocess, embed, fuse, softmax, label.

use std::sync::Arc;

use histofuse_types::JsonSchema;
use histofuse_types::image::DynamicImage;
use histofuse_types::utils::argmax;
use serde::{Deserialize, Serialize};

use crate::biomarker::BiomarkerObservation;
use crate::bundle::ModelBundle;
use crate::error::{FusionError, FusionResult};
use crate::labels::{FollowUp, RiskLevel};
use crate::preprocess::ImagePreprocessor;

/// Outcome of one prediction request
#[derive(Serialize, Deserialize, JsonSchema, Clone, Debug, PartialEq)]
pub struct PredictionResult {
    pub class_index: usize,
    pub label: String,
    /// One probability per subtype, in label mapping order, summing to 1
    pub probabilities: Vec<f32>,
    /// Subtype names parallel to `probabilities`
    pub labels: Vec<String>,
}

impl PredictionResult {
    /// Probability of the selected subtype
    pub fn confidence(&self) -> f32 {
        self.probabilities
            .get(self.class_index)
            .copied()
            .unwrap_or(0.0)
    }

    /// `(label, probability)` pairs in label mapping order
    pub fn labeled_probabilities(&self) -> Vec<(String, f32)> {
        self.labels
            .iter()
            .cloned()
            .zip(self.probabilities.iter().copied())
            .collect()
    }

    /// Pairs ordered by descending probability, ties keep label order
    pub fn ranked(&self) -> Vec<(String, f32)> {
        let mut pairs = self.labeled_probabilities();
        pairs.sort_by(|a, b| b.1.total_cmp(&a.1));
        pairs
    }

    pub fn risk_level(&self) -> RiskLevel {
        RiskLevel::for_subtype(&self.label)
    }

    pub fn follow_up(&self) -> FollowUp {
        FollowUp::for_confidence(self.confidence())
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    exps.into_iter().map(|e| e / sum).collect()
}

/// Runs predictions against a shared, read-only [`ModelBundle`]
#[derive(Clone, Debug)]
pub struct PredictionService {
    bundle: Arc<ModelBundle>,
    preprocessor: ImagePreprocessor,
}

impl PredictionService {
    pub fn new(bundle: Arc<ModelBundle>) -> Self {
        let preprocessor = ImagePreprocessor::new(bundle.backbone().input_resolution());
        Self {
            bundle,
            preprocessor,
        }
    }

    pub fn bundle(&self) -> &ModelBundle {
        &self.bundle
    }

    pub fn preprocessor(&self) -> &ImagePreprocessor {
        &self.preprocessor
    }

    /// Predict from raw upload bytes.
    ///
    /// Both inputs are required; `None` is rejected as invalid input.
    pub fn predict(
        &self,
        image: Option<&[u8]>,
        observation: Option<&BiomarkerObservation>,
    ) -> FusionResult<PredictionResult> {
        let bytes = image.ok_or_else(|| FusionError::invalid_input("no image was provided"))?;
        let observation = observation
            .ok_or_else(|| FusionError::invalid_input("no biomarker observation was provided"))?;
        let image = self.preprocessor.decode(bytes).map_err(into_invalid_input)?;
        self.predict_image(&image, observation)
    }

    /// Predict from an already decoded image
    pub fn predict_image(
        &self,
        image: &DynamicImage,
        observation: &BiomarkerObservation,
    ) -> FusionResult<PredictionResult> {
        let features = self.bundle.encoder().encode(observation);
        if features.active() < 3 {
            tracing::debug!(
                marker = %observation.marker,
                intensity = %observation.intensity,
                staining = %observation.staining,
                active = features.active(),
                "Observation has values outside the known feature columns"
            );
        }

        let tensor = self.preprocessor.preprocess(image).map_err(into_invalid_input)?;

        let embedding = self
            .bundle
            .backbone()
            .embed(tensor.view())
            .map_err(|e| FusionError::inference(format!("backbone forward pass failed: {e}")))?;

        let logits = self.bundle.head().forward(&embedding, &features)?;
        if logits.iter().any(|l| !l.is_finite()) {
            return Err(FusionError::inference("fusion head produced non-finite logits"));
        }

        let probabilities = softmax(&logits);
        let class_index = argmax(&probabilities)
            .ok_or_else(|| FusionError::inference("fusion head produced no logits"))?;
        let labels = self.bundle.labels();
        let label = labels
            .label(class_index)
            .ok_or_else(|| {
                FusionError::inference(format!("class index {class_index} has no label"))
            })?
            .to_string();

        tracing::debug!(
            label = %label,
            confidence = probabilities[class_index],
            marker = %observation.marker,
            "Prediction complete"
        );

        Ok(PredictionResult {
            class_index,
            label,
            probabilities,
            labels: labels.labels().to_vec(),
        })
    }
}

fn into_invalid_input(err: FusionError) -> FusionError {
    match err {
        FusionError::InvalidImage(reason) => {
            FusionError::invalid_input(format!("image could not be used: {reason}"))
        }
        other => other,
    }
}
