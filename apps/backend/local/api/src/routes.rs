//! Axum routes for the prediction service
//!
//! Uploads arrive as `multipart/form-data`; predictions and overlays run on the
//! blocking pool so the async workers stay free while a forward pass runs.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, Multipart, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use histofuse::encoder::{BIOMARKER_PREFIX, INTENSITY_PREFIX, STAINING_PREFIX};
use histofuse::{
    AttentionMap, Biomarker, BiomarkerObservation, CellularLocation, FollowUp, FusionError,
    PredictionResult, PredictionService, RiskLevel, render_overlay_png, subtype_notes,
};
use schemars::JsonSchema;
use serde::Serialize;

/// Uploads above this size are rejected before they reach the decoder
pub const MAX_UPLOAD_BYTES: usize = 200 * 1024 * 1024;

#[derive(Clone)]
pub struct AppState {
    pub service: PredictionService,
    pub attention: Arc<dyn AttentionMap>,
}

impl AppState {
    pub fn new(service: PredictionService, attention: Arc<dyn AttentionMap>) -> Self {
        Self { service, attention }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/subtypes", get(list_subtypes))
        .route("/biomarkers", get(list_biomarkers))
        .route("/options", get(form_options))
        .route("/schema/prediction", get(prediction_schema))
        .route("/predict", post(predict))
        .route("/attention", post(attention))
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(Arc::new(state))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub backbone: String,
    pub subtypes: Vec<String>,
    pub feature_columns: usize,
}

#[derive(Debug, Serialize)]
pub struct SubtypeInfo {
    pub index: usize,
    pub label: String,
    pub risk_level: RiskLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<&'static str>,
}

#[derive(Debug, Serialize)]
pub struct BiomarkerInfo {
    pub name: &'static str,
    pub description: &'static str,
    /// Typical expression per loaded subtype, where one is characteristic
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub expected_patterns: BTreeMap<String, &'static str>,
}

/// Values the loaded feature columns know for each form field
#[derive(Debug, Serialize)]
pub struct FormOptions {
    pub markers: Vec<String>,
    pub intensities: Vec<String>,
    pub stainings: Vec<String>,
    pub locations: Vec<CellularLocation>,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct LabeledProbability {
    pub label: String,
    pub probability: f32,
}

#[derive(Debug, Serialize, JsonSchema)]
pub struct PredictionResponse {
    pub label: String,
    pub class_index: usize,
    pub confidence: f32,
    pub risk_level: RiskLevel,
    pub follow_up: FollowUp,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    /// In label mapping order
    pub probabilities: Vec<LabeledProbability>,
}

impl From<PredictionResult> for PredictionResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            confidence: result.confidence(),
            risk_level: result.risk_level(),
            follow_up: result.follow_up(),
            notes: subtype_notes(&result.label).map(str::to_string),
            probabilities: result
                .labeled_probabilities()
                .into_iter()
                .map(|(label, probability)| LabeledProbability { label, probability })
                .collect(),
            class_index: result.class_index,
            label: result.label,
        }
    }
}

/// Maps the pipeline's error taxonomy onto HTTP statuses with an `{error}` body
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::warn!("Bad request: {}", msg);
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        let msg = msg.into();
        tracing::error!("Internal error: {}", msg);
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg,
        }
    }
}

impl From<FusionError> for ApiError {
    fn from(err: FusionError) -> Self {
        match err {
            e if e.is_invalid_input() => ApiError::bad_request(e.to_string()),
            e @ FusionError::ModelUnavailable { .. } => {
                tracing::error!("Service unavailable: {}", e);
                ApiError {
                    status: StatusCode::SERVICE_UNAVAILABLE,
                    message: e.to_string(),
                }
            }
            e => ApiError::internal(e.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorBody<'a> {
            error: &'a str,
        }

        (
            self.status,
            Json(ErrorBody {
                error: &self.message,
            }),
        )
            .into_response()
    }
}

async fn health_check(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let bundle = state.service.bundle();
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backbone: bundle.backbone().name().to_string(),
        subtypes: bundle.labels().labels().to_vec(),
        feature_columns: bundle.encoder().dim(),
    })
}

async fn list_subtypes(State(state): State<Arc<AppState>>) -> Json<Vec<SubtypeInfo>> {
    let subtypes = state
        .service
        .bundle()
        .labels()
        .labels()
        .iter()
        .enumerate()
        .map(|(index, label)| SubtypeInfo {
            index,
            label: label.clone(),
            risk_level: RiskLevel::for_subtype(label),
            notes: subtype_notes(label),
        })
        .collect();
    Json(subtypes)
}

async fn list_biomarkers(State(state): State<Arc<AppState>>) -> Json<Vec<BiomarkerInfo>> {
    let bundle = state.service.bundle();
    let subtypes = bundle.labels().labels();
    Json(
        Biomarker::ALL
            .iter()
            .map(|b| BiomarkerInfo {
                name: b.name(),
                description: b.description(),
                expected_patterns: subtypes
                    .iter()
                    .filter_map(|s| b.expected_pattern(s).map(|p| (s.clone(), p)))
                    .collect(),
            })
            .collect(),
    )
}

async fn form_options(State(state): State<Arc<AppState>>) -> Json<FormOptions> {
    let bundle = state.service.bundle();
    let columns = bundle.encoder().columns();
    let values = |prefix: &'static str| -> Vec<String> {
        columns.axis_values(prefix).map(str::to_string).collect()
    };
    Json(FormOptions {
        markers: values(BIOMARKER_PREFIX),
        intensities: values(INTENSITY_PREFIX),
        stainings: values(STAINING_PREFIX),
        locations: CellularLocation::ALL.to_vec(),
    })
}

async fn prediction_schema() -> Json<schemars::Schema> {
    Json(schemars::schema_for!(PredictionResponse))
}

/// Fields of one prediction upload
#[derive(Debug, Default)]
struct PredictForm {
    image: Option<Vec<u8>>,
    marker: Option<String>,
    intensity: Option<String>,
    staining: Option<String>,
    location: Option<String>,
}

impl PredictForm {
    async fn read(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut form = PredictForm::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::bad_request(format!("Malformed multipart body: {}", e)))?
        {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "image" => {
                    let bytes = field.bytes().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read image: {}", e))
                    })?;
                    form.image = Some(bytes.to_vec());
                }
                "marker" | "intensity" | "staining" | "location" => {
                    let text = field.text().await.map_err(|e| {
                        ApiError::bad_request(format!("Failed to read field '{}': {}", name, e))
                    })?;
                    let slot = match name.as_str() {
                        "marker" => &mut form.marker,
                        "intensity" => &mut form.intensity,
                        "staining" => &mut form.staining,
                        _ => &mut form.location,
                    };
                    *slot = Some(text);
                }
                other => tracing::debug!(field = %other, "Ignoring unknown multipart field"),
            }
        }
        Ok(form)
    }

    /// `None` when no biomarker field was sent at all
    fn observation(&self) -> Result<Option<BiomarkerObservation>, ApiError> {
        let observation = match (&self.marker, &self.intensity, &self.staining) {
            (None, None, None) => return Ok(None),
            (Some(marker), Some(intensity), Some(staining)) => {
                BiomarkerObservation::new(marker, intensity, staining)
            }
            _ => {
                return Err(ApiError::bad_request(
                    "marker, intensity and staining must be provided together",
                ));
            }
        };

        match &self.location {
            None => Ok(Some(observation)),
            Some(name) => CellularLocation::from_name(name)
                .map(|location| Some(observation.with_location(location)))
                .ok_or_else(|| {
                    ApiError::bad_request(format!("Unknown cellular location '{}'", name))
                }),
        }
    }
}

async fn predict(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<PredictionResponse>, ApiError> {
    let form = PredictForm::read(multipart).await?;
    let observation = form.observation()?;
    let image = form.image;

    let service = state.service.clone();
    let result = tokio::task::spawn_blocking(move || {
        service.predict(image.as_deref(), observation.as_ref())
    })
    .await
    .map_err(|e| ApiError::internal(format!("Prediction task failed: {}", e)))??;

    tracing::info!(
        label = %result.label,
        confidence = result.confidence(),
        "Served prediction"
    );
    Ok(Json(result.into()))
}

async fn attention(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Response, ApiError> {
    let image = PredictForm::read(multipart)
        .await?
        .image
        .ok_or_else(|| ApiError::from(FusionError::invalid_input("no image was provided")))?;

    let attention = state.attention.clone();
    let png = tokio::task::spawn_blocking(move || render_overlay_png(attention.as_ref(), &image))
        .await
        .map_err(|e| ApiError::internal(format!("Overlay task failed: {}", e)))??;

    Ok(([(header::CONTENT_TYPE, "image/png")], png).into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use histofuse::model_provider::VisionBackbone;
    use histofuse::model_provider::ml::ndarray::ArrayView4;
    use histofuse::types::image::{DynamicImage, GenericImageView, Rgb, RgbImage};
    use histofuse::types::utils::img;
    use histofuse::{
        FeatureColumns, FusionHead, FusionHeadWeights, LabelMapping, LinearWeights, ModelBundle,
        SyntheticAttention,
    };
    use tower::ServiceExt;

    const BOUNDARY: &str = "histofuse-test-boundary";

    struct MeanBackbone;

    impl VisionBackbone for MeanBackbone {
        fn name(&self) -> &str {
            "mean"
        }

        fn input_resolution(&self) -> u32 {
            32
        }

        fn embedding_dim(&self) -> usize {
            2
        }

        fn embed(&self, input: ArrayView4<'_, f32>) -> histofuse::types::Result<Vec<f32>> {
            let mean = input.mean().unwrap_or(0.0);
            Ok(vec![mean, 1.0])
        }
    }

    fn identity(n: usize, cols: usize) -> LinearWeights {
        LinearWeights {
            weight: (0..n)
                .map(|i| (0..cols).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
                .collect(),
            bias: vec![0.0; n],
        }
    }

    fn state() -> AppState {
        let columns = FeatureColumns::new(
            ["biomarker_Ki-67", "intensity_Strong", "staining_Nuclear"]
                .map(String::from)
                .to_vec(),
        )
        .unwrap();
        let labels =
            LabelMapping::new(["IDC", "TNBC", "MBC", "ILC"].map(String::from).to_vec()).unwrap();
        let head = FusionHead::from_weights(&FusionHeadWeights {
            biomarker_projection: identity(3, 3),
            hidden: identity(5, 5),
            classifier: LinearWeights {
                weight: vec![
                    vec![0.0, 0.0, 0.0, 0.0, 0.0],
                    vec![0.0, 0.0, 2.0, 1.0, 0.0],
                    vec![0.0, 0.0, 0.0, 0.0, 1.0],
                    vec![0.0, 0.0, 0.0, 0.0, 0.0],
                ],
                bias: vec![0.0; 4],
            },
            dropout: 0.3,
        })
        .unwrap();
        let bundle = ModelBundle::new(Arc::new(MeanBackbone), head, labels, columns).unwrap();
        AppState::new(
            PredictionService::new(Arc::new(bundle)),
            Arc::new(SyntheticAttention::default()),
        )
    }

    fn png(w: u32, h: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([210, 150, 200])));
        img::encode_png(&image).unwrap()
    }

    fn multipart_body(texts: &[(&str, &str)], image: Option<&[u8]>) -> Vec<u8> {
        let mut body = Vec::new();
        for (name, value) in texts {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
                )
                .as_bytes(),
            );
        }
        if let Some(bytes) = image {
            body.extend_from_slice(
                format!(
                    "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"image\"; filename=\"tile.png\"\r\nContent-Type: image/png\r\n\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    fn multipart_request(uri: &str, body: Vec<u8>) -> Request<Body> {
        Request::post(uri)
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    const KI67: [(&str, &str); 4] = [
        ("marker", "Ki-67"),
        ("intensity", "Strong"),
        ("staining", "Nuclear"),
        ("location", "Nuclear"),
    ];

    #[tokio::test]
    async fn health_reports_bundle() {
        let app = router(state());
        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["backbone"], "mean");
        assert_eq!(json["feature_columns"], 3);
        assert_eq!(json["subtypes"][1], "TNBC");
    }

    #[tokio::test]
    async fn predict_returns_probabilities() {
        let app = router(state());
        let body = multipart_body(&KI67, Some(&png(64, 48)));
        let resp = app.oneshot(multipart_request("/predict", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = json_body(resp).await;
        // projection is the identity, so the Ki-67 and Strong columns drive TNBC
        assert_eq!(json["label"], "TNBC");
        assert_eq!(json["risk_level"], "High");
        let probabilities = json["probabilities"].as_array().unwrap();
        assert_eq!(probabilities.len(), 4);
        let sum: f64 = probabilities
            .iter()
            .map(|p| p["probability"].as_f64().unwrap())
            .sum();
        assert!((sum - 1.0).abs() < 1e-5);
    }

    #[tokio::test]
    async fn predict_without_image_is_bad_request() {
        let app = router(state());
        let resp = app
            .oneshot(multipart_request("/predict", multipart_body(&KI67, None)))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = json_body(resp).await;
        assert!(json["error"].as_str().unwrap().contains("no image"));
    }

    #[tokio::test]
    async fn partial_observation_is_bad_request() {
        let app = router(state());
        let body = multipart_body(&[("marker", "Ki-67")], Some(&png(16, 16)));
        let resp = app.oneshot(multipart_request("/predict", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn unknown_location_is_bad_request() {
        let app = router(state());
        let mut fields = KI67;
        fields[3] = ("location", "Nucleolar");
        let body = multipart_body(&fields, Some(&png(16, 16)));
        let resp = app.oneshot(multipart_request("/predict", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn corrupt_image_is_bad_request() {
        let app = router(state());
        let body = multipart_body(&KI67, Some(b"not an image"));
        let resp = app.oneshot(multipart_request("/predict", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn attention_returns_png_of_same_size() {
        let app = router(state());
        let body = multipart_body(&[], Some(&png(300, 200)));
        let resp = app.oneshot(multipart_request("/attention", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[header::CONTENT_TYPE], "image/png");

        let bytes = axum::body::to_bytes(resp.into_body(), 16 * 1024 * 1024)
            .await
            .unwrap();
        let overlay = img::decode(&bytes).unwrap();
        assert_eq!(overlay.dimensions(), (300, 200));
    }

    #[tokio::test]
    async fn subtypes_and_biomarkers_are_listed() {
        let resp = router(state())
            .oneshot(Request::get("/subtypes").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(resp).await;
        assert_eq!(json[3]["label"], "ILC");
        assert_eq!(json[3]["risk_level"], "Moderate");

        let resp = router(state())
            .oneshot(Request::get("/biomarkers").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let json = json_body(resp).await;
        let markers = json.as_array().unwrap();
        assert_eq!(markers.len(), Biomarker::ALL.len());
        assert!(markers.iter().any(|m| m["name"] == "SNAI"));

        let cdh1 = markers.iter().find(|m| m["name"] == "CDH1").unwrap();
        assert_eq!(cdh1["expected_patterns"]["ILC"], "Negative/Loss");
        assert!(cdh1["expected_patterns"].get("TNBC").is_none());
        let rb1 = markers.iter().find(|m| m["name"] == "RB1").unwrap();
        assert!(rb1.get("expected_patterns").is_none());
    }

    #[tokio::test]
    async fn form_options_come_from_feature_columns() {
        let resp = router(state())
            .oneshot(Request::get("/options").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["markers"], serde_json::json!(["Ki-67"]));
        assert_eq!(json["intensities"], serde_json::json!(["Strong"]));
        assert_eq!(json["stainings"], serde_json::json!(["Nuclear"]));
        assert_eq!(
            json["locations"],
            serde_json::json!(["Nuclear", "Cytoplasmic", "Membranous"])
        );
    }

    #[tokio::test]
    async fn prediction_schema_describes_response() {
        let resp = router(state())
            .oneshot(Request::get("/schema/prediction").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert!(json["properties"]["probabilities"].is_object());
    }

    #[test]
    fn model_unavailable_maps_to_503() {
        let err = ApiError::from(FusionError::model_unavailable("no weights"));
        assert_eq!(err.status, StatusCode::SERVICE_UNAVAILABLE);
        let err = ApiError::from(FusionError::inference("nan"));
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
        let err = ApiError::from(FusionError::invalid_image("truncated"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }
}
