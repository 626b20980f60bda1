//! Prediction endpoints.
//!
//! Inference runs on the blocking thread pool under a wall-clock
//! timeout, so a stuck forward pass turns into a 503 instead of tying
//! up the async runtime.

use std::sync::Arc;

use axum::{
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::warn;

use crate::inference::{InferenceService, Prediction, PredictionOutcome};
use crate::server::state::SharedState;
use crate::taxonomy::RiskTier;

use super::error_response;

#[derive(Serialize)]
pub struct PredictResponse {
    pub success: bool,
    pub primary_prediction: Prediction,
    pub all_predictions: Vec<Prediction>,
    pub risk_level: RiskTier,
}

impl From<PredictionOutcome> for PredictResponse {
    fn from(outcome: PredictionOutcome) -> Self {
        let primary = outcome.predictions[0].clone();
        Self {
            success: true,
            primary_prediction: primary,
            all_predictions: outcome.predictions,
            risk_level: outcome.risk_tier,
        }
    }
}

/// One slot of a batch response; exactly one of `prediction` and
/// `error` is set.
#[derive(Serialize)]
pub struct BatchSlot {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<PredictResponse>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct BatchResponse {
    pub results: Vec<BatchSlot>,
}

/// An uploaded file: client-supplied name plus raw bytes, or the reason
/// the part was rejected.
struct Upload {
    filename: String,
    payload: std::result::Result<Vec<u8>, String>,
}

/// POST /predict - classify a single uploaded image.
pub async fn predict(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<PredictResponse>, (StatusCode, String)> {
    let mut uploads = collect_uploads(multipart).await?;
    let upload = uploads.pop().ok_or((
        StatusCode::BAD_REQUEST,
        "no image file in request".to_string(),
    ))?;
    if !uploads.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "expected exactly one image file".to_string(),
        ));
    }
    let bytes = upload.payload.map_err(|e| (StatusCode::BAD_REQUEST, e))?;

    let outcome = run_blocking(&state, move |service| service.predict(&bytes))
        .await?
        .map_err(error_response)?;
    Ok(Json(outcome.into()))
}

/// POST /batch_predict - classify several uploaded images.
///
/// Always returns one slot per upload, in upload order; individual
/// failures are reported in their slot rather than failing the request.
pub async fn batch_predict(
    State(state): State<SharedState>,
    multipart: Multipart,
) -> Result<Json<BatchResponse>, (StatusCode, String)> {
    let uploads = collect_uploads(multipart).await?;
    if uploads.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "no image files in request".to_string(),
        ));
    }

    let outcomes = run_blocking(&state, move |service| {
        uploads
            .into_iter()
            .map(|upload| {
                let outcome = match upload.payload {
                    Ok(bytes) => service.predict(&bytes).map_err(|e| e.to_string()),
                    Err(reason) => Err(reason),
                };
                (upload.filename, outcome)
            })
            .collect::<Vec<_>>()
    })
    .await?;

    let results = outcomes
        .into_iter()
        .map(|(filename, outcome)| match outcome {
            Ok(result) => BatchSlot {
                filename,
                prediction: Some(result.into()),
                error: None,
            },
            Err(e) => {
                warn!("Batch item '{filename}' failed: {e}");
                BatchSlot {
                    filename,
                    prediction: None,
                    error: Some(e),
                }
            }
        })
        .collect();

    Ok(Json(BatchResponse { results }))
}

/// Pull every file field out of a multipart body. A field whose declared
/// content type is not an image is recorded as a rejected slot instead
/// of failing the whole request, so sibling uploads still get served.
async fn collect_uploads(mut multipart: Multipart) -> Result<Vec<Upload>, (StatusCode, String)> {
    let mut uploads = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("malformed multipart body: {e}"),
        )
    })? {
        let Some(content_type) = field.content_type().map(str::to_string) else {
            continue;
        };
        let filename = field.file_name().unwrap_or("upload").to_string();

        if !content_type.starts_with("image/") {
            uploads.push(Upload {
                filename,
                payload: Err(format!(
                    "unsupported content type '{content_type}', expected image/*"
                )),
            });
            continue;
        }

        let payload = match field.bytes().await {
            Ok(bytes) => Ok(bytes.to_vec()),
            Err(e) => Err(format!("failed to read upload: {e}")),
        };
        uploads.push(Upload { filename, payload });
    }

    Ok(uploads)
}

/// Run inference work on the blocking pool, bounded by the configured
/// request timeout. Overruns surface as 503, distinct from malformed
/// input.
async fn run_blocking<T, F>(state: &SharedState, work: F) -> Result<T, (StatusCode, String)>
where
    T: Send + 'static,
    F: FnOnce(&InferenceService) -> T + Send + 'static,
{
    let service: Arc<InferenceService> = state.service();
    let task = tokio::task::spawn_blocking(move || work(&service));

    match tokio::time::timeout(state.request_timeout(), task).await {
        Ok(Ok(result)) => Ok(result),
        Ok(Err(e)) => Err((
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("inference task failed: {e}"),
        )),
        Err(_) => Err((
            StatusCode::SERVICE_UNAVAILABLE,
            "inference timed out".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use image::{ImageBuffer, Rgb};
    use tempfile::TempDir;
    use tower::ServiceExt;

    use crate::config::AppConfig;
    use crate::inference::InferenceService;
    use crate::server::state::AppState;
    use crate::server::build_router;

    const BOUNDARY: &str = "dermalens-test-boundary";

    fn test_router(dir: &TempDir) -> axum::Router {
        let mut config = AppConfig::default();
        config.model.backbone = "resnet18".to_string();
        config.model.checkpoint_path = dir.path().join("absent.json");
        config.data.image_size = 64;

        let service = InferenceService::from_config(&config).unwrap();
        build_router(std::sync::Arc::new(AppState::new(service, &config.api)))
    }

    fn encode_test_image(width: u32, height: u32) -> Vec<u8> {
        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 100u8])
        });
        let mut bytes = Vec::new();
        img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
            .unwrap();
        bytes
    }

    fn multipart_body(parts: &[(&str, &str, &[u8])]) -> Vec<u8> {
        let mut body = Vec::new();
        for (filename, content_type, bytes) in parts {
            body.extend_from_slice(format!("--{BOUNDARY}\r\n").as_bytes());
            body.extend_from_slice(
                format!(
                    "Content-Disposition: form-data; name=\"file\"; filename=\"{filename}\"\r\n"
                )
                .as_bytes(),
            );
            body.extend_from_slice(format!("Content-Type: {content_type}\r\n\r\n").as_bytes());
            body.extend_from_slice(bytes);
            body.extend_from_slice(b"\r\n");
        }
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
        body
    }

    #[tokio::test]
    async fn test_batch_isolates_non_image_part_to_its_slot() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let png = encode_test_image(64, 64);
        let body = multipart_body(&[
            ("lesion.png", "image/png", &png),
            ("notes.txt", "text/plain", b"not an image"),
        ]);

        let request = Request::builder()
            .method("POST")
            .uri("/batch_predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        let results = json["results"].as_array().unwrap();
        assert_eq!(results.len(), 2);

        assert_eq!(results[0]["filename"], "lesion.png");
        assert_eq!(results[0]["prediction"]["success"], true);
        assert!(results[0].get("error").is_none());

        assert_eq!(results[1]["filename"], "notes.txt");
        assert!(results[1].get("prediction").is_none());
        let error = results[1]["error"].as_str().unwrap();
        assert!(error.contains("content type"));
    }

    #[tokio::test]
    async fn test_single_predict_rejects_non_image_part() {
        let dir = TempDir::new().unwrap();
        let router = test_router(&dir);

        let body = multipart_body(&[("notes.txt", "text/plain", b"not an image")]);
        let request = Request::builder()
            .method("POST")
            .uri("/predict")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = router.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
