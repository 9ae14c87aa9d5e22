use crate::error::ApiError;
use crate::pipeline::{Pipeline, PredictResponse};
use crate::state::{AppState, ModelState};
use axum::{
    Json,
    body::Bytes,
    extract::{
        Multipart, State,
        multipart::{MultipartError, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use inference::LabelMap;
use serde_json::json;
use std::time::Instant;

pub const ROOT_MESSAGE: &str = "YOLOv11 K-Food Object Detection API is running!";
const UPLOAD_FIELD: &str = "file";

pub async fn root() -> Json<serde_json::Value> {
    Json(json!({ "message": ROOT_MESSAGE }))
}

pub async fn health(State(state): State<AppState>) -> Response {
    match &state.model {
        ModelState::Ready(detector) => Json(json!({
            "status": "ok",
            "model_loaded": true,
            "classes": detector.labels().len(),
        }))
        .into_response(),
        ModelState::Unavailable(reason) => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({
                "status": "unavailable",
                "model_loaded": false,
                "detail": reason.as_ref(),
            })),
        )
            .into_response(),
    }
}

#[derive(Debug)]
struct Upload {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Bytes,
}

pub async fn predict(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<PredictResponse>, ApiError> {
    let start = Instant::now();
    let result = run_predict(&state, multipart).await;

    match &result {
        Ok(response) => state
            .metrics
            .record_success(start.elapsed(), response.analysis_results.len()),
        Err(e) => state.metrics.record_failure(start.elapsed(), e.status().as_u16()),
    }

    result.map(Json)
}

async fn run_predict(
    state: &AppState,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<PredictResponse, ApiError> {
    let detector = match &state.model {
        ModelState::Ready(detector) => detector.clone(),
        ModelState::Unavailable(reason) => return Err(ApiError::ModelUnavailable(reason.to_string())),
    };

    let multipart = multipart.map_err(|rejection| ApiError::BadRequest(rejection.body_text()))?;
    let upload = read_upload(multipart).await?;

    let content_type = upload.content_type.as_deref().unwrap_or_default();
    if !content_type.starts_with("image/") {
        return Err(ApiError::BadRequest(
            "Invalid file type. Please upload an image file.".to_string(),
        ));
    }
    if upload.bytes.is_empty() {
        return Err(ApiError::BadRequest(
            "No image file to analyze was uploaded.".to_string(),
        ));
    }

    tracing::info!(
        file_name = upload.file_name.as_deref().unwrap_or("<unnamed>"),
        content_type,
        bytes = upload.bytes.len(),
        "Received image"
    );

    let annotator = state.annotator.clone();
    let jpeg_quality = state.jpeg_quality;
    let bytes = upload.bytes;

    let task = tokio::task::spawn_blocking(move || {
        Pipeline {
            detector: detector.as_ref(),
            annotator: &annotator,
            jpeg_quality,
        }
        .analyze(&bytes)
    });

    let joined = match state.request_timeout {
        Some(limit) => tokio::time::timeout(limit, task)
            .await
            .map_err(|_| ApiError::Timeout(limit))?,
        None => task.await,
    };

    let response = joined
        .map_err(|e| ApiError::Processing(format!("processing task failed: {e}")))??;

    tracing::info!(
        detections = response.analysis_results.len(),
        labels = ?response.detected_food_labels,
        overall_average_confidence = response.overall_average_confidence,
        "Prediction complete"
    );

    Ok(response)
}

/// Take the `file` field, or else the first field carrying a filename.
async fn read_upload(mut multipart: Multipart) -> Result<Upload, ApiError> {
    let mut fallback = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let is_upload_field = field.name() == Some(UPLOAD_FIELD);
        if !is_upload_field && (fallback.is_some() || field.file_name().is_none()) {
            continue;
        }

        let file_name = field.file_name().map(str::to_owned);
        let content_type = field.content_type().map(str::to_owned);
        let bytes = field.bytes().await.map_err(multipart_error)?;
        let upload = Upload {
            file_name,
            content_type,
            bytes,
        };

        if is_upload_field {
            return Ok(upload);
        }
        fallback = Some(upload);
    }

    fallback.ok_or_else(|| ApiError::BadRequest("No image file to analyze was uploaded.".to_string()))
}

fn multipart_error(err: MultipartError) -> ApiError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::PayloadTooLarge(err.body_text())
    } else {
        ApiError::BadRequest(err.body_text())
    }
}
