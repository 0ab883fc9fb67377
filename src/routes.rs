//! Analysis handlers, one per request mode.
//!
//! Every handler follows the same cycle: buffer and validate the form, stage
//! the media, call the remote operation, normalize the result. Nothing touches
//! the disk or the network until validation has passed.

use axum::{
    Json,
    extract::{
        State,
        multipart::{Multipart, MultipartRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::Value;

use crate::{
    backend::{RemoteCall, RemoteOperation},
    detections::parse_detections,
    error::{ApiError, RelayError},
    messages::{
        BoxAnalysisResponse, InfoErrorResponse, InfoResponse, Point, TextAnalysisResponse,
        TrackerResponse, TrimWindow, VideoAnalysisResponse,
    },
    normalize::{MediaRef, RemotePayload},
    server::AppState,
    upload::{StagedFile, UploadForm},
};

pub const IMAGE_FAILURE: &str = "Failed to process image";
pub const VIDEO_FAILURE: &str = "Failed to process video";

const DEFAULT_THRESHOLD: f64 = 0.5;
const DEFAULT_MAX_FRAMES: f64 = 50.0;
const DEFAULT_TIMEOUT_SECONDS: u64 = 60;

type FormBody = Result<Multipart, MultipartRejection>;

pub async fn analyze_text(
    State(state): State<AppState>,
    body: FormBody,
) -> Result<Json<TextAnalysisResponse>, ApiError> {
    text_analysis(&state, body)
        .await
        .map(Json)
        .map_err(|e| e.into_api(IMAGE_FAILURE))
}

pub async fn analyze_box(
    State(state): State<AppState>,
    body: FormBody,
) -> Result<Json<BoxAnalysisResponse>, ApiError> {
    box_analysis(&state, body)
        .await
        .map(Json)
        .map_err(|e| e.into_api(IMAGE_FAILURE))
}

pub async fn analyze_tracker(
    State(state): State<AppState>,
    body: FormBody,
) -> Result<Json<TrackerResponse>, ApiError> {
    tracker_analysis(&state, body)
        .await
        .map(Json)
        .map_err(|e| e.into_api(IMAGE_FAILURE))
}

pub async fn analyze_video(
    State(state): State<AppState>,
    body: FormBody,
) -> Result<Json<VideoAnalysisResponse>, ApiError> {
    video_analysis(&state, body)
        .await
        .map(Json)
        .map_err(|e| e.into_api(VIDEO_FAILURE))
}

/// Diagnostics: the remote API description.
pub async fn info(State(state): State<AppState>) -> Response {
    let space_url = state.backend.endpoint_url().to_string();

    match state.backend.api_info().await {
        Ok(api_info) => {
            let endpoints = api_info
                .get("named_endpoints")
                .and_then(Value::as_object)
                .map(|named| named.keys().cloned().collect())
                .unwrap_or_default();
            Json(InfoResponse {
                success: true,
                space_url,
                api_info,
                endpoints,
            })
            .into_response()
        }
        Err(e) => {
            log::error!("Error getting API info from {space_url}: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(InfoErrorResponse {
                    success: false,
                    space_url,
                    error: "Failed to connect to the remote endpoint".to_string(),
                    details: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

async fn text_analysis(
    state: &AppState,
    body: FormBody,
) -> Result<TextAnalysisResponse, RelayError> {
    let mut form = UploadForm::read(body?, "image").await?;
    let image = form.take_file("No image provided")?;
    let prompt = form.text("prompt").unwrap_or_default().to_string();
    let threshold = form.threshold("threshold", DEFAULT_THRESHOLD)?;
    let mask_threshold = form.threshold("maskThreshold", DEFAULT_THRESHOLD)?;

    let operation = RemoteOperation::ImageText;
    let staged = StagedFile::stage(&state.config.temp_dir, operation.as_str(), &image).await?;
    let call = RemoteCall::new(operation)
        .file(staged.path(), staged.file_name(), staged.content_type())
        .arg(prompt)
        .arg(threshold)
        .arg(mask_threshold);
    let result = state.invoke(call).await?;
    drop(staged);

    let result_image = require_media(&result.payload)?;
    let details = result.payload.detail_text().map(str::to_owned);
    let detections = details.as_deref().map(parse_detections).unwrap_or_default();

    Ok(TextAnalysisResponse {
        success: true,
        data: result.payload.to_value(),
        duration: result.duration.as_secs_f64(),
        result_image: result_image.into(),
        details,
        detections,
    })
}

async fn box_analysis(state: &AppState, body: FormBody) -> Result<BoxAnalysisResponse, RelayError> {
    let mut form = UploadForm::read(body?, "image").await?;
    let image = form.take_file("No image provided")?;
    let raw_box = form
        .text("box")
        .ok_or_else(|| RelayError::bad_request("No bounding box provided"))?;
    let bbox = parse_box(raw_box)?;
    let multimask = form.flag("multimask");

    let operation = RemoteOperation::ImageBox;
    let staged = StagedFile::stage(&state.config.temp_dir, operation.as_str(), &image).await?;
    let call = RemoteCall::new(operation)
        .file(staged.path(), staged.file_name(), staged.content_type())
        .arg(bbox.to_vec())
        .arg(multimask);
    let result = state.invoke(call).await?;
    drop(staged);

    let result_image = require_media(&result.payload)?;
    let mask = result.payload.item(1).cloned().unwrap_or(Value::Null);

    Ok(BoxAnalysisResponse {
        success: true,
        data: result.payload.to_value(),
        duration: result.duration.as_secs_f64(),
        result_image: result_image.into(),
        mask,
    })
}

async fn tracker_analysis(state: &AppState, body: FormBody) -> Result<TrackerResponse, RelayError> {
    let mut form = UploadForm::read(body?, "image").await?;
    let image = form.take_file("No image provided")?;
    let points = form.text("points").map(parse_points).transpose()?.unwrap_or_default();
    let multimask = form.flag("multimask");
    log::debug!("Tracker request with {} point(s), multimask={multimask}", points.len());

    let operation = RemoteOperation::ImageTracker;
    let staged = StagedFile::stage(&state.config.temp_dir, operation.as_str(), &image).await?;
    let call = RemoteCall::new(operation)
        .file(staged.path(), staged.file_name(), staged.content_type())
        .arg(multimask);
    let result = state.invoke(call).await?;
    drop(staged);

    let result_image = require_media(&result.payload)?;

    Ok(TrackerResponse {
        success: true,
        result_image_url: result_image.href,
        full_response: result.payload.to_value(),
        points,
    })
}

async fn video_analysis(
    state: &AppState,
    body: FormBody,
) -> Result<VideoAnalysisResponse, RelayError> {
    let mut form = UploadForm::read(body?, "video").await?;
    let video = form.take_file("No video provided")?;
    let prompt = form.text("prompt").unwrap_or_default().to_string();
    let max_frames: f64 = form.number("maxFrames", DEFAULT_MAX_FRAMES)?;
    if max_frames <= 0.0 || !max_frames.is_finite() {
        return Err(RelayError::bad_request("Invalid maxFrames: must be positive"));
    }
    let timeout_seconds: u64 = form.number("timeoutSeconds", DEFAULT_TIMEOUT_SECONDS)?;
    if timeout_seconds == 0 {
        return Err(RelayError::bad_request("Invalid timeoutSeconds: must be positive"));
    }
    let trim = parse_trim(form.optional_number("trimStart")?, form.optional_number("trimEnd")?)?;

    let operation = RemoteOperation::VideoText;
    let staged = StagedFile::stage(&state.config.temp_dir, operation.as_str(), &video).await?;
    let call = RemoteCall::new(operation)
        .file(staged.path(), staged.file_name(), staged.content_type())
        .arg(prompt)
        .arg(max_frames)
        .arg(timeout_seconds);
    let result = state.invoke(call).await?;
    drop(staged);

    let result_video = require_media(&result.payload)?;
    let status = result.payload.detail_text().map(str::to_owned);

    Ok(VideoAnalysisResponse {
        success: true,
        data: result.payload.to_value(),
        duration: result.duration.as_secs_f64(),
        result_video: result_video.into(),
        status,
        trim,
    })
}

fn require_media(payload: &RemotePayload) -> Result<MediaRef, RelayError> {
    payload
        .primary_media()
        .ok_or_else(|| RelayError::NoMedia(payload.describe()))
}

/// Parses `[x1, y1, x2, y2]`; anything but exactly four numbers is rejected.
pub fn parse_box(raw: &str) -> Result<[f64; 4], RelayError> {
    let invalid = || RelayError::bad_request("Invalid box format. Expected [x1, y1, x2, y2]");

    let value: Value = serde_json::from_str(raw).map_err(|_| invalid())?;
    let items = value.as_array().filter(|items| items.len() == 4).ok_or_else(invalid)?;

    let mut coords = [0.0; 4];
    for (slot, item) in coords.iter_mut().zip(items) {
        *slot = item.as_f64().ok_or_else(invalid)?;
    }
    Ok(coords)
}

/// Parses click points given as `[[x, y], ...]` or `[{"x": .., "y": ..}, ...]`.
pub fn parse_points(raw: &str) -> Result<Vec<Point>, RelayError> {
    let invalid = || RelayError::bad_request("Invalid points format. Expected [[x, y], ...]");

    let value: Value = serde_json::from_str(raw).map_err(|_| invalid())?;
    let items = value.as_array().ok_or_else(invalid)?;

    items
        .iter()
        .map(|item| {
            let (x, y) = match item {
                Value::Array(pair) if pair.len() == 2 => (pair[0].as_f64(), pair[1].as_f64()),
                Value::Object(map) => (
                    map.get("x").and_then(Value::as_f64),
                    map.get("y").and_then(Value::as_f64),
                ),
                _ => (None, None),
            };
            match (x, y) {
                (Some(x), Some(y)) => Ok(Point { x, y }),
                _ => Err(invalid()),
            }
        })
        .collect()
}

fn parse_trim(start: Option<f64>, end: Option<f64>) -> Result<Option<TrimWindow>, RelayError> {
    let window = match (start, end) {
        (None, None) => return Ok(None),
        (start, end) => TrimWindow {
            start: start.unwrap_or(0.0),
            end,
        },
    };

    let finite = window.start.is_finite() && window.end.is_none_or(f64::is_finite);
    if !finite {
        return Err(RelayError::bad_request(
            "Invalid trim window: trimStart and trimEnd must be finite",
        ));
    }

    let valid_end = window.end.is_none_or(|end| end > window.start);
    if window.start < 0.0 || !valid_end {
        return Err(RelayError::bad_request(
            "Invalid trim window: trimEnd must be after trimStart",
        ));
    }
    Ok(Some(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn box_needs_exactly_four_numbers() {
        assert_eq!(parse_box("[10, 20, 110.5, 220]").unwrap(), [10.0, 20.0, 110.5, 220.0]);
        assert!(parse_box("[10, 20, 110]").is_err());
        assert!(parse_box("[10, 20, 110, 220, 5]").is_err());
        assert!(parse_box("[10, \"20\", 110, 220]").is_err());
        assert!(parse_box("{\"x1\": 10}").is_err());
        assert!(parse_box("10,20,30,40").is_err());
    }

    #[test]
    fn points_accept_pairs_and_objects() {
        assert_eq!(
            parse_points("[[1, 2], {\"x\": 3.5, \"y\": 4}]").unwrap(),
            vec![Point { x: 1.0, y: 2.0 }, Point { x: 3.5, y: 4.0 }]
        );
        assert!(parse_points("[]").unwrap().is_empty());
        assert!(parse_points("[[1]]").is_err());
        assert!(parse_points("{\"x\": 1}").is_err());
    }

    #[test]
    fn trim_window_validation() {
        assert_eq!(parse_trim(None, None).unwrap(), None);
        assert_eq!(
            parse_trim(Some(1.0), Some(4.0)).unwrap(),
            Some(TrimWindow { start: 1.0, end: Some(4.0) })
        );
        assert_eq!(
            parse_trim(None, Some(2.0)).unwrap(),
            Some(TrimWindow { start: 0.0, end: Some(2.0) })
        );
        assert!(parse_trim(Some(5.0), Some(2.0)).is_err());
        assert!(parse_trim(Some(-1.0), None).is_err());
        assert!(parse_trim(Some(f64::NAN), None).is_err());
        assert!(parse_trim(Some(1.0), Some(f64::INFINITY)).is_err());
    }
}
