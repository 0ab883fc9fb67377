//! JSON bodies exchanged with the browser.
//!
//! Field names follow what the front-end reads, so most structs keep snake_case
//! while the diagnostics replies use camelCase.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::detections::Detection;

/// Body of every failed request.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ErrorBody {
    /// Short headline, e.g. "Failed to process image".
    pub error: String,
    /// Underlying cause, when there is one worth showing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Media reference handed back to the browser.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ResultMedia {
    /// The remote `url`, or the remote `path` when no url was given.
    pub url: String,
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orig_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

/// Reply of `POST /analyze/text`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TextAnalysisResponse {
    pub success: bool,
    /// The remote result, untouched.
    pub data: Value,
    /// Seconds spent in the remote call.
    pub duration: f64,
    pub result_image: ResultMedia,
    /// Free-text summary produced by the remote model.
    pub details: Option<String>,
    /// Detections parsed out of `details`, highest confidence first.
    pub detections: Vec<Detection>,
}

/// Reply of `POST /analyze/box`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BoxAnalysisResponse {
    pub success: bool,
    pub data: Value,
    pub duration: f64,
    pub result_image: ResultMedia,
    /// Second remote output, `null` when absent.
    pub mask: Value,
}

/// A click position in image pixels.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

/// Reply of `POST /analyze/tracker`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackerResponse {
    pub success: bool,
    pub result_image_url: String,
    pub full_response: Value,
    /// The click points received with the request.
    pub points: Vec<Point>,
}

/// Playback window in seconds; an absent `end` means the end of the clip.
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct TrimWindow {
    pub start: f64,
    pub end: Option<f64>,
}

/// Reply of `POST /analyze/video`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct VideoAnalysisResponse {
    pub success: bool,
    pub data: Value,
    pub duration: f64,
    pub result_video: ResultMedia,
    /// Status text reported by the remote model.
    pub status: Option<String>,
    pub trim: Option<TrimWindow>,
}

/// Reply of `GET /info` when the remote endpoint answered.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoResponse {
    pub success: bool,
    pub space_url: String,
    /// The raw API description.
    pub api_info: Value,
    /// Names of the operations listed under `named_endpoints`.
    pub endpoints: Vec<String>,
}

/// Reply of `GET /info` when the remote endpoint could not be reached.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InfoErrorResponse {
    pub success: bool,
    pub space_url: String,
    pub error: String,
    pub details: String,
}
