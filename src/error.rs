//! Error types and their mapping to HTTP replies.
//!
//! [`RemoteError`] covers the remote endpoint, [`RelayError`] everything a
//! handler can hit. Handlers turn a [`RelayError`] into an [`ApiError`] with
//! [`RelayError::into_api`], which also logs it.

use axum::{
    Json,
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::messages::ErrorBody;

/// Details returned when the remote scheduler refuses work and gives no message.
pub const QUOTA_FALLBACK_DETAILS: &str =
    "The GPU quota of the remote endpoint has been exceeded. Please try again later.";

/// Title used for every quota error returned to the browser.
pub const QUOTA_ERROR: &str = "GPU quota exceeded";

/// Errors raised while talking to the remote inference endpoint.
#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// The remote GPU scheduler refused the job (ZeroGPU quota, rate limit).
    #[error("{0}")]
    QuotaExceeded(String),
    /// The remote endpoint reported a failure.
    #[error("{0}")]
    Failed(String),
    /// The request never produced a response.
    #[error("request to remote endpoint failed: {0}")]
    Transport(#[from] reqwest::Error),
    /// The remote endpoint answered with something we cannot read.
    #[error("unexpected response from remote endpoint: {0}")]
    Protocol(String),
}

impl RemoteError {
    /// Builds an error from a remote message, classifying quota signals.
    pub fn from_message(message: impl Into<String>) -> Self {
        let message = message.into();
        if mentions_quota(&message) {
            RemoteError::QuotaExceeded(message)
        } else {
            RemoteError::Failed(message)
        }
    }

    /// Returns true when the failure is a quota or rate-limit signal.
    pub fn is_quota(&self) -> bool {
        match self {
            RemoteError::QuotaExceeded(_) => true,
            RemoteError::Failed(message) | RemoteError::Protocol(message) => {
                mentions_quota(message)
            }
            RemoteError::Transport(_) => false,
        }
    }
}

/// Quota failures are recognised by message text, the remote API has no error codes.
pub fn mentions_quota(text: &str) -> bool {
    text.contains("ZeroGPU") || text.to_ascii_lowercase().contains("quota")
}

/// Everything that can go wrong while handling one relay request.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Invalid client input; the message is shown as is.
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// The remote result had no media reference; carries the payload rendering.
    #[error("remote result did not contain a media reference: {0}")]
    NoMedia(String),
    /// Writing the upload to the temp directory failed.
    #[error("failed to stage upload: {0}")]
    Staging(#[from] std::io::Error),
    /// The multipart body could not be read, including size limit breaches.
    #[error("invalid multipart body: {0}")]
    Multipart(#[from] MultipartError),
}

impl From<MultipartRejection> for RelayError {
    fn from(rejection: MultipartRejection) -> Self {
        RelayError::BadRequest(rejection.body_text())
    }
}

impl RelayError {
    /// Shorthand for [`RelayError::BadRequest`].
    pub fn bad_request(message: impl Into<String>) -> Self {
        RelayError::BadRequest(message.into())
    }

    /// Converts the error into the JSON body returned to the browser.
    ///
    /// `failure` is the headline used for generic processing failures, for
    /// example "Failed to process image".
    pub fn into_api(self, failure: &str) -> ApiError {
        match self {
            RelayError::BadRequest(message) => {
                log::warn!("Rejected request: {message}");
                ApiError::new(StatusCode::BAD_REQUEST, message, None)
            }
            RelayError::Multipart(e) => {
                log::warn!("Rejected multipart body: {e}");
                let status = e.status();
                let error = if status == StatusCode::PAYLOAD_TOO_LARGE {
                    "Upload too large"
                } else {
                    "Invalid form data"
                };
                ApiError::new(status, error, Some(e.body_text()))
            }
            RelayError::Remote(e) if e.is_quota() => {
                log::warn!("Remote quota exceeded: {e}");
                let message = e.to_string();
                let details = if message.trim().is_empty() {
                    QUOTA_FALLBACK_DETAILS.to_string()
                } else {
                    message
                };
                ApiError::new(StatusCode::TOO_MANY_REQUESTS, QUOTA_ERROR, Some(details))
            }
            RelayError::Remote(e) => {
                log::error!("{failure}: {e}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    failure,
                    Some(e.to_string()),
                )
            }
            e @ (RelayError::NoMedia(_) | RelayError::Staging(_)) => {
                log::error!("{failure}: {e}");
                ApiError::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    failure,
                    Some(e.to_string()),
                )
            }
        }
    }
}

/// Structured JSON error returned at the handler boundary.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub body: ErrorBody,
}

impl ApiError {
    /// Builds an error reply from a status, a headline and optional details.
    pub fn new(status: StatusCode, error: impl Into<String>, details: Option<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                details,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quota_messages_are_classified() {
        assert!(RemoteError::from_message("ZeroGPU worker error").is_quota());
        assert!(RemoteError::from_message("You have exceeded your GPU Quota (60s left)").is_quota());
        assert!(!RemoteError::from_message("CUDA out of memory").is_quota());
    }

    #[test]
    fn failed_variant_with_quota_text_still_counts() {
        let e = RemoteError::Failed("daily quota exceeded".into());
        assert!(e.is_quota());
    }

    #[test]
    fn quota_maps_to_too_many_requests() {
        let api = RelayError::from(RemoteError::QuotaExceeded(String::new()))
            .into_api("Failed to process image");
        assert_eq!(api.status, StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(api.body.error, QUOTA_ERROR);
        assert_eq!(api.body.details.as_deref(), Some(QUOTA_FALLBACK_DETAILS));
    }

    #[test]
    fn generic_failure_keeps_headline_and_details() {
        let api = RelayError::from(RemoteError::Failed("space is sleeping".into()))
            .into_api("Failed to process video");
        assert_eq!(api.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api.body.error, "Failed to process video");
        assert_eq!(api.body.details.as_deref(), Some("space is sleeping"));
    }

    #[test]
    fn bad_request_has_no_details() {
        let api = RelayError::bad_request("No image provided").into_api("unused");
        assert_eq!(api.status, StatusCode::BAD_REQUEST);
        assert_eq!(api.body.error, "No image provided");
        assert!(api.body.details.is_none());
    }
}
