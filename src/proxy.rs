//! Same-origin access to media produced by the remote endpoint.
//!
//! The browser never sees the access token: the relay fetches the resource
//! and streams it back.

use axum::{
    body::Body,
    extract::{Query, State},
    http::header::{CACHE_CONTROL, CONTENT_TYPE},
    response::{IntoResponse, Response},
};
use reqwest::Url;
use serde::Deserialize;

use crate::{
    error::{ApiError, RelayError, RemoteError},
    server::AppState,
};

pub const PROXY_FAILURE: &str = "Failed to fetch image";
pub const PROXY_CACHE_CONTROL: &str = "public, max-age=31536000";

const FALLBACK_CONTENT_TYPE: &str = "image/webp";

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub url: Option<String>,
}

pub async fn proxy_media(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<Response, ApiError> {
    fetch_media(&state, query.url.as_deref())
        .await
        .map_err(|e| e.into_api(PROXY_FAILURE))
}

async fn fetch_media(state: &AppState, url: Option<&str>) -> Result<Response, RelayError> {
    let raw = url
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .ok_or_else(|| RelayError::bad_request("No image URL provided"))?;
    let target = Url::parse(raw)
        .map_err(|e| RelayError::bad_request(format!("Invalid image URL: {e}")))?;
    if !matches!(target.scheme(), "http" | "https") {
        return Err(RelayError::bad_request(format!(
            "Unsupported URL scheme: {}",
            target.scheme()
        )));
    }

    let mut request = state.http.get(target.clone());
    if let Some(token) = state.config.credential_for(&target) {
        request = request.bearer_auth(token);
    }

    log::debug!("Proxying {target}");
    let response = request.send().await.map_err(RemoteError::from)?;
    let status = response.status();
    if !status.is_success() {
        return Err(RemoteError::Failed(format!("upstream responded {status}")).into());
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned)
        .unwrap_or_else(|| content_type_for(target.path()).to_string());

    Ok((
        [
            (CONTENT_TYPE, content_type),
            (CACHE_CONTROL, PROXY_CACHE_CONTROL.to_string()),
        ],
        Body::from_stream(response.bytes_stream()),
    )
        .into_response())
}

/// Guesses a media type from the extension of a URL path.
pub fn content_type_for(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "webp" => "image/webp",
        "mp4" => "video/mp4",
        "webm" => "video/webm",
        "mov" => "video/quicktime",
        _ => FALLBACK_CONTENT_TYPE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_from_extension() {
        assert_eq!(content_type_for("/gradio_api/file=/tmp/gradio/x/out.PNG"), "image/png");
        assert_eq!(content_type_for("/file=/tmp/result.mp4"), "video/mp4");
        assert_eq!(content_type_for("/a.jpeg"), "image/jpeg");
        assert_eq!(content_type_for("/no-extension"), FALLBACK_CONTENT_TYPE);
    }
}
