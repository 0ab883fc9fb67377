//! Client for the REST protocol spoken by Gradio applications.
//!
//! A prediction is three round trips: upload the input files, queue the call
//! and read its result from an event stream.

use std::path::Path;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, multipart};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::{
    backend::{InferenceBackend, RemoteArg, RemoteCall},
    config::RelayConfig,
    error::RemoteError,
    normalize::RemotePayload,
};

const USER_AGENT: &str = concat!("vision-relay/", env!("CARGO_PKG_VERSION"));

#[derive(Deserialize)]
struct QueuedCall {
    event_id: String,
}

/// Connection settings for a remote Gradio application.
#[derive(Clone, Debug)]
pub struct GradioClient {
    http: Client,
    root: String,
    token: Option<String>,
}

impl GradioClient {
    pub fn new(config: &RelayConfig) -> Result<Self, RemoteError> {
        let http = Client::builder().user_agent(USER_AGENT).build()?;
        Ok(Self::with_http(http, config))
    }

    /// Reuses an existing HTTP client.
    pub fn with_http(http: Client, config: &RelayConfig) -> Self {
        Self {
            http,
            root: config.space_url.clone(),
            token: config.token.clone(),
        }
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// Resolves the API base by reading the application config.
    async fn connect(&self) -> Result<String, RemoteError> {
        let response = self
            .authorize(self.http.get(format!("{}/config", self.root)))
            .send()
            .await?;
        let config: Value = checked(response).await?.json().await?;

        let prefix = config
            .get("api_prefix")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .trim_end_matches('/');
        log::debug!("Connected to {} (api prefix '{}')", self.root, prefix);
        Ok(format!("{}{}", self.root, prefix))
    }

    /// Uploads a local file and returns its remote `FileData` description.
    async fn upload(
        &self,
        base: &str,
        path: &Path,
        orig_name: &str,
        mime_type: Option<&str>,
    ) -> Result<Value, RemoteError> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| RemoteError::Failed(format!("cannot read {}: {e}", path.display())))?;
        let size = bytes.len();
        let part = multipart::Part::bytes(bytes).file_name(orig_name.to_string());
        let part = match mime_type {
            Some(mime) => part.mime_str(mime)?,
            None => part,
        };
        let form = multipart::Form::new().part("files", part);

        let response = self
            .authorize(self.http.post(format!("{base}/upload")))
            .multipart(form)
            .send()
            .await?;
        let paths: Vec<String> = checked(response).await?.json().await?;
        let remote_path = paths
            .into_iter()
            .next()
            .ok_or_else(|| RemoteError::Protocol("upload returned no file path".into()))?;

        Ok(json!({
            "path": remote_path,
            "orig_name": orig_name,
            "size": size,
            "meta": { "_type": "gradio.FileData" },
        }))
    }
}

#[async_trait]
impl InferenceBackend for GradioClient {
    fn endpoint_url(&self) -> &str {
        &self.root
    }

    async fn predict(&self, call: RemoteCall) -> Result<RemotePayload, RemoteError> {
        let base = self.connect().await?;

        let mut data = Vec::with_capacity(call.args.len());
        for arg in call.args {
            match arg {
                RemoteArg::File {
                    path,
                    orig_name,
                    mime_type,
                } => data.push(
                    self.upload(&base, &path, &orig_name, mime_type.as_deref())
                        .await?,
                ),
                RemoteArg::Json(value) => data.push(value),
            }
        }

        let endpoint = call.operation.endpoint().trim_start_matches('/');
        let response = self
            .authorize(self.http.post(format!("{base}/call/{endpoint}")))
            .json(&json!({ "data": data }))
            .send()
            .await?;
        let queued: QueuedCall = checked(response).await?.json().await?;
        log::debug!("Queued {} as event {}", endpoint, queued.event_id);

        let response = self
            .authorize(
                self.http
                    .get(format!("{base}/call/{endpoint}/{}", queued.event_id)),
            )
            .send()
            .await?;
        let stream = checked(response).await?.text().await?;

        read_event_stream(&stream).map(RemotePayload::from)
    }

    async fn api_info(&self) -> Result<Value, RemoteError> {
        let base = self.connect().await?;
        let response = self
            .authorize(self.http.get(format!("{base}/info")))
            .send()
            .await?;
        Ok(checked(response).await?.json().await?)
    }
}

/// Turns a non-success status into a [`RemoteError`] carrying the body text.
async fn checked(response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = match serde_json::from_str::<Value>(&body) {
        Ok(value) => error_message(&value).unwrap_or(body),
        Err(_) => body,
    };

    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
        return Err(RemoteError::QuotaExceeded(message));
    }
    Err(RemoteError::from_message(format!("{status}: {}", message.trim())))
}

/// Reads a completed event stream, returning the `complete` payload.
pub fn read_event_stream(stream: &str) -> Result<Value, RemoteError> {
    let mut event = String::new();
    let mut data = String::new();

    // a trailing blank line flushes the last event
    for line in stream.lines().chain(std::iter::once("")) {
        if line.is_empty() {
            match event.as_str() {
                "complete" => {
                    return serde_json::from_str(&data)
                        .map_err(|e| RemoteError::Protocol(format!("invalid result: {e}")));
                }
                "error" => return Err(error_from_event(&data)),
                _ => {}
            }
            event.clear();
            data.clear();
        } else if let Some(name) = line.strip_prefix("event:") {
            event = name.trim().to_string();
        } else if let Some(chunk) = line.strip_prefix("data:") {
            if !data.is_empty() {
                data.push('\n');
            }
            data.push_str(chunk.strip_prefix(' ').unwrap_or(chunk));
        }
    }

    Err(RemoteError::Protocol(
        "event stream ended without a result".into(),
    ))
}

fn error_from_event(data: &str) -> RemoteError {
    let data = data.trim();
    if data.is_empty() || data == "null" {
        return RemoteError::Failed("remote endpoint reported an error without details".into());
    }

    match serde_json::from_str::<Value>(data) {
        Ok(value) => {
            let title = value.get("title").and_then(Value::as_str).unwrap_or_default();
            let message = error_message(&value).unwrap_or_else(|| value.to_string());
            if crate::error::mentions_quota(title) {
                RemoteError::QuotaExceeded(message)
            } else {
                RemoteError::from_message(message)
            }
        }
        Err(_) => RemoteError::from_message(data),
    }
}

// Gradio reports errors as a bare string or an object with message/error fields.
fn error_message(value: &Value) -> Option<String> {
    match value {
        Value::String(message) => Some(message.clone()),
        Value::Object(map) => ["message", "error", "detail", "title"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str))
            .map(str::to_owned),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn complete_event_yields_payload() {
        let stream = "event: generating\ndata: null\n\nevent: complete\ndata: [{\"url\": \"https://x/a.png\"}, \"ok\"]\n\n";
        let value = read_event_stream(stream).unwrap();
        assert_eq!(value[1], "ok");
    }

    #[test]
    fn heartbeats_are_skipped_and_unterminated_event_flushes() {
        let stream = "event: heartbeat\ndata: null\n\nevent: complete\ndata: [1]";
        assert_eq!(read_event_stream(stream).unwrap(), json!([1]));
    }

    #[test]
    fn error_event_with_quota_message() {
        let stream = "event: error\ndata: \"You have exceeded your ZeroGPU quota\"\n\n";
        assert!(matches!(
            read_event_stream(stream),
            Err(RemoteError::QuotaExceeded(m)) if m.contains("ZeroGPU")
        ));
    }

    #[test]
    fn error_event_with_quota_title() {
        let stream = "event: error\ndata: {\"title\": \"ZeroGPU quota exceeded\", \"message\": \"retry in 5 min\"}\n\n";
        assert!(matches!(
            read_event_stream(stream),
            Err(RemoteError::QuotaExceeded(m)) if m == "retry in 5 min"
        ));
    }

    #[test]
    fn error_event_without_details() {
        let stream = "event: error\ndata: null\n\n";
        assert!(matches!(read_event_stream(stream), Err(RemoteError::Failed(_))));
    }

    #[test]
    fn plain_text_error_event() {
        let stream = "event: error\ndata: CUDA out of memory\n\n";
        assert!(matches!(
            read_event_stream(stream),
            Err(RemoteError::Failed(m)) if m == "CUDA out of memory"
        ));
    }

    #[test]
    fn stream_without_result() {
        assert!(matches!(
            read_event_stream("event: heartbeat\ndata: null\n\n"),
            Err(RemoteError::Protocol(_))
        ));
    }
}
