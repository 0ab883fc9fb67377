use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::Value;

use crate::{error::RemoteError, normalize::RemotePayload};

/// Named operations exposed by the remote inference endpoint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RemoteOperation {
    /// Text-prompted detection and segmentation of an image.
    ImageText,
    /// Segmentation of the object inside a bounding box.
    ImageBox,
    /// Interactive tracker segmentation of an image.
    ImageTracker,
    /// Text-prompted segmentation across video frames.
    VideoText,
}

impl RemoteOperation {
    /// The remote API name of the operation.
    pub fn endpoint(&self) -> &'static str {
        match self {
            RemoteOperation::ImageText => "/process_image_text",
            RemoteOperation::ImageBox => "/process_image_box",
            RemoteOperation::ImageTracker => "/process_image_tracker_wrapper",
            RemoteOperation::VideoText => "/process_video_text",
        }
    }

    /// Short mode name, used in logs and staged file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            RemoteOperation::ImageText => "text",
            RemoteOperation::ImageBox => "box",
            RemoteOperation::ImageTracker => "tracker",
            RemoteOperation::VideoText => "video",
        }
    }
}

/// One positional argument of a remote call.
#[derive(Clone, Debug, PartialEq)]
pub enum RemoteArg {
    /// A local file the backend must hand over to the remote side.
    File {
        path: PathBuf,
        orig_name: String,
        mime_type: Option<String>,
    },
    Json(Value),
}

/// A remote invocation: the operation plus its positional arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct RemoteCall {
    pub operation: RemoteOperation,
    pub args: Vec<RemoteArg>,
}

impl RemoteCall {
    pub fn new(operation: RemoteOperation) -> Self {
        Self {
            operation,
            args: Vec::new(),
        }
    }

    /// Appends a file argument; `mime_type` is passed on when the file is uploaded.
    pub fn file(mut self, path: &Path, orig_name: &str, mime_type: Option<&str>) -> Self {
        self.args.push(RemoteArg::File {
            path: path.to_path_buf(),
            orig_name: orig_name.to_string(),
            mime_type: mime_type.map(str::to_owned),
        });
        self
    }

    pub fn arg(mut self, value: impl Into<Value>) -> Self {
        self.args.push(RemoteArg::Json(value.into()));
        self
    }

    /// Paths of all file arguments.
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.args.iter().filter_map(|arg| match arg {
            RemoteArg::File { path, .. } => Some(path.as_path()),
            RemoteArg::Json(_) => None,
        })
    }

    /// The JSON arguments, file arguments skipped.
    pub fn values(&self) -> Vec<&Value> {
        self.args
            .iter()
            .filter_map(|arg| match arg {
                RemoteArg::Json(value) => Some(value),
                RemoteArg::File { .. } => None,
            })
            .collect()
    }
}

/// Seam between the HTTP handlers and the remote model-serving endpoint.
///
/// The production implementation is [`crate::GradioClient`]; tests substitute
/// their own implementation to avoid network access.
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    /// Base URL of the endpoint, reported by the diagnostics route.
    fn endpoint_url(&self) -> &str;

    /// Runs `call` remotely and returns the decoded result.
    ///
    /// File arguments must exist on disk for the whole duration of the call.
    async fn predict(&self, call: RemoteCall) -> Result<RemotePayload, RemoteError>;

    /// Returns the remote API description.
    async fn api_info(&self) -> Result<Value, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_keeps_argument_order() {
        let call = RemoteCall::new(RemoteOperation::ImageText)
            .file(Path::new("/tmp/a.jpg"), "a.jpg", Some("image/jpeg"))
            .arg("dog")
            .arg(0.5);
        assert_eq!(call.files().collect::<Vec<_>>(), vec![Path::new("/tmp/a.jpg")]);
        assert_eq!(call.values(), vec![&json!("dog"), &json!(0.5)]);
        assert_eq!(call.operation.endpoint(), "/process_image_text");
    }
}
