//! Decoding of the loosely typed payloads returned by the remote endpoint.
//!
//! Gradio answers with an ordered list of outputs whose positions are fixed by
//! the remote function signature. Some endpoints return a single file object
//! instead. Both shapes are decoded once here so handlers never probe raw JSON.

use serde_json::{Map, Value};

use crate::messages::ResultMedia;

/// Longest payload rendering kept in diagnostics.
const DESCRIBE_LIMIT: usize = 512;

/// A remote result, decoded at the boundary.
#[derive(Clone, Debug, PartialEq)]
pub enum RemotePayload {
    /// Positional outputs, index 0 is the primary media output.
    List(Vec<Value>),
    /// A single output object.
    Object(Map<String, Value>),
    /// Anything else, including a bare string reference or `null`.
    Other(Value),
}

impl From<Value> for RemotePayload {
    fn from(value: Value) -> Self {
        match value {
            Value::Array(items) => RemotePayload::List(items),
            Value::Object(map) => RemotePayload::Object(map),
            other => RemotePayload::Other(other),
        }
    }
}

impl RemotePayload {
    /// Output at `index` of a list payload.
    pub fn item(&self, index: usize) -> Option<&Value> {
        match self {
            RemotePayload::List(items) => items.get(index),
            _ => None,
        }
    }

    /// The primary media reference of the payload, if one can be found.
    pub fn primary_media(&self) -> Option<MediaRef> {
        match self {
            RemotePayload::List(items) => items.first().and_then(MediaRef::from_value),
            RemotePayload::Object(map) => MediaRef::from_map(map),
            RemotePayload::Other(value) => MediaRef::from_value(value),
        }
    }

    /// `url` of the primary media, else its `path`.
    pub fn media_href(&self) -> Option<String> {
        self.primary_media().map(|media| media.href)
    }

    /// The human readable detail string, second output of a list payload.
    pub fn detail_text(&self) -> Option<&str> {
        self.item(1).and_then(Value::as_str)
    }

    pub fn to_value(&self) -> Value {
        match self {
            RemotePayload::List(items) => Value::Array(items.clone()),
            RemotePayload::Object(map) => Value::Object(map.clone()),
            RemotePayload::Other(value) => value.clone(),
        }
    }

    /// Short JSON rendering used in error details.
    pub fn describe(&self) -> String {
        let mut rendered = self.to_value().to_string();
        if rendered.len() > DESCRIBE_LIMIT {
            let mut cut = DESCRIBE_LIMIT;
            while !rendered.is_char_boundary(cut) {
                cut -= 1;
            }
            rendered.truncate(cut);
            rendered.push_str("...");
        }
        rendered
    }
}

/// Reference to a file produced by the remote endpoint.
#[derive(Clone, Debug, PartialEq)]
pub struct MediaRef {
    /// What the browser should load: the `url` field, else the `path` field.
    pub href: String,
    pub path: Option<String>,
    pub orig_name: Option<String>,
    pub size: Option<u64>,
    pub mime_type: Option<String>,
}

impl MediaRef {
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Object(map) => Self::from_map(map),
            Value::String(href) if !href.is_empty() => Some(Self {
                href: href.clone(),
                path: None,
                orig_name: None,
                size: None,
                mime_type: None,
            }),
            _ => None,
        }
    }

    pub fn from_map(map: &Map<String, Value>) -> Option<Self> {
        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };

        let url = text("url");
        let path = text("path");
        let Some(href) = url.or_else(|| path.clone()) else {
            // Gradio video outputs wrap the file as {video: {...}, subtitles: ...}
            return map.get("video").and_then(Self::from_value);
        };

        Some(Self {
            href,
            path,
            orig_name: text("orig_name"),
            size: map.get("size").and_then(Value::as_u64),
            mime_type: text("mime_type"),
        })
    }
}

impl From<MediaRef> for ResultMedia {
    fn from(media: MediaRef) -> Self {
        ResultMedia {
            url: media.href,
            path: media.path,
            orig_name: media.orig_name,
            size: media.size,
            mime_type: media.mime_type,
        }
    }
}
