//! Multipart intake and per-request staging of uploaded media.

use std::{
    collections::HashMap,
    path::Path,
    str::FromStr,
    time::{SystemTime, UNIX_EPOCH},
};

use axum::{body::Bytes, extract::Multipart};
use tempfile::TempPath;

use crate::error::RelayError;

/// Prefix of every staged upload.
pub const STAGED_PREFIX: &str = "vision-relay";

const MAX_NAME_LEN: usize = 96;

/// The media part of an upload.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Bytes,
}

/// A fully buffered multipart submission.
#[derive(Debug, Default)]
pub struct UploadForm {
    file: Option<UploadedFile>,
    fields: HashMap<String, String>,
}

impl UploadForm {
    /// Reads every field; the one named `file_field` is kept as the media.
    pub async fn read(mut multipart: Multipart, file_field: &str) -> Result<Self, RelayError> {
        let mut form = UploadForm::default();

        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_owned) else {
                continue;
            };

            if name == file_field {
                let file_name = field.file_name().unwrap_or("upload").to_string();
                let content_type = field.content_type().map(str::to_owned);
                let bytes = field.bytes().await?;
                log::debug!("Received {} ({} bytes)", file_name, bytes.len());
                form.file = Some(UploadedFile {
                    file_name,
                    content_type,
                    bytes,
                });
            } else if field.file_name().is_some() {
                log::debug!("Ignoring unexpected file field '{name}'");
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }

        Ok(form)
    }

    /// Builds a form directly, without a multipart body.
    pub fn from_parts(file: Option<UploadedFile>, fields: &[(&str, &str)]) -> Self {
        Self {
            file,
            fields: fields
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Takes the media part; an absent or empty part is a client error.
    pub fn take_file(&mut self, missing: &str) -> Result<UploadedFile, RelayError> {
        self.file
            .take()
            .filter(|file| !file.bytes.is_empty())
            .ok_or_else(|| RelayError::bad_request(missing))
    }

    /// Raw text of a field; empty fields count as absent.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }

    /// Parses a numeric field, falling back to `default` when it is absent.
    pub fn number<T: FromStr>(&self, name: &str, default: T) -> Result<T, RelayError> {
        match self.text(name) {
            Some(raw) => raw
                .parse()
                .map_err(|_| RelayError::bad_request(format!("Invalid {name}: '{raw}' is not a number"))),
            None => Ok(default),
        }
    }

    /// Like [`UploadForm::number`] but with no default.
    pub fn optional_number<T: FromStr>(&self, name: &str) -> Result<Option<T>, RelayError> {
        self.text(name)
            .map(|raw| {
                raw.parse()
                    .map_err(|_| RelayError::bad_request(format!("Invalid {name}: '{raw}' is not a number")))
            })
            .transpose()
    }

    /// A probability-like field in `[0, 1]`.
    pub fn threshold(&self, name: &str, default: f64) -> Result<f64, RelayError> {
        let value: f64 = self.number(name, default)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(RelayError::bad_request(format!(
                "Invalid {name}: {value} is outside [0, 1]"
            )));
        }
        Ok(value)
    }

    /// Checkbox semantics: only the literal `true` enables the flag.
    pub fn flag(&self, name: &str) -> bool {
        self.text(name) == Some("true")
    }
}

/// An upload written to the temp directory for the lifetime of one request.
///
/// Dropping the value removes the file; removal errors are ignored.
#[derive(Debug)]
pub struct StagedFile {
    path: TempPath,
    file_name: String,
    content_type: Option<String>,
}

impl StagedFile {
    /// Writes `upload` to a uniquely named file in `dir`.
    ///
    /// The name combines the mode, a millisecond timestamp, a random part and
    /// the sanitized original name, so concurrent requests never collide.
    pub async fn stage(dir: &Path, mode: &str, upload: &UploadedFile) -> Result<Self, RelayError> {
        let millis = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_millis())
            .unwrap_or_default();
        let file_name = sanitize_file_name(&upload.file_name);

        let path = tempfile::Builder::new()
            .prefix(&format!("{STAGED_PREFIX}-{mode}-{millis}-"))
            .suffix(&format!("-{file_name}"))
            .rand_bytes(6)
            .tempfile_in(dir)?
            .into_temp_path();

        tokio::fs::write(&*path, &upload.bytes).await?;
        log::debug!("Staged {} bytes at {}", upload.bytes.len(), path.display());

        Ok(Self {
            path,
            file_name,
            content_type: upload.content_type.clone(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// Media type declared by the browser for the upload.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }
}

impl Drop for StagedFile {
    fn drop(&mut self) {
        log::debug!("Releasing staged upload {}", self.path.display());
    }
}

/// Keeps only the final path component and a conservative character set.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        return "upload".to_string();
    }

    // keep the extension when shortening
    if cleaned.len() > MAX_NAME_LEN {
        let ext = cleaned
            .rsplit_once('.')
            .map(|(_, ext)| ext)
            .filter(|ext| ext.len() < 16)
            .unwrap_or_default();
        if ext.is_empty() {
            return cleaned[..MAX_NAME_LEN].to_string();
        }
        let keep = MAX_NAME_LEN - ext.len() - 1;
        return format!("{}.{}", &cleaned[..keep], ext);
    }
    cleaned.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            file_name: "dog.jpg".into(),
            content_type: Some("image/jpeg".into()),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn sanitizes_names() {
        assert_eq!(sanitize_file_name("dog.jpg"), "dog.jpg");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_file_name("C:\\Users\\me\\my cat.png"), "my_cat.png");
        assert_eq!(sanitize_file_name(""), "upload");
        assert_eq!(sanitize_file_name(".."), "upload");

        let long = format!("{}.webp", "a".repeat(200));
        let short = sanitize_file_name(&long);
        assert_eq!(short.len(), MAX_NAME_LEN);
        assert!(short.ends_with(".webp"));

        let bare = sanitize_file_name(&"b".repeat(200));
        assert_eq!(bare, "b".repeat(MAX_NAME_LEN));

        let odd_ext = sanitize_file_name(&format!("{}.{}", "c".repeat(150), "x".repeat(20)));
        assert_eq!(odd_ext.len(), MAX_NAME_LEN);
        assert!(!odd_ext.ends_with('.'));
    }

    #[test]
    fn missing_or_empty_file_is_rejected() {
        let mut form = UploadForm::from_parts(None, &[]);
        assert!(matches!(
            form.take_file("No image provided"),
            Err(RelayError::BadRequest(m)) if m == "No image provided"
        ));

        let mut form = UploadForm::from_parts(Some(image(b"")), &[]);
        assert!(form.take_file("No image provided").is_err());
    }

    #[test]
    fn numeric_fields() {
        let form = UploadForm::from_parts(
            None,
            &[("threshold", "0.25"), ("maskThreshold", ""), ("maxFrames", "abc"), ("bad", "1.5")],
        );
        assert_eq!(form.threshold("threshold", 0.5).unwrap(), 0.25);
        assert_eq!(form.threshold("maskThreshold", 0.5).unwrap(), 0.5);
        assert!(form.number::<f64>("maxFrames", 50.0).is_err());
        assert!(form.threshold("bad", 0.5).is_err());
        assert_eq!(form.optional_number::<f64>("trimStart").unwrap(), None);
    }

    #[test]
    fn flags_need_literal_true() {
        let form = UploadForm::from_parts(None, &[("multimask", "true"), ("other", "1")]);
        assert!(form.flag("multimask"));
        assert!(!form.flag("other"));
        assert!(!form.flag("absent"));
    }

    #[tokio::test]
    async fn staged_file_is_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staged = StagedFile::stage(dir.path(), "text", &image(b"jpeg-bytes"))
            .await
            .unwrap();
        let path = staged.path().to_path_buf();

        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("vision-relay-text-"));
        assert!(name.ends_with("-dog.jpg"));
        assert_eq!(std::fs::read(&path).unwrap(), b"jpeg-bytes");
        assert_eq!(staged.content_type(), Some("image/jpeg"));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn concurrent_stages_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let upload = image(b"x");
        let (a, b) = tokio::join!(
            StagedFile::stage(dir.path(), "box", &upload),
            StagedFile::stage(dir.path(), "box", &upload)
        );
        assert_ne!(a.unwrap().path(), b.unwrap().path());
    }
}
