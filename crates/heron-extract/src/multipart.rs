//! Multipart form bodies and uploaded files.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bytes::Bytes;
use serde_json::{json, Value};
use std::io;

use crate::form::{FormData, FormError, FormValue};

/// Default maximum total body size for multipart (50 MB).
pub const DEFAULT_MAX_BODY_SIZE: usize = 50 * 1024 * 1024;

/// Default maximum size per field (10 MB).
pub const DEFAULT_MAX_FIELD_SIZE: usize = 10 * 1024 * 1024;

/// Default maximum number of fields.
pub const DEFAULT_MAX_FIELDS: usize = 100;

/// Limits applied while reading form bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultipartConfig {
    /// Maximum total body size in bytes.
    pub max_body_size: usize,
    /// Maximum size per field in bytes.
    pub max_field_size: usize,
    /// Maximum number of fields allowed.
    pub max_fields: usize,
}

impl Default for MultipartConfig {
    fn default() -> Self {
        Self {
            max_body_size: DEFAULT_MAX_BODY_SIZE,
            max_field_size: DEFAULT_MAX_FIELD_SIZE,
            max_fields: DEFAULT_MAX_FIELDS,
        }
    }
}

impl MultipartConfig {
    /// Create a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum body size.
    #[must_use]
    pub fn max_body_size(mut self, size: usize) -> Self {
        self.max_body_size = size;
        self
    }

    /// Set the maximum field size.
    #[must_use]
    pub fn max_field_size(mut self, size: usize) -> Self {
        self.max_field_size = size;
        self
    }

    /// Set the maximum number of fields.
    #[must_use]
    pub fn max_fields(mut self, count: usize) -> Self {
        self.max_fields = count;
        self
    }
}

/// A file uploaded through a multipart form.
///
/// Inside bound arguments an upload is carried as a JSON object with its
/// content base64-encoded; [`UploadFile::from_value`] reverses that.
///
/// # Example
///
/// ```rust
/// use heron_extract::UploadFile;
///
/// let file = UploadFile::new(Some("a.txt".into()), Some("text/plain".into()), "hello");
/// let value = file.to_value();
///
/// assert_eq!(value["filename"], "a.txt");
/// assert_eq!(value["size"], 5);
/// assert_eq!(UploadFile::from_value(&value), Some(file));
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// The original file name from the client.
    pub filename: Option<String>,
    /// The MIME type of the file.
    pub content_type: Option<String>,
    /// The file content.
    pub data: Bytes,
}

impl UploadFile {
    /// Creates an uploaded file.
    #[must_use]
    pub fn new(
        filename: Option<String>,
        content_type: Option<String>,
        data: impl Into<Bytes>,
    ) -> Self {
        Self {
            filename,
            content_type,
            data: data.into(),
        }
    }

    /// Returns the file size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the file is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Encodes the upload as a bound-argument value.
    #[must_use]
    pub fn to_value(&self) -> Value {
        json!({
            "filename": self.filename,
            "content_type": self.content_type,
            "size": self.data.len(),
            "content": STANDARD.encode(&self.data),
        })
    }

    /// Decodes an upload produced by [`UploadFile::to_value`].
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let content = STANDARD.decode(object.get("content")?.as_str()?).ok()?;
        let text = |key: &str| object.get(key).and_then(Value::as_str).map(str::to_string);
        Some(Self {
            filename: text("filename"),
            content_type: text("content_type"),
            data: Bytes::from(content),
        })
    }

    /// Returns true if `value` looks like an encoded upload.
    #[must_use]
    pub fn is_upload_value(value: &Value) -> bool {
        value
            .as_object()
            .is_some_and(|o| o.contains_key("content") && o.contains_key("filename"))
    }
}

/// Reads a `multipart/form-data` body.
pub(crate) async fn parse_multipart(
    content_type: &str,
    body: Bytes,
    config: &MultipartConfig,
) -> Result<FormData, FormError> {
    let boundary = multer::parse_boundary(content_type).map_err(|_| FormError::InvalidBoundary)?;

    if body.len() > config.max_body_size {
        return Err(FormError::TooLarge {
            limit: config.max_body_size,
            actual: body.len(),
        });
    }

    let stream = futures_util::stream::once(async move { Ok::<_, io::Error>(body) });
    let mut multipart = multer::Multipart::new(stream, boundary);
    let mut form = FormData::new();
    let mut count = 0usize;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| FormError::Malformed(e.to_string()))?
    {
        count += 1;
        if count > config.max_fields {
            return Err(FormError::TooManyFields(config.max_fields));
        }

        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };
        let filename = field.file_name().map(str::to_string);
        let content_type = field.content_type().map(ToString::to_string);
        let data = field
            .bytes()
            .await
            .map_err(|e| FormError::Malformed(e.to_string()))?;

        if data.len() > config.max_field_size {
            return Err(FormError::FieldTooLarge {
                name,
                limit: config.max_field_size,
            });
        }

        let value = if filename.is_some() {
            FormValue::File(UploadFile {
                filename,
                content_type,
                data,
            })
        } else {
            let text = String::from_utf8(data.to_vec())
                .map_err(|_| FormError::Malformed(format!("field '{name}' is not valid UTF-8")))?;
            FormValue::Text(text)
        };
        form.push(name, value);
    }

    Ok(form)
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONTENT_TYPE: &str = "multipart/form-data; boundary=X-BOUNDARY";

    fn body() -> Bytes {
        Bytes::from_static(
            b"--X-BOUNDARY\r\n\
Content-Disposition: form-data; name=\"title\"\r\n\
\r\n\
Report\r\n\
--X-BOUNDARY\r\n\
Content-Disposition: form-data; name=\"file\"; filename=\"r.csv\"\r\n\
Content-Type: text/csv\r\n\
\r\n\
a,b\r\n\
--X-BOUNDARY--\r\n",
        )
    }

    #[test]
    fn test_config_builder() {
        let config = MultipartConfig::new()
            .max_body_size(1024)
            .max_field_size(512)
            .max_fields(3);
        assert_eq!(config.max_body_size, 1024);
        assert_eq!(config.max_field_size, 512);
        assert_eq!(config.max_fields, 3);
    }

    #[tokio::test]
    async fn test_parse_text_and_file() {
        let form = parse_multipart(CONTENT_TYPE, body(), &MultipartConfig::default())
            .await
            .unwrap();

        assert_eq!(form.text("title"), Some("Report"));
        let file = form.file("file").unwrap();
        assert_eq!(file.filename.as_deref(), Some("r.csv"));
        assert_eq!(file.content_type.as_deref(), Some("text/csv"));
        assert_eq!(&file.data[..], b"a,b");
    }

    #[tokio::test]
    async fn test_too_many_fields() {
        let config = MultipartConfig::new().max_fields(1);
        let err = parse_multipart(CONTENT_TYPE, body(), &config).await.unwrap_err();
        assert!(matches!(err, FormError::TooManyFields(1)));
    }

    #[tokio::test]
    async fn test_body_too_large() {
        let config = MultipartConfig::new().max_body_size(10);
        let err = parse_multipart(CONTENT_TYPE, body(), &config).await.unwrap_err();
        assert!(matches!(err, FormError::TooLarge { limit: 10, .. }));
    }

    #[tokio::test]
    async fn test_missing_boundary() {
        let err = parse_multipart("multipart/form-data", body(), &MultipartConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FormError::InvalidBoundary));
    }

    #[test]
    fn test_upload_value_roundtrip_binary() {
        let file = UploadFile::new(None, None, vec![0u8, 159, 146, 150]);
        let value = file.to_value();
        assert!(UploadFile::is_upload_value(&value));
        assert_eq!(UploadFile::from_value(&value).unwrap().data, file.data);
    }
}
