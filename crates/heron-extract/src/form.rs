//! Form bodies.
//!
//! [`read_form`] reads either `multipart/form-data` or
//! `application/x-www-form-urlencoded` bodies into a [`FormData`] map that
//! supports single and repeated field lookup.

use bytes::Bytes;
use http::{header, HeaderMap};
use indexmap::IndexMap;
use thiserror::Error;

use crate::multipart::{parse_multipart, MultipartConfig, UploadFile};

/// Error reading a form body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormError {
    /// The body is not a form content type.
    #[error("unsupported form content type '{0}'")]
    UnsupportedContentType(String),

    /// The multipart boundary is missing or invalid.
    #[error("missing or invalid boundary in multipart content type")]
    InvalidBoundary,

    /// The body does not follow the declared encoding.
    #[error("malformed form body: {0}")]
    Malformed(String),

    /// The body exceeds the configured limit.
    #[error("form body too large: max {limit} bytes, got {actual} bytes")]
    TooLarge {
        /// Configured limit.
        limit: usize,
        /// Actual size.
        actual: usize,
    },

    /// A single field exceeds the configured limit.
    #[error("form field '{name}' exceeds {limit} bytes")]
    FieldTooLarge {
        /// Field name.
        name: String,
        /// Configured limit.
        limit: usize,
    },

    /// The body has more fields than allowed.
    #[error("too many form fields (max {0})")]
    TooManyFields(usize),
}

/// One form field occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormValue {
    /// A plain text field.
    Text(String),
    /// An uploaded file.
    File(UploadFile),
}

impl FormValue {
    /// Returns the text, if this is a text field.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(t) => Some(t),
            Self::File(_) => None,
        }
    }

    /// Returns the file, if this is an upload.
    #[must_use]
    pub fn as_file(&self) -> Option<&UploadFile> {
        match self {
            Self::File(f) => Some(f),
            Self::Text(_) => None,
        }
    }
}

/// Parsed form fields, in submission order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormData {
    fields: IndexMap<String, Vec<FormValue>>,
}

impl FormData {
    /// Creates an empty form.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a field occurrence.
    pub fn push(&mut self, name: impl Into<String>, value: FormValue) {
        self.fields.entry(name.into()).or_default().push(value);
    }

    /// Returns the first occurrence of a field.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&FormValue> {
        self.fields.get(name).and_then(|v| v.first())
    }

    /// Returns every occurrence of a field.
    #[must_use]
    pub fn get_all(&self, name: &str) -> &[FormValue] {
        self.fields.get(name).map_or(&[], Vec::as_slice)
    }

    /// Returns the first text occurrence of a field.
    #[must_use]
    pub fn text(&self, name: &str) -> Option<&str> {
        self.get_all(name).iter().find_map(FormValue::as_text)
    }

    /// Returns the first uploaded file of a field.
    #[must_use]
    pub fn file(&self, name: &str) -> Option<&UploadFile> {
        self.get_all(name).iter().find_map(FormValue::as_file)
    }

    /// Returns true if the field was submitted.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates field names.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Returns the number of distinct fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if no field was submitted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Reads a form body according to its `Content-Type`.
///
/// A missing content type is read as urlencoded.
///
/// # Errors
///
/// Returns [`FormError`] when the content type is not a form type, the body
/// is malformed, or a limit is exceeded.
pub async fn read_form(
    headers: &HeaderMap,
    body: Bytes,
    config: &MultipartConfig,
) -> Result<FormData, FormError> {
    let size = body.len();
    let result = parse_form(headers, body, config).await;
    match &result {
        Ok(form) => tracing::trace!(size, fields = form.len(), "read form body"),
        Err(err) => tracing::debug!(size, error = %err, "rejected form body"),
    }
    result
}

async fn parse_form(
    headers: &HeaderMap,
    body: Bytes,
    config: &MultipartConfig,
) -> Result<FormData, FormError> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());

    let Some(content_type) = content_type else {
        return parse_urlencoded(&body, config);
    };
    let parsed: mime::Mime = content_type
        .parse()
        .map_err(|_| FormError::UnsupportedContentType(content_type.to_string()))?;

    if parsed.type_() == mime::MULTIPART && parsed.subtype() == mime::FORM_DATA {
        parse_multipart(content_type, body, config).await
    } else if parsed.type_() == mime::APPLICATION && parsed.subtype() == mime::WWW_FORM_URLENCODED {
        parse_urlencoded(&body, config)
    } else {
        Err(FormError::UnsupportedContentType(content_type.to_string()))
    }
}

fn parse_urlencoded(body: &[u8], config: &MultipartConfig) -> Result<FormData, FormError> {
    if body.len() > config.max_body_size {
        return Err(FormError::TooLarge {
            limit: config.max_body_size,
            actual: body.len(),
        });
    }
    let pairs: Vec<(String, String)> =
        serde_urlencoded::from_bytes(body).map_err(|e| FormError::Malformed(e.to_string()))?;
    if pairs.len() > config.max_fields {
        return Err(FormError::TooManyFields(config.max_fields));
    }

    let mut form = FormData::new();
    for (name, value) in pairs {
        form.push(name, FormValue::Text(value));
    }
    Ok(form)
}
