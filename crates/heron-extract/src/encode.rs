//! Response encoders.
//!
//! An [`Encoder`] turns a handler's JSON-shaped return value into response
//! bytes. The encoder is chosen once per endpoint from its return marks.

use bytes::Bytes;
use serde_json::Value;
use thiserror::Error;

/// Error encoding a response value.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// JSON serialization failed.
    #[error("failed to encode response body: {0}")]
    Json(#[from] serde_json::Error),
}

/// How a return value is written to the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoder {
    /// `application/json`.
    #[default]
    Json,
    /// `text/plain; charset=utf-8`.
    Text,
    /// `text/html; charset=utf-8`.
    Html,
    /// No body.
    Empty,
    /// Server-sent events, one `data:` frame per item.
    EventStream,
}

impl Encoder {
    /// Returns the response content type, if a body is written.
    #[must_use]
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            Self::Json => Some("application/json"),
            Self::Text => Some("text/plain; charset=utf-8"),
            Self::Html => Some("text/html; charset=utf-8"),
            Self::EventStream => Some("text/event-stream"),
            Self::Empty => None,
        }
    }

    /// Encodes a complete value.
    ///
    /// Strings are written verbatim for text and HTML; other values use their
    /// JSON rendering.
    pub fn encode(self, value: &Value) -> Result<Bytes, EncodeError> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Json => Ok(Bytes::from(serde_json::to_vec(value)?)),
            Self::Text | Self::Html => Ok(Bytes::from(plain(value)?)),
            Self::EventStream => self.encode_item(value),
        }
    }

    /// Encodes one item of a streamed response.
    pub fn encode_item(self, value: &Value) -> Result<Bytes, EncodeError> {
        match self {
            Self::EventStream => {
                let data = plain(value)?;
                let mut frame = String::with_capacity(data.len() + 8);
                for line in data.split('\n') {
                    frame.push_str("data: ");
                    frame.push_str(line);
                    frame.push('\n');
                }
                frame.push('\n');
                Ok(Bytes::from(frame))
            }
            Self::Json => {
                let mut line = serde_json::to_vec(value)?;
                line.push(b'\n');
                Ok(Bytes::from(line))
            }
            other => other.encode(value),
        }
    }
}

fn plain(value: &Value) -> Result<String, EncodeError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        other => Ok(serde_json::to_string(other)?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_encoder() {
        let bytes = Encoder::Json.encode(&json!({"id": 1})).unwrap();
        assert_eq!(&bytes[..], br#"{"id":1}"#);
        assert_eq!(Encoder::Json.content_type(), Some("application/json"));
    }

    #[test]
    fn test_text_encoders_write_strings_verbatim() {
        assert_eq!(&Encoder::Text.encode(&json!("hi")).unwrap()[..], b"hi");
        assert_eq!(&Encoder::Html.encode(&json!("<p>")).unwrap()[..], b"<p>");
        assert_eq!(&Encoder::Text.encode(&json!(3)).unwrap()[..], b"3");
    }

    #[test]
    fn test_empty_encoder() {
        assert!(Encoder::Empty.encode(&json!({"ignored": true})).unwrap().is_empty());
        assert_eq!(Encoder::Empty.content_type(), None);
    }

    #[test]
    fn test_event_stream_frames() {
        let frame = Encoder::EventStream.encode_item(&json!({"n": 1})).unwrap();
        assert_eq!(&frame[..], b"data: {\"n\":1}\n\n");

        let multi = Encoder::EventStream.encode_item(&json!("a\nb")).unwrap();
        assert_eq!(&multi[..], b"data: a\ndata: b\n\n");
    }

    #[test]
    fn test_json_lines_for_streams() {
        let line = Encoder::Json.encode_item(&json!([1])).unwrap();
        assert_eq!(&line[..], b"[1]\n");
    }
}
