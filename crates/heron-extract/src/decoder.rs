//! Decoder factory.
//!
//! A type is compiled once into a decode plan: the resolved base shape, its
//! compiled constraints, and an optional custom decoder. Plans are cached by
//! the canonical rendering of the type so identical annotations share one
//! pipeline across endpoints.
//!
//! Every decode failure is reported as a [`DecodeError`] of one of three
//! kinds: invalid type (well-formed input of the wrong shape or value),
//! invalid payload (malformed wire syntax), or a custom decoder message.
//!
//! # Example
//!
//! ```rust
//! use heron_extract::{DecoderFactory, DecodeErrorKind};
//! use heron_core::{Constraint, TypeExpr};
//! use serde_json::json;
//!
//! let factory = DecoderFactory::new();
//! let page = factory
//!     .text_decoder("page", &TypeExpr::int().constrained(Constraint::Ge(1.0)))
//!     .unwrap();
//!
//! assert_eq!(page.decode(&["42".to_string()]).unwrap(), json!(42));
//! assert_eq!(
//!     page.decode(&["abc".to_string()]).unwrap_err().kind(),
//!     DecodeErrorKind::InvalidType
//! );
//! assert!(page.decode(&["0".to_string()]).is_err());
//! ```

use dashmap::DashMap;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use heron_core::{
    resolve, CompileError, CompileResult, Constraint, CustomDecoder, DecodeInput, ResolvedType,
    ReturnMark, Scalar, TypeExpr,
};
use regex::Regex;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::encode::Encoder;
use crate::form::{FormData, FormValue};
use crate::multipart::UploadFile;

/// Classification of a [`DecodeError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DecodeErrorKind {
    /// Right format, wrong shape or value.
    InvalidType,
    /// Malformed wire syntax.
    InvalidPayload,
    /// A custom or auth decoder rejected the value.
    Custom,
}

/// A single decode failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct DecodeError {
    kind: DecodeErrorKind,
    message: String,
}

impl DecodeError {
    /// Well-formed input of the wrong shape or value.
    #[must_use]
    pub fn invalid_type(message: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::InvalidType,
            message: message.into(),
        }
    }

    /// Malformed wire syntax.
    #[must_use]
    pub fn invalid_payload(message: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::InvalidPayload,
            message: message.into(),
        }
    }

    /// A message produced by a custom decoder.
    #[must_use]
    pub fn custom(message: impl Into<String>) -> Self {
        Self {
            kind: DecodeErrorKind::Custom,
            message: message.into(),
        }
    }

    /// Returns the kind.
    #[must_use]
    pub fn kind(&self) -> DecodeErrorKind {
        self.kind
    }

    /// Returns the message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Prefixes the message with a nested field or index.
    #[must_use]
    fn at(mut self, segment: &str) -> Self {
        self.message = format!("{segment}: {}", self.message);
        self
    }
}

/// Decodes `Authorization` header credentials.
///
/// Implemented for plain functions and closures taking `(scheme, credentials)`.
pub trait AuthDecoder: Send + Sync {
    /// Decodes credentials; an `Err` message is reported to the client.
    fn decode(&self, scheme: &str, credentials: &str) -> Result<Value, String>;
}

impl<F> AuthDecoder for F
where
    F: Fn(&str, &str) -> Result<Value, String> + Send + Sync,
{
    fn decode(&self, scheme: &str, credentials: &str) -> Result<Value, String> {
        self(scheme, credentials)
    }
}

#[derive(Debug)]
enum Rule {
    Gt(f64),
    Ge(f64),
    Lt(f64),
    Le(f64),
    MinLength(usize),
    MaxLength(usize),
    Pattern(Regex),
}

impl Rule {
    fn compile(constraint: &Constraint, param: &str) -> CompileResult<Self> {
        Ok(match constraint {
            Constraint::Gt(v) => Self::Gt(*v),
            Constraint::Ge(v) => Self::Ge(*v),
            Constraint::Lt(v) => Self::Lt(*v),
            Constraint::Le(v) => Self::Le(*v),
            Constraint::MinLength(n) => Self::MinLength(*n),
            Constraint::MaxLength(n) => Self::MaxLength(*n),
            Constraint::Pattern(p) => {
                Self::Pattern(Regex::new(p).map_err(|e| CompileError::InvalidConstraint {
                    param: param.to_string(),
                    reason: e.to_string(),
                })?)
            }
        })
    }

    fn check(&self, value: &Value) -> Result<(), DecodeError> {
        let length = || match value {
            Value::String(s) => Some(s.chars().count()),
            Value::Array(a) => Some(a.len()),
            _ => None,
        };
        let failed = match self {
            Self::Gt(limit) => value.as_f64().is_some_and(|n| n <= *limit),
            Self::Ge(limit) => value.as_f64().is_some_and(|n| n < *limit),
            Self::Lt(limit) => value.as_f64().is_some_and(|n| n >= *limit),
            Self::Le(limit) => value.as_f64().is_some_and(|n| n > *limit),
            Self::MinLength(min) => length().is_some_and(|len| len < *min),
            Self::MaxLength(max) => length().is_some_and(|len| len > *max),
            Self::Pattern(re) => value.as_str().is_some_and(|s| !re.is_match(s)),
        };
        if !failed {
            return Ok(());
        }
        Err(DecodeError::invalid_type(match self {
            Self::Gt(l) => format!("value must be greater than {l}"),
            Self::Ge(l) => format!("value must be greater than or equal to {l}"),
            Self::Lt(l) => format!("value must be less than {l}"),
            Self::Le(l) => format!("value must be less than or equal to {l}"),
            Self::MinLength(n) => format!("value must have at least {n} items or characters"),
            Self::MaxLength(n) => format!("value must have at most {n} items or characters"),
            Self::Pattern(re) => format!("value does not match pattern '{}'", re.as_str()),
        }))
    }

    /// Length rules against a raw byte count; other rules do not apply.
    fn check_bytes(&self, len: usize) -> Result<(), DecodeError> {
        match self {
            Self::MinLength(min) if len < *min => Err(DecodeError::invalid_type(format!(
                "value must have at least {min} bytes"
            ))),
            Self::MaxLength(max) if len > *max => Err(DecodeError::invalid_type(format!(
                "value must have at most {max} bytes"
            ))),
            _ => Ok(()),
        }
    }
}

#[derive(Debug)]
enum Shape {
    Any,
    Null,
    Str,
    Int,
    Float,
    Bool,
    Bytes,
    Literal(Vec<Value>),
    List(Box<Plan>),
    Map(Box<Plan>),
    Record(RecordPlan),
    Upload,
    /// Named or injectable types: passed through unchecked.
    Opaque,
    Union(Vec<Plan>),
}

#[derive(Debug)]
struct RecordPlan {
    fields: Vec<FieldPlan>,
    deny_unknown: bool,
}

#[derive(Debug)]
struct FieldPlan {
    name: String,
    plan: Plan,
    default: Option<Value>,
}

/// A compiled decode pipeline for one type.
#[derive(Debug)]
struct Plan {
    shape: Shape,
    rules: Vec<Rule>,
    custom: Option<CustomDecoder>,
}

impl Plan {
    fn compile(ty: &TypeExpr, param: &str) -> CompileResult<Self> {
        Self::from_resolved(&resolve(ty), param)
    }

    fn from_resolved(resolved: &ResolvedType, param: &str) -> CompileResult<Self> {
        let rules = resolved
            .constraints()
            .map(|c| Rule::compile(c, param))
            .collect::<CompileResult<Vec<_>>>()?;
        let custom = resolved.custom_decoder().cloned();

        let shape = match resolved.base() {
            TypeExpr::Any | TypeExpr::Var(_) => Shape::Any,
            TypeExpr::Null => Shape::Null,
            TypeExpr::Scalar(Scalar::Str) => Shape::Str,
            TypeExpr::Scalar(Scalar::Int) => Shape::Int,
            TypeExpr::Scalar(Scalar::Float) => Shape::Float,
            TypeExpr::Scalar(Scalar::Bool) => Shape::Bool,
            TypeExpr::Scalar(Scalar::Bytes) => Shape::Bytes,
            TypeExpr::Literal(values) => Shape::Literal(values.clone()),
            TypeExpr::List(inner) => Shape::List(Box::new(Self::compile(inner, param)?)),
            TypeExpr::Map(inner) => Shape::Map(Box::new(Self::compile(inner, param)?)),
            TypeExpr::Record(record) => Shape::Record(RecordPlan {
                fields: record
                    .fields
                    .iter()
                    .map(|f| {
                        Ok(FieldPlan {
                            name: f.name.clone(),
                            plan: Self::compile(&f.ty, param)?,
                            default: f.default.clone(),
                        })
                    })
                    .collect::<CompileResult<Vec<_>>>()?,
                deny_unknown: record.deny_unknown,
            }),
            TypeExpr::Upload => Shape::Upload,
            TypeExpr::Union(arms) => Shape::Union(
                arms.iter()
                    .map(|arm| Self::compile(arm, param))
                    .collect::<CompileResult<Vec<_>>>()?,
            ),
            TypeExpr::Named(_)
            | TypeExpr::Injectable(_)
            | TypeExpr::Annotated(..)
            | TypeExpr::Alias(_)
            | TypeExpr::Apply(..) => Shape::Opaque,
        };

        Ok(Self {
            shape,
            rules,
            custom,
        })
    }

    fn check(&self, value: &Value) -> Result<(), DecodeError> {
        self.rules.iter().try_for_each(|rule| rule.check(value))
    }

    /// True when the body is taken as uninterpreted bytes.
    fn is_raw_bytes(&self) -> bool {
        if self.custom.is_some() {
            return false;
        }
        match &self.shape {
            Shape::Bytes => true,
            Shape::Union(arms) => {
                arms.iter().any(|arm| matches!(arm.shape, Shape::Bytes))
                    && arms
                        .iter()
                        .all(|arm| arm.is_raw_bytes() || matches!(arm.shape, Shape::Null))
            }
            _ => false,
        }
    }

    fn accepts_upload(&self) -> bool {
        match &self.shape {
            Shape::Upload => true,
            Shape::List(inner) => inner.accepts_upload(),
            Shape::Union(arms) => arms.iter().any(Plan::accepts_upload),
            Shape::Record(record) => record.fields.iter().any(|f| f.plan.accepts_upload()),
            _ => false,
        }
    }

    /// Decodes every occurrence of a text-sourced key.
    fn decode_text(&self, values: &[String]) -> Result<Value, DecodeError> {
        let last = values.last().map_or("", String::as_str);
        let value = if let Some(custom) = &self.custom {
            let input = if matches!(self.shape, Shape::List(_)) {
                DecodeInput::Many(values)
            } else {
                DecodeInput::Text(last)
            };
            custom.decode(input).map_err(DecodeError::custom)?
        } else {
            match &self.shape {
                Shape::List(inner) => Value::Array(
                    values
                        .iter()
                        .enumerate()
                        .map(|(i, v)| {
                            inner
                                .decode_text(std::slice::from_ref(v))
                                .map_err(|e| e.at(&i.to_string()))
                        })
                        .collect::<Result<_, _>>()?,
                ),
                Shape::Union(arms) => first_match(arms, |arm| arm.decode_text(values))?,
                _ => self.shape_from_text(last)?,
            }
        };
        self.check(&value)?;
        Ok(value)
    }

    fn shape_from_text(&self, text: &str) -> Result<Value, DecodeError> {
        match &self.shape {
            Shape::Any | Shape::Str | Shape::Bytes => Ok(Value::String(text.to_string())),
            Shape::Int => text
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| DecodeError::invalid_type("value is not a valid integer")),
            Shape::Float => text
                .parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| DecodeError::invalid_type("value is not a valid number")),
            Shape::Bool => parse_bool(text)
                .map(Value::Bool)
                .ok_or_else(|| DecodeError::invalid_type("value is not a valid boolean")),
            Shape::Null => match text.to_ascii_lowercase().as_str() {
                "" | "null" | "none" => Ok(Value::Null),
                _ => Err(DecodeError::invalid_type("value is not null")),
            },
            Shape::Literal(allowed) => allowed
                .iter()
                .find(|candidate| literal_text(candidate) == text)
                .cloned()
                .ok_or_else(|| not_one_of(allowed)),
            Shape::Upload => Err(DecodeError::invalid_type("expected an uploaded file")),
            Shape::List(_) | Shape::Map(_) | Shape::Record(_) | Shape::Opaque => {
                let parsed: Value = serde_json::from_str(text)
                    .map_err(|e| DecodeError::invalid_payload(format!("invalid JSON: {e}")))?;
                self.shape_from_json(parsed)
            }
            Shape::Union(arms) => first_match(arms, |arm| arm.decode_text(&[text.to_string()])),
        }
    }

    /// Validates an already parsed JSON value.
    fn decode_json(&self, value: Value) -> Result<Value, DecodeError> {
        let value = match (&self.custom, &value) {
            (Some(custom), Value::String(s)) => custom
                .decode(DecodeInput::Text(s))
                .map_err(DecodeError::custom)?,
            _ => self.shape_from_json(value)?,
        };
        self.check(&value)?;
        Ok(value)
    }

    fn shape_from_json(&self, value: Value) -> Result<Value, DecodeError> {
        match &self.shape {
            Shape::Any | Shape::Opaque => Ok(value),
            Shape::Null if value.is_null() => Ok(value),
            Shape::Null => Err(DecodeError::invalid_type("value is not null")),
            Shape::Str if value.is_string() => Ok(value),
            Shape::Str => Err(DecodeError::invalid_type("value is not a valid string")),
            Shape::Bytes if value.is_string() => Ok(value),
            Shape::Bytes => Err(DecodeError::invalid_type("value is not valid bytes")),
            Shape::Int => json_int(&value)
                .ok_or_else(|| DecodeError::invalid_type("value is not a valid integer")),
            Shape::Float if value.is_number() => Ok(value),
            Shape::Float => Err(DecodeError::invalid_type("value is not a valid number")),
            Shape::Bool if value.is_boolean() => Ok(value),
            Shape::Bool => Err(DecodeError::invalid_type("value is not a valid boolean")),
            Shape::Literal(allowed) if allowed.contains(&value) => Ok(value),
            Shape::Literal(allowed) => Err(not_one_of(allowed)),
            Shape::Upload if UploadFile::is_upload_value(&value) => Ok(value),
            Shape::Upload => Err(DecodeError::invalid_type("expected an uploaded file")),
            Shape::List(inner) => match value {
                Value::Array(items) => items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| inner.decode_json(item).map_err(|e| e.at(&i.to_string())))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                _ => Err(DecodeError::invalid_type("value is not a valid list")),
            },
            Shape::Map(inner) => match value {
                Value::Object(entries) => entries
                    .into_iter()
                    .map(|(k, v)| {
                        let decoded = inner.decode_json(v).map_err(|e| e.at(&k))?;
                        Ok((k, decoded))
                    })
                    .collect::<Result<Map<_, _>, _>>()
                    .map(Value::Object),
                _ => Err(DecodeError::invalid_type("value is not a valid object")),
            },
            Shape::Record(record) => match value {
                Value::Object(entries) => record.decode_object(entries),
                _ => Err(DecodeError::invalid_type("value is not a valid object")),
            },
            Shape::Union(arms) => first_match(arms, |arm| arm.decode_json(value.clone())),
        }
    }

    /// Decodes a raw JSON (or raw bytes) body.
    fn decode_bytes(&self, body: &[u8]) -> Result<Value, DecodeError> {
        if let Some(custom) = &self.custom {
            let value = custom
                .decode(DecodeInput::Bytes(body))
                .map_err(DecodeError::custom)?;
            self.check(&value)?;
            return Ok(value);
        }
        if self.is_raw_bytes() {
            self.rules
                .iter()
                .try_for_each(|rule| rule.check_bytes(body.len()))?;
            return Ok(Value::String(STANDARD.encode(body)));
        }
        let parsed: Value = serde_json::from_slice(body)
            .map_err(|e| DecodeError::invalid_payload(format!("invalid JSON body: {e}")))?;
        self.decode_json(parsed)
    }

    /// Decodes a form field's occurrences.
    fn decode_form_values(&self, values: &[FormValue]) -> Result<Value, DecodeError> {
        let files: Vec<&UploadFile> = values.iter().filter_map(FormValue::as_file).collect();
        if self.accepts_upload() && !files.is_empty() {
            return match &self.shape {
                Shape::List(_) => {
                    self.decode_json(Value::Array(files.iter().map(|f| f.to_value()).collect()))
                }
                _ => self.decode_json(files[0].to_value()),
            };
        }

        let texts: Vec<String> = values
            .iter()
            .filter_map(FormValue::as_text)
            .map(str::to_string)
            .collect();
        if texts.is_empty() {
            return Err(DecodeError::invalid_type("expected a text field, got a file"));
        }
        self.decode_text(&texts)
    }

    /// Decodes a form body. `None` means the field was not submitted.
    fn decode_form(&self, form: &FormData, alias: &str) -> Result<Option<Value>, DecodeError> {
        if let Shape::Record(record) = &self.shape {
            let value = record.decode_form(form)?;
            self.check(&value)?;
            return Ok(Some(value));
        }
        let values = form.get_all(alias);
        if values.is_empty() {
            return Ok(None);
        }
        self.decode_form_values(values).map(Some)
    }
}

impl RecordPlan {
    fn decode_object(&self, mut entries: Map<String, Value>) -> Result<Value, DecodeError> {
        let mut out = Map::new();
        for field in &self.fields {
            let value = match entries.remove(&field.name) {
                Some(raw) => field.plan.decode_json(raw).map_err(|e| e.at(&field.name))?,
                None => field.missing()?,
            };
            out.insert(field.name.clone(), value);
        }
        if self.deny_unknown {
            if let Some(extra) = entries.keys().next() {
                return Err(DecodeError::invalid_type(format!("unexpected field '{extra}'")));
            }
        }
        Ok(Value::Object(out))
    }

    fn decode_form(&self, form: &FormData) -> Result<Value, DecodeError> {
        let mut out = Map::new();
        for field in &self.fields {
            let values = form.get_all(&field.name);
            let value = if values.is_empty() {
                field.missing()?
            } else {
                field
                    .plan
                    .decode_form_values(values)
                    .map_err(|e| e.at(&field.name))?
            };
            out.insert(field.name.clone(), value);
        }
        if self.deny_unknown {
            if let Some(extra) = form.names().find(|n| !self.fields.iter().any(|f| f.name == *n)) {
                return Err(DecodeError::invalid_type(format!("unexpected field '{extra}'")));
            }
        }
        Ok(Value::Object(out))
    }
}

impl FieldPlan {
    fn missing(&self) -> Result<Value, DecodeError> {
        self.default
            .clone()
            .ok_or_else(|| DecodeError::invalid_type("field required").at(&self.name))
    }
}

fn first_match(
    arms: &[Plan],
    attempt: impl Fn(&Plan) -> Result<Value, DecodeError>,
) -> Result<Value, DecodeError> {
    let mut first_error = None;
    for arm in arms {
        match attempt(arm) {
            Ok(value) => return Ok(value),
            Err(e) if first_error.is_none() && !matches!(arm.shape, Shape::Null) => {
                first_error = Some(e);
            }
            Err(_) => {}
        }
    }
    Err(first_error
        .unwrap_or_else(|| DecodeError::invalid_type("value does not match any allowed type")))
}

fn parse_bool(text: &str) -> Option<bool> {
    match text.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn json_int(value: &Value) -> Option<Value> {
    if value.is_i64() || value.is_u64() {
        return Some(value.clone());
    }
    let float = value.as_f64()?;
    #[allow(clippy::float_cmp)]
    let integral = float.fract() == 0.0 && float.abs() < 9.007_199_254_740_992e15;
    integral.then(|| Value::from(float as i64))
}

fn literal_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn not_one_of(allowed: &[Value]) -> DecodeError {
    let options: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    DecodeError::invalid_type(format!("value must be one of {}", options.join(", ")))
}

#[derive(Clone)]
enum TextSource {
    Plan(Arc<Plan>),
    Auth(Arc<dyn AuthDecoder>),
}

/// Decodes text-sourced values (path, query, header, cookie).
#[derive(Clone)]
pub struct TextDecoder {
    key: Arc<str>,
    source: TextSource,
}

impl TextDecoder {
    /// Decodes every occurrence of a key. Single-valued types use the last one.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the text does not decode to the type.
    pub fn decode(&self, values: &[String]) -> Result<Value, DecodeError> {
        match &self.source {
            TextSource::Plan(plan) => plan.decode_text(values),
            TextSource::Auth(auth) => {
                let raw = values.last().map_or("", String::as_str).trim();
                let (scheme, credentials) = raw.split_once(' ').unwrap_or((raw, ""));
                auth.decode(scheme, credentials.trim())
                    .map_err(DecodeError::custom)
            }
        }
    }

    /// Returns the cache key (canonical type rendering).
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

impl PartialEq for TextDecoder {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl fmt::Debug for TextDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TextDecoder").field(&self.key).finish()
    }
}

/// How a body parameter is read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// JSON (or raw bytes) payload.
    Json,
    /// Urlencoded or multipart form.
    Form,
}

/// Input handed to a [`BodyDecoder`].
#[derive(Debug, Clone, Copy)]
pub enum BodyInput<'a> {
    /// The raw body.
    Bytes(&'a [u8]),
    /// The parsed form.
    Form(&'a FormData),
}

/// Decodes the request body into one structured value.
#[derive(Clone)]
pub struct BodyDecoder {
    key: Arc<str>,
    kind: BodyKind,
    alias: String,
    content_type: &'static str,
    plan: Arc<Plan>,
}

impl BodyDecoder {
    /// Returns how the body is read.
    #[must_use]
    pub fn kind(&self) -> BodyKind {
        self.kind
    }

    /// Returns the expected request content type.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.content_type
    }

    /// True when the body binds as raw bytes rather than a decoded value.
    #[must_use]
    pub fn is_raw(&self) -> bool {
        self.kind == BodyKind::Json && self.plan.is_raw_bytes()
    }

    /// Applies the length constraints of a raw bytes body.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the body length violates a constraint.
    pub fn check_raw(&self, body: &[u8]) -> Result<(), DecodeError> {
        self.plan
            .rules
            .iter()
            .try_for_each(|rule| rule.check_bytes(body.len()))
    }

    /// Decodes the body. `Ok(None)` means the value was not submitted.
    ///
    /// A raw bytes body decodes to its base64 text.
    ///
    /// # Errors
    ///
    /// Returns a [`DecodeError`] when the body does not decode to the type.
    pub fn decode(&self, input: BodyInput<'_>) -> Result<Option<Value>, DecodeError> {
        self.decode_input(input).map_err(|err| {
            tracing::debug!(key = %self.key, alias = %self.alias, error = %err, "body rejected");
            err
        })
    }

    fn decode_input(&self, input: BodyInput<'_>) -> Result<Option<Value>, DecodeError> {
        match (self.kind, input) {
            (BodyKind::Json, BodyInput::Bytes(bytes)) => self.plan.decode_bytes(bytes).map(Some),
            (BodyKind::Form, BodyInput::Form(form)) => self.plan.decode_form(form, &self.alias),
            (BodyKind::Json, BodyInput::Form(_)) => {
                Err(DecodeError::invalid_payload("expected a JSON body, got a form"))
            }
            (BodyKind::Form, BodyInput::Bytes(_)) => {
                Err(DecodeError::invalid_payload("expected a form body"))
            }
        }
    }
}

impl PartialEq for BodyDecoder {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.kind == other.kind && self.alias == other.alias
    }
}

impl fmt::Debug for BodyDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyDecoder")
            .field("key", &self.key)
            .field("kind", &self.kind)
            .field("content_type", &self.content_type)
            .finish_non_exhaustive()
    }
}

/// Builds and caches decoders and picks response encoders.
#[derive(Default, Clone)]
pub struct DecoderFactory {
    plans: DashMap<String, Arc<Plan>>,
    auth: Option<Arc<dyn AuthDecoder>>,
}

impl DecoderFactory {
    /// Creates a factory with an empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the decoder used for `Authorization` header params.
    #[must_use]
    pub fn with_auth_decoder(mut self, auth: impl AuthDecoder + 'static) -> Self {
        self.set_auth_decoder(Arc::new(auth));
        self
    }

    /// Installs the `Authorization` decoder, keeping cached plans.
    pub fn set_auth_decoder(&mut self, auth: Arc<dyn AuthDecoder>) {
        self.auth = Some(auth);
    }

    /// Returns `true` if an `Authorization` decoder is configured.
    #[must_use]
    pub fn has_auth_decoder(&self) -> bool {
        self.auth.is_some()
    }

    fn plan(&self, param: &str, ty: &TypeExpr) -> CompileResult<(Arc<str>, Arc<Plan>)> {
        let resolved = resolve(ty);
        let key = plan_key(&resolved);
        if let Some(hit) = self.plans.get(&key) {
            return Ok((Arc::from(key.as_str()), Arc::clone(hit.value())));
        }
        let plan = Arc::new(Plan::from_resolved(&resolved, param)?);
        let stored = Arc::clone(self.plans.entry(key.clone()).or_insert(plan).value());
        Ok((Arc::from(key.as_str()), stored))
    }

    /// Returns the decoder for a text-sourced parameter of type `ty`.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidConstraint`] for uncompilable constraints.
    pub fn text_decoder(&self, param: &str, ty: &TypeExpr) -> CompileResult<TextDecoder> {
        let (key, plan) = self.plan(param, ty)?;
        Ok(TextDecoder {
            key,
            source: TextSource::Plan(plan),
        })
    }

    /// Returns the `Authorization` decoder, if one is configured.
    #[must_use]
    pub fn auth_decoder(&self) -> Option<TextDecoder> {
        self.auth.as_ref().map(|auth| TextDecoder {
            key: Arc::from("auth"),
            source: TextSource::Auth(Arc::clone(auth)),
        })
    }

    /// Returns the decoder for a body parameter.
    ///
    /// `alias` names the form field read when `ty` is not a record.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::InvalidConstraint`] for uncompilable constraints.
    pub fn body_decoder(
        &self,
        param: &str,
        alias: &str,
        ty: &TypeExpr,
        kind: BodyKind,
    ) -> CompileResult<BodyDecoder> {
        let (key, plan) = self.plan(param, ty)?;
        let content_type = match kind {
            BodyKind::Json if plan.is_raw_bytes() => "application/octet-stream",
            BodyKind::Json => "application/json",
            BodyKind::Form if plan.accepts_upload() => "multipart/form-data",
            BodyKind::Form => "application/x-www-form-urlencoded",
        };
        Ok(BodyDecoder {
            key,
            kind,
            alias: alias.to_string(),
            content_type,
            plan,
        })
    }

    /// Returns the response encoder for a return mark.
    #[must_use]
    pub fn encoder(&self, mark: Option<&ReturnMark>) -> Encoder {
        match mark {
            Some(ReturnMark::Empty) => Encoder::Empty,
            Some(ReturnMark::Text) => Encoder::Text,
            Some(ReturnMark::Html) => Encoder::Html,
            Some(ReturnMark::Stream) => Encoder::EventStream,
            Some(ReturnMark::Json | ReturnMark::Status(_)) | None => Encoder::Json,
        }
    }

    /// Returns the number of cached plans.
    #[must_use]
    pub fn cached(&self) -> usize {
        self.plans.len()
    }
}

/// Cache key: the decode-relevant parts of a resolved type, without source marks.
fn plan_key(resolved: &ResolvedType) -> String {
    let mut key = resolved.base().to_string();
    for constraint in resolved.constraints() {
        key.push_str(" & ");
        key.push_str(&constraint.to_string());
    }
    if let Some(custom) = resolved.custom_decoder() {
        key.push_str(" & decoder=");
        key.push_str(custom.name());
    }
    key
}

impl fmt::Debug for DecoderFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderFactory")
            .field("cached", &self.plans.len())
            .field("auth", &self.auth.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use heron_core::{RecordType, TypeExpr};
    use proptest::prelude::*;
    use serde_json::json;

    fn texts(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| (*s).to_string()).collect()
    }

    fn decode(ty: &TypeExpr, values: &[&str]) -> Result<Value, DecodeError> {
        DecoderFactory::new()
            .text_decoder("p", ty)
            .unwrap()
            .decode(&texts(values))
    }

    fn user() -> TypeExpr {
        TypeExpr::record(
            RecordType::new("User")
                .field("id", TypeExpr::int())
                .field("name", TypeExpr::str())
                .field_with_default("admin", TypeExpr::bool(), json!(false)),
        )
    }

    #[test]
    fn test_scalars() {
        assert_eq!(decode(&TypeExpr::int(), &["42"]).unwrap(), json!(42));
        assert_eq!(decode(&TypeExpr::float(), &["2.5"]).unwrap(), json!(2.5));
        assert_eq!(decode(&TypeExpr::str(), &["hi"]).unwrap(), json!("hi"));
        assert_eq!(decode(&TypeExpr::int(), &["1", "2"]).unwrap(), json!(2));
    }

    #[test]
    fn test_bool_spellings() {
        for yes in ["true", "1", "YES", "On"] {
            assert_eq!(decode(&TypeExpr::bool(), &[yes]).unwrap(), json!(true));
        }
        for no in ["false", "0", "no", "OFF"] {
            assert_eq!(decode(&TypeExpr::bool(), &[no]).unwrap(), json!(false));
        }
        assert!(decode(&TypeExpr::bool(), &["maybe"]).is_err());
    }

    #[test]
    fn test_invalid_int_is_invalid_type() {
        let err = decode(&TypeExpr::int(), &["abc"]).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidType);
    }

    #[test]
    fn test_list_from_repeated_keys() {
        let ty = TypeExpr::list(TypeExpr::int());
        assert_eq!(decode(&ty, &["1", "2", "3"]).unwrap(), json!([1, 2, 3]));
        let err = decode(&ty, &["1", "x"]).unwrap_err();
        assert!(err.message().starts_with("1: "));
    }

    #[test]
    fn test_optional_and_union() {
        let ty = TypeExpr::optional(TypeExpr::int());
        assert_eq!(decode(&ty, &["5"]).unwrap(), json!(5));
        assert_eq!(decode(&ty, &["null"]).unwrap(), Value::Null);
        let err = decode(&ty, &["x"]).unwrap_err();
        assert_eq!(err.message(), "value is not a valid integer");

        let ty = TypeExpr::union([TypeExpr::int(), TypeExpr::str()]);
        assert_eq!(decode(&ty, &["7"]).unwrap(), json!(7));
        assert_eq!(decode(&ty, &["seven"]).unwrap(), json!("seven"));
    }

    #[test]
    fn test_literal() {
        let ty = TypeExpr::literal([json!("asc"), json!("desc"), json!(1)]);
        assert_eq!(decode(&ty, &["desc"]).unwrap(), json!("desc"));
        assert_eq!(decode(&ty, &["1"]).unwrap(), json!(1));
        assert!(decode(&ty, &["up"]).unwrap_err().message().contains("one of"));
    }

    #[test]
    fn test_structured_query_value() {
        let ok = decode(&user(), &[r#"{"id": 1, "name": "a"}"#]).unwrap();
        assert_eq!(ok, json!({"id": 1, "name": "a", "admin": false}));

        let broken = decode(&user(), &["{id:"]).unwrap_err();
        assert_eq!(broken.kind(), DecodeErrorKind::InvalidPayload);

        let wrong = decode(&user(), &[r#"{"id": "x", "name": "a"}"#]).unwrap_err();
        assert_eq!(wrong.kind(), DecodeErrorKind::InvalidType);
        assert!(wrong.message().starts_with("id: "));
    }

    #[test]
    fn test_constraints() {
        let ty = TypeExpr::str()
            .constrained(Constraint::MinLength(2))
            .constrained(Constraint::Pattern("^[a-z]+$".into()));
        assert!(decode(&ty, &["ab"]).is_ok());
        assert!(decode(&ty, &["a"]).is_err());
        assert!(decode(&ty, &["AB"]).unwrap_err().message().contains("pattern"));
    }

    #[test]
    fn test_invalid_pattern_fails_compile() {
        let ty = TypeExpr::str().constrained(Constraint::Pattern("([".into()));
        let err = DecoderFactory::new().text_decoder("name", &ty).unwrap_err();
        assert!(matches!(err, CompileError::InvalidConstraint { ref param, .. } if param == "name"));
    }

    #[test]
    fn test_custom_decoder() {
        let upper = CustomDecoder::new("upper", |input| match input {
            DecodeInput::Text(s) if !s.is_empty() => Ok(json!(s.to_uppercase())),
            _ => Err("empty value".to_string()),
        });
        let ty = TypeExpr::str().with(heron_core::Meta::Decoder(upper));
        assert_eq!(decode(&ty, &["ab"]).unwrap(), json!("AB"));
        let err = decode(&ty, &[""]).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Custom);
        assert_eq!(err.message(), "empty value");
    }

    #[test]
    fn test_plan_cache() {
        let factory = DecoderFactory::new();
        let a = factory.text_decoder("a", &TypeExpr::int()).unwrap();
        let b = factory.text_decoder("b", &TypeExpr::int()).unwrap();
        factory.text_decoder("c", &TypeExpr::str()).unwrap();
        assert_eq!(a, b);
        assert_eq!(factory.cached(), 2);
    }

    #[test]
    fn test_plan_cache_ignores_source_marks() {
        use heron_core::types::marks;

        let factory = DecoderFactory::new();
        let query = factory
            .text_decoder("a", &marks::query(TypeExpr::int()))
            .unwrap();
        let header = factory
            .text_decoder("b", &marks::header(TypeExpr::int()))
            .unwrap();
        assert_eq!(query, header);
        assert_eq!(factory.cached(), 1);

        factory
            .text_decoder("c", &TypeExpr::int().constrained(Constraint::Ge(1.0)))
            .unwrap();
        assert_eq!(factory.cached(), 2);
    }

    #[test]
    fn test_raw_bytes_body() {
        let decoder = DecoderFactory::new()
            .body_decoder("raw", "raw", &TypeExpr::bytes(), BodyKind::Json)
            .unwrap();
        assert!(decoder.is_raw());
        assert_eq!(decoder.content_type(), "application/octet-stream");

        let body = [0xff, 0xfe, 0x00];
        assert!(decoder.check_raw(&body).is_ok());
        assert_eq!(
            decoder.decode(BodyInput::Bytes(&body)).unwrap(),
            Some(json!("//4A"))
        );

        let short = DecoderFactory::new()
            .body_decoder(
                "raw",
                "raw",
                &TypeExpr::bytes().constrained(Constraint::MinLength(4)),
                BodyKind::Json,
            )
            .unwrap();
        assert_eq!(
            short.check_raw(&body).unwrap_err().kind(),
            DecodeErrorKind::InvalidType
        );

        let json = DecoderFactory::new()
            .body_decoder("user", "user", &user(), BodyKind::Json)
            .unwrap();
        assert!(!json.is_raw());
    }

    #[test]
    fn test_auth_decoder() {
        let factory = DecoderFactory::new().with_auth_decoder(|scheme: &str, creds: &str| {
            if scheme.eq_ignore_ascii_case("bearer") && creds == "t0k3n" {
                Ok(json!({"sub": "alice"}))
            } else {
                Err("invalid credentials".to_string())
            }
        });
        let auth = factory.auth_decoder().unwrap();
        assert_eq!(
            auth.decode(&texts(&["Bearer t0k3n"])).unwrap(),
            json!({"sub": "alice"})
        );
        let err = auth.decode(&texts(&["Basic abc"])).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::Custom);
    }

    #[test]
    fn test_json_body() {
        let decoder = DecoderFactory::new()
            .body_decoder("user", "user", &user(), BodyKind::Json)
            .unwrap();
        assert_eq!(decoder.content_type(), "application/json");

        let value = decoder
            .decode(BodyInput::Bytes(br#"{"id":1,"name":"a","extra":true}"#))
            .unwrap();
        assert_eq!(value, Some(json!({"id": 1, "name": "a", "admin": false})));

        let err = decoder.decode(BodyInput::Bytes(b"{")).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidPayload);

        let err = decoder.decode(BodyInput::Bytes(br#"{"id":1}"#)).unwrap_err();
        assert_eq!(err.message(), "name: field required");
    }

    #[test]
    fn test_strict_record_rejects_unknown() {
        let ty = TypeExpr::record(
            RecordType::new("Strict")
                .field("a", TypeExpr::int())
                .deny_unknown_fields(),
        );
        let decoder = DecoderFactory::new()
            .body_decoder("s", "s", &ty, BodyKind::Json)
            .unwrap();
        let err = decoder
            .decode(BodyInput::Bytes(br#"{"a":1,"b":2}"#))
            .unwrap_err();
        assert!(err.message().contains("unexpected field 'b'"));
    }

    #[test]
    fn test_form_record_with_upload() {
        let ty = TypeExpr::record(
            RecordType::new("Upload")
                .field("title", TypeExpr::str())
                .field("count", TypeExpr::int())
                .field("file", TypeExpr::Upload),
        );
        let decoder = DecoderFactory::new()
            .body_decoder("form", "form", &ty, BodyKind::Form)
            .unwrap();
        assert_eq!(decoder.content_type(), "multipart/form-data");

        let mut form = FormData::new();
        form.push("title", FormValue::Text("report".into()));
        form.push("count", FormValue::Text("3".into()));
        form.push(
            "file",
            FormValue::File(UploadFile::new(Some("r.txt".into()), None, "abc")),
        );

        let value = decoder.decode(BodyInput::Form(&form)).unwrap().unwrap();
        assert_eq!(value["title"], "report");
        assert_eq!(value["count"], 3);
        assert_eq!(value["file"]["filename"], "r.txt");
    }

    #[test]
    fn test_form_single_field() {
        let decoder = DecoderFactory::new()
            .body_decoder("avatar", "avatar", &TypeExpr::Upload, BodyKind::Form)
            .unwrap();
        assert_eq!(decoder.decode(BodyInput::Form(&FormData::new())).unwrap(), None);

        let mut form = FormData::new();
        form.push("avatar", FormValue::Text("not a file".into()));
        let err = decoder.decode(BodyInput::Form(&form)).unwrap_err();
        assert_eq!(err.kind(), DecodeErrorKind::InvalidType);
    }

    #[test]
    fn test_encoder_selection() {
        let factory = DecoderFactory::new();
        assert_eq!(factory.encoder(None), Encoder::Json);
        assert_eq!(factory.encoder(Some(&ReturnMark::Empty)), Encoder::Empty);
        assert_eq!(factory.encoder(Some(&ReturnMark::Html)), Encoder::Html);
        assert_eq!(factory.encoder(Some(&ReturnMark::Stream)), Encoder::EventStream);
    }

    proptest! {
        #[test]
        fn prop_int_text_roundtrip(n in any::<i64>()) {
            prop_assert_eq!(decode(&TypeExpr::int(), &[n.to_string().as_str()]).unwrap(), json!(n));
        }

        #[test]
        fn prop_float_text_roundtrip(x in -1.0e12f64..1.0e12) {
            prop_assert_eq!(decode(&TypeExpr::float(), &[x.to_string().as_str()]).unwrap(), json!(x));
        }

        #[test]
        fn prop_bool_text_roundtrip(b in any::<bool>()) {
            prop_assert_eq!(decode(&TypeExpr::bool(), &[b.to_string().as_str()]).unwrap(), json!(b));
        }

        #[test]
        fn prop_str_text_roundtrip(s in ".*") {
            prop_assert_eq!(decode(&TypeExpr::str(), &[s.as_str()]).unwrap(), json!(s.clone()));
        }
    }
}
