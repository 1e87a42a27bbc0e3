//! Type descriptors.
//!
//! Handlers, dependency constructors and return values describe their types
//! with [`TypeExpr`], an explicit tree of kinds, type arguments and ordered
//! metadata. Routing sources are attached as [`ParamMark`]s inside
//! [`TypeExpr::Annotated`] wrappers rather than being inferred from the shape
//! of a generic parameter.
//!
//! # Example
//!
//! ```rust
//! use heron_core::types::{marks, RecordType, TypeExpr};
//!
//! let user = RecordType::new("User")
//!     .field("id", TypeExpr::int())
//!     .field("name", TypeExpr::str());
//!
//! let page = marks::query(TypeExpr::int());
//! let token = marks::header_alias(TypeExpr::str(), "X-Token");
//!
//! assert_eq!(TypeExpr::record(user).to_string(), "User{id:int,name:str}");
//! assert!(page.to_string().starts_with("Annotated[int"));
//! assert!(token.to_string().contains("X-Token"));
//! ```

use serde_json::Value;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;

/// Scalar kinds decodable from a single text value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scalar {
    /// UTF-8 text.
    Str,
    /// Signed 64-bit integer.
    Int,
    /// 64-bit float.
    Float,
    /// Boolean.
    Bool,
    /// Raw bytes, passed through without coercion.
    Bytes,
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Str => write!(f, "str"),
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::Bool => write!(f, "bool"),
            Self::Bytes => write!(f, "bytes"),
        }
    }
}

/// Process-wide handles injected at dispatch time instead of being decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InjectableKind {
    /// The live request object.
    Request,
    /// The resolver (dependency graph or request scope) serving the request.
    Resolver,
    /// The event bus attached by the transport.
    EventBus,
    /// The socket handle attached by a WebSocket transport.
    Socket,
}

impl fmt::Display for InjectableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Request => write!(f, "Request"),
            Self::Resolver => write!(f, "Resolver"),
            Self::EventBus => write!(f, "EventBus"),
            Self::Socket => write!(f, "Socket"),
        }
    }
}

/// Nominal identity of a Rust type known to the dependency graph.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct TypeKey {
    id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Returns the key for `T`.
    #[must_use]
    pub fn of<T: 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Returns the underlying [`TypeId`].
    #[must_use]
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Returns the fully qualified type name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Returns the last path segment of the type name.
    #[must_use]
    pub fn short_name(&self) -> &'static str {
        let base = self.name.split('<').next().unwrap_or(self.name);
        base.rsplit("::").next().unwrap_or(base)
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TypeKey({})", self.name)
    }
}

impl fmt::Display for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}

/// A field of a [`RecordType`].
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    /// Field name as it appears on the wire.
    pub name: String,
    /// Declared field type.
    pub ty: TypeExpr,
    /// Value used when the field is absent.
    pub default: Option<Value>,
}

impl Field {
    /// Returns `true` if the field has no default.
    #[must_use]
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// A payload-shaped structured type (an object with named fields).
#[derive(Debug, Clone, PartialEq)]
pub struct RecordType {
    /// Type name used in diagnostics.
    pub name: String,
    /// Ordered fields.
    pub fields: Vec<Field>,
    /// Reject unknown keys instead of ignoring them.
    pub deny_unknown: bool,
}

impl RecordType {
    /// Creates an empty record type.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fields: Vec::new(),
            deny_unknown: false,
        }
    }

    /// Adds a required field.
    #[must_use]
    pub fn field(mut self, name: impl Into<String>, ty: TypeExpr) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            default: None,
        });
        self
    }

    /// Adds a field with a default value.
    #[must_use]
    pub fn field_with_default(
        mut self,
        name: impl Into<String>,
        ty: TypeExpr,
        default: Value,
    ) -> Self {
        self.fields.push(Field {
            name: name.into(),
            ty,
            default: Some(default),
        });
        self
    }

    /// Rejects unknown keys during decoding.
    #[must_use]
    pub fn deny_unknown_fields(mut self) -> Self {
        self.deny_unknown = true;
        self
    }

    /// Looks up a field by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A named alias, optionally generic over type variables.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeAlias {
    /// Alias name.
    pub name: String,
    /// Type variable names, in order.
    pub params: Vec<String>,
    /// Aliased type (may reference the variables via [`TypeExpr::Var`]).
    pub target: TypeExpr,
}

/// Raw input handed to a [`CustomDecoder`].
#[derive(Debug, Clone, Copy)]
pub enum DecodeInput<'a> {
    /// A single text value.
    Text(&'a str),
    /// Every occurrence of a repeated key.
    Many(&'a [String]),
    /// A raw body payload.
    Bytes(&'a [u8]),
}

type DecodeFn = dyn Fn(DecodeInput<'_>) -> Result<Value, String> + Send + Sync;

/// A user-supplied decoder replacing the built-in coercion for one parameter.
///
/// An `Err` message is reported verbatim as a custom decode problem.
#[derive(Clone)]
pub struct CustomDecoder {
    name: String,
    func: Arc<DecodeFn>,
}

impl CustomDecoder {
    /// Creates a named custom decoder.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(DecodeInput<'_>) -> Result<Value, String> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            func: Arc::new(func),
        }
    }

    /// Returns the decoder name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the decoder.
    pub fn decode(&self, input: DecodeInput<'_>) -> Result<Value, String> {
        (self.func)(input)
    }
}

impl PartialEq for CustomDecoder {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.func, &other.func)
    }
}

impl fmt::Debug for CustomDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CustomDecoder")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Wire source of a parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamSource {
    /// URL path template placeholder.
    Path,
    /// Query string.
    Query,
    /// Request header.
    Header,
    /// Cookie.
    Cookie,
    /// Structured request body.
    Body,
    /// Form body (urlencoded or multipart).
    Form,
    /// Constructed by the dependency graph.
    Use,
}

impl fmt::Display for ParamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Path => write!(f, "path"),
            Self::Query => write!(f, "query"),
            Self::Header => write!(f, "header"),
            Self::Cookie => write!(f, "cookie"),
            Self::Body => write!(f, "body"),
            Self::Form => write!(f, "form"),
            Self::Use => write!(f, "use"),
        }
    }
}

/// A routing-source mark, optionally renaming the wire key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ParamMark {
    /// Where the value comes from.
    pub source: ParamSource,
    /// Wire-visible key overriding the parameter name.
    pub alias: Option<String>,
}

impl ParamMark {
    /// Creates a mark without an alias.
    #[must_use]
    pub fn new(source: ParamSource) -> Self {
        Self {
            source,
            alias: None,
        }
    }

    /// Sets the wire alias.
    #[must_use]
    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }
}

impl fmt::Display for ParamMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.alias {
            Some(alias) => write!(f, "{}({alias})", self.source),
            None => write!(f, "{}", self.source),
        }
    }
}

/// Mark routing a parameter to a registered plugin provider.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginMark {
    /// Provider registry key.
    pub key: String,
    /// Provider-specific configuration.
    pub config: Option<Value>,
}

/// Value constraint enforced after decoding.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// Strictly greater than.
    Gt(f64),
    /// Greater than or equal.
    Ge(f64),
    /// Strictly less than.
    Lt(f64),
    /// Less than or equal.
    Le(f64),
    /// Minimum length of a string or list.
    MinLength(usize),
    /// Maximum length of a string or list.
    MaxLength(usize),
    /// Regular expression a string must match.
    Pattern(String),
}

impl fmt::Display for Constraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Gt(v) => write!(f, "gt={v}"),
            Self::Ge(v) => write!(f, "ge={v}"),
            Self::Lt(v) => write!(f, "lt={v}"),
            Self::Le(v) => write!(f, "le={v}"),
            Self::MinLength(v) => write!(f, "min_length={v}"),
            Self::MaxLength(v) => write!(f, "max_length={v}"),
            Self::Pattern(p) => write!(f, "pattern={p:?}"),
        }
    }
}

/// A status code as written in a return mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusLiteral {
    /// Numeric code.
    Code(u16),
    /// Textual form, either digits (`"201"`) or a reason name (`"NOT_FOUND"`).
    Name(String),
}

impl fmt::Display for StatusLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Code(code) => write!(f, "{code}"),
            Self::Name(name) => write!(f, "{name}"),
        }
    }
}

/// Return-annotation marks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReturnMark {
    /// Response status for this return arm.
    Status(StatusLiteral),
    /// No response body regardless of declared type.
    Empty,
    /// Each produced item is encoded independently.
    Stream,
    /// `text/plain` body.
    Text,
    /// `text/html` body.
    Html,
    /// `application/json` body.
    Json,
}

impl fmt::Display for ReturnMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Status(s) => write!(f, "status={s}"),
            Self::Empty => write!(f, "empty"),
            Self::Stream => write!(f, "stream"),
            Self::Text => write!(f, "text"),
            Self::Html => write!(f, "html"),
            Self::Json => write!(f, "json"),
        }
    }
}

/// A metadata item attached to a type.
#[derive(Debug, Clone, PartialEq)]
pub enum Meta {
    /// Routing-source mark.
    Mark(ParamMark),
    /// Post-decode constraint.
    Constraint(Constraint),
    /// Plugin provider mark.
    Plugin(PluginMark),
    /// Return-annotation mark.
    Return(ReturnMark),
    /// Free-form description for documentation.
    Description(String),
    /// Custom decoder.
    Decoder(CustomDecoder),
}

impl fmt::Display for Meta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mark(m) => write!(f, "{m}"),
            Self::Constraint(c) => write!(f, "{c}"),
            Self::Plugin(p) => write!(f, "plugin({})", p.key),
            Self::Return(r) => write!(f, "{r}"),
            Self::Description(d) => write!(f, "doc({d:?})"),
            Self::Decoder(d) => write!(f, "decoder({}@{:p})", d.name, Arc::as_ptr(&d.func)),
        }
    }
}

/// Language-neutral type descriptor.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeExpr {
    /// Any value; decoded as text or passed through.
    Any,
    /// The null / absent type.
    Null,
    /// A scalar.
    Scalar(Scalar),
    /// One of a fixed set of values.
    Literal(Vec<Value>),
    /// Homogeneous list.
    List(Box<TypeExpr>),
    /// String-keyed map.
    Map(Box<TypeExpr>),
    /// Payload-shaped structured type.
    Record(Arc<RecordType>),
    /// Uploaded file from a multipart form.
    Upload,
    /// Dispatch-time handle.
    Injectable(InjectableKind),
    /// Nominal type, typically constructible by the dependency graph.
    Named(TypeKey),
    /// Union of alternatives.
    Union(Vec<TypeExpr>),
    /// Type carrying ordered metadata.
    Annotated(Box<TypeExpr>, Vec<Meta>),
    /// Reference to a named alias.
    Alias(Arc<TypeAlias>),
    /// Generic alias applied to type arguments.
    Apply(Arc<TypeAlias>, Vec<TypeExpr>),
    /// Type variable bound by an enclosing generic alias.
    Var(String),
}

impl TypeExpr {
    /// `str`
    #[must_use]
    pub fn str() -> Self {
        Self::Scalar(Scalar::Str)
    }

    /// `int`
    #[must_use]
    pub fn int() -> Self {
        Self::Scalar(Scalar::Int)
    }

    /// `float`
    #[must_use]
    pub fn float() -> Self {
        Self::Scalar(Scalar::Float)
    }

    /// `bool`
    #[must_use]
    pub fn bool() -> Self {
        Self::Scalar(Scalar::Bool)
    }

    /// `bytes`
    #[must_use]
    pub fn bytes() -> Self {
        Self::Scalar(Scalar::Bytes)
    }

    /// `list[inner]`
    #[must_use]
    pub fn list(inner: TypeExpr) -> Self {
        Self::List(Box::new(inner))
    }

    /// `map[str, inner]`
    #[must_use]
    pub fn map(inner: TypeExpr) -> Self {
        Self::Map(Box::new(inner))
    }

    /// A record type.
    #[must_use]
    pub fn record(record: RecordType) -> Self {
        Self::Record(Arc::new(record))
    }

    /// A nominal type known to the dependency graph.
    #[must_use]
    pub fn named<T: 'static>() -> Self {
        Self::Named(TypeKey::of::<T>())
    }

    /// A dispatch-time handle.
    #[must_use]
    pub fn injectable(kind: InjectableKind) -> Self {
        Self::Injectable(kind)
    }

    /// `inner | null`
    #[must_use]
    pub fn optional(inner: TypeExpr) -> Self {
        Self::Union(vec![inner, Self::Null])
    }

    /// A union of alternatives.
    #[must_use]
    pub fn union(arms: impl IntoIterator<Item = TypeExpr>) -> Self {
        Self::Union(arms.into_iter().collect())
    }

    /// One of a fixed set of values.
    #[must_use]
    pub fn literal(values: impl IntoIterator<Item = Value>) -> Self {
        Self::Literal(values.into_iter().collect())
    }

    /// A non-generic alias.
    #[must_use]
    pub fn alias(name: impl Into<String>, target: TypeExpr) -> Self {
        Self::Alias(Arc::new(TypeAlias {
            name: name.into(),
            params: Vec::new(),
            target,
        }))
    }

    /// Declares a generic alias to be used with [`TypeExpr::apply`].
    #[must_use]
    pub fn generic(
        name: impl Into<String>,
        params: impl IntoIterator<Item = impl Into<String>>,
        target: TypeExpr,
    ) -> Arc<TypeAlias> {
        Arc::new(TypeAlias {
            name: name.into(),
            params: params.into_iter().map(Into::into).collect(),
            target,
        })
    }

    /// Applies a generic alias to type arguments.
    #[must_use]
    pub fn apply(alias: &Arc<TypeAlias>, args: impl IntoIterator<Item = TypeExpr>) -> Self {
        Self::Apply(Arc::clone(alias), args.into_iter().collect())
    }

    /// A type variable.
    #[must_use]
    pub fn var(name: impl Into<String>) -> Self {
        Self::Var(name.into())
    }

    /// Attaches one metadata item.
    #[must_use]
    pub fn with(self, meta: Meta) -> Self {
        self.with_all([meta])
    }

    /// Attaches several metadata items, preserving order.
    #[must_use]
    pub fn with_all(self, metas: impl IntoIterator<Item = Meta>) -> Self {
        Self::Annotated(Box::new(self), metas.into_iter().collect())
    }

    /// Attaches a constraint.
    #[must_use]
    pub fn constrained(self, constraint: Constraint) -> Self {
        self.with(Meta::Constraint(constraint))
    }

    /// Returns `true` for the null type.
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Returns the union arms, or a single-element slice for non-unions.
    #[must_use]
    pub fn arms(&self) -> &[TypeExpr] {
        match self {
            Self::Union(arms) => arms,
            other => std::slice::from_ref(other),
        }
    }

    /// Returns `true` if `null` is an accepted value.
    #[must_use]
    pub fn is_nullable(&self) -> bool {
        self.arms().iter().any(|arm| matches!(arm, Self::Null | Self::Any))
    }
}

impl From<Scalar> for TypeExpr {
    fn from(scalar: Scalar) -> Self {
        Self::Scalar(scalar)
    }
}

fn write_joined<T: fmt::Display>(
    f: &mut fmt::Formatter<'_>,
    items: &[T],
    sep: &str,
) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_str(sep)?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

/// Canonical text form. Two descriptors with the same rendering decode identically.
impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Null => write!(f, "null"),
            Self::Scalar(s) => write!(f, "{s}"),
            Self::Literal(values) => {
                write!(f, "Literal[")?;
                write_joined(f, values, ",")?;
                write!(f, "]")
            }
            Self::List(inner) => write!(f, "list[{inner}]"),
            Self::Map(inner) => write!(f, "map[{inner}]"),
            Self::Record(record) => {
                write!(f, "{}{{", record.name)?;
                for (i, field) in record.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{}:{}", field.name, field.ty)?;
                    if let Some(default) = &field.default {
                        write!(f, "={default}")?;
                    }
                }
                if record.deny_unknown {
                    write!(f, ";strict")?;
                }
                write!(f, "}}")
            }
            Self::Upload => write!(f, "UploadFile"),
            Self::Injectable(kind) => write!(f, "{kind}"),
            Self::Named(key) => write!(f, "{}", key.name()),
            Self::Union(arms) => {
                write!(f, "Union[")?;
                write_joined(f, arms, "|")?;
                write!(f, "]")
            }
            Self::Annotated(inner, metas) => {
                write!(f, "Annotated[{inner}, ")?;
                write_joined(f, metas, ", ")?;
                write!(f, "]")
            }
            Self::Alias(alias) => write!(f, "{}", alias.name),
            Self::Apply(alias, args) => {
                write!(f, "{}[", alias.name)?;
                write_joined(f, args, ",")?;
                write!(f, "]")
            }
            Self::Var(name) => write!(f, "~{name}"),
        }
    }
}

/// Shorthands for attaching routing-source marks.
pub mod marks {
    use super::{Meta, ParamMark, ParamSource, PluginMark, ReturnMark, StatusLiteral, TypeExpr};

    fn mark(ty: TypeExpr, source: ParamSource, alias: Option<&str>) -> TypeExpr {
        let mut mark = ParamMark::new(source);
        if let Some(alias) = alias {
            mark = mark.alias(alias);
        }
        ty.with(Meta::Mark(mark))
    }

    /// Value read from a path placeholder.
    #[must_use]
    pub fn path(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Path, None)
    }

    /// Value read from a differently named path placeholder.
    #[must_use]
    pub fn path_alias(ty: TypeExpr, alias: &str) -> TypeExpr {
        mark(ty, ParamSource::Path, Some(alias))
    }

    /// Value read from the query string.
    #[must_use]
    pub fn query(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Query, None)
    }

    /// Value read from the query string under another key.
    #[must_use]
    pub fn query_alias(ty: TypeExpr, alias: &str) -> TypeExpr {
        mark(ty, ParamSource::Query, Some(alias))
    }

    /// Value read from a header named after the parameter.
    #[must_use]
    pub fn header(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Header, None)
    }

    /// Value read from an explicitly named header.
    #[must_use]
    pub fn header_alias(ty: TypeExpr, alias: &str) -> TypeExpr {
        mark(ty, ParamSource::Header, Some(alias))
    }

    /// Value read from a cookie named after the parameter.
    #[must_use]
    pub fn cookie(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Cookie, None)
    }

    /// Value read from an explicitly named cookie.
    #[must_use]
    pub fn cookie_alias(ty: TypeExpr, alias: &str) -> TypeExpr {
        mark(ty, ParamSource::Cookie, Some(alias))
    }

    /// Value decoded from the request body.
    #[must_use]
    pub fn body(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Body, None)
    }

    /// Value decoded from a form body.
    #[must_use]
    pub fn form(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Form, None)
    }

    /// Value constructed by the dependency graph.
    #[must_use]
    pub fn use_dep(ty: TypeExpr) -> TypeExpr {
        mark(ty, ParamSource::Use, None)
    }

    /// Value supplied by the plugin provider registered under `key`.
    #[must_use]
    pub fn plugin(ty: TypeExpr, key: &str) -> TypeExpr {
        ty.with(Meta::Plugin(PluginMark {
            key: key.to_string(),
            config: None,
        }))
    }

    /// Return arm with an explicit status.
    #[must_use]
    pub fn status(ty: TypeExpr, code: u16) -> TypeExpr {
        ty.with(Meta::Return(ReturnMark::Status(StatusLiteral::Code(code))))
    }

    /// Return arm with no body.
    #[must_use]
    pub fn empty() -> TypeExpr {
        TypeExpr::Null.with(Meta::Return(ReturnMark::Empty))
    }

    /// Return type streamed item by item.
    #[must_use]
    pub fn stream(item: TypeExpr) -> TypeExpr {
        item.with(Meta::Return(ReturnMark::Stream))
    }

    /// `text/plain` return.
    #[must_use]
    pub fn text() -> TypeExpr {
        TypeExpr::str().with(Meta::Return(ReturnMark::Text))
    }

    /// `text/html` return.
    #[must_use]
    pub fn html() -> TypeExpr {
        TypeExpr::str().with(Meta::Return(ReturnMark::Html))
    }

    /// `application/json` return.
    #[must_use]
    pub fn json(ty: TypeExpr) -> TypeExpr {
        ty.with(Meta::Return(ReturnMark::Json))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Database;

    #[test]
    fn test_scalar_display() {
        assert_eq!(TypeExpr::str().to_string(), "str");
        assert_eq!(TypeExpr::list(TypeExpr::int()).to_string(), "list[int]");
        assert_eq!(
            TypeExpr::optional(TypeExpr::float()).to_string(),
            "Union[float|null]"
        );
    }

    #[test]
    fn test_record_display_includes_defaults() {
        let record = RecordType::new("Page")
            .field("q", TypeExpr::str())
            .field_with_default("size", TypeExpr::int(), json!(20));
        assert_eq!(TypeExpr::record(record).to_string(), "Page{q:str,size:int=20}");
    }

    #[test]
    fn test_type_key_names() {
        let key = TypeKey::of::<Database>();
        assert_eq!(key.short_name(), "Database");
        assert!(key.name().ends_with("Database"));
        assert_eq!(key, TypeKey::of::<Database>());
        assert_ne!(key, TypeKey::of::<String>());
    }

    #[test]
    fn test_marks_attach_metadata() {
        let ty = marks::header_alias(TypeExpr::str(), "X-Request-Id");
        match ty {
            TypeExpr::Annotated(inner, metas) => {
                assert_eq!(*inner, TypeExpr::str());
                assert_eq!(
                    metas,
                    vec![Meta::Mark(
                        ParamMark::new(ParamSource::Header).alias("X-Request-Id")
                    )]
                );
            }
            other => panic!("expected annotated type, got {other}"),
        }
    }

    #[test]
    fn test_nullable() {
        assert!(TypeExpr::optional(TypeExpr::int()).is_nullable());
        assert!(!TypeExpr::int().is_nullable());
        assert!(TypeExpr::Any.is_nullable());
    }

    #[test]
    fn test_custom_decoder_identity() {
        let decoder = CustomDecoder::new("upper", |input| match input {
            DecodeInput::Text(s) => Ok(Value::String(s.to_uppercase())),
            _ => Err("expected text".to_string()),
        });
        let same = decoder.clone();
        let other = CustomDecoder::new("upper", |_| Ok(Value::Null));

        assert_eq!(decoder, same);
        assert_ne!(decoder, other);
        assert_eq!(decoder.decode(DecodeInput::Text("ab")), Ok(json!("AB")));
    }
}
