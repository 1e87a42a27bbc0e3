//! Compiled parameter descriptors.

use heron_core::{DependencyNode, InjectableKind, TypeExpr};
use heron_extract::{BodyDecoder, BodyKind, Location, TextDecoder};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

use crate::plugin::PluginProvider;

/// Fields shared by every parameter descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamInfo {
    /// Handler-side name.
    pub name: String,
    /// Wire-visible key.
    pub alias: String,
    /// Resolved base type.
    pub ty: TypeExpr,
    /// Annotation as declared.
    pub annotation: TypeExpr,
    /// Default value, if any.
    pub default: Option<Value>,
}

impl ParamInfo {
    /// Returns `true` if no default is declared.
    #[must_use]
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// A single-value parameter read from path, query, header or cookie text.
#[derive(Debug, Clone, PartialEq)]
pub struct TextParam {
    /// Shared descriptor fields.
    pub info: ParamInfo,
    /// Where the text is read from.
    pub location: Location,
    pub(crate) decoder: TextDecoder,
}

impl TextParam {
    /// Returns the handler-side name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns the wire key.
    #[must_use]
    pub fn alias(&self) -> &str {
        &self.info.alias
    }

    /// Returns the decoder.
    #[must_use]
    pub fn decoder(&self) -> &TextDecoder {
        &self.decoder
    }
}

/// The request body parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyParam {
    /// Shared descriptor fields.
    pub info: ParamInfo,
    pub(crate) decoder: BodyDecoder,
}

impl BodyParam {
    /// Returns the handler-side name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.info.name
    }

    /// Returns the expected request content type.
    #[must_use]
    pub fn content_type(&self) -> &'static str {
        self.decoder.content_type()
    }

    /// Returns `true` when the body is read as a form.
    #[must_use]
    pub fn is_form(&self) -> bool {
        self.decoder.kind() == BodyKind::Form
    }

    /// Returns the decoder.
    #[must_use]
    pub fn decoder(&self) -> &BodyDecoder {
        &self.decoder
    }
}

/// Where a plugin parameter's value comes from.
#[derive(Clone)]
pub enum PluginSource {
    /// A dispatch-time handle.
    Injectable(InjectableKind),
    /// A registered provider.
    Provider {
        /// Registry key.
        key: String,
        /// Configuration carried by the mark.
        config: Option<Value>,
        /// The provider.
        provider: Arc<dyn PluginProvider>,
    },
}

impl PartialEq for PluginSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Injectable(a), Self::Injectable(b)) => a == b,
            (
                Self::Provider {
                    key: a, config: ac, ..
                },
                Self::Provider {
                    key: b, config: bc, ..
                },
            ) => a == b && ac == bc,
            _ => false,
        }
    }
}

impl fmt::Debug for PluginSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Injectable(kind) => f.debug_tuple("Injectable").field(kind).finish(),
            Self::Provider { key, config, .. } => f
                .debug_struct("Provider")
                .field("key", key)
                .field("config", config)
                .finish_non_exhaustive(),
        }
    }
}

/// A parameter supplied at dispatch time instead of decoded from the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginParam {
    /// Shared descriptor fields.
    pub info: ParamInfo,
    /// Value source.
    pub source: PluginSource,
}

/// A parameter constructed by the dependency graph.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyParam {
    /// Handler-side name.
    pub name: String,
    /// Graph node.
    pub node: DependencyNode,
}

/// One classified parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedParam {
    /// URL path placeholder.
    Path(TextParam),
    /// Query string value.
    Query(TextParam),
    /// Header value.
    Header(TextParam),
    /// Cookie value.
    Cookie(TextParam),
    /// Request body.
    Body(BodyParam),
    /// Dispatch-time value.
    Plugin(PluginParam),
    /// Constructed dependency.
    Dependency(DependencyParam),
}

impl ParsedParam {
    /// Returns the handler-side name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Path(p) | Self::Query(p) | Self::Header(p) | Self::Cookie(p) => p.name(),
            Self::Body(p) => p.name(),
            Self::Plugin(p) => &p.info.name,
            Self::Dependency(p) => &p.name,
        }
    }
}

/// Read-only view of a wire parameter for documentation generators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamView<'a> {
    /// Where the value is read from.
    pub location: Location,
    /// Handler-side name.
    pub name: &'a str,
    /// Wire key.
    pub alias: &'a str,
    /// Resolved type.
    pub ty: &'a TypeExpr,
    /// Whether a value must be supplied.
    pub required: bool,
    /// Request content type, for the body.
    pub content_type: Option<&'static str>,
}

impl<'a> From<&'a TextParam> for ParamView<'a> {
    fn from(param: &'a TextParam) -> Self {
        Self {
            location: param.location,
            name: &param.info.name,
            alias: &param.info.alias,
            ty: &param.info.ty,
            required: param.info.required(),
            content_type: None,
        }
    }
}

impl<'a> From<&'a BodyParam> for ParamView<'a> {
    fn from(param: &'a BodyParam) -> Self {
        Self {
            location: Location::Body,
            name: &param.info.name,
            alias: &param.info.alias,
            ty: &param.info.ty,
            required: param.info.required(),
            content_type: Some(param.content_type()),
        }
    }
}
