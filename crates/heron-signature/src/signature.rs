//! Compiled endpoint signatures.
//!
//! An [`EndpointSignature`] is built once per handler and route and never
//! mutated. It holds every classified parameter group, the body parameter,
//! the dependency nodes, the names introduced only for nested dependencies,
//! and the response status map.
//!
//! # Example
//!
//! ```rust
//! use heron_signature::{CompileContext, EndpointSignature};
//! use heron_core::{Container, ParamDecl, TypeExpr};
//! use std::sync::Arc;
//!
//! let ctx = CompileContext::new(Arc::new(Container::new()));
//! let signature = EndpointSignature::compile(
//!     &ctx,
//!     "/users/{user_id}",
//!     &[
//!         ParamDecl::new("user_id", TypeExpr::int()),
//!         ParamDecl::new("verbose", TypeExpr::bool()).with_default(false.into()),
//!     ],
//!     None,
//! )
//! .unwrap();
//!
//! assert_eq!(signature.path_params().len(), 1);
//! assert_eq!(signature.query_params().len(), 1);
//! assert!(!signature.scoped());
//! ```

use heron_core::{CompileResult, DependencyGraph, ParamDecl, TypeExpr};
use heron_extract::{AuthDecoder, DecoderFactory};
use http::StatusCode;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

use crate::binder::BindingOptions;
use crate::param::{BodyParam, DependencyParam, ParamView, PluginParam, TextParam};
use crate::parser::{EndpointParams, ParamParser};
use crate::plugin::{PluginProvider, PluginRegistry};
use crate::returns::{ReturnAnalyzer, ReturnMap, ReturnSpec};
use crate::template::RouteTemplate;

/// Everything endpoint compilation needs from the application.
#[derive(Clone)]
pub struct CompileContext {
    graph: Arc<dyn DependencyGraph>,
    decoders: Arc<DecoderFactory>,
    auth: Option<Arc<dyn AuthDecoder>>,
    plugins: PluginRegistry,
    options: BindingOptions,
}

impl CompileContext {
    /// Creates a context around a dependency graph.
    #[must_use]
    pub fn new(graph: Arc<dyn DependencyGraph>) -> Self {
        Self {
            graph,
            decoders: Arc::new(DecoderFactory::new()),
            auth: None,
            plugins: PluginRegistry::new(),
            options: BindingOptions::default(),
        }
    }

    /// Sets the binding options.
    #[must_use]
    pub fn with_options(mut self, options: BindingOptions) -> Self {
        self.options = options;
        self
    }

    /// Uses a preconfigured decoder factory.
    ///
    /// A factory without its own `Authorization` decoder inherits the one
    /// set by [`Self::with_auth_decoder`].
    #[must_use]
    pub fn with_decoders(mut self, mut decoders: DecoderFactory) -> Self {
        if let Some(auth) = &self.auth {
            if !decoders.has_auth_decoder() {
                decoders.set_auth_decoder(Arc::clone(auth));
            }
        }
        self.decoders = Arc::new(decoders);
        self
    }

    /// Configures the `Authorization` header decoder on the current factory.
    #[must_use]
    pub fn with_auth_decoder(mut self, auth: impl AuthDecoder + 'static) -> Self {
        let auth: Arc<dyn AuthDecoder> = Arc::new(auth);
        Arc::make_mut(&mut self.decoders).set_auth_decoder(Arc::clone(&auth));
        self.auth = Some(auth);
        self
    }

    /// Registers a plugin provider.
    #[must_use]
    pub fn with_plugin(mut self, key: impl Into<String>, provider: impl PluginProvider + 'static) -> Self {
        self.plugins.register(key, provider);
        self
    }

    /// Returns the dependency graph.
    #[must_use]
    pub fn graph(&self) -> &Arc<dyn DependencyGraph> {
        &self.graph
    }

    /// Returns the decoder factory.
    #[must_use]
    pub fn decoders(&self) -> &DecoderFactory {
        &self.decoders
    }

    /// Returns the plugin registry.
    #[must_use]
    pub fn plugins(&self) -> &PluginRegistry {
        &self.plugins
    }

    /// Returns the binding options.
    #[must_use]
    pub fn options(&self) -> &BindingOptions {
        &self.options
    }
}

impl fmt::Debug for CompileContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompileContext")
            .field("decoders", &self.decoders)
            .field("plugins", &self.plugins)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Immutable compiled plan for one handler bound to one route.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointSignature {
    route: RouteTemplate,
    path_params: IndexMap<String, TextParam>,
    query_params: IndexMap<String, TextParam>,
    header_params: IndexMap<String, TextParam>,
    cookie_params: IndexMap<String, TextParam>,
    body_param: Option<BodyParam>,
    plugin_params: IndexMap<String, PluginParam>,
    dependencies: IndexMap<String, DependencyParam>,
    transitive_params: Vec<String>,
    scoped: bool,
    return_params: ReturnMap,
    unused_placeholders: Vec<String>,
}

impl EndpointSignature {
    /// Compiles a handler's declared parameters and return annotation.
    ///
    /// Placeholders of `route` no parameter consumes are logged as a warning
    /// and listed by [`EndpointSignature::unused_placeholders`].
    ///
    /// # Errors
    ///
    /// Returns the first [`heron_core::CompileError`] found.
    pub fn compile(
        ctx: &CompileContext,
        route: &str,
        params: &[ParamDecl],
        returns: Option<&TypeExpr>,
    ) -> CompileResult<Self> {
        let template = RouteTemplate::parse(route);
        let mut parser = ParamParser::new(&template, ctx.graph.as_ref(), &ctx.decoders, &ctx.plugins);
        let mut acc = EndpointParams::default();

        for decl in params {
            for parsed in parser.classify_decl(decl)? {
                acc.add(parsed)?;
            }
        }

        let unused_placeholders = parser.unconsumed_placeholders();
        let warn = ctx.options.warn_unused_path_keys;
        for placeholder in unused_placeholders.iter().filter(|_| warn) {
            tracing::warn!(
                route = %template,
                placeholder = %placeholder,
                "path placeholder is not consumed by any parameter"
            );
        }

        let declared: Vec<&str> = params.iter().map(|p| p.name.as_str()).collect();
        let transitive_params = bound_names(&acc)
            .filter(|name| !declared.contains(name))
            .map(str::to_string)
            .collect();

        let scoped = acc
            .dependencies
            .values()
            .any(|d| d.node.scoped() || ctx.graph.should_be_scoped(&d.node.key()));

        let return_params = ReturnAnalyzer::new(&ctx.decoders).analyze(returns)?;

        let signature = Self {
            route: template,
            path_params: acc.path,
            query_params: acc.query,
            header_params: acc.header,
            cookie_params: acc.cookie,
            body_param: acc.body,
            plugin_params: acc.plugins,
            dependencies: acc.dependencies,
            transitive_params,
            scoped,
            return_params,
            unused_placeholders,
        };
        tracing::debug!(
            route = %signature.route,
            params = signature.params().count(),
            dependencies = signature.dependencies.len(),
            scoped = signature.scoped,
            "compiled endpoint"
        );
        Ok(signature)
    }

    /// Returns the route template.
    #[must_use]
    pub fn route(&self) -> &RouteTemplate {
        &self.route
    }

    /// Returns the path params.
    #[must_use]
    pub fn path_params(&self) -> &IndexMap<String, TextParam> {
        &self.path_params
    }

    /// Returns the query params.
    #[must_use]
    pub fn query_params(&self) -> &IndexMap<String, TextParam> {
        &self.query_params
    }

    /// Returns the header params.
    #[must_use]
    pub fn header_params(&self) -> &IndexMap<String, TextParam> {
        &self.header_params
    }

    /// Returns the cookie params.
    #[must_use]
    pub fn cookie_params(&self) -> &IndexMap<String, TextParam> {
        &self.cookie_params
    }

    /// Returns the body param.
    #[must_use]
    pub fn body_param(&self) -> Option<&BodyParam> {
        self.body_param.as_ref()
    }

    /// Returns the dispatch-time params.
    #[must_use]
    pub fn plugin_params(&self) -> &IndexMap<String, PluginParam> {
        &self.plugin_params
    }

    /// Returns the dependency nodes.
    #[must_use]
    pub fn dependencies(&self) -> &IndexMap<String, DependencyParam> {
        &self.dependencies
    }

    /// Returns names bound only to satisfy nested dependencies.
    #[must_use]
    pub fn transitive_params(&self) -> &[String] {
        &self.transitive_params
    }

    /// Returns `true` if binding needs a request-lived resolution scope.
    #[must_use]
    pub fn scoped(&self) -> bool {
        self.scoped
    }

    /// Returns the status map.
    #[must_use]
    pub fn return_params(&self) -> &ReturnMap {
        &self.return_params
    }

    /// Returns the spec used for a status.
    #[must_use]
    pub fn return_spec(&self, status: StatusCode) -> Option<&ReturnSpec> {
        self.return_params.get(&status)
    }

    /// Returns the status used for plain values: the only declared status,
    /// or 200 when several are declared.
    #[must_use]
    pub fn default_status(&self) -> StatusCode {
        match self.return_params.len() {
            1 => self
                .return_params
                .keys()
                .next()
                .copied()
                .unwrap_or(StatusCode::OK),
            _ => StatusCode::OK,
        }
    }

    /// Returns route placeholders no parameter consumes.
    #[must_use]
    pub fn unused_placeholders(&self) -> &[String] {
        &self.unused_placeholders
    }

    /// Iterates every wire parameter: path, query, header, cookie, then body.
    pub fn params(&self) -> impl Iterator<Item = ParamView<'_>> {
        self.path_params
            .values()
            .chain(self.query_params.values())
            .chain(self.header_params.values())
            .chain(self.cookie_params.values())
            .map(ParamView::from)
            .chain(self.body_param.iter().map(ParamView::from))
    }
}

fn bound_names(acc: &EndpointParams) -> impl Iterator<Item = &str> {
    acc.path
        .keys()
        .chain(acc.query.keys())
        .chain(acc.header.keys())
        .chain(acc.cookie.keys())
        .chain(acc.plugins.keys())
        .chain(acc.dependencies.keys())
        .map(String::as_str)
        .chain(acc.body.iter().map(|b| b.info.name.as_str()))
}
