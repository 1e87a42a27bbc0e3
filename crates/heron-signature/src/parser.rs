//! Parameter classification.
//!
//! [`ParamParser::classify`] turns one declared parameter into zero or more
//! [`ParsedParam`]s. The first matching rule wins:
//!
//! 1. the name is an unconsumed placeholder of the route template (path);
//! 2. the base type is an injectable handle (plugin);
//! 3. the base type is body-shaped: a record, an upload, or a list or union
//!    containing one (body);
//! 4. the dependency graph can construct the base type (dependency, plus its
//!    own constructor parameters);
//! 5. an explicit source mark;
//! 6. a registered plugin mark;
//! 7. otherwise, a query parameter.
//!
//! A record that carries an explicit non-body source mark skips rule 3.

use heron_core::{
    resolve, CompileError, CompileResult, DependencyGraph, InjectableKind, ParamDecl, ParamMark,
    ParamSource, Scalar, TypeExpr, TypeKey,
};
use heron_extract::{BodyKind, DecoderFactory, Location};
use indexmap::IndexMap;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use crate::param::{
    BodyParam, DependencyParam, ParamInfo, ParsedParam, PluginParam, PluginSource, TextParam,
};
use crate::plugin::PluginRegistry;
use crate::template::RouteTemplate;

/// Parse-time accumulator of every classified parameter of one endpoint.
#[derive(Debug, Default)]
pub struct EndpointParams {
    /// Path placeholder params.
    pub path: IndexMap<String, TextParam>,
    /// Query params.
    pub query: IndexMap<String, TextParam>,
    /// Header params.
    pub header: IndexMap<String, TextParam>,
    /// Cookie params.
    pub cookie: IndexMap<String, TextParam>,
    /// The single body param.
    pub body: Option<BodyParam>,
    /// Plugin and dispatch-time params.
    pub plugins: IndexMap<String, PluginParam>,
    /// Dependency nodes.
    pub dependencies: IndexMap<String, DependencyParam>,
}

impl EndpointParams {
    /// Adds a classified parameter.
    ///
    /// A name already present in the same group is kept as first seen, so a
    /// sub-parameter shared by two dependencies is bound once.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::MultipleBodyParams`] for a second body param.
    pub fn add(&mut self, param: ParsedParam) -> CompileResult<()> {
        fn keep_first<T>(map: &mut IndexMap<String, T>, name: &str, value: T) {
            if !map.contains_key(name) {
                map.insert(name.to_string(), value);
            }
        }

        let name = param.name().to_string();
        match param {
            ParsedParam::Path(p) => keep_first(&mut self.path, &name, p),
            ParsedParam::Query(p) => keep_first(&mut self.query, &name, p),
            ParsedParam::Header(p) => keep_first(&mut self.header, &name, p),
            ParsedParam::Cookie(p) => keep_first(&mut self.cookie, &name, p),
            ParsedParam::Plugin(p) => keep_first(&mut self.plugins, &name, p),
            ParsedParam::Dependency(p) => keep_first(&mut self.dependencies, &name, p),
            ParsedParam::Body(p) => match &self.body {
                Some(existing) if existing.info.name == name => {}
                Some(existing) => {
                    return Err(CompileError::MultipleBodyParams {
                        first: existing.info.name.clone(),
                        second: name,
                    })
                }
                None => self.body = Some(p),
            },
        }
        Ok(())
    }

    /// Returns `true` if `name` is bound by any group.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.path.contains_key(name)
            || self.query.contains_key(name)
            || self.header.contains_key(name)
            || self.cookie.contains_key(name)
            || self.plugins.contains_key(name)
            || self.dependencies.contains_key(name)
            || self.body.as_ref().is_some_and(|b| b.info.name == name)
    }
}

/// Classifies declared parameters against one route.
pub struct ParamParser<'a> {
    route: &'a RouteTemplate,
    graph: &'a dyn DependencyGraph,
    decoders: &'a DecoderFactory,
    plugins: &'a PluginRegistry,
    consumed: HashSet<String>,
    expanded: HashSet<TypeKey>,
}

impl<'a> ParamParser<'a> {
    /// Creates a parser for `route`.
    #[must_use]
    pub fn new(
        route: &'a RouteTemplate,
        graph: &'a dyn DependencyGraph,
        decoders: &'a DecoderFactory,
        plugins: &'a PluginRegistry,
    ) -> Self {
        Self {
            route,
            graph,
            decoders,
            plugins,
            consumed: HashSet::new(),
            expanded: HashSet::new(),
        }
    }

    /// Classifies one declared parameter.
    ///
    /// A dependency yields its own node followed by its constructor's
    /// parameters, except those the graph builds itself.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] when the declaration cannot be compiled.
    pub fn classify(
        &mut self,
        name: &str,
        annotation: &TypeExpr,
        default: Option<&Value>,
    ) -> CompileResult<Vec<ParsedParam>> {
        let resolved = resolve(annotation);
        let mark = resolved.source_mark(name)?.cloned();
        let base = resolved.base().clone();

        if self.route.has_placeholder(name) && !self.consumed.contains(name) {
            return self.path_param(name, name, annotation, &base, default).map(|p| vec![p]);
        }

        if let TypeExpr::Injectable(kind) = &base {
            return Ok(vec![injectable(name, *kind, annotation, default)]);
        }

        check_bytes_union(name, &base)?;

        let explicit_non_body = mark
            .as_ref()
            .is_some_and(|m| !matches!(m.source, ParamSource::Body | ParamSource::Form));
        if is_body_shaped(&base) && !explicit_non_body {
            let kind = match (&mark, contains_upload(&base)) {
                (Some(ParamMark { source: ParamSource::Form, .. }), _) | (_, true) => {
                    BodyKind::Form
                }
                _ => BodyKind::Json,
            };
            let alias = alias_or(mark.as_ref(), name);
            return self
                .body_param(name, &alias, annotation, &base, default, kind)
                .map(|p| vec![p]);
        }

        if mark.is_none() || mark.as_ref().is_some_and(|m| m.source == ParamSource::Use) {
            if let TypeExpr::Named(key) = &base {
                if let Some(params) = self.dependency(name, *key)? {
                    return Ok(params);
                }
            }
        }

        if let Some(mark) = &mark {
            return self.marked(name, mark, annotation, &base, default);
        }

        if let Some(plugin) = resolved.plugin_mark() {
            let provider = self.plugins.get(&plugin.key).ok_or_else(|| {
                CompileError::UnresolvablePlugin {
                    param: name.to_string(),
                    key: plugin.key.clone(),
                }
            })?;
            let rejected = |reason: String| CompileError::PluginRejected {
                param: name.to_string(),
                key: plugin.key.clone(),
                reason,
            };
            let parsed = provider
                .parse(PluginParam {
                    info: info(name, name, &base, annotation, default),
                    source: PluginSource::Provider {
                        key: plugin.key.clone(),
                        config: plugin.config.clone(),
                        provider: Arc::clone(provider),
                    },
                })
                .map_err(rejected)?;
            if parsed.info.name != name {
                return Err(rejected(format!(
                    "provider renamed the parameter to '{}'",
                    parsed.info.name
                )));
            }
            return Ok(vec![ParsedParam::Plugin(parsed)]);
        }

        self.text_param(name, name, Location::Query, annotation, &base, default)
            .map(|p| vec![p])
    }

    /// Classifies a declaration.
    pub fn classify_decl(&mut self, decl: &ParamDecl) -> CompileResult<Vec<ParsedParam>> {
        self.classify(&decl.name, &decl.annotation, decl.default.as_ref())
    }

    /// Returns placeholders no parameter consumed, in template order.
    #[must_use]
    pub fn unconsumed_placeholders(&self) -> Vec<String> {
        self.route
            .placeholders()
            .into_iter()
            .filter(|p| !self.consumed.contains(*p))
            .map(str::to_string)
            .collect()
    }

    fn marked(
        &mut self,
        name: &str,
        mark: &ParamMark,
        annotation: &TypeExpr,
        base: &TypeExpr,
        default: Option<&Value>,
    ) -> CompileResult<Vec<ParsedParam>> {
        let param = match mark.source {
            ParamSource::Path => {
                let alias = alias_or(Some(mark), name);
                self.path_param(name, &alias, annotation, base, default)?
            }
            ParamSource::Query => {
                let alias = alias_or(Some(mark), name);
                self.text_param(name, &alias, Location::Query, annotation, base, default)?
            }
            ParamSource::Header => {
                let alias = mark
                    .alias
                    .clone()
                    .unwrap_or_else(|| name.replace('_', "-"))
                    .to_ascii_lowercase();
                self.header_param(name, &alias, annotation, base, default)?
            }
            ParamSource::Cookie => {
                let alias = alias_or(Some(mark), name);
                self.text_param(name, &alias, Location::Cookie, annotation, base, default)?
            }
            ParamSource::Body | ParamSource::Form => {
                let kind = if mark.source == ParamSource::Form || contains_upload(base) {
                    BodyKind::Form
                } else {
                    BodyKind::Json
                };
                let alias = alias_or(Some(mark), name);
                self.body_param(name, &alias, annotation, base, default, kind)?
            }
            ParamSource::Use => {
                return Err(CompileError::UnresolvableDependency {
                    param: name.to_string(),
                    ty: base.to_string(),
                })
            }
        };
        Ok(vec![param])
    }

    fn dependency(&mut self, name: &str, key: TypeKey) -> CompileResult<Option<Vec<ParsedParam>>> {
        let Some(node) = self.graph.analyze(&key) else {
            return Ok(None);
        };

        let mut out = Vec::new();
        let first_visit = self.expanded.insert(key);
        if first_visit {
            for sub in node.params() {
                if self.graph_builds(&sub.annotation) {
                    continue;
                }
                out.extend(self.classify_decl(sub)?);
            }
        }
        out.insert(
            0,
            ParsedParam::Dependency(DependencyParam {
                name: name.to_string(),
                node,
            }),
        );
        Ok(Some(out))
    }

    fn graph_builds(&self, annotation: &TypeExpr) -> bool {
        match resolve(annotation).base() {
            TypeExpr::Named(key) => self.graph.analyze(key).is_some(),
            _ => false,
        }
    }

    fn path_param(
        &mut self,
        name: &str,
        alias: &str,
        annotation: &TypeExpr,
        base: &TypeExpr,
        default: Option<&Value>,
    ) -> CompileResult<ParsedParam> {
        if default.is_some() {
            return Err(CompileError::PathParamDefault {
                param: name.to_string(),
                route: self.route.to_string(),
            });
        }
        if !self.route.has_placeholder(alias) {
            return Err(CompileError::UnknownPathPlaceholder {
                param: name.to_string(),
                alias: alias.to_string(),
                route: self.route.to_string(),
            });
        }
        self.consumed.insert(alias.to_string());
        self.text_param(name, alias, Location::Path, annotation, base, default)
    }

    fn header_param(
        &mut self,
        name: &str,
        alias: &str,
        annotation: &TypeExpr,
        base: &TypeExpr,
        default: Option<&Value>,
    ) -> CompileResult<ParsedParam> {
        if alias.eq_ignore_ascii_case("authorization") {
            if let Some(decoder) = self.decoders.auth_decoder() {
                return Ok(ParsedParam::Header(TextParam {
                    info: info(name, alias, base, annotation, default),
                    location: Location::Header,
                    decoder,
                }));
            }
        }
        self.text_param(name, alias, Location::Header, annotation, base, default)
    }

    fn text_param(
        &mut self,
        name: &str,
        alias: &str,
        location: Location,
        annotation: &TypeExpr,
        base: &TypeExpr,
        default: Option<&Value>,
    ) -> CompileResult<ParsedParam> {
        let param = TextParam {
            info: info(name, alias, base, annotation, default),
            location,
            decoder: self.decoders.text_decoder(name, annotation)?,
        };
        Ok(match location {
            Location::Path => ParsedParam::Path(param),
            Location::Header => ParsedParam::Header(param),
            Location::Cookie => ParsedParam::Cookie(param),
            Location::Query | Location::Body => ParsedParam::Query(param),
        })
    }

    fn body_param(
        &mut self,
        name: &str,
        alias: &str,
        annotation: &TypeExpr,
        base: &TypeExpr,
        default: Option<&Value>,
        kind: BodyKind,
    ) -> CompileResult<ParsedParam> {
        Ok(ParsedParam::Body(BodyParam {
            info: info(name, alias, base, annotation, default),
            decoder: self.decoders.body_decoder(name, alias, annotation, kind)?,
        }))
    }
}

fn info(
    name: &str,
    alias: &str,
    base: &TypeExpr,
    annotation: &TypeExpr,
    default: Option<&Value>,
) -> ParamInfo {
    ParamInfo {
        name: name.to_string(),
        alias: alias.to_string(),
        ty: base.clone(),
        annotation: annotation.clone(),
        default: default.cloned(),
    }
}

fn injectable(
    name: &str,
    kind: InjectableKind,
    annotation: &TypeExpr,
    default: Option<&Value>,
) -> ParsedParam {
    ParsedParam::Plugin(PluginParam {
        info: info(name, name, &TypeExpr::Injectable(kind), annotation, default),
        source: PluginSource::Injectable(kind),
    })
}

fn alias_or(mark: Option<&ParamMark>, name: &str) -> String {
    mark.and_then(|m| m.alias.clone())
        .unwrap_or_else(|| name.to_string())
}

/// Records, uploads, and lists or unions containing one.
fn is_body_shaped(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Record(_) | TypeExpr::Upload => true,
        TypeExpr::List(inner) => is_body_shaped(resolve(inner).base()),
        TypeExpr::Union(arms) => arms.iter().any(is_body_shaped),
        _ => false,
    }
}

fn contains_upload(ty: &TypeExpr) -> bool {
    match ty {
        TypeExpr::Upload => true,
        TypeExpr::List(inner) => contains_upload(resolve(inner).base()),
        TypeExpr::Union(arms) => arms.iter().any(contains_upload),
        TypeExpr::Record(record) => record
            .fields
            .iter()
            .any(|f| contains_upload(resolve(&f.ty).base())),
        _ => false,
    }
}

fn check_bytes_union(name: &str, base: &TypeExpr) -> CompileResult<()> {
    let TypeExpr::Union(arms) = base else {
        return Ok(());
    };
    let is_bytes = |t: &TypeExpr| matches!(t, TypeExpr::Scalar(Scalar::Bytes));
    let has_bytes = arms.iter().any(is_bytes);
    let has_other = arms.iter().any(|t| !is_bytes(t) && !t.is_null());
    if has_bytes && has_other {
        return Err(CompileError::AmbiguousBytesUnion {
            param: name.to_string(),
            ty: base.to_string(),
        });
    }
    Ok(())
}
