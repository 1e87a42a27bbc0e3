//! Dependency graph.
//!
//! The binding compiler talks to the dependency graph through three
//! capabilities: [`DependencyGraph::analyze`] (what does a type need to be
//! built), [`Resolver::resolve`] (build it, given already-bound arguments) and
//! [`DependencyGraph::should_be_scoped`] (does building it acquire a resource
//! that must be released when the request ends).
//!
//! [`Container`] is the default implementation: a fixed constructor-wiring
//! table populated at application startup.
//!
//! # Example
//!
//! ```rust
//! use heron_core::di::{Container, ParamDecl};
//! use heron_core::{DependencyGraph, Resolver, TypeExpr, TypeKey, BoundArgs};
//! use std::sync::Arc;
//!
//! struct Config { dsn: String }
//! struct Database { dsn: String }
//!
//! let mut container = Container::new();
//! container.register(Arc::new(Config { dsn: "postgres://localhost/db".into() }));
//! container.factory::<Database, _, _>(
//!     vec![ParamDecl::new("config", TypeExpr::named::<Config>())],
//!     |args| async move {
//!         let config = args.require::<Config>("config")?;
//!         Ok(Database { dsn: config.dsn.clone() })
//!     },
//! );
//!
//! let node = container.analyze(&TypeKey::of::<Database>()).unwrap();
//! assert!(!node.scoped());
//!
//! # tokio_test::block_on(async {
//! let db = container.resolve(&node, &BoundArgs::new()).await.unwrap();
//! assert_eq!(db.downcast::<Database>().unwrap().dsn, "postgres://localhost/db");
//! # });
//! ```

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::any::{Any, TypeId};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::resolve::resolve as resolve_type;
use crate::types::{TypeExpr, TypeKey};
use crate::value::{ArgValue, BoundArgs, Instance};

/// A declared parameter of a handler or dependency constructor.
#[derive(Debug, Clone, PartialEq)]
pub struct ParamDecl {
    /// Parameter name.
    pub name: String,
    /// Declared type, including metadata.
    pub annotation: TypeExpr,
    /// Default value; `None` makes the parameter required.
    pub default: Option<Value>,
}

impl ParamDecl {
    /// Declares a required parameter.
    #[must_use]
    pub fn new(name: impl Into<String>, annotation: TypeExpr) -> Self {
        Self {
            name: name.into(),
            annotation,
            default: None,
        }
    }

    /// Declares a parameter with a default value.
    #[must_use]
    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }

    /// Returns `true` if no default is declared.
    #[must_use]
    pub fn required(&self) -> bool {
        self.default.is_none()
    }
}

/// Handle into the dependency graph for one constructible type.
#[derive(Debug, Clone, PartialEq)]
pub struct DependencyNode {
    key: TypeKey,
    params: Vec<ParamDecl>,
    scoped: bool,
}

impl DependencyNode {
    /// Creates a node.
    #[must_use]
    pub fn new(key: TypeKey, params: Vec<ParamDecl>, scoped: bool) -> Self {
        Self {
            key,
            params,
            scoped,
        }
    }

    /// Returns the constructed type.
    #[must_use]
    pub fn key(&self) -> TypeKey {
        self.key
    }

    /// Returns the constructor parameters.
    #[must_use]
    pub fn params(&self) -> &[ParamDecl] {
        &self.params
    }

    /// Returns `true` if building this node needs a request scope.
    #[must_use]
    pub fn scoped(&self) -> bool {
        self.scoped
    }
}

/// Error when a dependency cannot be resolved.
#[derive(Error, Debug)]
pub enum ResolveError {
    /// The type has no registration.
    #[error("failed to resolve {ty}: type not registered")]
    NotRegistered {
        /// Type name.
        ty: &'static str,
    },

    /// A constructor parameter could not be supplied.
    #[error("failed to resolve {ty}: no value for constructor parameter '{param}'")]
    MissingArgument {
        /// Type name.
        ty: &'static str,
        /// Parameter name.
        param: String,
    },

    /// The constructor graph contains a cycle.
    #[error("circular dependency detected: {path}")]
    Cycle {
        /// The cycle, rendered `A -> B -> A`.
        path: String,
    },

    /// A disposable type was requested outside a request scope.
    #[error("failed to resolve {ty}: disposable dependencies require a request scope")]
    RequiresScope {
        /// Type name.
        ty: &'static str,
    },

    /// The scope was already closed.
    #[error("request scope {0} is closed")]
    ScopeClosed(Uuid),

    /// The constructor failed.
    #[error("failed to construct {ty}: {source}")]
    Construction {
        /// Type name.
        ty: &'static str,
        /// Constructor error.
        #[source]
        source: anyhow::Error,
    },

    /// A disposer failed.
    #[error("failed to dispose {ty}: {source}")]
    Disposal {
        /// Type name.
        ty: &'static str,
        /// Disposer error.
        #[source]
        source: anyhow::Error,
    },
}

/// Builds instances for dependency nodes.
#[async_trait]
pub trait Resolver: Send + Sync {
    /// Resolves `node`, supplying constructor parameters from `bound` by name
    /// before falling back to the graph.
    async fn resolve(&self, node: &DependencyNode, bound: &BoundArgs)
        -> Result<Instance, ResolveError>;
}

/// A request-lived resolution context.
#[async_trait]
pub trait ResolverScope: Resolver {
    /// Returns this scope as a plain resolver handle.
    fn as_resolver(self: Arc<Self>) -> Arc<dyn Resolver>;

    /// Runs every registered disposer, newest first.
    ///
    /// All disposers are attempted; the first failure is returned.
    async fn close(&self) -> Result<(), ResolveError>;
}

/// Capability interface of the dependency graph consumed by the compiler.
pub trait DependencyGraph: Resolver {
    /// Describes how to construct `key`, or `None` if the graph cannot.
    fn analyze(&self, key: &TypeKey) -> Option<DependencyNode>;

    /// Returns `true` if constructing `key` acquires a disposable resource.
    fn should_be_scoped(&self, key: &TypeKey) -> bool;

    /// Returns the graph as a plain resolver handle.
    fn as_resolver(self: Arc<Self>) -> Arc<dyn Resolver>;

    /// Opens a request-lived scope.
    fn open_scope(self: Arc<Self>) -> Arc<dyn ResolverScope>;
}

/// Resolver handle injected into handlers that ask for one.
#[derive(Clone)]
pub struct ResolverHandle(pub Arc<dyn Resolver>);

impl fmt::Debug for ResolverHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResolverHandle(..)")
    }
}

type Constructor = Arc<dyn Fn(BoundArgs) -> BoxFuture<'static, anyhow::Result<Instance>> + Send + Sync>;
type Disposer = Arc<dyn Fn(Instance) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifetime {
    /// Built once, cached in the container.
    Singleton,
    /// Built on every resolution (once per request inside a scope).
    Transient,
    /// Built once per scope and disposed when the scope closes.
    Disposable,
}

struct Registration {
    key: TypeKey,
    params: Vec<ParamDecl>,
    lifetime: Lifetime,
    ctor: Option<Constructor>,
    disposer: Option<Disposer>,
}

/// Default dependency graph backed by a constructor-wiring table.
///
/// Constructor parameters are supplied, in order of preference, from the
/// caller's bound arguments (by name), by recursively resolving a registered
/// type, and finally from the declared default.
///
/// # Thread Safety
///
/// The container is `Send + Sync`. Registration happens at startup through
/// `&mut self`; the singleton cache is internally synchronized.
#[derive(Default)]
pub struct Container {
    registrations: HashMap<TypeId, Registration>,
    singletons: RwLock<HashMap<TypeId, Instance>>,
}

impl Container {
    /// Creates a new empty container.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a ready-made singleton.
    pub fn register<T: Send + Sync + 'static>(&mut self, service: Arc<T>) {
        let key = TypeKey::of::<T>();
        self.singletons.write().insert(key.id(), service);
        self.registrations.insert(
            key.id(),
            Registration {
                key,
                params: Vec::new(),
                lifetime: Lifetime::Singleton,
                ctor: None,
                disposer: None,
            },
        );
    }

    /// Registers a constructor producing a fresh `T` per resolution.
    pub fn factory<T, F, Fut>(&mut self, params: Vec<ParamDecl>, ctor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert::<T>(params, Lifetime::Transient, erase_ctor(ctor), None);
    }

    /// Registers a constructor whose result is built once and shared.
    pub fn singleton_factory<T, F, Fut>(&mut self, params: Vec<ParamDecl>, ctor: F)
    where
        T: Send + Sync + 'static,
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert::<T>(params, Lifetime::Singleton, erase_ctor(ctor), None);
    }

    /// Registers a resource that lives for one request and is released by `dispose`.
    pub fn disposable<T, F, Fut, D, DFut>(&mut self, params: Vec<ParamDecl>, ctor: F, dispose: D)
    where
        T: Send + Sync + 'static,
        F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        D: Fn(Arc<T>) -> DFut + Send + Sync + 'static,
        DFut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let dispose = Arc::new(dispose);
        let disposer: Disposer = Arc::new(move |instance: Instance| {
            let dispose = Arc::clone(&dispose);
            Box::pin(async move {
                match instance.downcast::<T>() {
                    Ok(typed) => dispose(typed).await,
                    Err(_) => Ok(()),
                }
            })
        });
        self.insert::<T>(params, Lifetime::Disposable, erase_ctor(ctor), Some(disposer));
    }

    fn insert<T: 'static>(
        &mut self,
        params: Vec<ParamDecl>,
        lifetime: Lifetime,
        ctor: Constructor,
        disposer: Option<Disposer>,
    ) {
        let key = TypeKey::of::<T>();
        self.singletons.write().remove(&key.id());
        self.registrations.insert(
            key.id(),
            Registration {
                key,
                params,
                lifetime,
                ctor: Some(ctor),
                disposer,
            },
        );
    }

    /// Returns an already-built singleton.
    #[must_use]
    pub fn get<T: Send + Sync + 'static>(&self) -> Option<Arc<T>> {
        self.singletons
            .read()
            .get(&TypeId::of::<T>())
            .and_then(|s| Arc::clone(s).downcast::<T>().ok())
    }

    /// Checks if a type is registered.
    #[must_use]
    pub fn contains<T: 'static>(&self) -> bool {
        self.registrations.contains_key(&TypeId::of::<T>())
    }

    /// Returns the number of registrations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Opens a request scope over this container.
    #[must_use]
    pub fn scope(self: &Arc<Self>) -> Scope {
        Scope {
            id: Uuid::now_v7(),
            container: Arc::clone(self),
            state: ScopeState::default(),
        }
    }

    fn scoped_key(&self, key: &TypeKey, visiting: &mut HashSet<TypeId>) -> bool {
        let Some(reg) = self.registrations.get(&key.id()) else {
            return false;
        };
        if reg.lifetime == Lifetime::Disposable {
            return true;
        }
        if !visiting.insert(key.id()) {
            return false;
        }
        // Singletons outlive any request, so what they capture is not request-owned.
        if reg.lifetime == Lifetime::Singleton {
            return false;
        }
        reg.params.iter().any(|p| {
            named_key(&p.annotation).is_some_and(|dep| self.scoped_key(&dep, visiting))
        })
    }

    fn construct<'a>(
        &'a self,
        key: TypeKey,
        bound: &'a BoundArgs,
        scope: Option<&'a ScopeState>,
        mut stack: Vec<TypeKey>,
    ) -> BoxFuture<'a, Result<Instance, ResolveError>> {
        Box::pin(async move {
            let singleton = self.singletons.read().get(&key.id()).cloned();
            if let Some(hit) = singleton {
                return Ok(hit);
            }
            if let Some(hit) = scope.and_then(|s| s.cached(&key)) {
                return Ok(hit);
            }

            let reg = self
                .registrations
                .get(&key.id())
                .ok_or(ResolveError::NotRegistered { ty: key.name() })?;

            if stack.contains(&key) {
                stack.push(key);
                return Err(ResolveError::Cycle {
                    path: stack
                        .iter()
                        .map(TypeKey::short_name)
                        .collect::<Vec<_>>()
                        .join(" -> "),
                });
            }
            if reg.lifetime == Lifetime::Disposable && scope.is_none() {
                return Err(ResolveError::RequiresScope { ty: key.name() });
            }
            let Some(ctor) = &reg.ctor else {
                return Err(ResolveError::NotRegistered { ty: key.name() });
            };
            stack.push(key);

            let mut args = BoundArgs::new();
            for param in &reg.params {
                if let Some(value) = bound.get(&param.name) {
                    args.insert(param.name.clone(), value.clone());
                    continue;
                }
                if let Some(dep) = named_key(&param.annotation) {
                    if self.registrations.contains_key(&dep.id()) {
                        let instance = self.construct(dep, bound, scope, stack.clone()).await?;
                        args.insert(param.name.clone(), ArgValue::Instance(instance));
                        continue;
                    }
                }
                match &param.default {
                    Some(default) => args.insert_value(param.name.clone(), default.clone()),
                    None => {
                        return Err(ResolveError::MissingArgument {
                            ty: key.name(),
                            param: param.name.clone(),
                        })
                    }
                }
            }

            let instance = ctor(args)
                .await
                .map_err(|source| ResolveError::Construction {
                    ty: key.name(),
                    source,
                })?;

            match (reg.lifetime, scope) {
                (Lifetime::Singleton, _) => {
                    let mut singletons = self.singletons.write();
                    // A concurrent resolution may have won the race; keep the first.
                    let stored = singletons
                        .entry(key.id())
                        .or_insert_with(|| Arc::clone(&instance));
                    return Ok(Arc::clone(stored));
                }
                (Lifetime::Disposable, Some(state)) => {
                    if let Some(disposer) = &reg.disposer {
                        state.push_disposer(reg.key, Arc::clone(&instance), Arc::clone(disposer));
                    }
                    state.store(key, Arc::clone(&instance));
                }
                (Lifetime::Transient, Some(state)) => state.store(key, Arc::clone(&instance)),
                _ => {}
            }
            Ok(instance)
        })
    }
}

fn named_key(annotation: &TypeExpr) -> Option<TypeKey> {
    match resolve_type(annotation).base() {
        TypeExpr::Named(key) => Some(*key),
        _ => None,
    }
}

fn erase_ctor<T, F, Fut>(ctor: F) -> Constructor
where
    T: Send + Sync + 'static,
    F: Fn(BoundArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |args: BoundArgs| {
        let fut = ctor(args);
        Box::pin(async move { fut.await.map(|v| Arc::new(v) as Instance) })
    })
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registration_count", &self.registrations.len())
            .field("singleton_count", &self.singletons.read().len())
            .finish()
    }
}

#[async_trait]
impl Resolver for Container {
    async fn resolve(
        &self,
        node: &DependencyNode,
        bound: &BoundArgs,
    ) -> Result<Instance, ResolveError> {
        self.construct(node.key(), bound, None, Vec::new()).await
    }
}

impl DependencyGraph for Container {
    fn analyze(&self, key: &TypeKey) -> Option<DependencyNode> {
        let reg = self.registrations.get(&key.id())?;
        Some(DependencyNode::new(
            reg.key,
            reg.params.clone(),
            self.should_be_scoped(key),
        ))
    }

    fn should_be_scoped(&self, key: &TypeKey) -> bool {
        self.scoped_key(key, &mut HashSet::new())
    }

    fn as_resolver(self: Arc<Self>) -> Arc<dyn Resolver> {
        self
    }

    fn open_scope(self: Arc<Self>) -> Arc<dyn ResolverScope> {
        Arc::new(self.scope())
    }
}

#[derive(Default)]
struct ScopeState {
    cache: Mutex<HashMap<TypeId, Instance>>,
    disposers: Mutex<Vec<(TypeKey, Instance, Disposer)>>,
    closed: AtomicBool,
}

impl ScopeState {
    fn cached(&self, key: &TypeKey) -> Option<Instance> {
        self.cache.lock().get(&key.id()).cloned()
    }

    fn store(&self, key: TypeKey, instance: Instance) {
        self.cache.lock().insert(key.id(), instance);
    }

    fn push_disposer(&self, key: TypeKey, instance: Instance, disposer: Disposer) {
        self.disposers.lock().push((key, instance, disposer));
    }
}

/// Request-lived resolution scope over a [`Container`].
///
/// Instances built inside the scope are reused for the rest of the request.
/// Disposable resources are released in reverse construction order by
/// [`ResolverScope::close`].
pub struct Scope {
    id: Uuid,
    container: Arc<Container>,
    state: ScopeState,
}

impl Scope {
    /// Returns the scope identifier.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the number of resources awaiting disposal.
    #[must_use]
    pub fn pending_disposals(&self) -> usize {
        self.state.disposers.lock().len()
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scope")
            .field("id", &self.id)
            .field("pending_disposals", &self.pending_disposals())
            .finish()
    }
}

#[async_trait]
impl Resolver for Scope {
    async fn resolve(
        &self,
        node: &DependencyNode,
        bound: &BoundArgs,
    ) -> Result<Instance, ResolveError> {
        if self.state.closed.load(Ordering::Acquire) {
            return Err(ResolveError::ScopeClosed(self.id));
        }
        self.container
            .construct(node.key(), bound, Some(&self.state), Vec::new())
            .await
    }
}

#[async_trait]
impl ResolverScope for Scope {
    fn as_resolver(self: Arc<Self>) -> Arc<dyn Resolver> {
        self
    }

    async fn close(&self) -> Result<(), ResolveError> {
        if self.state.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let pending: Vec<_> = std::mem::take(&mut *self.state.disposers.lock());
        self.state.cache.lock().clear();

        let mut first_error = None;
        for (key, instance, disposer) in pending.into_iter().rev() {
            if let Err(source) = disposer(instance).await {
                tracing::warn!(scope = %self.id, dependency = key.short_name(), error = %source, "dependency disposal failed");
                first_error.get_or_insert(ResolveError::Disposal {
                    ty: key.name(),
                    source,
                });
            }
        }
        tracing::trace!(scope = %self.id, "request scope closed");
        first_error.map_or(Ok(()), Err)
    }
}

/// Returns `true` if `instance` holds a `T`.
#[must_use]
pub fn is_instance_of<T: Any>(instance: &Instance) -> bool {
    instance.as_ref().type_id() == TypeId::of::<T>()
}
