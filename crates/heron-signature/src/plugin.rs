//! Plugin providers.
//!
//! A provider supplies values for parameters carrying a plugin mark with its
//! registry key. The value is loaded at dispatch time from the request and the
//! active resolver; it never goes through the decode pipeline.
//!
//! # Example
//!
//! ```rust
//! use heron_signature::{PluginParam, PluginProvider, PluginRegistry};
//! use heron_core::{ArgValue, Resolver};
//! use heron_extract::RequestContext;
//! use async_trait::async_trait;
//! use std::sync::Arc;
//!
//! struct ClientIp;
//!
//! #[async_trait]
//! impl PluginProvider for ClientIp {
//!     async fn load(
//!         &self,
//!         request: &RequestContext,
//!         _resolver: &Arc<dyn Resolver>,
//!         _param: &PluginParam,
//!     ) -> anyhow::Result<ArgValue> {
//!         let ip = request.header("x-forwarded-for").unwrap_or("unknown");
//!         Ok(ArgValue::Value(ip.into()))
//!     }
//! }
//!
//! let mut plugins = PluginRegistry::new();
//! plugins.register("client_ip", ClientIp);
//! assert!(plugins.contains("client_ip"));
//! ```

use async_trait::async_trait;
use heron_core::{ArgValue, Resolver};
use heron_extract::RequestContext;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::param::PluginParam;

/// Supplies dispatch-time values for plugin-marked parameters.
#[async_trait]
pub trait PluginProvider: Send + Sync {
    /// Checks a parameter when its endpoint is compiled.
    ///
    /// `param` arrives with the declared name, type and default; the
    /// returned descriptor is the one bound at dispatch time. It may change
    /// the alias, type or default but not the name. An `Err` message fails
    /// compilation of the route.
    fn parse(&self, param: PluginParam) -> Result<PluginParam, String> {
        Ok(param)
    }

    /// Loads the value for one request.
    async fn load(
        &self,
        request: &RequestContext,
        resolver: &Arc<dyn Resolver>,
        param: &PluginParam,
    ) -> anyhow::Result<ArgValue>;
}

/// Registered plugin providers, keyed by mark.
#[derive(Default, Clone)]
pub struct PluginRegistry {
    providers: HashMap<String, Arc<dyn PluginProvider>>,
}

impl PluginRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a provider, replacing any previous one for `key`.
    pub fn register(&mut self, key: impl Into<String>, provider: impl PluginProvider + 'static) {
        self.providers.insert(key.into(), Arc::new(provider));
    }

    /// Returns the provider for `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Arc<dyn PluginProvider>> {
        self.providers.get(key)
    }

    /// Returns `true` if `key` is registered.
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.providers.contains_key(key)
    }

    /// Returns the number of providers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.providers.len()
    }

    /// Returns `true` if no provider is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut keys: Vec<&str> = self.providers.keys().map(String::as_str).collect();
        keys.sort_unstable();
        f.debug_struct("PluginRegistry").field("keys", &keys).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::{ParamInfo, PluginSource};
    use heron_core::TypeExpr;
    use serde_json::Value;

    struct Fixed;

    #[async_trait]
    impl PluginProvider for Fixed {
        fn parse(&self, mut param: PluginParam) -> Result<PluginParam, String> {
            if param.info.default.is_some() {
                return Err(format!("'{}' cannot have a default", param.info.name));
            }
            param.info.alias = format!("x-{}", param.info.name);
            Ok(param)
        }

        async fn load(
            &self,
            _request: &RequestContext,
            _resolver: &Arc<dyn Resolver>,
            _param: &PluginParam,
        ) -> anyhow::Result<ArgValue> {
            Ok(ArgValue::Value(Value::from(1)))
        }
    }

    #[test]
    fn test_registry() {
        let mut registry = PluginRegistry::new();
        assert!(registry.is_empty());
        registry.register("fixed", Fixed);
        assert_eq!(registry.len(), 1);
        assert!(registry.get("fixed").is_some());
        assert!(registry.get("other").is_none());
    }

    fn param(default: Option<Value>) -> PluginParam {
        PluginParam {
            info: ParamInfo {
                name: "a".to_string(),
                alias: "a".to_string(),
                ty: TypeExpr::Any,
                annotation: TypeExpr::Any,
                default,
            },
            source: PluginSource::Provider {
                key: "fixed".to_string(),
                config: None,
                provider: Arc::new(Fixed),
            },
        }
    }

    #[test]
    fn test_parse_hook() {
        let provider = Fixed;
        let parsed = provider.parse(param(None)).unwrap();
        assert_eq!(parsed.info.alias, "x-a");
        assert!(provider.parse(param(Some(Value::Null))).is_err());
    }
}
