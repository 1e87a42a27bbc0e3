//! Bound argument values.
//!
//! Decoded wire values are carried as JSON values; dispatch-time handles and
//! dependency instances are carried as type-erased [`Instance`]s.

use indexmap::IndexMap;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::any::Any;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A type-erased, shareable object produced by the dependency graph or a plugin.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// A single bound argument.
#[derive(Clone)]
pub enum ArgValue {
    /// A decoded data value.
    Value(Value),
    /// An injected object.
    Instance(Instance),
}

impl ArgValue {
    /// Returns the data value, if this is one.
    #[must_use]
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(v) => Some(v),
            Self::Instance(_) => None,
        }
    }

    /// Returns the instance, if this is one.
    #[must_use]
    pub fn as_instance(&self) -> Option<&Instance> {
        match self {
            Self::Instance(i) => Some(i),
            Self::Value(_) => None,
        }
    }
}

impl fmt::Debug for ArgValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Instance(_) => f.write_str("Instance(..)"),
        }
    }
}

impl From<Value> for ArgValue {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

/// Error reading a typed argument out of [`BoundArgs`].
#[derive(Error, Debug)]
pub enum ArgError {
    /// No argument with that name was bound.
    #[error("argument '{0}' is not bound")]
    Missing(String),

    /// The argument is an injected instance, not a data value.
    #[error("argument '{0}' is an injected instance, not a value")]
    NotAValue(String),

    /// The argument is a data value, not an injected instance.
    #[error("argument '{0}' is a value, not an injected instance")]
    NotAnInstance(String),

    /// The injected instance has a different type.
    #[error("argument '{name}' is not a {expected}")]
    WrongInstance {
        /// Argument name.
        name: String,
        /// Requested type name.
        expected: &'static str,
    },

    /// The data value does not deserialize into the requested type.
    #[error("argument '{name}' cannot be read: {source}")]
    Deserialize {
        /// Argument name.
        name: String,
        /// Serde error.
        #[source]
        source: serde_json::Error,
    },
}

/// Ordered map of argument name to bound value.
///
/// # Example
///
/// ```rust
/// use heron_core::BoundArgs;
/// use serde_json::json;
/// use std::sync::Arc;
///
/// struct Clock;
///
/// let mut args = BoundArgs::new();
/// args.insert_value("limit", json!(10));
/// args.insert_instance("clock", Arc::new(Clock));
///
/// let limit: u32 = args.parse("limit").unwrap();
/// assert_eq!(limit, 10);
/// assert!(args.instance::<Clock>("clock").is_some());
/// ```
#[derive(Clone, Default)]
pub struct BoundArgs {
    inner: IndexMap<String, ArgValue>,
}

impl BoundArgs {
    /// Creates an empty argument map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds a value, replacing any previous binding with that name.
    pub fn insert(&mut self, name: impl Into<String>, value: ArgValue) {
        self.inner.insert(name.into(), value);
    }

    /// Binds a data value.
    pub fn insert_value(&mut self, name: impl Into<String>, value: Value) {
        self.insert(name, ArgValue::Value(value));
    }

    /// Binds an injected instance.
    pub fn insert_instance<T: Any + Send + Sync>(&mut self, name: impl Into<String>, value: Arc<T>) {
        self.insert(name, ArgValue::Instance(value));
    }

    /// Returns a binding by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.inner.get(name)
    }

    /// Returns a data value by name.
    #[must_use]
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.get(name).and_then(ArgValue::as_value)
    }

    /// Deserializes a data value into `T`.
    pub fn parse<T: DeserializeOwned>(&self, name: &str) -> Result<T, ArgError> {
        let value = match self.get(name) {
            Some(ArgValue::Value(v)) => v.clone(),
            Some(ArgValue::Instance(_)) => return Err(ArgError::NotAValue(name.to_string())),
            None => return Err(ArgError::Missing(name.to_string())),
        };
        serde_json::from_value(value).map_err(|source| ArgError::Deserialize {
            name: name.to_string(),
            source,
        })
    }

    /// Returns an injected instance downcast to `T`.
    #[must_use]
    pub fn instance<T: Any + Send + Sync>(&self, name: &str) -> Option<Arc<T>> {
        self.get(name)
            .and_then(ArgValue::as_instance)
            .and_then(|i| Arc::clone(i).downcast::<T>().ok())
    }

    /// Returns an injected instance or explains why it is unavailable.
    pub fn require<T: Any + Send + Sync>(&self, name: &str) -> Result<Arc<T>, ArgError> {
        match self.get(name) {
            None => Err(ArgError::Missing(name.to_string())),
            Some(ArgValue::Value(_)) => Err(ArgError::NotAnInstance(name.to_string())),
            Some(ArgValue::Instance(i)) => {
                Arc::clone(i)
                    .downcast::<T>()
                    .map_err(|_| ArgError::WrongInstance {
                        name: name.to_string(),
                        expected: std::any::type_name::<T>(),
                    })
            }
        }
    }

    /// Returns `true` if a binding with that name exists.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.inner.contains_key(name)
    }

    /// Removes a binding, preserving the order of the rest.
    pub fn remove(&mut self, name: &str) -> Option<ArgValue> {
        self.inner.shift_remove(name)
    }

    /// Returns the bound names in binding order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.inner.keys().map(String::as_str)
    }

    /// Iterates bindings in binding order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.inner.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Returns the number of bindings.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.len()
    }

    /// Returns `true` if nothing is bound.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl fmt::Debug for BoundArgs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.inner.iter()).finish()
    }
}

impl FromIterator<(String, ArgValue)> for BoundArgs {
    fn from_iter<I: IntoIterator<Item = (String, ArgValue)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug)]
    struct Mailer {
        host: String,
    }

    #[derive(Debug, Deserialize, PartialEq)]
    struct User {
        id: u64,
        name: String,
    }

    #[test]
    fn test_parse_record() {
        let mut args = BoundArgs::new();
        args.insert_value("user", json!({"id": 1, "name": "a"}));

        let user: User = args.parse("user").unwrap();
        assert_eq!(
            user,
            User {
                id: 1,
                name: "a".to_string()
            }
        );
    }

    #[test]
    fn test_parse_missing_and_wrong_kind() {
        let mut args = BoundArgs::new();
        args.insert_instance("mailer", Arc::new(Mailer { host: "smtp".into() }));

        assert!(matches!(args.parse::<u32>("nope"), Err(ArgError::Missing(_))));
        assert!(matches!(
            args.parse::<u32>("mailer"),
            Err(ArgError::NotAValue(_))
        ));
    }

    #[test]
    fn test_instance_downcast() {
        let mut args = BoundArgs::new();
        args.insert_instance("mailer", Arc::new(Mailer { host: "smtp".into() }));

        assert_eq!(args.instance::<Mailer>("mailer").unwrap().host, "smtp");
        assert!(args.instance::<String>("mailer").is_none());
        assert!(matches!(
            args.require::<String>("mailer"),
            Err(ArgError::WrongInstance { .. })
        ));
    }

    #[test]
    fn test_remove_keeps_order() {
        let mut args = BoundArgs::new();
        args.insert_value("a", json!(1));
        args.insert_value("b", json!(2));
        args.insert_value("c", json!(3));
        args.remove("b");

        assert_eq!(args.names().collect::<Vec<_>>(), vec!["a", "c"]);
    }
}
