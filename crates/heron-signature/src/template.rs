//! Route templates.
//!
//! A template is a `/`-separated path whose segments are either static text,
//! a `{name}` placeholder matching one segment, or a trailing `*name`
//! wildcard matching the rest of the path.

use heron_extract::PathParams;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Static(String),
    Param(String),
    Wildcard(String),
}

/// A parsed route template.
///
/// # Example
///
/// ```rust
/// use heron_signature::RouteTemplate;
///
/// let template = RouteTemplate::parse("/users/{user_id}/orders/{order_id}");
/// assert_eq!(template.placeholders(), ["user_id", "order_id"]);
///
/// let params = template.match_path("/users/7/orders/9").unwrap();
/// assert_eq!(params.get("order_id"), Some("9"));
/// assert!(template.match_path("/users/7").is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteTemplate {
    raw: String,
    segments: Vec<Segment>,
}

impl RouteTemplate {
    /// Parses a template.
    #[must_use]
    pub fn parse(path: &str) -> Self {
        let segments = path
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| {
                if let Some(name) = s.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
                    Segment::Param(name.to_string())
                } else if let Some(name) = s.strip_prefix('*') {
                    Segment::Wildcard(name.to_string())
                } else {
                    Segment::Static(s.to_string())
                }
            })
            .collect();
        Self {
            raw: path.to_string(),
            segments,
        }
    }

    /// Returns the template as written.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Returns placeholder names in template order.
    #[must_use]
    pub fn placeholders(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Param(name) | Segment::Wildcard(name) => Some(name.as_str()),
                Segment::Static(_) => None,
            })
            .collect()
    }

    /// Returns true if `name` is a placeholder.
    #[must_use]
    pub fn has_placeholder(&self, name: &str) -> bool {
        self.placeholders().contains(&name)
    }

    /// Matches a concrete path, returning the placeholder values.
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<PathParams> {
        let mut parts = path.split('/').filter(|s| !s.is_empty()).peekable();
        let mut params = PathParams::new();

        for segment in &self.segments {
            match segment {
                Segment::Static(text) => {
                    if parts.next()? != text.as_str() {
                        return None;
                    }
                }
                Segment::Param(name) => params.push(name.clone(), parts.next()?.to_string()),
                Segment::Wildcard(name) => {
                    let rest: Vec<&str> = parts.by_ref().collect();
                    params.push(name.clone(), rest.join("/"));
                }
            }
        }

        if parts.peek().is_some() {
            return None;
        }
        Some(params)
    }
}

impl fmt::Display for RouteTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
