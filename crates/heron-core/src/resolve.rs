//! Type resolution.
//!
//! [`resolve`] repeatedly unwraps alias indirections, generic applications and
//! metadata wrappers until a concrete base type remains, collecting every
//! metadata item in declaration order. Union arms are resolved individually
//! and their metadata is accumulated as well, so a mark hidden inside an
//! `optional(...)` arm is still found.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{CompileError, CompileResult};
use crate::types::{
    Constraint, CustomDecoder, Field, Meta, ParamMark, PluginMark, RecordType, ReturnMark,
    TypeAlias, TypeExpr,
};

/// A type reduced to its base and the metadata gathered on the way.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedType {
    base: TypeExpr,
    metas: Vec<Meta>,
}

impl ResolvedType {
    /// Returns the concrete base type.
    #[must_use]
    pub fn base(&self) -> &TypeExpr {
        &self.base
    }

    /// Returns all metadata, outermost-last in declaration order.
    #[must_use]
    pub fn metas(&self) -> &[Meta] {
        &self.metas
    }

    /// Splits into base type and metadata.
    #[must_use]
    pub fn into_parts(self) -> (TypeExpr, Vec<Meta>) {
        (self.base, self.metas)
    }

    /// Returns the single routing-source mark, if any.
    ///
    /// Repeating the same mark (for example through two aliases) is allowed.
    ///
    /// # Errors
    ///
    /// Returns [`CompileError::AmbiguousMarks`] if two distinct marks are present.
    pub fn source_mark(&self, param: &str) -> CompileResult<Option<&ParamMark>> {
        let mut found: Vec<&ParamMark> = Vec::new();
        for meta in &self.metas {
            if let Meta::Mark(mark) = meta {
                if !found.contains(&mark) {
                    found.push(mark);
                }
            }
        }

        match found.len() {
            0 => Ok(None),
            1 => Ok(Some(found[0])),
            _ => Err(CompileError::AmbiguousMarks {
                param: param.to_string(),
                marks: found
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", "),
            }),
        }
    }

    /// Returns the first plugin mark.
    #[must_use]
    pub fn plugin_mark(&self) -> Option<&PluginMark> {
        self.metas.iter().find_map(|m| match m {
            Meta::Plugin(p) => Some(p),
            _ => None,
        })
    }

    /// Iterates the value constraints.
    pub fn constraints(&self) -> impl Iterator<Item = &Constraint> {
        self.metas.iter().filter_map(|m| match m {
            Meta::Constraint(c) => Some(c),
            _ => None,
        })
    }

    /// Iterates the return marks.
    pub fn return_marks(&self) -> impl Iterator<Item = &ReturnMark> {
        self.metas.iter().filter_map(|m| match m {
            Meta::Return(r) => Some(r),
            _ => None,
        })
    }

    /// Returns the custom decoder, if one is attached. The last one declared wins.
    #[must_use]
    pub fn custom_decoder(&self) -> Option<&CustomDecoder> {
        self.metas.iter().rev().find_map(|m| match m {
            Meta::Decoder(d) => Some(d),
            _ => None,
        })
    }

    /// Returns the first description.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.metas.iter().find_map(|m| match m {
            Meta::Description(d) => Some(d.as_str()),
            _ => None,
        })
    }
}

/// Resolves a type to its base and metadata.
///
/// # Example
///
/// ```rust
/// use heron_core::{resolve, TypeExpr, Constraint};
/// use heron_core::types::marks;
///
/// let page = TypeExpr::alias("Page", TypeExpr::int().constrained(Constraint::Ge(1.0)));
/// let resolved = resolve(&marks::query(page));
///
/// assert_eq!(resolved.base(), &TypeExpr::int());
/// assert_eq!(resolved.metas().len(), 2);
/// ```
#[must_use]
pub fn resolve(ty: &TypeExpr) -> ResolvedType {
    let mut metas = Vec::new();
    let base = unwrap_into(ty, &mut metas);
    ResolvedType { base, metas }
}

/// Unwraps aliases, generic applications and metadata wrappers without
/// entering unions.
///
/// Used where each union arm must be inspected on its own, such as return
/// annotations with per-arm status marks.
#[must_use]
pub fn peel(ty: &TypeExpr) -> (TypeExpr, Vec<Meta>) {
    let mut metas = Vec::new();
    let mut current = ty.clone();
    loop {
        current = match current {
            TypeExpr::Annotated(inner, inner_metas) => {
                // Inner metadata was declared first.
                let (base, mut nested) = peel(&inner);
                nested.extend(inner_metas);
                metas.extend(nested);
                return (base, metas);
            }
            TypeExpr::Alias(alias) => alias_body(&alias, &[]),
            TypeExpr::Apply(alias, args) => alias_body(&alias, &args),
            TypeExpr::Var(_) => TypeExpr::Any,
            other => return (other, metas),
        };
    }
}

fn unwrap_into(ty: &TypeExpr, metas: &mut Vec<Meta>) -> TypeExpr {
    let (base, peeled) = peel(ty);
    metas.extend(peeled);

    match base {
        TypeExpr::Union(arms) => {
            let mut flat: Vec<TypeExpr> = Vec::with_capacity(arms.len());
            for arm in &arms {
                match unwrap_into(arm, metas) {
                    TypeExpr::Union(nested) => {
                        for n in nested {
                            if !flat.contains(&n) {
                                flat.push(n);
                            }
                        }
                    }
                    other => {
                        if !flat.contains(&other) {
                            flat.push(other);
                        }
                    }
                }
            }
            if flat.len() == 1 {
                flat.remove(0)
            } else {
                TypeExpr::Union(flat)
            }
        }
        other => other,
    }
}

fn alias_body(alias: &Arc<TypeAlias>, args: &[TypeExpr]) -> TypeExpr {
    if alias.params.is_empty() {
        return alias.target.clone();
    }
    let bindings: HashMap<&str, TypeExpr> = alias
        .params
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), args.get(i).cloned().unwrap_or(TypeExpr::Any)))
        .collect();
    substitute(&alias.target, &bindings)
}

/// Replaces type variables with their bindings.
fn substitute(ty: &TypeExpr, bindings: &HashMap<&str, TypeExpr>) -> TypeExpr {
    match ty {
        TypeExpr::Var(name) => bindings
            .get(name.as_str())
            .cloned()
            .unwrap_or(TypeExpr::Any),
        TypeExpr::List(inner) => TypeExpr::List(Box::new(substitute(inner, bindings))),
        TypeExpr::Map(inner) => TypeExpr::Map(Box::new(substitute(inner, bindings))),
        TypeExpr::Union(arms) => {
            TypeExpr::Union(arms.iter().map(|a| substitute(a, bindings)).collect())
        }
        TypeExpr::Annotated(inner, metas) => {
            TypeExpr::Annotated(Box::new(substitute(inner, bindings)), metas.clone())
        }
        TypeExpr::Apply(alias, args) => TypeExpr::Apply(
            Arc::clone(alias),
            args.iter().map(|a| substitute(a, bindings)).collect(),
        ),
        TypeExpr::Record(record) => {
            let fields = record
                .fields
                .iter()
                .map(|f| Field {
                    name: f.name.clone(),
                    ty: substitute(&f.ty, bindings),
                    default: f.default.clone(),
                })
                .collect();
            TypeExpr::Record(Arc::new(RecordType {
                name: record.name.clone(),
                fields,
                deny_unknown: record.deny_unknown,
            }))
        }
        other => other.clone(),
    }
}
