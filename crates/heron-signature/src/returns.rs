//! Return annotation analysis.
//!
//! A return annotation becomes a map from status code to [`ReturnSpec`]. A
//! union contributes one entry per arm when every arm carries a status mark,
//! or a single implicit 200 entry when none does. Mixing the two is rejected.

use heron_core::{peel, CompileError, CompileResult, Meta, ReturnMark, StatusLiteral, TypeExpr};
use heron_extract::{DecoderFactory, Encoder};
use http::StatusCode;
use indexmap::IndexMap;

/// How a return arm is written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReturnKind {
    /// Unmarked; encoded as JSON.
    Plain,
    /// No body.
    Empty,
    /// Each produced item is encoded independently.
    Stream,
    /// `text/plain`.
    Text,
    /// `text/html`.
    Html,
    /// Explicit JSON.
    Json,
}

/// The compiled description of one response status.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnSpec {
    /// Payload type; the element type for streams.
    pub ty: TypeExpr,
    /// Body encoder.
    pub encoder: Encoder,
    /// Response status.
    pub status: StatusCode,
    /// Response content type, if a body is written.
    pub content_type: Option<&'static str>,
    /// Mark kind.
    pub kind: ReturnKind,
}

/// Status map of an endpoint, in declaration order.
pub type ReturnMap = IndexMap<StatusCode, ReturnSpec>;

/// Builds [`ReturnMap`]s.
#[derive(Debug, Clone, Copy)]
pub struct ReturnAnalyzer<'a> {
    decoders: &'a DecoderFactory,
}

impl<'a> ReturnAnalyzer<'a> {
    /// Creates an analyzer using `decoders` to pick encoders.
    #[must_use]
    pub fn new(decoders: &'a DecoderFactory) -> Self {
        Self { decoders }
    }

    /// Analyzes a return annotation. `None` means undeclared.
    ///
    /// # Errors
    ///
    /// Returns a [`CompileError`] for mixed marks, repeated or malformed
    /// statuses, and statuses that forbid the declared body.
    ///
    /// # Example
    ///
    /// ```rust
    /// use heron_signature::ReturnAnalyzer;
    /// use heron_extract::DecoderFactory;
    /// use heron_core::{types::marks, TypeExpr};
    /// use http::StatusCode;
    ///
    /// let decoders = DecoderFactory::new();
    /// let returns = ReturnAnalyzer::new(&decoders)
    ///     .analyze(Some(&TypeExpr::union([
    ///         marks::status(TypeExpr::str(), 201),
    ///         marks::status(marks::empty(), 204),
    ///     ])))
    ///     .unwrap();
    ///
    /// assert_eq!(returns.len(), 2);
    /// assert!(returns[&StatusCode::NO_CONTENT].content_type.is_none());
    /// ```
    pub fn analyze(&self, annotation: Option<&TypeExpr>) -> CompileResult<ReturnMap> {
        let mut map = ReturnMap::new();
        let Some(annotation) = annotation else {
            let spec = self.arm(TypeExpr::Any, &[])?;
            map.insert(spec.status, spec);
            return Ok(map);
        };

        let (base, metas) = peel(annotation);
        let arms: Vec<(TypeExpr, Vec<Meta>)> = match &base {
            TypeExpr::Union(arms) => arms.iter().map(peel).collect(),
            _ => Vec::new(),
        };
        let marked = arms.iter().filter(|(_, m)| status_mark(m).is_some()).count();

        if arms.is_empty() || marked == 0 {
            let spec = self.arm(base, &metas)?;
            map.insert(spec.status, spec);
            return Ok(map);
        }
        if marked != arms.len() {
            return Err(CompileError::MixedReturnMarks {
                ty: annotation.to_string(),
            });
        }

        for (arm_base, arm_metas) in arms {
            let mut all = metas.clone();
            all.extend(arm_metas);
            let spec = self.arm(arm_base, &all)?;
            if map.contains_key(&spec.status) {
                return Err(CompileError::DuplicateStatus {
                    status: spec.status.as_u16(),
                });
            }
            map.insert(spec.status, spec);
        }
        Ok(map)
    }

    fn arm(&self, ty: TypeExpr, metas: &[Meta]) -> CompileResult<ReturnSpec> {
        let status = match status_mark(metas) {
            Some(literal) => parse_status(literal)?,
            None => StatusCode::OK,
        };

        let marks: Vec<&ReturnMark> = metas
            .iter()
            .filter_map(|m| match m {
                Meta::Return(r) if !matches!(r, ReturnMark::Status(_)) => Some(r),
                _ => None,
            })
            .collect();
        let pick = |wanted: &ReturnMark| marks.iter().any(|m| *m == wanted);
        let mut kind = if pick(&ReturnMark::Empty) {
            ReturnKind::Empty
        } else if pick(&ReturnMark::Stream) {
            ReturnKind::Stream
        } else if pick(&ReturnMark::Html) {
            ReturnKind::Html
        } else if pick(&ReturnMark::Text) {
            ReturnKind::Text
        } else if pick(&ReturnMark::Json) {
            ReturnKind::Json
        } else {
            ReturnKind::Plain
        };

        if forbids_body(status) && kind != ReturnKind::Empty {
            if !matches!(ty, TypeExpr::Null) {
                return Err(CompileError::StatusBodyConflict {
                    status: status.as_u16(),
                    ty: ty.to_string(),
                });
            }
            kind = ReturnKind::Empty;
        }

        let mark = match kind {
            ReturnKind::Plain => None,
            ReturnKind::Empty => Some(ReturnMark::Empty),
            ReturnKind::Stream => Some(ReturnMark::Stream),
            ReturnKind::Text => Some(ReturnMark::Text),
            ReturnKind::Html => Some(ReturnMark::Html),
            ReturnKind::Json => Some(ReturnMark::Json),
        };
        let encoder = self.decoders.encoder(mark.as_ref());

        Ok(ReturnSpec {
            ty,
            encoder,
            status,
            content_type: encoder.content_type(),
            kind,
        })
    }
}

/// Returns `true` for statuses whose responses never carry a body.
#[must_use]
pub fn forbids_body(status: StatusCode) -> bool {
    status.is_informational()
        || matches!(
            status,
            StatusCode::NO_CONTENT | StatusCode::RESET_CONTENT | StatusCode::NOT_MODIFIED
        )
}

fn status_mark(metas: &[Meta]) -> Option<&StatusLiteral> {
    metas.iter().rev().find_map(|m| match m {
        Meta::Return(ReturnMark::Status(literal)) => Some(literal),
        _ => None,
    })
}

fn parse_status(literal: &StatusLiteral) -> CompileResult<StatusCode> {
    let invalid = || CompileError::InvalidStatus {
        literal: literal.to_string(),
    };
    let code = match literal {
        StatusLiteral::Code(code) => *code,
        StatusLiteral::Name(name) => match name.trim().parse::<u16>() {
            Ok(code) => code,
            Err(_) => return status_by_name(name).ok_or_else(invalid),
        },
    };
    StatusCode::from_u16(code)
        .ok()
        .filter(|s| (100..600).contains(&s.as_u16()))
        .ok_or_else(invalid)
}

fn status_by_name(name: &str) -> Option<StatusCode> {
    let wanted = normalize(name);
    (100u16..600)
        .filter_map(|code| StatusCode::from_u16(code).ok())
        .find(|status| {
            status
                .canonical_reason()
                .is_some_and(|reason| normalize(reason) == wanted)
        })
}

fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == ' ' || *c == '_' || *c == '-')
        .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
        .collect()
}
