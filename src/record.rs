//! Record binding: static field tables driving the record codec.
//!
//! A record is a struct whose fields carry the template variable they bind.
//! Instead of runtime reflection, every record exposes a compile-time table
//! of `(variable name, render fn, parse fn)` rows; the template pairs that
//! table with its variable index once per type and caches the result.

use std::any::TypeId;
use std::sync::Arc;

use crate::error::{DecodeError, EncodeError};
use crate::escape::Escape;
use crate::scan::{expect_literal, scan_field, Delim, Span};
use crate::template::{Op, Template};

/// One named field of a record: the variable it binds plus its accessors.
///
/// Rows are normally produced by [`ngx_record!`](crate::ngx_record); a
/// manual [`Record`] implementation builds them directly.
pub struct FieldDef<R> {
    /// The template variable this field binds (`"_"` binds nothing).
    pub name: &'static str,
    /// Render the field, applying the dialect where the payload is text.
    pub encode: fn(&R, Escape, &mut Vec<u8>) -> Result<(), EncodeError>,
    /// Overwrite the field from an already-unescaped slice.
    pub decode: fn(&mut R, &[u8]) -> Result<(), DecodeError>,
}

/// A struct with a static field table, usable as a marshalling target.
pub trait Record: Default + Sized + 'static {
    /// The record's fields in declaration order.
    const FIELDS: &'static [FieldDef<Self>];
}

/// A template operator specialized to one record type.
pub(crate) enum PlanOp<R: Record> {
    Literal(Vec<u8>),
    EscLiteral(Vec<u8>),
    /// A placeholder no field binds: scanned and discarded on decode,
    /// rendered as the nil sentinel on encode.
    Variable(String),
    /// A placeholder bound to one of the record's fields.
    Bind {
        name: String,
        field: &'static FieldDef<R>,
    },
}

/// The operator stream of a template with this record's bindings applied.
pub(crate) struct RecordPlan<R: Record> {
    ops: Vec<PlanOp<R>>,
}

impl<R: Record> RecordPlan<R> {
    fn build(template: &Template) -> Self {
        let mut ops: Vec<PlanOp<R>> = template
            .ops
            .iter()
            .map(|op| match op {
                Op::Literal(bytes) => PlanOp::Literal(bytes.clone()),
                Op::EscLiteral(bytes) => PlanOp::EscLiteral(bytes.clone()),
                Op::Variable(name) => PlanOp::Variable(name.clone()),
            })
            .collect();
        for field in R::FIELDS {
            if field.name == "_" {
                continue;
            }
            if let Some(&pos) = template.index.get(field.name) {
                ops[pos] = PlanOp::Bind {
                    name: field.name.to_owned(),
                    field,
                };
            }
        }
        RecordPlan { ops }
    }

    fn delim(&self, i: usize) -> Delim<'_> {
        match self.ops.get(i) {
            None => Delim::End,
            Some(PlanOp::Literal(bytes)) => Delim::Lit(bytes),
            Some(PlanOp::EscLiteral(bytes)) => Delim::Esc(bytes),
            Some(PlanOp::Variable(name)) => Delim::Var(name),
            Some(PlanOp::Bind { name, .. }) => Delim::Var(name),
        }
    }

    fn encode(&self, esc: Escape, value: &R, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        for op in &self.ops {
            match op {
                PlanOp::Literal(bytes) | PlanOp::EscLiteral(bytes) => {
                    out.extend_from_slice(bytes);
                }
                PlanOp::Variable(_) => out.extend_from_slice(esc.nil_sentinel().as_bytes()),
                PlanOp::Bind { name, field } => {
                    (field.encode)(value, esc, out).map_err(|source| EncodeError::Field {
                        name: name.clone(),
                        source: Box::new(source),
                    })?;
                }
            }
        }
        Ok(())
    }

    fn decode(&self, esc: Escape, value: &mut R, data: &[u8]) -> Result<(), DecodeError> {
        let mut p = 0usize;
        let mut i = 0usize;
        while i < self.ops.len() {
            match &self.ops[i] {
                PlanOp::Literal(bytes) | PlanOp::EscLiteral(bytes) => {
                    expect_literal(data, p, bytes)?;
                    p += bytes.len();
                }
                PlanOp::Variable(name) => {
                    if i + 1 >= self.ops.len() {
                        // a trailing unbound placeholder swallows the rest
                        return Ok(());
                    }
                    let Span { resume, .. } = scan_field(data, p, self.delim(i + 1), name, esc)?;
                    p = resume;
                    i += 1; // the delimiter operator was consumed by the scan
                }
                PlanOp::Bind { name, field } => {
                    let Span { end, resume } = scan_field(data, p, self.delim(i + 1), name, esc)?;
                    let raw = esc.unescape(&data[p..end])?;
                    (field.decode)(value, &raw).map_err(|source| DecodeError::Field {
                        name: name.clone(),
                        source: Box::new(source),
                    })?;
                    p = resume;
                    i += 1;
                }
            }
            i += 1;
        }
        Ok(())
    }
}

fn plan<R: Record>(template: &Template) -> Arc<RecordPlan<R>> {
    template
        .cached_plan(TypeId::of::<R>(), || {
            Ok::<_, std::convert::Infallible>(RecordPlan::<R>::build(template))
        })
        .unwrap_or_else(|never| match never {})
}

/// Render a record through a template. Backs the generated
/// [`Encode`](crate::Encode) impls; call it from a manual one.
pub fn encode_record<R: Record>(
    value: &R,
    template: &Template,
    out: &mut Vec<u8>,
) -> Result<(), EncodeError> {
    plan::<R>(template).encode(template.escape(), value, out)
}

/// Parse a log line into a record. Backs the generated
/// [`Decode`](crate::Decode) impls; call it from a manual one.
pub fn decode_record<R: Record>(
    value: &mut R,
    template: &Template,
    data: &[u8],
) -> Result<(), DecodeError> {
    plan::<R>(template).decode(template.escape(), value, data)
}

/// Defines a record struct and binds its fields to template variables.
///
/// Each field names the variable it binds after `=>`, mirroring how the
/// field would otherwise be tagged in a config-driven system. The name may
/// contain dots. A field bound to `"_"` is never matched by any template
/// variable (its type still has to implement
/// [`FieldValue`](crate::FieldValue)).
///
/// The macro emits the struct plus [`Record`], [`Encode`](crate::Encode),
/// and [`Decode`](crate::Decode) impls. The struct must derive or implement
/// `Default`.
///
/// ```rust
/// ngxfmt::ngx_record! {
///     #[derive(Debug, Default, PartialEq)]
///     pub struct Request {
///         pub remote_addr: String => "remote_addr",
///         pub status: i64 => "status",
///     }
/// }
///
/// let template = ngxfmt::Template::new("$remote_addr -> $status")?;
/// let mut req = Request::default();
/// template.unmarshal(b"10.0.0.7 -> 404", &mut req)?;
/// assert_eq!(req, Request { remote_addr: "10.0.0.7".into(), status: 404 });
/// # Ok::<(), ngxfmt::Error>(())
/// ```
#[macro_export]
macro_rules! ngx_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $ty:ty => $var:literal
            ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $ty,
            )+
        }

        impl $crate::Record for $name {
            const FIELDS: &'static [$crate::FieldDef<Self>] = &[
                $(
                    $crate::FieldDef {
                        name: $var,
                        encode: |value, esc, out| {
                            $crate::FieldValue::format_field(&value.$field, esc, out)
                        },
                        decode: |value, raw| {
                            $crate::FieldValue::parse_field(&mut value.$field, raw)
                        },
                    },
                )+
            ];
        }

        impl $crate::Encode for $name {
            fn encode(
                &self,
                template: &$crate::Template,
                out: &mut ::std::vec::Vec<u8>,
            ) -> ::std::result::Result<(), $crate::EncodeError> {
                $crate::record::encode_record(self, template, out)
            }
        }

        impl $crate::Decode for $name {
            fn decode(
                &mut self,
                template: &$crate::Template,
                data: &[u8],
            ) -> ::std::result::Result<(), $crate::DecodeError> {
                $crate::record::decode_record(self, template, data)
            }
        }
    };
}
