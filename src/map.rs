//! Mapping codec: `HashMap` targets keyed by the template's variable names.
//!
//! Where a record binds variables to struct fields, a mapping binds every
//! variable to the entry under that variable's name. Keys are decoded from
//! the variable names once, when the plan is built. The `$_` placeholder is
//! the discard slot: its span is scanned and thrown away on decode and
//! contributes nothing on encode.

use std::any::TypeId;
use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use crate::error::{DecodeError, EncodeError};
use crate::scan::{expect_literal, scan_field, Delim, Span};
use crate::template::{Decode, Encode, Op, Template};
use crate::value::FieldValue;

/// A template variable's name failed to decode as the mapping's key type.
pub(crate) struct KeyError {
    name: String,
    source: DecodeError,
}

impl From<KeyError> for DecodeError {
    fn from(err: KeyError) -> Self {
        DecodeError::Key {
            name: err.name,
            source: Box::new(err.source),
        }
    }
}

impl From<KeyError> for EncodeError {
    fn from(err: KeyError) -> Self {
        EncodeError::Key {
            name: err.name,
            source: Box::new(err.source),
        }
    }
}

enum MapOp<K> {
    Literal(Vec<u8>),
    EscLiteral(Vec<u8>),
    /// The `$_` placeholder: scanned and discarded.
    Skip(String),
    /// Any other placeholder, bound to the entry under its pre-decoded key.
    Bind { name: String, key: K },
}

struct MapPlan<K> {
    ops: Vec<MapOp<K>>,
}

impl<K: FieldValue + Default> MapPlan<K> {
    fn build(template: &Template) -> Result<Self, KeyError> {
        let mut ops = Vec::with_capacity(template.ops.len());
        for op in &template.ops {
            ops.push(match op {
                Op::Literal(bytes) => MapOp::Literal(bytes.clone()),
                Op::EscLiteral(bytes) => MapOp::EscLiteral(bytes.clone()),
                Op::Variable(name) if name == "_" => MapOp::Skip(name.clone()),
                Op::Variable(name) => {
                    let mut key = K::default();
                    key.parse_field(name.as_bytes()).map_err(|source| KeyError {
                        name: name.clone(),
                        source,
                    })?;
                    MapOp::Bind {
                        name: name.clone(),
                        key,
                    }
                }
            });
        }
        Ok(MapPlan { ops })
    }

    fn delim(&self, i: usize) -> Delim<'_> {
        match self.ops.get(i) {
            None => Delim::End,
            Some(MapOp::Literal(bytes)) => Delim::Lit(bytes),
            Some(MapOp::EscLiteral(bytes)) => Delim::Esc(bytes),
            Some(MapOp::Skip(name)) => Delim::Var(name),
            Some(MapOp::Bind { name, .. }) => Delim::Var(name),
        }
    }
}

fn plan<K, V>(template: &Template) -> Result<Arc<MapPlan<K>>, KeyError>
where
    K: FieldValue + Default + Send + Sync + 'static,
    V: 'static,
{
    template.cached_plan(TypeId::of::<HashMap<K, V>>(), || {
        MapPlan::<K>::build(template)
    })
}

impl<K, V> Encode for HashMap<K, V>
where
    K: FieldValue + Default + Eq + Hash + Send + Sync + 'static,
    V: FieldValue + 'static,
{
    fn encode(&self, template: &Template, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        let plan = plan::<K, V>(template)?;
        let esc = template.escape();
        for op in &plan.ops {
            match op {
                MapOp::Literal(bytes) | MapOp::EscLiteral(bytes) => {
                    out.extend_from_slice(bytes);
                }
                MapOp::Skip(_) => {}
                MapOp::Bind { name, key } => match self.get(key) {
                    Some(value) => {
                        value.format_field(esc, out).map_err(|source| {
                            EncodeError::Field {
                                name: name.clone(),
                                source: Box::new(source),
                            }
                        })?;
                    }
                    // an entry the mapping does not carry renders as absent
                    None => out.extend_from_slice(esc.nil_sentinel().as_bytes()),
                },
            }
        }
        Ok(())
    }
}

impl<K, V> Decode for HashMap<K, V>
where
    K: FieldValue + Default + Clone + Eq + Hash + Send + Sync + 'static,
    V: FieldValue + Default + 'static,
{
    fn decode(&mut self, template: &Template, data: &[u8]) -> Result<(), DecodeError> {
        let plan = plan::<K, V>(template)?;
        let esc = template.escape();
        let mut p = 0usize;
        let mut i = 0usize;
        while i < plan.ops.len() {
            match &plan.ops[i] {
                MapOp::Literal(bytes) | MapOp::EscLiteral(bytes) => {
                    expect_literal(data, p, bytes)?;
                    p += bytes.len();
                }
                MapOp::Skip(name) => {
                    let Span { resume, .. } = scan_field(data, p, plan.delim(i + 1), name, esc)?;
                    p = resume;
                    i += 1;
                }
                MapOp::Bind { name, key } => {
                    let Span { end, resume } = scan_field(data, p, plan.delim(i + 1), name, esc)?;
                    let raw = esc.unescape(&data[p..end])?;
                    let mut value = V::default();
                    value.parse_field(&raw).map_err(|source| DecodeError::Field {
                        name: name.clone(),
                        source: Box::new(source),
                    })?;
                    self.insert(key.clone(), value);
                    p = resume;
                    i += 1;
                }
            }
            i += 1;
        }
        Ok(())
    }
}
