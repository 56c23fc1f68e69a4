//! Log format directive compilation.
//!
//! A directive such as
//! `$remote_addr - $remote_user [$time_local] "$request"` compiles into a
//! flat operator stream: literal runs to emit or expect verbatim, and
//! variable references to fill from (or bind into) a typed target. The
//! compiled [`Template`] drives both directions of the codec.

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use dashmap::DashMap;
use memchr::memchr;

use crate::buffer;
use crate::error::{CompileError, DecodeError, EncodeError};
use crate::escape::Escape;

/// A compiled unit of the directive.
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) enum Op {
    /// Literal bytes, emitted and expected verbatim.
    Literal(Vec<u8>),
    /// A literal whose first byte the dialect classifies as
    /// escape-sensitive: the field before it may contain a
    /// backslash-escaped copy of the delimiter.
    EscLiteral(Vec<u8>),
    /// A variable reference, bound or discarded per target type.
    Variable(String),
}

/// Compile a log format directive.
///
/// Equivalent to [`Template::new`].
pub fn compile(format: &str) -> Result<Template, CompileError> {
    Template::new(format)
}

/// A compiled `log_format` directive.
///
/// Compile once, then [`marshal`](Template::marshal) typed values into log
/// lines and [`unmarshal`](Template::unmarshal) lines back. The template is
/// immutable and can be shared freely across threads; per-target-type
/// binding plans are built lazily and cached inside it.
///
/// # Example
///
/// ```rust
/// use std::collections::HashMap;
///
/// let template = ngxfmt::Template::new(r#"$remote_addr "$request" $status"#)?;
///
/// let mut fields: HashMap<String, String> = HashMap::new();
/// template.unmarshal(br#"127.0.0.1 "GET / HTTP/1.1" 200"#, &mut fields)?;
/// assert_eq!(fields["status"], "200");
/// # Ok::<(), ngxfmt::Error>(())
/// ```
pub struct Template {
    format: String,
    esc: Escape,
    pub(crate) ops: Vec<Op>,
    /// variable name -> operator index, for O(1) binding at plan build
    pub(crate) index: HashMap<String, usize>,
    plans: DashMap<TypeId, Arc<dyn Any + Send + Sync>>,
}

fn is_name_byte(ch: u8) -> bool {
    ch.is_ascii_alphanumeric() || ch == b'_' || ch == b'.'
}

fn validate_name(name: &str, pos: usize) -> Result<(), CompileError> {
    if name.is_empty() {
        return Err(CompileError::Invalid(pos));
    }
    let invalid = |reason| CompileError::InvalidVariableName {
        name: name.to_owned(),
        reason,
    };
    if name.starts_with('.') {
        return Err(invalid("cannot start with '.'"));
    }
    if name.ends_with('.') {
        return Err(invalid("cannot end with '.'"));
    }
    if name.contains("..") {
        return Err(invalid("cannot have consecutive dots"));
    }
    Ok(())
}

fn flush_literal(ops: &mut Vec<Op>, literal: &mut Vec<u8>, esc: Escape) {
    if literal.is_empty() {
        return;
    }
    let bytes = std::mem::take(literal);
    ops.push(if esc.is_escape_lead(bytes[0]) {
        Op::EscLiteral(bytes)
    } else {
        Op::Literal(bytes)
    });
}

impl Template {
    /// Compile a log format directive.
    ///
    /// The directive may start with an `escape=json|default|none;` prefix
    /// selecting the [`Escape`] dialect (defaulting to `default`). The body
    /// mixes literal text with `$name` / `${name}` variable references;
    /// `$$` stands for a literal `$`.
    ///
    /// Two adjacent variables (`$a$b`) collapse into one scan region: the
    /// second is dropped from the variable index, because no delimiter
    /// separates their values in a rendered line.
    pub fn new(format: &str) -> Result<Self, CompileError> {
        let bytes = format.as_bytes();
        let mut p = 0usize;
        let mut esc = Escape::default();

        if bytes.starts_with(b"escape=") {
            p = 7;
            if bytes[p..].starts_with(b"json") {
                p += 4;
                esc = Escape::Json;
            } else if bytes[p..].starts_with(b"default") {
                p += 7;
                esc = Escape::Default;
            } else if bytes[p..].starts_with(b"none") {
                p += 4;
                esc = Escape::None;
            } else {
                let end = bytes[p..]
                    .iter()
                    .position(|&c| c == b';' || c.is_ascii_whitespace())
                    .map_or(bytes.len(), |off| p + off);
                return Err(CompileError::UnknownEscaping(
                    String::from_utf8_lossy(&bytes[p..end]).into_owned(),
                ));
            }
            loop {
                match bytes.get(p) {
                    Some(b' ' | b'\r' | b'\n' | b'\t' | 0x0B | 0x0C) => p += 1,
                    Some(b';') => {
                        p += 1;
                        break;
                    }
                    Some(_) => return Err(CompileError::ExpectSemicolon(esc)),
                    None => break,
                }
            }
        }

        let mut ops: Vec<Op> = Vec::with_capacity(8);
        let mut index = HashMap::new();
        let mut literal: Vec<u8> = Vec::new();

        while p < bytes.len() {
            if bytes[p] != b'$' {
                match memchr(b'$', &bytes[p..]) {
                    Some(off) => {
                        literal.extend_from_slice(&bytes[p..p + off]);
                        p += off;
                    }
                    None => {
                        literal.extend_from_slice(&bytes[p..]);
                        break;
                    }
                }
                continue;
            }

            p += 1;
            let Some(&ch) = bytes.get(p) else {
                return Err(CompileError::Invalid(p));
            };
            if ch == b'$' {
                literal.push(b'$');
                p += 1;
                continue;
            }

            flush_literal(&mut ops, &mut literal, esc);

            let braced = ch == b'{';
            if braced {
                p += 1;
                if p >= bytes.len() {
                    return Err(CompileError::Invalid(p));
                }
            }
            let start = p;
            let name_end;
            if braced {
                let mut closed = false;
                while p < bytes.len() {
                    if bytes[p] == b'}' {
                        p += 1;
                        closed = true;
                        break;
                    }
                    if !is_name_byte(bytes[p]) {
                        break;
                    }
                    p += 1;
                }
                if !closed {
                    return Err(CompileError::MissingBracket(
                        String::from_utf8_lossy(&bytes[start..p]).into_owned(),
                    ));
                }
                name_end = p - 1;
            } else {
                while p < bytes.len() && is_name_byte(bytes[p]) {
                    p += 1;
                }
                name_end = p;
            }

            let name = &format[start..name_end];
            validate_name(name, start)?;

            // adjacent variables collapse: the previous one owns the whole
            // scan region and this one is dropped from the index
            if !matches!(ops.last(), Some(Op::Variable(_))) {
                index.insert(name.to_owned(), ops.len());
                ops.push(Op::Variable(name.to_owned()));
            }
        }

        flush_literal(&mut ops, &mut literal, esc);

        Ok(Template {
            format: format.to_owned(),
            esc,
            ops,
            index,
            plans: DashMap::new(),
        })
    }

    /// The original directive string.
    pub fn format(&self) -> &str {
        &self.format
    }

    /// The escape dialect this template was compiled with.
    pub fn escape(&self) -> Escape {
        self.esc
    }

    /// Render `value` into a log line.
    pub fn marshal<T: Encode>(&self, value: &T) -> Result<Vec<u8>, EncodeError> {
        if self.ops.is_empty() {
            return Ok(Vec::new());
        }
        let mut buf = buffer::acquire();
        let result = value
            .encode(self, &mut buf)
            .map(|()| buf.as_slice().to_vec());
        buffer::release(buf);
        result
    }

    /// Render `value` into a log line as a `String`.
    ///
    /// Fails if the rendered bytes are not valid UTF-8; use
    /// [`marshal`](Template::marshal) for 8-bit clean output.
    pub fn marshal_to_string<T: Encode>(&self, value: &T) -> Result<String, EncodeError> {
        if self.ops.is_empty() {
            return Ok(String::new());
        }
        let mut buf = buffer::acquire();
        let result = value.encode(self, &mut buf).and_then(|()| {
            std::str::from_utf8(&buf)
                .map(str::to_owned)
                .map_err(EncodeError::from)
        });
        buffer::release(buf);
        result
    }

    /// Parse a rendered log line back into `value`.
    ///
    /// The whole line is decoded in one pass. On error, a mapping target may
    /// retain entries decoded before the failure.
    pub fn unmarshal<T: Decode>(&self, data: &[u8], value: &mut T) -> Result<(), DecodeError> {
        if self.ops.is_empty() {
            return Ok(());
        }
        value.decode(self, data)
    }

    /// [`unmarshal`](Template::unmarshal) for string input.
    pub fn unmarshal_from_string<T: Decode>(
        &self,
        data: &str,
        value: &mut T,
    ) -> Result<(), DecodeError> {
        self.unmarshal(data.as_bytes(), value)
    }

    /// Fetch the cached binding plan for a target type, building it on
    /// first use. Two threads may race to build the same plan; either
    /// result is stored and both are valid.
    pub(crate) fn cached_plan<P, E>(
        &self,
        key: TypeId,
        build: impl FnOnce() -> Result<P, E>,
    ) -> Result<Arc<P>, E>
    where
        P: Send + Sync + 'static,
    {
        if let Some(entry) = self.plans.get(&key) {
            if let Ok(plan) = Arc::clone(entry.value()).downcast::<P>() {
                return Ok(plan);
            }
        }
        let plan = Arc::new(build()?);
        self.plans
            .insert(key, Arc::clone(&plan) as Arc<dyn Any + Send + Sync>);
        Ok(plan)
    }
}

impl fmt::Debug for Template {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Template")
            .field("format", &self.format)
            .field("escape", &self.esc)
            .field("ops", &self.ops)
            .finish_non_exhaustive()
    }
}

/// Types a template can render into a log line.
///
/// Implemented by [`ngx_record!`](crate::ngx_record) types, by
/// `HashMap<K, V>` mappings, by [`Entry`](crate::Entry), and by
/// `Option<T>`/`Box<T>` of any of those. An absent `Option` renders as the
/// dialect's nil sentinel.
pub trait Encode {
    /// Append the rendered form of `self` to `out`.
    fn encode(&self, template: &Template, out: &mut Vec<u8>) -> Result<(), EncodeError>;
}

/// Types a template can reconstruct from a log line.
///
/// Decoding is in place: records overwrite bound fields, mappings insert
/// decoded entries, an empty `Option` is filled with a default target
/// first.
pub trait Decode {
    /// Parse `data` into `self`.
    fn decode(&mut self, template: &Template, data: &[u8]) -> Result<(), DecodeError>;
}

impl<T: Encode> Encode for Option<T> {
    fn encode(&self, template: &Template, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            Some(value) => value.encode(template, out),
            None => {
                out.extend_from_slice(template.escape().nil_sentinel().as_bytes());
                Ok(())
            }
        }
    }
}

impl<T: Decode + Default> Decode for Option<T> {
    fn decode(&mut self, template: &Template, data: &[u8]) -> Result<(), DecodeError> {
        self.get_or_insert_with(T::default).decode(template, data)
    }
}

impl<T: Encode> Encode for Box<T> {
    fn encode(&self, template: &Template, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        (**self).encode(template, out)
    }
}

impl<T: Decode> Decode for Box<T> {
    fn decode(&mut self, template: &Template, data: &[u8]) -> Result<(), DecodeError> {
        (**self).decode(template, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ops_of(format: &str) -> Vec<Op> {
        Template::new(format).unwrap().ops
    }

    #[test]
    fn compiles_real_world_formats() {
        let positive = [
            r#"$request "$request_body""$header_cookie""#,
            r#"$request "$request_body" "$header_cookie""#,
            r#"\$request "$request_body" "$header_cookie""#,
            r#"\$request\"$request_body\"\"$header_cookie\""#,
            r#"escape=json ; $request "$request_body""$header_cookie""#,
            r#"escape=none ; $request "$request_body""$header_cookie""#,
            "escape=default           \t\t; $request \"$request_body\" \"$header_cookie\"",
            r#"escape=json;$request "$request_body""$header.cookie""#,
        ];
        for format in positive {
            Template::new(format).unwrap_or_else(|err| panic!("{format:?}: {err}"));
        }
    }

    #[test]
    fn rejects_malformed_formats() {
        let negative = [
            r#"escape=json$request "$request_body""$header_cookie""#,
            r#"escape=json;${request "$request_body""$header_cookie""#,
            r#"escape=json $request "$request_body""$header_cookie""#,
            r#"escape=unknown ;$request "$request_body""$header_cookie""#,
            r#"escape=json;$request "$request_body""$.cookie""#,
            r#"escape=json;$request "$request_body.""$cookie""#,
            r#"escape=json;$request "$request_body""$header..cookie""#,
            r#"escape=json;$request "$request_body""$header....cookie""#,
        ];
        for format in negative {
            assert!(Template::new(format).is_err(), "accepted {format:?}");
        }
    }

    #[test]
    fn preamble_selects_dialect() {
        assert_eq!(Template::new("$a").unwrap().escape(), Escape::Default);
        assert_eq!(
            Template::new("escape=json;$a").unwrap().escape(),
            Escape::Json
        );
        assert_eq!(
            Template::new("escape=none;$a").unwrap().escape(),
            Escape::None
        );
        assert_eq!(
            Template::new("escape=default;$a").unwrap().escape(),
            Escape::Default
        );
        // a preamble with no body is accepted
        assert_eq!(Template::new("escape=json").unwrap().escape(), Escape::Json);
    }

    #[test]
    fn preamble_errors() {
        assert_eq!(
            Template::new("escape=jsonp;$a").unwrap_err(),
            CompileError::ExpectSemicolon(Escape::Json)
        );
        assert_eq!(
            Template::new("escape=yaml;$a").unwrap_err(),
            CompileError::UnknownEscaping("yaml".into())
        );
    }

    #[test]
    fn dollar_escape_and_braced_form() {
        assert_eq!(
            ops_of("$$a${b}c"),
            vec![
                Op::Literal(b"$a".to_vec()),
                Op::Variable("b".into()),
                Op::Literal(b"c".to_vec()),
            ]
        );
    }

    #[test]
    fn truncated_references() {
        assert!(matches!(Template::new("a$"), Err(CompileError::Invalid(_))));
        assert!(matches!(
            Template::new("a${"),
            Err(CompileError::Invalid(_))
        ));
        assert!(matches!(
            Template::new("a${}"),
            Err(CompileError::Invalid(_))
        ));
        assert_eq!(
            Template::new("a${foo").unwrap_err(),
            CompileError::MissingBracket("foo".into())
        );
    }

    #[test]
    fn adjacent_variables_collapse() {
        let template = Template::new("$a$b c").unwrap();
        assert_eq!(
            template.ops,
            vec![Op::Variable("a".into()), Op::Literal(b" c".to_vec())]
        );
        assert!(template.index.contains_key("a"));
        assert!(!template.index.contains_key("b"));
    }

    #[test]
    fn escape_sensitive_literals_are_classified() {
        let template = Template::new(r#"escape=json;{"$key":"$value"}"#).unwrap();
        assert_eq!(
            template.ops,
            vec![
                Op::Literal(b"{\"".to_vec()),
                Op::Variable("key".into()),
                Op::EscLiteral(b"\":\"".to_vec()),
                Op::Variable("value".into()),
                Op::EscLiteral(b"\"}".to_vec()),
            ]
        );
    }

    #[test]
    fn compilation_is_idempotent() {
        for format in [
            crate::COMBINED,
            r#"escape=json;{"$key":"$value"}"#,
            "$$key=$key, $$value=$value",
        ] {
            let first = Template::new(format).unwrap();
            let second = Template::new(format).unwrap();
            assert_eq!(first.ops, second.ops);
            assert_eq!(first.index, second.index);
            assert_eq!(first.escape(), second.escape());
        }
    }

    #[test]
    fn duplicate_names_last_write_wins() {
        let template = Template::new("$a-$a").unwrap();
        assert_eq!(template.index["a"], 2);
        assert_eq!(template.ops.len(), 3);
    }

    #[test]
    fn empty_directive_compiles_to_nothing() {
        let template = Template::new("").unwrap();
        assert!(template.ops.is_empty());
        assert_eq!(template.marshal(&crate::Access::default()).unwrap(), b"");
    }
}
