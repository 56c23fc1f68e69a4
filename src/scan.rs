//! Delimiter scanning for the decode path.
//!
//! A placeholder's value is whatever lies between the read cursor and the
//! next operator's literal. When that literal starts with an
//! escape-sensitive byte, an occurrence inside the field may actually be an
//! escaped copy of the delimiter, so the scan must look past false stops.

use memchr::memmem;

use crate::error::DecodeError;
use crate::escape::Escape;

/// What terminates the field currently being scanned.
pub(crate) enum Delim<'a> {
    /// A plain literal delimiter.
    Lit(&'a [u8]),
    /// An escape-sensitive literal delimiter.
    Esc(&'a [u8]),
    /// Another placeholder follows with no literal in between.
    Var(&'a str),
    /// No operator follows; the field runs to the end of the input.
    End,
}

/// A located field value.
#[derive(Debug)]
pub(crate) struct Span {
    /// End of the field value (exclusive).
    pub end: usize,
    /// Cursor position just past the delimiter.
    pub resume: usize,
}

/// Locate the end of the field starting at `start`, named `$var`.
pub(crate) fn scan_field(
    data: &[u8],
    start: usize,
    delim: Delim<'_>,
    var: &str,
    esc: Escape,
) -> Result<Span, DecodeError> {
    match delim {
        Delim::End => Ok(Span {
            end: data.len(),
            resume: data.len(),
        }),
        Delim::Lit(lit) => match memmem::find(&data[start..], lit) {
            Some(off) => Ok(Span {
                end: start + off,
                resume: start + off + lit.len(),
            }),
            None => Err(unexpected_eof(lit, var)),
        },
        Delim::Esc(lit) => {
            let finder = memmem::Finder::new(lit);
            let mut sp = start;
            loop {
                let Some(off) = finder.find(&data[sp..]) else {
                    return Err(unexpected_eof(lit, var));
                };
                let at = sp + off;
                if off > 0 && data[at - 1] == b'\\' {
                    // possibly an escaped delimiter inside the field; the
                    // json dialect can tell by trial-unescaping the
                    // candidate (a trailing `\"` parses cleanly), default
                    // cannot and always keeps scanning
                    if esc == Escape::Json && esc.unescape(&data[start..at]).is_ok() {
                        return Ok(Span {
                            end: at,
                            resume: at + lit.len(),
                        });
                    }
                    sp = at + lit.len();
                    continue;
                }
                return Ok(Span {
                    end: at,
                    resume: at + lit.len(),
                });
            }
        }
        Delim::Var(next) => Err(DecodeError::AdjacentVariables {
            a: var.to_owned(),
            b: next.to_owned(),
        }),
    }
}

/// Build the "unexpected EOF" error for a delimiter that never occurs.
fn unexpected_eof(lit: &[u8], var: &str) -> DecodeError {
    DecodeError::UnexpectedEof {
        expecting: String::from_utf8_lossy(lit).into_owned(),
        after: var.to_owned(),
    }
}

/// Require `data[p..]` to start with `lit`.
pub(crate) fn expect_literal(data: &[u8], p: usize, lit: &[u8]) -> Result<(), DecodeError> {
    if data[p..].starts_with(lit) {
        return Ok(());
    }
    let got = &data[p..data.len().min(p + lit.len())];
    Err(DecodeError::UnexpectedLiteral {
        got: String::from_utf8_lossy(got).into_owned(),
        expected: String::from_utf8_lossy(lit).into_owned(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_delimiter() {
        let span = scan_field(b"hello, world", 0, Delim::Lit(b", "), "v", Escape::Default).unwrap();
        assert_eq!(span.end, 5);
        assert_eq!(span.resume, 7);
    }

    #[test]
    fn missing_delimiter_is_eof() {
        let err = scan_field(b"hello", 0, Delim::Lit(b"|"), "v", Escape::Default).unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedEof {
                expecting: "|".into(),
                after: "v".into(),
            }
        );
    }

    #[test]
    fn escaped_delimiter_is_skipped_under_default() {
        // tr\", Int = 3e", ... -- the first `", ` is escaped content
        let data = br#"tr\", Int = 3e", tail"#;
        let span = scan_field(data, 0, Delim::Esc(br#"", "#), "str", Escape::Default).unwrap();
        assert_eq!(&data[..span.end], br#"tr\", Int = 3e"#);
    }

    #[test]
    fn json_accepts_escaped_tail_by_trial_unescape() {
        // the field is `$key\\`; the backslash before the delimiter is a
        // complete escape, so the first match already ends the field
        let data = br#"$key\\":"rest"#;
        let span = scan_field(data, 0, Delim::Esc(br#"":""#), "key", Escape::Json).unwrap();
        assert_eq!(&data[..span.end], br#"$key\\"#);
    }

    #[test]
    fn empty_field_before_delimiter() {
        let span = scan_field(b"--", 0, Delim::Esc(b"--"), "v", Escape::Json).unwrap();
        assert_eq!(span.end, 0);
        assert_eq!(span.resume, 2);
    }

    #[test]
    fn adjacent_placeholders_cannot_be_scanned() {
        let err = scan_field(b"xy", 0, Delim::Var("b"), "a", Escape::Default).unwrap_err();
        assert_eq!(
            err,
            DecodeError::AdjacentVariables {
                a: "a".into(),
                b: "b".into(),
            }
        );
    }

    #[test]
    fn tail_field_consumes_the_rest() {
        let span = scan_field(b"whatever", 3, Delim::End, "v", Escape::None).unwrap();
        assert_eq!(span.end, 8);
        assert_eq!(span.resume, 8);
    }

    #[test]
    fn literal_prefix_check() {
        assert!(expect_literal(b"abc def", 3, b" de").is_ok());
        let err = expect_literal(b"abc", 0, b"abd").unwrap_err();
        assert_eq!(
            err,
            DecodeError::UnexpectedLiteral {
                got: "abc".into(),
                expected: "abd".into(),
            }
        );
    }
}
