//! Escape dialects for rendering and recovering field values.
//!
//! nginx renders variable values differently depending on the `escape=`
//! prefix of the `log_format` directive. Each dialect knows how to escape
//! a value on the way out, unescape it on the way back in, and which
//! sentinel stands in for an absent value.

use std::borrow::Cow;
use std::fmt;

use memchr::memchr;

use crate::error::EscapeError;

/// The escaping rule set selected by a directive's `escape=` prefix.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Escape {
    /// nginx default escaping: control bytes become `\xHH`, backslash and
    /// double quote are backslash-prefixed. Absent values render as `-`.
    #[default]
    Default,
    /// JSON string escaping: the `\n`-style single letter forms, `\u00HH`
    /// for other control bytes, full `\uHHHH` decoding on the way back.
    /// Absent values render as `null`.
    Json,
    /// No escaping at all; absent values render as the empty string.
    None,
}

impl fmt::Display for Escape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Escape::Default => "default",
            Escape::Json => "json",
            Escape::None => "none",
        })
    }
}

impl Escape {
    /// Whether a literal run starting with `ch` could collide with escaped
    /// content of the preceding field. The decoder scans such delimiters
    /// with the escaped-delimiter rules.
    pub(crate) fn is_escape_lead(self, ch: u8) -> bool {
        match self {
            Escape::Default => matches!(ch, b'\\' | b'"' | b'x'),
            Escape::Json => matches!(ch, b'\\' | b'"' | b'n' | b'r' | b't' | b'b' | b'f' | b'u'),
            Escape::None => false,
        }
    }

    /// The string substituted for an absent value.
    pub fn nil_sentinel(self) -> &'static str {
        match self {
            Escape::Default => "-",
            Escape::Json => "null",
            Escape::None => "",
        }
    }

    /// Escape `raw` for emission. Borrows when nothing needs escaping.
    pub fn escape<'a>(self, raw: &'a [u8]) -> Cow<'a, [u8]> {
        match self {
            Escape::Default => escape_default(raw),
            Escape::Json => escape_json(raw),
            Escape::None => Cow::Borrowed(raw),
        }
    }

    /// Undo [`Escape::escape`]. Borrows when the input holds no `\`.
    pub fn unescape<'a>(self, raw: &'a [u8]) -> Result<Cow<'a, [u8]>, EscapeError> {
        match self {
            Escape::Default => unescape_default(raw),
            Escape::Json => unescape_json(raw),
            Escape::None => Ok(Cow::Borrowed(raw)),
        }
    }
}

fn hex_val(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'f' => Some(ch - b'a' + 10),
        b'A'..=b'F' => Some(ch - b'A' + 10),
        _ => None,
    }
}

fn push_nibble(out: &mut Vec<u8>, nib: u8) {
    out.push(if nib < 10 { b'0' + nib } else { b'A' + nib - 10 });
}

fn escape_default(raw: &[u8]) -> Cow<'_, [u8]> {
    if !raw
        .iter()
        .any(|&ch| ch < 0x20 || ch == b'\\' || ch == b'"')
    {
        return Cow::Borrowed(raw);
    }
    let mut out = Vec::with_capacity(raw.len() + 2);
    for &ch in raw {
        if ch < 0x20 {
            out.extend_from_slice(b"\\x");
            push_nibble(&mut out, ch >> 4);
            push_nibble(&mut out, ch & 0xF);
        } else {
            if ch == b'\\' || ch == b'"' {
                out.push(b'\\');
            }
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

fn escape_json(raw: &[u8]) -> Cow<'_, [u8]> {
    if !raw
        .iter()
        .any(|&ch| ch < 0x20 || ch == b'\\' || ch == b'"')
    {
        return Cow::Borrowed(raw);
    }
    let mut out = Vec::with_capacity(raw.len() + 2);
    for &ch in raw {
        if ch < 0x20 {
            out.push(b'\\');
            match ch {
                b'\n' => out.push(b'n'),
                b'\r' => out.push(b'r'),
                b'\t' => out.push(b't'),
                0x08 => out.push(b'b'),
                0x0C => out.push(b'f'),
                _ => {
                    out.extend_from_slice(b"u00");
                    push_nibble(&mut out, ch >> 4);
                    push_nibble(&mut out, ch & 0xF);
                }
            }
        } else {
            if ch == b'\\' || ch == b'"' {
                out.push(b'\\');
            }
            out.push(ch);
        }
    }
    Cow::Owned(out)
}

fn unescape_default(raw: &[u8]) -> Result<Cow<'_, [u8]>, EscapeError> {
    if memchr(b'\\', raw).is_none() {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let Some(off) = memchr(b'\\', &raw[i..]) else {
            out.extend_from_slice(&raw[i..]);
            break;
        };
        out.extend_from_slice(&raw[i..i + off]);
        // index of the byte following the backslash
        let bs = i + off + 1;
        if bs >= raw.len() {
            return Err(EscapeError::Truncated);
        }
        match raw[bs] {
            ch @ (b'\\' | b'"') => {
                out.push(ch);
                i = bs + 1;
            }
            b'x' => {
                if bs + 2 >= raw.len() {
                    return Err(EscapeError::TruncatedHex);
                }
                match (hex_val(raw[bs + 1]), hex_val(raw[bs + 2])) {
                    (Some(hi), Some(lo)) => {
                        out.push(hi << 4 | lo);
                        i = bs + 3;
                    }
                    _ => {
                        return Err(EscapeError::InvalidHex(
                            String::from_utf8_lossy(&raw[bs + 1..bs + 3]).into_owned(),
                        ))
                    }
                }
            }
            ch => return Err(EscapeError::Unknown(ch as char)),
        }
    }
    Ok(Cow::Owned(out))
}

fn unescape_json(raw: &[u8]) -> Result<Cow<'_, [u8]>, EscapeError> {
    if memchr(b'\\', raw).is_none() {
        return Ok(Cow::Borrowed(raw));
    }
    let mut out = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let Some(off) = memchr(b'\\', &raw[i..]) else {
            out.extend_from_slice(&raw[i..]);
            break;
        };
        out.extend_from_slice(&raw[i..i + off]);
        let bs = i + off + 1;
        if bs >= raw.len() {
            return Err(EscapeError::Truncated);
        }
        match raw[bs] {
            ch @ (b'\\' | b'"') => {
                out.push(ch);
                i = bs + 1;
            }
            b'n' => {
                out.push(b'\n');
                i = bs + 1;
            }
            b'r' => {
                out.push(b'\r');
                i = bs + 1;
            }
            b't' => {
                out.push(b'\t');
                i = bs + 1;
            }
            b'b' => {
                out.push(0x08);
                i = bs + 1;
            }
            b'f' => {
                out.push(0x0C);
                i = bs + 1;
            }
            b'u' => {
                if bs + 4 >= raw.len() {
                    return Err(EscapeError::TruncatedUnicode);
                }
                let unit = hex4(&raw[bs + 1..bs + 5])?;
                if !is_surrogate(unit) {
                    push_code_point(&mut out, unit);
                    i = bs + 5;
                    continue;
                }
                // a surrogate half: look ahead for the matching `\uHHHH`
                let next = bs + 5;
                if next + 5 < raw.len() && raw[next] == b'\\' && raw[next + 1] == b'u' {
                    let unit2 = hex4(&raw[next + 2..next + 6])?;
                    match combine_surrogates(unit, unit2) {
                        Some(cp) => push_code_point(&mut out, cp),
                        // not a valid pair: both halves degrade on their own
                        None => {
                            push_code_point(&mut out, unit);
                            push_code_point(&mut out, unit2);
                        }
                    }
                    i = next + 6;
                } else {
                    push_code_point(&mut out, unit);
                    i = bs + 5;
                }
            }
            ch => return Err(EscapeError::Unknown(ch as char)),
        }
    }
    Ok(Cow::Owned(out))
}

fn hex4(quad: &[u8]) -> Result<u32, EscapeError> {
    let mut cp = 0u32;
    for &ch in quad {
        match hex_val(ch) {
            Some(v) => cp = cp << 4 | u32::from(v),
            None => {
                return Err(EscapeError::InvalidUnicode(
                    String::from_utf8_lossy(quad).into_owned(),
                ))
            }
        }
    }
    Ok(cp)
}

fn is_surrogate(unit: u32) -> bool {
    (0xD800..=0xDFFF).contains(&unit)
}

fn combine_surrogates(hi: u32, lo: u32) -> Option<u32> {
    if (0xD800..0xDC00).contains(&hi) && (0xDC00..0xE000).contains(&lo) {
        Some(0x10000 + ((hi - 0xD800) << 10 | (lo - 0xDC00)))
    } else {
        None
    }
}

/// UTF-8 encode `cp`; surrogate halves and out-of-range values become
/// U+FFFD, so a lone surrogate still produces deterministic output.
fn push_code_point(out: &mut Vec<u8>, cp: u32) {
    let ch = char::from_u32(cp).unwrap_or(char::REPLACEMENT_CHARACTER);
    let mut buf = [0u8; 4];
    out.extend_from_slice(ch.encode_utf8(&mut buf).as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    fn esc(dialect: Escape, raw: &[u8]) -> Vec<u8> {
        dialect.escape(raw).into_owned()
    }

    fn unesc(dialect: Escape, raw: &[u8]) -> Result<Vec<u8>, EscapeError> {
        dialect.unescape(raw).map(Cow::into_owned)
    }

    #[test]
    fn default_escape_controls_and_metachars() {
        assert_eq!(esc(Escape::Default, b"plain"), b"plain");
        assert_eq!(esc(Escape::Default, b"a\"b\\c"), b"a\\\"b\\\\c");
        assert_eq!(esc(Escape::Default, b"\x01\x1f"), b"\\x01\\x1F");
        assert_eq!(esc(Escape::Default, b"tab\there"), b"tab\\x09here");
    }

    #[test]
    fn default_unescape_round() {
        assert_eq!(unesc(Escape::Default, b"plain").unwrap(), b"plain");
        assert_eq!(unesc(Escape::Default, b"a\\\"b\\\\c").unwrap(), b"a\"b\\c");
        assert_eq!(unesc(Escape::Default, b"\\x41\\x0a").unwrap(), b"A\n");
    }

    #[test]
    fn default_unescape_errors() {
        assert_eq!(unesc(Escape::Default, b"oops\\"), Err(EscapeError::Truncated));
        assert_eq!(
            unesc(Escape::Default, b"\\x4"),
            Err(EscapeError::TruncatedHex)
        );
        assert_eq!(unesc(Escape::Default, b"\\x"), Err(EscapeError::TruncatedHex));
        assert_eq!(
            unesc(Escape::Default, b"\\xZ9"),
            Err(EscapeError::InvalidHex("Z9".into()))
        );
        assert_eq!(
            unesc(Escape::Default, b"\\n"),
            Err(EscapeError::Unknown('n'))
        );
    }

    #[test]
    fn json_escape_single_letter_forms() {
        assert_eq!(esc(Escape::Json, b"a\nb\rc\td"), b"a\\nb\\rc\\td");
        assert_eq!(esc(Escape::Json, b"\x08\x0c"), b"\\b\\f");
        assert_eq!(esc(Escape::Json, b"\x01"), b"\\u0001");
        assert_eq!(esc(Escape::Json, b"q\"s\\"), b"q\\\"s\\\\");
    }

    #[test]
    fn json_unescape_basic() {
        assert_eq!(
            unesc(Escape::Json, b"a\\nb\\rc\\td\\b\\f").unwrap(),
            b"a\nb\rc\td\x08\x0c"
        );
        assert_eq!(unesc(Escape::Json, b"\\u0041\\u00e9").unwrap(), "A\u{e9}".as_bytes());
    }

    #[test]
    fn json_unescape_surrogate_pair() {
        // U+1F309 BRIDGE AT NIGHT
        assert_eq!(
            unesc(Escape::Json, b"\\ud83c\\udf09").unwrap(),
            "\u{1F309}".as_bytes()
        );
    }

    #[test]
    fn json_unescape_lone_surrogate_degrades() {
        assert_eq!(
            unesc(Escape::Json, b"\\ud800").unwrap(),
            "\u{FFFD}".as_bytes()
        );
        // surrogate followed by a non-escape keeps the tail intact
        assert_eq!(
            unesc(Escape::Json, b"\\ud800xy").unwrap(),
            "\u{FFFD}xy".as_bytes()
        );
    }

    #[test]
    fn json_unescape_invalid_pair_degrades_both() {
        // two high surrogates cannot combine
        assert_eq!(
            unesc(Escape::Json, b"\\ud800\\ud800").unwrap(),
            "\u{FFFD}\u{FFFD}".as_bytes()
        );
        // low surrogate then a plain scalar: each decodes on its own
        assert_eq!(
            unesc(Escape::Json, b"\\udc00\\u0041").unwrap(),
            "\u{FFFD}A".as_bytes()
        );
    }

    #[test]
    fn json_unescape_errors() {
        assert_eq!(
            unesc(Escape::Json, b"\\u004"),
            Err(EscapeError::TruncatedUnicode)
        );
        assert_eq!(
            unesc(Escape::Json, b"\\u00zz"),
            Err(EscapeError::InvalidUnicode("00zz".into()))
        );
        assert_eq!(unesc(Escape::Json, b"\\q"), Err(EscapeError::Unknown('q')));
    }

    #[test]
    fn none_is_identity() {
        let raw = b"\\x41 \\u0041 \x01\"";
        assert_eq!(esc(Escape::None, raw), raw);
        assert_eq!(unesc(Escape::None, raw).unwrap(), raw);
    }

    #[test]
    fn involution_on_clean_and_control_bytes() {
        for dialect in [Escape::Default, Escape::Json] {
            for raw in [
                &b"no escapes at all"[..],
                &b"quotes \" and slashes \\"[..],
                &b"\x00\x01\x1f mixed \n\r\t"[..],
                &[0x80, 0xff, 0x20][..],
            ] {
                let escaped = dialect.escape(raw);
                assert_eq!(
                    dialect.unescape(&escaped).unwrap().as_ref(),
                    raw,
                    "{dialect} failed on {raw:?}"
                );
            }
        }
    }

    #[test]
    fn nil_sentinels() {
        assert_eq!(Escape::Default.nil_sentinel(), "-");
        assert_eq!(Escape::Json.nil_sentinel(), "null");
        assert_eq!(Escape::None.nil_sentinel(), "");
    }

    #[test]
    fn borrowed_when_untouched() {
        assert!(matches!(Escape::Json.escape(b"clean"), Cow::Borrowed(_)));
        assert!(matches!(
            Escape::Default.unescape(b"clean").unwrap(),
            Cow::Borrowed(_)
        ));
    }
}
