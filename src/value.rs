//! Leaf field codecs: the primitive values a placeholder can bind.

use crate::error::{DecodeError, EncodeError};
use crate::escape::Escape;

/// A primitive value that can occupy a bound placeholder.
///
/// Rendering applies the escape dialect to free-form payloads (strings and
/// byte vectors); numeric forms need none. Parsing receives the field slice
/// with all escapes already undone and never re-escapes.
///
/// Implemented for the integer types (decimal, range-checked on parse),
/// `u8` (a single raw byte on parse, decimal on render), `bool`, `String`,
/// `Vec<u8>`, and `Option<T>`/`Box<T>` of any of those. An absent `Option`
/// renders as the dialect's nil sentinel.
pub trait FieldValue {
    /// Append the rendered value to `out`.
    fn format_field(&self, esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError>;

    /// Replace `self` with the value parsed from `raw`.
    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError>;
}

fn int_error(ty: &'static str, text: &str, err: &std::num::ParseIntError) -> DecodeError {
    use std::num::IntErrorKind;
    match err.kind() {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => DecodeError::Overflow {
            ty,
            value: text.to_owned(),
        },
        _ => DecodeError::ExpectedInteger {
            ty,
            text: text.to_owned(),
        },
    }
}

macro_rules! integer_field_value {
    ($($ty:ty => $name:literal),* $(,)?) => {$(
        impl FieldValue for $ty {
            fn format_field(&self, _esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
                out.extend_from_slice(self.to_string().as_bytes());
                Ok(())
            }

            fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
                let text = std::str::from_utf8(raw).map_err(|_| DecodeError::ExpectedInteger {
                    ty: $name,
                    text: String::from_utf8_lossy(raw).into_owned(),
                })?;
                *self = text
                    .parse::<$ty>()
                    .map_err(|err| int_error($name, text, &err))?;
                Ok(())
            }
        }
    )*};
}

integer_field_value! {
    i8 => "i8",
    i16 => "i16",
    i32 => "i32",
    i64 => "i64",
    isize => "isize",
    u16 => "u16",
    u32 => "u32",
    u64 => "u64",
    usize => "usize",
}

/// `u8` is the byte slot: parsing takes the field verbatim and requires it
/// to be exactly one byte, rendering writes the decimal value.
impl FieldValue for u8 {
    fn format_field(&self, _esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(self.to_string().as_bytes());
        Ok(())
    }

    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        if raw.len() != 1 {
            return Err(DecodeError::ExpectedByte {
                got: String::from_utf8_lossy(raw).into_owned(),
            });
        }
        *self = raw[0];
        Ok(())
    }
}

impl FieldValue for bool {
    fn format_field(&self, _esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(if *self { b"true" } else { b"false" });
        Ok(())
    }

    /// Case-insensitive `"true"` parses as true, anything else as false.
    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        *self = raw.eq_ignore_ascii_case(b"true");
        Ok(())
    }
}

impl FieldValue for String {
    fn format_field(&self, esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(&esc.escape(self.as_bytes()));
        Ok(())
    }

    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        *self = std::str::from_utf8(raw)?.to_owned();
        Ok(())
    }
}

/// The 8-bit clean slot: holds any field bytes, UTF-8 or not.
impl FieldValue for Vec<u8> {
    fn format_field(&self, esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        out.extend_from_slice(&esc.escape(self));
        Ok(())
    }

    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        self.clear();
        self.extend_from_slice(raw);
        Ok(())
    }
}

impl<T: FieldValue + Default> FieldValue for Option<T> {
    fn format_field(&self, esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        match self {
            Some(value) => value.format_field(esc, out),
            None => {
                out.extend_from_slice(esc.nil_sentinel().as_bytes());
                Ok(())
            }
        }
    }

    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        self.get_or_insert_with(T::default).parse_field(raw)
    }
}

impl<T: FieldValue> FieldValue for Box<T> {
    fn format_field(&self, esc: Escape, out: &mut Vec<u8>) -> Result<(), EncodeError> {
        (**self).format_field(esc, out)
    }

    fn parse_field(&mut self, raw: &[u8]) -> Result<(), DecodeError> {
        (**self).parse_field(raw)
    }
}
