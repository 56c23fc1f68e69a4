//! Error types for the ngxfmt library.

use thiserror::Error;

use crate::escape::Escape;

/// Result type alias for ngxfmt operations.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Any error this library can produce.
///
/// The compile, encode, and decode stages each have their own error enum;
/// this type unifies them for callers that do not care which stage failed.
/// The entry accessors ([`crate::Entry`]) report through it directly.
#[derive(Error, Debug)]
pub enum Error {
    /// The log format directive could not be compiled.
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A value could not be rendered into a log line.
    #[error(transparent)]
    Encode(#[from] EncodeError),

    /// A log line could not be parsed back into a value.
    #[error(transparent)]
    Decode(#[from] DecodeError),

    /// Error when a field is not found in an entry.
    #[error("field '{field}' not found")]
    FieldNotFound { field: String },

    /// Error when an entry field cannot be parsed as the requested type.
    #[error("field '{field}' with value '{value}' cannot be parsed as {target_type}: {source}")]
    FieldParse {
        field: String,
        value: String,
        target_type: &'static str,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl Error {
    /// Create a new field not found error.
    pub fn field_not_found(field: impl Into<String>) -> Self {
        Self::FieldNotFound {
            field: field.into(),
        }
    }

    /// Create a new field parse error.
    pub fn field_parse(
        field: impl Into<String>,
        value: impl Into<String>,
        target_type: &'static str,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Self::FieldParse {
            field: field.into(),
            value: value.into(),
            target_type,
            source: Box::new(source),
        }
    }
}

/// Errors raised while compiling a log format directive.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileError {
    /// An empty variable name, or input that ends inside a `$` reference.
    #[error("invalid log format near byte {0}")]
    Invalid(usize),

    /// A `${…` reference without its closing bracket.
    #[error("the closing bracket of variable '{0}' is missing")]
    MissingBracket(String),

    /// The `escape=` preamble names a selector other than
    /// `json`, `default`, or `none`.
    #[error("unknown log format escaping '{0}'")]
    UnknownEscaping(String),

    /// A byte other than whitespace or `;` follows the escape selector.
    #[error("expecting ';' after escape={0}")]
    ExpectSemicolon(Escape),

    /// A variable name breaks the dot rules.
    #[error("variable '{name}' {reason}")]
    InvalidVariableName {
        name: String,
        reason: &'static str,
    },
}

/// Errors raised while unescaping a field value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EscapeError {
    /// The input ends immediately after a `\`.
    #[error("unexpected end of input after '\\'")]
    Truncated,

    /// The input ends inside a `\xHH` sequence.
    #[error("unexpected end of input in '\\x' escape")]
    TruncatedHex,

    /// The input ends inside a `\uHHHH` sequence.
    #[error("unexpected end of input in '\\u' escape")]
    TruncatedUnicode,

    /// A `\x` sequence with a non-hex digit.
    #[error("invalid hex escape '\\x{0}'")]
    InvalidHex(String),

    /// A `\u` sequence with a non-hex digit.
    #[error("invalid unicode escape '\\u{0}'")]
    InvalidUnicode(String),

    /// A `\c` sequence the dialect does not define.
    #[error("unknown escape '\\{0}'")]
    Unknown(char),
}

/// Errors raised while rendering a value into a log line.
#[derive(Error, Debug)]
pub enum EncodeError {
    /// A bound field failed to render; carries the variable name.
    #[error("field '{name}': {source}")]
    Field {
        name: String,
        #[source]
        source: Box<EncodeError>,
    },

    /// A template variable could not be decoded as a mapping key.
    #[error("variable '{name}' is not a valid key: {source}")]
    Key {
        name: String,
        #[source]
        source: Box<DecodeError>,
    },

    /// The rendered line is not valid UTF-8 and cannot become a `String`.
    ///
    /// `marshal` is 8-bit clean; only `marshal_to_string` can fail this way.
    #[error("rendered output is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),
}

/// Errors raised while parsing a log line back into a value.
#[derive(Error, Debug, PartialEq)]
pub enum DecodeError {
    /// The input does not start with the literal the template expects here.
    #[error("got unexpected string '{got}', expecting '{expected}'")]
    UnexpectedLiteral { got: String, expected: String },

    /// The delimiter closing a field never occurs in the remaining input.
    #[error("got unexpected EOF: expecting '{expecting}' after ${after}")]
    UnexpectedEof { expecting: String, after: String },

    /// Two placeholders with no literal between them; the field boundary
    /// cannot be recovered from the input.
    #[error("cannot decode adjacent variables '${a}${b}'")]
    AdjacentVariables { a: String, b: String },

    /// A field value failed to unescape.
    #[error(transparent)]
    Escape(#[from] EscapeError),

    /// A field that should hold a decimal integer holds something else.
    #[error("expected {ty}, got '{text}'")]
    ExpectedInteger { ty: &'static str, text: String },

    /// A decimal integer outside the target field's range.
    #[error("{value} overflows {ty}")]
    Overflow { ty: &'static str, value: String },

    /// A byte field whose input is not exactly one byte long.
    #[error("expected a single byte, got '{got}'")]
    ExpectedByte { got: String },

    /// A `String` field holding bytes that are not valid UTF-8.
    #[error("field value is not valid UTF-8")]
    Utf8(#[from] std::str::Utf8Error),

    /// A template variable could not be decoded as a mapping key.
    #[error("variable '{name}' is not a valid key: {source}")]
    Key {
        name: String,
        source: Box<DecodeError>,
    },

    /// A bound field failed to decode; carries the variable name.
    #[error("field '{name}': {source}")]
    Field {
        name: String,
        source: Box<DecodeError>,
    },
}
