//! # ngxfmt - nginx `log_format` codec
//!
//! A bidirectional codec for the nginx [`log_format`] directive: compile
//! the directive once into a [`Template`], then render typed values into
//! log lines (`marshal`) and parse log lines back into typed values
//! (`unmarshal`).
//!
//! This library provides functionality to:
//! - Compile `log_format` directives, including the `escape=` prefix and
//!   `$name` / `${name}` / `$$` forms
//! - Marshal and unmarshal structs defined with [`ngx_record!`]
//! - Marshal and unmarshal `HashMap` and [`Entry`] targets keyed by
//!   variable name
//! - Handle all three escape dialects, including JSON `\uHHHH`
//!   surrogate-pair decoding
//!
//! ## Quick Start
//!
//! ```rust
//! use ngxfmt::Access;
//!
//! let line = br#"192.168.1.1 - alice [08/Nov/2013:13:39:18 +0000] "GET /api/foo HTTP/1.1" 200 612 "-" "curl/7.64.1""#;
//!
//! let mut access = Access::default();
//! ngxfmt::unmarshal(line, &mut access)?;
//! assert_eq!(access.remote_addr, "192.168.1.1");
//! assert_eq!(access.status, 200);
//!
//! // and back again
//! assert_eq!(ngxfmt::marshal(&access)?, line);
//! # Ok::<(), ngxfmt::Error>(())
//! ```
//!
//! Custom formats compile into their own templates:
//!
//! ```rust
//! use std::collections::HashMap;
//!
//! let template = ngxfmt::compile(r#"escape=json;{"$key":"$value"}"#)?;
//! let mut fields: HashMap<String, String> = HashMap::new();
//! template.unmarshal(br#"{"left":"right"}"#, &mut fields)?;
//! assert_eq!(fields["key"], "left");
//! assert_eq!(fields["value"], "right");
//! # Ok::<(), ngxfmt::Error>(())
//! ```
//!
//! [`log_format`]: http://nginx.org/en/docs/http/ngx_http_log_module.html#log_format

mod buffer;
pub mod entry;
pub mod error;
pub mod escape;
mod map;
pub mod record;
mod scan;
pub mod template;
pub mod value;

pub use entry::{Entry, Fields};
pub use error::{CompileError, DecodeError, EncodeError, Error, EscapeError, Result};
pub use escape::Escape;
pub use record::{FieldDef, Record};
pub use template::{compile, Decode, Encode, Template};
pub use value::FieldValue;

use once_cell::sync::Lazy;

/// The nginx "combined" log format, the default for the crate-level
/// [`marshal`]/[`unmarshal`] functions.
pub const COMBINED: &str = "$remote_addr - $remote_user [$time_local] \"$request\" $status $body_bytes_sent \"$http_referer\" \"$http_user_agent\"";

static COMBINED_TEMPLATE: Lazy<Template> =
    Lazy::new(|| Template::new(COMBINED).expect("the combined format always compiles"));

ngx_record! {
    /// One line of the nginx "combined" access log.
    #[derive(Debug, Clone, Default, PartialEq, Eq)]
    #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
    pub struct Access {
        pub remote_addr: String => "remote_addr",
        pub remote_user: String => "remote_user",
        pub time_local: String => "time_local",
        pub request: String => "request",
        pub status: i64 => "status",
        pub body_bytes_sent: i64 => "body_bytes_sent",
        pub http_referer: String => "http_referer",
        pub http_user_agent: String => "http_user_agent",
    }
}

/// Render `value` as a line of the [`COMBINED`] format.
pub fn marshal<T: Encode>(value: &T) -> Result<Vec<u8>, EncodeError> {
    COMBINED_TEMPLATE.marshal(value)
}

/// Render `value` as a [`COMBINED`] line in a `String`.
pub fn marshal_to_string<T: Encode>(value: &T) -> Result<String, EncodeError> {
    COMBINED_TEMPLATE.marshal_to_string(value)
}

/// Parse a [`COMBINED`] log line into `value`.
pub fn unmarshal<T: Decode>(data: &[u8], value: &mut T) -> Result<(), DecodeError> {
    COMBINED_TEMPLATE.unmarshal(data, value)
}

/// Parse a [`COMBINED`] log line given as a string into `value`.
pub fn unmarshal_from_string<T: Decode>(data: &str, value: &mut T) -> Result<(), DecodeError> {
    COMBINED_TEMPLATE.unmarshal_from_string(data, value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_round_trip() {
        let access = Access {
            remote_addr: "127.0.0.1".into(),
            remote_user: "frank".into(),
            time_local: "10/Oct/2000:13:55:36 -0700".into(),
            request: "GET /apache_pb.gif HTTP/1.0".into(),
            status: 200,
            body_bytes_sent: 2326,
            http_referer: "http://www.example.com/start.html".into(),
            http_user_agent: "Mozilla/4.08 [en] (Win98; I ;Nav)".into(),
        };
        let line = marshal(&access).unwrap();
        let mut back = Access::default();
        unmarshal(&line, &mut back).unwrap();
        assert_eq!(back, access);
    }

    #[test]
    fn string_entry_points_agree_with_byte_ones() {
        let mut access = Access::default();
        unmarshal_from_string(
            r#"10.0.0.1 - - [x] "GET / HTTP/1.1" 304 0 "-" "-""#,
            &mut access,
        )
        .unwrap();
        assert_eq!(access.status, 304);
        assert_eq!(
            marshal_to_string(&access).unwrap().as_bytes(),
            marshal(&access).unwrap().as_slice()
        );
    }
}
