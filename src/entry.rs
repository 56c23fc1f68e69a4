//! A string-keyed record with typed on-demand accessors.

use std::collections::HashMap;

use crate::error::{DecodeError, EncodeError, Error, Result};
use crate::template::{Decode, Encode, Template};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Type alias for the underlying field storage.
/// All field values are stored as strings, with type conversion on demand.
pub type Fields = HashMap<String, String>;

/// A log entry holding field name-value pairs.
///
/// `Entry` is the "just give me the fields" target: every template variable
/// decodes into an entry under its own name, and accessors convert values
/// on demand. Use an [`ngx_record!`](crate::ngx_record) type instead when
/// the field set is fixed.
///
/// # Example
///
/// ```rust
/// use ngxfmt::{Entry, Template};
///
/// let template = Template::new(r#"$remote_addr [$time_local] "$request" $status"#)?;
/// let mut entry = Entry::new();
/// template.unmarshal(
///     br#"127.0.0.1 [08/Nov/2013:13:39:18 +0000] "GET /api/foo HTTP/1.1" 200"#,
///     &mut entry,
/// )?;
///
/// assert_eq!(entry.field("remote_addr")?, "127.0.0.1");
/// assert_eq!(entry.int_field("status")?, 200);
/// # Ok::<(), ngxfmt::Error>(())
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Entry {
    fields: Fields,
}

impl Entry {
    /// Create a new empty entry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new entry from a fields map.
    pub fn from_fields(fields: Fields) -> Self {
        Self { fields }
    }

    /// Get a field value as a string, or an error if the field is absent.
    pub fn field(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| Error::field_not_found(name))
    }

    /// Get a field value as a 32-bit integer.
    pub fn int_field(&self, name: &str) -> Result<i32> {
        let value = self.field(name)?;
        value
            .parse()
            .map_err(|err| Error::field_parse(name, value, "i32", err))
    }

    /// Get a field value as a 64-bit integer.
    pub fn int64_field(&self, name: &str) -> Result<i64> {
        let value = self.field(name)?;
        value
            .parse()
            .map_err(|err| Error::field_parse(name, value, "i64", err))
    }

    /// Get a field value as a float.
    pub fn float_field(&self, name: &str) -> Result<f64> {
        let value = self.field(name)?;
        value
            .parse()
            .map_err(|err| Error::field_parse(name, value, "f64", err))
    }

    /// Set a field value as a string.
    pub fn set_field(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Set a field value from an unsigned integer.
    pub fn set_uint_field(&mut self, name: impl Into<String>, value: u64) {
        self.fields.insert(name.into(), value.to_string());
    }

    /// Set a field value from a float, keeping two decimal places.
    pub fn set_float_field(&mut self, name: impl Into<String>, value: f64) {
        self.fields.insert(name.into(), format!("{value:.2}"));
    }

    /// Iterate over all field names and values.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.fields.iter()
    }

    /// The number of fields in this entry.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether this entry has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// A reference to the underlying fields map.
    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    /// A mutable reference to the underlying fields map.
    pub fn fields_mut(&mut self) -> &mut Fields {
        &mut self.fields
    }
}

impl From<Fields> for Entry {
    fn from(fields: Fields) -> Self {
        Self::from_fields(fields)
    }
}

impl From<Entry> for Fields {
    fn from(entry: Entry) -> Self {
        entry.fields
    }
}

impl Encode for Entry {
    fn encode(&self, template: &Template, out: &mut Vec<u8>) -> std::result::Result<(), EncodeError> {
        self.fields.encode(template, out)
    }
}

impl Decode for Entry {
    fn decode(&mut self, template: &Template, data: &[u8]) -> std::result::Result<(), DecodeError> {
        self.fields.decode(template, data)
    }
}
