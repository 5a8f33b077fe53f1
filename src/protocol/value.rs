//! Value definitions
//!
//! A single wire-representable value: what one frame decodes to.

use bytes::Bytes;

/// A decoded (or to-be-encoded) protocol value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// `:<n>`
    Integer(i64),

    /// `$<len>` followed by the payload
    Bulk(Bytes),

    /// `+<text>`
    Simple(String),

    /// `-<message>`
    Error(String),

    /// Null bulk string (`$-1`)
    Null,

    /// Null array (`*-1`)
    NullArray,

    /// `*<count>` followed by the elements
    Array(Vec<Value>),
}

impl Value {
    /// `+OK`
    pub fn ok() -> Self {
        Value::Simple("OK".to_string())
    }

    /// Create a status reply
    pub fn simple(text: impl Into<String>) -> Self {
        Value::Simple(text.into())
    }

    /// Create a bulk string reply, copying the bytes
    pub fn bulk(data: impl AsRef<[u8]>) -> Self {
        Value::Bulk(Bytes::copy_from_slice(data.as_ref()))
    }

    /// Create an `-ERR <message>` reply
    pub fn error(message: impl AsRef<str>) -> Self {
        Value::Error(format!("ERR {}", message.as_ref()))
    }

    /// Bulk for `Some`, null for `None`
    pub fn optional(data: Option<Bytes>) -> Self {
        data.map_or(Value::Null, Value::Bulk)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null | Value::NullArray)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Value::Error(_))
    }

    /// Short type name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Integer(_) => "integer",
            Value::Bulk(_) => "bulk string",
            Value::Simple(_) => "status",
            Value::Error(_) => "error",
            Value::Null => "null",
            Value::NullArray => "null array",
            Value::Array(_) => "array",
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Integer(n)
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::Bulk(data)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}
