//! Command definitions
//!
//! A command is an array of bulk strings with the verb first.

use bytes::Bytes;

use super::Value;
use crate::error::{RadishError, Result};

/// A parsed command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    /// Verb followed by its arguments
    parts: Vec<Bytes>,
}

impl Command {
    /// Start a command with the given verb
    pub fn new(verb: impl AsRef<[u8]>) -> Self {
        Self {
            parts: vec![Bytes::copy_from_slice(verb.as_ref())],
        }
    }

    /// Append an argument
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.parts.push(Bytes::copy_from_slice(arg.as_ref()));
        self
    }

    /// Append several arguments
    pub fn args<I, A>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: AsRef<[u8]>,
    {
        self.parts
            .extend(args.into_iter().map(|a| Bytes::copy_from_slice(a.as_ref())));
        self
    }

    /// Raw verb bytes, as sent
    pub fn verb(&self) -> &[u8] {
        &self.parts[0]
    }

    /// Upper-cased verb for messages and logs
    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.verb()).to_ascii_uppercase()
    }

    /// Everything after the verb
    pub fn arguments(&self) -> &[Bytes] {
        &self.parts[1..]
    }

    /// Case-insensitive verb comparison
    pub fn is(&self, verb: &str) -> bool {
        self.verb().eq_ignore_ascii_case(verb.as_bytes())
    }

    /// Wire form: array of bulk strings
    pub fn to_value(&self) -> Value {
        Value::Array(self.parts.iter().cloned().map(Value::Bulk).collect())
    }

    /// Interpret a decoded frame as a command
    ///
    /// The frame was well formed, so failures here are command errors and
    /// leave the connection usable.
    pub fn from_value(value: Value) -> Result<Self> {
        let items = match value {
            Value::Array(items) => items,
            other => {
                return Err(RadishError::Command(format!(
                    "expected array of bulk strings, got {}",
                    other.kind()
                )))
            }
        };

        if items.is_empty() {
            return Err(RadishError::Command("empty command".to_string()));
        }

        let parts = items
            .into_iter()
            .map(|item| match item {
                Value::Bulk(data) => Ok(data),
                other => Err(RadishError::Command(format!(
                    "command elements must be bulk strings, got {}",
                    other.kind()
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { parts })
    }
}
