//! Protocol Module
//!
//! Defines the wire protocol for client-server communication (RESP).
//!
//! ## Frame Types
//!
//! Every element is terminated by `\r\n`; the first byte selects the type.
//!
//! ```text
//! +OK\r\n                      status
//! -ERR message\r\n             error
//! :123\r\n                     integer
//! $6\r\nfoobar\r\n             bulk string     ($-1\r\n = null)
//! *2\r\n$3\r\nfoo\r\n:1\r\n    array           (*-1\r\n = null array)
//! ```
//!
//! ### Commands
//! Always an array of bulk strings, verb first:
//! `*3\r\n$3\r\nSET\r\n$1\r\na\r\n$1\r\n1\r\n`

mod command;
mod value;
mod codec;

pub use command::Command;
pub use value::Value;
pub use codec::{
    decode, encode, encode_into, read_value, write_value, Decoded, Decoder, MAX_NESTING_DEPTH,
};
pub(crate) use codec::fill_buffer;
