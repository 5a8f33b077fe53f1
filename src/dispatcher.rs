//! Dispatcher Module
//!
//! Maps decoded commands onto store operations.
//!
//! ## Responsibilities
//! - Look up the verb in a fixed command table (case-insensitive)
//! - Validate arity before touching the store
//! - Marshal bulk arguments into the shapes each operation expects
//! - Run the operation under the store lock and build the reply
//!
//! ## Concurrency Model
//! One `parking_lot::Mutex<Store>` is held for the duration of each
//! operation, so commands from different connections never interleave
//! mid-operation (including multi-key `MSET`).

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{RadishError, Result};
use crate::protocol::{Command, Value};
use crate::store::Store;

// =============================================================================
// Command Table
// =============================================================================

/// Argument-count rule (verb excluded)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    Range(usize, usize),
    AtLeast(usize),
    /// Key/value pairs: a non-zero even count
    Pairs,
}

impl Arity {
    pub fn accepts(self, count: usize) -> bool {
        match self {
            Arity::Exact(n) => count == n,
            Arity::Range(min, max) => (min..=max).contains(&count),
            Arity::AtLeast(min) => count >= min,
            Arity::Pairs => count >= 2 && count % 2 == 0,
        }
    }
}

type Handler = fn(&mut Store, &[Bytes]) -> Value;

/// One command table entry
pub struct CommandSpec {
    pub name: &'static str,
    pub aliases: &'static [&'static str],
    pub arity: Arity,
    /// Connection closes after the reply is written
    pub closes_connection: bool,
    handler: Handler,
}

impl CommandSpec {
    fn matches(&self, verb: &[u8]) -> bool {
        verb.eq_ignore_ascii_case(self.name.as_bytes())
            || self
                .aliases
                .iter()
                .any(|alias| verb.eq_ignore_ascii_case(alias.as_bytes()))
    }
}

static COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "PING",
        aliases: &[],
        arity: Arity::Range(0, 1),
        closes_connection: false,
        handler: ping,
    },
    CommandSpec {
        name: "ECHO",
        aliases: &[],
        arity: Arity::Exact(1),
        closes_connection: false,
        handler: echo,
    },
    CommandSpec {
        name: "GET",
        aliases: &[],
        arity: Arity::Exact(1),
        closes_connection: false,
        handler: get,
    },
    CommandSpec {
        name: "SET",
        aliases: &[],
        arity: Arity::Exact(2),
        closes_connection: false,
        handler: set,
    },
    CommandSpec {
        name: "DELETE",
        aliases: &["DEL"],
        arity: Arity::Exact(1),
        closes_connection: false,
        handler: delete,
    },
    CommandSpec {
        name: "EXISTS",
        aliases: &[],
        arity: Arity::AtLeast(1),
        closes_connection: false,
        handler: exists,
    },
    CommandSpec {
        name: "MSET",
        aliases: &[],
        arity: Arity::Pairs,
        closes_connection: false,
        handler: mset,
    },
    CommandSpec {
        name: "MGET",
        aliases: &[],
        arity: Arity::AtLeast(1),
        closes_connection: false,
        handler: mget,
    },
    CommandSpec {
        name: "FLUSH",
        aliases: &["FLUSHDB"],
        arity: Arity::Exact(0),
        closes_connection: false,
        handler: flush,
    },
    CommandSpec {
        name: "STRLEN",
        aliases: &[],
        arity: Arity::Exact(1),
        closes_connection: false,
        handler: strlen,
    },
    CommandSpec {
        name: "QUIT",
        aliases: &[],
        arity: Arity::Exact(0),
        closes_connection: true,
        handler: quit,
    },
];

/// Find the table entry for `verb`
pub fn lookup(verb: &[u8]) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.matches(verb))
}

/// All supported commands
pub fn commands() -> &'static [CommandSpec] {
    COMMANDS
}

// =============================================================================
// Handlers (arity already validated)
// =============================================================================

fn ping(store: &mut Store, args: &[Bytes]) -> Value {
    match args.first() {
        Some(message) => Value::Bulk(message.clone()),
        None => Value::simple(store.ping()),
    }
}

fn echo(store: &mut Store, args: &[Bytes]) -> Value {
    Value::Bulk(store.echo(args[0].clone()))
}

fn get(store: &mut Store, args: &[Bytes]) -> Value {
    Value::optional(store.get(&args[0]))
}

fn set(store: &mut Store, args: &[Bytes]) -> Value {
    store.set(args[0].clone(), args[1].clone());
    Value::Integer(1)
}

fn delete(store: &mut Store, args: &[Bytes]) -> Value {
    Value::Integer(store.delete(&args[0]))
}

fn exists(store: &mut Store, args: &[Bytes]) -> Value {
    Value::Integer(store.exists_many(args.iter().map(|k| &k[..])))
}

fn mset(store: &mut Store, args: &[Bytes]) -> Value {
    let pairs = args
        .chunks_exact(2)
        .map(|pair| (pair[0].clone(), pair[1].clone()));
    store.multi_set(pairs);
    Value::ok()
}

fn mget(store: &mut Store, args: &[Bytes]) -> Value {
    let values = store.multi_get(args.iter().map(|k| &k[..]));
    Value::Array(values.into_iter().map(Value::optional).collect())
}

fn flush(store: &mut Store, _args: &[Bytes]) -> Value {
    Value::Integer(store.flush())
}

fn strlen(store: &mut Store, args: &[Bytes]) -> Value {
    Value::Integer(store.strlen(&args[0]))
}

fn quit(_store: &mut Store, _args: &[Bytes]) -> Value {
    Value::ok()
}

// =============================================================================
// Dispatcher
// =============================================================================

/// Result of dispatching one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Value to write back
    pub value: Value,

    /// Close the connection once `value` is written
    pub close: bool,
}

impl Reply {
    fn keep_open(value: Value) -> Self {
        Self {
            value,
            close: false,
        }
    }
}

/// Owns the store and serializes access to it
pub struct Dispatcher {
    store: Mutex<Store>,
}

impl Dispatcher {
    pub fn new(store: Store) -> Self {
        Self {
            store: Mutex::new(store),
        }
    }

    /// Execute a decoded frame
    ///
    /// Command-level problems become `-ERR` replies; nothing here closes the
    /// connection except `QUIT`.
    pub fn dispatch(&self, frame: Value) -> Reply {
        match Command::from_value(frame) {
            Ok(command) => self.execute(&command),
            Err(e) => Reply::keep_open(Value::error(e.to_string())),
        }
    }

    /// Execute a command
    pub fn execute(&self, command: &Command) -> Reply {
        match self.resolve(command) {
            Ok(spec) => {
                let value = {
                    let mut store = self.store.lock();
                    (spec.handler)(&mut *store, command.arguments())
                };
                Reply {
                    value,
                    close: spec.closes_connection,
                }
            }
            Err(e) => {
                tracing::debug!("Rejected command {}: {}", command.name(), e);
                Reply::keep_open(Value::error(e.to_string()))
            }
        }
    }

    fn resolve(&self, command: &Command) -> Result<&'static CommandSpec> {
        let spec = lookup(command.verb())
            .ok_or_else(|| RadishError::Command(format!("unknown command '{}'", command.name())))?;

        if !spec.arity.accepts(command.arguments().len()) {
            return Err(RadishError::Command(format!(
                "wrong number of arguments for '{}' command",
                spec.name.to_ascii_lowercase()
            )));
        }
        Ok(spec)
    }

    /// Run `f` with exclusive access to the store
    pub fn with_store<T>(&self, f: impl FnOnce(&mut Store) -> T) -> T {
        f(&mut *self.store.lock())
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.store.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.lock().is_empty()
    }
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(Store::new())
    }
}
