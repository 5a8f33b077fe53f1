//! Tests for Dispatcher
//!
//! These tests verify:
//! - Verb lookup (case-insensitive, aliases, unknown verbs)
//! - Arity enforcement leaves the store untouched
//! - Reply shapes for every command
//! - Operations stay indivisible under concurrent callers

use std::sync::Arc;
use std::thread;

use radishkv::dispatcher::{lookup, Arity, Dispatcher};
use radishkv::protocol::{Command, Value};

// =============================================================================
// Helper Functions
// =============================================================================

fn run(dispatcher: &Dispatcher, parts: &[&str]) -> Value {
    let command = Command::new(parts[0]).args(&parts[1..]);
    dispatcher.execute(&command).value
}

fn is_error_containing(value: &Value, needle: &str) -> bool {
    matches!(value, Value::Error(message) if message.starts_with("ERR") && message.contains(needle))
}

// =============================================================================
// Command Table Tests
// =============================================================================

#[test]
fn test_lookup_is_case_insensitive() {
    assert_eq!(lookup(b"get").unwrap().name, "GET");
    assert_eq!(lookup(b"GeT").unwrap().name, "GET");
    assert_eq!(lookup(b"del").unwrap().name, "DELETE");
    assert_eq!(lookup(b"flushdb").unwrap().name, "FLUSH");
    assert!(lookup(b"NOPE").is_none());
}

#[test]
fn test_arity_rules() {
    assert!(Arity::Exact(1).accepts(1));
    assert!(!Arity::Exact(1).accepts(2));
    assert!(Arity::Range(0, 1).accepts(0));
    assert!(!Arity::Range(0, 1).accepts(2));
    assert!(Arity::AtLeast(1).accepts(5));
    assert!(!Arity::AtLeast(1).accepts(0));
    assert!(Arity::Pairs.accepts(4));
    assert!(!Arity::Pairs.accepts(3));
    assert!(!Arity::Pairs.accepts(0));
}

// =============================================================================
// Command Execution Tests
// =============================================================================

#[test]
fn test_ping() {
    let dispatcher = Dispatcher::default();
    assert_eq!(run(&dispatcher, &["PING"]), Value::simple("PONG"));
    assert_eq!(run(&dispatcher, &["ping", "hi"]), Value::bulk("hi"));
}

#[test]
fn test_echo() {
    let dispatcher = Dispatcher::default();
    assert_eq!(run(&dispatcher, &["ECHO", "hello"]), Value::bulk("hello"));
}

#[test]
fn test_set_get_delete() {
    let dispatcher = Dispatcher::default();

    assert_eq!(run(&dispatcher, &["GET", "a"]), Value::Null);
    assert_eq!(run(&dispatcher, &["SET", "a", "1"]), Value::Integer(1));
    assert_eq!(run(&dispatcher, &["GET", "a"]), Value::bulk("1"));
    assert_eq!(run(&dispatcher, &["DELETE", "a"]), Value::Integer(1));
    assert_eq!(run(&dispatcher, &["DEL", "a"]), Value::Integer(0));
    assert_eq!(run(&dispatcher, &["GET", "a"]), Value::Null);
}

#[test]
fn test_mset_mget() {
    let dispatcher = Dispatcher::default();

    assert_eq!(run(&dispatcher, &["MSET", "k1", "v1", "k2", "v2"]), Value::ok());
    assert_eq!(
        run(&dispatcher, &["MGET", "k2", "missing", "k1"]),
        Value::Array(vec![Value::bulk("v2"), Value::Null, Value::bulk("v1")])
    );
}

#[test]
fn test_mset_odd_arguments_leaves_store_unchanged() {
    let dispatcher = Dispatcher::default();
    run(&dispatcher, &["SET", "k1", "original"]);

    let reply = run(&dispatcher, &["MSET", "k1", "v1", "k2"]);

    assert!(is_error_containing(&reply, "wrong number of arguments for 'mset'"));
    assert_eq!(run(&dispatcher, &["GET", "k1"]), Value::bulk("original"));
    assert_eq!(run(&dispatcher, &["EXISTS", "k2"]), Value::Integer(0));
    assert_eq!(dispatcher.len(), 1);
}

#[test]
fn test_flush_then_exists() {
    let dispatcher = Dispatcher::default();
    run(&dispatcher, &["SET", "a", "1"]);
    run(&dispatcher, &["SET", "b", "2"]);

    assert_eq!(run(&dispatcher, &["FLUSH"]), Value::Integer(2));
    assert_eq!(run(&dispatcher, &["EXISTS", "a"]), Value::Integer(0));
    assert!(dispatcher.is_empty());
}

#[test]
fn test_exists_counts_many_keys() {
    let dispatcher = Dispatcher::default();
    run(&dispatcher, &["MSET", "a", "1", "b", "2"]);

    assert_eq!(run(&dispatcher, &["EXISTS", "a", "b", "c"]), Value::Integer(2));
}

#[test]
fn test_strlen() {
    let dispatcher = Dispatcher::default();
    run(&dispatcher, &["SET", "k", "hello"]);

    assert_eq!(run(&dispatcher, &["STRLEN", "k"]), Value::Integer(5));
    assert_eq!(run(&dispatcher, &["STRLEN", "nope"]), Value::Integer(0));
}

#[test]
fn test_quit_requests_close() {
    let dispatcher = Dispatcher::default();
    let reply = dispatcher.execute(&Command::new("QUIT"));

    assert_eq!(reply.value, Value::ok());
    assert!(reply.close);
    assert!(!dispatcher.execute(&Command::new("PING")).close);
}

// =============================================================================
// Error Reply Tests
// =============================================================================

#[test]
fn test_unknown_command() {
    let dispatcher = Dispatcher::default();
    let reply = dispatcher.execute(&Command::new("NOPE").arg("x"));

    assert!(is_error_containing(&reply.value, "unknown command 'NOPE'"));
    assert!(!reply.close);
}

#[test]
fn test_wrong_arity() {
    let dispatcher = Dispatcher::default();

    assert!(is_error_containing(&run(&dispatcher, &["GET"]), "'get'"));
    assert!(is_error_containing(&run(&dispatcher, &["SET", "a"]), "'set'"));
    assert!(is_error_containing(&run(&dispatcher, &["ECHO", "a", "b"]), "'echo'"));
    assert!(is_error_containing(&run(&dispatcher, &["FLUSH", "x"]), "'flush'"));
    assert!(is_error_containing(&run(&dispatcher, &["MGET"]), "'mget'"));
}

#[test]
fn test_dispatch_non_command_frame() {
    let dispatcher = Dispatcher::default();
    let reply = dispatcher.dispatch(Value::simple("GET"));

    assert!(is_error_containing(&reply.value, "expected array"));
    assert!(!reply.close);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_mset_is_indivisible() {
    let dispatcher = Arc::new(Dispatcher::default());
    let mut handles = Vec::new();

    for t in 0..4 {
        let dispatcher = Arc::clone(&dispatcher);
        handles.push(thread::spawn(move || {
            let value = t.to_string();
            for _ in 0..500 {
                let command = Command::new("MSET")
                    .args(["a", value.as_str(), "b", value.as_str(), "c", value.as_str()]);
                dispatcher.execute(&command);
            }
        }));
    }

    let reader = {
        let dispatcher = Arc::clone(&dispatcher);
        thread::spawn(move || {
            for _ in 0..500 {
                let reply = dispatcher.execute(&Command::new("MGET").args(["a", "b", "c"]));
                if let Value::Array(items) = reply.value {
                    assert!(items.windows(2).all(|w| w[0] == w[1]), "torn MSET: {:?}", items);
                }
            }
        })
    };

    for handle in handles {
        handle.join().unwrap();
    }
    reader.join().unwrap();
}

#[test]
fn test_with_store_gives_exclusive_access() {
    let dispatcher = Dispatcher::default();
    run(&dispatcher, &["SET", "k", "v"]);

    let len = dispatcher.with_store(|store| {
        store.set("x".into(), "y".into());
        store.len()
    });
    assert_eq!(len, 2);
}
