//! RadishKV CLI Client
//!
//! Command-line interface for interacting with RadishKV.

use std::time::Duration;

use clap::{Parser, Subcommand};
use radishkv::config::{ClientConfig, DEFAULT_PORT};
use radishkv::{Connection, Result};

/// RadishKV CLI
#[derive(Parser, Debug)]
#[command(name = "radishkv-cli")]
#[command(about = "CLI for RadishKV key-value store")]
struct Args {
    /// Server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Reply timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Ping the server
    Ping,

    /// Echo a message back
    Echo { message: String },

    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Set { key: String, value: String },

    /// Delete a key
    #[command(alias = "del")]
    Delete { key: String },

    /// Count how many of the keys exist
    Exists {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Set several pairs: k1 v1 k2 v2 ...
    Mset {
        #[arg(required = true, num_args = 2..)]
        pairs: Vec<String>,
    },

    /// Get several values
    Mget {
        #[arg(required = true)]
        keys: Vec<String>,
    },

    /// Remove every key
    Flush,

    /// Length of a stored value
    Strlen { key: String },
}

fn main() {
    let args = Args::parse();

    let config = ClientConfig::builder()
        .host(&args.host)
        .port(args.port)
        .read_timeout(Some(Duration::from_millis(args.timeout_ms)))
        .build();

    let result = Connection::open(config).and_then(|mut conn| {
        let output = run(&mut conn, args.command);
        conn.close();
        output
    });

    match result {
        Ok(output) => println!("{}", output),
        Err(e) => {
            eprintln!("(error) {}", e);
            std::process::exit(1);
        }
    }
}

fn run(conn: &mut Connection, command: Commands) -> Result<String> {
    let output = match command {
        Commands::Ping => conn.ping()?,
        Commands::Echo { message } => show(Some(conn.echo(message)?)),
        Commands::Get { key } => show(conn.get(key)?),
        Commands::Set { key, value } => integer(i64::from(conn.set(key, value)?)),
        Commands::Delete { key } => integer(conn.delete(key)?),
        Commands::Exists { keys } => integer(conn.exists_many(keys)?),
        Commands::Mset { pairs } => {
            if pairs.len() % 2 != 0 {
                return Err(radishkv::RadishError::Command(
                    "MSET takes key/value pairs".to_string(),
                ));
            }
            let pairs: Vec<(&String, &String)> =
                pairs.chunks_exact(2).map(|p| (&p[0], &p[1])).collect();
            conn.mset(&pairs)?;
            "OK".to_string()
        }
        Commands::Mget { keys } => conn
            .mget(keys)?
            .into_iter()
            .enumerate()
            .map(|(i, value)| format!("{}) {}", i + 1, show(value)))
            .collect::<Vec<_>>()
            .join("\n"),
        Commands::Flush => integer(conn.flush()?),
        Commands::Strlen { key } => integer(conn.strlen(key)?),
    };
    Ok(output)
}

fn show(value: Option<bytes::Bytes>) -> String {
    match value {
        Some(data) => format!("\"{}\"", String::from_utf8_lossy(&data)),
        None => "(nil)".to_string(),
    }
}

fn integer(n: i64) -> String {
    format!("(integer) {}", n)
}
