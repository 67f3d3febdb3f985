//! EmberKV CLI Client
//!
//! One-shot RESP client for EmberKV (works against any Redis-compatible
//! endpoint for the commands it speaks).
//!
//! Uses a single TCP stream for sequential write-then-read, the same
//! pattern as redis-cli: encode the command, write it, then wrap the
//! stream in a BufReader only for the reply. Cloning the socket into
//! separate reader/writer handles trips over OS-level shutdown semantics
//! on some platforms.

use std::io::{BufReader, Write};
use std::net::TcpStream;
use std::time::Duration;

use clap::{Parser, Subcommand};

use emberkv::protocol::{encode_command, read_reply, Reply};

/// EmberKV CLI
#[derive(Parser, Debug)]
#[command(name = "emberkv-cli")]
#[command(about = "CLI for the EmberKV key-value store")]
#[command(version)]
struct Args {
    /// Server address (host:port)
    #[arg(short, long, default_value = "127.0.0.1:6380")]
    server: String,

    /// Connection timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get { key: String },

    /// Set a key-value pair
    Set { key: String, value: String },

    /// Delete a key
    Del { key: String },

    /// Ping the server
    Ping,

    /// Echo a message back
    Echo { message: String },
}

fn main() {
    let args = Args::parse();

    let frame = match &args.command {
        Commands::Get { key } => encode_command(&[b"GET", key.as_bytes()]),
        Commands::Set { key, value } => {
            encode_command(&[b"SET", key.as_bytes(), value.as_bytes()])
        }
        Commands::Del { key } => encode_command(&[b"DEL", key.as_bytes()]),
        Commands::Ping => encode_command(&[b"PING"]),
        Commands::Echo { message } => encode_command(&[b"ECHO", message.as_bytes()]),
    };

    let addr = match args.server.parse() {
        Ok(addr) => addr,
        Err(_) => {
            eprintln!("invalid server address: {}", args.server);
            std::process::exit(1);
        }
    };

    let mut stream =
        match TcpStream::connect_timeout(&addr, Duration::from_millis(args.timeout)) {
            Ok(stream) => stream,
            Err(e) => {
                eprintln!("failed to connect to {}: {}", args.server, e);
                std::process::exit(1);
            }
        };

    let _ = stream.set_read_timeout(Some(Duration::from_millis(args.timeout)));
    let _ = stream.set_write_timeout(Some(Duration::from_millis(args.timeout)));
    let _ = stream.set_nodelay(true);

    if let Err(e) = stream.write_all(&frame).and_then(|_| stream.flush()) {
        eprintln!("failed to send command: {}", e);
        std::process::exit(1);
    }

    let mut reader = BufReader::new(&stream);
    let reply = match read_reply(&mut reader) {
        Ok(reply) => reply,
        Err(e) => {
            eprintln!("failed to read reply: {}", e);
            std::process::exit(1);
        }
    };

    match reply {
        Reply::Simple(s) => println!("{}", s),
        Reply::Bulk(data) => match String::from_utf8(data) {
            Ok(s) => println!("{}", s),
            Err(e) => println!("{:?}", e.into_bytes()),
        },
        Reply::NullBulk => println!("(nil)"),
        Reply::Error(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    }
}
