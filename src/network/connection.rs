//! Connection Handler
//!
//! Runs the read-command / execute / write-reply loop for one client.

use std::io::BufReader;
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::engine::Engine;
use crate::error::{EmberError, Result};
use crate::protocol::{read_command, Command, Reply};

/// Handles a single client connection
pub struct Connection {
    reader: BufReader<TcpStream>,
    writer: TcpStream,
    engine: Arc<Engine>,
    peer: String,
}

impl Connection {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, engine: Arc<Engine>) -> Result<Self> {
        let peer = stream
            .peer_addr()
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        let reader = BufReader::new(stream.try_clone()?);

        Ok(Self {
            reader,
            writer: stream,
            engine,
            peer,
        })
    }

    /// Set socket read/write timeouts
    pub fn set_timeouts(&self, read_ms: u64, write_ms: u64) -> Result<()> {
        self.writer
            .set_read_timeout(Some(Duration::from_millis(read_ms)))?;
        self.writer
            .set_write_timeout(Some(Duration::from_millis(write_ms)))?;
        Ok(())
    }

    /// Peer address for logging
    pub fn peer_addr(&self) -> &str {
        &self.peer
    }

    /// Serve the connection until the client disconnects.
    ///
    /// A malformed frame gets an error reply and closes the connection;
    /// the stream offset can no longer be trusted after one.
    pub fn handle(&mut self) -> Result<()> {
        debug!(peer = %self.peer, "client connected");

        loop {
            let args = match read_command(&mut self.reader) {
                Ok(Some(args)) => args,
                Ok(None) => break,
                Err(EmberError::Protocol(msg)) => {
                    let _ = Reply::Error(format!("ERR {}", msg)).write_to(&mut self.writer);
                    return Err(EmberError::Protocol(msg));
                }
                Err(e) => return Err(e),
            };

            let reply = execute(&self.engine, args);
            reply.write_to(&mut self.writer)?;
        }

        debug!(peer = %self.peer, "client disconnected");
        Ok(())
    }
}

/// Execute one command against the engine, mapping outcomes onto wire
/// replies. Core errors surface as `-ERR <message>`.
pub fn execute(engine: &Engine, args: Vec<Vec<u8>>) -> Reply {
    let command = match Command::parse(args) {
        Ok(command) => command,
        Err(reply) => return reply,
    };

    match command {
        Command::Ping => Reply::Simple("PONG".to_string()),
        Command::Echo { message } => Reply::Bulk(message),
        Command::Set { key, value } => match engine.set(&key, &value) {
            Ok(()) => Reply::Simple("OK".to_string()),
            Err(e) => Reply::Error(format!("ERR {}", e)),
        },
        Command::Get { key } => match engine.get(&key) {
            Some(value) => Reply::Bulk(value),
            None => Reply::NullBulk,
        },
        Command::Del { key } => match engine.delete(&key) {
            Ok(()) => Reply::Simple("OK".to_string()),
            Err(e) => Reply::Error(format!("ERR {}", e)),
        },
    }
}
