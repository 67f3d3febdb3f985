//! TCP Server
//!
//! Listens for RESP clients and gives every connection its own thread
//! for the life of the session. The accept loop polls a shutdown flag
//! so a signal handler can stop the server; once the flag is set, no
//! new connections are accepted and `run` drains the in-flight sessions
//! before returning, which lets the caller close the engine cleanly.

use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::engine::Engine;
use crate::error::{EmberError, Result};
use crate::protocol::Reply;

use super::Connection;

/// How often the accept loop re-checks the shutdown flag
const SHUTDOWN_POLL: Duration = Duration::from_millis(10);

/// Requests server shutdown from another thread.
///
/// Cheap to clone; the server binary hands one to its signal handler.
#[derive(Clone)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Ask the server to stop accepting and drain
    pub fn shutdown(&self) {
        info!("shutdown requested");
        self.flag.store(true, Ordering::Relaxed);
    }
}

/// TCP server for EmberKV
///
/// One thread per client session, all sharing the engine behind an
/// `Arc`. `run` blocks until shutdown is requested and every accepted
/// connection has finished.
pub struct Server {
    config: Config,

    /// Shared storage engine
    engine: Arc<Engine>,

    /// Set by a ShutdownHandle; observed by the accept loop
    shutdown: Arc<AtomicBool>,

    /// Live session count, bounded by `config.max_connections`
    active_connections: Arc<AtomicUsize>,
}

impl Server {
    /// Create a new server with the given config and engine
    pub fn new(config: Config, engine: Arc<Engine>) -> Self {
        Self {
            config,
            engine,
            shutdown: Arc::new(AtomicBool::new(false)),
            active_connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Handle for requesting shutdown from outside `run`
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            flag: Arc::clone(&self.shutdown),
        }
    }

    /// Whether shutdown has been requested yet
    pub fn is_running(&self) -> bool {
        !self.shutdown.load(Ordering::Relaxed)
    }

    /// Number of sessions currently being served
    pub fn active_connections(&self) -> usize {
        self.active_connections.load(Ordering::Relaxed)
    }

    /// Serve until shutdown is requested (blocking)
    pub fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(&self.config.listen_addr).map_err(|e| {
            EmberError::Network(format!(
                "failed to bind {}: {}",
                self.config.listen_addr, e
            ))
        })?;
        // Non-blocking accept, so the loop can notice the shutdown flag
        // instead of parking in the kernel forever.
        listener.set_nonblocking(true)?;

        info!("server listening on {}", self.config.listen_addr);

        let mut sessions: Vec<JoinHandle<()>> = Vec::new();

        while self.is_running() {
            match listener.accept() {
                Ok((stream, peer)) => {
                    sessions.retain(|session| !session.is_finished());

                    if self.active_connections.load(Ordering::Relaxed)
                        >= self.config.max_connections
                    {
                        warn!(%peer, "connection limit reached, refusing client");
                        refuse(stream);
                        continue;
                    }

                    debug!(%peer, "accepted connection");
                    match self.spawn_session(stream, peer) {
                        Ok(session) => sessions.push(session),
                        Err(e) => error!(%peer, error = %e, "failed to start session"),
                    }
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(SHUTDOWN_POLL);
                }
                Err(e) => warn!(error = %e, "accept failed"),
            }
        }

        info!(in_flight = sessions.len(), "draining connections");
        for session in sessions {
            if session.join().is_err() {
                error!("connection thread panicked");
            }
        }

        info!("server stopped");
        Ok(())
    }

    /// Give a fresh connection its own thread for the whole session
    fn spawn_session(&self, stream: TcpStream, peer: SocketAddr) -> Result<JoinHandle<()>> {
        let engine = Arc::clone(&self.engine);
        let active = Arc::clone(&self.active_connections);
        let read_timeout_ms = self.config.read_timeout_ms;
        let write_timeout_ms = self.config.write_timeout_ms;

        active.fetch_add(1, Ordering::Relaxed);

        thread::Builder::new()
            .name(format!("emberkv-conn-{}", peer.port()))
            .spawn(move || {
                serve_client(stream, engine, read_timeout_ms, write_timeout_ms);
                active.fetch_sub(1, Ordering::Relaxed);
            })
            .map_err(|e| {
                self.active_connections.fetch_sub(1, Ordering::Relaxed);
                EmberError::Network(format!("failed to spawn connection thread: {}", e))
            })
    }
}

/// Body of one session thread
fn serve_client(stream: TcpStream, engine: Arc<Engine>, read_timeout_ms: u64, write_timeout_ms: u64) {
    let mut conn = match Connection::new(stream, engine) {
        Ok(conn) => conn,
        Err(e) => {
            error!(error = %e, "failed to set up connection");
            return;
        }
    };

    if let Err(e) = conn.set_timeouts(read_timeout_ms, write_timeout_ms) {
        warn!(peer = conn.peer_addr(), error = %e, "failed to set connection timeouts");
    }

    if let Err(e) = conn.handle() {
        debug!(peer = conn.peer_addr(), error = %e, "connection ended with error");
    }
}

/// Turn away a client over the connection limit with a proper RESP
/// error rather than a silent hangup.
fn refuse(mut stream: TcpStream) {
    let _ = Reply::Error("ERR max number of clients reached".to_string()).write_to(&mut stream);
}
