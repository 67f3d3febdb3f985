//! Protocol Module
//!
//! RESP (REdis Serialization Protocol) wire format.
//!
//! ## Requests
//! Commands arrive as RESP arrays of bulk strings:
//! ```text
//! *3\r\n$3\r\nSET\r\n$5\r\nhello\r\n$5\r\nworld\r\n
//! ```
//!
//! ## Replies
//! - Simple string: `+OK\r\n`
//! - Error:         `-ERR message\r\n`
//! - Bulk string:   `$5\r\nhello\r\n`
//! - Null bulk:     `$-1\r\n`
//!
//! ## Commands
//! PING, ECHO, SET, GET, DEL (case-insensitive).

mod command;
mod resp;

pub use command::Command;
pub use resp::{encode_command, read_command, read_reply, Reply};
