//! Error types.

use crate::message::MessageParseError;

/// Main error type for simulator operations.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// A socket read or write failed.
    #[error("I/O error on {node} link: {source}")]
    Io {
        /// Name of the node that owns the failing socket.
        node: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The peer closed the connection mid-message (EOF before a `\n`).
    #[error("{node}: connection closed by peer")]
    ConnectionClosed {
        /// Name of the node that observed the close.
        node: String,
    },
    /// A message line could not be decoded at all (unknown type).
    #[error("{node}: {source}")]
    Message {
        /// Name of the node that received the bad message.
        node: String,
        /// The underlying parse error.
        #[source]
        source: MessageParseError,
    },
    /// A received message was not the type the protocol step expected.
    ///
    /// Recoverable: spec.md §7 treats this as a per-round protocol error,
    /// not a fatal one. The round is abandoned and the node continues.
    #[error("{node}: expected {expected} but received {got}")]
    UnexpectedMessage {
        /// Name of the node.
        node: String,
        /// The message kind the protocol step required.
        expected: crate::message::MessageKind,
        /// The message kind actually received.
        got: crate::message::MessageKind,
    },
    /// The topology description is not well formed.
    #[error("invalid topology: {0}")]
    InvalidTopology(String),
}
