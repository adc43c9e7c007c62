//! Framed-message I/O primitive (spec.md §4.1).
//!
//! A timestamped, line-framed stream abstraction over a TCP half. Each
//! socket keeps its own undrained-byte buffer (handled for us by
//! [`tokio_util::codec::LinesCodec`]): `recv_message` resolves to exactly
//! one `\n`-terminated line with the terminator stripped, paired with the
//! local wall-clock time at which the read completed. `send_message`
//! writes a complete line and returns the local time the write finished.
//!
//! A single TCP read may return several concatenated lines or a partial
//! line; `LinesCodec` reassembles across reads, so callers never see a
//! fragment.

use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec, LinesCodecError};

use futures::{SinkExt, StreamExt};

use crate::error::SimError;
use crate::timestamp::Timestamp;

/// Read half of a line-framed socket.
pub struct LineReader {
    node: String,
    inner: FramedRead<OwnedReadHalf, LinesCodec>,
}

/// Write half of a line-framed socket.
pub struct LineWriter {
    node: String,
    inner: FramedWrite<OwnedWriteHalf, LinesCodec>,
}

fn codec_err(node: &str, err: LinesCodecError) -> SimError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => SimError::Io {
            node: node.to_string(),
            source: std::io::Error::other("line too long"),
        },
        LinesCodecError::Io(source) => SimError::Io {
            node: node.to_string(),
            source,
        },
    }
}

impl LineReader {
    /// Block until exactly one complete message is available, returning
    /// the local arrival time paired with the message text.
    ///
    /// Fails when the peer closes mid-message or a lower-level I/O error
    /// occurs (spec.md §4.1) — both are unrecoverable for the caller.
    pub async fn recv_message(&mut self) -> Result<(Timestamp, String), SimError> {
        match self.inner.next().await {
            Some(Ok(line)) => Ok((Timestamp::now(), line)),
            Some(Err(err)) => Err(codec_err(&self.node, err)),
            None => Err(SimError::ConnectionClosed {
                node: self.node.clone(),
            }),
        }
    }
}

impl LineWriter {
    /// Write a complete protocol line (no trailing `\n` — the codec adds
    /// it) and return the local time the write finished.
    ///
    /// Sends are atomic with respect to this socket: there is exactly one
    /// `LineWriter` owner per link, so no caller can interleave partial
    /// writes on the same connection.
    pub async fn send_message(&mut self, line: &str) -> Result<Timestamp, SimError> {
        self.inner
            .send(line)
            .await
            .map_err(|err| codec_err(&self.node, err))?;
        Ok(Timestamp::now())
    }
}

/// Split a connected TCP stream into a timestamped line reader/writer pair.
#[must_use]
pub fn split_line_socket(node: impl Into<String>, stream: TcpStream) -> (LineReader, LineWriter) {
    let node = node.into();
    let (read_half, write_half) = stream.into_split();
    (
        LineReader {
            node: node.clone(),
            inner: FramedRead::new(read_half, LinesCodec::new()),
        },
        LineWriter {
            node,
            inner: FramedWrite::new(write_half, LinesCodec::new()),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn connected_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = TcpStream::connect(addr);
        let (accept, connect) = tokio::join!(listener.accept(), connect);
        (accept.unwrap().0, connect.unwrap())
    }

    #[tokio::test]
    async fn recv_message_strips_terminator_and_stamps_time() {
        let (server, client) = connected_pair().await;
        let (_sr, mut sw) = split_line_socket("server", server);
        let (mut cr, _cw) = split_line_socket("client", client);

        sw.send_message("sync").await.unwrap();
        let (_t, line) = cr.recv_message().await.unwrap();
        assert_eq!(line, "sync");
    }

    #[tokio::test]
    async fn a_single_read_can_yield_multiple_concatenated_messages() {
        let (server, client) = connected_pair().await;
        let (_sr, mut sw) = split_line_socket("server", server);
        let (mut cr, _cw) = split_line_socket("client", client);

        sw.send_message("delay_req D 0").await.unwrap();
        sw.send_message("delay_req E 0").await.unwrap();

        let (_t1, first) = cr.recv_message().await.unwrap();
        let (_t2, second) = cr.recv_message().await.unwrap();
        assert_eq!(first, "delay_req D 0");
        assert_eq!(second, "delay_req E 0");
    }

    #[tokio::test]
    async fn peer_close_is_reported_as_connection_closed() {
        let (server, client) = connected_pair().await;
        let (mut cr, _cw) = split_line_socket("client", client);
        drop(server);

        let err = cr.recv_message().await.unwrap_err();
        assert!(matches!(err, SimError::ConnectionClosed { .. }));
    }
}
