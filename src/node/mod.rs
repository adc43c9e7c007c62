//! Node roles and the shared bootstrap/multiplexing plumbing they all use.
//!
//! Each role (`grandmaster`, `slave`, `switch`) owns its steady-state
//! protocol logic; what's common is getting connected in the first place
//! (spec.md §6 "Bootstrap handshake") and, for the two roles that watch
//! more than one socket at once, turning several `LineReader`s into a
//! single stream of events (spec.md §5 "readiness-multiplexing").

pub mod grandmaster;
pub mod slave;
pub mod switch;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::SimError;
use crate::io::{split_line_socket, LineReader, LineWriter};
use crate::timestamp::Timestamp;

/// One accepted downstream connection, already split into independently
/// owned read/write halves.
pub struct DownstreamLink {
    pub reader: LineReader,
    pub writer: LineWriter,
}

/// Accept exactly `n` connections on `listener`, in whatever order they
/// arrive (spec.md §6 step 1: "in arbitrary order").
pub async fn accept_children(
    node: &str,
    listener: &TcpListener,
    n: usize,
) -> Result<Vec<DownstreamLink>, SimError> {
    let mut links = Vec::with_capacity(n);
    for _ in 0..n {
        let (stream, _addr) = listener
            .accept()
            .await
            .map_err(|source| SimError::Io { node: node.to_string(), source })?;
        let (reader, writer) = split_line_socket(node, stream);
        links.push(DownstreamLink { reader, writer });
    }
    Ok(links)
}

/// Dial the parent's listen port on loopback (spec.md §6: "each non-root
/// node dials `127.0.0.1:listen_port(parent)` at startup").
pub async fn connect_upstream(node: &str, parent_port: u16) -> Result<(LineReader, LineWriter), SimError> {
    let stream = TcpStream::connect(("127.0.0.1", parent_port))
        .await
        .map_err(|source| SimError::Io { node: node.to_string(), source })?;
    Ok(split_line_socket(node, stream))
}

/// One line read off some link, tagged with which link it came from.
pub struct Inbound<L> {
    pub link: L,
    pub arrived: Timestamp,
    pub line: String,
}

/// Spawn a task that drains `reader` forever, forwarding each message (or
/// the terminal error) to `tx` tagged with `link`. This is how the
/// grandmaster and the switch turn N independent sockets into the single
/// event stream their steady-state loop selects over.
pub fn spawn_reader<L>(
    node: String,
    link: L,
    mut reader: LineReader,
    tx: mpsc::Sender<Result<Inbound<L>, SimError>>,
) where
    L: Clone + Send + 'static,
{
    tokio::spawn(async move {
        loop {
            match reader.recv_message().await {
                Ok((arrived, line)) => {
                    if tx.send(Ok(Inbound { link: link.clone(), arrived, line })).await.is_err() {
                        return;
                    }
                }
                Err(err) => {
                    warn!(node = %node, error = %err, "link reader stopping");
                    let _ = tx.send(Err(err)).await;
                    return;
                }
            }
        }
    });
}
