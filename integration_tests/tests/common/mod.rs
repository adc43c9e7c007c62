//! Shared helpers for driving real node tasks over loopback TCP.
//!
//! Tests in this crate spin up one or two production node tasks (a
//! [`ptp_sim::node::grandmaster::GrandMaster`] and/or
//! [`ptp_sim::node::switch::Switch`]) and play every other role by hand,
//! scripting the exact wire exchange with the same low-level primitives
//! the real [`ptp_sim::node::slave::Slave`] uses internally.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};

use ptp_sim::io::{split_line_socket, LineReader, LineWriter};

/// Initialize tracing once per test binary; harmless to call from every
/// test.
pub fn init_logging() {
    let _ = tracing_subscriber::fmt::try_init();
}

/// Bind an ephemeral loopback listener and return it together with its
/// port, so the caller can pass the already-bound listener straight into
/// a production node constructor instead of re-binding a port number
/// later (the same bind-before-spawn ordering `runner::run` uses).
pub async fn bound_listener() -> (TcpListener, u16) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    (listener, port)
}

/// Connect to a loopback port, retrying briefly while the peer is still
/// binding its own listener.
pub async fn connect_retrying(port: u16) -> TcpStream {
    for _ in 0..100 {
        if let Ok(stream) = TcpStream::connect(("127.0.0.1", port)).await {
            return stream;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("could not connect to 127.0.0.1:{port}");
}

/// A scripted test peer standing in for whichever real node role a test
/// isn't directly exercising.
pub struct TestPeer {
    pub reader: LineReader,
    pub writer: LineWriter,
}

impl TestPeer {
    /// Dial out to `port`, as a child node would when bootstrapping.
    pub async fn connect(name: &str, port: u16) -> Self {
        let stream = connect_retrying(port).await;
        let (reader, writer) = split_line_socket(name, stream);
        Self { reader, writer }
    }

    /// Accept one connection on `listener`, as a parent node would.
    pub async fn accept(name: &str, listener: &TcpListener) -> Self {
        let (stream, _addr) = listener.accept().await.unwrap();
        let (reader, writer) = split_line_socket(name, stream);
        Self { reader, writer }
    }
}
