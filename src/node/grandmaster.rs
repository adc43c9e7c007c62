//! Grandmaster node (spec.md §4.2).

use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::SimConfig;
use crate::error::SimError;
use crate::io::LineWriter;
use crate::message::{Message, MessageKind};
use crate::node::{accept_children, spawn_reader, Inbound};
use crate::topology::Topology;

/// The root of the tree. Generates sync events on a fixed period and
/// answers delay requests; never receives downstream from anyone.
pub struct GrandMaster {
    name: String,
    topology: Arc<Topology>,
    config: SimConfig,
    listener: TcpListener,
}

impl GrandMaster {
    /// Build a grandmaster around a listener `runner::run` has already
    /// bound. Binding happens up front, before any node task is spawned
    /// (mirroring the original Python's constructor-time bind in
    /// `nodes/grandmaster.py`), so a child's `connect()` can never race
    /// this node's `bind()`.
    #[must_use]
    pub fn new(name: impl Into<String>, topology: Arc<Topology>, config: SimConfig, listener: TcpListener) -> Self {
        Self { name: name.into(), topology, config, listener }
    }

    /// Run forever. Returns only on an unrecoverable transport error
    /// (spec.md §4.2 "Failure semantics": any I/O failure terminates the
    /// GM thread).
    pub async fn run(self) -> Result<(), SimError> {
        let spec = self.topology.node(&self.name).ok_or_else(|| {
            SimError::InvalidTopology(format!("unknown node {}", self.name))
        })?;
        let num_children = spec.children.len();

        info!(node = %self.name, "grandmaster listening");

        let mut links = accept_children(&self.name, &self.listener, num_children).await?;
        info!(node = %self.name, children = num_children, "accepted all downstream connections");

        // Preliminary announcements are discarded: the GM broadcasts, it
        // never routes, so the contents of each child's subtree don't
        // matter to it (spec.md §4.2).
        for link in &mut links {
            link.reader.recv_message().await?;
        }

        tokio::time::sleep(self.config.startup_delay).await;

        let num_slaves = self.topology.slave_count_under(&self.name);
        info!(node = %self.name, num_slaves, "starting steady state");

        let (tx, mut rx) = mpsc::channel::<Result<Inbound<usize>, SimError>>(64);
        let mut writers: Vec<LineWriter> = Vec::with_capacity(links.len());
        for (idx, link) in links.into_iter().enumerate() {
            writers.push(link.writer);
            spawn_reader(self.name.clone(), idx, link.reader, tx.clone());
        }
        drop(tx);

        loop {
            self.run_round(&mut writers, &mut rx, num_slaves).await?;
            tokio::time::sleep(self.config.sync_period).await;
        }
    }

    async fn run_round(
        &self,
        writers: &mut [LineWriter],
        rx: &mut mpsc::Receiver<Result<Inbound<usize>, SimError>>,
        num_slaves: usize,
    ) -> Result<(), SimError> {
        // Step 1: sync, then (after a gap) follow_up, on every downstream
        // link, each carrying its own T1.
        let mut t1s = Vec::with_capacity(writers.len());
        for writer in writers.iter_mut() {
            t1s.push(writer.send_message(&Message::sync().encode()).await?);
        }
        tokio::time::sleep(self.config.sync_follow_up_gap).await;
        for (writer, t1) in writers.iter_mut().zip(t1s.iter()) {
            writer.send_message(&Message::follow_up(*t1, 0.0).encode()).await?;
        }

        // Step 2: collect exactly num_slaves delay_req messages across
        // every downstream socket. A single read may yield several
        // concatenated messages; each still counts on its own.
        let mut requests = Vec::with_capacity(num_slaves);
        while requests.len() < num_slaves {
            let inbound = rx
                .recv()
                .await
                .ok_or_else(|| SimError::ConnectionClosed { node: self.name.clone() })??;
            let msg = Message::parse(&inbound.line)
                .map_err(|source| SimError::Message { node: self.name.clone(), source })?;
            match msg {
                Message::DelayReq { slave, correction } => {
                    requests.push((slave, correction, inbound.arrived));
                }
                other => {
                    return Err(SimError::UnexpectedMessage {
                        node: self.name.clone(),
                        expected: MessageKind::DelayReq,
                        got: other.kind(),
                    });
                }
            }
        }

        // Step 3: every downstream link gets the full batch of responses,
        // in the order the requests arrived; the switches below route
        // them to the right subtree.
        for writer in writers.iter_mut() {
            for (slave, correction, t4) in &requests {
                writer
                    .send_message(&Message::delay_resp(slave.clone(), *t4, *correction).encode())
                    .await?;
            }
        }
        Ok(())
    }
}
