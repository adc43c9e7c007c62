//! Slave node (spec.md §4.3).

use std::sync::Arc;

use tracing::{info, warn};

use crate::clock::{compute_round, DriftErrorHistory};
use crate::config::SimConfig;
use crate::error::SimError;
use crate::io::{LineReader, LineWriter};
use crate::message::{Message, MessageKind};
use crate::node::connect_upstream;
use crate::topology::Topology;

/// A leaf node. Computes offset and one-way delay relative to the
/// grandmaster once per sync round; never disciplines a real clock.
pub struct Slave {
    name: String,
    topology: Arc<Topology>,
    config: SimConfig,
}

impl Slave {
    #[must_use]
    pub fn new(name: impl Into<String>, topology: Arc<Topology>, config: SimConfig) -> Self {
        Self { name: name.into(), topology, config }
    }

    /// Run forever, logging one report per completed round. Returns only
    /// on an unrecoverable transport error; a protocol misorder just
    /// abandons the current round (spec.md §7).
    pub async fn run(self) -> Result<(), SimError> {
        let spec = self.topology.node(&self.name).ok_or_else(|| {
            SimError::InvalidTopology(format!("unknown node {}", self.name))
        })?;
        let parent = spec.parent.clone().ok_or_else(|| {
            SimError::InvalidTopology(format!("{} has no parent", self.name))
        })?;
        let parent_port = self.topology.listen_port(&parent).ok_or_else(|| {
            SimError::InvalidTopology(format!("parent {parent} has no listen port"))
        })?;

        let (mut reader, mut writer) = connect_upstream(&self.name, parent_port).await?;
        writer.send_message(&self.name).await?;
        info!(node = %self.name, "connected upstream");

        let mut history = DriftErrorHistory::new();

        loop {
            match self.run_round(&mut reader, &mut writer, &mut history).await {
                Ok(()) => {}
                Err(SimError::UnexpectedMessage { expected, got, .. }) => {
                    warn!(node = %self.name, %expected, %got, "protocol misorder, abandoning round");
                }
                Err(SimError::Message { source, .. }) => {
                    warn!(node = %self.name, error = %source, "malformed message, abandoning round");
                }
                Err(fatal) => return Err(fatal),
            }
        }
    }

    async fn run_round(
        &self,
        reader: &mut LineReader,
        writer: &mut LineWriter,
        history: &mut DriftErrorHistory,
    ) -> Result<(), SimError> {
        let drift = self.config.sample_drift();

        let (t2, line) = reader.recv_message().await?;
        let msg = Message::parse(&line)
            .map_err(|source| SimError::Message { node: self.name.clone(), source })?;
        if msg.kind() != MessageKind::Sync {
            return Err(SimError::UnexpectedMessage {
                node: self.name.clone(),
                expected: MessageKind::Sync,
                got: msg.kind(),
            });
        }
        let t2_drifted = t2.plus_secs(drift);

        let (_, line) = reader.recv_message().await?;
        let msg = Message::parse(&line)
            .map_err(|source| SimError::Message { node: self.name.clone(), source })?;
        let (t1, sync_correction) = match msg {
            Message::FollowUp { t1, correction } => (t1, correction),
            other => {
                return Err(SimError::UnexpectedMessage {
                    node: self.name.clone(),
                    expected: MessageKind::FollowUp,
                    got: other.kind(),
                })
            }
        };

        let t3 = writer
            .send_message(&Message::delay_req(self.name.clone(), 0.0).encode())
            .await?;
        let t3_drifted = t3.plus_secs(drift);

        let (_, line) = reader.recv_message().await?;
        let msg = Message::parse(&line)
            .map_err(|source| SimError::Message { node: self.name.clone(), source })?;
        let (t4, delay_correction) = match msg {
            Message::DelayResp { t4, correction, .. } => (t4, correction),
            other => {
                return Err(SimError::UnexpectedMessage {
                    node: self.name.clone(),
                    expected: MessageKind::DelayResp,
                    got: other.kind(),
                })
            }
        };

        let result = compute_round(t1, t2_drifted, sync_correction, t3_drifted, t4, delay_correction);
        let mean_error = history.record(drift, result.offset);

        info!(
            node = %self.name,
            drift,
            offset = result.offset,
            one_way_delay = result.one_way_delay,
            mean_error,
            "round complete",
        );
        Ok(())
    }
}
