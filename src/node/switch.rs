//! Switch (transparent clock) node (spec.md §4.4).
//!
//! The switch is the one role that genuinely multiplexes several sockets:
//! one upstream link and N downstream links, plus a scheduled-egress
//! queue that must wake the event loop even when nothing is readable.
//! [`spawn_reader`](crate::node::spawn_reader) turns the socket side of
//! that into a single channel; the queue side is a small min-heap over
//! [`PendingForward`] ordered by `(deadline, seq)`.

use std::collections::{BinaryHeap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::SimConfig;
use crate::error::SimError;
use crate::io::LineWriter;
use crate::message::{Message, MessageKind};
use crate::node::{accept_children, connect_upstream, spawn_reader, Inbound};
use crate::timestamp::Timestamp;
use crate::topology::Topology;

/// Which socket produced an inbound message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum LinkId {
    Upstream,
    Downstream(usize),
}

/// Which socket a scheduled forward is destined for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum OutLink {
    Upstream,
    Downstream(usize),
}

/// What the egress-time correction step (spec.md §4.4.2) must do for a
/// scheduled forward, keyed by the message type it carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CorrectionAction {
    /// sync: emitted unchanged; its residence is folded into the next
    /// follow-up on this link.
    RecordSyncResidence,
    /// follow_up: takes the link's buffered sync residence and adds it
    /// to the correction field already on the message.
    ApplySyncCorrection,
    /// delay_req: residence is added to the correction field.
    AddResidence,
    /// delay_resp: forwarded byte-for-byte.
    PassThrough,
}

/// One message waiting for its scheduled egress time.
struct PendingForward {
    deadline: Timestamp,
    seq: u64,
    out: OutLink,
    message: Message,
    t_ingress: Timestamp,
    action: CorrectionAction,
}

impl PartialEq for PendingForward {
    fn eq(&self, other: &Self) -> bool {
        self.deadline.as_secs_f64() == other.deadline.as_secs_f64() && self.seq == other.seq
    }
}
impl Eq for PendingForward {}

impl PartialOrd for PendingForward {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PendingForward {
    // `BinaryHeap` is a max-heap; reversing deadline (and seq as
    // tiebreak) makes the earliest-due entry the one that pops first.
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .deadline
            .as_secs_f64()
            .total_cmp(&self.deadline.as_secs_f64())
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// An interior node with exactly one upstream link and ≥1 downstream
/// links, acting as a PTP transparent clock.
pub struct Switch {
    name: String,
    topology: Arc<Topology>,
    config: SimConfig,
    listener: TcpListener,
}

impl Switch {
    /// Build a switch around a listener `runner::run` has already bound.
    /// Binding happens up front, before any node task is spawned
    /// (mirroring the original Python's constructor-time bind in
    /// `nodes/switch.py`), so a child's `connect()` can never race this
    /// node's `bind()`.
    #[must_use]
    pub fn new(name: impl Into<String>, topology: Arc<Topology>, config: SimConfig, listener: TcpListener) -> Self {
        Self { name: name.into(), topology, config, listener }
    }

    /// Run forever. Returns only on an unrecoverable transport error on
    /// any of its sockets.
    pub async fn run(self) -> Result<(), SimError> {
        let spec = self.topology.node(&self.name).ok_or_else(|| {
            SimError::InvalidTopology(format!("unknown node {}", self.name))
        })?;
        let num_children = spec.children.len();

        info!(node = %self.name, "switch listening");

        let mut down_links = accept_children(&self.name, &self.listener, num_children).await?;
        info!(node = %self.name, children = num_children, "accepted all downstream connections");

        // Build the forwarding map as the union of each child's
        // announced subtree (spec.md §4.4 "Startup").
        let mut forwarding: HashMap<String, usize> = HashMap::new();
        let mut announced_names: Vec<String> = Vec::new();
        for (idx, link) in down_links.iter_mut().enumerate() {
            let (_, line) = link.reader.recv_message().await?;
            for slave_name in line.split_whitespace() {
                forwarding.insert(slave_name.to_string(), idx);
                announced_names.push(slave_name.to_string());
            }
        }

        let parent = spec.parent.clone().ok_or_else(|| {
            SimError::InvalidTopology(format!("{} has no parent", self.name))
        })?;
        let parent_port = self.topology.listen_port(&parent).ok_or_else(|| {
            SimError::InvalidTopology(format!("parent {parent} has no listen port"))
        })?;
        let (up_reader, mut up_writer) = connect_upstream(&self.name, parent_port).await?;
        up_writer.send_message(&announced_names.join(" ")).await?;
        info!(node = %self.name, slaves = announced_names.len(), "connected upstream");

        let num_downstream = down_links.len();
        let (tx, mut rx) = mpsc::channel::<Result<Inbound<LinkId>, SimError>>(128);
        let mut down_writers: Vec<LineWriter> = Vec::with_capacity(num_downstream);
        for (idx, link) in down_links.into_iter().enumerate() {
            down_writers.push(link.writer);
            spawn_reader(self.name.clone(), LinkId::Downstream(idx), link.reader, tx.clone());
        }
        spawn_reader(self.name.clone(), LinkId::Upstream, up_reader, tx.clone());
        drop(tx);

        let mut queue: BinaryHeap<PendingForward> = BinaryHeap::new();
        let mut next_seq: u64 = 0;
        let mut sync_correction_buffer: HashMap<usize, f64> = HashMap::new();
        let mut last_deadline: HashMap<OutLink, Timestamp> = HashMap::new();

        loop {
            let inbound = self.wait_for_event(&mut rx, queue.peek().map(|p| p.deadline)).await?;
            if let Some(inbound) = inbound {
                self.classify_and_schedule(
                    inbound,
                    &forwarding,
                    num_downstream,
                    &mut queue,
                    &mut next_seq,
                    &mut last_deadline,
                );
            }

            let now = Timestamp::now();
            while matches!(queue.peek(), Some(top) if top.deadline.as_secs_f64() <= now.as_secs_f64()) {
                let record = queue.pop().expect("peek just confirmed an entry");
                self.egress(record, &mut down_writers, &mut up_writer, &mut sync_correction_buffer)
                    .await?;
            }
        }
    }

    /// Wait for either the next inbound message or the earliest pending
    /// egress deadline, whichever comes first (spec.md §4.4 "Message
    /// handling"). Returns `None` on a pure timeout wakeup.
    async fn wait_for_event(
        &self,
        rx: &mut mpsc::Receiver<Result<Inbound<LinkId>, SimError>>,
        earliest_deadline: Option<Timestamp>,
    ) -> Result<Option<Inbound<LinkId>>, SimError> {
        let recv = async {
            match rx.recv().await {
                Some(Ok(inbound)) => Ok(Some(inbound)),
                Some(Err(err)) => Err(err),
                None => Err(SimError::ConnectionClosed { node: self.name.clone() }),
            }
        };

        match earliest_deadline {
            None => recv.await,
            Some(deadline) => {
                let wait = (deadline.diff_secs(Timestamp::now())).max(0.0);
                tokio::select! {
                    result = recv => result,
                    () = tokio::time::sleep(Duration::from_secs_f64(wait)) => Ok(None),
                }
            }
        }
    }

    fn classify_and_schedule(
        &self,
        inbound: Inbound<LinkId>,
        forwarding: &HashMap<String, usize>,
        num_downstream: usize,
        queue: &mut BinaryHeap<PendingForward>,
        next_seq: &mut u64,
        last_deadline: &mut HashMap<OutLink, Timestamp>,
    ) {
        let msg = match Message::parse(&inbound.line) {
            Ok(msg) => msg,
            Err(err) => {
                debug!(node = %self.name, error = %err, "dropping unparseable message");
                return;
            }
        };

        match (inbound.link, msg.kind()) {
            (LinkId::Upstream, MessageKind::Sync) => {
                for idx in 0..num_downstream {
                    self.schedule(
                        queue,
                        next_seq,
                        last_deadline,
                        OutLink::Downstream(idx),
                        msg.clone(),
                        inbound.arrived,
                        CorrectionAction::RecordSyncResidence,
                    );
                }
            }
            (LinkId::Upstream, MessageKind::FollowUp) => {
                for idx in 0..num_downstream {
                    self.schedule(
                        queue,
                        next_seq,
                        last_deadline,
                        OutLink::Downstream(idx),
                        msg.clone(),
                        inbound.arrived,
                        CorrectionAction::ApplySyncCorrection,
                    );
                }
            }
            (LinkId::Upstream, MessageKind::DelayResp) => {
                let target = match &msg {
                    Message::DelayResp { slave, .. } => forwarding.get(slave).copied(),
                    _ => None,
                };
                match target {
                    Some(idx) => self.schedule(
                        queue,
                        next_seq,
                        last_deadline,
                        OutLink::Downstream(idx),
                        msg,
                        inbound.arrived,
                        CorrectionAction::PassThrough,
                    ),
                    None => {
                        if let Message::DelayResp { slave, .. } = &msg {
                            warn!(node = %self.name, slave = %slave, "delay_resp for unknown slave, dropping");
                        }
                    }
                }
            }
            (LinkId::Downstream(_), MessageKind::DelayReq) => {
                self.schedule(
                    queue,
                    next_seq,
                    last_deadline,
                    OutLink::Upstream,
                    msg,
                    inbound.arrived,
                    CorrectionAction::AddResidence,
                );
            }
            (link, kind) => {
                debug!(node = %self.name, ?link, %kind, "dropping message with unexpected direction/type combo");
            }
        }
    }

    /// Schedule one forward (spec.md §4.4.1): sample a residence delay,
    /// then push the deadline past whatever this link's last deadline
    /// was, so per-link ordering survives reordering from random delays.
    #[allow(clippy::too_many_arguments)]
    fn schedule(
        &self,
        queue: &mut BinaryHeap<PendingForward>,
        next_seq: &mut u64,
        last_deadline: &mut HashMap<OutLink, Timestamp>,
        out: OutLink,
        message: Message,
        t_ingress: Timestamp,
        action: CorrectionAction,
    ) {
        let r = self.config.sample_residence_delay();
        let ready = t_ingress.plus_secs(r);
        let prior = last_deadline.get(&out).copied().unwrap_or(Timestamp::ZERO);
        let deadline = if ready.as_secs_f64() > prior.as_secs_f64() { ready } else { prior }.plus_secs(1e-6);
        last_deadline.insert(out, deadline);

        let seq = *next_seq;
        *next_seq += 1;
        queue.push(PendingForward { deadline, seq, out, message, t_ingress, action });
    }

    /// Emit one scheduled forward, applying its egress-time correction
    /// (spec.md §4.4.2).
    async fn egress(
        &self,
        record: PendingForward,
        down_writers: &mut [LineWriter],
        up_writer: &mut LineWriter,
        sync_correction_buffer: &mut HashMap<usize, f64>,
    ) -> Result<(), SimError> {
        let residence = Timestamp::now().diff_secs(record.t_ingress);

        let out_message = match record.action {
            CorrectionAction::RecordSyncResidence => {
                if let OutLink::Downstream(idx) = record.out {
                    *sync_correction_buffer.entry(idx).or_insert(0.0) += residence;
                }
                record.message
            }
            CorrectionAction::ApplySyncCorrection => {
                let extra = match record.out {
                    OutLink::Downstream(idx) => sync_correction_buffer.insert(idx, 0.0).unwrap_or(0.0),
                    OutLink::Upstream => 0.0,
                };
                let base = record.message.correction().unwrap_or(0.0);
                record.message.with_correction(base + extra)
            }
            CorrectionAction::AddResidence => {
                let base = record.message.correction().unwrap_or(0.0);
                record.message.with_correction(base + residence)
            }
            CorrectionAction::PassThrough => record.message,
        };

        let encoded = out_message.encode();
        match record.out {
            OutLink::Upstream => up_writer.send_message(&encoded).await?,
            OutLink::Downstream(idx) => down_writers[idx].send_message(&encoded).await?,
        };
        Ok(())
    }
}
