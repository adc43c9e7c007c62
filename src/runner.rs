//! Topology bootstrap and the whole-process runner (spec.md §4.5 /
//! "topology bootstrap" in the dependency order of §2).
//!
//! Builds the immutable topology, binds every listener up front, spawns
//! one task per node (spec.md §5: nodes model physically independent
//! devices, one concurrent unit of execution each), and runs until the
//! first one fails. There is no supervisory layer (spec.md §7): a node's
//! peers will simply fail on their next socket operation and terminate in
//! turn.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::select_all;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::config::SimConfig;
use crate::error::SimError;
use crate::node::grandmaster::GrandMaster;
use crate::node::slave::Slave;
use crate::node::switch::Switch;
use crate::topology::{Role, Topology};

/// Spawn every node in `topology` as its own task and drive them until
/// the first one terminates, propagating that node's error.
pub async fn run(topology: Topology, config: SimConfig) -> Result<(), SimError> {
    let topology = Arc::new(topology);

    // Bind every listener synchronously, before any node task is spawned.
    // The original Python binds+listens in each node's constructor, in
    // the main thread, before any thread starts (`nodes/grandmaster.py`,
    // `nodes/switch.py`) — a child's connect() can therefore never race
    // an unbound parent socket. Doing every bind here, sequentially, on
    // the runner's own task preserves that guarantee under tokio's
    // multi-threaded runtime, where spawned tasks may otherwise start
    // running (and dialing out) on a different OS thread before their
    // parent's own task gets around to binding.
    let mut listeners: HashMap<String, TcpListener> = HashMap::new();
    for node in topology.nodes() {
        if let Some(port) = node.listen_port {
            let listener = TcpListener::bind(("0.0.0.0", port))
                .await
                .map_err(|source| SimError::Io { node: node.name.clone(), source })?;
            info!(node = %node.name, port, "listening");
            listeners.insert(node.name.clone(), listener);
        }
    }

    let mut tasks: Vec<JoinHandle<Result<(), SimError>>> = Vec::new();
    for node in topology.nodes() {
        let name = node.name.clone();
        let topology = Arc::clone(&topology);
        match node.role {
            Role::GrandMaster => {
                let listener = listeners
                    .remove(&name)
                    .expect("grandmaster was bound in the pre-spawn pass above");
                tasks.push(tokio::spawn(GrandMaster::new(name, topology, config, listener).run()));
            }
            Role::Switch => {
                let listener = listeners
                    .remove(&name)
                    .expect("switch was bound in the pre-spawn pass above");
                tasks.push(tokio::spawn(Switch::new(name, topology, config, listener).run()));
            }
            Role::Slave => {
                tasks.push(tokio::spawn(Slave::new(name, topology, config).run()));
            }
        }
    }

    if tasks.is_empty() {
        return Ok(());
    }

    let (result, _index, remaining) = select_all(tasks).await;
    for handle in remaining {
        handle.abort();
    }

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => {
            error!(error = %err, "node terminated");
            Err(err)
        }
        Err(join_err) => {
            error!(error = %join_err, "node task panicked");
            Err(SimError::Io {
                node: "runner".to_string(),
                source: std::io::Error::other(join_err.to_string()),
            })
        }
    }
}
