//! # ptp-sim
//!
//! A didactic simulator of the Precision Time Protocol over a rooted
//! tree of TCP nodes: one grandmaster, zero or more transparent-clock
//! switches, and slave leaves that estimate their clock offset.
//!
//! ## Example
//!
//! ```rust,no_run
//! use ptp_sim::{SimConfig, Topology};
//!
//! # async fn example() -> Result<(), ptp_sim::SimError> {
//! let topology = Topology::demo();
//! ptp_sim::runner::run(topology, SimConfig::default()).await
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

/// Slave-side offset and one-way-delay estimation.
pub mod clock;
/// Static simulation parameters.
pub mod config;
/// Error types.
pub mod error;
/// Framed-message I/O primitive.
pub mod io;
/// Wire message types, parsing, and encoding.
pub mod message;
/// The three node roles and their bootstrap/multiplexing plumbing.
pub mod node;
/// Topology bootstrap and the whole-process runner.
pub mod runner;
/// Wall-clock timestamps.
pub mod timestamp;
/// Immutable tree topology.
pub mod topology;

pub use config::SimConfig;
pub use error::SimError;
pub use topology::{NodeSpec, Role, Topology};
