//! Runs the demo topology (`GM → A → {B → {D,E}, C → {F, G → {H,I,J}}}`)
//! until a node fails.

use ptp_sim::{SimConfig, Topology};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let topology = Topology::demo();
    ptp_sim::runner::run(topology, SimConfig::default()).await?;
    Ok(())
}
