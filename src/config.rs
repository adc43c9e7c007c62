//! Static simulation parameters (spec.md §6 "Configuration").
//!
//! Everything here is fixed before the topology starts running; nothing
//! in this module is mutated once a node's task begins its steady-state
//! loop.

use std::time::Duration;

/// Tunable parameters shared by every node in a run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimConfig {
    /// Interval between grandmaster sync rounds. Default 10s (spec.md
    /// §4.2).
    pub sync_period: Duration,
    /// Delay between sending `sync` and the paired `follow_up`, so they
    /// don't arrive coalesced in one read. Default 0.25s (spec.md §4.2).
    pub sync_follow_up_gap: Duration,
    /// How long the grandmaster waits after accepting all downstream
    /// connections before starting steady state, so every peer finishes
    /// its own bootstrap first. Default 1s (spec.md §4.2).
    pub startup_delay: Duration,
    /// Inclusive bounds `[min, max]` of the switch's per-message
    /// artificial residence delay, in seconds. Default `[0.5, 1.0]`
    /// (spec.md §4.4.1).
    pub residence_delay_bounds: (f64, f64),
    /// Inclusive bounds `[min, max]` of a slave's true clock drift for a
    /// single round, in seconds. Default `[-1.0, 1.0]` (spec.md §4.3).
    pub drift_bounds: (f64, f64),
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            sync_period: Duration::from_secs(10),
            sync_follow_up_gap: Duration::from_millis(250),
            startup_delay: Duration::from_secs(1),
            residence_delay_bounds: (0.5, 1.0),
            drift_bounds: (-1.0, 1.0),
        }
    }
}

impl SimConfig {
    /// A config with every timing parameter shortened, for use in tests
    /// that need several rounds to complete quickly.
    #[must_use]
    pub fn fast_for_tests() -> Self {
        Self {
            sync_period: Duration::from_millis(200),
            sync_follow_up_gap: Duration::from_millis(20),
            startup_delay: Duration::from_millis(50),
            residence_delay_bounds: (0.001, 0.003),
            drift_bounds: (-1.0, 1.0),
        }
    }

    /// Sample a residence delay uniformly from
    /// [`residence_delay_bounds`](Self::residence_delay_bounds).
    #[must_use]
    pub fn sample_residence_delay(&self) -> f64 {
        let (lo, hi) = self.residence_delay_bounds;
        rand::Rng::gen_range(&mut rand::thread_rng(), lo..=hi)
    }

    /// Sample a true clock drift uniformly from
    /// [`drift_bounds`](Self::drift_bounds).
    #[must_use]
    pub fn sample_drift(&self) -> f64 {
        let (lo, hi) = self.drift_bounds;
        rand::Rng::gen_range(&mut rand::thread_rng(), lo..=hi)
    }
}
