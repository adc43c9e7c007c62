//! Slave-side offset and one-way-delay estimation (spec.md §4.3 step 7).
//!
//! A slave's clock offset is derived from the classic PTP four-timestamp
//! exchange, generalized here to subtract out whatever residence
//! correction the switches along the path accumulated:
//!
//! ```text
//! one_way_delay = ((T2' - T1 - sync_correction) + (T4 - T3' - delay_correction)) / 2
//! offset        = ((T2' - T1 - sync_correction) - (T4 - T3' - delay_correction)) / 2
//! ```
//!
//! where `T2'`/`T3'` already have the slave's simulated clock drift
//! folded in (spec.md §4.3 steps 2 and 4).

use crate::timestamp::Timestamp;

/// The outcome of one completed sync/follow-up/delay-req/delay-resp round.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoundResult {
    /// The slave's computed clock offset relative to the grandmaster.
    pub offset: f64,
    /// The slave's computed mean one-way propagation delay.
    pub one_way_delay: f64,
}

/// Compute offset and one-way delay from the four round timestamps.
///
/// `t2` and `t3` are expected to already carry the round's drift applied
/// (`T2'`/`T3'` in spec.md's notation); `t1`/`t4` are the grandmaster's
/// unmodified send/receive times.
#[must_use]
pub fn compute_round(
    t1: Timestamp,
    t2_drifted: Timestamp,
    sync_correction: f64,
    t3_drifted: Timestamp,
    t4: Timestamp,
    delay_correction: f64,
) -> RoundResult {
    let sync_leg = t2_drifted.diff_secs(t1) - sync_correction;
    let delay_leg = t4.diff_secs(t3_drifted) - delay_correction;
    RoundResult {
        offset: (sync_leg - delay_leg) / 2.0,
        one_way_delay: (sync_leg + delay_leg) / 2.0,
    }
}

/// Running history of `|true_drift - computed_offset|` across rounds
/// (spec.md §3 "Per-slave drift history"). Used only to report a
/// diagnostic running mean error; it has no effect on the protocol.
#[derive(Debug, Clone, Default)]
pub struct DriftErrorHistory {
    errors: Vec<f64>,
}

impl DriftErrorHistory {
    /// An empty history.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append this round's absolute drift error and return the new
    /// running mean.
    pub fn record(&mut self, true_drift: f64, computed_offset: f64) -> f64 {
        self.errors.push((true_drift - computed_offset).abs());
        self.mean_error()
    }

    /// The mean of all recorded errors so far. Zero on an empty history.
    #[must_use]
    pub fn mean_error(&self) -> f64 {
        if self.errors.is_empty() {
            return 0.0;
        }
        self.errors.iter().sum::<f64>() / self.errors.len() as f64
    }

    /// Number of rounds recorded.
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Whether any round has been recorded yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        // spec.md §8 "correction accuracy": as long as the correction
        // fields exactly equal the residence a switch added, the offset
        // computation is invariant to how much residence landed on the
        // sync leg versus the delay leg.
        #[test]
        fn correction_cancels_arbitrary_residence_split(
            base_delay in 0.0f64..5.0,
            residence_sync in 0.0f64..2.0,
            residence_delay in 0.0f64..2.0,
        ) {
            let t1 = Timestamp::from_secs_f64(1_000.0);
            let t2 = t1.plus_secs(base_delay + residence_sync);
            let t3 = Timestamp::from_secs_f64(2_000.0);
            let t4 = t3.plus_secs(base_delay + residence_delay);

            let result = compute_round(t1, t2, residence_sync, t3, t4, residence_delay);
            prop_assert!(result.offset.abs() < 1e-6);
            prop_assert!((result.one_way_delay - base_delay).abs() < 1e-6);
        }
    }
}
