//! Matcher configuration. Bad values are rejected up front; a matcher that
//! starts is guaranteed usable deadlines and a sane solver setup.

use std::time::Duration;

use anyhow::{bail, Result};
use roadnet::geo::{DistDbl, DistInt};

use crate::model::SimlTime;

#[derive(Debug, Clone)]
pub struct MatchConfig {
    /// Seconds of simulated time between batches.
    pub batch_time: SimlTime,
    /// Spatial filter for RV and RR edges, meters.
    pub range_m: DistDbl,
    /// Keep at most this many cheapest customers per vehicle in the RV graph.
    pub top_cust: usize,
    /// Ceiling on the total number of RTV edges per batch.
    pub trip_max: usize,
    /// Wall-clock budget for the RV phase.
    pub timeout_rv_ms: u64,
    /// Wall-clock budget for the RTV phase.
    pub timeout_rtv_ms: u64,
    /// Wall-clock limit handed to the ILP solver.
    pub solver_tm_lim_ms: u64,
    /// Relative optimality gap accepted from the solver.
    pub solver_gap: f64,
    /// Flat penalty for leaving a customer unserved; values <= 0 fall back to
    /// the customer's base cost.
    pub unassign_penalty: DistInt,
    /// Nominal vehicle speed, meters per simulated second.
    pub speed_mps: f64,
}

impl Default for MatchConfig {
    fn default() -> Self {
        MatchConfig {
            batch_time: 30,
            range_m: 2000.0,
            top_cust: 30,
            trip_max: 15_000,
            // both graph phases default to half the batch interval
            timeout_rv_ms: 15_000,
            timeout_rtv_ms: 15_000,
            solver_tm_lim_ms: 15_000,
            solver_gap: 0.001,
            unassign_penalty: 1_000_000,
            speed_mps: 10.0,
        }
    }
}

impl MatchConfig {
    pub fn validate(&self) -> Result<()> {
        if self.batch_time <= 0 {
            bail!("batch_time must be positive (got {})", self.batch_time);
        }
        if !(self.range_m > 0.0) {
            bail!("range_m must be positive (got {})", self.range_m);
        }
        if self.top_cust == 0 {
            bail!("top_cust must be at least 1");
        }
        if self.trip_max == 0 {
            bail!("trip_max must be at least 1");
        }
        if !(self.speed_mps > 0.0) {
            bail!("speed_mps must be positive (got {})", self.speed_mps);
        }
        if !(self.solver_gap >= 0.0) || !self.solver_gap.is_finite() {
            bail!("solver_gap must be finite and non-negative (got {})", self.solver_gap);
        }
        Ok(())
    }

    pub fn timeout_rv(&self) -> Duration {
        Duration::from_millis(self.timeout_rv_ms)
    }

    pub fn timeout_rtv(&self) -> Duration {
        Duration::from_millis(self.timeout_rtv_ms)
    }

    pub fn solver_tm_lim(&self) -> Duration {
        Duration::from_millis(self.solver_tm_lim_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        MatchConfig::default().validate().unwrap();
    }

    #[test]
    fn bad_configs_fail_at_init() {
        let mut cfg = MatchConfig::default();
        cfg.batch_time = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = MatchConfig::default();
        cfg.range_m = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = MatchConfig::default();
        cfg.solver_gap = f64::NAN;
        assert!(cfg.validate().is_err());

        let mut cfg = MatchConfig::default();
        cfg.speed_mps = 0.0;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn zero_timeouts_are_legal() {
        // a zero phase budget is a valid (if aggressive) setting: the phase
        // simply contributes nothing
        let mut cfg = MatchConfig::default();
        cfg.timeout_rv_ms = 0;
        cfg.timeout_rtv_ms = 0;
        cfg.validate().unwrap();
    }
}
