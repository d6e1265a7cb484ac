//! Batch counters and per-customer delay tracking.
//!
//! A customer enters the delay table the first batch it goes unserved and
//! leaves it when a commit finally succeeds; the elapsed simulated time is
//! accumulated so the end-of-run summary can report mean wait.

use crate::model::{CustId, SimlTime};
use crate::Map;

#[derive(Debug, Default)]
pub struct Statistics {
    pub n_batches: usize,
    pub n_matched: usize,
    pub n_rejected: usize,
    delay: Map<CustId, SimlTime>,
    total_delay: i64,
    n_resolved: usize,
}

impl Statistics {
    /// Start (or keep) the delay clock for a customer left unserved.
    pub fn beg_delay(&mut self, cust: CustId, now: SimlTime) {
        self.delay.entry(cust).or_insert(now);
    }

    /// Stop the delay clock after a successful commit.
    pub fn end_delay(&mut self, cust: CustId, now: SimlTime) {
        if let Some(begun) = self.delay.remove(&cust) {
            self.total_delay += (now - begun) as i64;
            self.n_resolved += 1;
        }
    }

    pub fn n_delayed(&self) -> usize {
        self.delay.len()
    }

    pub fn is_delayed(&self, cust: CustId) -> bool {
        self.delay.contains_key(&cust)
    }

    pub fn mean_delay(&self) -> f64 {
        if self.n_resolved == 0 {
            return 0.0;
        }
        self.total_delay as f64 / self.n_resolved as f64
    }

    pub fn dump(&self) -> json::JsonValue {
        json::object! {
            batches: self.n_batches,
            matched: self.n_matched,
            rejected: self.n_rejected,
            still_delayed: self.n_delayed(),
            mean_delay_s: self.mean_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_clock_survives_repeat_batches() {
        let mut stats = Statistics::default();
        let c = CustId::new(1);
        stats.beg_delay(c, 30);
        stats.beg_delay(c, 60); // second unserved batch must not reset the clock
        assert!(stats.is_delayed(c));
        stats.end_delay(c, 90);
        assert!(!stats.is_delayed(c));
        assert_eq!(stats.mean_delay(), 60.0);
    }

    #[test]
    fn end_without_begin_is_a_noop() {
        let mut stats = Statistics::default();
        stats.end_delay(CustId::new(9), 10);
        assert_eq!(stats.mean_delay(), 0.0);
        assert_eq!(stats.n_delayed(), 0);
    }

    #[test]
    fn summary_shape() {
        let mut stats = Statistics::default();
        stats.n_batches = 2;
        stats.n_matched = 3;
        stats.beg_delay(CustId::new(1), 0);
        let s = stats.dump();
        assert_eq!(s["batches"], 2);
        assert_eq!(s["matched"], 3);
        assert_eq!(s["still_delayed"], 1);
    }
}
