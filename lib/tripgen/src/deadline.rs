//! Phase-scoped wall-clock deadlines with cooperative cancellation.
//!
//! Workers poll at outer-loop iteration boundaries. The first worker to see
//! the budget exhausted trips a latch; peers observe the latch at their next
//! boundary, finish the iteration in flight and converge on the join barrier
//! with partial results intact. Expiry is never an error.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::*;

#[derive(Debug)]
pub struct Deadline {
  expiry: Instant,
  tripped: AtomicBool,
}

impl Deadline {
  pub fn after(budget: Duration) -> Deadline {
    return Deadline {
      expiry: Instant::now() + budget,
      tripped: AtomicBool::new(false),
    };
  }

  /// True once the budget is exhausted. Latches, so peers skip the clock read
  /// after the first observation.
  pub fn poll(&self) -> bool {
    if self.tripped.load(Ordering::Relaxed) {
      return true;
    }
    if Instant::now() >= self.expiry {
      if !self.tripped.swap(true, Ordering::Relaxed) {
        debug!("phase deadline expired, cancelling remaining iterations");
      }
      return true;
    }
    return false;
  }

  /// Whether any worker observed expiry.
  pub fn expired(&self) -> bool {
    self.tripped.load(Ordering::Relaxed)
  }
}
