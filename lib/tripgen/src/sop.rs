//! Single-stop insertion oracle.
//!
//! `sop_insert` finds the cheapest way to splice one customer's pickup and
//! dropoff into a vehicle's remaining schedule without reordering existing
//! stops. `travel` applies it customer by customer, validating time windows
//! after every step; one rejected customer makes the whole trip infeasible.

use tracing::*;

use roadnet::geo::DistInt;
use roadnet::{SpView, Wayp};

use crate::model::{Customer, SimlTime, Stop, StopType, Vehicle};

/// Cheapest insertion of `cust` into `mvehl`'s remaining schedule. Existing
/// stop order is preserved, the pickup precedes the dropoff, and the vehicle
/// destination stays last. Time windows are NOT checked here; see [`chktw`].
///
/// Returns the candidate schedule, the rebuilt route from the vehicle's last
/// visited node, and the cost delta versus the current remaining route.
pub fn sop_insert(mvehl: &Vehicle, cust: &Customer, sp: &SpView) -> (Vec<Stop>, Vec<Wayp>, DistInt) {
  let sch = &mvehl.schedule;
  let n = sch.len();
  debug_assert!(n >= 1 && sch[n - 1].ty == StopType::VehlDest);
  let base = mvehl.remaining_route_cost();
  let start = mvehl.last_visited_node();

  let pickup = Stop::cust_orig(cust);
  let dropoff = Stop::cust_dest(cust);

  let mut best: Option<(DistInt, Vec<Stop>, Vec<Wayp>)> = None;
  for i in 0..n {
    for j in i..n {
      let mut cand = Vec::with_capacity(n + 2);
      cand.extend_from_slice(&sch[..i]);
      cand.push(pickup);
      cand.extend_from_slice(&sch[i..j]);
      cand.push(dropoff);
      cand.extend_from_slice(&sch[j..]);

      let mut nodes = Vec::with_capacity(cand.len() + 1);
      nodes.push(start);
      nodes.extend(cand.iter().map(|s| s.loc));
      let (cost, rte) = sp.route_through(&nodes);

      if best.as_ref().map_or(true, |(c, _, _)| cost < *c) {
        best = Some((cost, cand, rte));
      }
    }
  }

  // n >= 1, so at least the (0, 0) placement was evaluated
  let (cost, sch_out, rte_out) = best.unwrap();
  return (sch_out, rte_out, cost - base);
}

/// Walk the schedule along the route and check every stop's late bound at
/// nominal speed. Early pickups are allowed (the rider boards on arrival).
pub fn chktw(sch: &[Stop], rte: &[Wayp], now: SimlTime, speed_mps: f64) -> bool {
  let mut k = 0usize;
  for stop in sch {
    while k < rte.len() && rte[k].1 != stop.loc {
      k += 1;
    }
    if k == rte.len() {
      error!(?stop, "schedule stop is not on the route");
      panic!("bug - schedule/route mismatch");
    }
    let eta = now + (rte[k].0 as f64 / speed_mps).ceil() as SimlTime;
    if eta > stop.late {
      trace!(?stop, eta, "time window violated");
      return false;
    }
  }
  return true;
}

/// The insertion oracle: serve `custs` (in order) with `vehl`.
///
/// Works on a private copy of the vehicle; each accepted insertion is
/// committed to the copy and the route cursor reset before the next customer
/// goes in. The reported cost is the route distance added by the whole
/// insertion. `None` means some customer cannot be served within the windows.
pub fn travel(
  vehl: &Vehicle,
  custs: &[Customer],
  sp: &SpView,
  now: SimlTime,
  speed_mps: f64,
) -> Option<(DistInt, Vec<Stop>, Vec<Wayp>)> {
  let mut mvehl = vehl.clone();
  let mut cstsum: DistInt = 0;
  for cust in custs {
    let (schctr, rtectr, delta) = sop_insert(&mvehl, cust, sp);
    if !chktw(&schctr, &rtectr, now, speed_mps) {
      return None;
    }
    cstsum += delta;
    mvehl.schedule = schctr;
    mvehl.route = rtectr;
    mvehl.reset_lvn();
  }
  return Some((cstsum, mvehl.schedule, mvehl.route));
}
