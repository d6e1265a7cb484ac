//! RTV graph: feasibility edges between vehicles and candidate shared trips
//! of increasing size.
//!
//! Enumeration is parallel across vehicles with worker-local accumulators.
//! Trip registration and the schedule/route tables sit behind one mutex, so
//! id allocation is race-free and idempotent on set equality. Worker results
//! are merged under a single critical section with a best-effort ceiling on
//! the total edge count.

use std::sync::Mutex;

use rayon::prelude::*;
use tracing::*;

use roadnet::geo::{haversine, DistInt};
use roadnet::{SpIndex, SpView, Wayp};

use crate::config::MatchConfig;
use crate::deadline::Deadline;
use crate::model::{CustId, SharedTrip, SharedTripId, SimlTime, Stop, Vehicle, VehlId};
use crate::rv::RvGraph;
use crate::sop::travel;
use crate::{Map, Set};

/// Canonical set key of a trip: sorted, deduplicated customer ids.
pub fn trip_key(trip: &SharedTrip) -> Vec<CustId> {
  let mut key: Vec<CustId> = trip.iter().map(|c| c.id).collect();
  key.sort_unstable();
  key.dedup();
  return key;
}

/// Batch-local registry mapping shared trips to stable ids.
#[derive(Debug, Default)]
pub struct TripRegistry {
  next: u32,
  by_key: Map<Vec<CustId>, SharedTripId>,
  trips: Map<SharedTripId, SharedTrip>,
  cted: Map<CustId, Vec<SharedTripId>>,
}

impl TripRegistry {
  /// Registering the same customer set twice returns the same id. The id
  /// counter is the pipeline's only globally monotonic allocator and is
  /// always called inside the phase critical section.
  pub fn add_trip(&mut self, trip: &SharedTrip) -> SharedTripId {
    let key = trip_key(trip);
    if let Some(&stid) = self.by_key.get(&key) {
      return stid;
    }
    self.next += 1;
    let stid = SharedTripId::new(self.next);
    let mut canonical = trip.clone();
    canonical.sort_by_key(|c| c.id);
    canonical.dedup_by_key(|c| c.id);
    for cust in &canonical {
      self.cted.entry(cust.id).or_default().push(stid);
    }
    self.by_key.insert(key, stid);
    self.trips.insert(stid, canonical);
    return stid;
  }

  pub fn get(&self, stid: SharedTripId) -> &SharedTrip {
    match self.trips.get(&stid) {
      Some(trip) => trip,
      None => {
        error!(%stid, "unknown trip id");
        panic!("bug - trip id not in registry");
      }
    }
  }

  /// Trips containing the given customer.
  pub fn trips_for(&self, cust: CustId) -> &[SharedTripId] {
    self.cted.get(&cust).map(|v| v.as_slice()).unwrap_or(&[])
  }

  pub fn len(&self) -> usize {
    self.trips.len()
  }

  pub fn is_empty(&self) -> bool {
    self.trips.is_empty()
  }
}

#[derive(Debug, Default)]
pub struct RtvGraph {
  /// Insertion cost per (vehicle, trip) edge.
  pub vted: Map<VehlId, Map<SharedTripId, DistInt>>,
  pub sch: Map<VehlId, Map<SharedTripId, Vec<Stop>>>,
  pub rte: Map<VehlId, Map<SharedTripId, Vec<Wayp>>>,
  /// Candidate vehicles as they looked when the batch started.
  pub vehmap: Map<VehlId, Vehicle>,
  pub registry: TripRegistry,
  /// Edges discarded by the `trip_max` ceiling.
  pub dropped: usize,
}

impl RtvGraph {
  pub fn num_edges(&self) -> usize {
    self.vted.values().map(|m| m.len()).sum()
  }
}

#[derive(Debug, Default)]
struct SharedTables {
  registry: TripRegistry,
  sch: Map<VehlId, Map<SharedTripId, Vec<Stop>>>,
  rte: Map<VehlId, Map<SharedTripId, Vec<Wayp>>>,
  vehmap: Map<VehlId, Vehicle>,
}

#[derive(Debug, Default)]
struct MergedEdges {
  vted: Map<VehlId, Map<SharedTripId, DistInt>>,
  nvted: usize,
  dropped: usize,
}

#[instrument(level = "info", name = "build_rtv_graph", skip_all, fields(num_vehls = vehls.len()))]
pub fn build(
  vehls: &[Vehicle],
  rv: &RvGraph,
  sp: &SpIndex,
  now: SimlTime,
  cfg: &MatchConfig,
  deadline: &Deadline,
) -> RtvGraph {
  let shared = Mutex::new(SharedTables::default());
  let merged = Mutex::new(MergedEdges::default());

  vehls.par_iter().for_each_init(
    || sp.view(),
    |lcl_sp, vehl| {
      if vehl.remaining_capacity() <= 0 {
        return; // assigned to full
      }
      if deadline.poll() {
        return;
      }
      {
        let mut s = shared.lock().expect("rtv tables poisoned");
        s.vehmap.insert(vehl.id, vehl.clone());
      }

      let lcl_vted = enumerate_vehicle(vehl, rv, lcl_sp, now, cfg, deadline, &shared);
      if lcl_vted.is_empty() {
        return;
      }

      // cross-thread merge; past the ceiling further edges are dropped, not
      // an error
      let mut m = merged.lock().expect("rtv merge poisoned");
      for (stid, cst) in lcl_vted {
        if m.nvted >= cfg.trip_max {
          m.dropped += 1;
          continue;
        }
        m.vted.entry(vehl.id).or_default().insert(stid, cst);
        m.nvted += 1;
      }
    },
  );

  let tables = shared.into_inner().expect("rtv tables poisoned");
  let merged = merged.into_inner().expect("rtv merge poisoned");
  if merged.dropped > 0 {
    warn!(dropped = merged.dropped, cap = cfg.trip_max, "rtv edge ceiling hit");
  }
  info!(
    trips = tables.registry.len(),
    edges = merged.nvted,
    timed_out = deadline.expired(),
    "rtv graph built"
  );
  return RtvGraph {
    vted: merged.vted,
    sch: tables.sch,
    rte: tables.rte,
    vehmap: tables.vehmap,
    registry: tables.registry,
    dropped: merged.dropped,
  };
}

/// Union of two trips, deduplicated and in canonical order so that repeated
/// evaluations of the same customer set always see the same insertion order.
fn merge_trips(a: &SharedTrip, b: &SharedTrip) -> SharedTrip {
  let mut out = a.clone();
  for cust in b {
    if !out.iter().any(|c| c.id == cust.id) {
      out.push(*cust);
    }
  }
  out.sort_by_key(|c| c.id);
  return out;
}

fn enumerate_vehicle(
  vehl: &Vehicle,
  rv: &RvGraph,
  sp: &SpView,
  now: SimlTime,
  cfg: &MatchConfig,
  deadline: &Deadline,
  shared: &Mutex<SharedTables>,
) -> Map<SharedTripId, DistInt> {
  let mut lcl_vted: Map<SharedTripId, DistInt> = Map::default();
  let mut lcl_trip: Map<SharedTripId, SharedTrip> = Map::default();
  let mut tripk: Map<usize, Vec<SharedTripId>> = Map::default();

  // Trips of size 1: one per surviving rv pair. No rv pairs, nothing to do.
  let singles = match rv.rv.get(&vehl.id) {
    Some(cc) => cc,
    None => return lcl_vted,
  };
  for cust in singles {
    let trip: SharedTrip = vec![*cust];
    let stid = {
      let mut s = shared.lock().expect("rtv tables poisoned");
      let stid = s.registry.add_trip(&trip);
      s.sch
        .entry(vehl.id)
        .or_default()
        .insert(stid, rv.sch[&vehl.id][&cust.id].clone());
      s.rte
        .entry(vehl.id)
        .or_default()
        .insert(stid, rv.rte[&vehl.id][&cust.id].clone());
      stid
    };
    if lcl_vted.insert(stid, rv.cst[&vehl.id][&cust.id]).is_none() {
      lcl_trip.insert(stid, trip);
      tripk.entry(1).or_default().push(stid);
    }
  }
  if deadline.poll() {
    return lcl_vted;
  }

  if vehl.remaining_capacity() <= 1 {
    return lcl_vted;
  }
  let lvn_pt = sp.network().node2pt(vehl.last_visited_node());

  // Trips of size 2, two sources:
  // 1) joinable pairs of accepted size-1 trips; each candidate is evaluated
  //    as exactly the pair {a, b}
  let singles_ids = tripk.get(&1).cloned().unwrap_or_default();
  for (ka, &id_a) in singles_ids.iter().enumerate() {
    if deadline.poll() {
      return lcl_vted;
    }
    for &id_b in &singles_ids[ka + 1..] {
      let shtrip = merge_trips(&lcl_trip[&id_a], &lcl_trip[&id_b]);
      if haversine(lvn_pt, sp.network().node2pt(shtrip[0].orig)) > cfg.range_m {
        continue;
      }
      try_accept(vehl, shtrip, 2, sp, now, cfg, shared, &mut lcl_vted, &mut lcl_trip, &mut tripk);
    }
  }

  // 2) request-request edges served directly by this vehicle
  for (aid, bs) in &rv.rr {
    if deadline.poll() {
      return lcl_vted;
    }
    let cust_a = rv.custmap[aid];
    if haversine(lvn_pt, sp.network().node2pt(cust_a.orig)) > cfg.range_m {
      continue;
    }
    for cust_b in bs {
      let shtrip = merge_trips(&vec![cust_a], &vec![*cust_b]);
      try_accept(vehl, shtrip, 2, sp, now, cfg, shared, &mut lcl_vted, &mut lcl_trip, &mut tripk);
    }
  }

  // Trips of size k >= 3, while capacity lasts and level k-1 is non-empty
  let mut k = 3usize;
  while vehl.remaining_capacity() as usize >= k
    && tripk.get(&(k - 1)).map_or(false, |t| !t.is_empty())
  {
    let prev = tripk[&(k - 1)].clone();
    let prev_keys: Set<Vec<CustId>> = prev.iter().map(|id| trip_key(&lcl_trip[id])).collect();
    for (ka, &id_a) in prev.iter().enumerate() {
      if deadline.poll() {
        return lcl_vted;
      }
      for &id_b in &prev[ka + 1..] {
        let shtrip = merge_trips(&lcl_trip[&id_a], &lcl_trip[&id_b]);
        if shtrip.len() != k {
          continue;
        }
        // apriori: only evaluate when every size k-1 subset is accepted
        let key = trip_key(&shtrip);
        let all_ok = (0..k).all(|p| {
          let mut sub = key.clone();
          sub.remove(p);
          prev_keys.contains(&sub)
        });
        if !all_ok {
          continue;
        }
        try_accept(vehl, shtrip, k, sp, now, cfg, shared, &mut lcl_vted, &mut lcl_trip, &mut tripk);
      }
    }
    k += 1;
  }

  return lcl_vted;
}

fn try_accept(
  vehl: &Vehicle,
  shtrip: SharedTrip,
  k: usize,
  sp: &SpView,
  now: SimlTime,
  cfg: &MatchConfig,
  shared: &Mutex<SharedTables>,
  lcl_vted: &mut Map<SharedTripId, DistInt>,
  lcl_trip: &mut Map<SharedTripId, SharedTrip>,
  tripk: &mut Map<usize, Vec<SharedTripId>>,
) {
  if let Some((cst, sch, rte)) = travel(vehl, &shtrip, sp, now, cfg.speed_mps) {
    let stid = {
      let mut s = shared.lock().expect("rtv tables poisoned");
      let stid = s.registry.add_trip(&shtrip);
      s.sch.entry(vehl.id).or_default().insert(stid, sch);
      s.rte.entry(vehl.id).or_default().insert(stid, rte);
      stid
    };
    if lcl_vted.insert(stid, cst).is_none() {
      lcl_trip.insert(stid, shtrip);
      tripk.entry(k).or_default().push(stid);
    }
  }
}
