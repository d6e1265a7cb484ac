//! RV graph: pairwise feasibility between requests and vehicles (R-V edges)
//! and between requests (R-R edges).
//!
//! Built in parallel across customers. Each worker owns a private
//! shortest-path view and a snapshot of the spatial index; results are
//! appended to the shared tables inside short critical sections. Reads happen
//! only after the join. A wall-clock deadline cancels the phase
//! cooperatively, keeping whatever edges were found.

use std::sync::Mutex;

use rayon::prelude::*;
use tracing::*;

use roadnet::geo::{haversine, DistInt};
use roadnet::{SpIndex, Wayp};

use crate::config::MatchConfig;
use crate::deadline::Deadline;
use crate::grid::Grid;
use crate::model::{CustId, Customer, SimlTime, Stop, Vehicle, VehlId};
use crate::sop::travel;
use crate::Map;

#[derive(Debug, Default)]
pub struct RvGraph {
  /// Insertion cost of customer c into vehicle v, meters of added route.
  pub cst: Map<VehlId, Map<CustId, DistInt>>,
  pub sch: Map<VehlId, Map<CustId, Vec<Stop>>>,
  pub rte: Map<VehlId, Map<CustId, Vec<Wayp>>>,
  /// Directed R-R edges: b appears under a when a virtual vehicle carrying
  /// only a can still serve b.
  pub rr: Map<CustId, Vec<Customer>>,
  /// Per vehicle, the cheapest feasible customers after pruning.
  pub rv: Map<VehlId, Vec<Customer>>,
  /// Customers visited by the builder; these become ILP columns.
  pub matchable: Vec<CustId>,
  /// Snapshot of every visited customer, for id lookups downstream.
  pub custmap: Map<CustId, Customer>,
}

#[instrument(level = "info", name = "build_rv_graph", skip_all, fields(num_custs = custs.len()))]
pub fn build(
  custs: &[Customer],
  grid: &Grid,
  sp: &SpIndex,
  now: SimlTime,
  cfg: &MatchConfig,
  deadline: &Deadline,
) -> RvGraph {
  let shared = Mutex::new(RvGraph::default());

  custs.par_iter().for_each_init(
    || (sp.view(), grid.clone()),
    |(lcl_sp, lcl_grid), cust_a| {
      if deadline.poll() {
        return;
      }
      {
        let mut g = shared.lock().expect("rv tables poisoned");
        g.matchable.push(cust_a.id);
        g.custmap.insert(cust_a.id, *cust_a);
      }

      // R-V edges: vehicles with spare seats near the pickup
      let orig_pt = lcl_sp.network().node2pt(cust_a.orig);
      for cand in lcl_grid.within(cfg.range_m, orig_pt) {
        if cand.remaining_capacity() <= 0 {
          continue;
        }
        if let Some((cst, sch, rte)) = travel(cand, &[*cust_a], lcl_sp, now, cfg.speed_mps) {
          let mut g = shared.lock().expect("rv tables poisoned");
          g.cst.entry(cand.id).or_default().insert(cust_a.id, cst);
          g.sch.entry(cand.id).or_default().insert(cust_a.id, sch);
          g.rte.entry(cand.id).or_default().insert(cust_a.id, rte);
        }
      }

      if deadline.poll() {
        return;
      }

      // R-R edges: wrap cust_a in a virtual single-rider vehicle and test
      // every other waiting customer against it
      let dest_pt = lcl_sp.network().node2pt(cust_a.dest);
      let vtvehl = Vehicle::virtual_from(cust_a);
      for cust_b in custs {
        if cust_b.id == cust_a.id {
          continue;
        }
        if haversine(orig_pt, lcl_sp.network().node2pt(cust_b.orig)) > cfg.range_m {
          continue;
        }
        if haversine(dest_pt, lcl_sp.network().node2pt(cust_b.dest)) > cfg.range_m {
          continue;
        }
        if travel(&vtvehl, &[*cust_b], lcl_sp, now, cfg.speed_mps).is_some() {
          let mut g = shared.lock().expect("rv tables poisoned");
          g.rr.entry(cust_a.id).or_default().push(*cust_b);
        }
      }
    },
  );

  let mut graph = shared.into_inner().expect("rv tables poisoned");
  prune(&mut graph, cfg.top_cust);
  info!(
    rv_edges = graph.cst.values().map(|m| m.len()).sum::<usize>(),
    rr_edges = graph.rr.values().map(|v| v.len()).sum::<usize>(),
    matchable = graph.matchable.len(),
    timed_out = deadline.expired(),
    "rv graph built"
  );
  return graph;
}

/// Keep only the `topk` cheapest feasible customers per vehicle; vehicles
/// with fewer keep them all. Ties are broken arbitrarily.
fn prune(graph: &mut RvGraph, topk: usize) {
  let RvGraph { cst, rv, custmap, .. } = graph;
  for (&vid, costs) in cst.iter() {
    let mut cc: Vec<(CustId, DistInt)> = costs.iter().map(|(&c, &d)| (c, d)).collect();
    if cc.len() > topk {
      cc.select_nth_unstable_by_key(topk, |&(_, d)| d);
      cc.truncate(topk);
    }
    rv.insert(vid, cc.iter().map(|(c, _)| custmap[c]).collect());
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testutil::{cust, ring, toy_cfg, vehl};
  use std::time::Duration;

  fn grid_with(net: &roadnet::RoadNetwork, vehls: &[Vehicle]) -> Grid {
    let mut grid = Grid::new(net);
    for v in vehls {
      grid.insert(net.node2pt(v.last_visited_node()), v.clone());
    }
    grid
  }

  fn far_deadline() -> Deadline {
    Deadline::after(Duration::from_secs(3600))
  }

  #[test]
  fn feasible_pair_gets_an_edge() {
    let net = ring(5);
    let sp = SpIndex::new(net.clone());
    let cfg = toy_cfg();
    let v = vehl(1, 1, 2);
    let grid = grid_with(&net, &[v.clone()]);
    let custs = vec![cust(10, 2, 4, 0, 1000)];

    let g = build(&custs, &grid, &sp, 0, &cfg, &far_deadline());
    assert_eq!(g.matchable, vec![CustId::new(10)]);
    assert_eq!(g.cst[&v.id][&CustId::new(10)], 5);
    assert_eq!(g.rv[&v.id].len(), 1);
    assert!(g.sch[&v.id].contains_key(&CustId::new(10)));
    assert!(g.rte[&v.id].contains_key(&CustId::new(10)));
  }

  #[test]
  fn full_vehicle_gets_no_edges() {
    let net = ring(5);
    let sp = SpIndex::new(net.clone());
    let cfg = toy_cfg();
    let mut v = vehl(1, 1, 2);
    v.queued = 2;
    let grid = grid_with(&net, &[v]);
    let custs = vec![cust(10, 2, 4, 0, 1000)];

    let g = build(&custs, &grid, &sp, 0, &cfg, &far_deadline());
    assert!(g.cst.is_empty());
    // still matchable: it will show up in the ILP as unserved
    assert_eq!(g.matchable.len(), 1);
  }

  #[test]
  fn rr_edges_require_joint_feasibility() {
    let net = ring(6);
    let sp = SpIndex::new(net.clone());
    let cfg = toy_cfg();
    let grid = grid_with(&net, &[]);
    // a and b share a corridor; c's window is already hopeless
    let custs = vec![
      cust(10, 2, 3, 0, 1000),
      cust(11, 2, 3, 0, 1000),
      cust(12, 5, 6, 0, 1),
    ];

    let g = build(&custs, &grid, &sp, 0, &cfg, &far_deadline());
    let rr_a: Vec<CustId> = g.rr[&CustId::new(10)].iter().map(|c| c.id).collect();
    assert!(rr_a.contains(&CustId::new(11)));
    assert!(!rr_a.contains(&CustId::new(12)));
  }

  #[test]
  fn prune_keeps_a_cheapest_subset() {
    let mut g = RvGraph::default();
    let vid = VehlId::new(1);
    for k in 0..40 {
      let c = cust(k, 2, 3, 0, 1000);
      g.custmap.insert(c.id, c);
      // distinct costs so the cheapest-k set is unique
      g.cst.entry(vid).or_default().insert(c.id, (k * 10) as DistInt);
    }
    prune(&mut g, 30);
    let kept = &g.rv[&vid];
    assert_eq!(kept.len(), 30);
    let max_kept = kept.iter().map(|c| g.cst[&vid][&c.id]).max().unwrap();
    assert!(max_kept < 300, "kept an expensive customer: {}", max_kept);
  }

  #[test]
  fn prune_keeps_small_sets_whole() {
    let mut g = RvGraph::default();
    let vid = VehlId::new(1);
    for k in 0..5 {
      let c = cust(k, 2, 3, 0, 1000);
      g.custmap.insert(c.id, c);
      g.cst.entry(vid).or_default().insert(c.id, k as DistInt);
    }
    prune(&mut g, 30);
    assert_eq!(g.rv[&vid].len(), 5);
  }

  #[test]
  fn expired_deadline_yields_empty_partial_graph() {
    let net = ring(5);
    let sp = SpIndex::new(net.clone());
    let cfg = toy_cfg();
    let v = vehl(1, 1, 2);
    let grid = grid_with(&net, &[v]);
    let custs = vec![cust(10, 2, 4, 0, 1000), cust(11, 3, 5, 0, 1000)];

    let g = build(&custs, &grid, &sp, 0, &cfg, &Deadline::after(Duration::from_millis(0)));
    assert!(g.cst.is_empty());
    assert!(g.matchable.is_empty());
  }
}
