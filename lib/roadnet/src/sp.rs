//! Shortest-path oracle with a process-wide path cache.
//!
//! All workers share one cache behind a single mutex; each worker holds its
//! own [`SpView`] handle so graph phases never contend on anything except the
//! short cache critical sections. The cache grows monotonically within a run;
//! there is no eviction. Paths are stable within a run.

use std::sync::{Arc, Mutex};

use itertools::Itertools;
use pathfinding::prelude::dijkstra;
use tracing::*;

use crate::geo::DistInt;
use crate::ids::NodeId;
use crate::network::RoadNetwork;
use crate::Map;

/// One point on a route: (cumulative meters from route start, node).
pub type Wayp = (DistInt, NodeId);

type PathCache = Map<(NodeId, NodeId), Vec<NodeId>>;

pub struct SpIndex {
  net: Arc<RoadNetwork>,
  cache: Arc<Mutex<PathCache>>,
}

impl SpIndex {
  pub fn new(net: Arc<RoadNetwork>) -> Self {
    return SpIndex { net, cache: Arc::new(Mutex::new(PathCache::default())) };
  }

  /// A worker-local handle onto the shared index.
  pub fn view(&self) -> SpView {
    return SpView { net: self.net.clone(), cache: self.cache.clone() };
  }

  #[cfg(test)]
  pub(crate) fn cache_len(&self) -> usize {
    self.cache.lock().expect("sp cache poisoned").len()
  }
}

#[derive(Clone)]
pub struct SpView {
  net: Arc<RoadNetwork>,
  cache: Arc<Mutex<PathCache>>,
}

impl SpView {
  pub fn network(&self) -> &RoadNetwork {
    &self.net
  }

  /// Node sequence of the shortest path from `u` to `v`. An unreachable
  /// target means the network or the request data is broken, which nothing
  /// downstream can recover from.
  pub fn find_path(&self, u: NodeId, v: NodeId) -> Vec<NodeId> {
    if u == v {
      return vec![u];
    }
    {
      let cache = self.cache.lock().expect("sp cache poisoned");
      if let Some(path) = cache.get(&(u, v)) {
        return path.clone();
      }
    }
    let found = dijkstra(
      &u,
      |&n| self.net.neighbours(n).collect::<Vec<_>>(),
      |&n| n == v,
    );
    let path = match found {
      Some((path, _)) => path,
      None => {
        error!(from = %u, to = %v, "shortest-path lookup failed");
        panic!("no path between nodes {} and {}", u, v);
      }
    };
    let mut cache = self.cache.lock().expect("sp cache poisoned");
    cache.insert((u, v), path.clone());
    return path;
  }

  /// Shortest-path length in meters.
  pub fn dist(&self, u: NodeId, v: NodeId) -> DistInt {
    self
      .find_path(u, v)
      .iter()
      .tuple_windows()
      .map(|(&a, &b)| self.net.edgew(a, b))
      .sum()
  }

  /// Route visiting `stops` in order, starting from `stops[0]` with a
  /// cumulative cost of zero. Consecutive duplicate stops are collapsed.
  pub fn route_through(&self, stops: &[NodeId]) -> (DistInt, Vec<Wayp>) {
    assert!(!stops.is_empty(), "route through zero stops");
    let mut rte: Vec<Wayp> = vec![(0, stops[0])];
    let mut cost: DistInt = 0;
    for (&a, &b) in stops.iter().tuple_windows() {
      if a == b {
        continue;
      }
      let leg = self.find_path(a, b);
      for (&x, &y) in leg.iter().tuple_windows() {
        cost += self.net.edgew(x, y);
        rte.push((cost, y));
      }
    }
    return (cost, rte);
  }
}
