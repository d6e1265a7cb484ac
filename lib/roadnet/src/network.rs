//! In-memory road network: node coordinates plus an undirected weighted
//! adjacency store. Both from-to and to-from keys exist in the edge store.

use std::path::Path;

use anyhow::Context;
use tracing::*;

use crate::geo::{haversine, DistInt, Point};
use crate::ids::NodeId;
use crate::{Map, Result};

#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
  pub lower_left: Point,
  pub upper_right: Point,
}

#[derive(Debug, Clone, Default)]
pub struct RoadNetwork {
  nodes: Map<NodeId, Point>,
  edges: Map<NodeId, Map<NodeId, DistInt>>,
}

impl RoadNetwork {
  pub fn new() -> Self {
    return RoadNetwork::default();
  }

  /// Insert an undirected edge; the weight is the haversine length of the
  /// segment, rounded to meters.
  pub fn add_edge(&mut self, u: NodeId, up: Point, v: NodeId, vp: Point) {
    let w = haversine(up, vp).round() as DistInt;
    self.add_edge_weighted(u, up, v, vp, w);
  }

  pub fn add_edge_weighted(&mut self, u: NodeId, up: Point, v: NodeId, vp: Point, w: DistInt) {
    self.nodes.insert(u, up);
    self.nodes.insert(v, vp);
    self.edges.entry(u).or_default().insert(v, w);
    self.edges.entry(v).or_default().insert(u, w);
  }

  pub fn node2pt(&self, n: NodeId) -> Point {
    match self.nodes.get(&n) {
      Some(&p) => p,
      None => {
        error!(node = %n, "node lookup failed");
        panic!("no such node in road network: {}", n);
      }
    }
  }

  pub fn edgew(&self, u: NodeId, v: NodeId) -> DistInt {
    match self.edges.get(&u).and_then(|adj| adj.get(&v)) {
      Some(&w) => w,
      None => {
        error!(from = %u, to = %v, "edge lookup failed");
        panic!("no such edge in road network: ({}, {})", u, v);
      }
    }
  }

  pub fn contains_node(&self, n: NodeId) -> bool {
    self.nodes.contains_key(&n)
  }

  pub fn neighbours<'a>(&'a self, u: NodeId) -> impl Iterator<Item = (NodeId, DistInt)> + 'a {
    self
      .edges
      .get(&u)
      .into_iter()
      .flat_map(|adj| adj.iter().map(|(&v, &w)| (v, w)))
  }

  pub fn num_nodes(&self) -> usize {
    self.nodes.len()
  }

  pub fn bbox(&self) -> BoundingBox {
    assert!(!self.nodes.is_empty(), "bbox of an empty road network");
    let mut ll = Point::new(f64::INFINITY, f64::INFINITY);
    let mut ur = Point::new(f64::NEG_INFINITY, f64::NEG_INFINITY);
    for p in self.nodes.values() {
      ll.lng = ll.lng.min(p.lng);
      ll.lat = ll.lat.min(p.lat);
      ur.lng = ur.lng.max(p.lng);
      ur.lat = ur.lat.max(p.lat);
    }
    return BoundingBox { lower_left: ll, upper_right: ur };
  }

  /// Load a `.rnet` file: one edge per line,
  /// `edge_id  u  v  u_lng  u_lat  v_lng  v_lat`, whitespace-separated.
  #[instrument(level = "info", skip_all, fields(path = ?path.as_ref()))]
  pub fn read_rnet<P: AsRef<Path>>(path: P) -> Result<Self> {
    let data = std::fs::read_to_string(path.as_ref())
      .with_context(|| format!("failed to read road network {:?}", path.as_ref()))?;

    let mut net = RoadNetwork::new();
    for (lineno, line) in data.lines().enumerate() {
      let line = line.trim();
      if line.is_empty() {
        continue;
      }
      let fields: Vec<&str> = line.split_whitespace().collect();
      let parse = |k: usize| -> Result<f64> {
        fields
          .get(k)
          .with_context(|| format!("line {}: missing field {}", lineno + 1, k))?
          .parse::<f64>()
          .with_context(|| format!("line {}: bad numeric field {}", lineno + 1, k))
      };
      let u = NodeId::new(parse(1)? as i64);
      let v = NodeId::new(parse(2)? as i64);
      let up = Point::new(parse(3)?, parse(4)?);
      let vp = Point::new(parse(5)?, parse(6)?);
      net.add_edge(u, up, v, vp);
    }
    info!(nodes = net.num_nodes(), "road network loaded");
    return Ok(net);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn two_edge_net() -> RoadNetwork {
    let mut net = RoadNetwork::new();
    let a = Point::new(116.30, 39.90);
    let b = Point::new(116.31, 39.90);
    let c = Point::new(116.31, 39.91);
    net.add_edge(NodeId::new(1), a, NodeId::new(2), b);
    net.add_edge(NodeId::new(2), b, NodeId::new(3), c);
    net
  }

  #[test]
  fn edges_are_undirected() {
    let net = two_edge_net();
    assert_eq!(
      net.edgew(NodeId::new(1), NodeId::new(2)),
      net.edgew(NodeId::new(2), NodeId::new(1))
    );
  }

  #[test]
  fn bbox_covers_all_nodes() {
    let net = two_edge_net();
    let bb = net.bbox();
    assert_eq!(bb.lower_left.lng, 116.30);
    assert_eq!(bb.upper_right.lat, 39.91);
  }

  #[test]
  #[should_panic]
  fn unknown_node_is_fatal() {
    let net = two_edge_net();
    net.node2pt(NodeId::new(99));
  }

  #[test]
  fn rnet_roundtrip() -> Result<()> {
    let dir = std::env::temp_dir().join("roadnet-rnet-test");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("tiny.rnet");
    std::fs::write(
      &path,
      "0 1 2 116.30 39.90 116.31 39.90\n1 2 3 116.31 39.90 116.31 39.91\n",
    )?;
    let net = RoadNetwork::read_rnet(&path)?;
    assert_eq!(net.num_nodes(), 3);
    assert!(net.edgew(NodeId::new(1), NodeId::new(2)) > 0);
    Ok(())
  }
}
