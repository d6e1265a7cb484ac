//! Bucket grid over vehicle positions.
//!
//! Rebuilt from scratch each batch. `within` returns every indexed vehicle in
//! the cells overlapping the query disc: false positives are fine (callers
//! re-check feasibility anyway), false negatives are not.

use itertools::iproduct;
use roadnet::geo::{meters_to_lat_degs, meters_to_lng_degs, DistDbl, Point};
use roadnet::network::{BoundingBox, RoadNetwork};

use crate::model::Vehicle;

const GRID_DIM: usize = 100;

#[derive(Debug, Clone)]
pub struct Grid {
  bbox: BoundingBox,
  cell_w: f64, // lng degrees per cell
  cell_h: f64, // lat degrees per cell
  cells: Vec<Vec<Vehicle>>,
}

impl Grid {
  pub fn new(net: &RoadNetwork) -> Grid {
    let bbox = net.bbox();
    let cell_w = ((bbox.upper_right.lng - bbox.lower_left.lng) / GRID_DIM as f64).max(1e-9);
    let cell_h = ((bbox.upper_right.lat - bbox.lower_left.lat) / GRID_DIM as f64).max(1e-9);
    return Grid {
      bbox,
      cell_w,
      cell_h,
      cells: vec![Vec::new(); GRID_DIM * GRID_DIM],
    };
  }

  pub fn clear(&mut self) {
    for cell in &mut self.cells {
      cell.clear();
    }
  }

  pub fn insert(&mut self, pos: Point, vehl: Vehicle) {
    let k = self.cell_index(pos);
    self.cells[k].push(vehl);
  }

  fn col(&self, lng: f64) -> usize {
    let c = (lng - self.bbox.lower_left.lng) / self.cell_w;
    (c.max(0.0) as usize).min(GRID_DIM - 1)
  }

  fn row(&self, lat: f64) -> usize {
    let r = (lat - self.bbox.lower_left.lat) / self.cell_h;
    (r.max(0.0) as usize).min(GRID_DIM - 1)
  }

  fn cell_index(&self, p: Point) -> usize {
    self.row(p.lat) * GRID_DIM + self.col(p.lng)
  }

  /// Every indexed vehicle whose cell overlaps the disc of radius `range_m`
  /// around `p`.
  pub fn within(&self, range_m: DistDbl, p: Point) -> Vec<&Vehicle> {
    let dlng = meters_to_lng_degs(range_m, p.lat);
    let dlat = meters_to_lat_degs(range_m);
    let (c0, c1) = (self.col(p.lng - dlng), self.col(p.lng + dlng));
    let (r0, r1) = (self.row(p.lat - dlat), self.row(p.lat + dlat));
    let mut out = Vec::new();
    for (r, c) in iproduct!(r0..=r1, c0..=c1) {
      out.extend(self.cells[r * GRID_DIM + c].iter());
    }
    return out;
  }

  #[cfg(test)]
  pub(crate) fn len(&self) -> usize {
    self.cells.iter().map(|c| c.len()).sum()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::model::{TIME_HORIZON, VehlId};
  use roadnet::NodeId;

  fn city_net() -> RoadNetwork {
    // two nodes far apart so the bbox spans a few km
    let mut net = RoadNetwork::new();
    net.add_edge(
      NodeId::new(1),
      Point::new(116.30, 39.90),
      NodeId::new(2),
      Point::new(116.35, 39.95),
    );
    net
  }

  fn vehl_at(id: i64, node: i64) -> Vehicle {
    Vehicle::new(VehlId::new(id), NodeId::new(node), NodeId::new(node), 0, TIME_HORIZON, 2)
  }

  #[test]
  fn no_false_negatives_within_range() {
    let net = city_net();
    let mut grid = Grid::new(&net);
    let here = Point::new(116.32, 39.92);
    grid.insert(here, vehl_at(1, 1));
    let found = grid.within(500.0, here);
    assert!(found.iter().any(|v| v.id == VehlId::new(1)));
  }

  #[test]
  fn far_vehicles_are_excluded() {
    let net = city_net();
    let mut grid = Grid::new(&net);
    grid.insert(Point::new(116.30, 39.90), vehl_at(1, 1));
    // query the opposite corner with a small radius; cells there are several
    // km away from the vehicle's cell
    let found = grid.within(100.0, Point::new(116.35, 39.95));
    assert!(found.is_empty());
  }

  #[test]
  fn clear_empties_every_cell() {
    let net = city_net();
    let mut grid = Grid::new(&net);
    grid.insert(Point::new(116.30, 39.90), vehl_at(1, 1));
    grid.insert(Point::new(116.35, 39.95), vehl_at(2, 2));
    assert_eq!(grid.len(), 2);
    grid.clear();
    assert_eq!(grid.len(), 0);
  }
}
