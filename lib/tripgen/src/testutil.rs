//! Shared fixtures: a tiny ring road network with unit edge weights and
//! constructors for toy customers, vehicles and configs.

use std::sync::Arc;

use roadnet::geo::{meters_to_lng_degs, Point};
use roadnet::{NodeId, RoadNetwork};

use crate::config::MatchConfig;
use crate::model::{CustId, Customer, SimlTime, Vehicle, VehlId, TIME_HORIZON};

/// Nodes 1..=n arranged in a cycle, every edge 1 meter. Coordinates are
/// packed within a few meters so haversine prefilters pass at small ranges.
pub fn ring(n: usize) -> Arc<RoadNetwork> {
    assert!(n >= 3);
    let mut net = RoadNetwork::new();
    let step = meters_to_lng_degs(1.0, 0.0);
    let pt = |k: usize| Point::new(116.0 + k as f64 * step, 0.0);
    for k in 1..=n {
        let next = if k == n { 1 } else { k + 1 };
        net.add_edge_weighted(
            NodeId::new(k as i64),
            pt(k),
            NodeId::new(next as i64),
            pt(next),
            1,
        );
    }
    Arc::new(net)
}

pub fn cust(id: i64, orig: i64, dest: i64, early: SimlTime, late: SimlTime) -> Customer {
    Customer {
        id: CustId::new(id),
        orig: NodeId::new(orig),
        dest: NodeId::new(dest),
        early,
        late,
        load: 1,
    }
}

pub fn vehl(id: i64, node: i64, capacity: i32) -> Vehicle {
    Vehicle::new(
        VehlId::new(id),
        NodeId::new(node),
        NodeId::new(node),
        0,
        TIME_HORIZON,
        capacity,
    )
}

/// Config scaled to the ring fixture: tiny range, 1 m/s so distances and
/// times coincide, effectively unlimited phase budgets.
pub fn toy_cfg() -> MatchConfig {
    let mut cfg = MatchConfig::default();
    cfg.range_m = 10.0;
    cfg.speed_mps = 1.0;
    cfg.timeout_rv_ms = 60_000;
    cfg.timeout_rtv_ms = 60_000;
    cfg.solver_tm_lim_ms = 15_000;
    cfg
}
