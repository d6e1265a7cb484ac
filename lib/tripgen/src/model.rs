//! Core entities of the matcher: customers, vehicles, stops and shared trips.

use roadnet::{define_id_type, NodeId, Wayp};

pub use roadnet::instance::{Load, SimlTime};
use roadnet::geo::DistInt;

define_id_type!(CustId, i64);
define_id_type!(VehlId, i64);
define_id_type!(SharedTripId, u32);

/// A far-future time; vehicle destination stops are open-ended.
pub const TIME_HORIZON: SimlTime = SimlTime::MAX / 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopType {
    CustOrig,
    CustDest,
    VehlOrig,
    VehlDest,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOwner {
    Cust(CustId),
    Vehl(VehlId),
}

/// A scheduled visit to a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stop {
    pub owner: StopOwner,
    pub loc: NodeId,
    pub ty: StopType,
    pub early: SimlTime,
    pub late: SimlTime,
}

impl Stop {
    pub fn cust_orig(cust: &Customer) -> Stop {
        Stop {
            owner: StopOwner::Cust(cust.id),
            loc: cust.orig,
            ty: StopType::CustOrig,
            early: cust.early,
            late: cust.late,
        }
    }

    pub fn cust_dest(cust: &Customer) -> Stop {
        Stop {
            owner: StopOwner::Cust(cust.id),
            loc: cust.dest,
            ty: StopType::CustDest,
            early: cust.early,
            late: cust.late,
        }
    }

    pub fn vehl_dest(vehl: &Vehicle) -> Stop {
        Stop {
            owner: StopOwner::Vehl(vehl.id),
            loc: vehl.dest,
            ty: StopType::VehlDest,
            early: vehl.early,
            late: vehl.late,
        }
    }
}

/// A waiting request. Immutable within a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Customer {
    pub id: CustId,
    pub orig: NodeId,
    pub dest: NodeId,
    pub early: SimlTime,
    pub late: SimlTime,
    pub load: Load,
}

/// An unordered set of customers jointly served by one vehicle. Two trips are
/// equal iff they contain the same customers; see `rtv::trip_key`.
pub type SharedTrip = Vec<Customer>;

/// Fleet-owned vehicle state. The matcher only ever works on clones; the
/// committer is the sole writer of the fleet's own copy.
#[derive(Debug, Clone, PartialEq)]
pub struct Vehicle {
    pub id: VehlId,
    pub orig: NodeId,
    pub dest: NodeId,
    pub early: SimlTime,
    pub late: SimlTime,
    pub capacity: Load,
    /// Customers already assigned (waiting or onboard).
    pub queued: Load,
    /// Committed route; cumulative meters are relative to the route start.
    pub route: Vec<Wayp>,
    /// Remaining stops, vehicle destination last.
    pub schedule: Vec<Stop>,
    /// Index of the last visited waypoint in `route`.
    pub lvn: usize,
}

impl Vehicle {
    pub fn new(
        id: VehlId,
        orig: NodeId,
        dest: NodeId,
        early: SimlTime,
        late: SimlTime,
        capacity: Load,
    ) -> Vehicle {
        let mut vehl = Vehicle {
            id,
            orig,
            dest,
            early,
            late,
            capacity,
            queued: 0,
            route: vec![(0, orig)],
            schedule: Vec::new(),
            lvn: 0,
        };
        vehl.schedule = vec![Stop::vehl_dest(&vehl)];
        return vehl;
    }

    /// Wrap a customer in a unit-capacity vehicle with the customer's own
    /// window. Used only to test request-request feasibility; it must never
    /// enter the real vehicle set.
    pub fn virtual_from(cust: &Customer) -> Vehicle {
        Vehicle::new(
            VehlId::new(cust.id.raw()),
            cust.orig,
            cust.dest,
            cust.early,
            cust.late,
            1,
        )
    }

    pub fn last_visited_node(&self) -> NodeId {
        self.route[self.lvn].1
    }

    pub fn remaining_capacity(&self) -> Load {
        self.capacity - self.queued
    }

    /// Meters left on the committed route.
    pub fn remaining_route_cost(&self) -> DistInt {
        match self.route.last() {
            Some(&(total, _)) => total - self.route[self.lvn].0,
            None => 0,
        }
    }

    pub fn reset_lvn(&mut self) {
        self.lvn = 0;
    }
}
