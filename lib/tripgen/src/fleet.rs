//! In-memory fleet harness: the simulation clock, the customer and vehicle
//! feeds, the assignment committer and vehicle movement.
//!
//! This is the thin collaborator side of the engine. The matcher only talks
//! to it through [`crate::matcher::Backend`], so any other persistence layer
//! can take its place.

use std::sync::Arc;

use anyhow::bail;
use tracing::*;

use roadnet::geo::DistInt;
use roadnet::instance::ProblemInstance;
use roadnet::{Result, RoadNetwork, SpIndex, Wayp};

use crate::matcher::Backend;
use crate::model::{
    CustId, Customer, SimlTime, Stop, StopOwner, StopType, Vehicle, VehlId, TIME_HORIZON,
};
use crate::Map;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CustStatus {
    Waiting,
    Onboard,
    Arrived,
}

#[derive(Debug, Clone)]
struct CustState {
    cust: Customer,
    status: CustStatus,
    assigned_to: Option<VehlId>,
}

pub struct SimFleet {
    net: Arc<RoadNetwork>,
    sp: SpIndex,
    clock: SimlTime,
    speed_mps: f64,
    custs: Map<CustId, CustState>,
    vehls: Map<VehlId, Vehicle>,
    /// Meters traveled along the current committed route.
    odometer: Map<VehlId, DistInt>,
    /// Route index up to which schedule stops have been consumed.
    sch_cursor: Map<VehlId, usize>,
}

impl SimFleet {
    pub fn new(net: Arc<RoadNetwork>, speed_mps: f64) -> SimFleet {
        let sp = SpIndex::new(net.clone());
        SimFleet {
            net,
            sp,
            clock: 0,
            speed_mps,
            custs: Map::default(),
            vehls: Map::default(),
            odometer: Map::default(),
            sch_cursor: Map::default(),
        }
    }

    pub fn from_instance(
        inst: &ProblemInstance,
        net: Arc<RoadNetwork>,
        speed_mps: f64,
    ) -> Result<SimFleet> {
        let mut fleet = SimFleet::new(net, speed_mps);
        for rec in &inst.trips {
            if !fleet.net.contains_node(rec.orig) || !fleet.net.contains_node(rec.dest) {
                bail!("trip {} references nodes missing from the road network", rec.id);
            }
            if rec.load > 0 {
                fleet.add_customer(Customer {
                    id: CustId::new(rec.id),
                    orig: rec.orig,
                    dest: rec.dest,
                    early: rec.early,
                    late: rec.late,
                    load: rec.load,
                });
            } else if rec.load < 0 {
                fleet.add_vehicle(Vehicle::new(
                    VehlId::new(rec.id),
                    rec.orig,
                    rec.dest,
                    rec.early,
                    if rec.late <= 0 { TIME_HORIZON } else { rec.late },
                    -rec.load,
                ));
            } else {
                bail!("trip {} has zero load", rec.id);
            }
        }
        Ok(fleet)
    }

    pub fn add_customer(&mut self, cust: Customer) {
        self.custs.insert(
            cust.id,
            CustState { cust, status: CustStatus::Waiting, assigned_to: None },
        );
    }

    /// Register a vehicle; an idle vehicle with a distinct destination starts
    /// out routed straight there.
    pub fn add_vehicle(&mut self, mut vehl: Vehicle) {
        if vehl.orig != vehl.dest {
            let (_, rte) = self.sp.view().route_through(&[vehl.orig, vehl.dest]);
            vehl.route = rte;
            vehl.lvn = 0;
        }
        self.odometer.insert(vehl.id, 0);
        self.sch_cursor.insert(vehl.id, 0);
        self.vehls.insert(vehl.id, vehl);
    }

    pub fn status_of(&self, cust: CustId) -> Option<CustStatus> {
        self.custs.get(&cust).map(|cs| cs.status)
    }

    pub fn assigned_to(&self, cust: CustId) -> Option<VehlId> {
        self.custs.get(&cust).and_then(|cs| cs.assigned_to)
    }

    pub fn vehicle(&self, vehl: VehlId) -> Option<&Vehicle> {
        self.vehls.get(&vehl)
    }

    /// Advance the clock, moving every vehicle along its committed route at
    /// nominal speed and consuming reached stops.
    #[instrument(level = "debug", skip(self))]
    pub fn advance(&mut self, dt: SimlTime) {
        self.clock += dt;
        let step = (self.speed_mps * dt as f64).floor() as DistInt;

        let mut consumed: Vec<(VehlId, Stop)> = Vec::new();
        for (&vid, vehl) in self.vehls.iter_mut() {
            let total = match vehl.route.last() {
                Some(&(total, _)) => total,
                None => continue,
            };
            let od = self.odometer.entry(vid).or_insert(0);
            *od = (*od + step).min(total);
            while vehl.lvn + 1 < vehl.route.len() && vehl.route[vehl.lvn + 1].0 <= *od {
                vehl.lvn += 1;
            }

            // consume customer stops passed by the cursor, in schedule order
            let cursor = self.sch_cursor.entry(vid).or_insert(0);
            loop {
                let stop = match vehl.schedule.first() {
                    Some(&stop) if stop.ty != StopType::VehlDest => stop,
                    _ => break,
                };
                let mut r = *cursor;
                while r < vehl.route.len() && vehl.route[r].1 != stop.loc {
                    r += 1;
                }
                if r > vehl.lvn || r >= vehl.route.len() {
                    break;
                }
                *cursor = r;
                vehl.schedule.remove(0);
                consumed.push((vid, stop));
            }
        }

        for (vid, stop) in consumed {
            let cid = match stop.owner {
                StopOwner::Cust(cid) => cid,
                StopOwner::Vehl(_) => continue,
            };
            match stop.ty {
                StopType::CustOrig => {
                    if let Some(cs) = self.custs.get_mut(&cid) {
                        cs.status = CustStatus::Onboard;
                    }
                    debug!(cust = %cid, vehl = %vid, t = self.clock, "picked up");
                }
                StopType::CustDest => {
                    let load = match self.custs.get_mut(&cid) {
                        Some(cs) => {
                            cs.status = CustStatus::Arrived;
                            cs.cust.load
                        }
                        None => 0,
                    };
                    if let Some(vehl) = self.vehls.get_mut(&vid) {
                        vehl.queued -= load;
                    }
                    debug!(cust = %cid, vehl = %vid, t = self.clock, "dropped off");
                }
                _ => {}
            }
        }
    }
}

impl Backend for SimFleet {
    fn now(&self) -> SimlTime {
        self.clock
    }

    /// Waiting customers that have appeared and are not yet assigned.
    fn customers(&self) -> Vec<Customer> {
        self.custs
            .values()
            .filter(|cs| {
                cs.status == CustStatus::Waiting
                    && cs.assigned_to.is_none()
                    && cs.cust.early <= self.clock
            })
            .map(|cs| cs.cust)
            .collect()
    }

    fn vehicles(&self) -> Vec<Vehicle> {
        self.vehls.values().cloned().collect()
    }

    /// Commit an assignment. Fails when the vehicle's cursor has moved off
    /// the head of the cached route, in which case nothing is written and
    /// the matcher re-delays the customers.
    fn assign(
        &mut self,
        add_custs: &[CustId],
        _drop_custs: &[CustId],
        new_rte: Vec<Wayp>,
        new_sch: Vec<Stop>,
        vehl: &Vehicle,
    ) -> bool {
        let add_load: i32 = add_custs
            .iter()
            .filter_map(|cid| self.custs.get(cid))
            .map(|cs| cs.cust.load)
            .sum();

        let cur = match self.vehls.get_mut(&vehl.id) {
            Some(cur) => cur,
            None => return false,
        };
        match new_rte.first() {
            Some(&(_, head)) if head == cur.last_visited_node() => {}
            _ => {
                debug!(vehl = %vehl.id, "commit rejected: vehicle moved since the batch snapshot");
                return false;
            }
        }
        cur.route = new_rte;
        cur.schedule = new_sch;
        cur.lvn = 0;
        cur.queued += add_load;
        self.odometer.insert(vehl.id, 0);
        self.sch_cursor.insert(vehl.id, 0);
        for cid in add_custs {
            if let Some(cs) = self.custs.get_mut(cid) {
                cs.assigned_to = Some(vehl.id);
            }
        }
        return true;
    }
}
