//! Batch orchestration: harvest the feeds, run RV -> RTV -> ILP, commit the
//! winning assignments and roll everyone else over.

use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use tracing::*;

use roadnet::{RoadNetwork, SpIndex, Wayp};

use crate::config::MatchConfig;
use crate::deadline::Deadline;
use crate::grid::Grid;
use crate::model::{CustId, Customer, SimlTime, Stop, Vehicle};
use crate::stats::Statistics;
use crate::{ilp, rtv, rv, Map};

/// The collaborators the matcher consumes: a monotonic clock, snapshot feeds
/// of waiting customers and servable vehicles, and the assignment committer.
pub trait Backend {
    fn now(&self) -> SimlTime;
    fn customers(&self) -> Vec<Customer>;
    fn vehicles(&self) -> Vec<Vehicle>;
    fn assign(
        &mut self,
        add_custs: &[CustId],
        drop_custs: &[CustId],
        new_rte: Vec<Wayp>,
        new_sch: Vec<Stop>,
        vehl: &Vehicle,
    ) -> bool;
}

pub struct TripGrouping {
    cfg: MatchConfig,
    net: Arc<RoadNetwork>,
    sp: SpIndex,
    grid: Grid,
    stats: Statistics,
    skip_assigned: bool,
    skip_delayed: bool,
}

impl TripGrouping {
    /// Fails fast on invalid configuration; a constructed matcher never
    /// aborts a batch over its own settings.
    pub fn new(cfg: MatchConfig, net: Arc<RoadNetwork>) -> Result<TripGrouping> {
        cfg.validate()?;
        let sp = SpIndex::new(net.clone());
        let grid = Grid::new(&net);
        Ok(TripGrouping {
            cfg,
            net,
            sp,
            grid,
            stats: Statistics::default(),
            skip_assigned: false,
            skip_delayed: false,
        })
    }

    pub fn config(&self) -> &MatchConfig {
        &self.cfg
    }

    pub fn stats(&self) -> &Statistics {
        &self.stats
    }

    /// Index a vehicle for the upcoming batch.
    pub fn handle_vehicle(&mut self, vehl: &Vehicle) {
        let pos = self.net.node2pt(vehl.last_visited_node());
        self.grid.insert(pos, vehl.clone());
    }

    /// Run one batch end to end. Safe to drive from a single scheduler
    /// thread; returns within the two phase budgets plus the solver limit.
    #[instrument(level = "info", name = "match_batch", skip_all, fields(t = backend.now()))]
    pub fn match_batch(&mut self, backend: &mut impl Backend) {
        let now = backend.now();
        let custs = self.harvest_customers(backend);
        let vehls = self.harvest_vehicles(backend);
        let mut is_matched: Map<CustId, bool> = custs.iter().map(|c| (c.id, false)).collect();

        let rv_deadline = Deadline::after(self.cfg.timeout_rv());
        let rvgrph = rv::build(&custs, &self.grid, &self.sp, now, &self.cfg, &rv_deadline);

        let rtv_deadline = Deadline::after(self.cfg.timeout_rtv());
        let rtvgrph = rtv::build(&vehls, &rvgrph, &self.sp, now, &self.cfg, &rtv_deadline);

        let view = self.sp.view();
        let custmap = &rvgrph.custmap;
        let basecost = |cid: CustId| {
            let c = &custmap[&cid];
            view.dist(c.orig, c.dest)
        };

        if let Some(outcome) = ilp::solve(&rtvgrph, &rvgrph.matchable, basecost, &self.cfg) {
            for (vid, stid) in outcome.assignments {
                let vehl = &rtvgrph.vehmap[&vid];
                let trip = rtvgrph.registry.get(stid);
                let new_rte = rtvgrph.rte[&vid][&stid].clone();
                let new_sch = rtvgrph.sch[&vid][&stid].clone();
                let cadd: Vec<CustId> = trip.iter().map(|c| c.id).collect();
                if backend.assign(&cadd, &[], new_rte, new_sch, vehl) {
                    for cust in trip {
                        is_matched.insert(cust.id, true);
                        self.stats.end_delay(cust.id, now);
                        self.stats.n_matched += 1;
                    }
                } else {
                    for &cid in &cadd {
                        self.stats.n_rejected += 1;
                        self.stats.beg_delay(cid, now);
                    }
                }
            }
        }

        // everyone not committed this batch rolls over
        for (&cid, &matched) in &is_matched {
            if !matched {
                self.stats.beg_delay(cid, now);
            }
        }
        self.stats.n_batches += 1;
    }

    fn harvest_customers(&self, backend: &impl Backend) -> Vec<Customer> {
        backend
            .customers()
            .into_iter()
            .filter(|c| !(self.skip_delayed && self.stats.is_delayed(c.id)))
            .collect()
    }

    fn harvest_vehicles(&self, backend: &impl Backend) -> Vec<Vehicle> {
        backend
            .vehicles()
            .into_iter()
            .filter(|v| !(self.skip_assigned && v.queued > 0))
            .collect()
    }

    /// One driver step: rebuild the spatial index from the vehicle feed and
    /// run the batch, reporting wall time against the batch interval.
    /// `skip_assigned` leaves partially loaded vehicles out of this batch;
    /// `skip_delayed` gives up on customers that already rolled over once.
    pub fn listen(&mut self, backend: &mut impl Backend, skip_assigned: bool, skip_delayed: bool) {
        let t0 = Instant::now();
        self.skip_assigned = skip_assigned;
        self.skip_delayed = skip_delayed;
        self.grid.clear();
        for vehl in self.harvest_vehicles(backend) {
            self.handle_vehicle(&vehl);
        }
        self.match_batch(backend);
        let ms = t0.elapsed().as_millis() as i64;
        let budget_ms = self.cfg.batch_time as i64 * 1000;
        if ms > budget_ms {
            warn!(ms, budget_ms, "batch exceeded the batch interval");
        } else {
            debug!(ms, "batch finished");
        }
    }

    /// End-of-run summary.
    pub fn end(&self) -> json::JsonValue {
        info!(
            batches = self.stats.n_batches,
            matched = self.stats.n_matched,
            rejected = self.stats.n_rejected,
            still_delayed = self.stats.n_delayed(),
            "matcher finished"
        );
        return self.stats.dump();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fleet::{CustStatus, SimFleet};
    use crate::model::{StopType, VehlId};
    use crate::testutil::{cust, ring, toy_cfg, vehl};

    fn harness(
        n_ring: usize,
        cfg: MatchConfig,
        custs: &[Customer],
        vehls: &[Vehicle],
    ) -> (TripGrouping, SimFleet) {
        let net = ring(n_ring);
        let fleet = {
            let mut fleet = SimFleet::new(net.clone(), cfg.speed_mps);
            for c in custs {
                fleet.add_customer(*c);
            }
            for v in vehls {
                fleet.add_vehicle(v.clone());
            }
            fleet
        };
        let matcher = TripGrouping::new(cfg, net).unwrap();
        (matcher, fleet)
    }

    #[test]
    fn bad_config_is_rejected_at_init() {
        let mut cfg = toy_cfg();
        cfg.batch_time = -5;
        assert!(TripGrouping::new(cfg, ring(5)).is_err());
    }

    #[test]
    fn trivial_match_commits() {
        // one customer, one vehicle parked on its doorstep
        let c = cust(10, 1, 2, 0, 1000);
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(5, toy_cfg(), &[c], &[v.clone()]);

        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 1);
        assert_eq!(matcher.stats().n_delayed(), 0);
        assert_eq!(fleet.assigned_to(c.id), Some(v.id));
        let sch = &fleet.vehicle(v.id).unwrap().schedule;
        assert!(sch.iter().any(|s| s.ty == StopType::CustOrig));
    }

    #[test]
    fn pooling_serves_both_with_one_vehicle() {
        let a = cust(10, 2, 3, 0, 1000);
        let b = cust(11, 2, 3, 0, 1000);
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(6, toy_cfg(), &[a, b], &[v.clone()]);

        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 2);
        assert_eq!(fleet.assigned_to(a.id), Some(v.id));
        assert_eq!(fleet.assigned_to(b.id), Some(v.id));
        // one committed route serves both
        assert_eq!(fleet.vehicle(v.id).unwrap().queued, 2);
    }

    #[test]
    fn capacity_excludes_the_third_customer() {
        let custs = [
            cust(10, 2, 3, 0, 1000),
            cust(11, 2, 3, 0, 1000),
            cust(12, 2, 3, 0, 1000),
        ];
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(6, toy_cfg(), &custs, &[v]);

        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 2);
        assert_eq!(matcher.stats().n_delayed(), 1);
        let served = custs.iter().filter(|c| fleet.assigned_to(c.id).is_some()).count();
        assert_eq!(served, 2);
    }

    #[test]
    fn rv_pruning_caps_the_candidate_trips() {
        // forty identical requests around one unit-capacity vehicle: only the
        // cheapest top_cust survive into the trip graph
        let cfg = toy_cfg();
        let custs: Vec<Customer> = (0..40).map(|k| cust(100 + k, 2, 3, 0, 1000)).collect();
        let v = vehl(1, 1, 1);
        let net = ring(6);
        let sp = SpIndex::new(net.clone());
        let mut grid = Grid::new(&net);
        grid.insert(net.node2pt(v.last_visited_node()), v.clone());
        let far = Deadline::after(std::time::Duration::from_secs(3600));

        let rvgrph = rv::build(&custs, &grid, &sp, 0, &cfg, &far);
        assert_eq!(rvgrph.rv[&v.id].len(), cfg.top_cust);
        let rtvgrph = rtv::build(&[v.clone()], &rvgrph, &sp, 0, &cfg, &far);
        assert_eq!(rtvgrph.num_edges(), cfg.top_cust);
        assert!(rtvgrph.vted[&v.id]
            .keys()
            .all(|&stid| rtvgrph.registry.get(stid).len() == 1));
    }

    #[test]
    fn expired_rv_deadline_degrades_gracefully() {
        let mut cfg = toy_cfg();
        cfg.timeout_rv_ms = 0;
        let custs = [cust(10, 2, 3, 0, 1000), cust(11, 3, 4, 0, 1000)];
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(6, cfg, &custs, &[v.clone()]);

        matcher.listen(&mut fleet, false, false); // must return cleanly, nothing committed
        assert_eq!(matcher.stats().n_matched, 0);
        assert_eq!(matcher.stats().n_delayed(), 2);
        assert_eq!(fleet.assigned_to(custs[0].id), None);
        assert_eq!(fleet.vehicle(v.id).unwrap().queued, 0);
    }

    #[test]
    fn hopeless_windows_roll_everyone_over() {
        // every window expires before any vehicle could arrive
        let custs = [cust(10, 3, 4, 0, 1), cust(11, 4, 5, 0, 1)];
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(6, toy_cfg(), &custs, &[v.clone()]);

        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 0);
        assert_eq!(matcher.stats().n_delayed(), 2);
        // the fleet is untouched: no route beyond the vehicle's own stop
        let vehl_state = fleet.vehicle(v.id).unwrap();
        assert!(vehl_state.schedule.iter().all(|s| s.ty == StopType::VehlDest));
    }

    #[test]
    fn delayed_customers_match_in_a_later_batch() {
        let c = cust(10, 2, 3, 60, 1000); // appears after the first batch
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(5, toy_cfg(), &[c], &[v]);

        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 0);

        fleet.advance(matcher.config().batch_time * 2);
        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 1);
        assert_eq!(matcher.stats().n_delayed(), 0);
    }

    #[test]
    fn failed_commits_count_and_redelay() {
        struct RejectingBackend(SimFleet);
        impl Backend for RejectingBackend {
            fn now(&self) -> SimlTime {
                self.0.now()
            }
            fn customers(&self) -> Vec<Customer> {
                self.0.customers()
            }
            fn vehicles(&self) -> Vec<Vehicle> {
                self.0.vehicles()
            }
            fn assign(
                &mut self,
                _: &[CustId],
                _: &[CustId],
                _: Vec<Wayp>,
                _: Vec<Stop>,
                _: &Vehicle,
            ) -> bool {
                false
            }
        }

        let c = cust(10, 1, 2, 0, 1000);
        let (mut matcher, fleet) = harness(5, toy_cfg(), &[c], &[vehl(1, 1, 2)]);
        let mut backend = RejectingBackend(fleet);

        matcher.listen(&mut backend, false, false);
        assert_eq!(matcher.stats().n_matched, 0);
        assert_eq!(matcher.stats().n_rejected, 1);
        assert!(matcher.stats().is_delayed(c.id));
    }

    #[test]
    fn full_ride_completes_across_batches() {
        let c = cust(10, 2, 4, 0, 1000);
        let v = vehl(1, 1, 2);
        let (mut matcher, mut fleet) = harness(5, toy_cfg(), &[c], &[v.clone()]);

        matcher.listen(&mut fleet, false, false);
        fleet.advance(30);
        assert_eq!(fleet.status_of(c.id), Some(CustStatus::Arrived));
        assert_eq!(fleet.vehicle(VehlId::new(1)).unwrap().queued, 0);

        // nothing left to do; the next batch is a no-op
        matcher.listen(&mut fleet, false, false);
        assert_eq!(matcher.stats().n_matched, 1);
    }
}
