//! Assignment ILP: pick at most one shared trip per vehicle, cover each
//! matchable customer exactly once (by a trip or by its unserved variable),
//! minimizing insertion cost plus unserved penalties.

use good_lp::solvers::highs::highs;
use good_lp::*;
use tracing::*;

use roadnet::geo::DistInt;

use crate::config::MatchConfig;
use crate::model::{CustId, SharedTripId, VehlId};
use crate::rtv::RtvGraph;
use crate::{Map, Set};

#[derive(Debug, Default)]
pub struct IlpOutcome {
    pub assignments: Vec<(VehlId, SharedTripId)>,
    pub unserved: Set<CustId>,
}

/// Solve the batch assignment problem. `None` means the solver failed or
/// proved infeasibility; the batch then commits nothing and every customer
/// rolls over. A feasible-but-suboptimal incumbent is accepted.
#[instrument(level = "info", name = "solve_assignment", skip_all,
             fields(edges = rtv.num_edges(), matchable = matchable.len()))]
pub fn solve(
    rtv: &RtvGraph,
    matchable: &[CustId],
    basecost: impl Fn(CustId) -> DistInt,
    cfg: &MatchConfig,
) -> Option<IlpOutcome> {
    if rtv.vted.is_empty() {
        // no candidate trips at all: trivially, everyone is unserved
        return Some(IlpOutcome {
            assignments: Vec::new(),
            unserved: matchable.iter().copied().collect(),
        });
    }

    let mut vars = variables!();

    // x_{v,t} columns, one per vted edge; group them per vehicle and per
    // customer while building so the constraints stay sparse
    let mut cols: Vec<(VehlId, SharedTripId, DistInt, Variable)> = Vec::new();
    let mut by_vehl: Map<VehlId, Vec<Variable>> = Map::default();
    let mut by_cust: Map<CustId, Vec<Variable>> = Map::default();
    for (&vid, edges) in &rtv.vted {
        for (&stid, &cst) in edges {
            let x = vars.add(variable().binary().name(format!("x_{}_{}", vid, stid)));
            cols.push((vid, stid, cst, x));
            by_vehl.entry(vid).or_default().push(x);
            for cust in rtv.registry.get(stid) {
                by_cust.entry(cust.id).or_default().push(x);
            }
        }
    }

    // y_c columns: customer c is left unserved this batch
    let ys: Vec<(CustId, Variable)> = matchable
        .iter()
        .map(|&c| (c, vars.add(variable().binary().name(format!("y_{}", c)))))
        .collect();

    let mut objective = cols
        .iter()
        .fold(Expression::from(0.0), |acc, &(_, _, cst, x)| acc + (cst as f64) * x);
    for &(c, y) in &ys {
        let penalty = if cfg.unassign_penalty > 0 {
            cfg.unassign_penalty
        } else {
            basecost(c)
        };
        objective += (penalty as f64) * y;
    }

    let mut prob = vars
        .minimise(objective)
        .using(highs)
        .with_time_limit(cfg.solver_tm_lim_ms as f64 / 1000.0);
    prob = match prob.with_mip_gap(cfg.solver_gap as f32) {
        Ok(p) => p,
        Err(e) => {
            error!(gap = cfg.solver_gap, ?e, "solver rejected the optimality gap");
            return None;
        }
    };

    // 1) each vehicle serves at most one trip
    for (_, xs) in &by_vehl {
        let sum = xs.iter().fold(Expression::from(0.0), |acc, &x| acc + x);
        prob.add_constraint(sum.leq(1.0));
    }

    // 2) each matchable customer is served exactly once or marked unserved
    for &(c, y) in &ys {
        let sum = by_cust
            .get(&c)
            .into_iter()
            .flatten()
            .fold(Expression::from(0.0) + y, |acc, &x| acc + x);
        prob.add_constraint(sum.eq(1.0));
    }

    let sol = match prob.solve() {
        Ok(sol) => sol,
        Err(e) => {
            warn!(error = %e, "assignment solve failed; committing nothing this batch");
            return None;
        }
    };

    let assignments: Vec<(VehlId, SharedTripId)> = cols
        .iter()
        .filter(|&&(_, _, _, x)| sol.value(x) >= 0.5)
        .map(|&(vid, stid, _, _)| (vid, stid))
        .collect();
    let unserved: Set<CustId> = ys
        .iter()
        .filter(|&&(_, y)| sol.value(y) >= 0.5)
        .map(|&(c, _)| c)
        .collect();
    info!(chosen = assignments.len(), unserved = unserved.len(), "assignment solved");
    return Some(IlpOutcome { assignments, unserved });
}
