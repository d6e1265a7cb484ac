use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use rayon::ThreadPoolBuilder;
use structopt::StructOpt;
use tracing::*;

use roadnet::instance::ProblemInstance;
use roadnet::RoadNetwork;
use tripgen::config::MatchConfig;
use tripgen::fleet::SimFleet;
use tripgen::init_logging;
use tripgen::matcher::TripGrouping;

mod common;
use common::*;

#[derive(Debug, StructOpt)]
struct ClArgs {
    /// Road network (.rnet)
    rnet: PathBuf,
    /// Problem instance: customer requests and vehicles
    instance: PathBuf,
    #[structopt(long, short = "c", default_value = "1", validator = clap_range_validator(Some(1), None))]
    cpus: usize,
    /// Number of matching batches to run
    #[structopt(long, default_value = "10", validator = clap_range_validator(Some(1), None))]
    batches: usize,
    /// Simulated seconds per batch
    #[structopt(long, default_value = "30")]
    batch_time: i32,
    /// RV/RR spatial filter in meters
    #[structopt(long, default_value = "2000")]
    range: f64,
    /// Cheapest customers kept per vehicle in the RV graph
    #[structopt(long, default_value = "30")]
    top_cust: usize,
    /// Ceiling on candidate trips per batch
    #[structopt(long, default_value = "15000")]
    trip_max: usize,
    /// Flat unserved penalty; 0 falls back to per-customer base cost
    #[structopt(long, default_value = "1000000")]
    unassign_penalty: i32,
    #[structopt(flatten)]
    output: OutputOptions,
}

fn main() -> Result<()> {
    let args: ClArgs = StructOpt::from_args();
    let _g = init_logging(args.output.log.clone());
    debug!(?args);
    ThreadPoolBuilder::new()
        .num_threads(args.cpus)
        .build_global()
        .expect("failed to construct thread pool");

    let net = Arc::new(RoadNetwork::read_rnet(&args.rnet)?);
    let inst = ProblemInstance::read(&args.instance)?;

    let cfg = MatchConfig {
        batch_time: args.batch_time,
        range_m: args.range,
        top_cust: args.top_cust,
        trip_max: args.trip_max,
        // both graph phases get half the batch interval
        timeout_rv_ms: (args.batch_time.max(1) as u64) * 500,
        timeout_rtv_ms: (args.batch_time.max(1) as u64) * 500,
        unassign_penalty: args.unassign_penalty,
        ..MatchConfig::default()
    };

    let mut fleet = SimFleet::from_instance(&inst, net.clone(), cfg.speed_mps)?;
    let mut matcher = TripGrouping::new(cfg, net)?;

    for batch in 0..args.batches {
        let span = info_span!("batch", batch);
        let _g = span.enter();
        matcher.listen(&mut fleet, false, false);
        fleet.advance(matcher.config().batch_time);
    }

    let report = matcher.end();
    write_report(&args.output, report)?;
    Ok(())
}
