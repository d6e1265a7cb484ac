//! Problem instances: the trip records a simulation run is seeded with.
//!
//! A record with positive load is a customer request; negative load is a
//! vehicle whose capacity is the magnitude of the load.

use std::path::Path;

use anyhow::Context;
use nom::Finish;
use tracing::*;

use crate::ids::NodeId;
use crate::Result;

/// Simulated seconds; the simulation starts at 0.
pub type SimlTime = i32;

/// Positive = customer request size, negative = vehicle capacity.
pub type Load = i32;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TripRecord {
  pub id: i64,
  pub orig: NodeId,
  pub dest: NodeId,
  pub load: Load,
  pub early: SimlTime,
  pub late: SimlTime,
}

#[derive(Debug, Clone, Default)]
pub struct ProblemInstance {
  pub id: String,
  pub trips: Vec<TripRecord>,
}

impl ProblemInstance {
  #[instrument(level = "info", skip_all, fields(path = ?path.as_ref()))]
  pub fn read<P: AsRef<Path>>(path: P) -> Result<Self> {
    let data = std::fs::read_to_string(path.as_ref())
      .with_context(|| format!("failed to read instance {:?}", path.as_ref()))?;
    let inst = match parsers::instance(&data).finish() {
      Ok((_, inst)) => inst,
      Err(e) => return Err(anyhow::Error::msg(e.to_string())),
    };
    info!(
      id = %inst.id,
      customers = inst.customers().count(),
      vehicles = inst.vehicles().count(),
      "instance loaded"
    );
    return Ok(inst);
  }

  pub fn customers<'a>(&'a self) -> impl Iterator<Item = &'a TripRecord> {
    self.trips.iter().filter(|t| t.load > 0)
  }

  pub fn vehicles<'a>(&'a self) -> impl Iterator<Item = &'a TripRecord> {
    self.trips.iter().filter(|t| t.load < 0)
  }
}

mod parsers {
  use super::*;
  use std::num::ParseIntError;
  use std::str::FromStr;

  use nom::bytes::complete::take_while1;
  use nom::character::complete::{char, digit1, multispace0, newline, space0, space1};
  use nom::combinator::{eof, map_res, opt, recognize};
  use nom::error::{self, ParseError, VerboseError};
  use nom::multi::many0;
  use nom::sequence::{pair, preceded, terminated, tuple};
  use nom::IResult;

  fn i64_<'a, E>(input: &'a str) -> IResult<&'a str, i64, E>
  where
    E: ParseError<&'a str> + error::FromExternalError<&'a str, ParseIntError>,
  {
    map_res(recognize(pair(opt(char('-')), digit1)), i64::from_str)(input)
  }

  fn i32_<'a, E>(input: &'a str) -> IResult<&'a str, i32, E>
  where
    E: ParseError<&'a str> + error::FromExternalError<&'a str, ParseIntError>,
  {
    map_res(recognize(pair(opt(char('-')), digit1)), i32::from_str)(input)
  }

  // `id  orig  dest  load  early  late`
  fn record(input: &str) -> IResult<&str, TripRecord, VerboseError<&str>> {
    let i64_space = |i| terminated(i64_, space1)(i);
    let i32_space = |i| terminated(i32_, space1)(i);
    let (input, (id, orig, dest, load, early, late)) = preceded(
      space0,
      tuple((i64_space, i64_space, i64_space, i32_space, i32_space, terminated(i32_, newline))),
    )(input)?;
    Ok((
      input,
      TripRecord {
        id,
        orig: NodeId::new(orig),
        dest: NodeId::new(dest),
        load,
        early,
        late,
      },
    ))
  }

  pub fn instance(input: &str) -> IResult<&str, ProblemInstance, VerboseError<&str>> {
    let (input, id) = terminated(take_while1(|c: char| !c.is_whitespace()), newline)(input)?;
    let (input, trips) = many0(record)(input)?;
    let (input, _) = multispace0(input)?;
    let (input, _) = eof(input)?;
    Ok((input, ProblemInstance { id: id.to_string(), trips }))
  }
}
