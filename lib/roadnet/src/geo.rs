//! Geographic primitives: points in lon/lat degrees, great-circle distance,
//! and meter/degree conversions used to size spatial-index cells.

pub type Lon = f64;
pub type Lat = f64;

/// Meters.
pub type DistInt = i32;
pub type DistDbl = f64;

pub const EARTH_RADIUS_M: f64 = 6_372_800.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
  pub lng: Lon,
  pub lat: Lat,
}

impl Point {
  pub fn new(lng: Lon, lat: Lat) -> Self {
    return Point { lng, lat };
  }
}

/// Straight-line distance in degree space. Only meaningful as a relative
/// measure; use [`haversine`] for meters.
pub fn euclidean(u: Point, v: Point) -> DistDbl {
  (u.lng - v.lng).hypot(u.lat - v.lat)
}

/// Great-circle distance in meters.
pub fn haversine(u: Point, v: Point) -> DistDbl {
  let x = (u.lng - v.lng).to_radians();
  let y = (u.lat - v.lat).to_radians();
  let a = (y / 2.0).sin().powi(2)
    + (x / 2.0).sin().powi(2) * u.lat.to_radians().cos() * v.lat.to_radians().cos();
  return EARTH_RADIUS_M * 2.0 * a.sqrt().asin();
}

// https://stackoverflow.com/a/1253545 -- breaks down near the poles, which is
// fine for city-scale road networks.
pub fn meters_to_lng_degs(meters: DistDbl, lat: Lat) -> f64 {
  meters / (111_320.0 * lat.to_radians().cos())
}

pub fn meters_to_lat_degs(meters: DistDbl) -> f64 {
  meters / 110_574.0
}
