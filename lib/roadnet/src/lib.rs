pub use anyhow::Result;

use fnv::{FnvHashMap, FnvHashSet};

pub type Map<K, V> = FnvHashMap<K, V>;
pub type Set<T> = FnvHashSet<T>;

pub mod geo;
pub mod ids;
pub mod instance;
pub mod network;
pub mod sp;

pub use geo::{haversine, DistDbl, DistInt, Lat, Lon, Point};
pub use ids::NodeId;
pub use network::RoadNetwork;
pub use sp::{SpIndex, SpView, Wayp};
