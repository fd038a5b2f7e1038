pub mod config;
pub mod error;
pub mod types;

pub use config::WaypointConfig;
pub use error::{Result, WaypointError};
pub use types::{Coordinates, IntentCategory, PlaceRecord, RoutingTarget, SearchType};
