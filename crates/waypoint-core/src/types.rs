use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// Geography
// =============================================================================

/// A WGS84 coordinate pair in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

impl Coordinates {
    pub const fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Latitude within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lon.is_finite()
            && (-90.0..=90.0).contains(&self.lat)
            && (-180.0..=180.0).contains(&self.lon)
    }
}

impl fmt::Display for Coordinates {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.4}, {:.4}", self.lat, self.lon)
    }
}

/// A place returned by a location query and remembered for follow-up turns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaceRecord {
    pub name: String,
    pub coordinates: Coordinates,
    /// Category reported by the provider, e.g. "restaurant".
    pub category: String,
    /// Identifier of the turn-level query that produced this record.
    pub source_query_id: Uuid,
}

// =============================================================================
// Enums
// =============================================================================

/// Kind of location query executed for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    /// Place or category search, optionally around a location.
    Search,
    /// Place name to coordinates.
    Geocode,
    /// Coordinates to address.
    ReverseGeocode,
    /// Route between an origin and a single destination.
    Directions,
    /// Distances from one or more origins to several destinations.
    Matrix,
    /// Rendered map image of a location.
    StaticMap,
}

impl fmt::Display for SearchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchType::Search => write!(f, "search"),
            SearchType::Geocode => write!(f, "geocode"),
            SearchType::ReverseGeocode => write!(f, "reverse_geocode"),
            SearchType::Directions => write!(f, "directions"),
            SearchType::Matrix => write!(f, "matrix"),
            SearchType::StaticMap => write!(f, "static_map"),
        }
    }
}

impl std::str::FromStr for SearchType {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "search" => Ok(SearchType::Search),
            "geocode" => Ok(SearchType::Geocode),
            "reverse_geocode" => Ok(SearchType::ReverseGeocode),
            "directions" => Ok(SearchType::Directions),
            "matrix" => Ok(SearchType::Matrix),
            "static_map" => Ok(SearchType::StaticMap),
            _ => Err(format!("Unknown search type: {}", s)),
        }
    }
}

/// Intent category assigned to an utterance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentCategory {
    /// Needs geocoding, search, or routing.
    Location,
    /// Aggregate or counting question about location data.
    Statistical,
    /// Everything else.
    General,
}

impl IntentCategory {
    /// Statistical questions never reach location tooling.
    pub fn routing_target(&self) -> RoutingTarget {
        match self {
            IntentCategory::Location => RoutingTarget::MapsAgent,
            IntentCategory::Statistical | IntentCategory::General => RoutingTarget::GeneralAgent,
        }
    }
}

impl fmt::Display for IntentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IntentCategory::Location => write!(f, "location"),
            IntentCategory::Statistical => write!(f, "statistical"),
            IntentCategory::General => write!(f, "general"),
        }
    }
}

impl std::str::FromStr for IntentCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "location" => Ok(IntentCategory::Location),
            "statistical" => Ok(IntentCategory::Statistical),
            "general" => Ok(IntentCategory::General),
            _ => Err(format!("Unknown intent category: {}", s)),
        }
    }
}

/// Downstream capability selected for a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoutingTarget {
    MapsAgent,
    GeneralAgent,
}

impl RoutingTarget {
    pub fn agent_name(&self) -> &'static str {
        match self {
            RoutingTarget::MapsAgent => "maps_agent",
            RoutingTarget::GeneralAgent => "general_ai_agent",
        }
    }
}

impl fmt::Display for RoutingTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.agent_name())
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coordinates_validity() {
        assert!(Coordinates::new(48.8566, 2.3522).is_valid());
        assert!(Coordinates::new(-90.0, 180.0).is_valid());
        assert!(!Coordinates::new(91.0, 0.0).is_valid());
        assert!(!Coordinates::new(0.0, -180.5).is_valid());
        assert!(!Coordinates::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_coordinates_display() {
        let c = Coordinates::new(52.3676, 4.9041);
        assert_eq!(c.to_string(), "52.3676, 4.9041");
    }

    #[test]
    fn test_search_type_parse() {
        assert_eq!("reverse_geocode".parse::<SearchType>(), Ok(SearchType::ReverseGeocode));
        assert_eq!(SearchType::StaticMap.to_string(), "static_map");
        assert!("teleport".parse::<SearchType>().is_err());
    }

    #[test]
    fn test_statistical_routes_to_general() {
        assert_eq!(
            IntentCategory::Statistical.routing_target(),
            RoutingTarget::GeneralAgent
        );
        assert_eq!(IntentCategory::General.routing_target(), RoutingTarget::GeneralAgent);
        assert_eq!(IntentCategory::Location.routing_target(), RoutingTarget::MapsAgent);
    }

    #[test]
    fn test_agent_names() {
        assert_eq!(RoutingTarget::MapsAgent.agent_name(), "maps_agent");
        assert_eq!(RoutingTarget::GeneralAgent.to_string(), "general_ai_agent");
    }

    #[test]
    fn test_category_serde() {
        let json = serde_json::to_string(&IntentCategory::Statistical).unwrap();
        assert_eq!(json, "\"statistical\"");
        let back: IntentCategory = serde_json::from_str(&json).unwrap();
        assert_eq!(back, IntentCategory::Statistical);
    }
}
