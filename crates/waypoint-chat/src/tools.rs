//! Tool execution collaborator.
//!
//! The router talks to mapping providers only through [`ToolExecutor`]. Tool
//! parameters and results are JSON; the typed views below document the
//! shapes the router reads back.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use waypoint_core::types::Coordinates;

use crate::error::ToolError;

/// Downstream tools available to the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ToolName {
    #[serde(rename = "maps.geocode")]
    Geocode,
    #[serde(rename = "maps.reverseGeocode")]
    ReverseGeocode,
    #[serde(rename = "maps.search")]
    Search,
    #[serde(rename = "maps.directions")]
    Directions,
    #[serde(rename = "maps.matrix")]
    Matrix,
    #[serde(rename = "maps.staticMap")]
    StaticMap,
}

impl ToolName {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::Geocode => "maps.geocode",
            ToolName::ReverseGeocode => "maps.reverseGeocode",
            ToolName::Search => "maps.search",
            ToolName::Directions => "maps.directions",
            ToolName::Matrix => "maps.matrix",
            ToolName::StaticMap => "maps.staticMap",
        }
    }
}

impl fmt::Display for ToolName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Executes one tool call. Retries, if any, belong to the implementation.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    async fn execute(&self, tool: ToolName, params: Value) -> Result<Value, ToolError>;
}

// =============================================================================
// Result shapes
// =============================================================================

/// `maps.geocode` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    #[serde(default)]
    pub name: Option<String>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub address: Option<String>,
}

impl GeocodeResult {
    pub fn coordinates(&self) -> Coordinates {
        Coordinates::new(self.lat, self.lon)
    }
}

/// One place in a `maps.search` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchPlace {
    pub name: String,
    pub lat: f64,
    pub lon: f64,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
}

/// `maps.search` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    #[serde(default)]
    pub places: Vec<SearchPlace>,
}

/// `maps.directions` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DirectionsResult {
    pub distance_m: f64,
    pub duration_s: f64,
    #[serde(default)]
    pub summary: Option<String>,
}

/// One origin/destination cell of a `maps.matrix` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixCell {
    pub origin: usize,
    pub destination: usize,
    pub distance_m: f64,
    pub duration_s: f64,
}

/// `maps.matrix` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatrixResult {
    #[serde(default)]
    pub cells: Vec<MatrixCell>,
}

/// `maps.reverseGeocode` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReverseGeocodeResult {
    pub address: String,
}

/// `maps.staticMap` result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaticMapResult {
    pub url: String,
}

/// Decode a tool result into its typed view.
pub fn parse_result<T: DeserializeOwned>(tool: ToolName, value: &Value) -> Result<T, ToolError> {
    T::deserialize(value)
        .map_err(|e| ToolError::InvalidResponse(format!("{}: {}", tool, e)))
}

/// JSON form of a coordinate parameter.
pub fn coordinates_param(coordinates: Coordinates) -> Value {
    serde_json::json!({ "lat": coordinates.lat, "lon": coordinates.lon })
}

// =============================================================================
// MockToolExecutor - scripted responses for tests and offline runs
// =============================================================================

/// Tool executor with per-tool scripted responses.
///
/// Unscripted tools fail with [`ToolError::Unavailable`]. Tracks every call
/// and the peak number of concurrent calls.
#[derive(Default)]
pub struct MockToolExecutor {
    responses: Mutex<HashMap<ToolName, Result<Value, ToolError>>>,
    delays: Mutex<HashMap<ToolName, Duration>>,
    calls: Mutex<Vec<(ToolName, Value)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

struct InFlight<'a>(&'a AtomicUsize);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl MockToolExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call to `tool` with `value`.
    pub fn respond(&self, tool: ToolName, value: Value) {
        self.lock_responses().insert(tool, Ok(value));
    }

    /// Fail every call to `tool` with `error`.
    pub fn fail(&self, tool: ToolName, error: ToolError) {
        self.lock_responses().insert(tool, Err(error));
    }

    /// Sleep before answering calls to `tool`.
    pub fn delay(&self, tool: ToolName, delay: Duration) {
        self.delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(tool, delay);
    }

    pub fn calls(&self) -> Vec<(ToolName, Value)> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn call_count(&self, tool: ToolName) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|(t, _)| *t == tool)
            .count()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn lock_responses(&self) -> std::sync::MutexGuard<'_, HashMap<ToolName, Result<Value, ToolError>>> {
        self.responses.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ToolExecutor for MockToolExecutor {
    async fn execute(&self, tool: ToolName, params: Value) -> Result<Value, ToolError> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((tool, params));

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlight(&self.in_flight);

        let delay = self
            .delays
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&tool)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.lock_responses()
            .get(&tool)
            .cloned()
            .unwrap_or_else(|| Err(ToolError::Unavailable(format!("no response scripted for {}", tool))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_tool_names() {
        assert_eq!(ToolName::ReverseGeocode.as_str(), "maps.reverseGeocode");
        assert_eq!(
            serde_json::to_value(ToolName::StaticMap).unwrap(),
            json!("maps.staticMap")
        );
    }

    #[test]
    fn test_parse_geocode_result() {
        let value = json!({"name": "Dam Square", "lat": 52.3731, "lon": 4.8926});
        let parsed: GeocodeResult = parse_result(ToolName::Geocode, &value).unwrap();
        assert_eq!(parsed.coordinates(), Coordinates::new(52.3731, 4.8926));
        assert!(parsed.address.is_none());
    }

    #[test]
    fn test_parse_invalid_result() {
        let value = json!({"name": "no coordinates"});
        let err = parse_result::<GeocodeResult>(ToolName::Geocode, &value).unwrap_err();
        assert!(matches!(err, ToolError::InvalidResponse(ref m) if m.starts_with("maps.geocode")));
    }

    #[test]
    fn test_search_result_defaults_to_empty() {
        let parsed: SearchResult = parse_result(ToolName::Search, &json!({})).unwrap();
        assert!(parsed.places.is_empty());
    }

    #[tokio::test]
    async fn test_mock_scripted_and_unscripted() {
        let tools = MockToolExecutor::new();
        tools.respond(ToolName::Geocode, json!({"lat": 1.0, "lon": 2.0}));
        tools.fail(ToolName::Directions, ToolError::Failed("503".to_string()));

        let ok = tools.execute(ToolName::Geocode, json!({"query": "x"})).await;
        assert_eq!(ok.unwrap(), json!({"lat": 1.0, "lon": 2.0}));

        let err = tools.execute(ToolName::Directions, json!({})).await;
        assert_eq!(err.unwrap_err(), ToolError::Failed("503".to_string()));

        let missing = tools.execute(ToolName::Matrix, json!({})).await;
        assert!(matches!(missing, Err(ToolError::Unavailable(_))));

        assert_eq!(tools.calls().len(), 3);
        assert_eq!(tools.call_count(ToolName::Geocode), 1);
        assert_eq!(tools.max_in_flight(), 1);
    }
}
