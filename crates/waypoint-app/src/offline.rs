//! Tool executor that answers from the geographic bias table alone.
//!
//! Lets the binary run without a mapping provider. Geocoding uses the bias
//! table, distances are straight-line estimates, and place search is
//! unavailable.

use async_trait::async_trait;
use serde_json::{json, Value};
use waypoint_chat::{ToolError, ToolExecutor, ToolName};
use waypoint_core::types::Coordinates;
use waypoint_geo::{GeoBiasResolver, GeoResolution};

const EARTH_RADIUS_M: f64 = 6_371_000.0;
/// Assumed average travel speed for duration estimates.
const ESTIMATE_SPEED_MPS: f64 = 40_000.0 / 3600.0;

pub struct OfflineToolExecutor {
    geo: GeoBiasResolver,
}

impl OfflineToolExecutor {
    pub fn new(geo: GeoBiasResolver) -> Self {
        Self { geo }
    }

    fn geocode(&self, params: &Value) -> Result<Value, ToolError> {
        let query = params["query"]
            .as_str()
            .ok_or_else(|| ToolError::Failed("geocode needs a query".to_string()))?;
        match self.geo.resolve(query) {
            GeoResolution::Resolved(bias) => Ok(json!({
                "name": bias.canonical_name,
                "lat": bias.coordinates.lat,
                "lon": bias.coordinates.lon,
                "address": format!("{}, {}", bias.canonical_name, bias.country),
            })),
            GeoResolution::Unresolved { token } => {
                Err(ToolError::Failed(format!("no offline match for {}", token)))
            }
        }
    }

    fn reverse_geocode(&self, params: &Value) -> Result<Value, ToolError> {
        let at = point(params)?;
        let nearest = self
            .geo
            .table()
            .entries()
            .iter()
            .min_by(|a, b| {
                haversine_m(at, a.coordinates).total_cmp(&haversine_m(at, b.coordinates))
            })
            .ok_or_else(|| ToolError::Unavailable("bias table is empty".to_string()))?;
        Ok(json!({
            "address": format!(
                "about {:.1} km from {}, {}",
                haversine_m(at, nearest.coordinates) / 1000.0,
                nearest.canonical_name,
                nearest.country
            )
        }))
    }
}

#[async_trait]
impl ToolExecutor for OfflineToolExecutor {
    async fn execute(&self, tool: ToolName, params: Value) -> Result<Value, ToolError> {
        match tool {
            ToolName::Geocode => self.geocode(&params),
            ToolName::ReverseGeocode => self.reverse_geocode(&params),
            ToolName::Directions => {
                let from = point(&params["origin"])?;
                let to = point(&params["destination"])?;
                let distance = haversine_m(from, to);
                Ok(json!({
                    "distance_m": distance,
                    "duration_s": distance / ESTIMATE_SPEED_MPS,
                    "summary": "straight-line estimate",
                }))
            }
            ToolName::Matrix => {
                let origins = points(&params["origins"])?;
                let destinations = points(&params["destinations"])?;
                let mut cells = Vec::with_capacity(origins.len() * destinations.len());
                for (o, from) in origins.iter().enumerate() {
                    for (d, to) in destinations.iter().enumerate() {
                        let distance = haversine_m(*from, *to);
                        cells.push(json!({
                            "origin": o,
                            "destination": d,
                            "distance_m": distance,
                            "duration_s": distance / ESTIMATE_SPEED_MPS,
                        }));
                    }
                }
                Ok(json!({ "cells": cells }))
            }
            ToolName::StaticMap => {
                let center = point(&params["center"])?;
                let zoom = params["zoom"].as_u64().unwrap_or(13);
                Ok(json!({
                    "url": format!("geo:{:.5},{:.5}?z={}", center.lat, center.lon, zoom)
                }))
            }
            ToolName::Search => Err(ToolError::Unavailable(
                "place search needs a mapping provider".to_string(),
            )),
        }
    }
}

fn point(value: &Value) -> Result<Coordinates, ToolError> {
    match (value["lat"].as_f64(), value["lon"].as_f64()) {
        (Some(lat), Some(lon)) => Ok(Coordinates::new(lat, lon)),
        _ => Err(ToolError::Failed(format!("expected {{lat, lon}}, got {}", value))),
    }
}

fn points(value: &Value) -> Result<Vec<Coordinates>, ToolError> {
    value
        .as_array()
        .ok_or_else(|| ToolError::Failed("expected a coordinate list".to_string()))?
        .iter()
        .map(point)
        .collect()
}

fn haversine_m(a: Coordinates, b: Coordinates) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let dlat = lat2 - lat1;
    let dlon = (b.lon - a.lon).to_radians();
    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn executor() -> OfflineToolExecutor {
        OfflineToolExecutor::new(GeoBiasResolver::builtin())
    }

    #[tokio::test]
    async fn test_geocode_from_bias_table() {
        let value = executor()
            .execute(ToolName::Geocode, json!({"query": "Paris Central"}))
            .await
            .unwrap();
        assert_eq!(value["name"], "Paris");
        assert_eq!(value["lat"], 48.8566);
    }

    #[tokio::test]
    async fn test_unknown_place_fails() {
        let err = executor()
            .execute(ToolName::Geocode, json!({"query": "Zzyzx"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Failed(_)));
    }

    #[tokio::test]
    async fn test_search_is_unavailable() {
        let err = executor()
            .execute(ToolName::Search, json!({"query": "cafes"}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_matrix_has_every_pair() {
        let value = executor()
            .execute(
                ToolName::Matrix,
                json!({
                    "origins": [{"lat": 52.3731, "lon": 4.8926}],
                    "destinations": [{"lat": 52.36, "lon": 4.8852}, {"lat": 52.3546, "lon": 4.9930}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(value["cells"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_haversine_paris_london() {
        let d = haversine_m(Coordinates::new(48.8566, 2.3522), Coordinates::new(51.5074, -0.1278));
        assert!((d - 343_500.0).abs() < 2_000.0, "{}", d);
    }
}
