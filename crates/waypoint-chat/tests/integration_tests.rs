//! End-to-end turn tests for the conversation engine.
//!
//! Each test builds its own engine over a scripted [`MockToolExecutor`], so
//! tool traffic can be asserted exactly.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tempfile::NamedTempFile;
use uuid::Uuid;

use waypoint_chat::{
    AdvisoryError, ContextPatch, ConversationEngine, MockToolExecutor, Role, StaticAdvisor,
    ToolError, ToolName, TurnFailure, TurnState,
};
use waypoint_core::config::WaypointConfig;
use waypoint_core::types::{Coordinates, IntentCategory, PlaceRecord, SearchType};

// =============================================================================
// Helpers
// =============================================================================

fn make_engine(config: WaypointConfig) -> (Arc<ConversationEngine>, Arc<MockToolExecutor>) {
    let mock = Arc::new(MockToolExecutor::new());
    let engine = ConversationEngine::new(&config, mock.clone()).expect("valid config");
    (Arc::new(engine), mock)
}

fn default_engine() -> (Arc<ConversationEngine>, Arc<MockToolExecutor>) {
    make_engine(WaypointConfig::default())
}

const RESTAURANTS: [(&str, f64, f64); 3] = [
    ("Trattoria Uno", 52.3551, 4.9982),
    ("Pizzeria Due", 52.3539, 4.9901),
    ("Osteria Tre", 52.3560, 5.0012),
];

fn script_ijburg_search(mock: &MockToolExecutor) {
    mock.respond(
        ToolName::Geocode,
        json!({"name": "IJburglaan", "lat": 52.3546, "lon": 4.9930}),
    );
    let places: Vec<Value> = RESTAURANTS
        .iter()
        .map(|(name, lat, lon)| json!({"name": name, "lat": lat, "lon": lon, "category": "restaurant"}))
        .collect();
    mock.respond(ToolName::Search, json!({ "places": places }));
}

fn script_dam_square(mock: &MockToolExecutor) {
    mock.respond(
        ToolName::Geocode,
        json!({"name": "Dam Square", "lat": 52.3731, "lon": 4.8926}),
    );
}

fn restaurant_coordinates() -> Vec<Value> {
    RESTAURANTS
        .iter()
        .map(|(_, lat, lon)| json!({"lat": lat, "lon": lon}))
        .collect()
}

// =============================================================================
// Reference resolution across turns
// =============================================================================

#[tokio::test]
async fn test_follow_up_targets_previous_results() {
    let (engine, mock) = default_engine();

    script_ijburg_search(&mock);
    let first = engine.handle_turn("u1", "Italian restaurants in Ijburglaan").await;
    assert!(first.success, "{:?}", first);
    assert_eq!(first.agent_used, "maps_agent");
    assert_eq!(first.query_type, "location");
    assert!(first.response_text.contains("Trattoria Uno"));

    let ctx = engine.get_context("u1").await;
    assert_eq!(ctx.last_search_type, Some(SearchType::Search));
    assert_eq!(ctx.last_search_results.len(), 3);
    assert_eq!(ctx.last_search_location, Some(Coordinates::new(52.3546, 4.9930)));

    script_dam_square(&mock);
    mock.respond(
        ToolName::Matrix,
        json!({"cells": [
            {"origin": 0, "destination": 0, "distance_m": 8100.0, "duration_s": 1500.0},
            {"origin": 0, "destination": 1, "distance_m": 7600.0, "duration_s": 1380.0},
            {"origin": 0, "destination": 2, "distance_m": 8700.0, "duration_s": 1620.0}
        ]}),
    );
    let second = engine.handle_turn("u1", "How far are they from Dam Square?").await;
    assert!(second.success, "{:?}", second);
    assert_eq!(second.agent_used, "maps_agent");
    assert!(second.diagnostics.is_empty());

    let (tool, params) = mock.calls().last().cloned().unwrap();
    assert_eq!(tool, ToolName::Matrix);
    assert_eq!(params["destinations"], Value::Array(restaurant_coordinates()));
    assert_eq!(params["origins"], json!([{"lat": 52.3731, "lon": 4.8926}]));
    assert!(second.response_text.contains("Dam Square to Osteria Tre"));

    // The user turn carries what "they" was bound to.
    let history = engine.history("u1", 2).await;
    assert_eq!(history[0].role, Role::User);
    assert!(history[0].resolved_entities.contains_key("they"));
}

#[tokio::test]
async fn test_reference_without_memory_asks_for_clarification() {
    let (engine, mock) = default_engine();

    let response = engine.handle_turn("u1", "How far are they from Dam Square?").await;

    assert!(!response.success);
    assert!(response.clarification_needed);
    assert_eq!(
        response.failure,
        Some(TurnFailure::ResolutionFailure {
            markers: vec!["they".to_string()]
        })
    );
    assert_eq!(response.final_state(), Some(TurnState::Error));
    assert!(mock.calls().is_empty());
}

#[tokio::test]
async fn test_memory_expires_after_recency_window() {
    let (engine, mock) = default_engine();

    script_ijburg_search(&mock);
    assert!(engine.handle_turn("u1", "Italian restaurants in Ijburglaan").await.success);
    assert!(engine.handle_turn("u1", "Hello!").await.success);

    let response = engine.handle_turn("u1", "How far are they from Dam Square?").await;
    assert!(response.clarification_needed);
    assert!(matches!(response.failure, Some(TurnFailure::ResolutionFailure { .. })));
}

#[tokio::test]
async fn test_wider_recency_window_keeps_memory() {
    let mut config = WaypointConfig::default();
    config.context.recency_window = 3;
    let (engine, mock) = make_engine(config);

    script_ijburg_search(&mock);
    assert!(engine.handle_turn("u1", "Italian restaurants in Ijburglaan").await.success);
    assert!(engine.handle_turn("u1", "Hello!").await.success);

    script_dam_square(&mock);
    mock.respond(ToolName::Matrix, json!({"cells": []}));
    let response = engine.handle_turn("u1", "How far are they from Dam Square?").await;
    assert!(response.success, "{:?}", response);
    assert_eq!(mock.call_count(ToolName::Matrix), 1);
}

#[tokio::test]
async fn test_set_context_seeds_references() {
    let (engine, mock) = default_engine();
    let place = PlaceRecord {
        name: "Rijksmuseum".to_string(),
        coordinates: Coordinates::new(52.36, 4.8852),
        category: "museum".to_string(),
        source_query_id: Uuid::new_v4(),
    };
    engine
        .set_context(
            "u1",
            ContextPatch {
                last_search_type: Some(SearchType::Search),
                last_search_results: Some(vec![place]),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    script_dam_square(&mock);
    mock.respond(
        ToolName::Directions,
        json!({"distance_m": 1900.0, "duration_s": 420.0}),
    );
    let response = engine.handle_turn("u1", "directions to it from Dam Square").await;
    assert!(response.success, "{:?}", response);

    let (tool, params) = mock.calls().last().cloned().unwrap();
    assert_eq!(tool, ToolName::Directions);
    assert_eq!(params["destination"], json!({"lat": 52.36, "lon": 4.8852}));
    assert_eq!(params["origin"], json!({"lat": 52.3731, "lon": 4.8926}));
}

// =============================================================================
// Geographic bias
// =============================================================================

#[tokio::test]
async fn test_paris_central_biases_to_france() {
    let (engine, mock) = default_engine();
    mock.respond(
        ToolName::Geocode,
        json!({"name": "Paris", "lat": 48.8566, "lon": 2.3522}),
    );
    mock.respond(ToolName::Search, json!({"places": []}));

    let response = engine.handle_turn("u1", "find hotels near Paris Central").await;
    assert!(response.success, "{:?}", response);

    let calls = mock.calls();
    assert_eq!(calls[0].0, ToolName::Geocode);
    assert_eq!(calls[0].1["country"], "France");
    assert_eq!(calls[0].1["bias"], json!({"lat": 48.8566, "lon": 2.3522}));
    assert!(response.diagnostics.is_empty());
}

#[tokio::test]
async fn test_unknown_place_is_reported_as_diagnostic() {
    let (engine, mock) = default_engine();
    mock.respond(ToolName::Geocode, json!({"lat": 35.14, "lon": -116.10}));
    mock.respond(ToolName::Search, json!({"places": []}));

    let response = engine.handle_turn("u1", "find gas stations near Zzyzx").await;
    assert!(response.success);
    assert_eq!(
        response.diagnostics,
        vec![TurnFailure::GeoBiasUnresolved {
            token: "Zzyzx".to_string()
        }]
    );
    assert!(mock.calls()[0].1.get("bias").is_none());
}

#[tokio::test]
async fn test_custom_geo_table_from_config() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(
        br#"
[[entries]]
canonical_name = "Utrecht"
country = "Netherlands"
coordinates = { lat = 52.0907, lon = 5.1214 }
aliases = ["utrecht", "utrecht centraal"]
"#,
    )
    .unwrap();

    let mut config = WaypointConfig::default();
    config.geo.table_path = Some(file.path().to_string_lossy().into_owned());
    let (engine, mock) = make_engine(config);
    mock.respond(ToolName::Geocode, json!({"lat": 52.0907, "lon": 5.1214}));
    mock.respond(ToolName::Search, json!({"places": []}));

    let response = engine.handle_turn("u1", "find bakeries near Utrecht Centraal").await;
    assert!(response.success);
    assert_eq!(mock.calls()[0].1["country"], "Netherlands");

    // Paris is not in the custom table.
    let response = engine.handle_turn("u1", "find bakeries near Paris").await;
    assert!(response
        .diagnostics
        .contains(&TurnFailure::GeoBiasUnresolved {
            token: "Paris".to_string()
        }));
}

// =============================================================================
// Classification precedence
// =============================================================================

#[tokio::test]
async fn test_statistical_question_never_reaches_tools() {
    let (engine, mock) = default_engine();

    let response = engine
        .handle_turn("u1", "How many restaurants are in Amsterdam?")
        .await;

    assert!(response.success);
    assert_eq!(response.query_type, "statistical");
    assert_eq!(response.agent_used, "general_ai_agent");
    assert!(response.states.contains(&TurnState::RoutingGeneral));
    assert!(mock.calls().is_empty());
    assert_eq!(
        engine.get_context("u1").await.last_intent,
        Some(IntentCategory::Statistical)
    );
}

#[tokio::test]
async fn test_statistical_follow_up_with_description_stays_general() {
    let (engine, mock) = default_engine();

    script_ijburg_search(&mock);
    let first = engine.handle_turn("u1", "Italian restaurants in Ijburglaan").await;
    assert!(first.success, "{:?}", first);
    let calls_before = mock.calls().len();

    let response = engine
        .handle_turn("u1", "How many of those restaurants are near Dam Square?")
        .await;

    assert!(response.success, "{:?}", response);
    assert_eq!(response.query_type, "statistical");
    assert_eq!(response.agent_used, "general_ai_agent");
    assert_eq!(mock.calls().len(), calls_before);
    assert_eq!(
        engine.get_context("u1").await.last_intent,
        Some(IntentCategory::Statistical)
    );
}

#[tokio::test]
async fn test_fresh_request_with_the_places_is_a_search() {
    let (engine, mock) = default_engine();
    mock.respond(
        ToolName::Geocode,
        json!({"name": "Central Park", "lat": 40.7829, "lon": -73.9654}),
    );
    mock.respond(
        ToolName::Search,
        json!({"places": [{"name": "Tavern on the Green", "lat": 40.7721, "lon": -73.9778}]}),
    );

    let response = engine
        .handle_turn("u1", "Show me the places to eat near Central Park")
        .await;

    assert!(response.success, "{:?}", response);
    assert!(!response.clarification_needed);
    assert_eq!(response.query_type, "location");
    assert_eq!(mock.call_count(ToolName::Search), 1);
    assert_eq!(
        engine.get_context("u1").await.last_search_results[0].name,
        "Tavern on the Green"
    );
}

#[tokio::test]
async fn test_advisory_decides_ambiguous_utterance() {
    let mock = Arc::new(MockToolExecutor::new());
    let advisor = Arc::new(StaticAdvisor::returning(IntentCategory::Location, 0.9));
    let engine = ConversationEngine::new(&WaypointConfig::default(), mock.clone())
        .unwrap()
        .with_advisory(advisor.clone());
    mock.respond(ToolName::Search, json!({"places": [{"name": "Luigi's", "lat": 40.7, "lon": -74.0}]}));

    let response = engine.handle_turn("u1", "I'm hungry, pizza please").await;
    assert!(response.success, "{:?}", response);
    assert_eq!(response.agent_used, "maps_agent");
    assert_eq!(advisor.call_count(), 1);
    assert_eq!(mock.call_count(ToolName::Search), 1);
}

#[tokio::test]
async fn test_failed_advisory_falls_back_to_general() {
    let mock = Arc::new(MockToolExecutor::new());
    let advisor = Arc::new(StaticAdvisor::failing(AdvisoryError::Unavailable(
        "offline".to_string(),
    )));
    let engine = ConversationEngine::new(&WaypointConfig::default(), mock.clone())
        .unwrap()
        .with_advisory(advisor);

    let response = engine.handle_turn("u1", "I'm hungry, pizza please").await;
    assert!(response.success);
    assert_eq!(response.agent_used, "general_ai_agent");
    assert!(matches!(
        response.diagnostics.as_slice(),
        [TurnFailure::ClassificationLowConfidence { .. }]
    ));
    assert!(mock.calls().is_empty());
}

// =============================================================================
// Partial failure
// =============================================================================

#[tokio::test]
async fn test_second_step_failure_keeps_previous_memory() {
    let (engine, mock) = default_engine();

    script_ijburg_search(&mock);
    assert!(engine.handle_turn("u1", "Italian restaurants in Ijburglaan").await.success);
    let before = engine.get_context("u1").await;

    script_dam_square(&mock);
    mock.fail(ToolName::Search, ToolError::Failed("503 Service Unavailable".to_string()));
    let response = engine.handle_turn("u1", "find cafes near Dam Square").await;

    assert!(!response.success);
    assert!(!response.clarification_needed);
    assert!(matches!(
        response.failure,
        Some(TurnFailure::UpstreamToolFailure { ref tool, .. }) if tool == "maps.search"
    ));
    assert_eq!(response.final_state(), Some(TurnState::Error));

    let after = engine.get_context("u1").await;
    assert_eq!(after.last_search_results, before.last_search_results);
    assert_eq!(after.last_search_location, before.last_search_location);
    assert_eq!(after.turns.len(), before.turns.len());
}

#[tokio::test]
async fn test_deadline_returns_partial_without_write() {
    let mut config = WaypointConfig::default();
    config.router.turn_deadline_ms = 100;
    let (engine, mock) = make_engine(config);

    script_dam_square(&mock);
    mock.respond(ToolName::Search, json!({"places": []}));
    mock.delay(ToolName::Search, Duration::from_millis(400));

    let response = engine.handle_turn("u1", "find cafes near Dam Square").await;
    assert!(!response.success);
    assert!(response.partial);
    assert!(response.response_text.contains("Dam Square is at 52.3731, 4.8926"));

    let ctx = engine.get_context("u1").await;
    assert!(!ctx.has_search_memory());
    assert!(ctx.turns.is_empty());
}

// =============================================================================
// Concurrency
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_same_user_turns_are_serialized() {
    let (engine, mock) = default_engine();
    script_dam_square(&mock);
    mock.respond(ToolName::Search, json!({"places": [{"name": "Cafe", "lat": 52.37, "lon": 4.89}]}));
    mock.delay(ToolName::Geocode, Duration::from_millis(20));
    mock.delay(ToolName::Search, Duration::from_millis(20));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move { engine.handle_turn("u1", "find cafes near Dam Square").await })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert_eq!(mock.max_in_flight(), 1);
    let history = engine.history("u1", 100).await;
    assert_eq!(history.len(), 16);
    for pair in history.chunks(2) {
        assert_eq!(pair[0].role, Role::User);
        assert_eq!(pair[1].role, Role::Agent);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_distinct_users_run_in_parallel() {
    let (engine, mock) = default_engine();
    script_dam_square(&mock);
    mock.respond(ToolName::Search, json!({"places": []}));
    mock.delay(ToolName::Geocode, Duration::from_millis(200));

    let handles: Vec<_> = (0..4)
        .map(|i| {
            let engine = Arc::clone(&engine);
            tokio::spawn(async move {
                engine
                    .handle_turn(&format!("user-{}", i), "find cafes near Dam Square")
                    .await
            })
        })
        .collect();
    for handle in handles {
        assert!(handle.await.unwrap().success);
    }

    assert!(mock.max_in_flight() > 1);
    assert_eq!(engine.store().user_count(), 4);
}

#[tokio::test]
async fn test_history_is_capped() {
    let mut config = WaypointConfig::default();
    config.context.max_turns = 4;
    let (engine, _) = make_engine(config);

    for text in ["hello", "help", "what time is it"] {
        engine.handle_turn("u1", text).await;
    }
    let history = engine.history("u1", 100).await;
    assert_eq!(history.len(), 4);
    assert_eq!(history[0].text, "help");
}
