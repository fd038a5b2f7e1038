//! Response text for every way a turn can end.

use std::sync::LazyLock;

use chrono::{DateTime, Local};
use regex::Regex;
use waypoint_core::types::{IntentCategory, SearchType};

use crate::error::TurnFailure;
use crate::lexicon::join_names;
use crate::planner::ToolPlan;
use crate::router::{ExecutionReport, StepOutput};
use crate::tools::{
    parse_result, DirectionsResult, GeocodeResult, MatrixResult, StaticMapResult, ToolName,
};
use crate::types::IntentDecision;

static GREETING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:hello|hi|hey|good\s+(?:morning|afternoon|evening))\b")
        .expect("Invalid greeting regex")
});
static HELP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bhelp\b|\bwhat\s+can\s+you\s+do\b").expect("Invalid help regex")
});
static WEATHER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:weather|forecast|temperature)\b").expect("Invalid weather regex")
});
static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bwhat\s+time\b|\bcurrent\s+time\b|\btime\s+is\s+it\b")
        .expect("Invalid time regex")
});

const CAPABILITIES: &str = "I can search for places, look up addresses and coordinates, \
give directions and travel times, draw maps, and answer general questions.";

// =============================================================================
// General agent
// =============================================================================

/// Answer a general or statistical turn.
pub fn general(decision: &IntentDecision, now: DateTime<Local>) -> String {
    let text = decision.resolved_query_text.as_str();
    if decision.category == IntentCategory::Statistical {
        return format!(
            "That is a counting question, so I won't answer it with a map search. \
             I don't have an authoritative count for \"{}\", but I can list some \
             examples if you ask me to find them.",
            text.trim()
        );
    }

    if GREETING_RE.is_match(text) {
        format!("Hello! {} What would you like to know?", CAPABILITIES)
    } else if HELP_RE.is_match(text) {
        format!("{} What would you like to know?", CAPABILITIES)
    } else if WEATHER_RE.is_match(text) {
        "I don't have access to live weather data, but I can help you find places \
         or plan a route."
            .to_string()
    } else if TIME_RE.is_match(text) {
        format!("The current time is {}.", now.format("%Y-%m-%d %H:%M:%S"))
    } else {
        format!("I'm here to help! {}", CAPABILITIES)
    }
}

// =============================================================================
// Maps agent
// =============================================================================

/// Describe a fully executed location plan.
pub fn location(plan: &ToolPlan, report: &ExecutionReport) -> String {
    let labels = &plan.labels;
    let names: Vec<&str> = report.memory.results.iter().map(|p| p.name.as_str()).collect();

    match report.search_type {
        SearchType::Search => {
            let area = labels
                .destinations
                .first()
                .map(|a| format!(" near {}", a))
                .unwrap_or_default();
            if names.is_empty() {
                format!("I couldn't find any {}{}.", labels.subject, area)
            } else {
                format!(
                    "Found {} {}{}: {}.",
                    names.len(),
                    labels.subject,
                    area,
                    join_names(&names)
                )
            }
        }
        SearchType::Geocode => {
            let lines: Vec<String> = report
                .memory
                .results
                .iter()
                .map(|p| format!("{} is at {}", p.name, p.coordinates))
                .collect();
            format!("{}.", join_names(&lines))
        }
        SearchType::ReverseGeocode => match report.memory.results.first() {
            Some(place) => format!("{} is {}.", place.coordinates, place.name),
            None => format!("I couldn't find an address for {}.", labels.subject),
        },
        SearchType::Directions => {
            let route = report
                .output_of(ToolName::Directions)
                .and_then(|v| parse_result::<DirectionsResult>(ToolName::Directions, v).ok());
            match route {
                Some(route) => {
                    let via = route
                        .summary
                        .map(|s| format!(" via {}", s))
                        .unwrap_or_default();
                    format!(
                        "From {} to {}: {}, about {}{}.",
                        join_names(&labels.origins),
                        join_names(&labels.destinations),
                        format_distance(route.distance_m),
                        format_duration(route.duration_s),
                        via
                    )
                }
                None => "The route was calculated but returned no details.".to_string(),
            }
        }
        SearchType::Matrix => {
            let matrix = report
                .output_of(ToolName::Matrix)
                .and_then(|v| parse_result::<MatrixResult>(ToolName::Matrix, v).ok());
            let origins = &labels.origins;
            let destinations = &labels.destinations;
            match matrix {
                Some(matrix) if !matrix.cells.is_empty() => {
                    let lines: Vec<String> = matrix
                        .cells
                        .iter()
                        .filter(|c| !(origins == destinations && c.origin == c.destination))
                        .map(|c| {
                            format!(
                                "{} to {}: {}, about {}",
                                label_at(origins, c.origin),
                                label_at(destinations, c.destination),
                                format_distance(c.distance_m),
                                format_duration(c.duration_s)
                            )
                        })
                        .collect();
                    format!("Travel times:\n{}", lines.join("\n"))
                }
                _ => "The distance matrix came back empty.".to_string(),
            }
        }
        SearchType::StaticMap => {
            let map = report
                .output_of(ToolName::StaticMap)
                .and_then(|v| parse_result::<StaticMapResult>(ToolName::StaticMap, v).ok());
            match map {
                Some(map) => format!("Here is a map of {}: {}", labels.subject, map.url),
                None => format!("I couldn't draw a map of {}.", labels.subject),
            }
        }
    }
}

fn label_at(labels: &[String], index: usize) -> String {
    labels
        .get(index)
        .cloned()
        .unwrap_or_else(|| format!("#{}", index + 1))
}

/// Describe the steps that finished before the deadline.
pub fn partial(plan: &ToolPlan, completed: &[StepOutput], pending: &[ToolName]) -> String {
    let found: Vec<String> = completed
        .iter()
        .filter_map(|o| match o.tool {
            ToolName::Geocode => parse_result::<GeocodeResult>(o.tool, &o.value)
                .ok()
                .map(|g| format!("{} is at {}", o.label, g.coordinates())),
            _ => None,
        })
        .collect();

    let mut text = format!(
        "I ran out of time before finishing your {} request; {} step{} did not run.",
        search_phrase(plan.search_type),
        pending.len(),
        if pending.len() == 1 { "" } else { "s" }
    );
    if !found.is_empty() {
        text.push_str(&format!(" So far: {}.", join_names(&found)));
    }
    text.push_str(" Please try again.");
    text
}

/// Text for a turn that ended in `failure`.
pub fn failure(failure: &TurnFailure) -> String {
    match failure {
        TurnFailure::ResolutionFailure { markers } => {
            let quoted: Vec<String> = markers.iter().map(|m| format!("\"{}\"", m)).collect();
            format!(
                "I'm not sure what {} refers to. Could you name the place, or search for it first?",
                join_names(&quoted)
            )
        }
        TurnFailure::IncompleteQuery {
            search_type,
            missing,
        } => format!(
            "To help with that {} I need {}. Could you add it?",
            search_phrase(*search_type),
            missing
        ),
        TurnFailure::UpstreamToolFailure { tool, .. } => format!(
            "Sorry, I couldn't complete that because {} is not responding right now. Please try again.",
            tool
        ),
        TurnFailure::InvalidUtterance { reason } => {
            format!("I couldn't read that message: {}.", reason)
        }
        TurnFailure::GeoBiasUnresolved { token } => {
            format!("I couldn't place \"{}\". Could you add the city or country?", token)
        }
        TurnFailure::ClassificationLowConfidence { .. } | TurnFailure::InvalidTransition { .. } => {
            "Sorry, something went wrong handling that message. Could you rephrase it?".to_string()
        }
    }
}

fn search_phrase(search_type: SearchType) -> &'static str {
    match search_type {
        SearchType::Search => "place search",
        SearchType::Geocode => "location lookup",
        SearchType::ReverseGeocode => "address lookup",
        SearchType::Directions => "directions",
        SearchType::Matrix => "travel time comparison",
        SearchType::StaticMap => "map",
    }
}

fn format_distance(meters: f64) -> String {
    if meters < 1000.0 {
        format!("{:.0} m", meters)
    } else {
        format!("{:.1} km", meters / 1000.0)
    }
}

fn format_duration(seconds: f64) -> String {
    let minutes = (seconds / 60.0).round() as u64;
    if minutes < 60 {
        format!("{} min", minutes.max(1))
    } else {
        format!("{} h {} min", minutes / 60, minutes % 60)
    }
}
