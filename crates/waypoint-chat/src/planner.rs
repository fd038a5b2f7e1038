//! Tool plans for location intents.
//!
//! A [`ToolPlan`] is an ordered list of [`PlannedStep`]s. A step that needs an
//! earlier step's coordinates declares a [`StepBinding`] instead of a literal
//! value, so the router can only issue it once that output exists. The plan
//! also says which outputs become search memory if the whole plan succeeds.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;
use waypoint_core::types::{Coordinates, PlaceRecord, SearchType};
use waypoint_geo::{GeoBiasResolver, GeoResolution};

use crate::error::TurnFailure;
use crate::lexicon::{find_coordinates, CATEGORY_RE, STOP_WORDS};
use crate::reference::ReferenceResolution;
use crate::tools::{coordinates_param, ToolName};
use crate::types::{IntentDecision, ResolvedEntity};

// =============================================================================
// Token extraction patterns
// =============================================================================

static FROM_TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\bfrom\s+(?P<origin>.+?)\s+to\s+(?P<dest>.+)$").expect("Invalid route regex")
});
static TO_FROM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.*\bto\s+(?P<dest>.+?)\s+from\s+(?P<origin>.+)$").expect("Invalid route regex")
});
static FROM_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfrom\s+(?P<origin>.+)$").expect("Invalid route regex"));
static TO_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^.*\b(?:to|towards)\s+(?P<dest>.+)$").expect("Invalid route regex")
});
static AREA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:in|near|around|at|close\s+to|next\s+to)\s+(?P<area>.+)$")
        .expect("Invalid area regex")
});
static BETWEEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bbetween\s+(?P<list>.+)$").expect("Invalid list regex"));
static LIST_SPLIT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*,\s*(?:and\s+)?|\s+and\s+").expect("Invalid list regex"));
static GEOCODE_TARGET_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\b(?:coordinates|location|address|latitude|longitude|position)\s+(?:of|for)\s+(?P<place>.+)$",
        r"(?i)\bwhere\s+(?:is|are)\s+(?P<place>.+?)(?:\s+located)?\s*[?.!]*$",
        r"(?i)\bgeocode\s+(?P<place>.+)$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid geocode regex"))
    .collect()
});
static MAP_TARGET_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)\bmap\s+(?:of|for)\s+(?P<place>.+)$",
        r"(?i)\bshow\s+(?:me\s+)?(?P<place>.+?)\s+on\s+a\s+map\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("Invalid map regex"))
    .collect()
});
static SEARCH_LEAD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^\s*(?:(?:please|can\s+you|could\s+you|i\s+want\s+to|i'd\s+like\s+to)\s+)*(?:find|search\s+for|search|look\s+for|show\s+me|get\s+me|list|are\s+there\s+any|any)\s+(?:me\s+)?(?:(?:some|the|a|an|all|any)\s+)?",
    )
    .expect("Invalid search lead regex")
});

/// Words meaning "the user's own position", which we cannot geocode.
const HERE_WORDS: &[&str] = &["me", "here", "us", "my location", "my position", "where i am"];

const DEFAULT_MAP_ZOOM: u8 = 13;

// =============================================================================
// Plan types
// =============================================================================

/// Fill `pointer` in a step's params with the coordinates output by `from_step`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepBinding {
    /// JSON pointer into the step's params, e.g. "/origin".
    pub pointer: String,
    pub from_step: usize,
}

/// One tool call in a plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlannedStep {
    pub tool: ToolName,
    /// Human-readable subject of the call, e.g. the place being geocoded.
    pub label: String,
    pub params: Value,
    pub bindings: Vec<StepBinding>,
}

impl PlannedStep {
    fn new(tool: ToolName, label: impl Into<String>, params: Value) -> Self {
        Self {
            tool,
            label: label.into(),
            params,
            bindings: Vec::new(),
        }
    }

    /// Indices of the steps whose output this step needs.
    pub fn depends_on(&self) -> Vec<usize> {
        let mut deps: Vec<usize> = self.bindings.iter().map(|b| b.from_step).collect();
        deps.sort_unstable();
        deps.dedup();
        deps
    }
}

/// Where a remembered place comes from once the plan has run.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum PlaceSource {
    Known { place: PlaceRecord },
    Geocoded { step: usize, label: String },
    SearchResults { step: usize, category: String },
    ReverseGeocoded { step: usize, at: Coordinates },
}

/// Where the remembered search location comes from.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum LocationSource {
    Fixed { coordinates: Coordinates },
    Geocoded { step: usize },
}

/// Labels used when composing the response.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PlanLabels {
    pub subject: String,
    pub origins: Vec<String>,
    pub destinations: Vec<String>,
}

/// Ordered tool calls for one location turn.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolPlan {
    pub search_type: SearchType,
    pub query_id: Uuid,
    pub steps: Vec<PlannedStep>,
    pub memory_places: Vec<PlaceSource>,
    pub memory_location: Option<LocationSource>,
    pub labels: PlanLabels,
    /// Bias lookups made while planning, in step order.
    pub geo: Vec<GeoResolution>,
}

impl ToolPlan {
    /// Tokens that were geocoded without a bias hint.
    pub fn unresolved_places(&self) -> Vec<String> {
        self.geo
            .iter()
            .filter_map(|g| match g {
                GeoResolution::Unresolved { token } => Some(token.clone()),
                GeoResolution::Resolved(_) => None,
            })
            .collect()
    }
}

/// Result of planning.
#[derive(Debug, Clone, PartialEq)]
pub enum PlanOutcome {
    Ready(ToolPlan),
    /// The utterance lacks something only the user can supply.
    NeedsClarification(TurnFailure),
}

// =============================================================================
// Planner
// =============================================================================

/// A place mentioned in the utterance, before any tool call.
#[derive(Debug, Clone)]
enum Endpoint {
    Places(Vec<PlaceRecord>),
    Point { label: String, coordinates: Coordinates },
    Lookup(String),
}

/// Where an endpoint's coordinates will come from at execution time.
#[derive(Debug, Clone)]
enum Slot {
    Literal { label: String, coordinates: Coordinates },
    Step { label: String, step: usize },
    Many(Vec<PlaceRecord>),
}

impl Slot {
    fn labels(&self) -> Vec<String> {
        match self {
            Slot::Literal { label, .. } | Slot::Step { label, .. } => vec![label.clone()],
            Slot::Many(places) => places.iter().map(|p| p.name.clone()).collect(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Slot::Many(places) => places.len(),
            _ => 1,
        }
    }
}

/// Turns a location decision into a [`ToolPlan`].
#[derive(Debug, Clone)]
pub struct Planner {
    geo: GeoBiasResolver,
    max_results: usize,
}

struct PlanBuilder<'a> {
    geo: &'a GeoBiasResolver,
    steps: Vec<PlannedStep>,
    resolutions: Vec<GeoResolution>,
}

impl PlanBuilder<'_> {
    /// Materialize an endpoint, adding a geocode step when needed.
    fn locate(&mut self, endpoint: Endpoint) -> Slot {
        match endpoint {
            Endpoint::Places(places) => Slot::Many(places),
            Endpoint::Point { label, coordinates } => Slot::Literal { label, coordinates },
            Endpoint::Lookup(token) => {
                let resolution = self.geo.resolve(&token);
                let mut params = json!({ "query": token, "limit": 1 });
                if let Some(bias) = resolution.bias() {
                    params["bias"] = coordinates_param(bias.coordinates);
                    params["country"] = json!(bias.country);
                }
                self.resolutions.push(resolution);
                self.steps
                    .push(PlannedStep::new(ToolName::Geocode, token.clone(), params));
                Slot::Step {
                    label: token,
                    step: self.steps.len() - 1,
                }
            }
        }
    }

    /// JSON value for a single-coordinate slot, recording a binding if it
    /// comes from an earlier step.
    fn point_value(&self, slot: &Slot, pointer: &str, bindings: &mut Vec<StepBinding>) -> Value {
        match slot {
            Slot::Literal { coordinates, .. } => coordinates_param(*coordinates),
            Slot::Step { step, .. } => {
                bindings.push(StepBinding {
                    pointer: pointer.to_string(),
                    from_step: *step,
                });
                Value::Null
            }
            Slot::Many(places) => places
                .first()
                .map(|p| coordinates_param(p.coordinates))
                .unwrap_or(Value::Null),
        }
    }

    /// JSON array for a list of slots, flattening place sets.
    fn list_value(&self, slots: &[Slot], field: &str, bindings: &mut Vec<StepBinding>) -> Value {
        let mut values = Vec::new();
        for slot in slots {
            match slot {
                Slot::Many(places) => {
                    values.extend(places.iter().map(|p| coordinates_param(p.coordinates)))
                }
                other => {
                    let pointer = format!("/{}/{}", field, values.len());
                    values.push(self.point_value(other, &pointer, bindings));
                }
            }
        }
        Value::Array(values)
    }
}

fn memory_places(slot: &Slot, query_id: Uuid) -> Vec<PlaceSource> {
    match slot {
        Slot::Many(places) => places
            .iter()
            .map(|p| PlaceSource::Known { place: p.clone() })
            .collect(),
        Slot::Step { label, step } => vec![PlaceSource::Geocoded {
            step: *step,
            label: label.clone(),
        }],
        Slot::Literal { label, coordinates } => vec![PlaceSource::Known {
            place: PlaceRecord {
                name: label.clone(),
                coordinates: *coordinates,
                category: "location".to_string(),
                source_query_id: query_id,
            },
        }],
    }
}

fn memory_location(slot: &Slot) -> Option<LocationSource> {
    match slot {
        Slot::Literal { coordinates, .. } => Some(LocationSource::Fixed {
            coordinates: *coordinates,
        }),
        Slot::Step { step, .. } => Some(LocationSource::Geocoded { step: *step }),
        Slot::Many(places) => places.first().map(|p| LocationSource::Fixed {
            coordinates: p.coordinates,
        }),
    }
}

impl Planner {
    pub fn new(geo: GeoBiasResolver, max_results: usize) -> Self {
        Self {
            geo,
            max_results: max_results.max(1),
        }
    }

    pub fn geo(&self) -> &GeoBiasResolver {
        &self.geo
    }

    /// Build the tool plan for a location decision.
    ///
    /// Place tokens are read from the original utterance; tokens that are
    /// referring expressions use the values the reference resolver bound.
    pub fn plan(&self, decision: &IntentDecision, refs: &ReferenceResolution) -> PlanOutcome {
        let search_type = decision.search_type.unwrap_or(SearchType::Search);
        let text = refs.original_text.as_str();
        let query_id = Uuid::new_v4();
        let mut builder = PlanBuilder {
            geo: &self.geo,
            steps: Vec::new(),
            resolutions: Vec::new(),
        };

        let outcome = match search_type {
            SearchType::Search => self.plan_search(text, refs, &mut builder),
            SearchType::Geocode => self.plan_geocode(text, refs, query_id, &mut builder),
            SearchType::ReverseGeocode => self.plan_reverse(text, refs, &mut builder),
            SearchType::Directions => self.plan_route(text, refs, query_id, &mut builder),
            SearchType::Matrix => self.plan_matrix(text, refs, query_id, &mut builder),
            SearchType::StaticMap => self.plan_map(text, refs, query_id, &mut builder),
        };

        match outcome {
            Ok(partial) => {
                let plan = ToolPlan {
                    search_type: partial.search_type,
                    query_id,
                    steps: builder.steps,
                    memory_places: partial.memory_places,
                    memory_location: partial.memory_location,
                    labels: partial.labels,
                    geo: builder.resolutions,
                };
                debug!(
                    search_type = %plan.search_type,
                    steps = plan.steps.len(),
                    "Tool plan ready"
                );
                PlanOutcome::Ready(plan)
            }
            Err(missing) => {
                debug!(search_type = %search_type, missing, "Location query incomplete");
                PlanOutcome::NeedsClarification(TurnFailure::IncompleteQuery {
                    search_type,
                    missing: missing.to_string(),
                })
            }
        }
    }

    fn plan_search(
        &self,
        text: &str,
        refs: &ReferenceResolution,
        builder: &mut PlanBuilder<'_>,
    ) -> Result<PlanParts, &'static str> {
        let term = search_term(text);
        let area = capture(&AREA_RE, text, "area").and_then(|t| endpoint(&t, refs));

        let mut params = json!({ "query": term, "limit": self.max_results });
        let mut bindings = Vec::new();
        let mut location = None;
        let mut area_label = String::new();
        if let Some(area) = area {
            let slot = builder.locate(area);
            params["near"] = builder.point_value(&slot, "/near", &mut bindings);
            location = memory_location(&slot);
            area_label = slot.labels().first().cloned().unwrap_or_default();
        }

        let mut step = PlannedStep::new(ToolName::Search, term.clone(), params);
        step.bindings = bindings;
        builder.steps.push(step);
        let search_step = builder.steps.len() - 1;

        Ok(PlanParts {
            search_type: SearchType::Search,
            memory_places: vec![PlaceSource::SearchResults {
                step: search_step,
                category: category_of(&term),
            }],
            memory_location: location,
            labels: PlanLabels {
                subject: term,
                origins: Vec::new(),
                destinations: if area_label.is_empty() {
                    Vec::new()
                } else {
                    vec![area_label]
                },
            },
        })
    }

    fn plan_geocode(
        &self,
        text: &str,
        refs: &ReferenceResolution,
        query_id: Uuid,
        builder: &mut PlanBuilder<'_>,
    ) -> Result<PlanParts, &'static str> {
        let target = GEOCODE_TARGET_RES
            .iter()
            .find_map(|re| capture(re, text, "place"))
            .or_else(|| capture(&AREA_RE, text, "area"))
            .and_then(|t| endpoint(&t, refs))
            .or_else(|| refs.target_places().map(|p| Endpoint::Places(p.to_vec())))
            .ok_or("a place name")?;

        let slot = builder.locate(target);
        Ok(PlanParts {
            search_type: SearchType::Geocode,
            memory_places: memory_places(&slot, query_id),
            memory_location: memory_location(&slot),
            labels: PlanLabels {
                subject: slot.labels().join(", "),
                origins: Vec::new(),
                destinations: slot.labels(),
            },
        })
    }

    fn plan_reverse(
        &self,
        text: &str,
        refs: &ReferenceResolution,
        builder: &mut PlanBuilder<'_>,
    ) -> Result<PlanParts, &'static str> {
        let at = find_coordinates(text)
            .or_else(|| refs.anchor_location())
            .ok_or("a coordinate pair")?;

        builder.steps.push(PlannedStep::new(
            ToolName::ReverseGeocode,
            at.to_string(),
            coordinates_param(at),
        ));
        Ok(PlanParts {
            search_type: SearchType::ReverseGeocode,
            memory_places: vec![PlaceSource::ReverseGeocoded {
                step: builder.steps.len() - 1,
                at,
            }],
            memory_location: Some(LocationSource::Fixed { coordinates: at }),
            labels: PlanLabels {
                subject: at.to_string(),
                ..Default::default()
            },
        })
    }

    fn plan_route(
        &self,
        text: &str,
        refs: &ReferenceResolution,
        query_id: Uuid,
        builder: &mut PlanBuilder<'_>,
    ) -> Result<PlanParts, &'static str> {
        let (origin_token, dest_token) = route_tokens(text);
        let mut origin = origin_token.and_then(|t| endpoint(&t, refs));
        let mut dest = dest_token.and_then(|t| endpoint(&t, refs));

        // Fill a missing end from the references, preferring the place set.
        let referenced_places = refs.target_places().map(|p| Endpoint::Places(p.to_vec()));
        let referenced_point = refs.anchor_location().map(|coordinates| Endpoint::Point {
            label: coordinates.to_string(),
            coordinates,
        });
        let uses_places = |e: &Option<Endpoint>| matches!(e, Some(Endpoint::Places(_)));
        if dest.is_none() {
            dest = if uses_places(&origin) {
                referenced_point.clone()
            } else {
                referenced_places.clone().or_else(|| referenced_point.clone())
            };
        }
        if origin.is_none() {
            origin = if uses_places(&dest) {
                referenced_point
            } else {
                referenced_places.or(referenced_point)
            };
        }

        let origin = origin.ok_or("an origin")?;
        let dest = dest.ok_or("a destination")?;
        let origin = builder.locate(origin);
        let dest = builder.locate(dest);

        let mut bindings = Vec::new();
        let matrix = origin.len() > 1 || dest.len() > 1;
        let (tool, params, search_type) = if matrix {
            let origins = builder.list_value(std::slice::from_ref(&origin), "origins", &mut bindings);
            let destinations =
                builder.list_value(std::slice::from_ref(&dest), "destinations", &mut bindings);
            (
                ToolName::Matrix,
                json!({ "origins": origins, "destinations": destinations }),
                SearchType::Matrix,
            )
        } else {
            let o = builder.point_value(&origin, "/origin", &mut bindings);
            let d = builder.point_value(&dest, "/destination", &mut bindings);
            (
                ToolName::Directions,
                json!({ "origin": o, "destination": d }),
                SearchType::Directions,
            )
        };

        let mut step = PlannedStep::new(tool, dest.labels().join(", "), params);
        step.bindings = bindings;
        builder.steps.push(step);

        Ok(PlanParts {
            search_type,
            memory_places: memory_places(&dest, query_id),
            memory_location: memory_location(&origin),
            labels: PlanLabels {
                subject: dest.labels().join(", "),
                origins: origin.labels(),
                destinations: dest.labels(),
            },
        })
    }

    fn plan_matrix(
        &self,
        text: &str,
        refs: &ReferenceResolution,
        query_id: Uuid,
        builder: &mut PlanBuilder<'_>,
    ) -> Result<PlanParts, &'static str> {
        let listed: Vec<Endpoint> = capture(&BETWEEN_RE, text, "list")
            .map(|list| {
                LIST_SPLIT_RE
                    .split(&list)
                    .filter_map(|t| endpoint(t, refs))
                    .collect()
            })
            .unwrap_or_default();

        let endpoints = if listed.len() >= 2 {
            listed
        } else {
            match refs.target_places() {
                Some(places) if places.len() >= 2 => vec![Endpoint::Places(places.to_vec())],
                _ => return Err("at least two places"),
            }
        };

        let slots: Vec<Slot> = endpoints.into_iter().map(|e| builder.locate(e)).collect();
        let mut bindings = Vec::new();
        let origins = builder.list_value(&slots, "origins", &mut bindings);
        let mut dest_bindings = Vec::new();
        let destinations = builder.list_value(&slots, "destinations", &mut dest_bindings);
        bindings.extend(dest_bindings);

        let labels: Vec<String> = slots.iter().flat_map(Slot::labels).collect();
        let mut step = PlannedStep::new(
            ToolName::Matrix,
            labels.join(", "),
            json!({ "origins": origins, "destinations": destinations }),
        );
        step.bindings = bindings;
        builder.steps.push(step);

        Ok(PlanParts {
            search_type: SearchType::Matrix,
            memory_places: slots
                .iter()
                .flat_map(|s| memory_places(s, query_id))
                .collect(),
            memory_location: slots.first().and_then(memory_location),
            labels: PlanLabels {
                subject: labels.join(", "),
                origins: labels.clone(),
                destinations: labels,
            },
        })
    }

    fn plan_map(
        &self,
        text: &str,
        refs: &ReferenceResolution,
        query_id: Uuid,
        builder: &mut PlanBuilder<'_>,
    ) -> Result<PlanParts, &'static str> {
        let target = MAP_TARGET_RES
            .iter()
            .find_map(|re| capture(re, text, "place"))
            .or_else(|| capture(&AREA_RE, text, "area"))
            .and_then(|t| endpoint(&t, refs))
            .or_else(|| refs.target_places().map(|p| Endpoint::Places(p.to_vec())))
            .or_else(|| {
                refs.anchor_location().map(|coordinates| Endpoint::Point {
                    label: coordinates.to_string(),
                    coordinates,
                })
            })
            .ok_or("a place to map")?;

        let slot = builder.locate(target);
        let mut bindings = Vec::new();
        let center = builder.point_value(&slot, "/center", &mut bindings);
        let markers = match &slot {
            Slot::Many(places) => places
                .iter()
                .map(|p| coordinates_param(p.coordinates))
                .collect(),
            _ => Vec::new(),
        };
        let mut step = PlannedStep::new(
            ToolName::StaticMap,
            slot.labels().join(", "),
            json!({ "center": center, "zoom": DEFAULT_MAP_ZOOM, "markers": markers }),
        );
        step.bindings = bindings;
        builder.steps.push(step);

        Ok(PlanParts {
            search_type: SearchType::StaticMap,
            memory_places: memory_places(&slot, query_id),
            memory_location: memory_location(&slot),
            labels: PlanLabels {
                subject: slot.labels().join(", "),
                origins: Vec::new(),
                destinations: slot.labels(),
            },
        })
    }
}

struct PlanParts {
    search_type: SearchType,
    memory_places: Vec<PlaceSource>,
    memory_location: Option<LocationSource>,
    labels: PlanLabels,
}

// =============================================================================
// Token helpers
// =============================================================================

fn capture(re: &Regex, text: &str, group: &str) -> Option<String> {
    re.captures(text)
        .and_then(|caps| caps.name(group).map(|m| m.as_str().to_string()))
}

fn route_tokens(text: &str) -> (Option<String>, Option<String>) {
    if let Some(caps) = FROM_TO_RE.captures(text) {
        return (
            caps.name("origin").map(|m| m.as_str().to_string()),
            caps.name("dest").map(|m| m.as_str().to_string()),
        );
    }
    if let Some(caps) = TO_FROM_RE.captures(text) {
        return (
            caps.name("origin").map(|m| m.as_str().to_string()),
            caps.name("dest").map(|m| m.as_str().to_string()),
        );
    }
    (
        capture(&FROM_RE, text, "origin"),
        capture(&TO_RE, text, "dest"),
    )
}

/// Trim punctuation and filler around a captured place token.
fn clean_token(raw: &str) -> Option<String> {
    let mut token = raw
        .trim()
        .trim_end_matches(|c: char| matches!(c, '?' | '.' | '!' | ',' | ';'))
        .trim()
        .to_string();
    for suffix in [" please", " located"] {
        let cut = token.len().saturating_sub(suffix.len());
        if token.is_char_boundary(cut) && token[cut..].eq_ignore_ascii_case(suffix) {
            token.truncate(cut);
        }
    }
    let token = token.trim().to_string();
    let lower = token.to_lowercase();
    if token.is_empty() || HERE_WORDS.contains(&lower.as_str()) {
        None
    } else {
        Some(token)
    }
}

fn strip_article(token: &str) -> &str {
    match token.get(..4) {
        Some(prefix) if prefix.eq_ignore_ascii_case("the ") && !token.eq_ignore_ascii_case("the same") => {
            token[4..].trim_start()
        }
        _ => token,
    }
}

/// Interpret a place token: a resolved reference, a coordinate pair, or a
/// name to geocode.
fn endpoint(raw: &str, refs: &ReferenceResolution) -> Option<Endpoint> {
    let token = clean_token(raw)?;
    match refs.entity_for(&token) {
        Some(ResolvedEntity::Places { places }) => return Some(Endpoint::Places(places.clone())),
        Some(ResolvedEntity::Location { coordinates }) => {
            return Some(Endpoint::Point {
                label: token,
                coordinates: *coordinates,
            })
        }
        None => {}
    }
    if let Some(coordinates) = find_coordinates(&token) {
        return Some(Endpoint::Point {
            label: coordinates.to_string(),
            coordinates,
        });
    }
    let name = strip_article(&token);
    (!name.is_empty()).then(|| Endpoint::Lookup(name.to_string()))
}

/// What to search for: a category noun with at most one modifier, or the
/// text between the leading verb and the area preposition.
fn search_term(text: &str) -> String {
    if let Some(m) = CATEGORY_RE.find(text) {
        let modifier = text[..m.start()]
            .split_whitespace()
            .last()
            .filter(|w| w.chars().all(char::is_alphabetic))
            .filter(|w| !STOP_WORDS.contains(&w.to_lowercase().as_str()));
        let term = match modifier {
            Some(w) => format!("{} {}", w, m.as_str()),
            None => m.as_str().to_string(),
        };
        return term.to_lowercase();
    }

    let stripped = SEARCH_LEAD_RE.replace(text, "");
    let term = match AREA_RE.find(&stripped) {
        Some(m) => &stripped[..m.start()],
        None => &stripped[..],
    };
    clean_token(term)
        .map(|t| t.to_lowercase())
        .unwrap_or_else(|| text.trim().to_lowercase())
}

/// Category recorded on search results that do not report one.
fn category_of(term: &str) -> String {
    CATEGORY_RE
        .find(term)
        .map(|m| m.as_str().to_lowercase())
        .unwrap_or_else(|| term.to_string())
}

// =============================================================================
// Tests
// =============================================================================
