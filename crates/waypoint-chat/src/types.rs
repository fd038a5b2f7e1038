use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use waypoint_core::types::{Coordinates, IntentCategory, PlaceRecord, RoutingTarget, SearchType};

use crate::error::TurnFailure;
use crate::state_machine::TurnState;

// =============================================================================
// Turns
// =============================================================================

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    User,
    Agent,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Agent => write!(f, "agent"),
        }
    }
}

/// Value substituted for a referring expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResolvedEntity {
    Places { places: Vec<PlaceRecord> },
    Location { coordinates: Coordinates },
}

/// One message in a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub text: String,
    pub timestamp: DateTime<Utc>,
    /// Referring expression (lower-cased) to the value it was resolved to.
    #[serde(default)]
    pub resolved_entities: BTreeMap<String, ResolvedEntity>,
}

impl Turn {
    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Role::User, text)
    }

    pub fn agent(text: impl Into<String>) -> Self {
        Self::new(Role::Agent, text)
    }

    fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
            resolved_entities: BTreeMap::new(),
        }
    }

    pub fn with_entities(mut self, entities: BTreeMap<String, ResolvedEntity>) -> Self {
        self.resolved_entities = entities;
        self
    }
}

// =============================================================================
// Conversation context
// =============================================================================

/// Per-user conversation memory. Owned by the context store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub user_id: String,
    /// Oldest first, bounded by the store's `max_turns`.
    pub turns: Vec<Turn>,
    pub last_search_type: Option<SearchType>,
    pub last_search_results: Vec<PlaceRecord>,
    pub last_search_place_names: BTreeSet<String>,
    pub last_search_location: Option<Coordinates>,
    pub last_intent: Option<IntentCategory>,
    /// User turns recorded since search memory was last written.
    pub turns_since_search: u32,
    pub updated_at: DateTime<Utc>,
}

impl ConversationContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            turns: Vec::new(),
            last_search_type: None,
            last_search_results: Vec::new(),
            last_search_place_names: BTreeSet::new(),
            last_search_location: None,
            last_intent: None,
            turns_since_search: 0,
            updated_at: Utc::now(),
        }
    }

    /// Append a turn, dropping the oldest turns beyond `max_turns`.
    pub fn push_turn(&mut self, turn: Turn, max_turns: usize) {
        if turn.role == Role::User {
            self.turns_since_search = self.turns_since_search.saturating_add(1);
        }
        self.turns.push(turn);
        if self.turns.len() > max_turns {
            let excess = self.turns.len() - max_turns;
            self.turns.drain(..excess);
        }
        self.updated_at = Utc::now();
    }

    /// Replace search memory wholesale.
    pub fn apply_search_memory(&mut self, memory: SearchMemory) {
        self.last_search_type = Some(memory.search_type);
        self.last_search_results = memory.results;
        self.last_search_place_names = memory.place_names;
        self.last_search_location = memory.location;
        self.turns_since_search = 0;
        self.updated_at = Utc::now();
    }

    /// Apply an administrative patch. Fields left as `None` are unchanged.
    pub fn apply_patch(&mut self, patch: ContextPatch) {
        if patch.clear_search_memory {
            self.last_search_type = None;
            self.last_search_results.clear();
            self.last_search_place_names.clear();
            self.last_search_location = None;
        }

        let touches_memory = patch.last_search_type.is_some()
            || patch.last_search_results.is_some()
            || patch.last_search_place_names.is_some()
            || patch.last_search_location.is_some();

        if let Some(search_type) = patch.last_search_type {
            self.last_search_type = Some(search_type);
        }
        if let Some(results) = patch.last_search_results {
            if patch.last_search_place_names.is_none() {
                self.last_search_place_names = results.iter().map(|p| p.name.clone()).collect();
            }
            self.last_search_results = results;
        }
        if let Some(names) = patch.last_search_place_names {
            self.last_search_place_names = names;
        }
        if let Some(location) = patch.last_search_location {
            self.last_search_location = Some(location);
        }
        if let Some(intent) = patch.last_intent {
            self.last_intent = Some(intent);
        }

        if touches_memory {
            self.turns_since_search = 0;
        }
        self.updated_at = Utc::now();
    }

    pub fn has_search_memory(&self) -> bool {
        !self.last_search_results.is_empty() || self.last_search_location.is_some()
    }

    /// Whether search memory may still be referenced.
    ///
    /// Memory is fresh while fewer than `recency_window` user turns have been
    /// recorded since it was written.
    pub fn is_memory_fresh(&self, recency_window: u32) -> bool {
        self.has_search_memory() && self.turns_since_search < recency_window
    }

    /// Short plain-text summary passed to the advisory classifier.
    pub fn summary(&self) -> String {
        let mut parts = Vec::new();
        if let Some(intent) = self.last_intent {
            parts.push(format!("last intent: {}", intent));
        }
        if let Some(search_type) = self.last_search_type {
            parts.push(format!("last search: {}", search_type));
        }
        if !self.last_search_place_names.is_empty() {
            let names: Vec<&str> = self
                .last_search_place_names
                .iter()
                .map(String::as_str)
                .collect();
            parts.push(format!("places: {}", names.join(", ")));
        }
        if let Some(last_user) = self.turns.iter().rev().find(|t| t.role == Role::User) {
            parts.push(format!("previous message: {}", last_user.text));
        }
        parts.join("; ")
    }
}

/// Search memory written after a successful location query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchMemory {
    pub search_type: SearchType,
    pub results: Vec<PlaceRecord>,
    pub place_names: BTreeSet<String>,
    pub location: Option<Coordinates>,
}

impl SearchMemory {
    /// Build memory whose place names are taken from `results`.
    pub fn from_results(
        search_type: SearchType,
        results: Vec<PlaceRecord>,
        location: Option<Coordinates>,
    ) -> Self {
        let place_names = results.iter().map(|p| p.name.clone()).collect();
        Self {
            search_type,
            results,
            place_names,
            location,
        }
    }
}

/// Partial update applied by `set_context`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextPatch {
    pub last_search_type: Option<SearchType>,
    pub last_search_results: Option<Vec<PlaceRecord>>,
    pub last_search_place_names: Option<BTreeSet<String>>,
    pub last_search_location: Option<Coordinates>,
    pub last_intent: Option<IntentCategory>,
    /// Clear all search memory before applying the other fields.
    pub clear_search_memory: bool,
}

// =============================================================================
// Decisions and results
// =============================================================================

/// Which stage produced an intent decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionSource {
    StatisticalRule,
    LocationRule,
    Advisory,
    Default,
}

/// Output of the intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntentDecision {
    pub category: IntentCategory,
    /// 0.0 to 1.0.
    pub confidence: f32,
    pub resolved_query_text: String,
    pub routing_target: RoutingTarget,
    /// Location sub-type, when a location rule matched.
    pub search_type: Option<SearchType>,
    pub source: DecisionSource,
    /// Set when no stage was confident and the decision fell back to general.
    pub low_confidence: bool,
}

impl IntentDecision {
    pub fn new(
        category: IntentCategory,
        confidence: f32,
        resolved_query_text: impl Into<String>,
        source: DecisionSource,
    ) -> Self {
        Self {
            category,
            confidence: confidence.clamp(0.0, 1.0),
            resolved_query_text: resolved_query_text.into(),
            routing_target: category.routing_target(),
            search_type: None,
            source,
            low_confidence: false,
        }
    }

    pub fn with_search_type(mut self, search_type: Option<SearchType>) -> Self {
        self.search_type = search_type;
        self
    }
}

/// Result of `handle_turn`. Every failure is reported here; nothing is thrown.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TurnResponse {
    pub response_text: String,
    pub agent_used: String,
    pub query_type: String,
    pub success: bool,
    /// The user should rephrase or add detail.
    pub clarification_needed: bool,
    /// The deadline elapsed and `response_text` covers completed steps only.
    pub partial: bool,
    /// Why `success` is false.
    pub failure: Option<TurnFailure>,
    /// Non-fatal signals raised along the way.
    pub diagnostics: Vec<TurnFailure>,
    /// States visited, in order.
    pub states: Vec<TurnState>,
}

impl TurnResponse {
    pub fn final_state(&self) -> Option<TurnState> {
        self.states.last().copied()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn place(name: &str) -> PlaceRecord {
        PlaceRecord {
            name: name.to_string(),
            coordinates: Coordinates::new(52.35, 4.99),
            category: "restaurant".to_string(),
            source_query_id: Uuid::new_v4(),
        }
    }

    #[test]
    fn test_push_turn_trims_oldest() {
        let mut ctx = ConversationContext::new("u1");
        for i in 0..5 {
            ctx.push_turn(Turn::user(format!("message {}", i)), 3);
        }
        assert_eq!(ctx.turns.len(), 3);
        assert_eq!(ctx.turns[0].text, "message 2");
        assert_eq!(ctx.turns[2].text, "message 4");
    }

    #[test]
    fn test_only_user_turns_age_memory() {
        let mut ctx = ConversationContext::new("u1");
        ctx.apply_search_memory(SearchMemory::from_results(
            SearchType::Search,
            vec![place("A")],
            None,
        ));
        assert!(ctx.is_memory_fresh(1));

        ctx.push_turn(Turn::agent("Found 1 place"), 10);
        assert!(ctx.is_memory_fresh(1));

        ctx.push_turn(Turn::user("thanks"), 10);
        assert_eq!(ctx.turns_since_search, 1);
        assert!(!ctx.is_memory_fresh(1));
        assert!(ctx.is_memory_fresh(2));
    }

    #[test]
    fn test_empty_memory_is_never_fresh() {
        let ctx = ConversationContext::new("u1");
        assert!(!ctx.is_memory_fresh(5));
    }

    #[test]
    fn test_search_memory_derives_place_names() {
        let memory =
            SearchMemory::from_results(SearchType::Search, vec![place("A"), place("B")], None);
        assert_eq!(
            memory.place_names,
            BTreeSet::from(["A".to_string(), "B".to_string()])
        );
    }

    #[test]
    fn test_patch_leaves_unset_fields() {
        let mut ctx = ConversationContext::new("u1");
        ctx.apply_search_memory(SearchMemory::from_results(
            SearchType::Search,
            vec![place("A")],
            Some(Coordinates::new(1.0, 2.0)),
        ));
        ctx.push_turn(Turn::user("hello"), 10);

        ctx.apply_patch(ContextPatch {
            last_intent: Some(IntentCategory::General),
            ..Default::default()
        });
        assert_eq!(ctx.last_search_results.len(), 1);
        assert_eq!(ctx.last_intent, Some(IntentCategory::General));
        assert_eq!(ctx.turns_since_search, 1);

        ctx.apply_patch(ContextPatch {
            last_search_results: Some(vec![place("B"), place("C")]),
            ..Default::default()
        });
        assert_eq!(ctx.last_search_results.len(), 2);
        assert!(ctx.last_search_place_names.contains("C"));
        assert_eq!(ctx.last_search_location, Some(Coordinates::new(1.0, 2.0)));
        assert_eq!(ctx.turns_since_search, 0);
    }

    #[test]
    fn test_patch_clear_search_memory() {
        let mut ctx = ConversationContext::new("u1");
        ctx.apply_search_memory(SearchMemory::from_results(
            SearchType::Geocode,
            vec![place("A")],
            Some(Coordinates::new(1.0, 2.0)),
        ));
        ctx.apply_patch(ContextPatch {
            clear_search_memory: true,
            ..Default::default()
        });
        assert!(ctx.last_search_type.is_none());
        assert!(!ctx.has_search_memory());
    }

    #[test]
    fn test_summary_mentions_places() {
        let mut ctx = ConversationContext::new("u1");
        ctx.push_turn(Turn::user("find pizza in rome"), 10);
        ctx.apply_search_memory(SearchMemory::from_results(
            SearchType::Search,
            vec![place("Da Michele")],
            None,
        ));
        let summary = ctx.summary();
        assert!(summary.contains("last search: search"));
        assert!(summary.contains("Da Michele"));
        assert!(summary.contains("find pizza in rome"));
    }

    #[test]
    fn test_decision_clamps_confidence() {
        let d = IntentDecision::new(IntentCategory::Location, 1.7, "x", DecisionSource::LocationRule);
        assert_eq!(d.confidence, 1.0);
        assert_eq!(d.routing_target, RoutingTarget::MapsAgent);
    }
}
