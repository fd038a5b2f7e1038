//! Reference resolution against search memory.
//!
//! Rewrites referring expressions ("they", "those restaurants", "from there")
//! with the places or location remembered from the last successful search.
//! All markers in one utterance resolve against the same context snapshot.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;
use waypoint_core::types::{Coordinates, PlaceRecord};

use crate::error::TurnFailure;
use crate::lexicon::join_names;
use crate::types::{ConversationContext, ResolvedEntity};

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(the\s+same|they|them|those|these|it|there)\b")
        .expect("Invalid marker regex")
});

static EXISTENTIAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:is|are|was|were|isn't|aren't)\s+there\b|\bthere\s+(?:is|are|was|were|isn't|aren't)\b|\bthere's\b",
    )
    .expect("Invalid existential regex")
});

static DESCRIPTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(the|those|these)\s+([a-z][a-z'-]*)\b").expect("Invalid description regex")
});

/// A restrictive complement after "the <noun>" ("the places to eat near X")
/// makes the phrase a new description rather than a reference.
static COMPLEMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s+(?:to|near|in|around|at|with|that|which|where|for)\b")
        .expect("Invalid complement regex")
});

/// Nouns that refer back to any remembered place regardless of category.
/// Only demonstratives ("those places") make them anaphoric.
const GENERIC_NOUNS: &[&str] = &["places", "spots", "locations", "results", "ones", "options"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    /// Whole remembered place set.
    Set,
    /// Top-ranked remembered place ("it").
    Single,
    /// Remembered search location ("there").
    Positional,
    /// "those restaurants": places whose category matches the noun.
    Description,
}

#[derive(Debug, Clone)]
struct Marker {
    span: Range<usize>,
    key: String,
    kind: MarkerKind,
    noun: Option<String>,
}

/// Output of [`ReferenceResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReferenceResolution {
    pub original_text: String,
    pub resolved_query_text: String,
    /// False when a marker was found but had no fresh antecedent.
    pub resolved: bool,
    /// Referring expressions found, in utterance order, lower-cased.
    pub markers: Vec<String>,
    pub resolved_entities: BTreeMap<String, ResolvedEntity>,
    pub failure: Option<TurnFailure>,
}

impl ReferenceResolution {
    fn passthrough(text: &str, markers: Vec<String>, failure: Option<TurnFailure>) -> Self {
        Self {
            original_text: text.to_string(),
            resolved_query_text: text.to_string(),
            resolved: failure.is_none(),
            markers,
            resolved_entities: BTreeMap::new(),
            failure,
        }
    }

    pub fn has_references(&self) -> bool {
        !self.markers.is_empty()
    }

    /// Entity substituted for a referring expression, if any.
    pub fn entity_for(&self, expression: &str) -> Option<&ResolvedEntity> {
        self.resolved_entities
            .get(&expression.trim().to_lowercase())
    }

    /// First place set referenced in the utterance.
    pub fn target_places(&self) -> Option<&[PlaceRecord]> {
        self.markers
            .iter()
            .find_map(|m| match self.resolved_entities.get(m) {
                Some(ResolvedEntity::Places { places }) => Some(places.as_slice()),
                _ => None,
            })
    }

    /// First location referenced positionally ("there").
    pub fn anchor_location(&self) -> Option<Coordinates> {
        self.markers
            .iter()
            .find_map(|m| match self.resolved_entities.get(m) {
                Some(ResolvedEntity::Location { coordinates }) => Some(*coordinates),
                _ => None,
            })
    }
}

/// Resolves referring expressions against a context snapshot.
#[derive(Debug, Clone)]
pub struct ReferenceResolver {
    recency_window: u32,
}

impl ReferenceResolver {
    pub fn new(recency_window: u32) -> Self {
        Self { recency_window }
    }

    pub fn recency_window(&self) -> u32 {
        self.recency_window
    }

    /// Resolve every marker in `utterance` against `ctx`.
    ///
    /// If any marker lacks a fresh antecedent the utterance passes through
    /// unchanged with `resolved = false` and a `ResolutionFailure`.
    pub fn resolve(&self, utterance: &str, ctx: &ConversationContext) -> ReferenceResolution {
        let markers = find_markers(utterance, &ctx.last_search_results);
        let keys: Vec<String> = markers.iter().map(|m| m.key.clone()).collect();
        if markers.is_empty() {
            return ReferenceResolution::passthrough(utterance, keys, None);
        }

        let fresh = ctx.is_memory_fresh(self.recency_window);
        let mut entities = BTreeMap::new();
        let mut replacements: Vec<(Range<usize>, String)> = Vec::new();
        let mut unresolved = Vec::new();

        for marker in &markers {
            match fresh.then(|| entity_for_marker(marker, ctx)).flatten() {
                Some(entity) => {
                    replacements.push((marker.span.clone(), render(&entity)));
                    entities.insert(marker.key.clone(), entity);
                }
                None => unresolved.push(marker.key.clone()),
            }
        }

        if !unresolved.is_empty() {
            unresolved.dedup();
            debug!(
                user_id = %ctx.user_id,
                markers = ?unresolved,
                fresh,
                "Referring expressions without antecedent"
            );
            return ReferenceResolution::passthrough(
                utterance,
                keys,
                Some(TurnFailure::ResolutionFailure {
                    markers: unresolved,
                }),
            );
        }

        let mut text = utterance.to_string();
        for (span, value) in replacements.into_iter().rev() {
            text.replace_range(span, &value);
        }
        debug!(user_id = %ctx.user_id, resolved = %text, "Resolved references");

        ReferenceResolution {
            original_text: utterance.to_string(),
            resolved_query_text: text,
            resolved: true,
            markers: keys,
            resolved_entities: entities,
            failure: None,
        }
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

fn find_markers(utterance: &str, places: &[PlaceRecord]) -> Vec<Marker> {
    let mut markers: Vec<Marker> = DESCRIPTION_RE
        .captures_iter(utterance)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let demonstrative = !caps.get(1)?.as_str().eq_ignore_ascii_case("the");
            let noun = caps.get(2)?.as_str().to_lowercase();
            let generic = GENERIC_NOUNS.contains(&noun.as_str());
            if !demonstrative && (generic || COMPLEMENT_RE.is_match(&utterance[whole.end()..])) {
                return None;
            }
            let echoes = places.iter().any(|p| same_noun(&noun, &p.category));
            (generic || echoes).then(|| Marker {
                span: whole.range(),
                key: whole.as_str().to_lowercase(),
                kind: MarkerKind::Description,
                noun: (!generic).then_some(noun),
            })
        })
        .collect();

    let existential: Vec<Range<usize>> = EXISTENTIAL_RE
        .find_iter(utterance)
        .map(|m| m.range())
        .collect();

    for m in MARKER_RE.find_iter(utterance) {
        let span = m.range();
        if markers.iter().any(|d| overlaps(&d.span, &span))
            || existential.iter().any(|e| overlaps(e, &span))
        {
            continue;
        }
        let key = m
            .as_str()
            .to_lowercase()
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ");
        let kind = match key.as_str() {
            "there" => MarkerKind::Positional,
            "it" => MarkerKind::Single,
            _ => MarkerKind::Set,
        };
        markers.push(Marker {
            span,
            key,
            kind,
            noun: None,
        });
    }

    markers.sort_by_key(|m| m.span.start);
    markers
}

fn entity_for_marker(marker: &Marker, ctx: &ConversationContext) -> Option<ResolvedEntity> {
    let places = &ctx.last_search_results;
    match marker.kind {
        MarkerKind::Positional => ctx
            .last_search_location
            .or_else(|| places.first().map(|p| p.coordinates))
            .map(|coordinates| ResolvedEntity::Location { coordinates }),
        MarkerKind::Single => places.first().map(|p| ResolvedEntity::Places {
            places: vec![p.clone()],
        }),
        MarkerKind::Set => (!places.is_empty()).then(|| ResolvedEntity::Places {
            places: places.clone(),
        }),
        MarkerKind::Description => {
            let matching: Vec<PlaceRecord> = match &marker.noun {
                Some(noun) => places
                    .iter()
                    .filter(|p| same_noun(noun, &p.category))
                    .cloned()
                    .collect(),
                None => places.clone(),
            };
            (!matching.is_empty()).then_some(ResolvedEntity::Places { places: matching })
        }
    }
}

/// Text substituted into the utterance.
fn render(entity: &ResolvedEntity) -> String {
    match entity {
        ResolvedEntity::Places { places } => {
            let names: Vec<&str> = places.iter().map(|p| p.name.as_str()).collect();
            join_names(&names)
        }
        ResolvedEntity::Location { coordinates } => coordinates.to_string(),
    }
}

/// Singular/plural-insensitive noun comparison ("restaurants" vs "restaurant").
fn same_noun(a: &str, b: &str) -> bool {
    let a_forms = noun_forms(a);
    let b_forms = noun_forms(b);
    a_forms.iter().any(|f| b_forms.contains(f))
}

fn noun_forms(word: &str) -> Vec<String> {
    let word = word.trim().to_lowercase();
    if word.is_empty() {
        return Vec::new();
    }
    let mut forms = vec![word.clone()];
    if let Some(stem) = word.strip_suffix("ies") {
        forms.push(format!("{}y", stem));
    }
    if let Some(stem) = word.strip_suffix("es") {
        forms.push(stem.to_string());
    }
    if let Some(stem) = word.strip_suffix('s') {
        forms.push(stem.to_string());
    }
    forms
}

// =============================================================================
// Tests
// =============================================================================
