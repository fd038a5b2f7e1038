//! Rule-table intent classification with an optional advisory fallback.
//!
//! Rules are evaluated in fixed precedence: statistical patterns first, then
//! location cues in table order. Only when no rule is confident is the
//! advisory classifier consulted, and anything still unconfident becomes
//! `general`.

use std::sync::{Arc, LazyLock};
use std::time::Duration;

use regex::Regex;
use tracing::{debug, warn};
use waypoint_core::config::ClassifierConfig;
use waypoint_core::types::{IntentCategory, SearchType};

use crate::advisory::AdvisoryClassifier;
use crate::lexicon::{find_coordinates, CATEGORY_NOUNS};
use crate::types::{DecisionSource, IntentDecision};

// =============================================================================
// Rule table (compiled once, reused across calls)
// =============================================================================

struct LocationRule {
    search_type: SearchType,
    confidence: f32,
    patterns: Vec<Regex>,
    /// Only applies when the utterance contains a coordinate pair.
    needs_coordinates: bool,
}

struct RuleTable {
    statistical: Vec<Regex>,
    /// Checked in order; the first matching rule wins.
    location: Vec<LocationRule>,
    /// Location-ish words too vague to act on without a second opinion.
    weak_location: Vec<Regex>,
}

const STATISTICAL_CONFIDENCE: f32 = 0.95;
const WEAK_LOCATION_CONFIDENCE: f32 = 0.45;

static RULES: LazyLock<RuleTable> = LazyLock::new(|| {
    let mk = |pats: &[&str]| -> Vec<Regex> {
        pats.iter()
            .map(|p| Regex::new(p).expect("Invalid intent regex"))
            .collect()
    };
    let statistical: Vec<String> = ["how\\s+many", "count\\s+of", "number\\s+of"]
        .iter()
        .map(|lead| {
            format!(
                r"(?i)\b{}\s+(?:of\s+(?:the|those|these)\s+)?(?:[a-z'-]+\s+)??(?:{})\b",
                lead, CATEGORY_NOUNS
            )
        })
        .collect();
    let statistical_refs: Vec<&str> = statistical.iter().map(String::as_str).collect();

    RuleTable {
        statistical: mk(&statistical_refs),
        location: vec![
            LocationRule {
                search_type: SearchType::Matrix,
                confidence: 0.9,
                patterns: mk(&[
                    r"(?i)\bmatrix\b",
                    r"(?i)\b(?:travel\s+times?|distances?)\s+between\b",
                ]),
                needs_coordinates: false,
            },
            LocationRule {
                search_type: SearchType::Directions,
                confidence: 0.9,
                patterns: mk(&[
                    r"(?i)\bdirections?\b",
                    r"(?i)\broute\b",
                    r"(?i)\bhow\s+(?:do|can|should)\s+i\s+get\b",
                    r"(?i)\bhow\s+far\b",
                    r"(?i)\bnavigate\b",
                    r"(?i)\b(?:drive|walk|cycle|bike)\s+(?:to|from)\b",
                    r"(?i)\bdistance\s+(?:from|to)\b",
                    r"(?i)\btravel\s+time\b",
                    r"(?i)\bget\s+(?:to|from)\b",
                ]),
                needs_coordinates: false,
            },
            LocationRule {
                search_type: SearchType::ReverseGeocode,
                confidence: 0.9,
                patterns: mk(&[
                    r"(?i)\bwhat(?:'s|\s+is)\s+(?:at|located\s+at|here)\b",
                    r"(?i)\baddress\b",
                    r"(?i)\breverse\b",
                    r"(?i)\bwhere\s+is\b",
                ]),
                needs_coordinates: true,
            },
            LocationRule {
                search_type: SearchType::Geocode,
                confidence: 0.85,
                patterns: mk(&[
                    r"(?i)\bcoordinates?\b",
                    r"(?i)\bgeocode\b",
                    r"(?i)\b(?:latitude|longitude)\b",
                    r"(?i)\baddress\b",
                    r"(?i)\bwhere\s+(?:is|are)\b",
                    r"(?i)\blocated\b",
                ]),
                needs_coordinates: false,
            },
            LocationRule {
                search_type: SearchType::StaticMap,
                confidence: 0.85,
                patterns: mk(&[
                    r"(?i)\bmap\s+(?:of|for)\b",
                    r"(?i)\bstatic\s+map\b",
                    r"(?i)\bon\s+a\s+map\b",
                ]),
                needs_coordinates: false,
            },
            LocationRule {
                search_type: SearchType::Search,
                confidence: 0.85,
                patterns: mk(&[
                    r"(?i)\bfind\b",
                    r"(?i)\bsearch\b",
                    r"(?i)\blook(?:ing)?\s+for\b",
                    r"(?i)\bshow\s+me\b",
                    r"(?i)\bnear(?:by|est)?\b",
                    r"(?i)\bclosest\b",
                    r"(?i)\baround\s+here\b",
                ]),
                needs_coordinates: false,
            },
            LocationRule {
                search_type: SearchType::Search,
                confidence: 0.8,
                patterns: vec![Regex::new(&format!(
                    r"(?i)\b(?:{})\s+(?:in|around|at)\s+\w",
                    CATEGORY_NOUNS
                ))
                .expect("Invalid intent regex")],
                needs_coordinates: false,
            },
        ],
        weak_location: mk(&[
            r"(?i)\bwhere\b",
            r"(?i)\bmaps?\b",
            r"(?i)\bplaces?\b",
            r"(?i)\blocations?\b",
        ]),
    }
});

// =============================================================================
// IntentClassifier
// =============================================================================

/// Classifies resolved utterances into location, statistical, or general.
pub struct IntentClassifier {
    min_confidence: f32,
    advisory: Option<Arc<dyn AdvisoryClassifier>>,
    advisory_timeout: Duration,
}

impl IntentClassifier {
    pub fn new(min_confidence: f32, advisory_timeout: Duration) -> Self {
        Self {
            min_confidence,
            advisory: None,
            advisory_timeout,
        }
    }

    pub fn from_config(config: &ClassifierConfig) -> Self {
        Self::new(config.min_confidence, config.advisory_timeout())
    }

    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisoryClassifier>) -> Self {
        self.advisory = Some(advisory);
        self
    }

    pub fn min_confidence(&self) -> f32 {
        self.min_confidence
    }

    /// Evaluate the rule table only.
    ///
    /// Returns the first matching rule's decision, which may be below the
    /// confidence threshold for weak cues, or `None` if nothing matched.
    pub fn classify_rules(&self, text: &str) -> Option<IntentDecision> {
        let rules = &*RULES;

        if is_statistical(text) {
            debug!(text, "Statistical pattern matched");
            return Some(statistical_decision(text));
        }

        let has_coordinates = find_coordinates(text).is_some();
        for rule in &rules.location {
            if rule.needs_coordinates && !has_coordinates {
                continue;
            }
            if rule.patterns.iter().any(|re| re.is_match(text)) {
                debug!(text, search_type = %rule.search_type, "Location rule matched");
                return Some(
                    IntentDecision::new(
                        IntentCategory::Location,
                        rule.confidence,
                        text,
                        DecisionSource::LocationRule,
                    )
                    .with_search_type(Some(rule.search_type)),
                );
            }
        }

        if rules.weak_location.iter().any(|re| re.is_match(text)) {
            return Some(
                IntentDecision::new(
                    IntentCategory::Location,
                    WEAK_LOCATION_CONFIDENCE,
                    text,
                    DecisionSource::LocationRule,
                )
                .with_search_type(Some(SearchType::Search)),
            );
        }

        None
    }

    /// Classify a turn whose references may already be substituted.
    ///
    /// Substitution can drop the category noun a counting question needs
    /// ("how many of those restaurants"), so the statistical rules also see
    /// the utterance as typed.
    pub async fn classify_turn(
        &self,
        original: &str,
        resolved: &str,
        context_summary: &str,
    ) -> IntentDecision {
        if is_statistical(original) || is_statistical(resolved) {
            debug!(original, "Statistical pattern matched");
            return statistical_decision(resolved);
        }
        self.classify(resolved, context_summary).await
    }

    /// Classify `text`, consulting the advisory classifier if the rules are
    /// not confident. Never fails: the fallback is a low-confidence `general`.
    pub async fn classify(&self, text: &str, context_summary: &str) -> IntentDecision {
        let rule_decision = self.classify_rules(text);
        if let Some(decision) = &rule_decision {
            if decision.confidence >= self.min_confidence {
                return decision.clone();
            }
        }

        let mut best_confidence = rule_decision.as_ref().map_or(0.0, |d| d.confidence);

        if let Some(advisory) = &self.advisory {
            let call = advisory.classify(text, context_summary);
            match tokio::time::timeout(self.advisory_timeout, call).await {
                Ok(Ok(signal)) if signal.confidence >= self.min_confidence => {
                    debug!(
                        advisor = advisory.name(),
                        category = %signal.category,
                        confidence = signal.confidence,
                        "Advisory classification accepted"
                    );
                    let search_type = match signal.category {
                        IntentCategory::Location => Some(
                            rule_decision
                                .as_ref()
                                .and_then(|d| d.search_type)
                                .unwrap_or(SearchType::Search),
                        ),
                        _ => None,
                    };
                    return IntentDecision::new(
                        signal.category,
                        signal.confidence,
                        text,
                        DecisionSource::Advisory,
                    )
                    .with_search_type(search_type);
                }
                Ok(Ok(signal)) => {
                    debug!(
                        advisor = advisory.name(),
                        confidence = signal.confidence,
                        "Advisory classification below threshold"
                    );
                    best_confidence = best_confidence.max(signal.confidence);
                }
                Ok(Err(e)) => {
                    warn!(advisor = advisory.name(), error = %e, "Advisory classifier failed");
                }
                Err(_) => {
                    warn!(
                        advisor = advisory.name(),
                        timeout_ms = self.advisory_timeout.as_millis() as u64,
                        "Advisory classifier timed out"
                    );
                }
            }
        }

        let mut decision = IntentDecision::new(
            IntentCategory::General,
            best_confidence,
            text,
            DecisionSource::Default,
        );
        decision.low_confidence = true;
        decision
    }
}

fn is_statistical(text: &str) -> bool {
    RULES.statistical.iter().any(|re| re.is_match(text))
}

fn statistical_decision(text: &str) -> IntentDecision {
    IntentDecision::new(
        IntentCategory::Statistical,
        STATISTICAL_CONFIDENCE,
        text,
        DecisionSource::StatisticalRule,
    )
}

// =============================================================================
// Tests
// =============================================================================
