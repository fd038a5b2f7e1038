//! Per-turn orchestration.
//!
//! [`ConversationEngine::handle_turn`] drives one utterance through the turn
//! state machine while holding the user's [`ContextLease`]:
//!
//! ```text
//! RECEIVED -> RESOLVING_REFERENCES -> CLASSIFYING -> ROUTING_{LOCATION,GENERAL}
//!          -> EXECUTING -> RECORDING -> COMPLETE
//! ```
//!
//! Any stage may divert to ERROR. Every outcome is reported in the returned
//! [`TurnResponse`]; the engine never returns an error for a turn.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde::Serialize;
use tracing::{debug, info, warn};
use waypoint_core::config::WaypointConfig;
use waypoint_core::types::{IntentCategory, RoutingTarget, SearchType};
use waypoint_geo::{GeoBiasResolver, GeoBiasTable};

use crate::advisory::AdvisoryClassifier;
use crate::classifier::IntentClassifier;
use crate::context::{ContextLease, ContextStore};
use crate::error::{ChatError, TurnFailure};
use crate::planner::{PlanOutcome, Planner};
use crate::reference::{ReferenceResolution, ReferenceResolver};
use crate::response;
use crate::router::{OrchestrationRouter, RouterOutcome};
use crate::state_machine::{TurnState, TurnTracker};
use crate::tools::{ToolExecutor, ToolName};
use crate::types::{ContextPatch, ConversationContext, Turn, TurnResponse};

/// Load the geographic bias table named by `geo.table_path`, or the
/// built-in table when none is configured.
pub fn load_bias_table(config: &WaypointConfig) -> Result<Arc<GeoBiasTable>, ChatError> {
    match &config.geo.table_path {
        Some(path) => {
            let table = GeoBiasTable::from_toml_file(Path::new(path))?;
            info!(path = %path, entries = table.len(), "Loaded geographic bias table");
            Ok(Arc::new(table))
        }
        None => Ok(GeoBiasTable::builtin()),
    }
}

/// Longest accepted utterance, in characters.
pub const MAX_UTTERANCE_CHARS: usize = 2000;

const NO_AGENT: &str = "none";

/// One downstream agent and what it answers.
#[derive(Debug, Clone, Serialize)]
pub struct AgentCapability {
    pub name: &'static str,
    pub description: &'static str,
    pub query_types: Vec<String>,
}

/// What this engine can route to.
#[derive(Debug, Clone, Serialize)]
pub struct Capabilities {
    pub agents: Vec<AgentCapability>,
    pub tools: Vec<ToolName>,
    pub search_types: Vec<SearchType>,
}

/// How a turn ended, before state history and diagnostics are attached.
struct Reply {
    text: String,
    agent_used: String,
    query_type: String,
    success: bool,
    clarification_needed: bool,
    partial: bool,
    failure: Option<TurnFailure>,
}

impl Reply {
    fn rejected(failure: TurnFailure) -> Self {
        Self {
            text: response::failure(&failure),
            agent_used: NO_AGENT.to_string(),
            query_type: "invalid".to_string(),
            success: false,
            clarification_needed: false,
            partial: false,
            failure: Some(failure),
        }
    }
}

/// Entry point for conversation turns.
pub struct ConversationEngine {
    store: ContextStore,
    resolver: ReferenceResolver,
    classifier: IntentClassifier,
    planner: Planner,
    router: OrchestrationRouter,
    idle_ttl: Option<Duration>,
}

impl ConversationEngine {
    /// Build an engine from configuration. Loads the bias table from
    /// `geo.table_path` when set, otherwise uses the built-in table.
    pub fn new(config: &WaypointConfig, tools: Arc<dyn ToolExecutor>) -> Result<Self, ChatError> {
        config.validate()?;
        let table = load_bias_table(config)?;
        Self::with_bias_table(config, tools, table)
    }

    /// Build an engine over a bias table the caller already loaded, so a
    /// process sharing the table with other components parses it once.
    pub fn with_bias_table(
        config: &WaypointConfig,
        tools: Arc<dyn ToolExecutor>,
        table: Arc<GeoBiasTable>,
    ) -> Result<Self, ChatError> {
        config.validate()?;
        Ok(Self {
            store: ContextStore::from_config(&config.context),
            resolver: ReferenceResolver::new(config.context.recency_window),
            classifier: IntentClassifier::from_config(&config.classifier),
            planner: Planner::new(GeoBiasResolver::new(table), config.router.max_results),
            router: OrchestrationRouter::from_config(tools, &config.router),
            idle_ttl: config.context.idle_ttl(),
        })
    }

    pub fn with_advisory(mut self, advisory: Arc<dyn AdvisoryClassifier>) -> Self {
        self.classifier = self.classifier.with_advisory(advisory);
        self
    }

    pub fn store(&self) -> &ContextStore {
        &self.store
    }

    // =========================================================================
    // Turns
    // =========================================================================

    /// Handle one utterance for `user_id`.
    pub async fn handle_turn(&self, user_id: &str, utterance: &str) -> TurnResponse {
        let mut tracker = TurnTracker::new();
        let mut diagnostics = Vec::new();

        let reply = match validate_input(user_id, utterance) {
            Err(failure) => {
                debug!(user_id, error = %failure, "Rejected utterance");
                tracker.fail();
                Reply::rejected(failure)
            }
            Ok(text) => {
                info!(user_id, chars = text.chars().count(), "Handling turn");
                match self.run_turn(&mut tracker, &mut diagnostics, user_id, text).await {
                    Ok(reply) => reply,
                    Err(failure) => {
                        warn!(user_id, error = %failure, "Turn aborted");
                        tracker.fail();
                        Reply::rejected(failure)
                    }
                }
            }
        };

        let states = tracker.into_history();
        info!(
            user_id,
            agent = %reply.agent_used,
            query_type = %reply.query_type,
            success = reply.success,
            final_state = %states.last().copied().unwrap_or(TurnState::Received),
            "Turn finished"
        );

        TurnResponse {
            response_text: reply.text,
            agent_used: reply.agent_used,
            query_type: reply.query_type,
            success: reply.success,
            clarification_needed: reply.clarification_needed,
            partial: reply.partial,
            failure: reply.failure,
            diagnostics,
            states,
        }
    }

    async fn run_turn(
        &self,
        tracker: &mut TurnTracker,
        diagnostics: &mut Vec<TurnFailure>,
        user_id: &str,
        text: &str,
    ) -> Result<Reply, TurnFailure> {
        let mut lease = self.store.lease(user_id).await;
        let snapshot = lease.snapshot();

        tracker.advance(TurnState::ResolvingReferences)?;
        let refs = self.resolver.resolve(text, &snapshot);
        if let Some(failure) = &refs.failure {
            diagnostics.push(failure.clone());
        }

        tracker.advance(TurnState::Classifying)?;
        let decision = self
            .classifier
            .classify_turn(text, &refs.resolved_query_text, &snapshot.summary())
            .await;
        if decision.low_confidence {
            diagnostics.push(TurnFailure::ClassificationLowConfidence {
                confidence: decision.confidence,
            });
        }

        let mut reply = Reply {
            text: String::new(),
            agent_used: decision.routing_target.agent_name().to_string(),
            query_type: decision.category.to_string(),
            success: false,
            clarification_needed: false,
            partial: false,
            failure: None,
        };

        if decision.routing_target == RoutingTarget::GeneralAgent {
            tracker.advance(TurnState::RoutingGeneral)?;
            tracker.advance(TurnState::Executing)?;
            reply.text = response::general(&decision, Local::now());
            tracker.advance(TurnState::Recording)?;
            record_exchange(&mut lease, text, &refs, &reply.text, decision.category);
            tracker.advance(TurnState::Complete)?;
            reply.success = true;
            return Ok(reply);
        }

        tracker.advance(TurnState::RoutingLocation)?;
        let plan_outcome = match refs.failure.clone() {
            Some(failure) => PlanOutcome::NeedsClarification(failure),
            None => self.planner.plan(&decision, &refs),
        };

        let plan = match plan_outcome {
            PlanOutcome::Ready(plan) => plan,
            PlanOutcome::NeedsClarification(failure) => {
                debug!(user_id, error = %failure, "Asking for clarification");
                reply.text = response::failure(&failure);
                tracker.fail();
                record_exchange(&mut lease, text, &refs, &reply.text, decision.category);
                reply.clarification_needed = true;
                reply.failure = Some(failure);
                return Ok(reply);
            }
        };

        tracker.advance(TurnState::Executing)?;
        diagnostics.extend(
            plan.unresolved_places()
                .into_iter()
                .map(|token| TurnFailure::GeoBiasUnresolved { token }),
        );

        match self.router.execute(&plan).await {
            RouterOutcome::Completed(report) => {
                reply.text = response::location(&plan, &report);
                tracker.advance(TurnState::Recording)?;
                record_exchange(&mut lease, text, &refs, &reply.text, decision.category);
                self.router.commit(&mut lease, &report);
                tracker.advance(TurnState::Complete)?;
                reply.success = true;
            }
            RouterOutcome::Failed { failure, .. } => {
                tracker.fail();
                reply.text = response::failure(&failure);
                reply.failure = Some(failure);
            }
            RouterOutcome::DeadlineExceeded { completed, pending } => {
                tracker.fail();
                reply.text = response::partial(&plan, &completed, &pending);
                reply.partial = true;
                reply.failure = pending.first().map(|tool| TurnFailure::UpstreamToolFailure {
                    tool: tool.to_string(),
                    reason: "turn deadline exceeded".to_string(),
                });
            }
        }
        Ok(reply)
    }

    // =========================================================================
    // Administration
    // =========================================================================

    /// Read-only copy of the user's context, created empty on first access.
    pub async fn get_context(&self, user_id: &str) -> ConversationContext {
        self.store.get(user_id).await
    }

    /// Apply an administrative patch to the user's context.
    pub async fn set_context(
        &self,
        user_id: &str,
        patch: ContextPatch,
    ) -> Result<ConversationContext, ChatError> {
        if user_id.trim().is_empty() {
            return Err(ChatError::EmptyUserId);
        }
        if let Some(results) = &patch.last_search_results {
            if let Some(bad) = results.iter().find(|p| !p.coordinates.is_valid()) {
                return Err(ChatError::InvalidPatch(format!(
                    "place {} has out-of-range coordinates {}",
                    bad.name, bad.coordinates
                )));
            }
        }
        if let Some(location) = patch.last_search_location {
            if !location.is_valid() {
                return Err(ChatError::InvalidPatch(format!(
                    "search location out of range: {}",
                    location
                )));
            }
        }
        Ok(self.store.apply_patch(user_id, patch).await)
    }

    /// Most recent `limit` turns for `user_id`, oldest first.
    pub async fn history(&self, user_id: &str, limit: usize) -> Vec<Turn> {
        self.store.history(user_id, limit).await
    }

    pub fn capabilities(&self) -> Capabilities {
        Capabilities {
            agents: vec![
                AgentCapability {
                    name: RoutingTarget::MapsAgent.agent_name(),
                    description: "Place search, geocoding, directions, travel times and maps",
                    query_types: vec![IntentCategory::Location.to_string()],
                },
                AgentCapability {
                    name: RoutingTarget::GeneralAgent.agent_name(),
                    description: "General questions and statistical questions",
                    query_types: vec![
                        IntentCategory::General.to_string(),
                        IntentCategory::Statistical.to_string(),
                    ],
                },
            ],
            tools: vec![
                ToolName::Geocode,
                ToolName::ReverseGeocode,
                ToolName::Search,
                ToolName::Directions,
                ToolName::Matrix,
                ToolName::StaticMap,
            ],
            search_types: vec![
                SearchType::Search,
                SearchType::Geocode,
                SearchType::ReverseGeocode,
                SearchType::Directions,
                SearchType::Matrix,
                SearchType::StaticMap,
            ],
        }
    }

    /// Drop contexts idle for longer than the configured TTL.
    pub fn evict_idle(&self) -> usize {
        self.idle_ttl
            .map(|ttl| self.store.evict_idle(ttl))
            .unwrap_or(0)
    }
}

fn validate_input<'a>(user_id: &str, utterance: &'a str) -> Result<&'a str, TurnFailure> {
    let reason = if user_id.trim().is_empty() {
        "user id must not be empty".to_string()
    } else if utterance.trim().is_empty() {
        "message is empty".to_string()
    } else if utterance.chars().count() > MAX_UTTERANCE_CHARS {
        format!("message exceeds {} characters", MAX_UTTERANCE_CHARS)
    } else {
        return Ok(utterance.trim());
    };
    Err(TurnFailure::InvalidUtterance { reason })
}

/// Append the user turn (with its resolved entities) and the agent reply.
fn record_exchange(
    lease: &mut ContextLease,
    text: &str,
    refs: &ReferenceResolution,
    reply: &str,
    category: IntentCategory,
) {
    lease.record_turn(Turn::user(text).with_entities(refs.resolved_entities.clone()));
    lease.record_turn(Turn::agent(reply));
    lease.set_last_intent(category);
}
