//! Conversation context and intent resolution.
//!
//! A turn flows through the [`ConversationEngine`]: the per-user context is
//! leased from the [`ContextStore`], referring expressions are rewritten by
//! the [`ReferenceResolver`], the [`IntentClassifier`] picks a category, and
//! location intents are planned and executed by the [`OrchestrationRouter`]
//! against an external [`ToolExecutor`]. Search memory is written back only
//! when the whole tool sequence succeeds.

pub mod advisory;
pub mod classifier;
pub mod context;
pub mod engine;
pub mod error;
mod lexicon;
pub mod planner;
pub mod reference;
pub mod response;
pub mod router;
pub mod state_machine;
pub mod tools;
pub mod types;

pub use advisory::{AdvisoryClassifier, AdvisorySignal, StaticAdvisor};
pub use classifier::IntentClassifier;
pub use context::{ContextLease, ContextStore};
pub use engine::{load_bias_table, Capabilities, ConversationEngine, MAX_UTTERANCE_CHARS};
pub use error::{AdvisoryError, ChatError, ToolError, TurnFailure};
pub use planner::{PlanOutcome, PlannedStep, Planner, ToolPlan};
pub use reference::{ReferenceResolution, ReferenceResolver};
pub use router::{ExecutionReport, OrchestrationRouter, RouterOutcome, StepOutput};
pub use state_machine::TurnState;
pub use tools::{MockToolExecutor, ToolExecutor, ToolName};
pub use types::{
    ContextPatch, ConversationContext, DecisionSource, IntentDecision, ResolvedEntity, Role,
    SearchMemory, Turn, TurnResponse,
};
