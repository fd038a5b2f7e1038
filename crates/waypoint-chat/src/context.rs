//! Per-user conversation memory.
//!
//! Each user id maps to its own async mutex. A turn holds that mutex (via a
//! [`ContextLease`]) for its whole read-modify-write cycle, so turns for the
//! same user are serialized while turns for different users run in parallel.
//! Readers always get a clone of a fully written state.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tracing::{debug, info};
use waypoint_core::config::ContextConfig;
use waypoint_core::types::IntentCategory;

use crate::types::{ContextPatch, ConversationContext, SearchMemory, Turn};

type Slot = Arc<AsyncMutex<ConversationContext>>;

/// In-memory keyed store of conversation contexts.
pub struct ContextStore {
    max_turns: usize,
    slots: Mutex<HashMap<String, Slot>>,
}

impl ContextStore {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns: max_turns.max(1),
            slots: Mutex::new(HashMap::new()),
        }
    }

    pub fn from_config(config: &ContextConfig) -> Self {
        Self::new(config.max_turns)
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Get or lazily create the slot for `user_id`.
    fn slot(&self, user_id: &str) -> Slot {
        // The map only holds handles, so a poisoned lock is still consistent.
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(slots.entry(user_id.to_string()).or_insert_with(|| {
            debug!(user_id, "Creating conversation context");
            Arc::new(AsyncMutex::new(ConversationContext::new(user_id)))
        }))
    }

    fn existing_slot(&self, user_id: &str) -> Option<Slot> {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots.get(user_id).cloned()
    }

    /// Current context for `user_id`, creating an empty one on first access.
    pub async fn get(&self, user_id: &str) -> ConversationContext {
        self.slot(user_id).lock().await.clone()
    }

    /// Read-only copy of an existing context. Does not create one.
    pub async fn snapshot(&self, user_id: &str) -> Option<ConversationContext> {
        let slot = self.existing_slot(user_id)?;
        let ctx = slot.lock().await;
        Some(ctx.clone())
    }

    /// Append a turn to the user's history.
    pub async fn record_turn(&self, user_id: &str, turn: Turn) {
        let mut lease = self.lease(user_id).await;
        lease.record_turn(turn);
    }

    /// Replace the user's search memory.
    pub async fn update_search_memory(&self, user_id: &str, memory: SearchMemory) {
        let mut lease = self.lease(user_id).await;
        lease.update_search_memory(memory);
    }

    /// Apply a partial update and return the resulting context.
    pub async fn apply_patch(&self, user_id: &str, patch: ContextPatch) -> ConversationContext {
        let mut lease = self.lease(user_id).await;
        lease.guard.apply_patch(patch);
        lease.snapshot()
    }

    /// The most recent `limit` turns, oldest first.
    pub async fn history(&self, user_id: &str, limit: usize) -> Vec<Turn> {
        match self.existing_slot(user_id) {
            Some(slot) => {
                let ctx = slot.lock().await;
                let start = ctx.turns.len().saturating_sub(limit);
                ctx.turns[start..].to_vec()
            }
            None => Vec::new(),
        }
    }

    /// Exclusive access to one user's context until the lease is dropped.
    pub async fn lease(&self, user_id: &str) -> ContextLease {
        let guard = self.slot(user_id).lock_owned().await;
        ContextLease {
            guard,
            max_turns: self.max_turns,
        }
    }

    pub fn user_count(&self) -> usize {
        self.slots
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Drop contexts idle for longer than `ttl`.
    ///
    /// Contexts that are locked or awaited by an in-flight turn are kept.
    /// Returns the number of contexts evicted.
    pub fn evict_idle(&self, ttl: Duration) -> usize {
        let Some(cutoff) = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_sub_signed(ttl))
        else {
            return 0;
        };
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let before = slots.len();
        slots.retain(|_, slot| {
            if Arc::strong_count(slot) > 1 {
                return true;
            }
            match slot.try_lock() {
                Ok(ctx) => ctx.updated_at > cutoff,
                Err(_) => true,
            }
        });
        let evicted = before - slots.len();
        if evicted > 0 {
            info!(evicted, remaining = slots.len(), "Evicted idle conversation contexts");
        }
        evicted
    }
}

/// Exclusive, owned access to one user's context.
pub struct ContextLease {
    guard: OwnedMutexGuard<ConversationContext>,
    max_turns: usize,
}

impl ContextLease {
    pub fn context(&self) -> &ConversationContext {
        &self.guard
    }

    pub fn snapshot(&self) -> ConversationContext {
        self.guard.clone()
    }

    pub fn record_turn(&mut self, turn: Turn) {
        self.guard.push_turn(turn, self.max_turns);
    }

    pub fn update_search_memory(&mut self, memory: SearchMemory) {
        debug!(
            user_id = %self.guard.user_id,
            search_type = %memory.search_type,
            results = memory.results.len(),
            "Updating search memory"
        );
        self.guard.apply_search_memory(memory);
    }

    pub fn set_last_intent(&mut self, intent: IntentCategory) {
        self.guard.last_intent = Some(intent);
    }
}

// =============================================================================
// Tests
// =============================================================================
