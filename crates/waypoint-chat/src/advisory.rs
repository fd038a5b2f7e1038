//! Optional language-model advisory classifier.
//!
//! Consulted only when the rule tables are not confident. Implementations
//! wrap a provider client; [`StaticAdvisor`] is a deterministic stand-in for
//! tests and offline runs.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use waypoint_core::types::IntentCategory;

use crate::error::AdvisoryError;

/// Category suggestion returned by an advisory classifier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AdvisorySignal {
    pub category: IntentCategory,
    pub confidence: f32,
}

/// External classifier consulted for ambiguous utterances.
#[async_trait]
pub trait AdvisoryClassifier: Send + Sync {
    /// Suggest a category for `utterance` given a short context summary.
    async fn classify(
        &self,
        utterance: &str,
        context_summary: &str,
    ) -> Result<AdvisorySignal, AdvisoryError>;

    fn name(&self) -> &str {
        "advisory"
    }
}

/// Advisory classifier that always gives the same answer.
#[derive(Debug)]
pub struct StaticAdvisor {
    response: Result<AdvisorySignal, AdvisoryError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl StaticAdvisor {
    pub fn returning(category: IntentCategory, confidence: f32) -> Self {
        Self {
            response: Ok(AdvisorySignal {
                category,
                confidence,
            }),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(error: AdvisoryError) -> Self {
        Self {
            response: Err(error),
            delay: None,
            calls: AtomicUsize::new(0),
        }
    }

    /// Sleep before answering, to exercise caller timeouts.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AdvisoryClassifier for StaticAdvisor {
    async fn classify(
        &self,
        _utterance: &str,
        _context_summary: &str,
    ) -> Result<AdvisorySignal, AdvisoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.response.clone()
    }

    fn name(&self) -> &str {
        "static"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_advisor_returns_signal() {
        let advisor = StaticAdvisor::returning(IntentCategory::Location, 0.8);
        let signal = advisor.classify("somewhere nice", "").await.unwrap();
        assert_eq!(signal.category, IntentCategory::Location);
        assert_eq!(advisor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_static_advisor_failure() {
        let advisor =
            StaticAdvisor::failing(AdvisoryError::Unavailable("no api key".to_string()));
        let err = advisor.classify("x", "").await.unwrap_err();
        assert!(matches!(err, AdvisoryError::Unavailable(_)));
    }
}
