use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use super::{IntentLabel, SessionState};
use crate::error::CoordinatorError;
use crate::events::{self, GateEvent};
use crate::gate::Timestamp;

/// Confidence a classification must exceed to produce a suggestion
pub const DEFAULT_CONFIDENCE_THRESHOLD: f64 = 0.5;

/// Resolved ids remembered for `AlreadyResolved` answers
const RESOLVED_HISTORY: usize = 64;

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SuggestionState {
    Pending,
    Accepted,
    Dismissed,
    /// Replaced by a newer suggestion before being resolved
    Superseded,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RedirectionSuggestion {
    pub id: Uuid,
    pub reason: IntentLabel,
    pub message: String,
    pub created_at: Timestamp,
    pub state: SuggestionState,
}

/// Text offered to the child for an actionable intent
pub fn message_for(reason: IntentLabel) -> Option<&'static str> {
    match reason {
        IntentLabel::OffTopic => {
            Some("That's a grown-up topic! How about we play a game or tell a story instead?")
        }
        IntentLabel::Distress => Some(
            "It sounds like you're having some big feelings. Want to talk about it, or take a calm breathing break together?",
        ),
        IntentLabel::Repetition => {
            Some("We keep coming back to the same thing! Want to try something new, like a story or a game?")
        }
        IntentLabel::Disengagement => {
            Some("Feeling a little bored? Let's pick something fun to do together!")
        }
        IntentLabel::OnTopic | IntentLabel::Unknown => None,
    }
}

#[derive(Default)]
struct CoordinatorInner {
    pending: Option<RedirectionSuggestion>,
    resolved: VecDeque<(Uuid, SuggestionState)>,
}

impl CoordinatorInner {
    fn remember(&mut self, id: Uuid, state: SuggestionState) {
        if self.resolved.len() == RESOLVED_HISTORY {
            self.resolved.pop_front();
        }
        self.resolved.push_back((id, state));
    }

    fn was_resolved(&self, id: Uuid) -> bool {
        self.resolved.iter().any(|(resolved, _)| *resolved == id)
    }
}

/// Holds the single pending redirection suggestion
///
/// Non-actionable classifications never clear a pending suggestion; only
/// accept, dismiss, or a newer actionable classification do.
pub struct RedirectionCoordinator {
    threshold: f64,
    inner: Mutex<CoordinatorInner>,
    events: Option<broadcast::Sender<GateEvent>>,
}

impl RedirectionCoordinator {
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold,
            inner: Mutex::new(CoordinatorInner::default()),
            events: None,
        }
    }

    /// Coordinator publishing on a shared notification channel
    pub fn with_events(threshold: f64, events: broadcast::Sender<GateEvent>) -> Self {
        Self {
            events: Some(events),
            ..Self::new(threshold)
        }
    }

    /// React to a new classification
    ///
    /// Returns the suggestion created for it, if any.
    pub async fn on_session_state(&self, state: &SessionState) -> Option<RedirectionSuggestion> {
        let confident = state.confidence > self.threshold;
        if !state.current_intent.is_actionable() || !confident {
            return None;
        }
        let message = message_for(state.current_intent)?;

        let suggestion = RedirectionSuggestion {
            id: Uuid::new_v4(),
            reason: state.current_intent,
            message: message.to_string(),
            created_at: state.detected_at,
            state: SuggestionState::Pending,
        };

        let mut inner = self.inner.lock().await;

        if let Some(previous) = inner.pending.take() {
            debug!("Suggestion {} superseded", previous.id);
            inner.remember(previous.id, SuggestionState::Superseded);
            self.publish(GateEvent::SuggestionResolved {
                id: previous.id,
                state: SuggestionState::Superseded,
            });
        }

        info!(
            "Redirection suggested for {} ({:.2}): {}",
            suggestion.reason, state.confidence, suggestion.id
        );
        self.publish(GateEvent::SuggestionCreated {
            id: suggestion.id,
            reason: suggestion.reason,
            message: suggestion.message.clone(),
        });

        inner.pending = Some(suggestion.clone());
        Some(suggestion)
    }

    pub async fn accept(&self, id: Uuid) -> Result<(), CoordinatorError> {
        self.resolve(id, SuggestionState::Accepted).await
    }

    pub async fn dismiss(&self, id: Uuid) -> Result<(), CoordinatorError> {
        self.resolve(id, SuggestionState::Dismissed).await
    }

    /// The current pending suggestion
    pub async fn pending(&self) -> Option<RedirectionSuggestion> {
        self.inner.lock().await.pending.clone()
    }

    async fn resolve(&self, id: Uuid, state: SuggestionState) -> Result<(), CoordinatorError> {
        let mut inner = self.inner.lock().await;

        if inner.pending.as_ref().is_some_and(|p| p.id == id) {
            inner.pending = None;
            inner.remember(id, state);
            info!("Suggestion {} {:?}", id, state);
            self.publish(GateEvent::SuggestionResolved { id, state });
            return Ok(());
        }

        if inner.was_resolved(id) {
            Err(CoordinatorError::AlreadyResolved)
        } else {
            Err(CoordinatorError::NotFound)
        }
    }

    fn publish(&self, event: GateEvent) {
        if let Some(sender) = &self.events {
            events::publish(sender, event);
        }
    }
}

impl Default for RedirectionCoordinator {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIDENCE_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};

    fn state(intent: IntentLabel, confidence: f64) -> SessionState {
        SessionState::new(
            intent,
            confidence,
            Local.with_ymd_and_hms(2025, 1, 6, 16, 0, 0).unwrap(),
        )
    }

    #[tokio::test]
    async fn test_distress_after_on_topic_creates_suggestion() {
        let coordinator = RedirectionCoordinator::default();

        assert!(coordinator.on_session_state(&state(IntentLabel::OnTopic, 0.8)).await.is_none());
        assert!(coordinator.on_session_state(&state(IntentLabel::OnTopic, 0.8)).await.is_none());

        let suggestion = coordinator
            .on_session_state(&state(IntentLabel::Distress, 0.9))
            .await
            .unwrap();
        assert_eq!(suggestion.reason, IntentLabel::Distress);
        assert_eq!(suggestion.state, SuggestionState::Pending);
        assert_eq!(suggestion.message, message_for(IntentLabel::Distress).unwrap());

        // Classifier noise leaves it pending
        assert!(coordinator.on_session_state(&state(IntentLabel::OnTopic, 0.9)).await.is_none());
        assert!(coordinator.on_session_state(&state(IntentLabel::Unknown, 0.0)).await.is_none());
        assert_eq!(coordinator.pending().await.unwrap().id, suggestion.id);
    }

    #[tokio::test]
    async fn test_threshold_is_exclusive() {
        let coordinator = RedirectionCoordinator::default();
        assert!(coordinator.on_session_state(&state(IntentLabel::OffTopic, 0.5)).await.is_none());
        assert!(coordinator.on_session_state(&state(IntentLabel::OffTopic, 0.51)).await.is_some());
    }

    #[tokio::test]
    async fn test_nan_confidence_never_suggests() {
        let coordinator = RedirectionCoordinator::default();
        let mut distress = state(IntentLabel::Distress, 0.9);
        distress.confidence = f64::NAN;

        assert!(coordinator.on_session_state(&distress).await.is_none());
        assert!(coordinator.pending().await.is_none());
    }

    #[tokio::test]
    async fn test_accept_is_idempotent() {
        let coordinator = RedirectionCoordinator::default();
        let suggestion = coordinator
            .on_session_state(&state(IntentLabel::Disengagement, 0.7))
            .await
            .unwrap();

        coordinator.accept(suggestion.id).await.unwrap();
        assert!(coordinator.pending().await.is_none());
        assert_eq!(
            coordinator.accept(suggestion.id).await,
            Err(CoordinatorError::AlreadyResolved)
        );
        assert_eq!(
            coordinator.dismiss(suggestion.id).await,
            Err(CoordinatorError::AlreadyResolved)
        );
    }

    #[tokio::test]
    async fn test_dismiss() {
        let coordinator = RedirectionCoordinator::default();
        let suggestion = coordinator
            .on_session_state(&state(IntentLabel::Repetition, 0.8))
            .await
            .unwrap();

        coordinator.dismiss(suggestion.id).await.unwrap();
        assert_eq!(
            coordinator.dismiss(suggestion.id).await,
            Err(CoordinatorError::AlreadyResolved)
        );
    }

    #[tokio::test]
    async fn test_unknown_id() {
        let coordinator = RedirectionCoordinator::default();
        assert_eq!(
            coordinator.accept(Uuid::new_v4()).await,
            Err(CoordinatorError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_newer_suggestion_supersedes_pending() {
        let events = events::channel();
        let mut rx = events.subscribe();
        let coordinator = RedirectionCoordinator::with_events(DEFAULT_CONFIDENCE_THRESHOLD, events);

        let first = coordinator
            .on_session_state(&state(IntentLabel::OffTopic, 0.9))
            .await
            .unwrap();
        let second = coordinator
            .on_session_state(&state(IntentLabel::Distress, 0.9))
            .await
            .unwrap();

        assert_ne!(first.id, second.id);
        assert_eq!(coordinator.pending().await.unwrap().id, second.id);
        assert_eq!(
            coordinator.accept(first.id).await,
            Err(CoordinatorError::AlreadyResolved)
        );
        coordinator.accept(second.id).await.unwrap();

        assert!(matches!(rx.try_recv().unwrap(), GateEvent::SuggestionCreated { id, .. } if id == first.id));
        assert_eq!(
            rx.try_recv().unwrap(),
            GateEvent::SuggestionResolved {
                id: first.id,
                state: SuggestionState::Superseded
            }
        );
        assert!(matches!(rx.try_recv().unwrap(), GateEvent::SuggestionCreated { id, .. } if id == second.id));
        assert_eq!(
            rx.try_recv().unwrap(),
            GateEvent::SuggestionResolved {
                id: second.id,
                state: SuggestionState::Accepted
            }
        );
    }
}
