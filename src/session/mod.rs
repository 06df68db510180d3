//! Conversation intent detection and redirection suggestions.
//!
//! Turns from the chat layer feed an [`IntentClassifier`]; its
//! [`SessionState`] feeds a [`RedirectionCoordinator`], which offers at most
//! one pending suggestion at a time.

pub mod classifier;
pub mod redirection;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::gate::Timestamp;

pub use classifier::{ClassifierSettings, IntentClassifier, IntentRule, KeywordRule};
pub use redirection::{RedirectionCoordinator, RedirectionSuggestion, SuggestionState};

/// What the current conversation appears to be about
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    #[default]
    Unknown,
    OnTopic,
    OffTopic,
    Distress,
    Repetition,
    Disengagement,
}

impl IntentLabel {
    /// Tie-break rank; safety-relevant intents win
    pub fn priority(&self) -> u8 {
        match self {
            IntentLabel::Distress => 5,
            IntentLabel::Disengagement => 4,
            IntentLabel::Repetition => 3,
            IntentLabel::OffTopic => 2,
            IntentLabel::OnTopic => 1,
            IntentLabel::Unknown => 0,
        }
    }

    /// Whether this intent warrants a redirection suggestion
    pub fn is_actionable(&self) -> bool {
        matches!(
            self,
            IntentLabel::OffTopic
                | IntentLabel::Distress
                | IntentLabel::Repetition
                | IntentLabel::Disengagement
        )
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            IntentLabel::Unknown => "Unknown",
            IntentLabel::OnTopic => "On topic",
            IntentLabel::OffTopic => "Off topic",
            IntentLabel::Distress => "Distress",
            IntentLabel::Repetition => "Repetition",
            IntentLabel::Disengagement => "Disengaged",
        }
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    User,
    System,
}

/// One message in the conversation feed
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ConversationTurn {
    pub speaker: Speaker,
    pub text: String,
    pub timestamp: Timestamp,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            speaker: Speaker::User,
            text: text.into(),
            timestamp,
        }
    }

    pub fn system(text: impl Into<String>, timestamp: Timestamp) -> Self {
        Self {
            speaker: Speaker::System,
            text: text.into(),
            timestamp,
        }
    }

    pub fn is_user(&self) -> bool {
        self.speaker == Speaker::User
    }
}

/// Latest classification of the conversation
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq)]
pub struct SessionState {
    pub current_intent: IntentLabel,
    /// In [0, 1]
    pub confidence: f64,
    pub detected_at: Timestamp,
}

impl SessionState {
    pub fn new(current_intent: IntentLabel, confidence: f64, detected_at: Timestamp) -> Self {
        Self {
            current_intent,
            confidence: confidence.clamp(0.0, 1.0),
            detected_at,
        }
    }

    pub fn unknown(detected_at: Timestamp) -> Self {
        Self::new(IntentLabel::Unknown, 0.0, detected_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Local;

    #[test]
    fn test_priority_order() {
        let mut labels = vec![
            IntentLabel::Unknown,
            IntentLabel::OnTopic,
            IntentLabel::Distress,
            IntentLabel::OffTopic,
            IntentLabel::Disengagement,
            IntentLabel::Repetition,
        ];
        labels.sort_by_key(|l| std::cmp::Reverse(l.priority()));

        assert_eq!(
            labels,
            vec![
                IntentLabel::Distress,
                IntentLabel::Disengagement,
                IntentLabel::Repetition,
                IntentLabel::OffTopic,
                IntentLabel::OnTopic,
                IntentLabel::Unknown,
            ]
        );
    }

    #[test]
    fn test_actionable_set() {
        assert!(IntentLabel::Distress.is_actionable());
        assert!(IntentLabel::OffTopic.is_actionable());
        assert!(!IntentLabel::OnTopic.is_actionable());
        assert!(!IntentLabel::Unknown.is_actionable());
    }

    #[test]
    fn test_confidence_is_clamped() {
        let state = SessionState::new(IntentLabel::Distress, 1.7, Local::now());
        assert_eq!(state.confidence, 1.0);
    }

    #[test]
    fn test_label_serialization() {
        assert_eq!(
            serde_json::to_string(&IntentLabel::OffTopic).unwrap(),
            "\"off_topic\""
        );
    }
}
