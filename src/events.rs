//! Change notifications for the presentation layer.
//!
//! The gate and the redirection coordinator publish on a shared
//! `tokio::sync::broadcast` channel; badges and banners subscribe instead of
//! polling.

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::gate::{Mode, Timestamp};
use crate::session::{IntentLabel, SuggestionState};

/// Capacity of the notification channel; slow subscribers see `Lagged`
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq)]
pub enum GateEvent {
    ModeChanged {
        from: Mode,
        to: Mode,
        at: Timestamp,
    },
    LockoutChanged {
        locked: bool,
        until: Option<Timestamp>,
    },
    EmergencyOverrideChanged {
        active: bool,
        until: Option<Timestamp>,
    },
    SuggestionCreated {
        id: Uuid,
        reason: IntentLabel,
        message: String,
    },
    SuggestionResolved {
        id: Uuid,
        state: SuggestionState,
    },
}

/// Create a fresh notification channel
pub fn channel() -> broadcast::Sender<GateEvent> {
    broadcast::channel(EVENT_CHANNEL_CAPACITY).0
}

/// Publish without caring whether anyone is listening
pub(crate) fn publish(sender: &broadcast::Sender<GateEvent>, event: GateEvent) {
    tracing::debug!("Publishing {:?}", event);
    let _ = sender.send(event);
}
