use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, broadcast, watch};
use tracing::{debug, info, warn};

use super::attempts::{AttemptHistory, AttemptTracker, LockoutPolicy, LockoutState};
use super::auth::{CredentialStore, DEFAULT_PIN_LENGTH, PinAuthenticator};
use super::clock::{Clock, Timestamp, to_chrono, to_std};
use super::mode::{GateStateStore, Mode, PersistedGateState};
use super::schedule::TimeLockSchedule;
use crate::error::{AuthError, GateError};
use crate::events::{self, GateEvent};

/// Longest emergency override accepted
pub const MAX_EMERGENCY_OVERRIDE: Duration = Duration::from_secs(24 * 60 * 60);

/// Tunables for a gate instance
#[derive(Debug, Clone)]
pub struct GateSettings {
    pub pin_length: usize,
    pub store_timeout: Duration,
    pub lockout: LockoutPolicy,
    pub schedule: TimeLockSchedule,
    /// Inactivity after which the parent console relocks
    pub idle_timeout: Duration,
    /// Default length of an emergency override
    pub emergency_duration: Duration,
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            pin_length: DEFAULT_PIN_LENGTH,
            store_timeout: Duration::from_secs(2),
            lockout: LockoutPolicy::default(),
            schedule: TimeLockSchedule::default(),
            idle_timeout: Duration::from_secs(30 * 60),
            emergency_duration: Duration::from_secs(15 * 60),
        }
    }
}

/// Collaborators injected at the composition root
#[derive(Clone)]
pub struct GateDeps {
    pub credentials: Arc<dyn CredentialStore>,
    pub state: Arc<dyn GateStateStore>,
    pub clock: Arc<dyn Clock>,
}

/// Committed state readers see without taking the writer lock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    mode: Mode,
    lockout_until: Option<Timestamp>,
    emergency_until: Option<Timestamp>,
}

struct GateInner {
    mode: Mode,
    tracker: AttemptTracker,
    last_activity: Timestamp,
    emergency_until: Option<Timestamp>,
    /// Lockout as last announced, to emit changes once
    announced_lockout: bool,
}

impl GateInner {
    /// Parent console open and untouched for longer than `idle_timeout`
    fn idle_expired(&self, now: Timestamp, idle_timeout: Duration) -> bool {
        self.mode == Mode::Unrestricted && to_std(now - self.last_activity) > idle_timeout
    }

    fn persisted(&self) -> PersistedGateState {
        PersistedGateState::new(self.mode, self.tracker.history().clone())
            .with_last_activity(self.last_activity)
    }
}

/// Presentation summary of the gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateStatus {
    pub mode: Mode,
    pub time_locked: bool,
    pub lockout: LockoutState,
    pub attempts_remaining: u32,
    pub emergency_until: Option<Timestamp>,
    pub next_unlock: Option<Duration>,
}

/// Owner of the current mode
///
/// Mutations run under one async mutex, so a switch request validates and
/// commits as a single critical section. Reads go through a watch snapshot
/// and never wait on a switch in progress.
pub struct ModeGate {
    settings: GateSettings,
    authenticator: PinAuthenticator,
    store: Arc<dyn GateStateStore>,
    clock: Arc<dyn Clock>,
    inner: Mutex<GateInner>,
    snapshot: watch::Sender<Snapshot>,
    events: broadcast::Sender<GateEvent>,
}

impl ModeGate {
    /// Build a gate, resuming the last committed state
    ///
    /// Missing or unreadable state starts in `Restricted`, as does a parent
    /// console left idle past the timeout.
    pub fn new(settings: GateSettings, deps: GateDeps) -> Self {
        Self::with_events(settings, deps, events::channel())
    }

    /// Build a gate publishing on an existing notification channel
    pub fn with_events(
        settings: GateSettings,
        deps: GateDeps,
        events: broadcast::Sender<GateEvent>,
    ) -> Self {
        let now = deps.clock.now();

        let persisted = match deps.state.load() {
            Ok(Some(state)) => Some(state),
            Ok(None) => {
                debug!("No gate state found, starting in child mode");
                None
            }
            Err(e) => {
                warn!("Failed to load gate state, starting in child mode: {}", e);
                None
            }
        };

        let (mode, history, last_activity) = match persisted {
            Some(state) => {
                let last_activity = state.last_activity_at.unwrap_or(state.updated_at).min(now);
                (state.mode, state.history, last_activity)
            }
            None => (Mode::Restricted, AttemptHistory::default(), now),
        };

        let mut inner = GateInner {
            mode,
            tracker: AttemptTracker::with_history(settings.lockout, history),
            last_activity,
            emergency_until: None,
            announced_lockout: false,
        };

        if inner.idle_expired(now, settings.idle_timeout) {
            info!(
                "Parent console idle since {}, returning to child mode",
                inner.last_activity.format("%Y-%m-%d %H:%M")
            );
            inner.mode = Mode::Restricted;
            inner.tracker.reset_session();
            inner.last_activity = now;
            if let Err(e) = deps.state.save(&inner.persisted()) {
                warn!("Failed to persist gate state: {}", e);
            }
        }

        let lockout_until = inner.tracker.lockout_until(now);
        inner.announced_lockout = lockout_until.is_some();

        let (snapshot, _) = watch::channel(Snapshot {
            mode: inner.mode,
            lockout_until,
            emergency_until: None,
        });

        info!("Mode gate started in {}", inner.mode);

        Self {
            authenticator: PinAuthenticator::new(
                deps.credentials,
                settings.pin_length,
                settings.store_timeout,
            ),
            settings,
            store: deps.state,
            clock: deps.clock,
            inner: Mutex::new(inner),
            snapshot,
            events,
        }
    }

    /// Subscribe to gate notifications
    pub fn subscribe(&self) -> broadcast::Receiver<GateEvent> {
        self.events.subscribe()
    }

    /// Current mode from the latest committed snapshot
    pub fn current_mode(&self) -> Mode {
        self.snapshot.borrow().mode
    }

    /// Whether `now` falls inside a time-lock window
    ///
    /// Only blocks switching into `Unrestricted`. An active emergency override
    /// suspends every window.
    pub fn is_locked(&self, now: Timestamp) -> bool {
        let emergency_until = self.snapshot.borrow().emergency_until;
        self.time_lock_remaining(now, emergency_until).is_some()
    }

    /// Shortest wait until a switch into `Unrestricted` could be attempted
    ///
    /// Considers both the time lock and the attempt lockout; `None` when
    /// neither applies.
    pub fn time_until_next_unlock(&self, now: Timestamp) -> Option<Duration> {
        let snapshot = *self.snapshot.borrow();

        let time_lock = self.time_lock_remaining(now, snapshot.emergency_until);
        let lockout = snapshot
            .lockout_until
            .filter(|until| now < *until)
            .map(|until| to_std(until - now));

        match (time_lock, lockout) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Request a mode change
    pub async fn request_switch(&self, to: Mode, credential: Option<&str>) -> Result<Mode, GateError> {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        inner.tracker.purge_stale(now);

        let result = match to {
            Mode::Restricted => {
                self.enter_restricted(&mut inner, now, "requested");
                Ok(Mode::Restricted)
            }
            Mode::Unrestricted => self.enter_unrestricted(&mut inner, now, credential).await,
        };

        self.refresh(&mut inner, now);
        result
    }

    /// Note user activity in the parent console
    pub async fn record_activity(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;
        inner.last_activity = now;
        if inner.mode == Mode::Unrestricted {
            self.persist(&inner);
        }
    }

    /// Relock the parent console after prolonged inactivity
    ///
    /// Returns true when the gate switched back to `Restricted`.
    pub async fn enforce_idle_timeout(&self) -> bool {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        if !inner.idle_expired(now, self.settings.idle_timeout) {
            return false;
        }

        info!(
            "Parent console idle for {}s, returning to child mode",
            to_std(now - inner.last_activity).as_secs()
        );
        self.enter_restricted(&mut inner, now, "idle timeout");
        self.refresh(&mut inner, now);
        true
    }

    /// Suspend time locks for `duration` (the configured default when `None`)
    ///
    /// PIN entry and the attempt lockout still apply. Overrides are capped at
    /// one day.
    pub async fn activate_emergency_override(&self, duration: Option<Duration>) -> Timestamp {
        let now = self.clock.now();
        let duration = duration
            .unwrap_or(self.settings.emergency_duration)
            .min(MAX_EMERGENCY_OVERRIDE);
        let until = now + to_chrono(duration);

        let mut inner = self.inner.lock().await;
        inner.emergency_until = Some(until);
        info!("Emergency override active until {}", until.format("%H:%M:%S"));

        events::publish(
            &self.events,
            GateEvent::EmergencyOverrideChanged {
                active: true,
                until: Some(until),
            },
        );
        self.refresh(&mut inner, now);
        until
    }

    pub async fn deactivate_emergency_override(&self) {
        let now = self.clock.now();
        let mut inner = self.inner.lock().await;

        if inner.emergency_until.take().is_some() {
            info!("Emergency override ended");
            events::publish(
                &self.events,
                GateEvent::EmergencyOverrideChanged {
                    active: false,
                    until: None,
                },
            );
        }
        self.refresh(&mut inner, now);
    }

    /// Summary for badges and banners
    pub async fn status(&self, now: Timestamp) -> GateStatus {
        let inner = self.inner.lock().await;
        let emergency_until = inner.emergency_until.filter(|until| now < *until);

        GateStatus {
            mode: inner.mode,
            time_locked: self.time_lock_remaining(now, emergency_until).is_some(),
            lockout: inner.tracker.lockout_state(now),
            attempts_remaining: inner.tracker.attempts_remaining(now),
            emergency_until,
            next_unlock: self.time_until_next_unlock(now),
        }
    }

    fn time_lock_remaining(&self, now: Timestamp, emergency_until: Option<Timestamp>) -> Option<Duration> {
        if emergency_until.is_some_and(|until| now < until) {
            return None;
        }
        self.settings.schedule.time_until_unlock_at(&now)
    }

    fn enter_restricted(&self, inner: &mut GateInner, now: Timestamp, reason: &str) {
        inner.tracker.reset_session();
        inner.last_activity = now;
        self.commit_mode(inner, Mode::Restricted, now, reason);
    }

    async fn enter_unrestricted(
        &self,
        inner: &mut GateInner,
        now: Timestamp,
        credential: Option<&str>,
    ) -> Result<Mode, GateError> {
        if inner.mode == Mode::Unrestricted {
            inner.last_activity = now;
            self.persist(inner);
            return Ok(Mode::Unrestricted);
        }

        if let Some(remaining) = self.time_lock_remaining(now, inner.emergency_until) {
            info!("Switch refused: time-locked for {}s", remaining.as_secs());
            return Err(GateError::TimeLocked { remaining });
        }

        let lockout = inner.tracker.lockout_state(now);
        if lockout.locked {
            info!("Switch refused: PIN entry locked for {}s", lockout.remaining.as_secs());
            return Err(GateError::Locked {
                remaining: lockout.remaining,
            });
        }

        let Some(candidate) = credential else {
            return Err(GateError::MissingCredential);
        };

        match self.authenticator.validate(candidate).await {
            Err(AuthError::InvalidFormat { expected_len }) => {
                debug!("Malformed PIN submitted, not counted");
                Err(GateError::InvalidFormat { expected_len })
            }
            Err(AuthError::StoreUnavailable(e)) => {
                warn!("Credential store unavailable, mode unchanged: {}", e);
                Err(GateError::StoreUnavailable(e))
            }
            Ok(false) => {
                inner.tracker.record_failure(now);
                let attempts_remaining = inner.tracker.attempts_remaining(now);
                warn!("Incorrect PIN ({} attempts remaining)", attempts_remaining);
                self.persist(inner);
                Err(GateError::IncorrectCredential { attempts_remaining })
            }
            Ok(true) => {
                inner.tracker.record_success(now);
                inner.last_activity = now;
                self.commit_mode(inner, Mode::Unrestricted, now, "PIN accepted");
                Ok(Mode::Unrestricted)
            }
        }
    }

    fn commit_mode(&self, inner: &mut GateInner, to: Mode, now: Timestamp, reason: &str) {
        let from = inner.mode;
        inner.mode = to;
        self.persist(inner);

        if from != to {
            info!("Mode changed: {} -> {} ({})", from, to, reason);
            events::publish(&self.events, GateEvent::ModeChanged { from, to, at: now });
        }
    }

    fn persist(&self, inner: &GateInner) {
        if let Err(e) = self.store.save(&inner.persisted()) {
            warn!("Failed to persist gate state: {}", e);
        }
    }

    /// Publish the committed state and any lockout transition
    fn refresh(&self, inner: &mut GateInner, now: Timestamp) {
        if inner.emergency_until.is_some_and(|until| now >= until) {
            inner.emergency_until = None;
        }

        let lockout_until = inner.tracker.lockout_until(now);
        let locked = lockout_until.is_some();
        if locked != inner.announced_lockout {
            inner.announced_lockout = locked;
            if let Some(until) = lockout_until {
                warn!("Too many incorrect PINs, locked until {}", until.format("%H:%M:%S"));
            } else {
                info!("PIN lockout expired");
            }
            events::publish(
                &self.events,
                GateEvent::LockoutChanged {
                    locked,
                    until: lockout_until,
                },
            );
        }

        self.snapshot.send_replace(Snapshot {
            mode: inner.mode,
            lockout_until,
            emergency_until: inner.emergency_until,
        });
    }
}
