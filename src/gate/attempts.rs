use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::Duration;

use super::clock::{Timestamp, to_chrono, to_std};

/// Most attempts kept in history regardless of age
const MAX_HISTORY: usize = 64;

/// Outcome of a single PIN submission
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttemptOutcome {
    Success,
    Failure,
}

/// A recorded PIN submission
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct AuthAttempt {
    pub timestamp: Timestamp,
    pub outcome: AttemptOutcome,
}

/// Derived lockout view; never stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutState {
    pub locked: bool,
    pub remaining: Duration,
}

impl LockoutState {
    pub fn unlocked() -> Self {
        Self {
            locked: false,
            remaining: Duration::ZERO,
        }
    }
}

/// Lockout tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub max_failures: u32,
    /// How long a lockout lasts, measured from the failure that triggered it
    pub lockout_duration: Duration,
    /// How far back a failure still counts toward the streak
    pub retention: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failures: 3,
            lockout_duration: Duration::from_secs(5 * 60),
            retention: Duration::from_secs(15 * 60),
        }
    }
}

/// Persistable tracker contents
#[derive(Debug, Clone, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct AttemptHistory {
    #[serde(default)]
    pub attempts: Vec<AuthAttempt>,

    /// Attempts before this position no longer count toward the streak
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_reset_index: Option<usize>,
}

/// Result of replaying the history
struct Replay {
    /// Failure timestamps in the current streak, oldest first
    streak: VecDeque<Timestamp>,
    lock_until: Option<Timestamp>,
}

/// Failed-attempt bookkeeping and lockout math
///
/// Lockout state is a pure function of the stored attempts: replaying them
/// yields the current failure streak and, if the streak ever reached the
/// threshold, the instant the resulting lockout ends.
#[derive(Debug, Clone)]
pub struct AttemptTracker {
    policy: LockoutPolicy,
    history: AttemptHistory,
}

impl AttemptTracker {
    pub fn new(policy: LockoutPolicy) -> Self {
        Self::with_history(policy, AttemptHistory::default())
    }

    /// Resume from persisted history
    pub fn with_history(policy: LockoutPolicy, mut history: AttemptHistory) -> Self {
        history.attempts.sort_by_key(|a| a.timestamp);
        Self { policy, history }
    }

    pub fn policy(&self) -> &LockoutPolicy {
        &self.policy
    }

    pub fn history(&self) -> &AttemptHistory {
        &self.history
    }

    pub fn attempts(&self) -> &[AuthAttempt] {
        &self.history.attempts
    }

    pub fn record_failure(&mut self, now: Timestamp) {
        self.push(now, AttemptOutcome::Failure);
    }

    /// Record a success; the failure streak restarts from zero
    pub fn record_success(&mut self, now: Timestamp) {
        self.push(now, AttemptOutcome::Success);
    }

    /// Restart the streak for a new session without erasing history
    ///
    /// Every attempt recorded so far, including ones sharing the current
    /// instant, falls before the reset. A lockout already in force keeps
    /// running.
    pub fn reset_session(&mut self) {
        self.history.session_reset_index = Some(self.history.attempts.len());
    }

    /// Current lockout view
    pub fn lockout_state(&self, now: Timestamp) -> LockoutState {
        match self.lockout_until(now) {
            Some(until) => LockoutState {
                locked: true,
                remaining: to_std(until - now),
            },
            None => LockoutState::unlocked(),
        }
    }

    /// End of the active lockout, if one is in force at `now`
    pub fn lockout_until(&self, now: Timestamp) -> Option<Timestamp> {
        self.replay(now).lock_until.filter(|until| now < *until)
    }

    /// Failures since the last success or session reset still inside retention
    pub fn consecutive_failures(&self, now: Timestamp) -> u32 {
        let cutoff = now - to_chrono(self.policy.retention);
        self.replay(now)
            .streak
            .iter()
            .filter(|t| **t >= cutoff)
            .count() as u32
    }

    /// Wrong PINs left before a lockout
    pub fn attempts_remaining(&self, now: Timestamp) -> u32 {
        if self.lockout_state(now).locked {
            return 0;
        }
        self.policy
            .max_failures
            .saturating_sub(self.consecutive_failures(now))
    }

    /// Drop attempts that can no longer influence lockout state
    ///
    /// An attempt is stale once it is older than the retention window plus the
    /// lockout duration: by then any lockout it helped trigger has expired.
    pub fn purge_stale(&mut self, now: Timestamp) -> usize {
        let horizon = to_chrono(self.policy.retention) + to_chrono(self.policy.lockout_duration);
        let cutoff = now - horizon;
        let before = self.history.attempts.len();
        self.history.attempts.retain(|a| a.timestamp >= cutoff);

        let removed = before - self.history.attempts.len();
        self.shift_reset(removed);
        removed
    }

    fn push(&mut self, now: Timestamp, outcome: AttemptOutcome) {
        self.history.attempts.push(AuthAttempt {
            timestamp: now,
            outcome,
        });

        if self.history.attempts.len() > MAX_HISTORY {
            let excess = self.history.attempts.len() - MAX_HISTORY;
            self.history.attempts.drain(..excess);
            self.shift_reset(excess);
        }
    }

    /// Keep the reset position aligned after `removed` oldest attempts are dropped
    fn shift_reset(&mut self, removed: usize) {
        self.history.session_reset_index = self
            .history
            .session_reset_index
            .map(|index| index.saturating_sub(removed))
            .filter(|index| *index > 0);
    }

    fn replay(&self, now: Timestamp) -> Replay {
        let retention = to_chrono(self.policy.retention);
        let lockout = to_chrono(self.policy.lockout_duration);
        let threshold = self.policy.max_failures.max(1) as usize;

        let mut streak: VecDeque<Timestamp> = VecDeque::new();
        let mut lock_until: Option<Timestamp> = None;
        let reset_index = self.history.session_reset_index;
        let mut replayed = 0;

        for (index, attempt) in self
            .history
            .attempts
            .iter()
            .take_while(|a| a.timestamp <= now)
            .enumerate()
        {
            replayed = index + 1;
            if reset_index == Some(index) {
                streak.clear();
            }

            match attempt.outcome {
                AttemptOutcome::Success => {
                    streak.clear();
                    lock_until = None;
                }
                AttemptOutcome::Failure => {
                    let cutoff = attempt.timestamp - retention;
                    while streak.front().is_some_and(|t| *t < cutoff) {
                        streak.pop_front();
                    }
                    streak.push_back(attempt.timestamp);

                    let already_locked = lock_until.is_some_and(|until| attempt.timestamp < until);
                    if streak.len() >= threshold && !already_locked {
                        lock_until = Some(attempt.timestamp + lockout);
                    }
                }
            }
        }

        if reset_index.is_some_and(|index| index >= replayed) {
            streak.clear();
        }

        Replay { streak, lock_until }
    }
}
