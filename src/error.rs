//! Error types for the parent gate.
//!
//! Library operations return these typed errors so the presentation layer can
//! tell a wrong PIN apart from a lockout, a time lock, or a store that cannot
//! be read. The binary wraps them in `anyhow` for reporting.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by credential and gate-state stores.
#[derive(Error, Debug)]
pub enum StoreError {
    /// No credential has been enrolled yet
    #[error("No credential has been enrolled")]
    NotFound,

    /// Underlying file could not be read or written
    #[error("Store I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Stored data exists but cannot be decoded
    #[error("Stored data is corrupt: {0}")]
    Corrupt(String),

    /// The store did not answer within the configured bound
    #[error("Store did not respond within {}ms", .0.as_millis())]
    Timeout(Duration),

    /// Any other backend failure
    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Errors from validating a candidate PIN.
#[derive(Error, Debug)]
pub enum AuthError {
    /// Candidate is not exactly `expected_len` ASCII digits
    #[error("PIN must be exactly {expected_len} digits")]
    InvalidFormat { expected_len: usize },

    /// Credential could not be loaded; the candidate was neither accepted nor rejected
    #[error("Can't verify the PIN right now: {0}")]
    StoreUnavailable(#[source] StoreError),
}

/// Errors from enrolling or recovering a PIN.
#[derive(Error, Debug)]
pub enum EnrollError {
    #[error("PIN must be exactly {expected_len} digits")]
    InvalidFormat { expected_len: usize },

    /// Sequential or repeating PINs are refused
    #[error("PIN is too weak. Avoid sequences (123456) or repeating digits (111111)")]
    TooWeak,

    #[error("Recovery answer cannot be empty")]
    EmptyRecoveryAnswer,

    #[error("Recovery answer does not match")]
    RecoveryMismatch,

    #[error("Failed to hash secret: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors returned by a mode switch request.
#[derive(Error, Debug)]
pub enum GateError {
    /// Inside a configured time-lock window
    #[error("Parent console is time-locked for another {}s", .remaining.as_secs())]
    TimeLocked { remaining: Duration },

    /// Too many failed PIN attempts
    #[error("Too many incorrect PINs, try again in {}s", .remaining.as_secs())]
    Locked { remaining: Duration },

    #[error("A PIN is required to open the parent console")]
    MissingCredential,

    /// Malformed candidate, not counted as an attempt
    #[error("PIN must be exactly {expected_len} digits")]
    InvalidFormat { expected_len: usize },

    #[error("Incorrect PIN ({attempts_remaining} attempts remaining)")]
    IncorrectCredential { attempts_remaining: u32 },

    /// Credential store failed; mode unchanged and no attempt recorded
    #[error("Can't verify the PIN right now: {0}")]
    StoreUnavailable(#[source] StoreError),
}

/// Errors from accepting or dismissing a redirection suggestion.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorError {
    #[error("No suggestion with that id")]
    NotFound,

    #[error("Suggestion was already resolved")]
    AlreadyResolved,
}
