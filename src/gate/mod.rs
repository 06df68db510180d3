//! PIN-protected switching between child mode and the parent console.
//!
//! [`ModeGate`] owns the current [`Mode`]. Switching into the parent console
//! is refused inside configured time-lock windows and after repeated wrong
//! PINs; switching back to child mode always succeeds.

pub mod attempts;
pub mod auth;
pub mod clock;
#[allow(clippy::module_inception)]
pub mod gate;
pub mod mode;
pub mod schedule;

pub use attempts::{AttemptHistory, AttemptOutcome, AttemptTracker, AuthAttempt, LockoutPolicy, LockoutState};
pub use auth::{
    CredentialManager, CredentialStore, FileCredentialStore, HashedCredential, MemoryCredentialStore,
    PinAuthenticator, PinStrength, pin_strength,
};
pub use clock::{Clock, ManualClock, SystemClock, Timestamp};
pub use gate::{GateDeps, GateSettings, GateStatus, ModeGate};
pub use mode::{FileGateStateStore, GateStateStore, MemoryGateStateStore, Mode, PersistedGateState};
pub use schedule::{TimeLockSchedule, TimeLockWindow};
