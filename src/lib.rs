//! Parent console gate for a companion robot.
//!
//! Keeps the device in child mode unless a parent enters the PIN outside the
//! configured time locks, and watches child conversations for moments worth a
//! gentle redirection.

pub mod config;
pub mod error;
pub mod events;
pub mod gate;
pub mod platform;
pub mod session;

pub use error::{AuthError, CoordinatorError, EnrollError, GateError, StoreError};
pub use events::GateEvent;
pub use gate::{Mode, ModeGate};
