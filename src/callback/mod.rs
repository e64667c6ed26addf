//! Local callback side of the login
//!
//! - [`gate`]     -- exactly-once completion signal
//! - [`listener`] -- HTTP listener and callback state machine

pub mod gate;
pub mod listener;

pub use gate::CompletionGate;
pub use listener::{CallbackListener, CallbackOutcome, ListenerPhase, RunningListener};
