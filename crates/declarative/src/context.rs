//! Observer and callback traits
//!
//! These traits allow the declarative crate to report wait progress and ask
//! for confirmation without depending on a specific terminal UI.

use crate::waiter::WaitState;
use std::time::Duration;

/// Receives updates from a running waiter
///
/// Shared across await points, so implementations use interior
/// mutability and must be `Sync`.
pub trait WaitObserver: Send + Sync {
    /// Called once before the first poll
    fn on_wait_start(&self, _label: &str, _target: &[String]) {}

    /// Called after every poll; `status` is `None` when the poll failed
    /// with a transient error
    fn on_poll(&self, label: &str, attempt: u32, status: Option<&str>, elapsed: Duration);

    /// Called when the waiter reaches a terminal state
    fn on_wait_complete(&self, _label: &str, _state: WaitState) {}
}

/// Observer that ignores every update
pub struct NoObserver;

impl WaitObserver for NoObserver {
    fn on_poll(&self, _label: &str, _attempt: u32, _status: Option<&str>, _elapsed: Duration) {}
}

/// Confirmation callback for user interaction
pub trait ConfirmCallback: Send {
    /// Ask the user to confirm an action; `true` if confirmed
    fn confirm(&mut self, prompt: &str) -> bool;
}

/// Auto-confirm callback (always returns true)
pub struct AutoConfirm;

impl ConfirmCallback for AutoConfirm {
    fn confirm(&mut self, _prompt: &str) -> bool {
        true
    }
}

/// Auto-decline callback (always returns false)
pub struct AutoDecline;

impl ConfirmCallback for AutoDecline {
    fn confirm(&mut self, _prompt: &str) -> bool {
        false
    }
}
