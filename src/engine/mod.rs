//! Execution engine for cloudsync
//!
//! The engine covers:
//! 1. Diffing - Display change sets and plans
//! 2. Executing - Confirm, apply, and report the outcome

pub mod differ;
pub mod executor;

pub use executor::TerminalConfirm;
