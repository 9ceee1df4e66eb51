//! Shared fixtures for the agent's test suites.

mod install;
mod reporter;

pub use install::*;
pub use reporter::{RecordingSupervisorReporter, SupervisorEvent};
