//! Test suites for the WinOps agent.

mod host_behaviour;
mod supervisor_behaviour;
pub(crate) mod support;
