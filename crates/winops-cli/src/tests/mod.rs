//! Test suites for the `winops` CLI runtime.

mod support;
