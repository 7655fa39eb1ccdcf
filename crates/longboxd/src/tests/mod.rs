//! Crate-internal behavioural tests for the supervisor.

pub(crate) mod support;
