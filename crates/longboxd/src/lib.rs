//! Process lifecycle supervisor for the longbox service.
//!
//! `longboxd` turns command-line intent into a running, restartable,
//! signal-aware daemon. It arbitrates between three mutually-exclusive
//! startup modes: normal service operation, one-shot maintenance
//! operations behind a temporary administrative endpoint, and emergency
//! care-package generation. The supervisor owns process identity (the
//! pidfile), startup ordering (backup, directory validation, mode
//! dispatch, service bring-up), and the signal-driven run loop that turns
//! external signals and internal requests into shutdown, restart, and
//! restart-with-update transitions.
//!
//! A restart is never an in-process reset. The lifecycle loop is exit-only:
//! it maps each terminal transition onto a distinct exit code
//! ([`EXIT_CODE_RESTART`], [`EXIT_CODE_RESTART_WITH_UPDATE`]) which the
//! external launcher wrapper interprets as "start me again", optionally
//! updating first.

pub mod backup;
pub mod carepackage;
pub mod cli;
pub mod maintenance;
pub mod mode;
mod process;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod update;

pub use process::{
    DEFAULT_LIVENESS_MARKER, DaemonizeError, Daemonizer, EXIT_CODE_RESTART,
    EXIT_CODE_RESTART_WITH_UPDATE, LaunchError, PidfileGuard, SignalCell, SignalError,
    SignalRequest, SupervisorOutcome, SystemDaemonizer, UiNotifier, check_stale, preflight,
    run_supervisor,
};

#[cfg(test)]
mod tests;
