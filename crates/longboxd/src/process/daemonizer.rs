//! Implements the daemonisation backend for the `longboxd` process.

use camino::Utf8Path;
use thiserror::Error;
use tracing::info;

use super::PROCESS_TARGET;

/// Abstraction over daemonisation strategies.
pub trait Daemonizer {
    /// Detaches the process into the background.
    fn daemonize(&self, work_dir: &Utf8Path) -> Result<(), DaemonizeError>;
}

/// Errors surfaced by the daemonisation backend.
#[derive(Debug, Error)]
pub enum DaemonizeError {
    /// System-level daemonisation failed.
    #[cfg(unix)]
    #[error("{0}")]
    System(#[from] daemonize_me::DaemonError),
}

/// Daemoniser that delegates to `daemonize-me`.
#[derive(Debug, Default)]
pub struct SystemDaemonizer;

impl SystemDaemonizer {
    /// Builds a new system daemoniser.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[cfg(unix)]
impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, work_dir: &Utf8Path) -> Result<(), DaemonizeError> {
        use std::ffi::OsStr;

        use daemonize_me::Daemon;

        info!(
            target: PROCESS_TARGET,
            work_dir = %work_dir,
            "daemonising into background"
        );
        let mut daemon = Daemon::new();
        daemon = daemon.work_dir(work_dir.as_std_path());
        daemon = daemon.name(OsStr::new(env!("CARGO_PKG_NAME")));
        daemon.start()?;
        info!(
            target: PROCESS_TARGET,
            "daemon process detached; continuing in child"
        );
        Ok(())
    }
}

#[cfg(not(unix))]
impl Daemonizer for SystemDaemonizer {
    fn daemonize(&self, _work_dir: &Utf8Path) -> Result<(), DaemonizeError> {
        // The original behaviour on platforms without fork: warn and start
        // attached instead of failing.
        tracing::warn!(
            target: PROCESS_TARGET,
            "daemon mode is not supported on this platform; starting normally"
        );
        Ok(())
    }
}
