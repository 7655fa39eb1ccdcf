//! Defines the unified error surface for daemon launch and supervision.

use std::io;

use camino::Utf8PathBuf;
use thiserror::Error;

use longbox_config::{ConfigError, DataDirError};

use crate::mode::UsageError;
use crate::server::ServeError;
use crate::store::StoreError;
use crate::telemetry::TelemetryError;
use crate::update::UpdateError;

use super::daemonizer::DaemonizeError;
use super::signal::SignalError;

/// Errors surfaced while launching or supervising the daemon process.
///
/// Every variant is fatal: the process exits non-zero without retrying.
/// Recoverable conditions (single backup failures, non-update maintenance
/// operation failures) never reach this type; they are logged and
/// aggregated at their isolation boundary instead.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// The command line was unusable.
    #[error(transparent)]
    Usage(#[from] UsageError),
    /// The persisted configuration failed to load.
    #[error("failed to load configuration: {source}")]
    Config {
        /// Underlying loader error.
        #[from]
        source: ConfigError,
    },
    /// Telemetry initialisation failed.
    #[error("failed to initialise telemetry: {source}")]
    Telemetry {
        /// Underlying telemetry error.
        #[from]
        source: TelemetryError,
    },
    /// The data directory is missing, occupied, or unwritable.
    #[error(transparent)]
    DataDir(#[from] DataDirError),
    /// A live instance already owns the pidfile. Never retried; distinct
    /// from every other error kind.
    #[error("pidfile '{path}' belongs to a running instance")]
    AlreadyRunning {
        /// Path of the contested pidfile.
        path: Utf8PathBuf,
    },
    /// Reading an existing pidfile failed.
    #[error("failed to read pidfile '{path}': {source}")]
    PidfileRead {
        /// Pidfile path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Removing a stale pidfile failed.
    #[error("failed to remove stale pidfile '{path}': {source}")]
    PidfileCleanup {
        /// Pidfile path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Writing the pidfile failed.
    #[error("unable to write pidfile '{path}': {source}")]
    PidfileWrite {
        /// Pidfile path.
        path: Utf8PathBuf,
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// Daemonisation failed.
    #[error("failed to daemonise: {source}")]
    Daemonize {
        /// Underlying daemonisation error.
        #[from]
        source: DaemonizeError,
    },
    /// Installing signal handlers failed.
    #[error(transparent)]
    Signals(#[from] SignalError),
    /// The temporary administrative endpoint could not be brought up.
    #[error("failed to start the maintenance endpoint: {source}")]
    AdminServer {
        /// Underlying bind or listener error.
        #[source]
        source: ServeError,
    },
    /// The service endpoint could not be brought up.
    #[error("failed to start the service endpoint: {source}")]
    ServiceServer {
        /// Underlying bind or listener error.
        #[source]
        source: ServeError,
    },
    /// Opening or probing the service database failed.
    #[error("failed to open the service database: {source}")]
    Store {
        /// Underlying store error.
        #[from]
        source: StoreError,
    },
    /// The requested self-update failed. Not retried.
    #[error("self-update failed: {source}")]
    Update {
        /// Underlying update error.
        #[from]
        source: UpdateError,
    },
}
