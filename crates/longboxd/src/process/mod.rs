use std::time::Duration;

pub(crate) mod daemonizer;
mod errors;
mod guard;
pub(crate) mod launch;
mod lifecycle;
mod signal;

pub use daemonizer::{DaemonizeError, Daemonizer, SystemDaemonizer};
pub use errors::LaunchError;
pub use guard::{DEFAULT_LIVENESS_MARKER, PidfileGuard, check_stale, preflight};
pub use launch::{LaunchPlan, run_supervisor};
pub use lifecycle::{SupervisorOutcome, UiNotifier};
pub use signal::{SignalCell, SignalError, SignalRequest};

pub(crate) const PROCESS_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::process");

/// Fixed interval the lifecycle loop blocks for between signal polls.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace delay before shutdown so a final in-flight message can be recorded.
pub(crate) const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

/// Exit code the external launcher interprets as "start me again".
pub const EXIT_CODE_RESTART: u8 = 85;

/// Exit code the external launcher interprets as "update, then start me
/// again".
pub const EXIT_CODE_RESTART_WITH_UPDATE: u8 = 86;
