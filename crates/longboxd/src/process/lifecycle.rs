//! The signal-driven run loop for normal service operation.
//!
//! The loop is cooperative polling by design: it must stay responsive to
//! OS-delivered signals without requiring them to interrupt blocking I/O,
//! so it blocks for a fixed short interval and consumes the signal cell
//! once per iteration. The consuming swap guarantees no non-empty value is
//! ever dropped unhandled.

use std::thread;
use std::time::Duration;

use tracing::info;

use super::PROCESS_TARGET;
use super::signal::{SignalCell, SignalRequest};

/// Observer for the shutdown notification made visible to the UI.
pub trait UiNotifier {
    /// Invoked exactly once when a clean shutdown begins.
    fn shutdown_pending(&self);
}

/// Terminal result of one supervisor run.
///
/// A restart is a request to fully re-launch the process image: the loop is
/// exit-only and the external launcher interprets the mapped exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOutcome {
    /// Clean terminal exit with no restart.
    Shutdown,
    /// Terminal exit for this process image; the service as a whole
    /// continues under a fresh image.
    Restart {
        /// Whether the launcher should update before restarting.
        update: bool,
    },
}

/// Runs the loop until a request arrives, then handles it terminally.
pub(crate) fn run_loop(
    signals: &SignalCell,
    notifier: &dyn UiNotifier,
    poll: Duration,
    grace: Duration,
) -> SupervisorOutcome {
    loop {
        let Some(request) = signals.take() else {
            thread::sleep(poll);
            continue;
        };
        info!(
            target: PROCESS_TARGET,
            request = %request,
            "received signal"
        );
        match request {
            SignalRequest::Shutdown => {
                notifier.shutdown_pending();
                thread::sleep(grace);
                return SupervisorOutcome::Shutdown;
            }
            SignalRequest::Restart => return SupervisorOutcome::Restart { update: false },
            SignalRequest::RestartWithUpdate => {
                return SupervisorOutcome::Restart { update: true };
            }
        }
    }
}
