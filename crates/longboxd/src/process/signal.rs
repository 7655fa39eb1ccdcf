//! Single-slot signal cell shared between the OS signal handlers and the
//! lifecycle loop.
//!
//! The handler side is restricted to one atomic store; decoding, logging,
//! and every other consequence happens on the loop side. Values not
//! recognised as shutdown or restart deliberately decode as
//! restart-with-update so an unexpected request is never ignored.

use std::fmt;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use thiserror::Error;

const SIGNAL_NONE: usize = 0;
const SIGNAL_SHUTDOWN: usize = 1;
const SIGNAL_RESTART: usize = 2;
const SIGNAL_RESTART_WITH_UPDATE: usize = 3;

/// Request consumed from the cell by the lifecycle loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalRequest {
    /// Clean terminal shutdown.
    Shutdown,
    /// Re-exec without updating first.
    Restart,
    /// Update, then re-exec.
    RestartWithUpdate,
}

impl fmt::Display for SignalRequest {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Shutdown => "shutdown",
            Self::Restart => "restart",
            Self::RestartWithUpdate => "restart-with-update",
        };
        formatter.write_str(label)
    }
}

/// Errors raised while installing signal handlers.
#[derive(Debug, Error)]
pub enum SignalError {
    /// Registration with the OS failed.
    #[error("failed to install signal handlers: {source}")]
    Install {
        #[source]
        source: io::Error,
    },
}

/// Process-wide mutable cell holding at most one pending request.
///
/// Initialised to none at process start; reset to none on every consume. A
/// restart produces a fresh process image, so the cell never survives one.
#[derive(Debug, Clone, Default)]
pub struct SignalCell {
    slot: Arc<AtomicUsize>,
}

impl SignalCell {
    /// Creates an empty cell.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a request; used by internal requesters (maintenance
    /// completion, UI-driven restart) alongside the OS handlers.
    pub fn raise(&self, request: SignalRequest) {
        let encoded = match request {
            SignalRequest::Shutdown => SIGNAL_SHUTDOWN,
            SignalRequest::Restart => SIGNAL_RESTART,
            SignalRequest::RestartWithUpdate => SIGNAL_RESTART_WITH_UPDATE,
        };
        self.slot.store(encoded, Ordering::SeqCst);
    }

    /// Consumes the pending request, resetting the cell to none.
    ///
    /// Any non-empty value that is not shutdown or restart decodes as
    /// restart-with-update: the catch-all keeps future request kinds from
    /// being silently dropped.
    #[must_use]
    pub fn take(&self) -> Option<SignalRequest> {
        match self.slot.swap(SIGNAL_NONE, Ordering::SeqCst) {
            SIGNAL_NONE => None,
            SIGNAL_SHUTDOWN => Some(SignalRequest::Shutdown),
            SIGNAL_RESTART => Some(SignalRequest::Restart),
            _ => Some(SignalRequest::RestartWithUpdate),
        }
    }

    /// Registers the termination signals to store a shutdown request.
    ///
    /// The registered action is a single store; the handler performs no
    /// logging and no I/O.
    pub fn register_termination(&self) -> Result<(), SignalError> {
        for signal in [SIGTERM, SIGINT, SIGQUIT] {
            signal_hook::flag::register_usize(
                signal,
                Arc::clone(&self.slot),
                SIGNAL_SHUTDOWN,
            )
            .map_err(|source| SignalError::Install { source })?;
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn store_raw(&self, value: usize) {
        self.slot.store(value, Ordering::SeqCst);
    }
}
