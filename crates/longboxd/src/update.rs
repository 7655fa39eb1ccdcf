//! Application self-update.
//!
//! The deployed service is a git checkout; updating means fast-forwarding
//! that checkout. The trait seam exists because the maintenance dispatcher
//! treats update failure as fatal and is tested with recording doubles.

use std::env;
use std::process::Command;

use camino::Utf8PathBuf;
use thiserror::Error;
use tracing::info;

const UPDATE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::update");

/// Abstraction over application self-update strategies.
pub trait Updater {
    /// Updates the installed application in place.
    fn perform(&self) -> Result<(), UpdateError>;
}

/// Errors surfaced by the update backend.
#[derive(Debug, Error)]
pub enum UpdateError {
    /// The update command could not be started.
    #[error("failed to launch updater: {source}")]
    Spawn {
        #[source]
        source: std::io::Error,
    },
    /// The update command ran and reported failure.
    #[error("update failed: {detail}")]
    Failed { detail: String },
}

/// Updater that fast-forwards the git checkout the binary runs from.
#[derive(Debug, Clone)]
pub struct GitUpdater {
    repo_dir: Utf8PathBuf,
}

impl GitUpdater {
    /// Builds an updater rooted at the given checkout.
    #[must_use]
    pub fn new(repo_dir: Utf8PathBuf) -> Self {
        Self { repo_dir }
    }

    /// Derives the checkout from the running executable's location, falling
    /// back to the working directory when that cannot be resolved. The
    /// fallback surfaces naturally as a git error if an update is ever
    /// requested from it.
    #[must_use]
    pub fn from_environment() -> Self {
        let repo_dir = env::current_exe()
            .ok()
            .and_then(|exe| {
                exe.parent()
                    .and_then(|parent| Utf8PathBuf::from_path_buf(parent.to_path_buf()).ok())
            })
            .unwrap_or_else(|| Utf8PathBuf::from("."));
        Self::new(repo_dir)
    }
}

impl Updater for GitUpdater {
    fn perform(&self) -> Result<(), UpdateError> {
        info!(
            target: UPDATE_TARGET,
            checkout = %self.repo_dir,
            "requesting self-update"
        );
        let output = Command::new("git")
            .arg("-C")
            .arg(self.repo_dir.as_str())
            .args(["pull", "--ff-only"])
            .output()
            .map_err(|source| UpdateError::Spawn { source })?;
        if !output.status.success() {
            return Err(UpdateError::Failed {
                detail: String::from_utf8_lossy(&output.stderr).trim().to_owned(),
            });
        }
        info!(
            target: UPDATE_TARGET,
            "self-update completed"
        );
        Ok(())
    }
}
