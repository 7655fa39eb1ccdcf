//! Pidfile creation, validation, and staleness detection.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use super::PROCESS_TARGET;
use super::errors::LaunchError;

/// Substring expected in a live daemon's command line.
///
/// Liveness detection is a heuristic: the recorded PID may have been reused
/// by an unrelated process, so the command line is checked for evidence the
/// process is an instance of this program. The marker is a parameter rather
/// than a hard-coded constant so packaged or renamed binaries can adjust it.
pub const DEFAULT_LIVENESS_MARKER: &str = "longbox";

/// Returns true when an existing pidfile no longer corresponds to a live
/// instance of this program.
///
/// Only platforms exposing a process table under a well-known filesystem
/// path can answer definitively; everywhere else the answer is "not stale",
/// because a false negative merely refuses a start while a false positive
/// would delete a live daemon's pidfile.
pub fn check_stale(path: &Utf8Path, marker: &str) -> Result<bool, LaunchError> {
    match process_table_root() {
        Some(root) => stale_with_proc_root(path, marker, &root),
        None => Ok(false),
    }
}

/// Staleness check against an explicit process-table root.
pub(crate) fn stale_with_proc_root(
    path: &Utf8Path,
    marker: &str,
    proc_root: &Path,
) -> Result<bool, LaunchError> {
    let content = fs::read_to_string(path.as_std_path()).map_err(|source| {
        LaunchError::PidfileRead {
            path: path.to_path_buf(),
            source,
        }
    })?;

    // Unparseable content cannot correspond to a tracked process.
    let Ok(pid) = content.trim().parse::<u32>() else {
        return Ok(true);
    };

    let cmdline_path = proc_root.join(pid.to_string()).join("cmdline");
    if !cmdline_path.exists() {
        return Ok(true);
    }

    match fs::read(&cmdline_path) {
        Ok(raw) => {
            let cmdline = String::from_utf8_lossy(&raw).replace('\0', " ");
            Ok(!cmdline.contains(marker))
        }
        // An unreadable command line means a process exists; treat it as
        // live, since the unsafe direction is deleting a live daemon's file.
        Err(_) => Ok(false),
    }
}

/// Startup-time pidfile arbitration, run before anything else touches disk.
///
/// An existing stale file is deleted and startup continues; an existing
/// live file aborts the whole startup with [`LaunchError::AlreadyRunning`],
/// which is never retried.
pub fn preflight(path: &Utf8Path, marker: &str) -> Result<(), LaunchError> {
    if !path.as_std_path().exists() {
        return Ok(());
    }
    if check_stale(path, marker)? {
        warn!(
            target: PROCESS_TARGET,
            file = %path,
            "removing stale pidfile"
        );
        fs::remove_file(path.as_std_path()).map_err(|source| LaunchError::PidfileCleanup {
            path: path.to_path_buf(),
            source,
        })?;
        return Ok(());
    }
    Err(LaunchError::AlreadyRunning {
        path: path.to_path_buf(),
    })
}

/// Live pidfile owned by a daemonised process.
///
/// Written after daemonisation so the recorded PID is the detached child's.
/// Removal happens on drop, covering every clean exit path.
#[derive(Debug)]
pub struct PidfileGuard {
    path: Utf8PathBuf,
}

impl PidfileGuard {
    /// Writes the current PID (decimal, newline-terminated) to `path`.
    pub fn engage(path: &Utf8Path) -> Result<Self, LaunchError> {
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let mut file = options
            .open(path.as_std_path())
            .map_err(|source| LaunchError::PidfileWrite {
                path: path.to_path_buf(),
                source,
            })?;
        let pid = std::process::id();
        writeln!(file, "{pid}").map_err(|source| LaunchError::PidfileWrite {
            path: path.to_path_buf(),
            source,
        })?;
        file.sync_all().map_err(|source| LaunchError::PidfileWrite {
            path: path.to_path_buf(),
            source,
        })?;
        info!(
            target: PROCESS_TARGET,
            pid,
            file = %path,
            "pidfile written"
        );
        Ok(Self {
            path: path.to_path_buf(),
        })
    }
}

impl Drop for PidfileGuard {
    fn drop(&mut self) {
        match fs::remove_file(self.path.as_std_path()) {
            Err(error) if error.kind() != io::ErrorKind::NotFound => {
                warn!(
                    target: PROCESS_TARGET,
                    file = %self.path,
                    error = %error,
                    "failed to remove pidfile"
                );
            }
            _ => {}
        }
    }
}

fn process_table_root() -> Option<PathBuf> {
    #[cfg(target_os = "linux")]
    {
        let root = Path::new("/proc");
        root.exists().then(|| root.to_path_buf())
    }
    #[cfg(not(target_os = "linux"))]
    {
        None
    }
}
