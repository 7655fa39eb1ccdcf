//! Data directory validation performed before the service touches disk.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

/// Ensures the data directory exists and, when requested, is writable.
///
/// Missing directories are created (recursively). The writability probe uses
/// the platform access check rather than a trial write so validation leaves
/// no artefacts behind.
pub fn validate_data_directory(
    path: &Utf8Path,
    must_be_writable: bool,
) -> Result<(), DataDirError> {
    match fs::metadata(path.as_std_path()) {
        Ok(metadata) if !metadata.is_dir() => {
            return Err(DataDirError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        Ok(_) => {}
        Err(source) if source.kind() == io::ErrorKind::NotFound => {
            fs::create_dir_all(path.as_std_path()).map_err(|source| DataDirError::Create {
                path: path.to_path_buf(),
                source,
            })?;
        }
        Err(source) => {
            return Err(DataDirError::Inspect {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    if must_be_writable && !is_writable(path) {
        return Err(DataDirError::NotWritable {
            path: path.to_path_buf(),
        });
    }
    Ok(())
}

#[cfg(unix)]
fn is_writable(path: &Utf8Path) -> bool {
    use nix::unistd::{AccessFlags, access};
    access(path.as_std_path(), AccessFlags::W_OK).is_ok()
}

#[cfg(not(unix))]
fn is_writable(path: &Utf8Path) -> bool {
    !fs::metadata(path.as_std_path())
        .map(|metadata| metadata.permissions().readonly())
        .unwrap_or(true)
}

/// Errors raised while validating the data directory.
#[derive(Debug, Error)]
pub enum DataDirError {
    /// The path exists but is not a directory.
    #[error("data directory '{path}' is not a directory")]
    NotADirectory { path: Utf8PathBuf },
    /// The directory could not be created.
    #[error("failed to create data directory '{path}': {source}")]
    Create {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The directory could not be inspected.
    #[error("failed to inspect data directory '{path}': {source}")]
    Inspect {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The directory is not writable by the current user.
    #[error("cannot write to the data directory '{path}'")]
    NotWritable { path: Utf8PathBuf },
}
