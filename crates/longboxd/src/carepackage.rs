//! Diagnostic care-package generation.
//!
//! The care package is the emergency escape hatch: when the service is too
//! broken to start, an operator can still collect the configuration, the
//! database, and an environment summary into one bundle to attach to a bug
//! report. It runs synchronously, independently of every other mode, and
//! the process exits immediately afterwards.

use std::fs;
use std::io;
use std::time::{SystemTime, UNIX_EPOCH};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use thiserror::Error;

/// Name of the manifest written into every bundle.
const MANIFEST_NAME: &str = "manifest.json";

/// Result of a successful bundle generation.
#[derive(Debug)]
pub struct CarePackageReport {
    /// Directory the bundle was written into.
    pub bundle_dir: Utf8PathBuf,
    /// Files captured into the bundle.
    pub collected: Vec<String>,
    /// Files that were requested but absent on disk.
    pub missing: Vec<String>,
}

/// Errors raised while generating a care package.
#[derive(Debug, Error)]
pub enum CarePackageError {
    /// The bundle directory could not be created.
    #[error("failed to create bundle directory '{path}': {source}")]
    CreateDir {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// A source file exists but could not be copied.
    #[error("failed to copy '{path}' into the bundle: {source}")]
    Copy {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The manifest could not be serialised or written.
    #[error("failed to write bundle manifest: {source}")]
    Manifest {
        #[source]
        source: io::Error,
    },
    /// The wall clock is unusable.
    #[error("failed to read system time: {source}")]
    Clock {
        #[source]
        source: std::time::SystemTimeError,
    },
}

#[derive(Debug, Serialize)]
struct Manifest<'a> {
    generated_at: u64,
    version: &'a str,
    os: &'a str,
    collected: &'a [String],
    missing: &'a [String],
}

/// Generates a bundle under the data directory containing the configuration
/// document, the database when present, and a manifest describing both.
pub fn generate(
    data_dir: &Utf8Path,
    config_file: &Utf8Path,
    db_file: &Utf8Path,
) -> Result<CarePackageReport, CarePackageError> {
    let stamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|source| CarePackageError::Clock { source })?
        .as_secs();
    let bundle_dir = data_dir.join(format!("carepackage-{stamp}"));
    fs::create_dir_all(bundle_dir.as_std_path()).map_err(|source| CarePackageError::CreateDir {
        path: bundle_dir.clone(),
        source,
    })?;

    let mut collected = Vec::new();
    let mut missing = Vec::new();
    for source_path in [config_file, db_file] {
        let name = source_path
            .file_name()
            .unwrap_or(source_path.as_str())
            .to_owned();
        if !source_path.as_std_path().exists() {
            missing.push(name);
            continue;
        }
        fs::copy(
            source_path.as_std_path(),
            bundle_dir.join(&name).as_std_path(),
        )
        .map_err(|source| CarePackageError::Copy {
            path: source_path.to_path_buf(),
            source,
        })?;
        collected.push(name);
    }

    let manifest = Manifest {
        generated_at: stamp,
        version: env!("CARGO_PKG_VERSION"),
        os: std::env::consts::OS,
        collected: &collected,
        missing: &missing,
    };
    let serialised = serde_json::to_vec_pretty(&manifest)
        .map_err(|source| CarePackageError::Manifest {
            source: io::Error::other(source),
        })?;
    fs::write(bundle_dir.join(MANIFEST_NAME).as_std_path(), serialised)
        .map_err(|source| CarePackageError::Manifest { source })?;

    Ok(CarePackageReport {
        bundle_dir,
        collected,
        missing,
    })
}
