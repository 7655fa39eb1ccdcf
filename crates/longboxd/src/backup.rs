//! Pre-load backup orchestration.
//!
//! Backups run once per start, after the configuration document has been
//! loaded and before anything touches the database. Two triggers combine
//! with logical OR: the CLI scope and the persisted `backup_on_start` flag,
//! which forces both files regardless of what the CLI asked for. Each file
//! is copied into a rolling set of numbered generations; a failure for one
//! file never aborts the backup of the other.

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::mode::BackupScope;

const BACKUP_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::backup");

/// Number of rolling generations retained per file.
pub const BACKUP_GENERATIONS: u32 = 4;

/// Directory under the data directory holding backup generations.
pub const BACKUP_DIR_NAME: &str = "backups";

/// Files selected for this start's backup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackupPlan {
    /// Copy the configuration document.
    pub config: bool,
    /// Copy the database.
    pub database: bool,
}

/// Combines the CLI scope with the persisted `backup_on_start` flag.
///
/// Returns `None` when neither trigger requests anything, making the whole
/// pass an idempotent no-op.
#[must_use]
pub fn effective_plan(cli_scope: BackupScope, backup_on_start: bool) -> Option<BackupPlan> {
    if backup_on_start {
        return Some(BackupPlan {
            config: true,
            database: true,
        });
    }
    let plan = BackupPlan {
        config: cli_scope.wants_config(),
        database: cli_scope.wants_database(),
    };
    (plan.config || plan.database).then_some(plan)
}

/// Outcome of one file's backup attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupStatus {
    /// The file was copied into generation 1.
    Success,
    /// The copy failed; the reason is retained for the aggregated log line.
    Failure(String),
}

/// One entry per attempted file, in attempt order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupEntry {
    /// Human-readable label of the backed-up file.
    pub label: String,
    /// Success or failure of this attempt.
    pub status: BackupStatus,
}

/// Ordered record of every backup attempt in one pass.
#[derive(Debug, Default)]
pub struct BackupReport {
    entries: Vec<BackupEntry>,
}

impl BackupReport {
    /// All entries in attempt order.
    #[must_use]
    pub fn entries(&self) -> &[BackupEntry] {
        &self.entries
    }

    /// Labels of the successful attempts.
    #[must_use]
    pub fn successes(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| entry.status == BackupStatus::Success)
            .map(|entry| entry.label.as_str())
            .collect()
    }

    /// Labels of the failed attempts.
    #[must_use]
    pub fn failures(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|entry| matches!(entry.status, BackupStatus::Failure(_)))
            .map(|entry| entry.label.as_str())
            .collect()
    }

    /// Emits the aggregated result lines: failures first, then successes,
    /// never interleaved per file.
    pub fn log_summary(&self) {
        let failures = self.failures();
        if !failures.is_empty() {
            warn!(
                target: BACKUP_TARGET,
                count = failures.len(),
                files = ?failures,
                "backup failures"
            );
        }
        let successes = self.successes();
        if !successes.is_empty() {
            info!(
                target: BACKUP_TARGET,
                count = successes.len(),
                files = ?successes,
                "backup completed"
            );
        }
    }
}

/// Runs the requested backups, isolating per-file failures.
#[must_use]
pub fn run_backups(
    plan: BackupPlan,
    data_dir: &Utf8Path,
    config_file: &Utf8Path,
    db_file: &Utf8Path,
) -> BackupReport {
    let backup_dir = data_dir.join(BACKUP_DIR_NAME);
    let mut report = BackupReport::default();
    if plan.config {
        report.entries.push(back_up_file(&backup_dir, config_file));
    }
    if plan.database {
        report.entries.push(back_up_file(&backup_dir, db_file));
    }
    report
}

fn back_up_file(backup_dir: &Utf8Path, source: &Utf8Path) -> BackupEntry {
    let label = source
        .file_name()
        .unwrap_or(source.as_str())
        .to_owned();
    let status = match rotate_and_copy(backup_dir, source) {
        Ok(()) => BackupStatus::Success,
        Err(error) => BackupStatus::Failure(error.to_string()),
    };
    BackupEntry { label, status }
}

/// Shifts existing generations up by one (dropping the oldest) and copies
/// the source into generation 1.
fn rotate_and_copy(backup_dir: &Utf8Path, source: &Utf8Path) -> io::Result<()> {
    if !source.as_std_path().exists() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("source file '{source}' does not exist"),
        ));
    }
    let name = source.file_name().ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("source path '{source}' has no file name"),
        )
    })?;
    fs::create_dir_all(backup_dir.as_std_path())?;

    let generation = |n: u32| -> Utf8PathBuf { backup_dir.join(format!("{name}.{n}")) };

    let oldest = generation(BACKUP_GENERATIONS);
    if oldest.as_std_path().exists() {
        fs::remove_file(oldest.as_std_path())?;
    }
    for slot in (1..BACKUP_GENERATIONS).rev() {
        let from = generation(slot);
        if from.as_std_path().exists() {
            fs::rename(from.as_std_path(), generation(slot + 1).as_std_path())?;
        }
    }
    fs::copy(source.as_std_path(), generation(1).as_std_path())?;
    Ok(())
}
