//! Startup mode resolution.
//!
//! Resolution happens in two pure phases. The first turns parsed flags into
//! a provisional `(RunMode, StartupConfig)` before any side effect other
//! than logging. The second recomputes the mode once the persisted
//! configuration is available, because one override (`clear_provider_table`)
//! lives in the configuration document rather than on the command line. An
//! explicit CLI-chosen operation is never downgraded by the second phase.

use camino::Utf8PathBuf;
use thiserror::Error;

use longbox_config::{CONFIG_FILE_NAME, DB_FILE_NAME, ServiceConfig, default_data_dir};

use crate::cli::{BackupArg, Cli, CliCommand, MaintenanceArgs};

/// Console verbosity resolved from the `--verbose`/`--quiet` flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Warnings and errors only.
    Quiet,
    /// The configured log filter.
    Normal,
    /// Debug-level logging.
    Verbose,
}

/// Files requested for pre-load backup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackupScope {
    /// No backup requested.
    None,
    /// Configuration file only.
    Config,
    /// Database only.
    Database,
    /// Both files.
    Both,
}

impl BackupScope {
    /// Whether the scope covers the configuration file.
    #[must_use]
    pub fn wants_config(self) -> bool {
        matches!(self, Self::Config | Self::Both)
    }

    /// Whether the scope covers the database.
    #[must_use]
    pub fn wants_database(self) -> bool {
        matches!(self, Self::Database | Self::Both)
    }
}

/// Resolved, immutable-after-parse startup record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartupConfig {
    /// Directory holding the configuration, database, backups, and bundles.
    pub data_dir: Utf8PathBuf,
    /// Path of the persisted configuration document.
    pub config_file: Utf8PathBuf,
    /// Path of the service database.
    pub db_file: Utf8PathBuf,
    /// Optional pidfile path; only written in daemon mode.
    pub pid_file: Option<Utf8PathBuf>,
    /// Whether to detach into the background.
    pub daemon: bool,
    /// Port override applied at bring-up time only.
    pub forced_port: Option<u16>,
    /// Redirect the startup page to the management screen.
    pub safe_start: bool,
    /// Skip the weekly pull-list check on startup.
    pub skip_weekly_check: bool,
    /// Bypass the pending-database-update maintenance trigger.
    pub ignore_db_update: bool,
    /// Pre-load backup scope requested on the command line.
    pub backup: BackupScope,
    /// Console verbosity.
    pub verbosity: Verbosity,
}

/// One resolved startup mode per process invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Full service operation.
    Normal,
    /// One privileged operation behind a temporary admin endpoint.
    Maintenance(MaintenanceOperation),
    /// Synchronous diagnostic bundle generation; exits immediately after.
    CarePackage,
}

/// The single operation a maintenance invocation performs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MaintenanceOperation {
    /// Application self-update.
    Update,
    /// Merge another service database into the current one.
    ImportDatabase(Utf8PathBuf),
    /// Import a JSON file of comic IDs.
    ImportJson(Utf8PathBuf),
    /// Export comic IDs to a JSON file.
    ExportJson(Utf8PathBuf),
    /// Remove doubled path separators from stored locations.
    FixSlashes,
    /// Clear the provider search table.
    ClearProviderTable,
    /// Report maintenance status; the only operation that does not restart.
    Status,
    /// Implicitly triggered schema upgrade.
    SchemaUpgrade,
}

/// Result of the first resolution phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Provisional run mode; may still be upgraded by [`finalise`].
    pub mode: RunMode,
    /// Immutable startup record.
    pub startup: StartupConfig,
}

/// Fatal usage errors raised before any other work occurs.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum UsageError {
    /// `maintenance` was invoked without any operation flag.
    #[error("the maintenance subcommand expects an operation flag (see `longboxd maintenance --help`)")]
    MissingMaintenanceOperation,
}

/// Phase one: pure resolution from parsed flags.
pub fn resolve(cli: &Cli) -> Result<Resolution, UsageError> {
    let maintenance = match &cli.command {
        Some(CliCommand::Maintenance(args)) if args.is_empty() => {
            return Err(UsageError::MissingMaintenanceOperation);
        }
        Some(CliCommand::Maintenance(args)) => Some(args),
        None => None,
    };

    let startup = startup_config(cli);

    // The care package pre-empts every other maintenance flag: it runs
    // synchronously and the process exits before the lifecycle loop.
    let mode = match maintenance {
        Some(args) if args.care_package => RunMode::CarePackage,
        // `--ignoreupdate` is the single highest-priority override: it
        // forces normal operation past every maintenance trigger.
        Some(_) if startup.ignore_db_update => RunMode::Normal,
        Some(args) => match select_operation(args) {
            Some(operation) => RunMode::Maintenance(operation),
            None => return Err(UsageError::MissingMaintenanceOperation),
        },
        None => RunMode::Normal,
    };

    Ok(Resolution { mode, startup })
}

/// Phase two: recompute the mode once the persisted configuration is loaded.
///
/// Upgrades `Normal` to `Maintenance(ClearProviderTable)` when the persisted
/// override is set. Never downgrades an explicit CLI-chosen operation, and
/// `--ignoreupdate` suppresses the upgrade entirely.
#[must_use]
pub fn finalise(mode: RunMode, service: &ServiceConfig, startup: &StartupConfig) -> RunMode {
    match mode {
        RunMode::Normal
            if service.clear_provider_table() && !startup.ignore_db_update =>
        {
            RunMode::Maintenance(MaintenanceOperation::ClearProviderTable)
        }
        other => other,
    }
}

/// Selects the maintenance operation by a fixed, documented priority order:
/// update, database import, JSON import, JSON export, slash repair, provider
/// table clear, status. The first set flag wins.
fn select_operation(args: &MaintenanceArgs) -> Option<MaintenanceOperation> {
    let ordered: [Option<MaintenanceOperation>; 7] = [
        args.update.then_some(MaintenanceOperation::Update),
        args.import_database
            .clone()
            .map(MaintenanceOperation::ImportDatabase),
        args.import_json.clone().map(MaintenanceOperation::ImportJson),
        args.export_json.clone().map(MaintenanceOperation::ExportJson),
        args.fix_slashes.then_some(MaintenanceOperation::FixSlashes),
        args.clear_provider_table
            .then_some(MaintenanceOperation::ClearProviderTable),
        args.status.then_some(MaintenanceOperation::Status),
    ];
    ordered.into_iter().flatten().next()
}

fn startup_config(cli: &Cli) -> StartupConfig {
    let data_dir = cli.datadir.clone().unwrap_or_else(default_data_dir);
    let config_file = cli
        .config
        .clone()
        .unwrap_or_else(|| data_dir.join(CONFIG_FILE_NAME));
    let db_file = data_dir.join(DB_FILE_NAME);

    let verbosity = if cli.verbose {
        Verbosity::Verbose
    } else if cli.quiet {
        Verbosity::Quiet
    } else {
        Verbosity::Normal
    };

    let backup = match cli.backup {
        None => BackupScope::None,
        Some(BackupArg::Ini) => BackupScope::Config,
        Some(BackupArg::Db) => BackupScope::Database,
        Some(BackupArg::Both) => BackupScope::Both,
    };

    StartupConfig {
        data_dir,
        config_file,
        db_file,
        pid_file: cli.pidfile.clone(),
        daemon: cli.daemon,
        forced_port: cli.port.filter(|port| *port > 0),
        safe_start: cli.safe,
        skip_weekly_check: cli.no_weekly,
        ignore_db_update: cli.ignore_update,
        backup,
        verbosity,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;
    use rstest::rstest;

    fn cli(args: &[&str]) -> Cli {
        let mut full = vec!["longboxd"];
        full.extend_from_slice(args);
        Cli::try_parse_from(full).expect("arguments should parse")
    }

    fn resolved_mode(args: &[&str]) -> RunMode {
        resolve(&cli(args)).expect("resolution should succeed").mode
    }

    #[test]
    fn bare_invocation_resolves_to_normal() {
        assert_eq!(resolved_mode(&[]), RunMode::Normal);
    }

    #[test]
    fn bare_maintenance_is_a_usage_error() {
        let error = resolve(&cli(&["maintenance"])).expect_err("should fail");
        assert_eq!(error, UsageError::MissingMaintenanceOperation);
    }

    #[test]
    fn care_package_preempts_other_operation_flags() {
        let mode = resolved_mode(&["maintenance", "--carepackage", "--update", "--fixslashes"]);
        assert_eq!(mode, RunMode::CarePackage);
    }

    #[test]
    fn update_outranks_fix_slashes() {
        let mode = resolved_mode(&["maintenance", "--update", "--fixslashes"]);
        assert_eq!(mode, RunMode::Maintenance(MaintenanceOperation::Update));
    }

    #[test]
    fn import_database_outranks_export() {
        let mode = resolved_mode(&[
            "maintenance",
            "--exportjson",
            "/tmp/out.json",
            "--importdatabase",
            "/tmp/other.db",
        ]);
        assert_eq!(
            mode,
            RunMode::Maintenance(MaintenanceOperation::ImportDatabase(Utf8PathBuf::from(
                "/tmp/other.db"
            )))
        );
    }

    #[test]
    fn status_is_lowest_priority() {
        let mode = resolved_mode(&["maintenance", "--importstatus", "--clearprovidertable"]);
        assert_eq!(
            mode,
            RunMode::Maintenance(MaintenanceOperation::ClearProviderTable)
        );
    }

    #[test]
    fn ignore_update_forces_normal_mode() {
        let mode = resolved_mode(&["--ignoreupdate", "maintenance", "--update"]);
        assert_eq!(mode, RunMode::Normal);
    }

    #[test]
    fn resolution_is_deterministic() {
        let first = resolve(&cli(&["-v", "-d", "--port", "9001"])).expect("should resolve");
        let second = resolve(&cli(&["-v", "-d", "--port", "9001"])).expect("should resolve");
        assert_eq!(first, second);
    }

    #[rstest]
    #[case(&[], Verbosity::Normal)]
    #[case(&["-v"], Verbosity::Verbose)]
    #[case(&["-q"], Verbosity::Quiet)]
    #[case(&["-v", "-q"], Verbosity::Verbose)]
    fn verbosity_precedence(#[case] args: &[&str], #[case] expected: Verbosity) {
        let resolution = resolve(&cli(args)).expect("should resolve");
        assert_eq!(resolution.startup.verbosity, expected);
    }

    #[test]
    fn forced_port_of_zero_is_dropped() {
        let resolution = resolve(&cli(&["--port", "0"])).expect("should resolve");
        assert_eq!(resolution.startup.forced_port, None);
    }

    #[test]
    fn config_override_upgrades_normal_mode() {
        let resolution = resolve(&cli(&[])).expect("should resolve");
        let service: ServiceConfig =
            toml::from_str("clear_provider_table = true").expect("document should parse");
        let mode = finalise(resolution.mode, &service, &resolution.startup);
        assert_eq!(
            mode,
            RunMode::Maintenance(MaintenanceOperation::ClearProviderTable)
        );
    }

    #[test]
    fn config_override_never_downgrades_cli_operation() {
        let resolution =
            resolve(&cli(&["maintenance", "--fixslashes"])).expect("should resolve");
        let service: ServiceConfig =
            toml::from_str("clear_provider_table = true").expect("document should parse");
        let mode = finalise(resolution.mode, &service, &resolution.startup);
        assert_eq!(mode, RunMode::Maintenance(MaintenanceOperation::FixSlashes));
    }

    #[test]
    fn ignore_update_suppresses_config_override() {
        let resolution = resolve(&cli(&["--ignoreupdate"])).expect("should resolve");
        let service: ServiceConfig =
            toml::from_str("clear_provider_table = true").expect("document should parse");
        let mode = finalise(resolution.mode, &service, &resolution.startup);
        assert_eq!(mode, RunMode::Normal);
    }

    #[test]
    fn data_dir_flag_threads_through_paths() {
        let resolution = resolve(&cli(&["--datadir", "/srv/longbox"])).expect("should resolve");
        assert_eq!(resolution.startup.data_dir, Utf8PathBuf::from("/srv/longbox"));
        assert_eq!(
            resolution.startup.config_file,
            Utf8PathBuf::from("/srv/longbox/config.toml")
        );
        assert_eq!(
            resolution.startup.db_file,
            Utf8PathBuf::from("/srv/longbox/longbox.db")
        );
    }
}
