//! CLI argument definitions for the longbox daemon.
//!
//! Flag selection mirrors the operator surface of the service: startup
//! tuning on the top-level parser, privileged one-shot operations behind the
//! `maintenance` subcommand. The parsed tree is raw input; mode resolution
//! lives in [`crate::mode`].

use camino::Utf8PathBuf;
use clap::{Args, Parser, Subcommand, ValueEnum};

/// Scope accepted by the `--backup` flag.
#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum BackupArg {
    /// Back up the configuration file only.
    Ini,
    /// Back up the database only.
    Db,
    /// Back up both files.
    Both,
}

/// Command-line interface for the longbox daemon.
#[derive(Parser, Debug)]
#[command(
    name = "longboxd",
    about = "Automated comic archive service",
    disable_help_subcommand = true
)]
pub struct Cli {
    /// Increase console logging verbosity.
    #[arg(short, long)]
    pub verbose: bool,
    /// Quieten console logging to warnings and errors.
    #[arg(short, long)]
    pub quiet: bool,
    /// Detach and run in the background.
    #[arg(short, long)]
    pub daemon: bool,
    /// Force the service onto a specific port, overriding the configuration.
    #[arg(short, long, value_name = "PORT")]
    pub port: Option<u16>,
    /// Back up the configuration and/or database before they are loaded,
    /// keeping the last 4 rolling copies.
    #[arg(
        short,
        long,
        value_name = "SCOPE",
        value_enum,
        num_args = 0..=1,
        default_missing_value = "both"
    )]
    pub backup: Option<BackupArg>,
    /// Skip the weekly pull-list check on startup (quicker boot sequence).
    #[arg(short = 'w', long = "noweekly")]
    pub no_weekly: bool,
    /// Do not enter maintenance for a pending database update (problem bypass).
    #[arg(long = "ignoreupdate")]
    pub ignore_update: bool,
    /// Directory where data files are stored.
    #[arg(long, value_name = "PATH")]
    pub datadir: Option<Utf8PathBuf>,
    /// Configuration file to use.
    #[arg(long, value_name = "PATH")]
    pub config: Option<Utf8PathBuf>,
    /// Create a pid file (only relevant when running as a daemon).
    #[arg(long, value_name = "PATH")]
    pub pidfile: Option<Utf8PathBuf>,
    /// Redirect the startup page to the management screen.
    #[arg(long)]
    pub safe: bool,
    /// One-shot administrative operations.
    #[command(subcommand)]
    pub command: Option<CliCommand>,
}

/// Structured subcommands for the longbox daemon.
#[derive(Subcommand, Debug)]
pub enum CliCommand {
    /// Enter maintenance mode (no UI) and perform one privileged operation.
    Maintenance(MaintenanceArgs),
}

/// Operation flags accepted by the `maintenance` subcommand.
///
/// Exactly one operation runs per invocation; when several flags are set the
/// resolver picks by a fixed priority order.
#[derive(Args, Debug, Default)]
pub struct MaintenanceArgs {
    /// Force the service to perform a self-update.
    #[arg(short, long)]
    pub update: bool,
    /// Merge another service database into the current one.
    #[arg(long = "importdatabase", alias = "id", value_name = "PATH")]
    pub import_database: Option<Utf8PathBuf>,
    /// Import a JSON file of comic IDs into the current database.
    #[arg(long = "importjson", alias = "ij", value_name = "PATH")]
    pub import_json: Option<Utf8PathBuf>,
    /// Export the current database's comic IDs to a JSON file.
    #[arg(long = "exportjson", alias = "xj", value_name = "PATH")]
    pub export_json: Option<Utf8PathBuf>,
    /// Report current maintenance status.
    #[arg(long = "importstatus", alias = "st")]
    pub status: bool,
    /// Remove doubled path separators from stored locations.
    #[arg(long = "fixslashes", alias = "fs")]
    pub fix_slashes: bool,
    /// Clear the provider search table.
    #[arg(long = "clearprovidertable", alias = "cp")]
    pub clear_provider_table: bool,
    /// Generate a diagnostic care package.
    #[arg(long = "carepackage", alias = "care")]
    pub care_package: bool,
}

impl MaintenanceArgs {
    /// Returns true when no operation flag was supplied at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.update
            && self.import_database.is_none()
            && self.import_json.is_none()
            && self.export_json.is_none()
            && !self.status
            && !self.fix_slashes
            && !self.clear_provider_table
            && !self.care_package
    }
}
