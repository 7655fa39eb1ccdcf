//! Supervises daemon launch sequencing and runtime orchestration.
//!
//! Ordering is load-bearing: provisional mode resolution (and the care
//! package's early exit) happen before any side effect, pidfile
//! arbitration before the configuration is read, backups after the
//! configuration is read but before anything touches the database, and the
//! schema probe only after backups have run.

use std::time::Duration;

use tracing::{debug, info};

use longbox_config::{ServiceConfig, validate_data_directory};

use crate::backup;
use crate::carepackage;
use crate::cli::Cli;
use crate::maintenance::{self, MaintenanceDecision};
use crate::mode::{self, MaintenanceOperation, Resolution, RunMode, StartupConfig};
use crate::server::{
    AdminUi, HttpAdminConsole, HttpServiceHost, ServiceHost, ServiceSettings, StatusBoard,
};
use crate::store::{MaintenanceStore, SqliteOpener, StoreOpener};
use crate::telemetry;
use crate::update::{GitUpdater, Updater};

use super::daemonizer::{Daemonizer, SystemDaemonizer};
use super::errors::LaunchError;
use super::guard::{self, DEFAULT_LIVENESS_MARKER, PidfileGuard};
use super::lifecycle::{self, SupervisorOutcome, UiNotifier};
use super::signal::SignalCell;
use super::{POLL_INTERVAL, PROCESS_TARGET, SHUTDOWN_GRACE};

/// Process-level collaborators needed to control daemon lifecycle.
pub(crate) struct ProcessControl<D> {
    pub(crate) daemonizer: D,
    pub(crate) signals: SignalCell,
    pub(crate) poll: Duration,
    pub(crate) grace: Duration,
}

/// Service collaborators required to run startup modes.
pub(crate) struct ServiceDeps<A, V, U, S, N> {
    pub(crate) admin: A,
    pub(crate) service: V,
    pub(crate) updater: U,
    pub(crate) opener: S,
    pub(crate) notifier: N,
}

/// Collaborators required to run the supervisor.
pub struct LaunchPlan<D, A, V, U, S, N> {
    pub(crate) process: ProcessControl<D>,
    pub(crate) services: ServiceDeps<A, V, U, S, N>,
}

/// Runs the supervisor using the production collaborators.
pub fn run_supervisor(cli: &Cli) -> Result<SupervisorOutcome, LaunchError> {
    let board = StatusBoard::new("Starting up.");
    let plan = LaunchPlan {
        process: ProcessControl {
            daemonizer: SystemDaemonizer::new(),
            signals: SignalCell::new(),
            poll: POLL_INTERVAL,
            grace: SHUTDOWN_GRACE,
        },
        services: ServiceDeps {
            admin: HttpAdminConsole::new(std::sync::Arc::clone(&board)),
            service: HttpServiceHost::new(std::sync::Arc::clone(&board)),
            updater: GitUpdater::from_environment(),
            opener: SqliteOpener,
            notifier: board,
        },
    };
    run_supervisor_with(cli, plan)
}

/// Runs the supervisor with injected collaborators.
pub(crate) fn run_supervisor_with<D, A, V, U, S, N>(
    cli: &Cli,
    plan: LaunchPlan<D, A, V, U, S, N>,
) -> Result<SupervisorOutcome, LaunchError>
where
    D: Daemonizer,
    A: AdminUi,
    V: ServiceHost,
    U: Updater,
    S: StoreOpener,
    N: UiNotifier,
{
    let LaunchPlan { process, services } = plan;
    let Resolution {
        mode: provisional,
        startup,
    } = mode::resolve(cli)?;

    if provisional == RunMode::CarePackage {
        run_care_package(&startup);
        return Ok(SupervisorOutcome::Shutdown);
    }

    // Pidfile arbitration runs before anything else touches disk; a live
    // instance must abort the whole startup here.
    if let Some(pid_file) = &startup.pid_file {
        guard::preflight(pid_file, DEFAULT_LIVENESS_MARKER)?;
    }

    let service_config = ServiceConfig::load(&startup.config_file)?;
    telemetry::initialise(startup.verbosity, &service_config)?;
    log_locale();

    let final_mode = mode::finalise(provisional, &service_config, &startup);
    info!(
        target: PROCESS_TARGET,
        mode = ?final_mode,
        data_dir = %startup.data_dir,
        "startup sequence resolved"
    );

    if let Some(backup_plan) =
        backup::effective_plan(startup.backup, service_config.backup_on_start())
    {
        let report = backup::run_backups(
            backup_plan,
            &startup.data_dir,
            &startup.config_file,
            &startup.db_file,
        );
        report.log_summary();
    }

    if final_mode == RunMode::Normal {
        validate_data_directory(&startup.data_dir, true)?;
    }

    if startup.daemon {
        process.daemonizer.daemonize(&startup.data_dir)?;
    }
    // Written after daemonisation so the file records the detached child.
    let _pidfile = engage_pidfile(&startup)?;

    let mut store = services.opener.open(&startup.db_file)?;
    let schema_behind = store.requires_upgrade()?;
    let endpoint = service_config.bind_endpoint(startup.forced_port);

    let pending_operation = match &final_mode {
        RunMode::Maintenance(operation) => Some(operation.clone()),
        RunMode::Normal if schema_behind && !startup.ignore_db_update => {
            info!(
                target: PROCESS_TARGET,
                "database schema is behind; entering maintenance for the upgrade"
            );
            Some(MaintenanceOperation::SchemaUpgrade)
        }
        _ => None,
    };

    if let Some(operation) = pending_operation {
        let decision = maintenance::dispatch(
            &operation,
            schema_behind,
            &endpoint,
            &services.admin,
            &services.updater,
            &mut store,
        )?;
        return Ok(decision_outcome(decision));
    }

    if let Some(port) = startup.forced_port {
        info!(
            target: PROCESS_TARGET,
            port,
            "starting service on forced port"
        );
    }
    let settings = ServiceSettings {
        safe_start: startup.safe_start,
        skip_weekly_check: startup.skip_weekly_check,
        http_root: service_config.http_root().to_owned(),
    };
    let handle = services
        .service
        .bring_up(&endpoint, &settings)
        .map_err(|source| LaunchError::ServiceServer { source })?;

    process.signals.register_termination()?;
    let outcome = lifecycle::run_loop(
        &process.signals,
        &services.notifier,
        process.poll,
        process.grace,
    );
    services.service.tear_down(handle);
    info!(
        target: PROCESS_TARGET,
        outcome = ?outcome,
        "shutdown sequence completed"
    );
    Ok(outcome)
}

fn engage_pidfile(startup: &StartupConfig) -> Result<Option<PidfileGuard>, LaunchError> {
    match &startup.pid_file {
        Some(path) if startup.daemon => Ok(Some(PidfileGuard::engage(path)?)),
        Some(_) => {
            info!(
                target: PROCESS_TARGET,
                "not running in daemon mode; pidfile creation disabled"
            );
            Ok(None)
        }
        None => Ok(None),
    }
}

fn decision_outcome(decision: MaintenanceDecision) -> SupervisorOutcome {
    if decision.restart {
        SupervisorOutcome::Restart {
            update: decision.with_update,
        }
    } else {
        SupervisorOutcome::Shutdown
    }
}

fn run_care_package(startup: &StartupConfig) {
    println!("[CAREPACKAGE] Generating care package (this can take a few seconds)...");
    match carepackage::generate(&startup.data_dir, &startup.config_file, &startup.db_file) {
        Ok(report) => println!(
            "[CAREPACKAGE] Successfully generated care package @ {}",
            report.bundle_dir
        ),
        Err(error) => println!("[CAREPACKAGE] Unable to generate care package: {error}"),
    }
    println!("Exiting...");
}

/// Encoding detection is advisory: anything unusable falls back to UTF-8
/// without surfacing an error.
fn log_locale() {
    let locale = std::env::var("LC_ALL")
        .or_else(|_| std::env::var("LANG"))
        .unwrap_or_default();
    if locale.is_empty() || !locale.to_ascii_lowercase().contains("utf") {
        info!(
            target: PROCESS_TARGET,
            "locale encoding unavailable or non-UTF; forcing UTF-8"
        );
    } else {
        debug!(
            target: PROCESS_TARGET,
            locale = %locale,
            "locale encoding detected"
        );
    }
}
