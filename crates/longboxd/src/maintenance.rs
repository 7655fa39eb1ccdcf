//! Maintenance mode dispatch.
//!
//! Entered only when the resolved mode selects a maintenance operation. The
//! dispatcher brings up the temporary administrative endpoint, runs the
//! pending schema upgrade ahead of any explicit operation, performs at most
//! one operation synchronously, tears the endpoint down unconditionally,
//! and decides whether the process restarts afterwards. It never returns
//! control to normal service bring-up within the same process.

use tracing::{info, warn};

use longbox_config::BindEndpoint;

use crate::mode::MaintenanceOperation;
use crate::process::LaunchError;
use crate::server::AdminUi;
use crate::store::{MaintenanceStore, StoreError};
use crate::update::Updater;

const MAINTENANCE_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::maintenance");

/// Restart policy decided once the operation has run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaintenanceDecision {
    /// Whether the launcher should start a fresh process image.
    pub restart: bool,
    /// Whether the launcher should update before restarting.
    pub with_update: bool,
}

/// Runs exactly one maintenance pass.
///
/// Failure to bring the administrative endpoint up is fatal: a destructive
/// operation must not proceed without operator visibility. A failed
/// self-update is also fatal. Every other operation failure is logged and
/// the decided restart policy still applies. A failed schema upgrade forces
/// a restart so the next boot can retry.
pub fn dispatch<A, U, S>(
    operation: &MaintenanceOperation,
    schema_behind: bool,
    endpoint: &BindEndpoint,
    admin: &A,
    updater: &U,
    store: &mut S,
) -> Result<MaintenanceDecision, LaunchError>
where
    A: AdminUi,
    U: Updater,
    S: MaintenanceStore,
{
    let handle = admin
        .bring_up(endpoint)
        .map_err(|source| LaunchError::AdminServer { source })?;
    admin.publish(&format!(
        "Maintenance in progress: {}",
        describe(operation)
    ));
    info!(
        target: MAINTENANCE_TARGET,
        operation = describe(operation),
        "entering maintenance mode"
    );

    let mut upgrade_failed = false;
    if schema_behind || matches!(operation, MaintenanceOperation::SchemaUpgrade) {
        match store.upgrade_schema() {
            Ok(()) => info!(
                target: MAINTENANCE_TARGET,
                "database schema upgraded"
            ),
            Err(error) => {
                warn!(
                    target: MAINTENANCE_TARGET,
                    error = %error,
                    "database schema upgrade failed; will restart to retry"
                );
                upgrade_failed = true;
            }
        }
    }

    let result = run_operation(operation, updater, store);

    // The endpoint comes down whether the operation succeeded or failed.
    admin.tear_down(handle);
    info!(
        target: MAINTENANCE_TARGET,
        "maintenance endpoint shut down"
    );
    result?;

    let restart = !matches!(operation, MaintenanceOperation::Status) || upgrade_failed;
    Ok(MaintenanceDecision {
        restart,
        with_update: matches!(operation, MaintenanceOperation::Update),
    })
}

/// Runs the selected operation. Only an update failure escapes as an error;
/// store operation failures stay inside their isolation boundary.
fn run_operation<U, S>(
    operation: &MaintenanceOperation,
    updater: &U,
    store: &mut S,
) -> Result<(), LaunchError>
where
    U: Updater,
    S: MaintenanceStore,
{
    match operation {
        MaintenanceOperation::Update => {
            updater.perform().map_err(LaunchError::from)?;
            info!(
                target: MAINTENANCE_TARGET,
                "self-update succeeded; restart with update requested"
            );
        }
        // The upgrade already ran ahead of dispatch.
        MaintenanceOperation::SchemaUpgrade => {}
        MaintenanceOperation::ImportDatabase(path) => log_outcome(
            "database-import",
            store
                .import_database(path)
                .map(|summary| format!("{} added, {} skipped", summary.added, summary.skipped)),
        ),
        MaintenanceOperation::ImportJson(path) => log_outcome(
            "json-import",
            store
                .import_json(path)
                .map(|summary| format!("{} added, {} skipped", summary.added, summary.skipped)),
        ),
        MaintenanceOperation::ExportJson(path) => log_outcome(
            "json-export",
            store
                .export_json(path)
                .map(|count| format!("{count} comic IDs exported")),
        ),
        MaintenanceOperation::FixSlashes => log_outcome(
            "fix-slashes",
            store
                .fix_slashes()
                .map(|count| format!("{count} locations repaired")),
        ),
        MaintenanceOperation::ClearProviderTable => log_outcome(
            "clear-provider-table",
            store
                .clear_provider_table()
                .map(|count| format!("{count} provider rows cleared")),
        ),
        MaintenanceOperation::Status => match store.status() {
            Ok(status) => {
                info!(
                    target: MAINTENANCE_TARGET,
                    %status,
                    "maintenance status"
                );
                println!("{status}");
            }
            Err(error) => warn!(
                target: MAINTENANCE_TARGET,
                error = %error,
                "failed to read maintenance status"
            ),
        },
    }
    Ok(())
}

fn log_outcome(operation: &'static str, result: Result<String, StoreError>) {
    match result {
        Ok(detail) => info!(
            target: MAINTENANCE_TARGET,
            operation,
            detail = %detail,
            "maintenance operation succeeded"
        ),
        Err(error) => warn!(
            target: MAINTENANCE_TARGET,
            operation,
            error = %error,
            "maintenance operation failed"
        ),
    }
}

fn describe(operation: &MaintenanceOperation) -> &'static str {
    match operation {
        MaintenanceOperation::Update => "self-update",
        MaintenanceOperation::ImportDatabase(_) => "database import",
        MaintenanceOperation::ImportJson(_) => "json import",
        MaintenanceOperation::ExportJson(_) => "json export",
        MaintenanceOperation::FixSlashes => "slash repair",
        MaintenanceOperation::ClearProviderTable => "provider table clear",
        MaintenanceOperation::Status => "status report",
        MaintenanceOperation::SchemaUpgrade => "database schema upgrade",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    use camino::Utf8Path;

    use crate::store::{ImportSummary, StoreStatus};
    use crate::update::UpdateError;

    type EventLog = Rc<RefCell<Vec<&'static str>>>;

    struct RecordingAdmin {
        events: EventLog,
        fail_bind: bool,
    }

    impl RecordingAdmin {
        fn new(events: EventLog) -> Self {
            Self {
                events,
                fail_bind: false,
            }
        }

        fn failing(events: EventLog) -> Self {
            Self {
                events,
                fail_bind: true,
            }
        }
    }

    impl AdminUi for RecordingAdmin {
        type Handle = ();

        fn bring_up(
            &self,
            _endpoint: &BindEndpoint,
        ) -> Result<Self::Handle, crate::server::ServeError> {
            if self.fail_bind {
                return Err(crate::server::ServeError::ResolveEmpty {
                    host: "nowhere".to_owned(),
                    port: 0,
                });
            }
            self.events.borrow_mut().push("admin-up");
            Ok(())
        }

        fn publish(&self, _message: &str) {}

        fn tear_down(&self, (): Self::Handle) {
            self.events.borrow_mut().push("admin-down");
        }
    }

    struct ScriptedUpdater {
        events: EventLog,
        succeed: bool,
    }

    impl Updater for ScriptedUpdater {
        fn perform(&self) -> Result<(), UpdateError> {
            self.events.borrow_mut().push("update");
            if self.succeed {
                Ok(())
            } else {
                Err(UpdateError::Failed {
                    detail: "deliberate failure".to_owned(),
                })
            }
        }
    }

    struct ScriptedStore {
        events: EventLog,
        upgrade_succeeds: bool,
        ops_succeed: bool,
    }

    impl ScriptedStore {
        fn new(events: EventLog) -> Self {
            Self {
                events,
                upgrade_succeeds: true,
                ops_succeed: true,
            }
        }

        fn op_result<T>(&self, event: &'static str, value: T) -> Result<T, StoreError> {
            self.events.borrow_mut().push(event);
            if self.ops_succeed {
                Ok(value)
            } else {
                Err(StoreError::SchemaAhead {
                    found: 0,
                    supported: 0,
                })
            }
        }
    }

    impl MaintenanceStore for ScriptedStore {
        fn schema_version(&self) -> Result<i32, StoreError> {
            Ok(1)
        }

        fn upgrade_schema(&mut self) -> Result<(), StoreError> {
            self.events.borrow_mut().push("upgrade");
            if self.upgrade_succeeds {
                Ok(())
            } else {
                Err(StoreError::SchemaAhead {
                    found: 0,
                    supported: 0,
                })
            }
        }

        fn import_database(&mut self, _path: &Utf8Path) -> Result<ImportSummary, StoreError> {
            self.op_result("import-database", ImportSummary::default())
        }

        fn import_json(&mut self, _path: &Utf8Path) -> Result<ImportSummary, StoreError> {
            self.op_result("import-json", ImportSummary::default())
        }

        fn export_json(&self, _path: &Utf8Path) -> Result<usize, StoreError> {
            self.op_result("export-json", 0)
        }

        fn fix_slashes(&mut self) -> Result<usize, StoreError> {
            self.op_result("fix-slashes", 0)
        }

        fn clear_provider_table(&mut self) -> Result<usize, StoreError> {
            self.op_result("clear-provider-table", 0)
        }

        fn status(&self) -> Result<StoreStatus, StoreError> {
            self.op_result(
                "status",
                StoreStatus {
                    schema_version: 1,
                    total_comics: 0,
                    wanted_comics: 0,
                    provider_rows: 0,
                },
            )
        }
    }

    fn endpoint() -> BindEndpoint {
        BindEndpoint::tcp("127.0.0.1", 0)
    }

    fn updater(events: &EventLog, succeed: bool) -> ScriptedUpdater {
        ScriptedUpdater {
            events: Rc::clone(events),
            succeed,
        }
    }

    #[test]
    fn clear_provider_table_restarts_without_update() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        let decision = dispatch(
            &MaintenanceOperation::ClearProviderTable,
            false,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("dispatch should succeed");

        assert_eq!(
            *events.borrow(),
            vec!["admin-up", "clear-provider-table", "admin-down"]
        );
        assert!(decision.restart);
        assert!(!decision.with_update);
    }

    #[test]
    fn bind_failure_is_fatal_and_skips_the_operation() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::failing(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        let error = dispatch(
            &MaintenanceOperation::FixSlashes,
            false,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect_err("bind failure should be fatal");

        assert!(matches!(error, LaunchError::AdminServer { .. }));
        assert!(events.borrow().is_empty());
    }

    #[test]
    fn operation_failure_still_tears_down_and_restarts() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));
        store.ops_succeed = false;

        let decision = dispatch(
            &MaintenanceOperation::ImportJson(Utf8Path::new("/tmp/in.json").to_path_buf()),
            false,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("a failed store operation is not fatal");

        assert_eq!(
            *events.borrow(),
            vec!["admin-up", "import-json", "admin-down"]
        );
        assert!(decision.restart);
    }

    #[test]
    fn update_success_requests_restart_with_update() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        let decision = dispatch(
            &MaintenanceOperation::Update,
            false,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("dispatch should succeed");

        assert!(decision.restart);
        assert!(decision.with_update);
    }

    #[test]
    fn update_failure_is_fatal_but_admin_still_comes_down() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        let error = dispatch(
            &MaintenanceOperation::Update,
            false,
            &endpoint(),
            &admin,
            &updater(&events, false),
            &mut store,
        )
        .expect_err("update failure should be fatal");

        assert!(matches!(error, LaunchError::Update { .. }));
        assert_eq!(*events.borrow(), vec!["admin-up", "update", "admin-down"]);
    }

    #[test]
    fn status_does_not_restart() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        let decision = dispatch(
            &MaintenanceOperation::Status,
            false,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("dispatch should succeed");

        assert!(!decision.restart);
        assert!(!decision.with_update);
    }

    #[test]
    fn pending_schema_upgrade_runs_before_the_explicit_operation() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        dispatch(
            &MaintenanceOperation::FixSlashes,
            true,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("dispatch should succeed");

        assert_eq!(
            *events.borrow(),
            vec!["admin-up", "upgrade", "fix-slashes", "admin-down"]
        );
    }

    #[test]
    fn failed_upgrade_forces_restart_even_for_status() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));
        store.upgrade_succeeds = false;

        let decision = dispatch(
            &MaintenanceOperation::Status,
            true,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("dispatch should succeed");

        assert!(decision.restart, "failed upgrade must retry on next boot");
    }

    #[test]
    fn implicit_schema_upgrade_runs_alone() {
        let events: EventLog = EventLog::default();
        let admin = RecordingAdmin::new(Rc::clone(&events));
        let mut store = ScriptedStore::new(Rc::clone(&events));

        let decision = dispatch(
            &MaintenanceOperation::SchemaUpgrade,
            true,
            &endpoint(),
            &admin,
            &updater(&events, true),
            &mut store,
        )
        .expect("dispatch should succeed");

        assert_eq!(*events.borrow(), vec!["admin-up", "upgrade", "admin-down"]);
        assert!(decision.restart);
        assert!(!decision.with_update);
    }
}
