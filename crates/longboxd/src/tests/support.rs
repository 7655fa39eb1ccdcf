//! Recording doubles and the world harness shared by behavioural tests.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use clap::Parser;
use tempfile::TempDir;

use longbox_config::BindEndpoint;

use crate::cli::Cli;
use crate::process::launch::{LaunchPlan, ProcessControl, ServiceDeps, run_supervisor_with};
use crate::process::{DaemonizeError, Daemonizer, LaunchError, SignalCell, SupervisorOutcome, UiNotifier};
use crate::server::{AdminUi, ServeError, ServiceHost, ServiceSettings};
use crate::store::{
    EXPECTED_SCHEMA_VERSION, ImportSummary, MaintenanceStore, StoreError, StoreOpener, StoreStatus,
};
use crate::update::{UpdateError, Updater};

pub(crate) type EventLog = Rc<RefCell<Vec<String>>>;

fn record(events: &EventLog, event: impl Into<String>) {
    events.borrow_mut().push(event.into());
}

pub(crate) struct RecordingDaemonizer {
    events: EventLog,
}

impl Daemonizer for RecordingDaemonizer {
    fn daemonize(&self, _work_dir: &Utf8Path) -> Result<(), DaemonizeError> {
        record(&self.events, "daemonize");
        Ok(())
    }
}

pub(crate) struct RecordingAdmin {
    events: EventLog,
}

impl AdminUi for RecordingAdmin {
    type Handle = ();

    fn bring_up(&self, _endpoint: &BindEndpoint) -> Result<Self::Handle, ServeError> {
        record(&self.events, "admin-up");
        Ok(())
    }

    fn publish(&self, _message: &str) {}

    fn tear_down(&self, (): Self::Handle) {
        record(&self.events, "admin-down");
    }
}

type Probe = Box<dyn FnOnce()>;

pub(crate) struct RecordingService {
    events: EventLog,
    fail_bind: bool,
    on_bring_up: RefCell<Option<Probe>>,
}

impl ServiceHost for RecordingService {
    type Handle = ();

    fn bring_up(
        &self,
        _endpoint: &BindEndpoint,
        _settings: &ServiceSettings,
    ) -> Result<Self::Handle, ServeError> {
        if self.fail_bind {
            return Err(ServeError::ResolveEmpty {
                host: "nowhere".to_owned(),
                port: 0,
            });
        }
        record(&self.events, "service-up");
        if let Some(probe) = self.on_bring_up.borrow_mut().take() {
            probe();
        }
        Ok(())
    }

    fn tear_down(&self, (): Self::Handle) {
        record(&self.events, "service-down");
    }
}

pub(crate) struct RecordingUpdater {
    events: EventLog,
    succeed: bool,
}

impl Updater for RecordingUpdater {
    fn perform(&self) -> Result<(), UpdateError> {
        record(&self.events, "update");
        if self.succeed {
            Ok(())
        } else {
            Err(UpdateError::Failed {
                detail: "deliberate failure".to_owned(),
            })
        }
    }
}

pub(crate) struct MemoryStore {
    events: EventLog,
    version: i32,
}

impl MaintenanceStore for MemoryStore {
    fn schema_version(&self) -> Result<i32, StoreError> {
        Ok(self.version)
    }

    fn upgrade_schema(&mut self) -> Result<(), StoreError> {
        record(&self.events, "upgrade");
        self.version = EXPECTED_SCHEMA_VERSION;
        Ok(())
    }

    fn import_database(&mut self, _path: &Utf8Path) -> Result<ImportSummary, StoreError> {
        record(&self.events, "import-database");
        Ok(ImportSummary::default())
    }

    fn import_json(&mut self, _path: &Utf8Path) -> Result<ImportSummary, StoreError> {
        record(&self.events, "import-json");
        Ok(ImportSummary::default())
    }

    fn export_json(&self, _path: &Utf8Path) -> Result<usize, StoreError> {
        record(&self.events, "export-json");
        Ok(0)
    }

    fn fix_slashes(&mut self) -> Result<usize, StoreError> {
        record(&self.events, "fix-slashes");
        Ok(0)
    }

    fn clear_provider_table(&mut self) -> Result<usize, StoreError> {
        record(&self.events, "clear-provider-table");
        Ok(0)
    }

    fn status(&self) -> Result<StoreStatus, StoreError> {
        record(&self.events, "status");
        Ok(StoreStatus {
            schema_version: self.version,
            total_comics: 0,
            wanted_comics: 0,
            provider_rows: 0,
        })
    }
}

pub(crate) struct MemoryOpener {
    events: EventLog,
    version: i32,
}

impl StoreOpener for MemoryOpener {
    type Store = MemoryStore;

    fn open(&self, _path: &Utf8Path) -> Result<Self::Store, StoreError> {
        record(&self.events, "store-open");
        Ok(MemoryStore {
            events: Rc::clone(&self.events),
            version: self.version,
        })
    }
}

pub(crate) struct RecordingNotifier {
    events: EventLog,
}

impl UiNotifier for RecordingNotifier {
    fn shutdown_pending(&self) {
        record(&self.events, "notify-shutdown");
    }
}

/// World harness wiring the supervisor to recording doubles inside a
/// temporary data directory.
pub(crate) struct SupervisorWorld {
    _temp_dir: TempDir,
    pub(crate) base: Utf8PathBuf,
    pub(crate) events: EventLog,
    pub(crate) signals: SignalCell,
    pub(crate) schema_version: i32,
    pub(crate) fail_service_bind: bool,
    pub(crate) updater_succeeds: bool,
}

impl SupervisorWorld {
    pub(crate) fn new() -> Self {
        let temp_dir = TempDir::new().expect("tempdir should create");
        let base = Utf8PathBuf::from_path_buf(temp_dir.path().to_path_buf())
            .expect("tempdir path should be utf-8");
        Self {
            _temp_dir: temp_dir,
            base,
            events: EventLog::default(),
            signals: SignalCell::new(),
            schema_version: EXPECTED_SCHEMA_VERSION,
            fail_service_bind: false,
            updater_succeeds: true,
        }
    }

    pub(crate) fn pidfile_path(&self) -> Utf8PathBuf {
        self.base.join("longboxd.pid")
    }

    pub(crate) fn run(&self, extra_args: &[&str]) -> Result<SupervisorOutcome, LaunchError> {
        self.run_with_probe(extra_args, None)
    }

    pub(crate) fn run_with_probe(
        &self,
        extra_args: &[&str],
        probe: Option<Probe>,
    ) -> Result<SupervisorOutcome, LaunchError> {
        let mut args = vec!["longboxd", "--datadir", self.base.as_str()];
        args.extend_from_slice(extra_args);
        let cli = Cli::try_parse_from(args).expect("arguments should parse");

        let plan = LaunchPlan {
            process: ProcessControl {
                daemonizer: RecordingDaemonizer {
                    events: Rc::clone(&self.events),
                },
                signals: self.signals.clone(),
                poll: Duration::from_millis(1),
                grace: Duration::from_millis(0),
            },
            services: ServiceDeps {
                admin: RecordingAdmin {
                    events: Rc::clone(&self.events),
                },
                service: RecordingService {
                    events: Rc::clone(&self.events),
                    fail_bind: self.fail_service_bind,
                    on_bring_up: RefCell::new(probe),
                },
                updater: RecordingUpdater {
                    events: Rc::clone(&self.events),
                    succeed: self.updater_succeeds,
                },
                opener: MemoryOpener {
                    events: Rc::clone(&self.events),
                    version: self.schema_version,
                },
                notifier: RecordingNotifier {
                    events: Rc::clone(&self.events),
                },
            },
        };
        run_supervisor_with(&cli, plan)
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.borrow().clone()
    }
}
