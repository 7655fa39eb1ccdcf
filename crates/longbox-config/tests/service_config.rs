//! Integration tests for persisted configuration loading.

use camino::Utf8PathBuf;
use rstest::rstest;
use tempfile::TempDir;

use longbox_config::{BindEndpoint, DEFAULT_HTTP_PORT, LogFormat, ServiceConfig};

struct Harness {
    _temp_dir: TempDir,
    config_path: Utf8PathBuf,
}

impl Harness {
    fn new() -> Self {
        let temp_dir = TempDir::new().expect("failed to create temporary directory");
        let config_path = Utf8PathBuf::from_path_buf(temp_dir.path().join("config.toml"))
            .expect("tempdir path should be utf-8");
        Self {
            _temp_dir: temp_dir,
            config_path,
        }
    }

    fn write(&self, document: &str) {
        std::fs::write(self.config_path.as_std_path(), document)
            .expect("failed to write configuration");
    }
}

#[rstest]
fn missing_file_resolves_to_defaults() {
    let harness = Harness::new();
    let config = ServiceConfig::load(&harness.config_path).expect("load should succeed");
    assert_eq!(config, ServiceConfig::default());
}

#[rstest]
fn partial_document_fills_defaults() {
    let harness = Harness::new();
    harness.write("http_port = 9191\nbackup_on_start = true\n");
    let config = ServiceConfig::load(&harness.config_path).expect("load should succeed");
    assert_eq!(config.http_port(), 9191);
    assert!(config.backup_on_start());
    assert_eq!(config.log_format(), LogFormat::default());
}

#[rstest]
fn malformed_document_is_fatal() {
    let harness = Harness::new();
    harness.write("http_port = \"not a port\"\n");
    ServiceConfig::load(&harness.config_path).expect_err("malformed document should fail");
}

#[rstest]
fn unknown_keys_are_rejected() {
    let harness = Harness::new();
    harness.write("http_prot = 9191\n");
    ServiceConfig::load(&harness.config_path).expect_err("typoed key should fail");
}

#[rstest]
fn persisted_override_round_trips() {
    let harness = Harness::new();
    harness.write("clear_provider_table = true\nlog_format = \"json\"\n");
    let config = ServiceConfig::load(&harness.config_path).expect("load should succeed");
    assert!(config.clear_provider_table());
    assert_eq!(config.log_format(), LogFormat::Json);
}

#[rstest]
#[case(None, DEFAULT_HTTP_PORT)]
#[case(Some(0), DEFAULT_HTTP_PORT)]
#[case(Some(8765), 8765)]
fn bind_endpoint_honours_forced_port(#[case] forced: Option<u16>, #[case] expected: u16) {
    let config = ServiceConfig::default();
    match config.bind_endpoint(forced) {
        BindEndpoint::Tcp { port, .. } => assert_eq!(port, expected),
        BindEndpoint::Unix { .. } => panic!("default endpoint should be tcp"),
    }
}
