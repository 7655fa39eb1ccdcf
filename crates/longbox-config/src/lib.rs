//! Shared configuration layer for the longbox service.
//!
//! The supervisor and its collaborators agree on one persisted configuration
//! document: a TOML file living in the data directory (`config.toml` by
//! default). This crate owns that document's shape, its defaults, the bind
//! endpoint type derived from it, and the data-directory validation the
//! supervisor performs before bringing the service up.
//!
//! Command-line flags never mutate the persisted document. Overrides such as
//! a forced HTTP port are resolved by the supervisor at bring-up time and
//! recorded only in its in-memory startup state.

mod datadir;
mod defaults;
mod endpoint;
mod logging;

use std::fs;
use std::io;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use datadir::{DataDirError, validate_data_directory};
pub use defaults::{DEFAULT_HTTP_HOST, DEFAULT_HTTP_PORT, DEFAULT_LOG_FILTER, default_data_dir};
pub use endpoint::{BindEndpoint, EndpointParseError, EndpointPrepareError};
pub use logging::{LogFormat, LogFormatParseError};

/// File name of the persisted configuration document inside the data
/// directory.
pub const CONFIG_FILE_NAME: &str = "config.toml";

/// File name of the service database inside the data directory.
pub const DB_FILE_NAME: &str = "longbox.db";

/// Persisted service configuration.
///
/// Every field carries a serde default so a partial document (or no document
/// at all) resolves to a usable configuration. Unknown keys are rejected so
/// typos surface at load time instead of silently disabling behaviour.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct ServiceConfig {
    /// Interface the HTTP UI binds to.
    http_host: String,
    /// Port the HTTP UI binds to.
    http_port: u16,
    /// URL root the UI is served under (reverse-proxy deployments).
    http_root: String,
    /// Log filter expression applied when the CLI requests normal verbosity.
    log_filter: String,
    /// Output format for the structured log stream.
    log_format: LogFormat,
    /// Back up the configuration and database on every start.
    backup_on_start: bool,
    /// One-shot override: force a provider-table clear on the next start.
    clear_provider_table: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            http_host: DEFAULT_HTTP_HOST.to_owned(),
            http_port: DEFAULT_HTTP_PORT,
            http_root: "/".to_owned(),
            log_filter: DEFAULT_LOG_FILTER.to_owned(),
            log_format: LogFormat::default(),
            backup_on_start: false,
            clear_provider_table: false,
        }
    }
}

impl ServiceConfig {
    /// Loads the configuration from `path`.
    ///
    /// A missing file resolves to the defaults: first boot must succeed
    /// before any document has been written. Any other read failure, and any
    /// parse failure, is surfaced so the supervisor can abort startup.
    pub fn load(path: &Utf8Path) -> Result<Self, ConfigError> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(source) if source.kind() == io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source: Box::new(source),
        })
    }

    /// Host the HTTP UI binds to.
    #[must_use]
    pub fn http_host(&self) -> &str {
        &self.http_host
    }

    /// Port the HTTP UI binds to.
    #[must_use]
    pub fn http_port(&self) -> u16 {
        self.http_port
    }

    /// URL root the UI is served under.
    #[must_use]
    pub fn http_root(&self) -> &str {
        &self.http_root
    }

    /// Log filter expression for normal verbosity.
    #[must_use]
    pub fn log_filter(&self) -> &str {
        &self.log_filter
    }

    /// Output format for the structured log stream.
    #[must_use]
    pub fn log_format(&self) -> LogFormat {
        self.log_format
    }

    /// Whether every start should back up the configuration and database.
    #[must_use]
    pub fn backup_on_start(&self) -> bool {
        self.backup_on_start
    }

    /// Whether the persisted override forcing a provider-table clear is set.
    #[must_use]
    pub fn clear_provider_table(&self) -> bool {
        self.clear_provider_table
    }

    /// Endpoint the service (and the temporary maintenance UI) binds to,
    /// honouring an optional forced port.
    #[must_use]
    pub fn bind_endpoint(&self, forced_port: Option<u16>) -> BindEndpoint {
        let port = forced_port.filter(|port| *port > 0).unwrap_or(self.http_port);
        BindEndpoint::tcp(self.http_host.clone(), port)
    }
}

/// Errors raised while loading the persisted configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document exists but could not be read.
    #[error("failed to read configuration '{path}': {source}")]
    Read {
        path: Utf8PathBuf,
        #[source]
        source: io::Error,
    },
    /// The document exists but is not valid TOML for this schema.
    #[error("failed to parse configuration '{path}': {source}")]
    Parse {
        path: Utf8PathBuf,
        #[source]
        source: Box<toml::de::Error>,
    },
}
