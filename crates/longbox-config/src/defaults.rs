use camino::Utf8PathBuf;
use std::env;

/// Default interface the HTTP UI binds to.
pub const DEFAULT_HTTP_HOST: &str = "0.0.0.0";

/// Default port the HTTP UI binds to.
pub const DEFAULT_HTTP_PORT: u16 = 8090;

/// Default log filter expression used by the daemon.
pub const DEFAULT_LOG_FILTER: &str = "info";

/// Computes the default data directory when none is given on the command
/// line.
///
/// Prefers the platform data directory; falls back to the current working
/// directory for stripped-down containers that expose neither `XDG_DATA_HOME`
/// nor a home directory.
#[must_use]
pub fn default_data_dir() -> Utf8PathBuf {
    #[cfg(unix)]
    {
        if let Some(mut dir) = dirs::data_dir().and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        {
            dir.push("longbox");
            return dir;
        }
    }
    current_dir_fallback()
}

fn current_dir_fallback() -> Utf8PathBuf {
    env::current_dir()
        .ok()
        .and_then(|path| Utf8PathBuf::from_path_buf(path).ok())
        .unwrap_or_else(|| Utf8PathBuf::from("."))
}
