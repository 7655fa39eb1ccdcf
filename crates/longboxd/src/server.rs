//! HTTP endpoints owned by the supervisor.
//!
//! Two listeners share the machinery here: the temporary administrative
//! endpoint that exists only while a maintenance operation runs, and the
//! service endpoint brought up for normal operation. Both serve a one-page
//! status body; the real UI behind the service endpoint is a separate
//! subsystem and out of scope for the supervisor. What matters at this
//! boundary is bind-failure fatality, clean teardown, and the shutdown
//! notice the lifecycle loop publishes for connected operators.

use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use thiserror::Error;
use tracing::{info, warn};

use longbox_config::BindEndpoint;

use crate::process::UiNotifier;

#[cfg(unix)]
use std::os::unix::net::{UnixListener, UnixStream};

const SERVER_TARGET: &str = concat!(env!("CARGO_PKG_NAME"), "::server");

const ACCEPT_BACKOFF: Duration = Duration::from_millis(25);
const ERROR_BACKOFF: Duration = Duration::from_millis(150);
const REQUEST_READ_TIMEOUT: Duration = Duration::from_millis(500);

/// Shared status line rendered by whichever listener is up.
///
/// Single writer at a time in practice: the supervisor publishes operation
/// progress during maintenance and the shutdown notice during the lifecycle
/// loop's final transition.
#[derive(Debug)]
pub struct StatusBoard {
    message: Mutex<String>,
}

impl StatusBoard {
    /// Creates a board with an initial message.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            message: Mutex::new(message.into()),
        })
    }

    /// Replaces the published message.
    pub fn publish(&self, message: impl Into<String>) {
        if let Ok(mut slot) = self.message.lock() {
            *slot = message.into();
        }
    }

    /// Current message snapshot.
    #[must_use]
    pub fn snapshot(&self) -> String {
        self.message
            .lock()
            .map(|slot| slot.clone())
            .unwrap_or_default()
    }
}

impl UiNotifier for Arc<StatusBoard> {
    fn shutdown_pending(&self) {
        self.publish("Now shutting down the service.");
    }
}

/// Errors surfaced by the HTTP endpoints.
#[derive(Debug, Error)]
pub enum ServeError {
    /// The configured host did not resolve.
    #[error("failed to resolve '{host}:{port}': {source}")]
    Resolve {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },
    /// Resolution succeeded but produced no usable address.
    #[error("no usable address for '{host}:{port}'")]
    ResolveEmpty { host: String, port: u16 },
    /// Binding the TCP address failed.
    #[error("failed to bind {addr}: {source}")]
    BindTcp {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    /// Binding the Unix socket failed.
    #[error("failed to bind unix socket '{path}': {source}")]
    BindUnix {
        path: String,
        #[source]
        source: io::Error,
    },
    /// Switching the listener to non-blocking mode failed.
    #[error("failed to configure listener: {source}")]
    NonBlocking {
        #[source]
        source: io::Error,
    },
    /// The listener thread panicked.
    #[error("listener thread panicked")]
    ThreadPanic,
}

/// Listener bound to a configured endpoint.
#[derive(Debug)]
pub struct HttpListener {
    endpoint: BindEndpoint,
    listener: ListenerKind,
}

#[derive(Debug)]
enum ListenerKind {
    Tcp(TcpListener),
    #[cfg(unix)]
    Unix(UnixListener),
}

impl HttpListener {
    /// Binds to the endpoint; failure here is fatal to the caller.
    pub fn bind(endpoint: &BindEndpoint) -> Result<Self, ServeError> {
        let listener = match endpoint {
            BindEndpoint::Tcp { host, port } => ListenerKind::Tcp(bind_tcp(host, *port)?),
            BindEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    let _ = endpoint.prepare_filesystem();
                    // A previous unclean shutdown may have left the socket
                    // file behind.
                    let _ = std::fs::remove_file(path.as_std_path());
                    ListenerKind::Unix(UnixListener::bind(path.as_std_path()).map_err(
                        |source| ServeError::BindUnix {
                            path: path.to_string(),
                            source,
                        },
                    )?)
                }
                #[cfg(not(unix))]
                {
                    return Err(ServeError::BindUnix {
                        path: path.to_string(),
                        source: io::Error::new(
                            io::ErrorKind::Unsupported,
                            "unix sockets are not available on this platform",
                        ),
                    });
                }
            }
        };
        Ok(Self {
            endpoint: endpoint.clone(),
            listener,
        })
    }

    /// Local address, available for TCP listeners bound to an ephemeral port.
    #[must_use]
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.local_addr().ok(),
            #[cfg(unix)]
            ListenerKind::Unix(_) => None,
        }
    }

    /// Starts the accept loop on a background thread.
    pub fn start(
        self,
        title: &'static str,
        board: Arc<StatusBoard>,
    ) -> Result<ListenerHandle, ServeError> {
        match &self.listener {
            ListenerKind::Tcp(listener) => listener.set_nonblocking(true),
            #[cfg(unix)]
            ListenerKind::Unix(listener) => listener.set_nonblocking(true),
        }
        .map_err(|source| ServeError::NonBlocking { source })?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_flag = Arc::clone(&shutdown);
        let handle = thread::spawn(move || run_accept_loop(&self, &shutdown_flag, title, &board));
        Ok(ListenerHandle {
            shutdown,
            handle: Some(handle),
        })
    }
}

/// Handle to the background listener thread.
#[derive(Debug)]
pub struct ListenerHandle {
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl ListenerHandle {
    /// Requests the accept loop to stop.
    pub fn shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }

    /// Waits for the accept loop to exit.
    pub fn join(mut self) -> Result<(), ServeError> {
        if let Some(handle) = self.handle.take() {
            handle.join().map_err(|_| ServeError::ThreadPanic)?;
        }
        Ok(())
    }
}

impl Drop for ListenerHandle {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}

fn run_accept_loop(
    listener: &HttpListener,
    shutdown: &Arc<AtomicBool>,
    title: &'static str,
    board: &Arc<StatusBoard>,
) {
    info!(
        target: SERVER_TARGET,
        endpoint = %listener.endpoint,
        title,
        "http listener active"
    );
    let mut last_error = None::<io::ErrorKind>;
    while !shutdown.load(Ordering::SeqCst) {
        match accept_connection(listener) {
            Ok(Some(stream)) => {
                last_error = None;
                let body = render_page(title, &board.snapshot());
                if let Err(error) = respond(stream, &body) {
                    warn!(
                        target: SERVER_TARGET,
                        error = %error,
                        "failed to answer http request"
                    );
                }
            }
            Ok(None) => {
                thread::sleep(ACCEPT_BACKOFF);
            }
            Err(error) => {
                let kind = error.kind();
                if last_error != Some(kind) {
                    warn!(
                        target: SERVER_TARGET,
                        error = %error,
                        "http accept error"
                    );
                }
                last_error = Some(kind);
                thread::sleep(ERROR_BACKOFF);
            }
        }
    }
    #[cfg(unix)]
    if let BindEndpoint::Unix { path } = &listener.endpoint {
        let _ = std::fs::remove_file(path.as_std_path());
    }
    info!(
        target: SERVER_TARGET,
        endpoint = %listener.endpoint,
        "http listener stopped"
    );
}

enum ConnectionStream {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(UnixStream),
}

fn accept_connection(listener: &HttpListener) -> Result<Option<ConnectionStream>, io::Error> {
    match &listener.listener {
        ListenerKind::Tcp(tcp) => match tcp.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::Tcp(stream)))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        },
        #[cfg(unix)]
        ListenerKind::Unix(unix) => match unix.accept() {
            Ok((stream, _)) => {
                stream.set_nonblocking(false)?;
                Ok(Some(ConnectionStream::Unix(stream)))
            }
            Err(error) if error.kind() == io::ErrorKind::WouldBlock => Ok(None),
            Err(error) => Err(error),
        },
    }
}

fn respond(stream: ConnectionStream, body: &str) -> io::Result<()> {
    match stream {
        ConnectionStream::Tcp(stream) => respond_on(stream, body),
        #[cfg(unix)]
        ConnectionStream::Unix(stream) => respond_on(stream, body),
    }
}

fn respond_on<S>(mut stream: S, body: &str) -> io::Result<()>
where
    S: Read + Write + SetReadTimeout,
{
    // Drain whatever request line arrives; the page is the same for every
    // path, so parsing beyond this is wasted effort.
    stream.set_read_timeout(Some(REQUEST_READ_TIMEOUT))?;
    let mut scratch = [0_u8; 1024];
    let _ = stream.read(&mut scratch);

    let response = format!(
        "HTTP/1.1 200 OK\r\n\
         Content-Type: text/html; charset=utf-8\r\n\
         Content-Length: {}\r\n\
         Connection: close\r\n\
         \r\n\
         {body}",
        body.len()
    );
    stream.write_all(response.as_bytes())
}

trait SetReadTimeout {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;
}

impl SetReadTimeout for TcpStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        TcpStream::set_read_timeout(self, timeout)
    }
}

#[cfg(unix)]
impl SetReadTimeout for UnixStream {
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        UnixStream::set_read_timeout(self, timeout)
    }
}

fn render_page(title: &str, message: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{message}</p></body></html>\n"
    )
}

fn bind_tcp(host: &str, port: u16) -> Result<TcpListener, ServeError> {
    let mut addrs = (host, port)
        .to_socket_addrs()
        .map_err(|source| ServeError::Resolve {
            host: host.to_owned(),
            port,
            source,
        })?;
    let addr = addrs
        .find(|addr| matches!(addr, SocketAddr::V4(_) | SocketAddr::V6(_)))
        .ok_or_else(|| ServeError::ResolveEmpty {
            host: host.to_owned(),
            port,
        })?;
    TcpListener::bind(addr).map_err(|source| ServeError::BindTcp { addr, source })
}

/// Seam through which the maintenance dispatcher controls the temporary
/// administrative endpoint.
pub trait AdminUi {
    /// Handle to the running endpoint.
    type Handle;

    /// Brings the endpoint up; failure is fatal to the dispatcher.
    fn bring_up(&self, endpoint: &BindEndpoint) -> Result<Self::Handle, ServeError>;

    /// Publishes an operator-visible progress line.
    fn publish(&self, message: &str);

    /// Tears the endpoint down; invoked whether the operation succeeded or
    /// failed.
    fn tear_down(&self, handle: Self::Handle);
}

/// Production admin endpoint serving the maintenance status page.
#[derive(Debug)]
pub struct HttpAdminConsole {
    board: Arc<StatusBoard>,
}

impl HttpAdminConsole {
    /// Builds a console publishing onto the given board.
    #[must_use]
    pub fn new(board: Arc<StatusBoard>) -> Self {
        Self { board }
    }
}

impl AdminUi for HttpAdminConsole {
    type Handle = ListenerHandle;

    fn bring_up(&self, endpoint: &BindEndpoint) -> Result<Self::Handle, ServeError> {
        let listener = HttpListener::bind(endpoint)?;
        listener.start("longbox maintenance", Arc::clone(&self.board))
    }

    fn publish(&self, message: &str) {
        self.board.publish(message);
    }

    fn tear_down(&self, handle: Self::Handle) {
        handle.shutdown();
        if let Err(error) = handle.join() {
            warn!(
                target: SERVER_TARGET,
                error = %error,
                "admin listener did not stop cleanly"
            );
        }
    }
}

/// Settings the service endpoint needs from the startup record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceSettings {
    /// Redirect the startup page to the management screen.
    pub safe_start: bool,
    /// Skip the weekly pull-list check during bring-up.
    pub skip_weekly_check: bool,
    /// URL root the UI is served under.
    pub http_root: String,
}

/// Seam through which the supervisor brings the service endpoint up.
pub trait ServiceHost {
    /// Handle to the running service.
    type Handle;

    /// Binds and starts the service; bind failure is fatal.
    fn bring_up(
        &self,
        endpoint: &BindEndpoint,
        settings: &ServiceSettings,
    ) -> Result<Self::Handle, ServeError>;

    /// Stops the service during shutdown.
    fn tear_down(&self, handle: Self::Handle);
}

/// Production service host serving the status page.
#[derive(Debug)]
pub struct HttpServiceHost {
    board: Arc<StatusBoard>,
}

impl HttpServiceHost {
    /// Builds a host publishing onto the given board.
    #[must_use]
    pub fn new(board: Arc<StatusBoard>) -> Self {
        Self { board }
    }
}

impl ServiceHost for HttpServiceHost {
    type Handle = ListenerHandle;

    fn bring_up(
        &self,
        endpoint: &BindEndpoint,
        settings: &ServiceSettings,
    ) -> Result<Self::Handle, ServeError> {
        if settings.skip_weekly_check {
            info!(
                target: SERVER_TARGET,
                "weekly pull-list check skipped for this start"
            );
        }
        if settings.safe_start {
            self.board
                .publish("Safe start: redirected to the management screen.");
        }
        let listener = HttpListener::bind(endpoint)?;
        listener.start("longbox", Arc::clone(&self.board))
    }

    fn tear_down(&self, handle: Self::Handle) {
        handle.shutdown();
        if let Err(error) = handle.join() {
            warn!(
                target: SERVER_TARGET,
                error = %error,
                "service listener did not stop cleanly"
            );
        }
    }
}
