//! Server lifecycle: start, stop, restart.

use std::time::Duration;

use grench_core::{Config, PortResolver};
use grench_session::{Console, EngineError, SessionEngine};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

use crate::{
    command::CommandBuildError,
    launcher::{Launcher, LeinLauncher},
};

/// Marker preceding the port number in the server's startup banner.
const BANNER: &str = "server started on port ";
/// Code that makes the server process exit.
const EXIT_CODE: &str = "(System/exit 0)";

const SHUTDOWN_POLL_INTERVAL: Duration = Duration::from_millis(100);
const SHUTDOWN_POLLS: u32 = 100;

/// Lifecycle error.
#[derive(Debug, thiserror::Error)]
pub enum LifecycleError {
    #[error("Server did not report a port: {0}")]
    Startup(String),
    #[error("No nREPL session running")]
    NoServer,
    #[error("Failed to spawn server: {0}")]
    Spawn(#[source] std::io::Error),
    #[error(transparent)]
    Command(#[from] CommandBuildError),
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("Server on port {0} is still accepting connections")]
    ShutdownTimeout(u16),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result of `ServerManager::start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StartOutcome {
    pub port: u16,
    /// A server was found and nothing was launched.
    pub already_running: bool,
}

/// Starts, stops and restarts the evaluation server.
///
/// Concurrent `start` calls from separate processes can each see no server
/// and both launch one; that race is confined to `start`.
pub struct ServerManager<L = LeinLauncher> {
    config: Config,
    resolver: PortResolver,
    launcher: L,
}

impl ServerManager<LeinLauncher> {
    /// Create a manager launching Leiningen servers.
    #[must_use]
    pub fn new(config: Config) -> Self {
        let launcher = LeinLauncher::new(&config);
        Self::with_launcher(config, launcher)
    }
}

impl<L: Launcher> ServerManager<L> {
    /// Create a manager with a custom launcher.
    #[must_use]
    pub fn with_launcher(config: Config, launcher: L) -> Self {
        let resolver = PortResolver::new(&config);
        Self {
            config,
            resolver,
            launcher,
        }
    }

    /// Port of the running server, if any.
    #[must_use]
    pub fn resolve(&self) -> Option<u16> {
        self.resolver.resolve()
    }

    /// Ensure a server is running and return its port.
    ///
    /// # Errors
    /// Returns `LifecycleError::Startup` if the launched server's output ends
    /// before it reports a port.
    pub async fn start(&self, port: Option<u16>) -> Result<StartOutcome, LifecycleError> {
        if let Some(port) = self.resolver.resolve() {
            tracing::info!(port, "nREPL server already running");
            return Ok(StartOutcome {
                port,
                already_running: true,
            });
        }

        self.launch(port).await
    }

    /// Launch a server unconditionally and wait for its banner.
    async fn launch(&self, port: Option<u16>) -> Result<StartOutcome, LifecycleError> {
        let mut server = self.launcher.launch(port).await?;
        let port = wait_for_port(&mut server.output).await?;
        if let Some(child) = &server.child {
            tracing::info!(port, pid = ?child.id(), "nREPL server started");
        }
        Ok(StartOutcome {
            port,
            already_running: false,
        })
    }

    /// Ask the server to exit. Returns the port it was on.
    ///
    /// # Errors
    /// Returns `LifecycleError::NoServer` if no port is given or resolvable.
    pub async fn stop(&self, port: Option<u16>) -> Result<u16, LifecycleError> {
        let port = port
            .or_else(|| self.resolver.resolve())
            .ok_or(LifecycleError::NoServer)?;

        let mut engine = SessionEngine::connect(&self.config.host, port, Console::stdio()).await?;
        match engine.evaluate(EXIT_CODE, "main", &[]).await {
            // The server may drop the connection mid-reply as it exits.
            Ok(_) | Err(EngineError::Channel(_)) => {
                tracing::info!(port, "nREPL server stopped");
                Ok(port)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Stop the running server, if any, then start a fresh one.
    ///
    /// The new server is always launched; a port override or a stale marker
    /// naming the old server does not count as "already running".
    ///
    /// # Errors
    /// Propagates stop and start failures, and `ShutdownTimeout` if the old
    /// server keeps accepting connections.
    pub async fn restart(&self, port: Option<u16>) -> Result<StartOutcome, LifecycleError> {
        match self.stop(port).await {
            Ok(old) => self.wait_until_down(old).await?,
            Err(LifecycleError::NoServer) => {
                tracing::info!("No server to stop, starting a new one");
            }
            Err(e) => return Err(e),
        }
        self.launch(port).await
    }

    async fn wait_until_down(&self, port: u16) -> Result<(), LifecycleError> {
        let addr = format!("{}:{port}", self.config.host);
        for _ in 0..SHUTDOWN_POLLS {
            if tokio::net::TcpStream::connect(&addr).await.is_err() {
                return Ok(());
            }
            tokio::time::sleep(SHUTDOWN_POLL_INTERVAL).await;
        }
        Err(LifecycleError::ShutdownTimeout(port))
    }
}

/// Read server output line by line until the startup banner names a port.
///
/// # Errors
/// Returns `LifecycleError::Startup` if the output ends first.
pub async fn wait_for_port<R>(reader: R) -> Result<u16, LifecycleError>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines.next_line().await? {
        tracing::debug!(%line, "Server output");
        if let Some(port) = parse_banner(&line) {
            return Ok(port);
        }
    }
    Err(LifecycleError::Startup(
        "output ended before the startup banner".into(),
    ))
}

/// Extract the port from a line like `nREPL server started on port 41235 ...`.
#[must_use]
pub fn parse_banner(line: &str) -> Option<u16> {
    let start = line.find(BANNER)? + BANNER.len();
    let digits: String = line[start..]
        .chars()
        .take_while(char::is_ascii_digit)
        .collect();
    digits.parse().ok()
}
