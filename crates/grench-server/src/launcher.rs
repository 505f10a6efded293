//! Spawning of the evaluation-server subprocess.

use std::{path::PathBuf, process::Stdio};

use async_trait::async_trait;
use command_group::{AsyncCommandGroup, AsyncGroupChild};
use grench_core::{Config, find_project_root};
use tokio::io::{AsyncBufRead, BufReader};

use crate::{command::CommandBuilder, manager::LifecycleError};

/// A freshly spawned server whose banner has not been read yet.
pub struct LaunchedServer {
    /// Process group handle; `None` for servers not backed by a local process.
    pub child: Option<AsyncGroupChild>,
    /// The server's standard output.
    pub output: Box<dyn AsyncBufRead + Send + Unpin>,
}

/// Trait for starting evaluation servers.
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Spawn a server, optionally pinned to `port`.
    async fn launch(&self, port: Option<u16>) -> Result<LaunchedServer, LifecycleError>;
}

/// Launches a headless Leiningen nREPL server.
///
/// The server runs in its own process group so a Ctrl-C in the terminal
/// reaches only the client.
#[derive(Debug, Clone)]
pub struct LeinLauncher {
    command: String,
    working_dir: PathBuf,
}

impl LeinLauncher {
    /// Launch from the project root, or the working directory outside a project.
    #[must_use]
    pub fn new(config: &Config) -> Self {
        let working_dir = find_project_root(&config.working_dir, &config.project_file)
            .unwrap_or_else(|| config.working_dir.clone());
        Self {
            command: config.server_command.clone(),
            working_dir,
        }
    }
}

#[async_trait]
impl Launcher for LeinLauncher {
    async fn launch(&self, port: Option<u16>) -> Result<LaunchedServer, LifecycleError> {
        let mut builder = CommandBuilder::new(self.command.as_str());
        if let Some(port) = port {
            builder = builder.port(port);
        }
        let (executable, args) = builder.build()?.into_resolved().await?;

        tracing::info!(
            executable = %executable.display(),
            ?args,
            dir = %self.working_dir.display(),
            "Starting nREPL server"
        );

        let mut child = tokio::process::Command::new(&executable)
            .args(&args)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .group_spawn()
            .map_err(LifecycleError::Spawn)?;

        let stdout = child
            .inner()
            .stdout
            .take()
            .ok_or_else(|| LifecycleError::Startup("server stdout was not captured".into()))?;

        Ok(LaunchedServer {
            child: Some(child),
            output: Box::new(BufReader::new(stdout)),
        })
    }
}
