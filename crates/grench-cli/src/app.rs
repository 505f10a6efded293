//! Command implementations.

use anyhow::{Context, Result, anyhow, bail};
use grench_core::{Config, find_project_root};
use grench_server::{LifecycleError, ServerManager};
use grench_session::{Console, SessionEngine};
use grench_transport::TcpChannel;
use tokio::sync::mpsc;

use crate::{
    forms::{exit_code, lein_form, run_form},
    repl::Repl,
};

/// Id of the single top-level evaluation a one-shot command makes.
const MAIN_ID: &str = "main";

/// Everything a command needs: configuration and the server manager.
pub struct App {
    config: Config,
    manager: ServerManager,
}

impl App {
    #[must_use]
    pub fn new(config: Config) -> Self {
        let manager = ServerManager::new(config.clone());
        Self { config, manager }
    }

    /// Open a session to the server at `port`, or the resolved one.
    async fn connect(&self, port: Option<u16>) -> Result<SessionEngine<TcpChannel>> {
        let port = port
            .or_else(|| self.manager.resolve())
            .ok_or_else(|| anyhow!("{}; start one with `grench start`", LifecycleError::NoServer))?;

        let engine = SessionEngine::connect(&self.config.host, port, Console::stdio())
            .await
            .with_context(|| format!("Could not reach nREPL server on port {port}"))?;
        Ok(engine.with_interrupts(interrupt_signals()))
    }

    /// Evaluate `code` and print its value.
    pub async fn eval(&self, code: &str, ns: Option<&str>) -> Result<i32> {
        let mut engine = self.connect(None).await?;
        let extra: Vec<(&str, &str)> = ns.map(|ns| ("ns", ns)).into_iter().collect();

        if let Some(result) = engine.evaluate(code, MAIN_ID, &extra).await? {
            engine
                .console()
                .write_out(&format!("{}\n", result.value))
                .await?;
        }
        Ok(0)
    }

    /// Call a namespace's function with string arguments.
    pub async fn run(&self, target: &str, args: &[String]) -> Result<i32> {
        let mut engine = self.connect(None).await?;
        let result = engine.evaluate(&run_form(target, args), MAIN_ID, &[]).await?;
        Ok(exit_code(result.as_ref().map(|r| r.value.as_str())))
    }

    /// Run a Leiningen task inside the server.
    pub async fn lein(&self, args: &[String]) -> Result<i32> {
        let Some(root) = find_project_root(&self.config.working_dir, &self.config.project_file)
        else {
            bail!(
                "Not in a Leiningen project: no {} found in {} or its parents",
                self.config.project_file,
                self.config.working_dir.display()
            );
        };

        let mut engine = self.connect(None).await?;
        let session = engine.ensure_session().await?;
        let result = engine
            .evaluate(&lein_form(&root, &session, args), MAIN_ID, &[])
            .await?;
        Ok(exit_code(result.as_ref().map(|r| r.value.as_str())).rem_euclid(128))
    }

    /// Interactive prompt on stdin.
    pub async fn repl(&self, port: Option<u16>) -> Result<i32> {
        let engine = self.connect(port).await?;
        Repl::new(engine).run().await?;
        Ok(0)
    }

    pub async fn start(&self, port: Option<u16>) -> Result<i32> {
        let outcome = self.manager.start(port).await?;
        if outcome.already_running {
            println!("nREPL server already running on port {}", outcome.port);
        } else {
            println!("Started nREPL server on port {}", outcome.port);
        }
        Ok(0)
    }

    pub async fn kill(&self, port: Option<u16>) -> Result<i32> {
        let port = self.manager.stop(port).await?;
        println!("Stopped nREPL server on port {port}");
        Ok(0)
    }

    pub async fn restart(&self, port: Option<u16>) -> Result<i32> {
        let outcome = self.manager.restart(port).await?;
        println!("Started nREPL server on port {}", outcome.port);
        Ok(0)
    }
}

/// Forward Ctrl-C presses to the engine as interrupt requests.
fn interrupt_signals() -> mpsc::UnboundedReceiver<()> {
    let (tx, rx) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            tracing::debug!("Ctrl-C received");
            if tx.send(()).is_err() {
                break;
            }
        }
    });
    rx
}
