//! Lifecycle management for headless nREPL servers.
//!
//! Provides:
//! - `ServerManager` - Start, stop and restart the evaluation server
//! - `Launcher` trait with the default `LeinLauncher`
//! - Command building and executable lookup

pub mod command;
pub mod executable;
pub mod launcher;
pub mod manager;

pub use command::{CommandBuildError, CommandBuilder, CommandParts};
pub use executable::resolve_executable_path;
pub use launcher::{LaunchedServer, Launcher, LeinLauncher};
pub use manager::{LifecycleError, ServerManager, StartOutcome, parse_banner, wait_for_port};
