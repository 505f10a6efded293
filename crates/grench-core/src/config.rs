//! Runtime configuration.

use std::path::PathBuf;

/// Environment variable overriding port discovery.
pub const PORT_ENV: &str = "GRENCH_PORT";
/// Environment variable naming the host to connect to.
pub const HOST_ENV: &str = "GRENCH_HOST";
/// Environment variable overriding the server command line.
pub const SERVER_CMD_ENV: &str = "GRENCH_SERVER_CMD";
/// Environment variable enabling the wire trace.
pub const DEBUG_ENV: &str = "GRENCH_DEBUG";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_SERVER_CMD: &str = "lein trampoline repl :headless";

/// Configuration shared by every command.
///
/// Built from the environment in the binary; tests build it directly.
#[derive(Debug, Clone)]
pub struct Config {
    /// Host the evaluation server listens on.
    pub host: String,
    /// Raw value of the port override, validated by the resolver.
    pub port_override: Option<String>,
    /// Directory the upward project search starts from.
    pub working_dir: PathBuf,
    /// User home, for the global marker file.
    pub home_dir: Option<PathBuf>,
    /// File marking a project root.
    pub project_file: String,
    /// Per-project port marker, beside the project file.
    pub port_file: String,
    /// Global port marker, relative to the home directory.
    pub global_port_file: PathBuf,
    /// Command line that launches a headless server.
    pub server_command: String,
    /// Trace every message sent and received.
    pub trace_messages: bool,
}

impl Config {
    /// Defaults rooted at `working_dir`, ignoring the environment.
    #[must_use]
    pub fn new(working_dir: PathBuf) -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port_override: None,
            working_dir,
            home_dir: dirs::home_dir(),
            project_file: "project.clj".to_string(),
            port_file: ".nrepl-port".to_string(),
            global_port_file: PathBuf::from(".lein").join("repl-port"),
            server_command: DEFAULT_SERVER_CMD.to_string(),
            trace_messages: false,
        }
    }

    /// Load from the process environment.
    #[must_use]
    pub fn from_env() -> Self {
        let working_dir = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("."));
        let mut config = Self::new(working_dir);

        config.port_override = non_empty_var(PORT_ENV);
        if let Some(host) = non_empty_var(HOST_ENV) {
            config.host = host;
        }
        if let Some(cmd) = non_empty_var(SERVER_CMD_ENV) {
            config.server_command = cmd;
        }
        config.trace_messages = non_empty_var(DEBUG_ENV).is_some_and(|v| is_truthy(&v));

        tracing::debug!(?config, "Loaded configuration");
        config
    }

    /// Absolute path of the global marker file.
    #[must_use]
    pub fn global_port_path(&self) -> Option<PathBuf> {
        self.home_dir
            .as_ref()
            .map(|home| home.join(&self.global_port_file))
    }

    #[must_use]
    pub fn with_port_override(mut self, port: impl Into<String>) -> Self {
        self.port_override = Some(port.into());
        self
    }

    #[must_use]
    pub fn with_home_dir(mut self, home: Option<PathBuf>) -> Self {
        self.home_dir = home;
        self
    }

    #[must_use]
    pub fn with_server_command(mut self, command: impl Into<String>) -> Self {
        self.server_command = command.into();
        self
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn is_truthy(value: &str) -> bool {
    !matches!(value.trim().to_ascii_lowercase().as_str(), "0" | "false" | "no" | "off")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::new(PathBuf::from("/work")).with_home_dir(Some("/home/u".into()));
        assert_eq!(config.host, "127.0.0.1");
        assert_eq!(config.project_file, "project.clj");
        assert_eq!(config.port_file, ".nrepl-port");
        assert_eq!(
            config.global_port_path(),
            Some(PathBuf::from("/home/u/.lein/repl-port"))
        );
        assert!(!config.trace_messages);
    }

    #[test]
    fn test_truthy_values() {
        assert!(is_truthy("1"));
        assert!(is_truthy("yes"));
        assert!(!is_truthy("0"));
        assert!(!is_truthy("False"));
    }
}
