//! Server command-line building.

use std::path::PathBuf;

use thiserror::Error;

use crate::executable::resolve_executable_path;

/// Command build error.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("Base command cannot be parsed: {0}")]
    InvalidBase(String),
    #[error("Base command is empty after parsing")]
    EmptyCommand,
    #[error("Executable not found: {0}")]
    ExecutableNotFound(String),
}

/// Parsed command parts (program + args).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandParts {
    pub program: String,
    pub args: Vec<String>,
}

impl CommandParts {
    /// Create new command parts.
    #[must_use]
    pub const fn new(program: String, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Resolve the program to an absolute path.
    ///
    /// # Errors
    /// Returns error if executable not found.
    pub async fn into_resolved(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        let Self { program, args } = self;
        let executable = resolve_executable_path(&program)
            .await
            .ok_or(CommandBuildError::ExecutableNotFound(program))?;
        Ok((executable, args))
    }
}

/// Builder for the server launch command.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    /// Base command line, e.g. `lein trampoline repl :headless`.
    pub base: String,
    /// Optional parameters to append.
    pub params: Option<Vec<String>>,
}

impl CommandBuilder {
    /// Create a new command builder.
    #[must_use]
    pub fn new<S: Into<String>>(base: S) -> Self {
        Self {
            base: base.into(),
            params: None,
        }
    }

    /// Extend parameters.
    #[must_use]
    pub fn extend_params<I>(mut self, more: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
    {
        let extra: Vec<String> = more.into_iter().map(Into::into).collect();
        match &mut self.params {
            Some(p) => p.extend(extra),
            None => self.params = Some(extra),
        }
        self
    }

    /// Pin the server to `port`.
    #[must_use]
    pub fn port(self, port: u16) -> Self {
        self.extend_params([":port".to_string(), port.to_string()])
    }

    /// Build the program and argument list.
    ///
    /// # Errors
    /// Returns error if the base command is unparseable or empty.
    pub fn build(&self) -> Result<CommandParts, CommandBuildError> {
        let mut parts = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::InvalidBase(self.base.clone()))?;
        if let Some(ref params) = self.params {
            parts.extend(params.iter().cloned());
        }

        if parts.is_empty() {
            return Err(CommandBuildError::EmptyCommand);
        }

        let program = parts.remove(0);
        Ok(CommandParts::new(program, parts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_command() {
        let parts = CommandBuilder::new("lein trampoline repl :headless")
            .build()
            .unwrap();
        assert_eq!(parts.program, "lein");
        assert_eq!(parts.args, ["trampoline", "repl", ":headless"]);
    }

    #[test]
    fn test_port_is_appended() {
        let parts = CommandBuilder::new("lein repl :headless")
            .port(7888)
            .build()
            .unwrap();
        assert_eq!(parts.args, ["repl", ":headless", ":port", "7888"]);
    }

    #[test]
    fn test_quoted_base() {
        let parts = CommandBuilder::new(r#""/opt/my tools/lein" repl"#)
            .build()
            .unwrap();
        assert_eq!(parts.program, "/opt/my tools/lein");
    }

    #[test]
    fn test_empty_and_invalid() {
        assert!(matches!(
            CommandBuilder::new("   ").build(),
            Err(CommandBuildError::EmptyCommand)
        ));
        assert!(matches!(
            CommandBuilder::new("lein \"unterminated").build(),
            Err(CommandBuildError::InvalidBase(_))
        ));
    }
}
