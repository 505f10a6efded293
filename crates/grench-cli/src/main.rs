//! grench: a fast command-line client for nREPL servers.
//!
//! Environment:
//! - `GRENCH_PORT`: port of the server to use, overriding marker files
//! - `GRENCH_HOST`: host to connect to (default `127.0.0.1`)
//! - `GRENCH_SERVER_CMD`: command started by `grench start`
//! - `GRENCH_DEBUG`: trace every protocol message to stderr

mod app;
mod forms;
mod repl;

use std::{io::IsTerminal, process::ExitCode};

use clap::{CommandFactory, Parser, Subcommand};
use grench_core::Config;
use grench_transport::channel::WIRE_TARGET;
use tokio::io::AsyncReadExt;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::app::App;

#[derive(Debug, Parser)]
#[command(name = "grench", version, about = "Talk to a running nREPL server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Evaluate FORM and print its value
    Eval {
        form: String,
        /// Namespace to evaluate in
        #[arg(long)]
        ns: Option<String>,
    },
    /// Start an interactive prompt
    Repl { port: Option<u16> },
    /// Call NAMESPACE[/FUNCTION] with ARGS
    Run {
        target: String,
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Run a Leiningen task inside the server
    Lein {
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        args: Vec<String>,
    },
    /// Start a server unless one is already running
    Start { port: Option<u16> },
    /// Stop the running server
    Kill { port: Option<u16> },
    /// Stop the running server and start a new one
    Restart { port: Option<u16> },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = Config::from_env();
    init_tracing(config.trace_messages);

    match dispatch(cli.command, App::new(config)).await {
        Ok(code) => ExitCode::from(exit_status(code)),
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn dispatch(command: Option<Command>, app: App) -> anyhow::Result<i32> {
    match command {
        Some(Command::Eval { form, ns }) => app.eval(&form, ns.as_deref()).await,
        Some(Command::Repl { port }) => app.repl(port).await,
        Some(Command::Run { target, args }) => app.run(&target, &args).await,
        Some(Command::Lein { args }) => app.lein(&args).await,
        Some(Command::Start { port }) => app.start(port).await,
        Some(Command::Kill { port }) => app.kill(port).await,
        Some(Command::Restart { port }) => app.restart(port).await,
        None if std::io::stdin().is_terminal() => {
            Cli::command().print_help()?;
            Ok(1)
        }
        None => {
            let mut code = String::new();
            tokio::io::stdin().read_to_string(&mut code).await?;
            app.eval(&code, None).await
        }
    }
}

fn init_tracing(trace_messages: bool) {
    let mut filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    if trace_messages {
        if let Ok(directive) = format!("{WIRE_TARGET}=trace").parse() {
            filter = filter.add_directive(directive);
        }
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

/// Low byte of `code`, as the operating system reports it.
fn exit_status(code: i32) -> u8 {
    u8::try_from(code.rem_euclid(256)).unwrap_or(u8::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_eval_with_ns() {
        let cli = Cli::try_parse_from(["grench", "eval", "(+ 1 2)", "--ns", "app.core"]).unwrap();
        match cli.command {
            Some(Command::Eval { form, ns }) => {
                assert_eq!(form, "(+ 1 2)");
                assert_eq!(ns.as_deref(), Some("app.core"));
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_run_keeps_hyphen_args() {
        let cli = Cli::try_parse_from(["grench", "run", "app.core/go", "--fast", "x"]).unwrap();
        match cli.command {
            Some(Command::Run { target, args }) => {
                assert_eq!(target, "app.core/go");
                assert_eq!(args, ["--fast", "x"]);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn test_parse_lein_requires_task() {
        assert!(Cli::try_parse_from(["grench", "lein"]).is_err());
        let cli = Cli::try_parse_from(["grench", "lein", "test", ":only", "a.b"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Lein { args }) if args.len() == 3));
    }

    #[test]
    fn test_parse_ports() {
        let cli = Cli::try_parse_from(["grench", "kill", "7888"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Kill { port: Some(7888) })));
        let cli = Cli::try_parse_from(["grench", "start"]).unwrap();
        assert!(matches!(cli.command, Some(Command::Start { port: None })));
        assert!(Cli::try_parse_from(["grench", "repl", "notaport"]).is_err());
    }

    #[test]
    fn test_no_command() {
        let cli = Cli::try_parse_from(["grench"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_exit_status() {
        assert_eq!(exit_status(0), 0);
        assert_eq!(exit_status(3), 3);
        assert_eq!(exit_status(256), 0);
        assert_eq!(exit_status(257), 1);
        assert_eq!(exit_status(-1), 255);
    }
}
