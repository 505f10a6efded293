//! Interactive read-eval-print loop.

use grench_core::Channel;
use grench_session::{EngineError, SessionEngine, new_request_id};

use crate::forms::repl_form;

const DEFAULT_NS: &str = "user";

/// A prompt loop over one session.
///
/// Lines are read from the engine's console, the same source that answers
/// `need-input`, so input typed ahead reaches whichever asks first.
pub struct Repl<C> {
    engine: SessionEngine<C>,
    ns: String,
}

impl<C: Channel> Repl<C> {
    #[must_use]
    pub fn new(engine: SessionEngine<C>) -> Self {
        Self {
            engine,
            ns: DEFAULT_NS.to_string(),
        }
    }

    /// Run until end of input or Ctrl-C at the prompt.
    ///
    /// Remote exceptions are printed and the loop carries on.
    ///
    /// # Errors
    /// Returns error on transport or protocol failure.
    pub async fn run(mut self) -> Result<(), EngineError> {
        if let Some(ns) = self
            .engine
            .evaluate("nil", &new_request_id(), &[])
            .await?
            .and_then(|result| result.ns)
        {
            self.ns = ns;
        }

        loop {
            let prompt = format!("{}=> ", self.ns);
            self.engine.console().write_out(&prompt).await?;

            let Some(line) = self.read_line().await? else {
                self.engine.console().write_out("\n").await?;
                return Ok(());
            };
            if line.trim().is_empty() {
                continue;
            }

            match self
                .engine
                .evaluate(&repl_form(&line), &new_request_id(), &[])
                .await
            {
                Ok(Some(result)) => {
                    self.engine
                        .console()
                        .write_out(&format!("{}\n", result.value))
                        .await?;
                    if let Some(ns) = result.ns {
                        self.ns = ns;
                    }
                }
                Ok(None) => {}
                Err(EngineError::Eval(trace)) => {
                    self.engine.console().write_err(&trace).await?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Next input line; `None` on end of input or Ctrl-C.
    async fn read_line(&mut self) -> Result<Option<String>, EngineError> {
        tokio::select! {
            line = self.engine.console().read_line() => Ok(line?),
            _ = tokio::signal::ctrl_c() => Ok(None),
        }
    }
}
