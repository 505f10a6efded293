//! Session engine: turns the server's multiplexed reply stream into
//! synchronous evaluation results.

use std::collections::HashSet;

use grench_core::{Channel, ChannelError, Request, Response, StatusKind};
use grench_transport::TcpChannel;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::console::Console;

/// Code evaluated to print the exception behind an `eval-error`.
const STACK_TRACE_CODE: &str = "(clojure.repl/pst *e)";

/// Engine error.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error(transparent)]
    Channel(#[from] ChannelError),
    #[error("Server did not return a session id")]
    Session,
    #[error("Evaluation returned unexpected status: {0}")]
    Protocol(String),
    #[error("{0}")]
    Eval(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// The last value produced by an evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// Printed result.
    pub value: String,
    /// Namespace current after the evaluation.
    pub ns: Option<String>,
}

/// Generate a fresh request id.
#[must_use]
pub fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

enum Event {
    Reply(Result<Option<Response>, ChannelError>),
    Interrupt,
}

/// Drives one session over one channel.
///
/// Evaluations are strictly sequential: the pending-id bookkeeping belongs to
/// a single in-flight `evaluate` call.
pub struct SessionEngine<C> {
    channel: C,
    session: Option<String>,
    console: Console,
    interrupts: Option<mpsc::UnboundedReceiver<()>>,
    /// Id of the evaluation currently in flight; the target of interrupts.
    active_id: Option<String>,
}

impl SessionEngine<TcpChannel> {
    /// Connect to the server at `host:port`.
    ///
    /// # Errors
    /// Returns `ChannelError::Connect` if the server is unreachable.
    pub async fn connect(host: &str, port: u16, console: Console) -> Result<Self, EngineError> {
        let channel = TcpChannel::connect(host, port).await?;
        Ok(Self::new(channel, console))
    }
}

impl<C: Channel> SessionEngine<C> {
    /// Create an engine over an open channel. The session is cloned lazily.
    #[must_use]
    pub const fn new(channel: C, console: Console) -> Self {
        Self {
            channel,
            session: None,
            console,
            interrupts: None,
            active_id: None,
        }
    }

    /// Reuse an existing session instead of cloning one.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Turn each message on `interrupts` into an interrupt request while an
    /// evaluation is in flight.
    #[must_use]
    pub fn with_interrupts(mut self, interrupts: mpsc::UnboundedReceiver<()>) -> Self {
        self.interrupts = Some(interrupts);
        self
    }

    /// Access the console, e.g. to print results.
    pub const fn console(&mut self) -> &mut Console {
        &mut self.console
    }

    /// Return the session id, performing the `clone` handshake if needed.
    ///
    /// # Errors
    /// Returns `EngineError::Session` if the reply carries no session id.
    pub async fn ensure_session(&mut self) -> Result<String, EngineError> {
        if let Some(session) = &self.session {
            return Ok(session.clone());
        }

        self.channel
            .write(Request::clone_session(new_request_id()))
            .await?;
        match self.channel.read().await? {
            Some(Response::NewSession { session, .. }) => {
                tracing::debug!(%session, "Session established");
                self.session = Some(session.clone());
                Ok(session)
            }
            other => {
                tracing::debug!(?other, "Unexpected reply to clone");
                Err(EngineError::Session)
            }
        }
    }

    /// Evaluate `code` under request id `id`.
    ///
    /// Returns once every request issued on behalf of this evaluation has
    /// reported `done`, or the channel closes. `extra` fields (e.g. `ns`) are
    /// sent with the eval request.
    ///
    /// # Errors
    /// - `EngineError::Eval` with the remote stack trace on `eval-error`
    /// - `EngineError::Protocol` on an unexpected status
    /// - `EngineError::Channel` on transport failure
    pub async fn evaluate(
        &mut self,
        code: &str,
        id: &str,
        extra: &[(&str, &str)],
    ) -> Result<Option<Evaluation>, EngineError> {
        let session = self.ensure_session().await?;
        self.discard_stale_interrupts();

        let request = extra
            .iter()
            .fold(Request::eval(id, code).session(session.as_str()), |req, (k, v)| {
                req.field(*k, *v)
            });
        self.channel.write(request).await?;

        self.active_id = Some(id.to_string());
        let mut pending = HashSet::from([id.to_string()]);
        let outcome = self.run_loop(&session, &mut pending).await;
        self.active_id = None;
        outcome
    }

    async fn run_loop(
        &mut self,
        session: &str,
        pending: &mut HashSet<String>,
    ) -> Result<Option<Evaluation>, EngineError> {
        let mut result = None;

        while !pending.is_empty() {
            let event = tokio::select! {
                reply = self.channel.read() => Event::Reply(reply),
                Some(()) = next_interrupt(&mut self.interrupts) => Event::Interrupt,
            };

            let response = match event {
                Event::Interrupt => {
                    self.send_interrupt(session).await?;
                    continue;
                }
                Event::Reply(reply) => reply?,
            };

            let Some(response) = response else {
                tracing::debug!(?pending, "Channel closed before evaluation finished");
                break;
            };

            match response {
                Response::Status { id, kind, codes } => match kind {
                    StatusKind::Done => {
                        if codes.iter().any(|c| c == "interrupted") {
                            self.console.write_err("Interrupted\n").await?;
                        }
                        if let Some(id) = id {
                            pending.remove(&id);
                        }
                    }
                    StatusKind::EvalError => {
                        return Err(self.fetch_stack_trace(session).await?);
                    }
                    StatusKind::NeedInput => {
                        let input_id = new_request_id();
                        let text = self.console.read_input().await?;
                        self.channel
                            .write(Request::stdin(input_id.as_str(), text).session(session))
                            .await?;
                        pending.insert(input_id);
                    }
                    StatusKind::Interrupted => {
                        tracing::debug!(?id, ?codes, "Evaluation interrupted");
                        self.console.write_err("Interrupted\n").await?;
                        if let Some(id) = id.filter(|_| codes.iter().any(|c| c == "done")) {
                            pending.remove(&id);
                        }
                    }
                    // Interrupt acknowledgements such as `session-idle` answer an
                    // id this loop never waits on.
                    StatusKind::Unknown(code)
                        if id.as_ref().is_some_and(|id| !pending.contains(id)) =>
                    {
                        tracing::debug!(?id, %code, "Ignoring status for untracked request");
                    }
                    StatusKind::Unknown(code) => return Err(EngineError::Protocol(code)),
                },
                Response::Value { value, ns, .. } => {
                    result = Some(Evaluation { value, ns });
                }
                Response::Output { out, err, .. } => {
                    if let Some(out) = out {
                        self.console.write_out(&out).await?;
                    }
                    if let Some(err) = err {
                        self.console.write_err(&err).await?;
                    }
                }
                other @ (Response::NewSession { .. } | Response::Unrecognized(_)) => {
                    tracing::warn!(response = ?other, "Ignoring unrecognized message");
                }
            }
        }

        Ok(result)
    }

    async fn send_interrupt(&mut self, session: &str) -> Result<(), EngineError> {
        let Some(target) = self.active_id.clone() else {
            return Ok(());
        };
        tracing::debug!(%target, "Requesting interrupt");
        self.channel
            .write(Request::interrupt(new_request_id(), target).session(session))
            .await?;
        Ok(())
    }

    /// Evaluate the stack-trace printer and gather its output into an
    /// `EngineError::Eval`.
    async fn fetch_stack_trace(&mut self, session: &str) -> Result<EngineError, EngineError> {
        let trace_id = new_request_id();
        self.channel
            .write(Request::eval(trace_id.as_str(), STACK_TRACE_CODE).session(session))
            .await?;

        let mut trace = String::new();
        while let Some(response) = self.channel.read().await? {
            if response.id() != Some(trace_id.as_str()) {
                tracing::trace!(?response, "Skipping reply while collecting stack trace");
                continue;
            }
            match response {
                Response::Output { out, err, .. } => {
                    trace.extend(out);
                    trace.extend(err);
                }
                Response::Status {
                    kind: StatusKind::Done,
                    ..
                } => break,
                _ => {}
            }
        }

        if trace.is_empty() {
            trace.push_str("Evaluation failed");
        }
        Ok(EngineError::Eval(trace))
    }

    fn discard_stale_interrupts(&mut self) {
        if let Some(rx) = self.interrupts.as_mut() {
            while rx.try_recv().is_ok() {}
        }
    }
}

async fn next_interrupt(rx: &mut Option<mpsc::UnboundedReceiver<()>>) -> Option<()> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
