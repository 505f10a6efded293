//! Scripted in-memory channel for driving the engine in tests.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use grench_core::{Channel, ChannelError, Request, Response};
use tokio::sync::Notify;

/// One scripted action of the fake server.
pub enum Step {
    /// Deliver this reply as-is.
    Reply(Response),
    /// Deliver this reply, tagged with the id of the most recent request.
    AnswerLast(Response),
    /// Build a reply from the id of the most recent request.
    AnswerLastWith(fn(&str) -> Response),
    /// Block until a request with this op has been written.
    WaitFor(&'static str),
}

struct Inner {
    steps: VecDeque<Step>,
    sent: Vec<Request>,
}

/// Channel replaying a fixed script; reads `None` once the script runs out.
#[derive(Clone)]
pub struct ScriptedChannel {
    inner: Arc<Mutex<Inner>>,
    written: Arc<Notify>,
}

impl ScriptedChannel {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                steps: steps.into(),
                sent: Vec::new(),
            })),
            written: Arc::new(Notify::new()),
        }
    }

    /// Requests written so far.
    pub fn sent(&self) -> Vec<Request> {
        self.inner.lock().unwrap().sent.clone()
    }

    /// Steps not yet consumed.
    pub fn remaining(&self) -> usize {
        self.inner.lock().unwrap().steps.len()
    }

    /// Pop the next reply, or `Err(op)` if blocked waiting for a request.
    fn next_reply(&self) -> Result<Option<Response>, &'static str> {
        let mut inner = self.inner.lock().unwrap();
        let last_id = inner.sent.last().map(|r| r.id().to_string());
        loop {
            let Some(step) = inner.steps.pop_front() else {
                return Ok(None);
            };
            return match step {
                Step::Reply(response) => Ok(Some(response)),
                Step::AnswerLast(response) => {
                    Ok(Some(with_id(response, last_id.clone().unwrap_or_default())))
                }
                Step::AnswerLastWith(build) => Ok(Some(build(last_id.as_deref().unwrap_or("")))),
                Step::WaitFor(op) => {
                    if inner.sent.iter().any(|r| r.op() == op) {
                        continue;
                    }
                    inner.steps.push_front(Step::WaitFor(op));
                    Err(op)
                }
            };
        }
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    async fn write(&mut self, request: Request) -> Result<(), ChannelError> {
        self.inner.lock().unwrap().sent.push(request);
        self.written.notify_one();
        Ok(())
    }

    async fn read(&mut self) -> Result<Option<Response>, ChannelError> {
        loop {
            match self.next_reply() {
                Ok(reply) => return Ok(reply),
                Err(_) => self.written.notified().await,
            }
        }
    }
}

fn with_id(response: Response, new_id: String) -> Response {
    match response {
        Response::Status { kind, codes, .. } => Response::Status {
            id: Some(new_id),
            kind,
            codes,
        },
        Response::NewSession { session, .. } => Response::NewSession {
            id: Some(new_id),
            session,
        },
        Response::Value { value, ns, .. } => Response::Value {
            id: Some(new_id),
            value,
            ns,
        },
        Response::Output { out, err, .. } => Response::Output {
            id: Some(new_id),
            out,
            err,
        },
        Response::Unrecognized(mut message) => {
            message.insert("id", new_id);
            Response::Unrecognized(message)
        }
    }
}
