//! Session engine for nREPL servers.
//!
//! Provides:
//! - `SessionEngine` - Session handshake and the evaluation loop
//! - `Console` - Where streamed output goes and where input comes from

pub mod console;
pub mod engine;

#[cfg(test)]
mod testing;

pub use console::{Console, InputSource, StdinInput};
pub use engine::{EngineError, Evaluation, SessionEngine, new_request_id};
