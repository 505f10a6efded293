//! Core traits for message transport.

use async_trait::async_trait;
use thiserror::Error;

use crate::{Request, Response};

/// Channel error.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Could not connect to nREPL server at {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Malformed message: {0}")]
    Codec(String),
}

/// A duplex channel of protocol records bound to one server connection.
///
/// `read` yields `None` once the peer has closed the connection.
#[async_trait]
pub trait Channel: Send {
    /// Send a request.
    async fn write(&mut self, request: Request) -> Result<(), ChannelError>;

    /// Wait for the next reply.
    async fn read(&mut self) -> Result<Option<Response>, ChannelError>;
}
