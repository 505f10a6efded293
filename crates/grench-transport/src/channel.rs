//! Message channel over a byte stream.

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use grench_core::{Channel, ChannelError, Request, Response};
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::TcpStream,
};
use tokio_util::codec::Framed;

use crate::codec::{BencodeCodec, CodecError};

/// Tracing target for the per-message debug trace.
pub const WIRE_TARGET: &str = "grench::wire";

/// A bencode message channel over any duplex byte stream.
pub struct FramedChannel<S> {
    framed: Framed<S, BencodeCodec>,
}

/// Channel connected to a server over TCP.
pub type TcpChannel = FramedChannel<TcpStream>;

impl TcpChannel {
    /// Connect to `host:port`.
    ///
    /// # Errors
    /// Returns `ChannelError::Connect` if the server is unreachable.
    pub async fn connect(host: &str, port: u16) -> Result<Self, ChannelError> {
        let addr = format!("{host}:{port}");
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| ChannelError::Connect {
                addr: addr.clone(),
                source,
            })?;
        stream.set_nodelay(true)?;
        tracing::debug!(%addr, "Connected to nREPL server");
        Ok(Self::new(stream))
    }
}

impl<S> FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an already-open stream.
    #[must_use]
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, BencodeCodec::new()),
        }
    }
}

#[async_trait]
impl<S> Channel for FramedChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    async fn write(&mut self, request: Request) -> Result<(), ChannelError> {
        let message = request.into_message();
        tracing::trace!(target: WIRE_TARGET, message = %message.to_json(), "sent");
        self.framed.send(message).await.map_err(into_channel_error)
    }

    async fn read(&mut self) -> Result<Option<Response>, ChannelError> {
        match self.framed.next().await {
            None => {
                tracing::trace!(target: WIRE_TARGET, "connection closed");
                Ok(None)
            }
            Some(Err(e)) => Err(into_channel_error(e)),
            Some(Ok(message)) => {
                tracing::trace!(target: WIRE_TARGET, message = %message.to_json(), "received");
                Ok(Some(Response::from_message(message)))
            }
        }
    }
}

fn into_channel_error(e: CodecError) -> ChannelError {
    match e {
        CodecError::Io(e) => ChannelError::Io(e),
        other => ChannelError::Codec(other.to_string()),
    }
}
