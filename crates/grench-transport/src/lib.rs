//! Transport layer for nREPL servers.
//!
//! Provides:
//! - Wire codec (bencode)
//! - TCP message channel

pub mod channel;
pub mod codec;

pub use channel::TcpChannel;
pub use codec::{BencodeCodec, CodecError};
