//! Core abstractions for talking to an nREPL evaluation server.
//!
//! This crate provides the fundamental building blocks:
//! - `Message` / `Value` - Untyped protocol records
//! - `Request` / `Response` - Typed requests and classified replies
//! - `Channel` - Duplex message channel trait
//! - `Config` and `PortResolver` - Server discovery

pub mod config;
pub mod message;
pub mod port;
pub mod traits;

pub use config::Config;
pub use message::{Message, Request, Response, StatusKind, Value};
pub use port::{PortResolver, find_project_root};
pub use traits::{Channel, ChannelError};
