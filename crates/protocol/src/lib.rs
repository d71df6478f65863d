//! Wire types for the scenelink engine protocol.
//!
//! The engine speaks two dialects over one duplex channel:
//!
//! - **Outbound**: plain-text commands, space-separated, verb first
//!   (see [`Command`]).
//! - **Inbound**: JSON objects discriminated by their `type` field
//!   (see [`InboundMessage`] and [`decode`]).
//!
//! Types in this crate are pure data. Connection handling lives in
//! `scenelink-runtime` and session semantics in `scenelink`.

pub mod command;
pub mod error;
pub mod inbound;

pub use command::{Command, Vec3};
pub use error::{DecodeError, ProtocolError};
pub use inbound::{DISCRIMINATOR, InboundMessage, SceneEvent, StatusUpdate, decode};
