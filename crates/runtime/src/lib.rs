//! scenelink runtime - transport and reconnect machinery
//!
//! This crate provides the low-level plumbing the session bridge is built on:
//!
//! - **Transport**: a duplex text channel split into sender/receiver halves,
//!   created fresh per connection attempt by a [`Connector`]
//! - **WebSocket**: the production transport over `tokio-tungstenite`
//! - **Channel**: an in-memory transport with a scriptable remote end
//! - **Reconnect**: backoff policy and the cancellable retry supervisor
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐
//! │  scenelink   │  SessionBridge, state, notifications
//! └──────┬───────┘
//!        │ Arc<dyn Connector>
//! ┌──────▼───────┐
//! │  runtime     │  This crate
//! │  ┌────────┐  │
//! │  │ Trans  │  │  WebSocket / channel transport
//! │  └────────┘  │
//! │  ┌────────┐  │
//! │  │ Retry  │  │  Backoff policy + supervisor
//! │  └────────┘  │
//! └──────────────┘
//! ```

pub mod error;
pub mod reconnect;
pub mod transport;

pub use error::{Error, Result};
pub use reconnect::{ReconnectPolicy, ReconnectSupervisor, RetryDecision};
pub use transport::channel::{ChannelConnector, ConnectAttempt, RemoteEnd, RemoteEnds};
pub use transport::websocket::{WebSocketConnector, WebSocketTransport};
pub use transport::{Connector, Frame, FrameReceiver, FrameSender, TransportParts, parse_endpoint};
