//! scenelink - session bridge to a remote rendering engine
//!
//! A [`SessionBridge`] keeps one long-lived connection to the engine:
//!
//! - connect / disconnect with automatic, cancellable reconnects
//! - fire-and-forget commands through a serialized send path
//! - inbound status ticks and scene events folded into a [`SessionSnapshot`]
//! - notifications via [`SessionBridge::subscribe`] or RAII handler
//!   [`Subscription`]s
//!
//! ```ignore
//! use scenelink::{BridgeConfig, Command, SessionBridge, Vec3};
//!
//! let bridge = SessionBridge::websocket(BridgeConfig::default());
//! bridge.connect("ws://localhost:8765").await?;
//! bridge.send(&Command::spawn_avatar("Bob", "model.fbx", Vec3::ZERO)).await?;
//! println!("{:?}", bridge.status().await);
//! bridge.disconnect().await;
//! ```

mod bridge;
pub mod clock;
pub mod config;
pub mod dispatcher;
pub mod events;
pub mod handlers;
pub mod state;

pub use bridge::{ConnectOutcome, SessionBridge};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::BridgeConfig;
pub use dispatcher::{InboundDispatcher, Routed};
pub use events::{BridgeEvent, EventFilter, EventKind};
pub use handlers::{HandlerId, Subscription};
pub use scenelink_protocol::{Command, InboundMessage, ProtocolError, SceneEvent, StatusUpdate, Vec3};
pub use scenelink_runtime::{
	ChannelConnector, Connector, Error, ReconnectPolicy, RemoteEnd, RemoteEnds, Result,
	WebSocketConnector,
};
pub use state::{ConnectionState, SessionSnapshot, SessionState};
