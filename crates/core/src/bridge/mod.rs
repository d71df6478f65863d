//! The session bridge.
//!
//! [`SessionBridge`] owns one logical connection to the engine. It opens a
//! fresh transport per attempt, runs a receive loop per session, serializes
//! writes, and hands connection losses to the reconnect supervisor.
//!
//! # Locking
//!
//! - `lifecycle` (async) serializes connect, disconnect and loss handling and
//!   holds the active session's receive-loop handle.
//! - `writer` (async) is the send lock and holds the sending half.
//! - `phase` and `state` are short synchronous locks, never held across an
//!   await point.
//!
//! Each session carries a generation number. Loss reports name the
//! generation they came from and are ignored once that session is gone.

mod receive;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use scenelink_protocol::{Command, SceneEvent};
use scenelink_runtime::{
	Connector, Error, FrameSender, ReconnectSupervisor, Result, RetryDecision, WebSocketConnector,
	parse_endpoint,
};
use tokio::sync::{Mutex as AsyncMutex, broadcast};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::config::BridgeConfig;
use crate::dispatcher::{InboundDispatcher, Routed};
use crate::events::{BridgeEvent, EventFilter, EventKind, Notifier};
use crate::handlers::Subscription;
use crate::state::{ConnectionState, SessionSnapshot, SessionState};

const TARGET: &str = "scenelink::bridge";

/// Result of a connection attempt that was allowed to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
	Connected,
	/// The engine could not be reached. Auto-reconnect, when enabled, has
	/// already scheduled the next attempt.
	Failed { reason: String },
}

impl ConnectOutcome {
	pub fn is_connected(&self) -> bool {
		matches!(self, ConnectOutcome::Connected)
	}
}

/// Connection and session bridge to a remote rendering engine.
///
/// Cheap to clone; clones share the same session.
///
/// ```ignore
/// let bridge = SessionBridge::websocket(BridgeConfig::default());
/// let _sub = bridge.on_scene_updated(|event| async move {
///     println!("{} in {}", event.update_type, event.scene);
///     Ok(())
/// });
/// bridge.connect("ws://localhost:8765").await?;
/// bridge.send(&Command::spawn_avatar("Bob", "model.fbx", Vec3::ZERO)).await?;
/// ```
#[derive(Clone)]
pub struct SessionBridge {
	inner: Arc<Inner>,
}

struct ActiveSession {
	generation: u64,
	cancel: CancellationToken,
	receive_task: JoinHandle<()>,
}

struct Inner {
	connector: Arc<dyn Connector>,
	clock: Arc<dyn Clock>,
	config: BridgeConfig,
	dispatcher: InboundDispatcher,
	phase: Mutex<ConnectionState>,
	state: Mutex<SessionState>,
	writer: AsyncMutex<Option<Box<dyn FrameSender>>>,
	lifecycle: AsyncMutex<Option<ActiveSession>>,
	generation: AtomicU64,
	last_endpoint: Mutex<Option<String>>,
	supervisor: ReconnectSupervisor,
	notifier: Notifier,
}

impl SessionBridge {
	pub fn new(connector: Arc<dyn Connector>, config: BridgeConfig) -> Self {
		Self::with_clock(connector, config, Arc::new(SystemClock))
	}

	/// Bridge over WebSocket, bounded by the configured connect timeout.
	pub fn websocket(config: BridgeConfig) -> Self {
		let connector = WebSocketConnector::new(config.connect_timeout());
		Self::new(Arc::new(connector), config)
	}

	pub fn with_clock(connector: Arc<dyn Connector>, config: BridgeConfig, clock: Arc<dyn Clock>) -> Self {
		let supervisor = ReconnectSupervisor::new(config.reconnect, config.auto_reconnect);
		Self {
			inner: Arc::new(Inner {
				connector,
				clock,
				dispatcher: InboundDispatcher::new(),
				phase: Mutex::new(ConnectionState::Disconnected),
				state: Mutex::new(SessionState::default()),
				writer: AsyncMutex::new(None),
				lifecycle: AsyncMutex::new(None),
				generation: AtomicU64::new(0),
				last_endpoint: Mutex::new(None),
				supervisor,
				notifier: Notifier::new(),
				config,
			}),
		}
	}

	/// Connects to `endpoint`, replacing any active session.
	///
	/// Unreachable engines are reported as [`ConnectOutcome::Failed`], not as
	/// errors. Re-enables auto-reconnect (when configured) and supersedes any
	/// pending reconnect wait.
	///
	/// Replacing a live session reports its teardown as a disconnected status
	/// before the new attempt reports its own. A failed replacement therefore
	/// emits two disconnected statuses in a row.
	///
	/// # Errors
	///
	/// [`Error::InvalidEndpoint`] if `endpoint` is not a `ws://` or `wss://`
	/// URL.
	pub async fn connect(&self, endpoint: &str) -> Result<ConnectOutcome> {
		let endpoint = endpoint.trim();
		parse_endpoint(endpoint)?;

		let inner = &self.inner;
		inner.supervisor.cancel_pending();
		if inner.config.auto_reconnect {
			inner.supervisor.enable();
		}
		inner.supervisor.reset();

		let mut session = inner.lifecycle.lock().await;
		if inner.teardown(&mut session).await {
			info!(target: TARGET, "replacing active session");
			inner.mark_disconnected();
		}
		Ok(inner.attempt_connect(&mut session, endpoint).await)
	}

	/// Ends the session and disables auto-reconnect. Idempotent: a bridge that
	/// is already disconnected does nothing and raises no notification.
	pub async fn disconnect(&self) {
		let inner = &self.inner;
		inner.supervisor.disable();

		let mut session = inner.lifecycle.lock().await;
		let was = inner.phase();
		let had_session = inner.teardown(&mut session).await;
		if !had_session && was == ConnectionState::Disconnected {
			debug!(target: TARGET, "already disconnected");
			return;
		}
		inner.mark_disconnected();
		info!(target: TARGET, "disconnected");
	}

	/// Writes `text` verbatim as one frame.
	///
	/// # Errors
	///
	/// [`Error::NotConnected`] unless the bridge is connected; transport errors
	/// if the write fails, in which case loss handling starts.
	pub async fn send_command(&self, text: &str) -> Result<()> {
		let inner = &self.inner;
		let mut writer = inner.writer.lock().await;
		let sender = match writer.as_mut() {
			Some(sender) if inner.phase() == ConnectionState::Connected => sender,
			_ => return Err(Error::NotConnected),
		};

		debug!(target: TARGET, command = text, "sending command");
		if let Err(err) = sender.send(text).await {
			drop(writer);
			warn!(target: TARGET, error = %err, "command write failed");
			let generation = inner.generation.load(Ordering::Acquire);
			tokio::spawn(Arc::clone(inner).handle_connection_lost(generation, err.to_string()));
			return Err(err);
		}
		Ok(())
	}

	/// Renders `command` to wire text and sends it.
	///
	/// # Errors
	///
	/// [`Error::InvalidCommand`] if the command does not render, otherwise as
	/// [`send_command`](Self::send_command).
	pub async fn send(&self, command: &Command) -> Result<()> {
		let wire = command.to_wire()?;
		self.send_command(&wire).await
	}

	/// Current snapshot, with a fresh uptime.
	///
	/// When connected, fires a background `status` probe (if configured). If
	/// the transport has died without the receive loop noticing, runs loss
	/// handling first and returns the disconnected snapshot.
	pub async fn status(&self) -> SessionSnapshot {
		let inner = &self.inner;
		if inner.phase() == ConnectionState::Connected {
			let alive = match inner.writer.try_lock() {
				Ok(writer) => writer.as_ref().is_some_and(|sender| sender.is_open()),
				// A send is in flight; trust the cached state.
				Err(_) => true,
			};

			if !alive {
				warn!(target: TARGET, "transport closed while session marked connected");
				let generation = inner.generation.load(Ordering::Acquire);
				Arc::clone(inner)
					.handle_connection_lost(generation, "transport closed".to_string())
					.await;
			} else if inner.config.status_probe {
				let bridge = self.clone();
				tokio::spawn(async move {
					if let Err(err) = bridge.send(&Command::Status).await {
						debug!(target: TARGET, error = %err, "status probe failed");
					}
				});
			}
		}
		inner.snapshot()
	}

	/// Current snapshot without probing or reconciling.
	pub fn snapshot(&self) -> SessionSnapshot {
		self.inner.snapshot()
	}

	pub fn state(&self) -> ConnectionState {
		self.inner.phase()
	}

	/// Endpoint of the current or most recent session.
	pub fn endpoint(&self) -> Option<String> {
		self.inner.last_endpoint.lock().clone()
	}

	/// Consecutive reconnect attempts since the last successful connect.
	pub fn reconnect_attempt(&self) -> u32 {
		self.inner.supervisor.attempt()
	}

	pub fn config(&self) -> &BridgeConfig {
		&self.inner.config
	}

	/// Receiver of every notification raised after this call.
	pub fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
		self.inner.notifier.subscribe()
	}

	/// Registers a handler for every notification.
	pub fn on_event<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(BridgeEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		self.inner.notifier.register(EventFilter::All, handler)
	}

	/// Registers a status-changed handler. Returns a [`Subscription`] that
	/// unregisters the handler when dropped.
	pub fn on_status_changed<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(SessionSnapshot) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		self.inner
			.notifier
			.register(EventFilter::Only(EventKind::StatusChanged), move |event| {
				let fut = match event {
					BridgeEvent::StatusChanged(snapshot) => Some(handler(snapshot)),
					BridgeEvent::SceneUpdated(_) => None,
				};
				async move {
					match fut {
						Some(fut) => fut.await,
						None => Ok(()),
					}
				}
			})
	}

	/// Registers a scene-updated handler. Returns a [`Subscription`] that
	/// unregisters the handler when dropped.
	pub fn on_scene_updated<F, Fut>(&self, handler: F) -> Subscription
	where
		F: Fn(SceneEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		self.inner
			.notifier
			.register(EventFilter::Only(EventKind::SceneUpdated), move |event| {
				let fut = match event {
					BridgeEvent::SceneUpdated(scene) => Some(handler(scene)),
					BridgeEvent::StatusChanged(_) => None,
				};
				async move {
					match fut {
						Some(fut) => fut.await,
						None => Ok(()),
					}
				}
			})
	}

	/// Waits for the first notification matching `predicate`.
	///
	/// # Errors
	///
	/// [`Error::Timeout`] if nothing matches in time.
	pub async fn wait_for_event<F>(&self, predicate: F, timeout: Duration) -> Result<BridgeEvent>
	where
		F: Fn(&BridgeEvent) -> bool,
	{
		let mut rx = self.subscribe();
		tokio::time::timeout(timeout, async move {
			loop {
				match rx.recv().await {
					Ok(event) if predicate(&event) => return Ok(event),
					Ok(_) => continue,
					Err(broadcast::error::RecvError::Lagged(n)) => {
						warn!(target: TARGET, dropped = n, "event receiver lagged");
					}
					Err(broadcast::error::RecvError::Closed) => return Err(Error::ChannelClosed),
				}
			}
		})
		.await
		.map_err(|_| Error::Timeout("timeout waiting for bridge event".to_string()))?
	}
}

impl std::fmt::Debug for SessionBridge {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("SessionBridge")
			.field("state", &self.inner.phase())
			.field("endpoint", &self.inner.last_endpoint.lock().as_deref())
			.finish_non_exhaustive()
	}
}

impl Inner {
	fn phase(&self) -> ConnectionState {
		*self.phase.lock()
	}

	fn set_phase(&self, next: ConnectionState) {
		let mut phase = self.phase.lock();
		if *phase != next {
			debug!(target: TARGET, from = %*phase, to = %next, "phase change");
			*phase = next;
		}
	}

	fn snapshot(&self) -> SessionSnapshot {
		let phase = self.phase();
		self.state.lock().snapshot(phase, self.clock.now())
	}

	fn publish_status(&self) {
		self.notifier.emit(BridgeEvent::StatusChanged(self.snapshot()));
	}

	fn mark_disconnected(&self) {
		self.state.lock().reset();
		self.set_phase(ConnectionState::Disconnected);
		self.publish_status();
	}

	/// Opens a transport and, on success, installs it as the active session.
	/// The caller holds the lifecycle lock and has cleared `session`.
	async fn attempt_connect(self: &Arc<Self>, session: &mut Option<ActiveSession>, endpoint: &str) -> ConnectOutcome {
		self.set_phase(ConnectionState::Connecting);
		*self.last_endpoint.lock() = Some(endpoint.to_string());
		info!(target: TARGET, endpoint, attempt = self.supervisor.attempt(), "connecting");

		let opened = match tokio::time::timeout(self.config.connect_timeout(), self.connector.connect(endpoint)).await {
			Ok(result) => result,
			Err(_) => Err(Error::Timeout(format!(
				"connecting to {endpoint} exceeded {}ms",
				self.config.connect_timeout_ms
			))),
		};

		let parts = match opened {
			Ok(parts) => parts,
			Err(err) => {
				warn!(target: TARGET, endpoint, error = %err, "connection attempt failed");
				{
					let mut state = self.state.lock();
					state.endpoint = Some(endpoint.to_string());
					state.reset();
				}
				self.set_phase(ConnectionState::Disconnected);
				self.publish_status();
				self.schedule_reconnect();
				return ConnectOutcome::Failed {
					reason: err.to_string(),
				};
			}
		};

		let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;
		*self.writer.lock().await = Some(parts.sender);
		self.state.lock().mark_connected(endpoint, self.clock.now());
		self.supervisor.reset();
		self.set_phase(ConnectionState::Connected);
		self.publish_status();

		let cancel = CancellationToken::new();
		let receive_task = tokio::spawn(receive::run(
			Arc::downgrade(self),
			parts.receiver,
			cancel.clone(),
			generation,
		));
		*session = Some(ActiveSession {
			generation,
			cancel,
			receive_task,
		});
		info!(target: TARGET, endpoint, generation, "connected");
		ConnectOutcome::Connected
	}

	/// Asks the supervisor for the next step and arms the retry timer.
	fn schedule_reconnect(self: &Arc<Self>) {
		match self.supervisor.next_step() {
			RetryDecision::Disabled => {
				debug!(target: TARGET, "auto-reconnect disabled, staying disconnected");
			}
			RetryDecision::Exhausted { attempts } => {
				warn!(target: TARGET, attempts, "reconnect attempts exhausted, staying disconnected");
			}
			RetryDecision::Retry { attempt, delay } => {
				let token = self.supervisor.arm();
				self.set_phase(ConnectionState::Reconnecting);
				info!(target: TARGET, attempt, delay_secs = delay.as_secs(), "scheduling reconnect");

				let weak = Arc::downgrade(self);
				tokio::spawn(async move {
					if !ReconnectSupervisor::wait(delay, &token).await {
						debug!(target: TARGET, attempt, "reconnect wait cancelled");
						return;
					}
					if let Some(inner) = weak.upgrade() {
						inner.retry(token).await;
					}
				});
			}
		}
	}

	async fn retry(self: Arc<Self>, token: CancellationToken) {
		let mut session = self.lifecycle.lock().await;
		if token.is_cancelled() || !self.supervisor.is_enabled() {
			debug!(target: TARGET, "reconnect superseded");
			return;
		}
		if session.is_some() {
			debug!(target: TARGET, "session already active, skipping reconnect");
			return;
		}
		let Some(endpoint) = self.last_endpoint.lock().clone() else {
			return;
		};
		info!(target: TARGET, endpoint = %endpoint, attempt = self.supervisor.attempt(), "reconnecting");
		self.attempt_connect(&mut session, &endpoint).await;
	}

	/// Tears down session `generation` after an unrequested loss. Reports for
	/// sessions that are already gone are ignored.
	async fn handle_connection_lost(self: Arc<Self>, generation: u64, reason: String) {
		let mut session = self.lifecycle.lock().await;
		let Some(active) = session.take_if(|active| active.generation == generation) else {
			debug!(target: TARGET, generation, "ignoring stale loss report");
			return;
		};

		warn!(target: TARGET, generation, reason = %reason, "connection lost");
		self.stop_receive_loop(active).await;
		self.close_writer().await;
		self.mark_disconnected();
		self.schedule_reconnect();
	}

	/// Stops the active session, if any. Returns whether there was one.
	async fn teardown(&self, session: &mut Option<ActiveSession>) -> bool {
		let Some(active) = session.take() else {
			return false;
		};
		self.set_phase(ConnectionState::Closing);
		self.stop_receive_loop(active).await;
		self.close_writer().await;
		true
	}

	async fn stop_receive_loop(&self, active: ActiveSession) {
		let ActiveSession {
			generation,
			cancel,
			mut receive_task,
		} = active;
		cancel.cancel();
		if tokio::time::timeout(self.config.shutdown_timeout(), &mut receive_task)
			.await
			.is_err()
		{
			warn!(target: TARGET, generation, "receive loop did not stop in time, aborting");
			receive_task.abort();
		}
	}

	async fn close_writer(&self) {
		let sender = self.writer.lock().await.take();
		if let Some(mut sender) = sender {
			if let Err(err) = sender.close().await {
				debug!(target: TARGET, error = %err, "transport close failed");
			}
		}
	}

	fn dispatch_frame(&self, text: &str) {
		match self.dispatcher.route(text) {
			Some(Routed::Status(update)) => {
				let phase = self.phase();
				let snapshot = {
					let mut state = self.state.lock();
					state.apply_status(&update);
					state.snapshot(phase, self.clock.now())
				};
				self.notifier.emit(BridgeEvent::StatusChanged(snapshot));
			}
			Some(Routed::Scene(event)) => {
				self.state.lock().apply_scene_event(&event);
				self.notifier.emit(BridgeEvent::SceneUpdated(event));
			}
			None => {}
		}
	}
}

impl Drop for Inner {
	fn drop(&mut self) {
		self.supervisor.cancel_pending();
		if let Some(active) = self.lifecycle.get_mut().take() {
			active.cancel.cancel();
			active.receive_task.abort();
		}
	}
}
