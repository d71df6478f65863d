//! Bridge notifications.

use std::future::Future;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use scenelink_protocol::SceneEvent;
use scenelink_runtime::Result;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;

use crate::handlers::{HandlerEntry, HandlerFn, HandlerFuture, HandlerMap, Subscription, next_handler_id, spawn_worker};
use crate::state::SessionSnapshot;

const BROADCAST_CAPACITY: usize = 256;

/// A notification raised by the bridge.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum BridgeEvent {
	/// Connection or session data changed.
	StatusChanged(SessionSnapshot),
	/// The engine reported a scene change.
	SceneUpdated(SceneEvent),
}

impl BridgeEvent {
	pub fn kind(&self) -> EventKind {
		match self {
			BridgeEvent::StatusChanged(_) => EventKind::StatusChanged,
			BridgeEvent::SceneUpdated(_) => EventKind::SceneUpdated,
		}
	}

	pub fn as_status(&self) -> Option<&SessionSnapshot> {
		match self {
			BridgeEvent::StatusChanged(snapshot) => Some(snapshot),
			BridgeEvent::SceneUpdated(_) => None,
		}
	}

	pub fn as_scene(&self) -> Option<&SceneEvent> {
		match self {
			BridgeEvent::SceneUpdated(event) => Some(event),
			BridgeEvent::StatusChanged(_) => None,
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
	StatusChanged,
	SceneUpdated,
}

impl EventKind {
	pub fn as_str(&self) -> &'static str {
		match self {
			EventKind::StatusChanged => "status_changed",
			EventKind::SceneUpdated => "scene_updated",
		}
	}
}

/// Which events a handler receives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFilter {
	All,
	Only(EventKind),
}

impl EventFilter {
	fn accepts(&self, kind: EventKind) -> bool {
		match self {
			EventFilter::All => true,
			EventFilter::Only(wanted) => *wanted == kind,
		}
	}
}

/// Fan-out to registered handlers and broadcast subscribers.
pub(crate) struct Notifier {
	handlers: HandlerMap<BridgeEvent, EventFilter>,
	broadcast_tx: broadcast::Sender<BridgeEvent>,
}

impl Notifier {
	pub(crate) fn new() -> Self {
		let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
		Self {
			handlers: Arc::new(Mutex::new(IndexMap::new())),
			broadcast_tx,
		}
	}

	pub(crate) fn subscribe(&self) -> broadcast::Receiver<BridgeEvent> {
		self.broadcast_tx.subscribe()
	}

	pub(crate) fn register<F, Fut>(&self, filter: EventFilter, handler: F) -> Subscription
	where
		F: Fn(BridgeEvent) -> Fut + Send + Sync + 'static,
		Fut: Future<Output = Result<()>> + Send + 'static,
	{
		let id = next_handler_id();
		let handler: HandlerFn<BridgeEvent> =
			Arc::new(move |event: BridgeEvent| -> HandlerFuture { Box::pin(handler(event)) });
		let label = match filter {
			EventFilter::All => "all",
			EventFilter::Only(kind) => kind.as_str(),
		};
		let queue = spawn_worker(id, label, handler);

		self.handlers.lock().insert(
			id,
			HandlerEntry {
				id,
				meta: filter,
				queue,
			},
		);

		Subscription::from_handler_map(id, &self.handlers)
	}

	/// Queues `event` for every matching handler and broadcasts it. Never
	/// blocks.
	pub(crate) fn emit(&self, event: BridgeEvent) {
		let kind = event.kind();
		{
			let handlers = self.handlers.lock();
			for entry in handlers.values().filter(|entry| entry.meta.accepts(kind)) {
				if entry.queue.send(event.clone()).is_err() {
					trace!(target: "scenelink::events", handler = entry.id, "handler worker gone");
				}
			}
		}
		// No receivers is fine.
		let _ = self.broadcast_tx.send(event);
	}

	#[cfg(test)]
	pub(crate) fn handler_count(&self) -> usize {
		self.handlers.lock().len()
	}
}
