//! Generic event handler infrastructure.
//!
//! Each registered handler gets its own unbounded queue and worker task, so a
//! slow or failing handler never delays the receive loop or other handlers.
//! Entries live in an [`IndexMap`] for O(1) removal with stable insertion
//! order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::FutureExt;
use indexmap::IndexMap;
use parking_lot::Mutex;
use scenelink_runtime::Result;
use tokio::sync::mpsc;
use tracing::error;

/// Unique identifier for event handlers.
pub type HandlerId = u64;

static NEXT_HANDLER_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a new globally-unique handler ID.
pub fn next_handler_id() -> HandlerId {
	NEXT_HANDLER_ID.fetch_add(1, Ordering::SeqCst)
}

/// Boxed async handler future.
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<()>> + Send>>;

/// Handler function: `E` to async `Result<()>`.
pub type HandlerFn<E> = Arc<dyn Fn(E) -> HandlerFuture + Send + Sync>;

/// Registered handler: metadata `M` used for filtering plus the queue feeding
/// its worker.
pub struct HandlerEntry<E, M = ()> {
	pub id: HandlerId,
	pub meta: M,
	pub queue: mpsc::UnboundedSender<E>,
}

impl<E, M: Clone> Clone for HandlerEntry<E, M> {
	fn clone(&self) -> Self {
		Self {
			id: self.id,
			meta: self.meta.clone(),
			queue: self.queue.clone(),
		}
	}
}

/// Handler storage: [`IndexMap`] for O(1) removal with stable insertion order.
pub type HandlerMap<E, M = ()> = Arc<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>>;

/// Spawns the worker for one handler and returns its queue.
///
/// Events are handled strictly in queue order. Errors are logged; panics are
/// caught so the worker keeps draining. The worker exits once every sender
/// for the queue is dropped.
///
/// Must be called within a tokio runtime.
pub fn spawn_worker<E>(id: HandlerId, label: &'static str, handler: HandlerFn<E>) -> mpsc::UnboundedSender<E>
where
	E: Send + 'static,
{
	let (tx, mut rx) = mpsc::unbounded_channel::<E>();
	tokio::spawn(async move {
		while let Some(event) = rx.recv().await {
			let handler = Arc::clone(&handler);
			let outcome = AssertUnwindSafe(async move { handler(event).await })
				.catch_unwind()
				.await;
			match outcome {
				Ok(Ok(())) => {}
				Ok(Err(err)) => {
					error!(target: "scenelink::events", handler = id, event = label, error = %err, "handler failed");
				}
				Err(_) => {
					error!(target: "scenelink::events", handler = id, event = label, "handler panicked");
				}
			}
		}
	});
	tx
}

/// RAII handle that unregisters an event handler on drop.
///
/// Holds a weak reference to the handler map, so dropping after the owning
/// bridge is gone is safe (becomes a no-op). Removing the entry drops the
/// worker's queue, which ends the worker once it has drained.
pub struct Subscription {
	id: HandlerId,
	dropper: Option<Arc<dyn Fn(HandlerId) + Send + Sync>>,
}

impl Subscription {
	/// Creates a subscription with a custom dropper function.
	pub fn new(id: HandlerId, dropper: Arc<dyn Fn(HandlerId) + Send + Sync>) -> Self {
		Self {
			id,
			dropper: Some(dropper),
		}
	}

	/// Creates a subscription from a handler map using a weak reference.
	pub fn from_handler_map<E, M>(id: HandlerId, handlers: &HandlerMap<E, M>) -> Self
	where
		E: Send + 'static,
		M: Send + 'static,
	{
		let weak: Weak<Mutex<IndexMap<HandlerId, HandlerEntry<E, M>>>> = Arc::downgrade(handlers);
		let dropper = Arc::new(move |id: HandlerId| {
			if let Some(map) = weak.upgrade() {
				map.lock().shift_remove(&id);
			}
		});
		Self::new(id, dropper)
	}

	/// Returns this subscription's handler ID.
	pub fn id(&self) -> HandlerId {
		self.id
	}

	/// Explicitly unsubscribes. Equivalent to dropping.
	pub fn unsubscribe(mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(dropper) = self.dropper.take() {
			(dropper)(self.id);
		}
	}
}

impl std::fmt::Debug for Subscription {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Subscription")
			.field("id", &self.id)
			.field("active", &self.dropper.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	use std::sync::atomic::AtomicBool;
	use std::time::Duration;

	use scenelink_runtime::Error;

	use super::*;

	fn recording_handler(seen: Arc<Mutex<Vec<u32>>>) -> HandlerFn<u32> {
		Arc::new(move |n: u32| -> HandlerFuture {
			let seen = Arc::clone(&seen);
			Box::pin(async move {
				seen.lock().push(n);
				Ok(())
			})
		})
	}

	#[test]
	fn test_handler_id_increments() {
		let id1 = next_handler_id();
		let id2 = next_handler_id();
		assert!(id2 > id1);
	}

	#[test]
	fn test_subscription_unsubscribe() {
		let called = Arc::new(AtomicBool::new(false));
		let called_clone = Arc::clone(&called);
		let dropper = Arc::new(move |_id: HandlerId| {
			called_clone.store(true, Ordering::SeqCst);
		});

		let sub = Subscription::new(1, dropper);
		assert!(!called.load(Ordering::SeqCst));
		sub.unsubscribe();
		assert!(called.load(Ordering::SeqCst));
	}

	#[tokio::test]
	async fn test_subscription_removes_entry_on_drop() {
		let map: HandlerMap<u32> = Arc::new(Mutex::new(IndexMap::new()));
		let id = next_handler_id();
		let queue = spawn_worker(id, "test", recording_handler(Arc::default()));
		map.lock().insert(id, HandlerEntry { id, meta: (), queue });

		{
			let _sub = Subscription::from_handler_map(id, &map);
		}
		assert!(map.lock().is_empty());
	}

	#[test]
	fn test_subscription_weak_reference() {
		let map: HandlerMap<u32> = Arc::new(Mutex::new(IndexMap::new()));
		let sub = Subscription::from_handler_map(next_handler_id(), &map);
		drop(map);
		drop(sub);
	}

	#[tokio::test]
	async fn test_worker_preserves_order() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let queue = spawn_worker(next_handler_id(), "test", recording_handler(Arc::clone(&seen)));
		for n in 0..50 {
			queue.send(n).unwrap();
		}
		drop(queue);

		tokio::time::timeout(Duration::from_secs(1), async {
			while seen.lock().len() < 50 {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();
		assert_eq!(*seen.lock(), (0..50).collect::<Vec<_>>());
	}

	#[tokio::test]
	async fn test_worker_survives_errors_and_panics() {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let seen_clone = Arc::clone(&seen);
		let handler: HandlerFn<u32> = Arc::new(move |n: u32| -> HandlerFuture {
			let seen = Arc::clone(&seen_clone);
			Box::pin(async move {
				match n {
					1 => Err(Error::TransportError("boom".into())),
					2 => panic!("handler exploded"),
					_ => {
						seen.lock().push(n);
						Ok(())
					}
				}
			})
		});

		let queue = spawn_worker(next_handler_id(), "test", handler);
		for n in 0..4 {
			queue.send(n).unwrap();
		}

		tokio::time::timeout(Duration::from_secs(1), async {
			while seen.lock().len() < 2 {
				tokio::task::yield_now().await;
			}
		})
		.await
		.unwrap();
		assert_eq!(*seen.lock(), vec![0, 3]);
	}
}
