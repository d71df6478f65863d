use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use scenelink_protocol::{Command, Vec3};
use scenelink_runtime::{ChannelConnector, Error, Frame, FrameReceiver, RemoteEnds, TransportParts};
use tokio::sync::{Notify, broadcast};

use super::*;
use crate::clock::ManualClock;

const ENDPOINT: &str = "ws://engine.test:8765";

struct Harness {
	bridge: SessionBridge,
	connector: ChannelConnector,
	ends: RemoteEnds,
	clock: ManualClock,
	events: broadcast::Receiver<BridgeEvent>,
}

fn harness(config: BridgeConfig) -> Harness {
	let (connector, ends) = ChannelConnector::new();
	let clock = ManualClock::default();
	let bridge = SessionBridge::with_clock(Arc::new(connector.clone()), config, Arc::new(clock.clone()));
	let events = bridge.subscribe();
	Harness {
		bridge,
		connector,
		ends,
		clock,
		events,
	}
}

fn quiet() -> BridgeConfig {
	BridgeConfig::default().with_status_probe(false)
}

fn drain(rx: &mut broadcast::Receiver<BridgeEvent>) -> Vec<BridgeEvent> {
	let mut events = Vec::new();
	while let Ok(event) = rx.try_recv() {
		events.push(event);
	}
	events
}

fn statuses(events: &[BridgeEvent]) -> Vec<bool> {
	events
		.iter()
		.filter_map(BridgeEvent::as_status)
		.map(|snapshot| snapshot.is_connected)
		.collect()
}

async fn next_event<F>(rx: &mut broadcast::Receiver<BridgeEvent>, predicate: F) -> BridgeEvent
where
	F: Fn(&BridgeEvent) -> bool,
{
	tokio::time::timeout(Duration::from_secs(300), async {
		loop {
			let event = rx.recv().await.unwrap();
			if predicate(&event) {
				return event;
			}
		}
	})
	.await
	.unwrap()
}

async fn next_status(rx: &mut broadcast::Receiver<BridgeEvent>) -> SessionSnapshot {
	next_event(rx, |event| event.as_status().is_some())
		.await
		.as_status()
		.cloned()
		.unwrap()
}

async fn wait_until<F: Fn() -> bool>(condition: F) {
	tokio::time::timeout(Duration::from_secs(600), async {
		while !condition() {
			tokio::time::sleep(Duration::from_millis(100)).await;
		}
	})
	.await
	.unwrap();
}

#[tokio::test]
async fn connect_emits_exactly_one_connected_status() {
	let mut h = harness(quiet());

	let outcome = h.bridge.connect(ENDPOINT).await.unwrap();
	assert_eq!(outcome, ConnectOutcome::Connected);
	assert_eq!(h.bridge.state(), ConnectionState::Connected);
	assert_eq!(h.bridge.endpoint().as_deref(), Some(ENDPOINT));
	assert_eq!(h.bridge.reconnect_attempt(), 0);

	let events = drain(&mut h.events);
	assert_eq!(events.len(), 1);
	let snapshot = events[0].as_status().unwrap();
	assert!(snapshot.is_connected);
	assert_eq!(snapshot.connection_state, ConnectionState::Connected);
	assert_eq!(snapshot.endpoint.as_deref(), Some(ENDPOINT));
	assert_eq!(snapshot.connected_since, Some(h.clock.now()));
}

#[tokio::test]
async fn invalid_endpoint_is_misuse() {
	let mut h = harness(quiet());

	let err = h.bridge.connect("http://engine.test").await.unwrap_err();
	assert!(matches!(err, Error::InvalidEndpoint { .. }));
	assert_eq!(h.connector.attempt_count(), 0);
	assert!(drain(&mut h.events).is_empty());
	assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
}

#[tokio::test]
async fn disconnect_is_idempotent() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	h.bridge.disconnect().await;
	let events = drain(&mut h.events);
	assert_eq!(statuses(&events), vec![false]);
	assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
	remote.closed_by_client().await;

	h.bridge.disconnect().await;
	assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn disconnect_on_fresh_bridge_is_silent() {
	let mut h = harness(quiet());
	h.bridge.disconnect().await;
	assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn disconnect_resets_session_state() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	remote.push(r#"{"type":"status","scene":"Stage","avatar_count":4,"fps":60,"rendering":true}"#);
	next_event(&mut h.events, |e| e.as_status().is_some_and(|s| s.avatar_count == 4)).await;

	h.bridge.disconnect().await;
	let snapshot = h.bridge.snapshot();
	assert!(!snapshot.is_connected);
	assert_eq!(snapshot.current_scene, None);
	assert_eq!(snapshot.avatar_count, 0);
	assert_eq!(snapshot.frame_rate, 0.0);
	assert!(!snapshot.is_rendering);
	assert_eq!(snapshot.uptime, None);
}

#[tokio::test]
async fn send_while_disconnected_never_touches_transport() {
	let h = harness(quiet());

	let err = h.bridge.send_command("status").await.unwrap_err();
	assert!(err.is_not_connected());
	let err = h.bridge.send(&Command::Status).await.unwrap_err();
	assert!(err.is_not_connected());
	assert_eq!(h.connector.attempt_count(), 0);
}

#[tokio::test]
async fn commands_are_written_verbatim() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut remote = h.ends.next().await.unwrap();

	h.bridge.send_command("get_scene_info").await.unwrap();
	h.bridge
		.send(&Command::spawn_avatar("Bob", "model.fbx", Vec3::ZERO))
		.await
		.unwrap();

	assert_eq!(remote.recv_command().await.as_deref(), Some("get_scene_info"));
	assert_eq!(
		remote.recv_command().await.as_deref(),
		Some("spawn_avatar Bob model.fbx 0 0 0")
	);
}

#[tokio::test]
async fn invalid_command_is_rejected_before_sending() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut remote = h.ends.next().await.unwrap();

	let err = h
		.bridge
		.send(&Command::spawn_avatar("Bob Smith", "model.fbx", Vec3::ZERO))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::InvalidCommand(_)));
	assert_eq!(remote.try_recv_command(), None);
}

#[tokio::test]
async fn malformed_frames_do_not_stop_the_loop() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	remote.push("garbage");
	remote.push("iVBORw0KGgoAAAANSUhEUgAA");
	remote.push(r#"{"type":"status","avatar_count":"many"}"#);
	remote.push(r#"{"type":"heartbeat"}"#);
	remote.push(r#"{"type":"status","avatar_count":2}"#);

	let snapshot = next_status(&mut h.events).await;
	assert_eq!(snapshot.avatar_count, 2);
	assert_eq!(snapshot.current_scene, None);
	assert_eq!(snapshot.frame_rate, 0.0);
	assert!(!snapshot.is_rendering);
	assert!(snapshot.is_connected);
}

#[tokio::test]
async fn partial_status_updates_only_present_fields() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	remote.push(r#"{"type":"status","scene":"Stage","avatar_count":1,"fps":59.9,"rendering":true}"#);
	next_status(&mut h.events).await;
	remote.push(r#"{"type":"status","avatar_count":3}"#);
	let snapshot = next_status(&mut h.events).await;

	assert_eq!(snapshot.avatar_count, 3);
	assert_eq!(snapshot.current_scene.as_deref(), Some("Stage"));
	assert_eq!(snapshot.frame_rate, 59.9);
	assert!(snapshot.is_rendering);
}

#[tokio::test]
async fn spawn_round_trip_increments_avatar_count() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut remote = h.ends.next().await.unwrap();
	remote.push(r#"{"type":"status","scene":"Lobby","avatar_count":2}"#);
	next_event(&mut h.events, |e| e.as_status().is_some_and(|s| s.avatar_count == 2)).await;

	h.bridge
		.send(&Command::spawn_avatar("Bob", "model.fbx", Vec3::ZERO))
		.await
		.unwrap();
	assert_eq!(
		remote.recv_command().await.as_deref(),
		Some("spawn_avatar Bob model.fbx 0 0 0")
	);
	remote.push(r#"{"type":"scene_update","scene":"Lobby","update_type":"AvatarSpawned","avatar_id":"bob-1"}"#);

	let event = next_event(&mut h.events, |e| e.as_scene().is_some()).await;
	let scene = event.as_scene().unwrap();
	assert_eq!(scene.update_type, "AvatarSpawned");
	assert_eq!(scene.payload["avatar_id"], "bob-1");
	assert_eq!(h.bridge.snapshot().avatar_count, 3);
}

#[tokio::test]
async fn status_reports_uptime_and_probes() {
	let mut h = harness(BridgeConfig::default());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut remote = h.ends.next().await.unwrap();

	h.clock.advance(Duration::from_secs(30));
	let snapshot = h.bridge.status().await;
	assert!(snapshot.is_connected);
	assert_eq!(snapshot.uptime, Some(Duration::from_secs(30)));
	assert_eq!(remote.recv_command().await.as_deref(), Some("status"));
}

#[tokio::test]
async fn status_probe_can_be_disabled() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut remote = h.ends.next().await.unwrap();

	h.bridge.status().await;
	tokio::task::yield_now().await;
	tokio::task::yield_now().await;
	assert_eq!(remote.try_recv_command(), None);
}

#[tokio::test]
async fn status_reconciles_dead_transport() {
	let mut h = harness(quiet().with_auto_reconnect(false));
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	remote.sever();
	let snapshot = h.bridge.status().await;
	assert!(!snapshot.is_connected);
	assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
	assert_eq!(statuses(&drain(&mut h.events)), vec![false]);
}

#[tokio::test]
async fn write_failure_starts_loss_handling() {
	let mut h = harness(quiet().with_auto_reconnect(false));
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	drop(remote);
	let err = h.bridge.send_command("status").await.unwrap_err();
	assert!(matches!(err, Error::TransportError(_)));

	let snapshot = next_status(&mut h.events).await;
	assert!(!snapshot.is_connected);
	assert!(drain(&mut h.events).is_empty());
}

#[tokio::test]
async fn connect_replaces_active_session() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut first = h.ends.next().await.unwrap();

	h.bridge.connect("ws://engine.test:9000").await.unwrap();
	let second = h.ends.next().await.unwrap();
	first.closed_by_client().await;

	assert_eq!(statuses(&drain(&mut h.events)), vec![true, false, true]);
	assert_eq!(second.endpoint(), "ws://engine.test:9000");
	assert_eq!(h.bridge.endpoint().as_deref(), Some("ws://engine.test:9000"));
	assert!(second.push(r#"{"type":"status","fps":30}"#));
	assert_eq!(next_status(&mut h.events).await.frame_rate, 30.0);
}

#[tokio::test]
async fn failed_replacement_reports_teardown_then_failure() {
	let mut h = harness(quiet().with_auto_reconnect(false));
	h.bridge.connect(ENDPOINT).await.unwrap();
	let mut first = h.ends.next().await.unwrap();

	h.connector.refuse_next(1);
	let outcome = h.bridge.connect("ws://engine.test:9000").await.unwrap();
	assert!(!outcome.is_connected());
	first.closed_by_client().await;

	assert_eq!(statuses(&drain(&mut h.events)), vec![true, false, false]);
	assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
	assert_eq!(h.connector.attempt_count(), 2);
}

/// Sender whose close blocks until released, so teardown can be observed.
struct GatedSender {
	closing: Arc<Notify>,
	release: Arc<Notify>,
}

#[async_trait]
impl FrameSender for GatedSender {
	async fn send(&mut self, _text: &str) -> Result<()> {
		Ok(())
	}

	async fn close(&mut self) -> Result<()> {
		self.closing.notify_one();
		self.release.notified().await;
		Ok(())
	}

	fn is_open(&self) -> bool {
		true
	}
}

struct IdleReceiver;

#[async_trait]
impl FrameReceiver for IdleReceiver {
	async fn recv(&mut self) -> Result<Frame> {
		std::future::pending::<Result<Frame>>().await
	}
}

struct GatedConnector {
	closing: Arc<Notify>,
	release: Arc<Notify>,
}

#[async_trait]
impl Connector for GatedConnector {
	async fn connect(&self, _endpoint: &str) -> Result<TransportParts> {
		Ok(TransportParts {
			sender: Box::new(GatedSender {
				closing: Arc::clone(&self.closing),
				release: Arc::clone(&self.release),
			}),
			receiver: Box::new(IdleReceiver),
		})
	}
}

#[tokio::test]
async fn disconnect_is_closing_while_tearing_down() {
	let closing = Arc::new(Notify::new());
	let release = Arc::new(Notify::new());
	let connector = GatedConnector {
		closing: Arc::clone(&closing),
		release: Arc::clone(&release),
	};
	let bridge = SessionBridge::new(Arc::new(connector), quiet());
	let mut events = bridge.subscribe();
	assert!(bridge.connect(ENDPOINT).await.unwrap().is_connected());
	drain(&mut events);

	let task = tokio::spawn({
		let bridge = bridge.clone();
		async move { bridge.disconnect().await }
	});
	closing.notified().await;
	assert_eq!(bridge.state(), ConnectionState::Closing);
	assert_eq!(bridge.snapshot().connection_state, ConnectionState::Closing);
	assert!(bridge.send_command("status").await.unwrap_err().is_not_connected());
	assert!(drain(&mut events).is_empty());

	release.notify_one();
	task.await.unwrap();
	assert_eq!(bridge.state(), ConnectionState::Disconnected);
	let last = drain(&mut events);
	assert_eq!(statuses(&last), vec![false]);
	assert_eq!(last[0].as_status().unwrap().connection_state, ConnectionState::Disconnected);
}

#[tokio::test]
async fn stale_loss_report_is_ignored() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let _remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	Arc::clone(&h.bridge.inner)
		.handle_connection_lost(0, "from an older session".to_string())
		.await;
	assert_eq!(h.bridge.state(), ConnectionState::Connected);
	assert!(drain(&mut h.events).is_empty());
}

#[tokio::test(start_paused = true)]
async fn backoff_schedule_then_exhaustion() {
	let mut h = harness(quiet());
	h.connector.set_refusing(true);

	let outcome = h.bridge.connect(ENDPOINT).await.unwrap();
	assert!(matches!(outcome, ConnectOutcome::Failed { .. }));
	assert_eq!(h.bridge.state(), ConnectionState::Reconnecting);

	let connector = h.connector.clone();
	wait_until(|| connector.attempt_count() >= 6).await;
	tokio::time::sleep(Duration::from_secs(300)).await;

	let attempts = h.connector.attempts();
	assert_eq!(attempts.len(), 6, "a sixth failure must not schedule another retry");
	let gaps: Vec<u64> = attempts
		.windows(2)
		.map(|pair| (pair[1].at - pair[0].at).as_secs())
		.collect();
	assert_eq!(gaps, vec![5, 10, 15, 20, 25]);
	assert_eq!(h.bridge.state(), ConnectionState::Disconnected);

	// Every failed attempt reports disconnection.
	assert_eq!(statuses(&drain(&mut h.events)), vec![false; 6]);
}

#[tokio::test(start_paused = true)]
async fn disconnect_cancels_pending_reconnect() {
	let mut h = harness(quiet());
	h.connector.set_refusing(true);

	h.bridge.connect(ENDPOINT).await.unwrap();
	assert_eq!(h.bridge.state(), ConnectionState::Reconnecting);
	drain(&mut h.events);

	h.bridge.disconnect().await;
	assert_eq!(h.bridge.state(), ConnectionState::Disconnected);
	assert_eq!(statuses(&drain(&mut h.events)), vec![false]);

	tokio::time::sleep(Duration::from_secs(120)).await;
	assert_eq!(h.connector.attempt_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn caller_connect_supersedes_pending_wait() {
	let mut h = harness(quiet());
	h.connector.refuse_next(1);

	let first = h.bridge.connect(ENDPOINT).await.unwrap();
	assert!(!first.is_connected());
	let second = h.bridge.connect(ENDPOINT).await.unwrap();
	assert!(second.is_connected());
	let _remote = h.ends.next().await.unwrap();

	tokio::time::sleep(Duration::from_secs(60)).await;
	assert_eq!(h.connector.attempt_count(), 2);
	assert_eq!(h.bridge.state(), ConnectionState::Connected);
	assert_eq!(statuses(&drain(&mut h.events)), vec![false, true]);
}

#[tokio::test(start_paused = true)]
async fn connection_loss_reconnects_after_first_step() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	let lost_at = tokio::time::Instant::now();
	remote.close(Some("engine restarting"));

	let snapshot = next_status(&mut h.events).await;
	assert!(!snapshot.is_connected);

	let _again = h.ends.next().await.unwrap();
	let snapshot = next_status(&mut h.events).await;
	assert!(snapshot.is_connected);
	assert_eq!(h.bridge.state(), ConnectionState::Connected);
	assert_eq!(h.bridge.reconnect_attempt(), 0);

	let attempts = h.connector.attempts();
	assert_eq!(attempts.len(), 2);
	assert_eq!((attempts[1].at - lost_at).as_secs(), 5);
}

#[tokio::test(start_paused = true)]
async fn read_error_is_handled_like_close() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	drain(&mut h.events);

	assert!(remote.push(r#"{"type":"status","scene":"Lobby","avatar_count":3}"#));
	assert_eq!(next_status(&mut h.events).await.avatar_count, 3);

	let lost_at = tokio::time::Instant::now();
	remote.fail("connection reset");

	let snapshot = next_status(&mut h.events).await;
	assert!(!snapshot.is_connected);
	assert_eq!(snapshot.avatar_count, 0);
	assert_eq!(snapshot.current_scene, None);

	let _again = h.ends.next().await.unwrap();
	let snapshot = next_status(&mut h.events).await;
	assert!(snapshot.is_connected);
	assert_eq!(h.bridge.reconnect_attempt(), 0);

	let attempts = h.connector.attempts();
	assert_eq!(attempts.len(), 2);
	assert_eq!((attempts[1].at - lost_at).as_secs(), 5);
}

#[tokio::test(start_paused = true)]
async fn failing_retry_keeps_counting() {
	let mut h = harness(quiet());
	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	h.connector.refuse_next(2);
	remote.close(None);

	let _again = h.ends.next().await.unwrap();
	let attempts = h.connector.attempts();
	assert_eq!(attempts.len(), 4);
	let gaps: Vec<u64> = attempts[1..]
		.windows(2)
		.map(|pair| (pair[1].at - pair[0].at).as_secs())
		.collect();
	assert_eq!(gaps, vec![10, 15]);

	wait_until(|| h.bridge.state() == ConnectionState::Connected).await;
	assert_eq!(h.bridge.reconnect_attempt(), 0);
	drain(&mut h.events);
}

#[tokio::test]
async fn failing_handlers_are_isolated() {
	let mut h = harness(quiet());
	let seen = Arc::new(Mutex::new(Vec::new()));

	let _panics = h.bridge.on_status_changed(|snapshot| async move {
		assert!(!snapshot.is_connected, "status handler exploded");
		Ok(())
	});
	let _errors = h
		.bridge
		.on_scene_updated(|_| async { Err(Error::TransportError("handler refused".into())) });
	let seen_clone = Arc::clone(&seen);
	let _records = h.bridge.on_scene_updated(move |event| {
		let seen = Arc::clone(&seen_clone);
		async move {
			seen.lock().push(event.update_type);
			Ok(())
		}
	});

	h.bridge.connect(ENDPOINT).await.unwrap();
	let remote = h.ends.next().await.unwrap();
	remote.push(r#"{"type":"scene_update","scene":"Lobby","update_type":"AvatarSpawned"}"#);
	remote.push(r#"{"type":"scene_update","scene":"Lobby","update_type":"AvatarRemoved"}"#);
	next_event(&mut h.events, |e| e.as_scene().is_some_and(|s| s.update_type == "AvatarRemoved")).await;

	tokio::time::timeout(Duration::from_secs(1), async {
		while seen.lock().len() < 2 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();
	assert_eq!(*seen.lock(), vec!["AvatarSpawned".to_string(), "AvatarRemoved".to_string()]);
	assert_eq!(h.bridge.state(), ConnectionState::Connected);
}

#[tokio::test]
async fn dropped_subscription_stops_delivery() {
	let mut h = harness(quiet());
	let seen = Arc::new(Mutex::new(0usize));
	let seen_clone = Arc::clone(&seen);
	let sub = h.bridge.on_event(move |_| {
		let seen = Arc::clone(&seen_clone);
		async move {
			*seen.lock() += 1;
			Ok(())
		}
	});
	drop(sub);

	h.bridge.connect(ENDPOINT).await.unwrap();
	next_status(&mut h.events).await;
	tokio::task::yield_now().await;
	assert_eq!(*seen.lock(), 0);
}

#[tokio::test]
async fn wait_for_event_times_out() {
	let h = harness(quiet());
	let err = h
		.bridge
		.wait_for_event(|e| e.as_scene().is_some(), Duration::from_millis(10))
		.await
		.unwrap_err();
	assert!(matches!(err, Error::Timeout(_)));
}
