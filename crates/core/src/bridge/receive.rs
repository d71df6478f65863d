use std::sync::Weak;

use scenelink_runtime::{Frame, FrameReceiver};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{Inner, TARGET};

/// Receive loop for session `generation`.
///
/// Reads one frame at a time until cancelled or the channel ends. On a close
/// or read error it reports the loss from a separate task and exits, so a
/// teardown waiting on this task never waits on itself.
pub(super) async fn run(
	inner: Weak<Inner>,
	mut receiver: Box<dyn FrameReceiver>,
	cancel: CancellationToken,
	generation: u64,
) {
	debug!(target: TARGET, generation, "receive loop started");
	loop {
		let frame = tokio::select! {
			biased;
			_ = cancel.cancelled() => {
				debug!(target: TARGET, generation, "receive loop cancelled");
				return;
			}
			frame = receiver.recv() => frame,
		};

		let Some(inner) = inner.upgrade() else {
			return;
		};

		let reason = match frame {
			Ok(Frame::Text(text)) => {
				inner.dispatch_frame(&text);
				continue;
			}
			Ok(Frame::Close(reason)) => {
				info!(target: TARGET, generation, reason = reason.as_deref().unwrap_or(""), "engine closed the connection");
				reason.unwrap_or_else(|| "closed by engine".to_string())
			}
			Err(err) => err.to_string(),
		};

		if cancel.is_cancelled() {
			return;
		}
		tokio::spawn(inner.handle_connection_lost(generation, reason));
		return;
	}
}
