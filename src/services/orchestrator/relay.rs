//! Per-subscription event relay loop.
//!
//! One relay task runs per live subscription as the only consumer of its
//! event channel. Events are delivered to the trigger client in the order the
//! transport produced them, one delivery in flight at a time. A failed
//! delivery is logged and the loop continues; the loop only exits when the
//! channel closes during teardown.

use std::{sync::Arc, time::Duration};

use tokio::{sync::mpsc, task::JoinHandle};

use crate::{models::Event, services::trigger::TriggerClient};

/// Delay before the first delivery, so the consumer can finish its own
/// startup before run triggers arrive
const STARTUP_GRACE: Duration = Duration::from_secs(1);

/// Spawns the relay loop for one subscription
pub fn spawn_relay<T: TriggerClient + 'static>(
	job_id: String,
	mut events: mpsc::Receiver<Event>,
	trigger: Arc<T>,
) -> JoinHandle<()> {
	tokio::spawn(async move {
		tokio::time::sleep(STARTUP_GRACE).await;

		while let Some(event) = events.recv().await {
			if let Err(e) = trigger.trigger_job(&job_id, &event).await {
				// Non-fatal: the subscription stays live and keeps relaying
				tracing::error!(job_id = %job_id, "failed to deliver run trigger: {}", e);
			}
		}

		tracing::debug!(job_id = %job_id, "event channel closed, relay exiting");
	})
}
