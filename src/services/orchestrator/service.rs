//! Subscription orchestrator service.
//!
//! Owns the in-memory registry of live subscriptions and drives their
//! lifecycle: bulk load at startup, add and remove at runtime, teardown at
//! shutdown. Every mutation of the registry goes through one mutex, and no
//! lock is held across store or network calls. Order of operations on save is
//! fixed: resolve and test first, persist second, register live last, so a
//! failure at any step leaves no live-but-unpersisted subscription behind.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::{
	sync::{mpsc, Mutex},
	task::JoinHandle,
};
use url::Url;

use crate::{
	models::{Endpoint, Subscription},
	repositories::SubscriptionStore,
	services::{
		blockchain::{resolve, EventSource, SourceSubscription},
		orchestrator::{error::OrchestratorError, relay::spawn_relay},
		trigger::TriggerClient,
	},
};

/// Runtime record of a live subscription
///
/// Owned exclusively by the orchestrator and never persisted.
struct ActiveSubscription {
	subscription: Subscription,
	source: SourceSubscription,
	relay: JoinHandle<()>,
}

/// The subscription orchestrator
pub struct Service<S, T> {
	store: Arc<S>,
	trigger: Arc<T>,
	/// Live subscriptions by job id; at most one entry per job
	active: Mutex<HashMap<String, ActiveSubscription>>,
}

/// Stops the producer, then waits for the relay to drain and exit
async fn teardown(active: ActiveSubscription) {
	active.source.shutdown().await;
	if let Err(e) = active.relay.await {
		if e.is_panic() {
			tracing::error!("relay task panicked during teardown: {}", e);
		}
	}
}

fn validate_endpoint(endpoint: &Endpoint) -> Result<(), OrchestratorError> {
	if endpoint.name.is_empty() {
		return Err(OrchestratorError::invalid_configuration(
			"missing endpoint name",
		));
	}
	Url::parse(&endpoint.url)
		.map_err(|_| OrchestratorError::invalid_configuration("invalid endpoint URL"))?;
	Ok(())
}

impl<S, T> Service<S, T>
where
	S: SubscriptionStore + 'static,
	T: TriggerClient + 'static,
{
	/// Creates a new orchestrator over the given store and trigger client
	pub fn new(store: Arc<S>, trigger: Arc<T>) -> Self {
		Service {
			store,
			trigger,
			active: Mutex::new(HashMap::new()),
		}
	}

	/// Loads all persisted subscriptions and brings each one live
	///
	/// A failure for one subscription is logged and skipped; the batch never
	/// aborts.
	pub async fn run(&self) -> Result<(), OrchestratorError> {
		let subscriptions = self.store.load_subscriptions().await?;
		tracing::info!(count = subscriptions.len(), "loading persisted subscriptions");

		for subscription in subscriptions {
			let job_id = subscription.job_id.clone();
			if let Err(e) = self.bring_live(subscription).await {
				tracing::error!(job_id = %job_id, "failed to bring subscription live: {}", e);
			}
		}
		Ok(())
	}

	/// Validates, tests, persists and registers a new subscription, in that
	/// order
	pub async fn save_subscription(
		&self,
		subscription: Subscription,
	) -> Result<(), OrchestratorError> {
		if subscription.job_id.is_empty() {
			return Err(OrchestratorError::invalid_configuration("missing job id"));
		}

		{
			let active = self.active.lock().await;
			if active.contains_key(&subscription.job_id) {
				return Err(OrchestratorError::AlreadySubscribed(
					subscription.job_id.clone(),
				));
			}
		}

		let source = self.resolve_and_test(&subscription).await?;
		self.store.save_subscription(&subscription).await?;

		match self.register(subscription.clone(), source).await {
			Ok(()) => Ok(()),
			Err(e) => {
				// The record was persisted but never came live; undo it
				if let Err(rollback) = self.store.delete_subscription(&subscription).await {
					tracing::error!(
						job_id = %subscription.job_id,
						"failed to roll back subscription record: {}",
						rollback
					);
				}
				Err(e)
			}
		}
	}

	/// Unsubscribes (when live) and deletes the subscription for a job
	pub async fn delete_job(&self, job_id: &str) -> Result<(), OrchestratorError> {
		let live = { self.active.lock().await.remove(job_id) };
		let was_live = live.is_some();

		let subscription = match live {
			Some(active) => {
				let subscription = active.subscription.clone();
				teardown(active).await;
				subscription
			}
			None => self.store.load_subscription(job_id).await.map_err(|e| {
				if e.is_not_found() {
					OrchestratorError::NotFound(format!("job {}", job_id))
				} else {
					OrchestratorError::Store(e)
				}
			})?,
		};

		match self.store.delete_subscription(&subscription).await {
			Ok(()) => {}
			// A live entry without a record has nothing left to delete
			Err(e) if was_live && e.is_not_found() => {}
			Err(e) => return Err(e.into()),
		}

		tracing::info!(job_id = %job_id, "subscription deleted");
		Ok(())
	}

	/// Validates and upserts an endpoint
	pub async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<(), OrchestratorError> {
		validate_endpoint(endpoint)?;
		self.store.save_endpoint(endpoint).await?;
		Ok(())
	}

	/// Returns the endpoint with the given name
	pub async fn get_endpoint(&self, name: &str) -> Result<Endpoint, OrchestratorError> {
		let endpoint = self.store.load_endpoint(name).await.map_err(|e| {
			if e.is_not_found() {
				OrchestratorError::NotFound(format!("endpoint {}", name))
			} else {
				OrchestratorError::Store(e)
			}
		})?;
		if endpoint.name != name {
			return Err(OrchestratorError::NotFound(format!("endpoint {}", name)));
		}
		Ok(endpoint)
	}

	/// Deletes an endpoint, tearing down and deleting every subscription
	/// referencing it first
	pub async fn delete_endpoint(&self, name: &str) -> Result<(), OrchestratorError> {
		let doomed: Vec<ActiveSubscription> = {
			let mut active = self.active.lock().await;
			let jobs: Vec<String> = active
				.iter()
				.filter(|(_, a)| a.subscription.endpoint_name == name)
				.map(|(job_id, _)| job_id.clone())
				.collect();
			jobs.into_iter().filter_map(|job| active.remove(&job)).collect()
		};

		for active in doomed {
			tracing::info!(
				job_id = %active.subscription.job_id,
				endpoint = %name,
				"tearing down subscription of deleted endpoint"
			);
			teardown(active).await;
		}

		self.store.delete_endpoint(name).await.map_err(|e| {
			if e.is_not_found() {
				OrchestratorError::NotFound(format!("endpoint {}", name))
			} else {
				OrchestratorError::Store(e)
			}
		})
	}

	/// Tears down every live subscription and closes the store
	///
	/// Called exactly once, at process shutdown.
	pub async fn close(&self) {
		let entries: Vec<ActiveSubscription> = {
			let mut active = self.active.lock().await;
			active.drain().map(|(_, entry)| entry).collect()
		};

		for active in entries {
			tracing::info!(job_id = %active.subscription.job_id, "closing subscription");
			teardown(active).await;
		}

		if let Err(e) = self.store.close().await {
			tracing::error!("failed to close store: {}", e);
		}
		tracing::info!("all subscriptions closed");
	}

	/// Returns the job ids of all currently-live subscriptions
	pub async fn active_jobs(&self) -> Vec<String> {
		self.active.lock().await.keys().cloned().collect()
	}

	/// Resolves the subscription's endpoint to an event source and runs the
	/// liveness test; no lock is held across these calls
	async fn resolve_and_test(
		&self,
		subscription: &Subscription,
	) -> Result<Box<dyn EventSource + Send>, OrchestratorError> {
		let endpoint = self.store.load_endpoint(&subscription.endpoint_name).await?;
		let source = resolve(&endpoint, &subscription.filter)?;
		source.test().await?;
		Ok(source)
	}

	/// Checks for a duplicate, then resolves, tests and registers
	async fn bring_live(&self, subscription: Subscription) -> Result<(), OrchestratorError> {
		{
			let active = self.active.lock().await;
			if active.contains_key(&subscription.job_id) {
				return Err(OrchestratorError::AlreadySubscribed(
					subscription.job_id.clone(),
				));
			}
		}
		let source = self.resolve_and_test(&subscription).await?;
		self.register(subscription, source).await
	}

	/// Starts the producer and relay for a tested subscription and records
	/// it in the registry
	async fn register(
		&self,
		subscription: Subscription,
		source: Box<dyn EventSource + Send>,
	) -> Result<(), OrchestratorError> {
		let job_id = subscription.job_id.clone();

		// Capacity one: the producer blocks until the relay accepts, which
		// bounds memory and backpressures the feed against the trigger client
		let (events_tx, events_rx) = mpsc::channel(1);
		let live = source.subscribe(events_tx).await?;
		let relay = spawn_relay(job_id.clone(), events_rx, self.trigger.clone());

		{
			let mut active = self.active.lock().await;
			if !active.contains_key(&job_id) {
				active.insert(
					job_id.clone(),
					ActiveSubscription {
						subscription,
						source: live,
						relay,
					},
				);
				tracing::info!(job_id = %job_id, "subscription live");
				return Ok(());
			}
		}

		// Lost a race with a concurrent save for the same job
		live.shutdown().await;
		relay.abort();
		Err(OrchestratorError::AlreadySubscribed(job_id))
	}
}

/// The administrative operations exposed to the HTTP surface
#[async_trait]
pub trait SubscriptionManager: Send + Sync {
	async fn save_subscription(&self, subscription: Subscription)
		-> Result<(), OrchestratorError>;
	async fn delete_job(&self, job_id: &str) -> Result<(), OrchestratorError>;
	async fn get_endpoint(&self, name: &str) -> Result<Endpoint, OrchestratorError>;
	async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<(), OrchestratorError>;
}

#[async_trait]
impl<S, T> SubscriptionManager for Service<S, T>
where
	S: SubscriptionStore + 'static,
	T: TriggerClient + 'static,
{
	async fn save_subscription(
		&self,
		subscription: Subscription,
	) -> Result<(), OrchestratorError> {
		Service::save_subscription(self, subscription).await
	}

	async fn delete_job(&self, job_id: &str) -> Result<(), OrchestratorError> {
		Service::delete_job(self, job_id).await
	}

	async fn get_endpoint(&self, name: &str) -> Result<Endpoint, OrchestratorError> {
		Service::get_endpoint(self, name).await
	}

	async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<(), OrchestratorError> {
		Service::save_endpoint(self, endpoint).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		models::{ChainFilter, ChainKind, Event},
		repositories::FileStore,
		services::trigger::TriggerError,
	};
	use serde_json::json;
	use std::sync::Mutex as StdMutex;

	/// Trigger client recording deliveries
	struct RecordingTrigger {
		delivered: StdMutex<Vec<(String, Event)>>,
	}

	impl RecordingTrigger {
		fn new() -> Self {
			RecordingTrigger {
				delivered: StdMutex::new(Vec::new()),
			}
		}

		fn delivered(&self) -> Vec<(String, Event)> {
			self.delivered.lock().unwrap().clone()
		}
	}

	#[async_trait]
	impl TriggerClient for RecordingTrigger {
		async fn trigger_job(&self, job_id: &str, event: &Event) -> Result<(), TriggerError> {
			self.delivered
				.lock()
				.unwrap()
				.push((job_id.to_string(), event.clone()));
			Ok(())
		}
	}

	/// Endpoint with a long poll interval, so only the immediate first poll
	/// lands inside a test
	fn endpoint_for(server: &mockito::Server) -> Endpoint {
		Endpoint {
			name: "eth-main".to_string(),
			url: server.url(),
			kind: ChainKind::Ethereum,
			refresh_interval_secs: 600,
		}
	}

	fn subscription(job_id: &str) -> Subscription {
		Subscription {
			reference_id: format!("ref-{}", job_id),
			job_id: job_id.to_string(),
			endpoint_name: "eth-main".to_string(),
			filter: ChainFilter::Ethereum {
				addresses: vec!["0xabc".to_string()],
				topics: vec![],
			},
		}
	}

	/// Mounts liveness and poll mocks for an Ethereum endpoint
	async fn mount_eth_mocks(server: &mut mockito::Server, logs: serde_json::Value) {
		server
			.mock("POST", "/")
			.match_body(mockito::Matcher::PartialJson(
				json!({"method": "eth_blockNumber"}),
			))
			.with_status(200)
			.with_body(r#"{"jsonrpc":"2.0","id":1,"result":"0x10"}"#)
			.expect_at_least(1)
			.create_async()
			.await;
		server
			.mock("POST", "/")
			.match_body(mockito::Matcher::PartialJson(json!({"method": "eth_getLogs"})))
			.with_status(200)
			.with_body(json!({"jsonrpc": "2.0", "id": 1, "result": logs}).to_string())
			.expect_at_least(1)
			.create_async()
			.await;
	}

	async fn service_with_endpoint(
		server: &mockito::Server,
		temp_dir: &tempfile::TempDir,
	) -> (Service<FileStore, RecordingTrigger>, Arc<RecordingTrigger>) {
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		let trigger = Arc::new(RecordingTrigger::new());
		let service = Service::new(store, trigger.clone());
		service.save_endpoint(&endpoint_for(server)).await.unwrap();
		(service, trigger)
	}

	#[tokio::test]
	async fn test_save_subscription_tests_persists_and_registers() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;

		service.save_subscription(subscription("job-1")).await.unwrap();

		assert_eq!(service.active_jobs().await, vec!["job-1".to_string()]);
		let persisted = service.store.load_subscriptions().await.unwrap();
		assert_eq!(persisted.len(), 1);

		service.close().await;
	}

	#[tokio::test]
	async fn test_duplicate_job_is_rejected_without_disturbing_the_live_one() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;

		service.save_subscription(subscription("job-1")).await.unwrap();

		let error = service
			.save_subscription(subscription("job-1"))
			.await
			.unwrap_err();
		assert!(matches!(error, OrchestratorError::AlreadySubscribed(_)));

		// The original entry and record are untouched
		assert_eq!(service.active_jobs().await.len(), 1);
		assert_eq!(service.store.load_subscriptions().await.unwrap().len(), 1);

		service.close().await;
	}

	#[tokio::test]
	async fn test_unreachable_endpoint_is_rejected_before_persisting() {
		let mut server = mockito::Server::new_async().await;
		server
			.mock("POST", "/")
			.with_status(502)
			.create_async()
			.await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;

		let error = service
			.save_subscription(subscription("job-1"))
			.await
			.unwrap_err();
		assert!(error.is_bad_request());

		assert!(service.active_jobs().await.is_empty());
		assert!(service.store.load_subscriptions().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_missing_job_id_is_rejected_before_any_io() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		let service = Service::new(store, Arc::new(RecordingTrigger::new()));

		let error = service.save_subscription(subscription("")).await.unwrap_err();
		assert!(matches!(error, OrchestratorError::InvalidConfiguration(_)));
	}

	#[tokio::test]
	async fn test_delete_job_stops_transport_and_removes_record() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;

		service.save_subscription(subscription("job-1")).await.unwrap();
		service.delete_job("job-1").await.unwrap();

		assert!(service.active_jobs().await.is_empty());
		assert!(service.store.load_subscriptions().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_delete_unknown_job_is_not_found() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		let service = Service::new(store, Arc::new(RecordingTrigger::new()));

		let error = service.delete_job("no-such-job").await.unwrap_err();
		assert!(error.is_not_found());
	}

	#[tokio::test]
	async fn test_delete_job_that_is_persisted_but_not_live() {
		let server = mockito::Server::new_async().await;
		let temp_dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		store.save_endpoint(&endpoint_for(&server)).await.unwrap();
		store.save_subscription(&subscription("job-1")).await.unwrap();

		let service = Service::new(store.clone(), Arc::new(RecordingTrigger::new()));
		service.delete_job("job-1").await.unwrap();
		assert!(store.load_subscriptions().await.unwrap().is_empty());
	}

	#[tokio::test]
	async fn test_run_revives_persisted_subscriptions() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();

		{
			let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;
			service.save_subscription(subscription("job-1")).await.unwrap();
			service.close().await;
		}

		// A fresh orchestrator over the same store reproduces the live
		// subscription with the same filter payload
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		let service = Service::new(store, Arc::new(RecordingTrigger::new()));
		service.run().await.unwrap();

		assert_eq!(service.active_jobs().await, vec!["job-1".to_string()]);
		service.close().await;
	}

	#[tokio::test]
	async fn test_run_skips_broken_subscriptions_and_continues() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));

		store.save_endpoint(&endpoint_for(&server)).await.unwrap();
		// One subscription points at an endpoint that will vanish
		store
			.save_endpoint(&Endpoint {
				name: "dead".to_string(),
				url: "http://127.0.0.1:1".to_string(),
				kind: ChainKind::Ethereum,
				refresh_interval_secs: 600,
			})
			.await
			.unwrap();
		store.save_subscription(&subscription("job-ok")).await.unwrap();
		store
			.save_subscription(&Subscription {
				endpoint_name: "dead".to_string(),
				..subscription("job-dead")
			})
			.await
			.unwrap();

		let service = Service::new(store, Arc::new(RecordingTrigger::new()));
		service.run().await.unwrap();

		// Partial success: the healthy subscription is live
		assert_eq!(service.active_jobs().await, vec!["job-ok".to_string()]);
		service.close().await;
	}

	#[tokio::test]
	async fn test_events_reach_the_trigger_client() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(
			&mut server,
			json!([{"address": "0xabc", "logIndex": "0x0"}]),
		)
		.await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, trigger) = service_with_endpoint(&server, &temp_dir).await;

		service.save_subscription(subscription("job-1")).await.unwrap();

		// One poll, one log, one run trigger (after the startup grace)
		let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(5);
		while trigger.delivered().is_empty() && tokio::time::Instant::now() < deadline {
			tokio::time::sleep(std::time::Duration::from_millis(50)).await;
		}

		let delivered = trigger.delivered();
		assert_eq!(delivered.len(), 1);
		assert_eq!(delivered[0].0, "job-1");
		assert_eq!(delivered[0].1.as_value()["address"], "0xabc");

		service.close().await;
	}

	#[tokio::test]
	async fn test_endpoint_validation() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		let service = Service::new(store, Arc::new(RecordingTrigger::new()));

		let error = service
			.save_endpoint(&Endpoint {
				name: String::new(),
				url: "http://node".to_string(),
				kind: ChainKind::Ethereum,
				refresh_interval_secs: 0,
			})
			.await
			.unwrap_err();
		assert!(matches!(error, OrchestratorError::InvalidConfiguration(_)));

		let error = service
			.save_endpoint(&Endpoint {
				name: "bad-url".to_string(),
				url: "not a url".to_string(),
				kind: ChainKind::Ethereum,
				refresh_interval_secs: 0,
			})
			.await
			.unwrap_err();
		assert!(matches!(error, OrchestratorError::InvalidConfiguration(_)));
	}

	#[tokio::test]
	async fn test_get_endpoint_not_found() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = Arc::new(FileStore::new(temp_dir.path().to_path_buf()));
		let service = Service::new(store, Arc::new(RecordingTrigger::new()));

		let error = service.get_endpoint("missing").await.unwrap_err();
		assert!(error.is_not_found());
	}

	#[tokio::test]
	async fn test_delete_endpoint_cascades_to_live_subscriptions() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;

		service.save_subscription(subscription("job-a")).await.unwrap();
		service.save_subscription(subscription("job-b")).await.unwrap();

		service.delete_endpoint("eth-main").await.unwrap();

		assert!(service.active_jobs().await.is_empty());
		assert!(service.store.load_subscriptions().await.unwrap().is_empty());
		assert!(service.get_endpoint("eth-main").await.unwrap_err().is_not_found());
	}

	#[tokio::test]
	async fn test_close_tears_down_everything() {
		let mut server = mockito::Server::new_async().await;
		mount_eth_mocks(&mut server, json!([])).await;
		let temp_dir = tempfile::tempdir().unwrap();
		let (service, _trigger) = service_with_endpoint(&server, &temp_dir).await;

		service.save_subscription(subscription("job-a")).await.unwrap();
		service.save_subscription(subscription("job-b")).await.unwrap();

		service.close().await;
		assert!(service.active_jobs().await.is_empty());

		// Records survive shutdown; only explicit deletes remove them
		assert_eq!(service.store.load_subscriptions().await.unwrap().len(), 2);
	}
}
