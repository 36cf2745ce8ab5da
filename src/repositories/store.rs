//! Subscription and endpoint record storage.
//!
//! Defines the storage contract consumed by the orchestrator and a
//! file-backed implementation that keeps all records in a single JSON
//! document under a data directory. Every operation is a load-modify-save
//! pass serialized through an internal mutex, so the store is safe for
//! concurrent use from administrative handlers and the startup path.

use std::path::PathBuf;

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
	models::{Endpoint, Subscription},
	repositories::error::RepositoryError,
};

/// Interface for subscription and endpoint persistence
///
/// Implementations must be safe for concurrent use; callers never hold any
/// orchestrator lock across these calls.
#[async_trait]
pub trait SubscriptionStore: Send + Sync {
	/// Returns all live (not soft-deleted) subscriptions
	async fn load_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError>;

	/// Returns the live subscription for the given job id
	async fn load_subscription(&self, job_id: &str) -> Result<Subscription, RepositoryError>;

	/// Persists a subscription after verifying its endpoint exists
	async fn save_subscription(&self, subscription: &Subscription) -> Result<(), RepositoryError>;

	/// Soft-deletes the subscription
	async fn delete_subscription(
		&self,
		subscription: &Subscription,
	) -> Result<(), RepositoryError>;

	/// Returns the live endpoint with the given name
	async fn load_endpoint(&self, name: &str) -> Result<Endpoint, RepositoryError>;

	/// Upserts an endpoint by name, restoring it if it was soft-deleted
	async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<(), RepositoryError>;

	/// Soft-deletes the endpoint and every subscription referencing it
	async fn delete_endpoint(&self, name: &str) -> Result<(), RepositoryError>;

	/// Soft-deletes every endpoint whose name is not in `names`
	async fn delete_all_endpoints_except(&self, names: &[String]) -> Result<(), RepositoryError>;

	/// Releases the store
	async fn close(&self) -> Result<(), RepositoryError>;
}

/// A persisted endpoint with its lifecycle stamp
#[derive(Debug, Clone, Serialize, Deserialize)]
struct EndpointRecord {
	#[serde(flatten)]
	endpoint: Endpoint,
	/// Unix timestamp of the soft delete; live records carry no stamp
	#[serde(default, skip_serializing_if = "Option::is_none")]
	deleted_at: Option<i64>,
}

/// A persisted subscription with its lifecycle stamp
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SubscriptionRecord {
	#[serde(flatten)]
	subscription: Subscription,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	deleted_at: Option<i64>,
}

/// The full persisted state
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreDocument {
	#[serde(default)]
	endpoints: Vec<EndpointRecord>,
	#[serde(default)]
	subscriptions: Vec<SubscriptionRecord>,
}

impl StoreDocument {
	fn live_endpoint(&self, name: &str) -> Option<&EndpointRecord> {
		self.endpoints
			.iter()
			.find(|r| r.endpoint.name == name && r.deleted_at.is_none())
	}
}

/// File-backed implementation of the subscription store
///
/// Records live in `records.json` inside the configured data directory. The
/// directory is created on first write.
pub struct FileStore {
	storage_path: PathBuf,
	/// Serializes load-modify-save passes
	write_lock: Mutex<()>,
}

const RECORDS_FILE: &str = "records.json";

impl FileStore {
	/// Creates a new file-backed store rooted at the given directory
	pub fn new(storage_path: PathBuf) -> Self {
		FileStore {
			storage_path,
			write_lock: Mutex::new(()),
		}
	}

	async fn load_document(&self) -> Result<StoreDocument, RepositoryError> {
		let file_path = self.storage_path.join(RECORDS_FILE);
		if !file_path.exists() {
			return Ok(StoreDocument::default());
		}

		let content = tokio::fs::read_to_string(&file_path)
			.await
			.map_err(|e| RepositoryError::storage("failed to read records", e))?;
		if content.trim().is_empty() {
			return Ok(StoreDocument::default());
		}

		Ok(serde_json::from_str(&content)?)
	}

	async fn save_document(&self, document: &StoreDocument) -> Result<(), RepositoryError> {
		if !self.storage_path.exists() {
			tokio::fs::create_dir_all(&self.storage_path)
				.await
				.map_err(|e| RepositoryError::storage("failed to create data directory", e))?;
		}

		let file_path = self.storage_path.join(RECORDS_FILE);
		let json = serde_json::to_string_pretty(document)?;
		tokio::fs::write(&file_path, json)
			.await
			.map_err(|e| RepositoryError::storage("failed to write records", e))
	}

	/// Marks the endpoint and every subscription referencing it as deleted.
	/// Returns false when no live endpoint matched.
	fn mark_endpoint_deleted(document: &mut StoreDocument, name: &str, now: i64) -> bool {
		let mut found = false;
		for record in &mut document.endpoints {
			if record.endpoint.name == name && record.deleted_at.is_none() {
				record.deleted_at = Some(now);
				found = true;
			}
		}
		if found {
			for record in &mut document.subscriptions {
				if record.subscription.endpoint_name == name && record.deleted_at.is_none() {
					record.deleted_at = Some(now);
				}
			}
		}
		found
	}
}

#[async_trait]
impl SubscriptionStore for FileStore {
	async fn load_subscriptions(&self) -> Result<Vec<Subscription>, RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let document = self.load_document().await?;
		Ok(document
			.subscriptions
			.iter()
			.filter(|r| r.deleted_at.is_none())
			.map(|r| r.subscription.clone())
			.collect())
	}

	async fn load_subscription(&self, job_id: &str) -> Result<Subscription, RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let document = self.load_document().await?;
		document
			.subscriptions
			.iter()
			.find(|r| r.subscription.job_id == job_id && r.deleted_at.is_none())
			.map(|r| r.subscription.clone())
			.ok_or_else(|| RepositoryError::not_found("subscription", job_id))
	}

	async fn save_subscription(&self, subscription: &Subscription) -> Result<(), RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load_document().await?;

		if document.live_endpoint(&subscription.endpoint_name).is_none() {
			return Err(RepositoryError::MissingReference {
				entity: "subscription",
				referenced: "endpoint",
				key: subscription.endpoint_name.clone(),
			});
		}

		document.subscriptions.push(SubscriptionRecord {
			subscription: subscription.clone(),
			deleted_at: None,
		});
		self.save_document(&document).await
	}

	async fn delete_subscription(
		&self,
		subscription: &Subscription,
	) -> Result<(), RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load_document().await?;
		let now = Utc::now().timestamp();

		let mut found = false;
		for record in &mut document.subscriptions {
			if record.subscription.reference_id == subscription.reference_id
				&& record.deleted_at.is_none()
			{
				record.deleted_at = Some(now);
				found = true;
			}
		}
		if !found {
			return Err(RepositoryError::not_found(
				"subscription",
				&subscription.job_id,
			));
		}

		self.save_document(&document).await
	}

	async fn load_endpoint(&self, name: &str) -> Result<Endpoint, RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let document = self.load_document().await?;
		document
			.live_endpoint(name)
			.map(|r| r.endpoint.clone())
			.ok_or_else(|| RepositoryError::not_found("endpoint", name))
	}

	async fn save_endpoint(&self, endpoint: &Endpoint) -> Result<(), RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load_document().await?;

		// Upsert by name; re-saving restores a soft-deleted record
		match document
			.endpoints
			.iter_mut()
			.find(|r| r.endpoint.name == endpoint.name)
		{
			Some(record) => {
				record.endpoint = endpoint.clone();
				record.deleted_at = None;
			}
			None => document.endpoints.push(EndpointRecord {
				endpoint: endpoint.clone(),
				deleted_at: None,
			}),
		}

		self.save_document(&document).await
	}

	async fn delete_endpoint(&self, name: &str) -> Result<(), RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load_document().await?;

		if !Self::mark_endpoint_deleted(&mut document, name, Utc::now().timestamp()) {
			return Err(RepositoryError::not_found("endpoint", name));
		}

		self.save_document(&document).await
	}

	async fn delete_all_endpoints_except(&self, names: &[String]) -> Result<(), RepositoryError> {
		let _guard = self.write_lock.lock().await;
		let mut document = self.load_document().await?;
		let now = Utc::now().timestamp();

		let doomed: Vec<String> = document
			.endpoints
			.iter()
			.filter(|r| r.deleted_at.is_none() && !names.contains(&r.endpoint.name))
			.map(|r| r.endpoint.name.clone())
			.collect();

		for name in doomed {
			Self::mark_endpoint_deleted(&mut document, &name, now);
		}

		self.save_document(&document).await
	}

	async fn close(&self) -> Result<(), RepositoryError> {
		// Every operation flushes to disk; nothing is held open
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::models::{ChainFilter, ChainKind};

	fn test_endpoint(name: &str) -> Endpoint {
		Endpoint {
			name: name.to_string(),
			url: "http://node:8545".to_string(),
			kind: ChainKind::Ethereum,
			refresh_interval_secs: 5,
		}
	}

	fn test_subscription(job_id: &str, endpoint_name: &str) -> Subscription {
		Subscription {
			reference_id: format!("ref-{}", job_id),
			job_id: job_id.to_string(),
			endpoint_name: endpoint_name.to_string(),
			filter: ChainFilter::Ethereum {
				addresses: vec!["0xabc".to_string()],
				topics: vec![],
			},
		}
	}

	#[tokio::test]
	async fn test_save_and_load_endpoint() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();

		let loaded = store.load_endpoint("eth-main").await.unwrap();
		assert_eq!(loaded, test_endpoint("eth-main"));

		let missing = store.load_endpoint("unknown").await;
		assert!(missing.unwrap_err().is_not_found());
	}

	#[tokio::test]
	async fn test_save_endpoint_upserts_by_name() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();

		let mut updated = test_endpoint("eth-main");
		updated.url = "http://other:8545".to_string();
		store.save_endpoint(&updated).await.unwrap();

		let loaded = store.load_endpoint("eth-main").await.unwrap();
		assert_eq!(loaded.url, "http://other:8545");

		// Still a single record on disk
		let content = tokio::fs::read_to_string(temp_dir.path().join(RECORDS_FILE))
			.await
			.unwrap();
		let document: StoreDocument = serde_json::from_str(&content).unwrap();
		assert_eq!(document.endpoints.len(), 1);
	}

	#[tokio::test]
	async fn test_save_subscription_requires_endpoint() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		let result = store
			.save_subscription(&test_subscription("job-1", "missing"))
			.await;
		assert!(matches!(
			result,
			Err(RepositoryError::MissingReference { .. })
		));

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();
		store
			.save_subscription(&test_subscription("job-1", "eth-main"))
			.await
			.unwrap();

		let subs = store.load_subscriptions().await.unwrap();
		assert_eq!(subs.len(), 1);
		assert_eq!(subs[0].job_id, "job-1");
	}

	#[tokio::test]
	async fn test_subscription_round_trip_survives_reopen() {
		let temp_dir = tempfile::tempdir().unwrap();
		{
			let store = FileStore::new(temp_dir.path().to_path_buf());
			store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();
			store
				.save_subscription(&test_subscription("job-1", "eth-main"))
				.await
				.unwrap();
			store.close().await.unwrap();
		}

		let reopened = FileStore::new(temp_dir.path().to_path_buf());
		let subs = reopened.load_subscriptions().await.unwrap();
		assert_eq!(subs.len(), 1);
		assert_eq!(subs[0], test_subscription("job-1", "eth-main"));
	}

	#[tokio::test]
	async fn test_delete_subscription_is_soft() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();
		let sub = test_subscription("job-1", "eth-main");
		store.save_subscription(&sub).await.unwrap();

		store.delete_subscription(&sub).await.unwrap();

		assert!(store.load_subscription("job-1").await.unwrap_err().is_not_found());
		assert!(store.load_subscriptions().await.unwrap().is_empty());

		// The record is still on disk, just stamped
		let content = tokio::fs::read_to_string(temp_dir.path().join(RECORDS_FILE))
			.await
			.unwrap();
		let document: StoreDocument = serde_json::from_str(&content).unwrap();
		assert_eq!(document.subscriptions.len(), 1);
		assert!(document.subscriptions[0].deleted_at.is_some());
	}

	#[tokio::test]
	async fn test_delete_missing_subscription_fails() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		let result = store
			.delete_subscription(&test_subscription("job-1", "eth-main"))
			.await;
		assert!(result.unwrap_err().is_not_found());
	}

	#[tokio::test]
	async fn test_delete_endpoint_cascades_to_subscriptions() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();
		store.save_endpoint(&test_endpoint("eth-other")).await.unwrap();
		store
			.save_subscription(&test_subscription("job-a", "eth-main"))
			.await
			.unwrap();
		store
			.save_subscription(&test_subscription("job-b", "eth-main"))
			.await
			.unwrap();
		store
			.save_subscription(&test_subscription("job-c", "eth-other"))
			.await
			.unwrap();

		store.delete_endpoint("eth-main").await.unwrap();

		assert!(store.load_endpoint("eth-main").await.unwrap_err().is_not_found());
		let remaining = store.load_subscriptions().await.unwrap();
		assert_eq!(remaining.len(), 1);
		assert_eq!(remaining[0].job_id, "job-c");
	}

	#[tokio::test]
	async fn test_resave_restores_deleted_endpoint() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();
		store.delete_endpoint("eth-main").await.unwrap();
		assert!(store.load_endpoint("eth-main").await.is_err());

		store.save_endpoint(&test_endpoint("eth-main")).await.unwrap();
		assert!(store.load_endpoint("eth-main").await.is_ok());
	}

	#[tokio::test]
	async fn test_delete_all_endpoints_except() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		store.save_endpoint(&test_endpoint("keep-me")).await.unwrap();
		store.save_endpoint(&test_endpoint("drop-me")).await.unwrap();
		store.save_endpoint(&test_endpoint("drop-me-too")).await.unwrap();

		store
			.delete_all_endpoints_except(&["keep-me".to_string()])
			.await
			.unwrap();

		assert!(store.load_endpoint("keep-me").await.is_ok());
		assert!(store.load_endpoint("drop-me").await.is_err());
		assert!(store.load_endpoint("drop-me-too").await.is_err());
	}

	#[tokio::test]
	async fn test_empty_and_missing_document() {
		let temp_dir = tempfile::tempdir().unwrap();
		let store = FileStore::new(temp_dir.path().to_path_buf());

		// Missing file
		assert!(store.load_subscriptions().await.unwrap().is_empty());

		// Whitespace-only file
		tokio::fs::write(temp_dir.path().join(RECORDS_FILE), "  \n\t")
			.await
			.unwrap();
		assert!(store.load_subscriptions().await.unwrap().is_empty());
	}
}
