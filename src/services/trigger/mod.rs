//! Downstream job-trigger client.
//!
//! The consumer is notified once per event by POSTing the event payload as a
//! job run. Delivery failures are reported to the caller but are non-fatal to
//! the orchestrator: the relay loop logs and keeps the subscription live.

use async_trait::async_trait;
use reqwest_middleware::ClientWithMiddleware;
use thiserror::Error;

use crate::{models::Event, services::blockchain::default_http_client};

/// Access key header presented to the consumer on run triggers
pub const ACCESS_KEY_HEADER: &str = "X-Consumer-Access-Key";
/// Secret header presented to the consumer on run triggers
pub const SECRET_HEADER: &str = "X-Consumer-Secret";

/// Trigger client error type
#[derive(Debug, Error)]
pub enum TriggerError {
	/// The consumer could not be reached
	#[error("trigger request failed: {0}")]
	Request(#[from] reqwest_middleware::Error),

	/// The consumer rejected the run trigger
	#[error("consumer returned status {status} for job {job_id}")]
	BadStatus { job_id: String, status: u16 },
}

/// Notifies the downstream consumer that an event occurred
#[async_trait]
pub trait TriggerClient: Send + Sync {
	/// Triggers one job run carrying the event payload
	async fn trigger_job(&self, job_id: &str, event: &Event) -> Result<(), TriggerError>;
}

/// HTTP implementation of the trigger client
pub struct HttpTriggerClient {
	base_url: String,
	access_key: String,
	secret: String,
	http: ClientWithMiddleware,
}

impl HttpTriggerClient {
	/// Creates a client for the consumer at `base_url`, authenticating with
	/// the given access key pair
	pub fn new(base_url: String, access_key: String, secret: String) -> Self {
		HttpTriggerClient {
			base_url: base_url.trim_end_matches('/').to_string(),
			access_key,
			secret,
			http: default_http_client(),
		}
	}

	fn run_url(&self, job_id: &str) -> String {
		format!("{}/jobs/{}/runs", self.base_url, job_id)
	}
}

#[async_trait]
impl TriggerClient for HttpTriggerClient {
	async fn trigger_job(&self, job_id: &str, event: &Event) -> Result<(), TriggerError> {
		let response = self
			.http
			.post(self.run_url(job_id))
			.header(ACCESS_KEY_HEADER, &self.access_key)
			.header(SECRET_HEADER, &self.secret)
			.json(event.as_value())
			.send()
			.await?;

		let status = response.status();
		if !status.is_success() {
			return Err(TriggerError::BadStatus {
				job_id: job_id.to_string(),
				status: status.as_u16(),
			});
		}

		tracing::debug!(job_id = %job_id, "job run triggered");
		Ok(())
	}
}
