//! Runtime configuration for the initiator binary.
//!
//! Values come from command line flags with environment variable fallbacks,
//! so the binary runs unchanged in containers and on developer machines.

use std::path::PathBuf;

use clap::Parser;

/// Command line and environment configuration
#[derive(Debug, Clone, Parser)]
#[command(
	name = "event-initiator",
	about = "Bridges blockchain event feeds to job runs on a downstream trigger consumer"
)]
pub struct AppConfig {
	/// Directory holding the persisted endpoint and subscription records
	#[arg(long, env = "EI_DATABASE_PATH", default_value = "data")]
	pub database_path: PathBuf,

	/// Port the administrative HTTP API listens on
	#[arg(long, env = "EI_PORT", default_value_t = 8080)]
	pub port: u16,

	/// Base URL of the downstream job-trigger consumer
	#[arg(long, env = "EI_CONSUMER_URL", default_value = "http://localhost:6688")]
	pub consumer_url: String,

	/// Access key the consumer must present on administrative requests
	#[arg(long, env = "EI_INBOUND_ACCESS_KEY", default_value = "", hide_env_values = true)]
	pub inbound_access_key: String,

	/// Secret the consumer must present on administrative requests
	#[arg(long, env = "EI_INBOUND_SECRET", default_value = "", hide_env_values = true)]
	pub inbound_secret: String,

	/// Access key presented to the consumer on job run triggers
	#[arg(long, env = "EI_OUTBOUND_ACCESS_KEY", default_value = "", hide_env_values = true)]
	pub outbound_access_key: String,

	/// Secret presented to the consumer on job run triggers
	#[arg(long, env = "EI_OUTBOUND_SECRET", default_value = "", hide_env_values = true)]
	pub outbound_secret: String,

	/// Endpoint definitions (JSON) seeded at startup; persisted endpoints
	/// not listed here are removed
	#[arg(value_name = "ENDPOINT_JSON")]
	pub endpoints: Vec<String>,
}

impl AppConfig {
	/// Returns the consumer URL with a scheme, defaulting bare localhost
	/// addresses to http
	pub fn normalized_consumer_url(&self) -> String {
		if self.consumer_url.starts_with("localhost") {
			format!("http://{}", self.consumer_url)
		} else {
			self.consumer_url.clone()
		}
	}
}
