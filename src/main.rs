//! Binary entrypoint.
//!
//! Wires together the store, the orchestrator, the trigger client and the
//! administrative HTTP surface, seeds endpoints passed on the command line,
//! and shuts everything down cleanly on interrupt.

use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use event_initiator::{
	api::{self, ApiState},
	models::{AppConfig, Endpoint},
	repositories::{FileStore, SubscriptionStore},
	services::{orchestrator::Service, trigger::HttpTriggerClient},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	let config = AppConfig::parse();

	tracing_subscriber::fmt()
		.with_env_filter(
			EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
		)
		.init();

	let store = Arc::new(FileStore::new(config.database_path.clone()));
	let trigger = Arc::new(HttpTriggerClient::new(
		config.normalized_consumer_url(),
		config.outbound_access_key.clone(),
		config.outbound_secret.clone(),
	));
	let service = Arc::new(Service::new(store.clone(), trigger));

	// Seed endpoints passed on the command line; anything not listed is
	// removed so the persisted set mirrors the deployment configuration
	let mut seeded = Vec::new();
	for raw in &config.endpoints {
		let endpoint: Endpoint = match serde_json::from_str(raw) {
			Ok(endpoint) => endpoint,
			Err(e) => {
				tracing::warn!("skipping malformed endpoint argument: {}", e);
				continue;
			}
		};
		match service.save_endpoint(&endpoint).await {
			Ok(()) => seeded.push(endpoint.name),
			Err(e) => tracing::error!(endpoint = %endpoint.name, "failed to seed endpoint: {}", e),
		}
	}
	if !seeded.is_empty() {
		if let Err(e) = store.delete_all_endpoints_except(&seeded).await {
			tracing::error!("failed to prune unlisted endpoints: {}", e);
		}
	}

	{
		let service = service.clone();
		tokio::spawn(async move {
			if let Err(e) = service.run().await {
				tracing::error!("failed to load persisted subscriptions: {}", e);
			}
		});
	}

	let state = ApiState {
		manager: service.clone(),
		access_key: config.inbound_access_key.clone(),
		secret: config.inbound_secret.clone(),
	};
	let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.port))
		.await
		.with_context(|| format!("failed to bind port {}", config.port))?;
	tracing::info!(address = %listener.local_addr()?, "administrative API listening");

	axum::serve(listener, api::router(state))
		.with_graceful_shutdown(shutdown_signal())
		.await
		.context("administrative API server failed")?;

	service.close().await;
	Ok(())
}

async fn shutdown_signal() {
	if let Err(e) = tokio::signal::ctrl_c().await {
		tracing::error!("failed to listen for interrupt signal: {}", e);
		return;
	}
	tracing::info!("interrupt received, shutting down");
}
