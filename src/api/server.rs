//! Router and handlers for the administrative API.

use std::sync::Arc;

use axum::{
	extract::{Path, Request, State},
	http::StatusCode,
	middleware::{self, Next},
	response::{IntoResponse, Json, Response},
	routing::{get, post},
	Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::{
	models::{ChainFilter, ChainKind, Endpoint, Subscription},
	services::orchestrator::{OrchestratorError, SubscriptionManager},
};

/// Access key header the consumer must present
pub const ACCESS_KEY_HEADER: &str = "X-Initiator-Access-Key";
/// Secret header the consumer must present
pub const SECRET_HEADER: &str = "X-Initiator-Secret";

/// Shared state for the administrative handlers
#[derive(Clone)]
pub struct ApiState {
	pub manager: Arc<dyn SubscriptionManager>,
	pub access_key: String,
	pub secret: String,
}

/// Builds the administrative router
pub fn router(state: ApiState) -> Router {
	let gated = Router::new()
		.route("/jobs", post(create_subscription))
		.route("/jobs/:job_id", axum::routing::delete(delete_subscription))
		.route("/config", post(create_endpoint))
		.route("/config/:name", get(get_endpoint))
		.layer(middleware::from_fn_with_state(state.clone(), authenticate));

	Router::new()
		.route("/health", get(health))
		.merge(gated)
		.with_state(state)
}

async fn authenticate(State(state): State<ApiState>, request: Request, next: Next) -> Response {
	let authorized = {
		let header = |name: &str| {
			request
				.headers()
				.get(name)
				.and_then(|v| v.to_str().ok())
				.unwrap_or_default()
				.to_string()
		};

		header(ACCESS_KEY_HEADER) == state.access_key && header(SECRET_HEADER) == state.secret
	};

	if authorized {
		next.run(request).await
	} else {
		StatusCode::UNAUTHORIZED.into_response()
	}
}

fn status_for(error: &OrchestratorError) -> StatusCode {
	if error.is_not_found() {
		StatusCode::NOT_FOUND
	} else if matches!(error, OrchestratorError::AlreadySubscribed(_)) {
		StatusCode::CONFLICT
	} else if error.is_bad_request() {
		StatusCode::BAD_REQUEST
	} else {
		StatusCode::INTERNAL_SERVER_ERROR
	}
}

fn error_response(error: OrchestratorError) -> Response {
	tracing::error!("administrative request failed: {}", error);
	(status_for(&error), Json(json!({"error": error.to_string()}))).into_response()
}

/// Identifier payload returned on successful writes
#[derive(Debug, Serialize)]
struct IdResponse {
	id: String,
}

/// Payload expected on subscription creation
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateSubscriptionRequest {
	job_id: String,
	params: SubscriptionParams,
}

/// Chain parameters accompanying a subscription request
///
/// Which fields matter depends on the endpoint's chain kind; the rest are
/// ignored.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SubscriptionParams {
	endpoint: String,
	#[serde(default)]
	addresses: Vec<String>,
	#[serde(default)]
	topics: Vec<String>,
	#[serde(default)]
	account_ids: Vec<String>,
}

impl SubscriptionParams {
	/// Builds the filter variant matching the endpoint's chain kind
	fn filter_for(&self, kind: ChainKind) -> ChainFilter {
		match kind {
			ChainKind::Ethereum => ChainFilter::Ethereum {
				addresses: self.addresses.clone(),
				topics: self.topics.clone(),
			},
			ChainKind::Substrate => ChainFilter::Substrate {
				account_ids: self.account_ids.clone(),
			},
			ChainKind::Tezos => ChainFilter::Tezos {
				addresses: self.addresses.clone(),
			},
		}
	}
}

async fn health() -> Json<serde_json::Value> {
	Json(json!({"alive": true}))
}

async fn create_subscription(
	State(state): State<ApiState>,
	Json(request): Json<CreateSubscriptionRequest>,
) -> Response {
	if request.job_id.is_empty() {
		return (
			StatusCode::BAD_REQUEST,
			Json(json!({"error": "missing required field jobId"})),
		)
			.into_response();
	}

	let endpoint = match state.manager.get_endpoint(&request.params.endpoint).await {
		Ok(endpoint) => endpoint,
		Err(e) if e.is_not_found() => {
			tracing::error!(endpoint = %request.params.endpoint, "unknown endpoint provided");
			return (
				StatusCode::BAD_REQUEST,
				Json(json!({"error": "unknown endpoint provided"})),
			)
				.into_response();
		}
		Err(e) => return error_response(e),
	};

	let filter = request.params.filter_for(endpoint.kind);
	if !filter.has_selectors() {
		return (
			StatusCode::BAD_REQUEST,
			Json(json!({"error": "missing required field(s)"})),
		)
			.into_response();
	}

	let subscription = Subscription {
		reference_id: Uuid::new_v4().to_string(),
		job_id: request.job_id,
		endpoint_name: endpoint.name,
		filter,
	};
	let reference_id = subscription.reference_id.clone();

	match state.manager.save_subscription(subscription).await {
		Ok(()) => (StatusCode::CREATED, Json(IdResponse { id: reference_id })).into_response(),
		Err(e) => error_response(e),
	}
}

async fn delete_subscription(
	State(state): State<ApiState>,
	Path(job_id): Path<String>,
) -> Response {
	match state.manager.delete_job(&job_id).await {
		Ok(()) => (StatusCode::OK, Json(IdResponse { id: job_id })).into_response(),
		Err(e) => error_response(e),
	}
}

async fn create_endpoint(
	State(state): State<ApiState>,
	Json(endpoint): Json<Endpoint>,
) -> Response {
	let name = endpoint.name.clone();
	match state.manager.save_endpoint(&endpoint).await {
		Ok(()) => (StatusCode::CREATED, Json(IdResponse { id: name })).into_response(),
		Err(e) => error_response(e),
	}
}

async fn get_endpoint(State(state): State<ApiState>, Path(name): Path<String>) -> Response {
	match state.manager.get_endpoint(&name).await {
		Ok(endpoint) => (StatusCode::OK, Json(endpoint)).into_response(),
		Err(e) => error_response(e),
	}
}
