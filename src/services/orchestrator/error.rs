//! Orchestrator error types.

use thiserror::Error;

use crate::{
	repositories::RepositoryError,
	services::blockchain::{ResolveError, TransportError},
};

/// Errors returned by orchestrator operations
///
/// Per-tick transport failures and per-event delivery failures never show up
/// here: they are recovered locally inside the producer and relay loops.
#[derive(Debug, Error)]
pub enum OrchestratorError {
	/// The endpoint or subscription shape is invalid; rejected before any I/O
	#[error("invalid configuration: {0}")]
	InvalidConfiguration(String),

	/// The job already has a live subscription
	#[error("already subscribed to job {0}")]
	AlreadySubscribed(String),

	/// The referenced job or endpoint does not exist
	#[error("{0} not found")]
	NotFound(String),

	/// No transport/codec pairing exists for the endpoint
	#[error(transparent)]
	Resolve(#[from] ResolveError),

	/// The endpoint failed its liveness test
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// The persistence collaborator failed
	#[error(transparent)]
	Store(#[from] RepositoryError),
}

impl OrchestratorError {
	/// Creates an InvalidConfiguration error
	pub fn invalid_configuration(message: impl Into<String>) -> Self {
		Self::InvalidConfiguration(message.into())
	}

	/// Checks whether this error means the requested record does not exist
	pub fn is_not_found(&self) -> bool {
		match self {
			Self::NotFound(_) => true,
			Self::Store(e) => e.is_not_found(),
			_ => false,
		}
	}

	/// Checks whether this error is the caller's fault (bad request data)
	/// rather than an internal failure
	pub fn is_bad_request(&self) -> bool {
		matches!(
			self,
			Self::InvalidConfiguration(_) | Self::Resolve(_) | Self::Transport(_)
		)
	}
}
