//! Repository error types.

use thiserror::Error;

/// Errors produced by the persistence layer
#[derive(Debug, Error)]
pub enum RepositoryError {
	/// The requested record does not exist (or is soft-deleted)
	#[error("{entity} not found: {key}")]
	NotFound { entity: &'static str, key: String },

	/// The record references another record that does not exist
	#[error("{entity} references unknown {referenced}: {key}")]
	MissingReference {
		entity: &'static str,
		referenced: &'static str,
		key: String,
	},

	/// Reading or writing the backing storage failed
	#[error("storage error: {message}")]
	Storage {
		message: String,
		#[source]
		source: Option<std::io::Error>,
	},

	/// A persisted record could not be encoded or decoded
	#[error("record serialization failed: {0}")]
	Serialization(#[from] serde_json::Error),
}

impl RepositoryError {
	/// Creates a NotFound error
	pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
		Self::NotFound {
			entity,
			key: key.into(),
		}
	}

	/// Creates a Storage error wrapping an I/O failure
	pub fn storage(message: impl Into<String>, source: std::io::Error) -> Self {
		Self::Storage {
			message: message.into(),
			source: Some(source),
		}
	}

	/// Checks whether this error is a NotFound
	pub fn is_not_found(&self) -> bool {
		matches!(self, Self::NotFound { .. })
	}
}
