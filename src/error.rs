//! Error types for connection acquisition and unit-of-work lifecycle handling.
//!
//! Errors are split by concern: [`ConnectionError`] covers everything a
//! connection or connection provider can fail with, [`TransactionError`]
//! wraps commit/rollback failures together with their underlying cause, and
//! [`UnitOfWorkError`] covers scope lifecycle misuse and callback failures.

use crate::unit_of_work::Phase;

/// Result alias for connection and provider operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;

/// Result alias for unit-of-work lifecycle operations
pub type UnitOfWorkResult<T> = std::result::Result<T, UnitOfWorkError>;

/// Errors raised by connections and connection providers
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConnectionError {
	#[error("Connection is closed")]
	Closed,

	#[error("Database driver error: {0}")]
	Driver(#[from] sqlx::Error),

	#[error("Could not acquire connection: {0}")]
	Acquisition(String),

	#[error("Backend error: {0}")]
	Backend(String),

	#[error("Type conversion failed: {0}")]
	TypeError(String),

	#[error("Column not found: {0}")]
	ColumnNotFound(String),
}

/// Commit or rollback failure, carrying the underlying connection fault
#[derive(Debug, thiserror::Error)]
pub enum TransactionError {
	#[error("Unable to commit transaction")]
	Commit(#[source] ConnectionError),

	#[error("Unable to roll back transaction")]
	Rollback(#[source] ConnectionError),
}

/// Errors raised while driving a unit of work through its lifecycle
#[derive(Debug, thiserror::Error)]
pub enum UnitOfWorkError {
	/// The scope already left its active phase and cannot be driven again.
	#[error("Unit of work already completed (phase: {phase:?})")]
	Completed { phase: Phase },

	#[error(transparent)]
	Transaction(#[from] TransactionError),

	#[error(transparent)]
	Other(#[from] anyhow::Error),
}
