//! Database connection capability
//!
//! [`Connection`] is the minimal surface the unit-of-work machinery needs
//! from a database connection: transactional state control, a liveness
//! probe, query execution, and a downcast escape hatch. Concrete drivers
//! (see [`crate::sqlite`]) and wrappers (see [`crate::attached`]) all
//! implement it, so scopes and providers only ever deal in
//! `Arc<dyn Connection>`.

use crate::error::ConnectionResult;
use crate::types::{QueryResult, QueryValue, Row};
use std::any::Any;

/// Minimal database connection surface used by scoped connection management
///
/// All operations take `&self`; implementations guard their driver handle
/// internally so a connection can be shared as `Arc<dyn Connection>` across
/// a scope tree.
#[async_trait::async_trait]
pub trait Connection: Send + Sync {
	/// Whether this connection reports itself closed
	fn is_closed(&self) -> bool;

	/// Whether this connection is in auto-commit mode
	fn is_auto_commit(&self) -> bool;

	/// Switch auto-commit mode
	///
	/// Leaving auto-commit mode opens a transaction; re-entering it commits
	/// the transaction in progress.
	async fn set_auto_commit(&self, auto_commit: bool) -> ConnectionResult<()>;

	/// Commit the transaction in progress
	async fn commit(&self) -> ConnectionResult<()>;

	/// Roll back the transaction in progress
	async fn rollback(&self) -> ConnectionResult<()>;

	/// Close the connection
	///
	/// Closing an already-closed connection is a no-op.
	async fn close(&self) -> ConnectionResult<()>;

	/// Execute a statement that modifies the database
	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<QueryResult>;

	/// Fetch a single row
	async fn fetch_one(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<Row>;

	/// Fetch all matching rows
	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<Vec<Row>>;

	/// Fetch zero or one row
	async fn fetch_optional(
		&self,
		sql: &str,
		params: Vec<QueryValue>,
	) -> ConnectionResult<Option<Row>>;

	/// Get a reference to self as Any for downcasting
	fn as_any(&self) -> &dyn Any;
}

/// Close a connection, swallowing any failure
///
/// Used on cleanup paths where a close failure must not interrupt the rest
/// of the teardown. The failure is logged at debug level.
pub async fn close_quietly(conn: &dyn Connection) {
	if let Err(e) = conn.close().await {
		tracing::debug!(error = %e, "Ignoring connection close failure");
	}
}
