//! SQLite-backed connection provider
//!
//! [`SqliteConnectionProvider`] opens one dedicated SQLite connection per
//! acquisition; sharing across a scope tree is the job of
//! [`UnitOfWorkAwareProvider`](crate::provider::UnitOfWorkAwareProvider), not
//! of this module. [`SqliteConnection`] adapts a raw `sqlx` connection to the
//! [`Connection`] capability, emulating auto-commit mode with explicit
//! `BEGIN`/`COMMIT`/`ROLLBACK` statements the way database drivers do.

use crate::connection::Connection;
use crate::error::{ConnectionError, ConnectionResult};
use crate::provider::ConnectionProvider;
use crate::types::{QueryResult, QueryValue, Row};
use sqlx::sqlite::{SqliteConnection as RawSqliteConnection, SqliteRow};
use sqlx::{Column, Connection as _};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

/// Connection provider that opens a fresh SQLite connection per acquisition
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
/// use txscope::provider::UnitOfWorkAwareProvider;
/// use txscope::sqlite::SqliteConnectionProvider;
///
/// let factory = Arc::new(SqliteConnectionProvider::new("sqlite://app.db"));
/// let provider = UnitOfWorkAwareProvider::new(factory);
/// ```
pub struct SqliteConnectionProvider {
	url: String,
}

impl SqliteConnectionProvider {
	pub fn new(url: impl Into<String>) -> Self {
		Self { url: url.into() }
	}

	pub fn url(&self) -> &str {
		&self.url
	}
}

#[async_trait::async_trait]
impl ConnectionProvider for SqliteConnectionProvider {
	async fn acquire(&self) -> ConnectionResult<Arc<dyn Connection>> {
		let conn = SqliteConnection::connect(&self.url).await?;
		Ok(Arc::new(conn))
	}
}

/// SQLite implementation of the [`Connection`] capability
///
/// The raw connection lives behind an async mutex and is consumed on close,
/// so later operations fail with [`ConnectionError::Closed`]. Fresh
/// connections start in auto-commit mode; leaving it opens a transaction,
/// and `commit`/`rollback` immediately open the next one so manual mode
/// always has a transaction in progress.
pub struct SqliteConnection {
	inner: Mutex<Option<RawSqliteConnection>>,
	auto_commit: AtomicBool,
	closed: AtomicBool,
	id: String,
}

impl SqliteConnection {
	/// Open a connection to the given SQLite URL
	pub async fn connect(url: &str) -> ConnectionResult<Self> {
		let conn = RawSqliteConnection::connect(url).await?;
		let id = Uuid::new_v4().to_string();
		tracing::debug!(connection_id = %id, "Opened SQLite connection");
		Ok(Self {
			inner: Mutex::new(Some(conn)),
			auto_commit: AtomicBool::new(true),
			closed: AtomicBool::new(false),
			id,
		})
	}

	/// Identifier of this connection, for log correlation
	pub fn connection_id(&self) -> &str {
		&self.id
	}

	fn bind_value<'q>(
		query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
		value: &'q QueryValue,
	) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
		match value {
			QueryValue::Null => query.bind(None::<i32>),
			QueryValue::Bool(b) => query.bind(b),
			QueryValue::Int(i) => query.bind(i),
			QueryValue::Float(f) => query.bind(f),
			QueryValue::String(s) => query.bind(s),
			QueryValue::Bytes(b) => query.bind(b),
		}
	}

	fn convert_row(sqlite_row: SqliteRow) -> ConnectionResult<Row> {
		use sqlx::Row as SqlxRow;

		let mut row = Row::new();
		for column in sqlite_row.columns() {
			let column_name = column.name();

			// Probe by storage class. Integers come first so SQLite's
			// integer-backed booleans stay integers.
			if let Ok(value) = sqlite_row.try_get::<i64, _>(column_name) {
				row.insert(column_name.to_string(), QueryValue::Int(value));
			} else if let Ok(value) = sqlite_row.try_get::<f64, _>(column_name) {
				row.insert(column_name.to_string(), QueryValue::Float(value));
			} else if let Ok(value) = sqlite_row.try_get::<String, _>(column_name) {
				row.insert(column_name.to_string(), QueryValue::String(value));
			} else if let Ok(value) = sqlite_row.try_get::<Vec<u8>, _>(column_name) {
				row.insert(column_name.to_string(), QueryValue::Bytes(value));
			} else if sqlite_row.try_get::<Option<i64>, _>(column_name).is_ok() {
				row.insert(column_name.to_string(), QueryValue::Null);
			}
		}
		Ok(row)
	}
}

#[async_trait::async_trait]
impl Connection for SqliteConnection {
	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn is_auto_commit(&self) -> bool {
		self.auto_commit.load(Ordering::SeqCst)
	}

	async fn set_auto_commit(&self, auto_commit: bool) -> ConnectionResult<()> {
		if self.auto_commit.load(Ordering::SeqCst) == auto_commit {
			return Ok(());
		}
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		if auto_commit {
			// Re-entering auto-commit commits the transaction in progress
			sqlx::query("COMMIT").execute(&mut *conn).await?;
		} else {
			sqlx::query("BEGIN").execute(&mut *conn).await?;
		}
		self.auto_commit.store(auto_commit, Ordering::SeqCst);
		Ok(())
	}

	async fn commit(&self) -> ConnectionResult<()> {
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		sqlx::query("COMMIT").execute(&mut *conn).await?;
		if !self.auto_commit.load(Ordering::SeqCst) {
			// Manual mode always has a transaction in progress
			sqlx::query("BEGIN").execute(&mut *conn).await?;
		}
		Ok(())
	}

	async fn rollback(&self) -> ConnectionResult<()> {
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		sqlx::query("ROLLBACK").execute(&mut *conn).await?;
		if !self.auto_commit.load(Ordering::SeqCst) {
			sqlx::query("BEGIN").execute(&mut *conn).await?;
		}
		Ok(())
	}

	async fn close(&self) -> ConnectionResult<()> {
		let Some(conn) = self.inner.lock().await.take() else {
			return Ok(());
		};
		self.closed.store(true, Ordering::SeqCst);
		tracing::debug!(connection_id = %self.id, "Closing SQLite connection");
		conn.close().await?;
		Ok(())
	}

	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<QueryResult> {
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		let mut query = sqlx::query(sql);
		for param in &params {
			query = Self::bind_value(query, param);
		}
		let result = query.execute(&mut *conn).await?;
		Ok(QueryResult {
			rows_affected: result.rows_affected(),
		})
	}

	async fn fetch_one(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<Row> {
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		let mut query = sqlx::query(sql);
		for param in &params {
			query = Self::bind_value(query, param);
		}
		let row = query.fetch_one(&mut *conn).await?;
		Self::convert_row(row)
	}

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<Vec<Row>> {
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		let mut query = sqlx::query(sql);
		for param in &params {
			query = Self::bind_value(query, param);
		}
		let rows = query.fetch_all(&mut *conn).await?;
		rows.into_iter().map(Self::convert_row).collect()
	}

	async fn fetch_optional(
		&self,
		sql: &str,
		params: Vec<QueryValue>,
	) -> ConnectionResult<Option<Row>> {
		let mut guard = self.inner.lock().await;
		let conn = guard.as_mut().ok_or(ConnectionError::Closed)?;
		let mut query = sqlx::query(sql);
		for param in &params {
			query = Self::bind_value(query, param);
		}
		let row = query.fetch_optional(&mut *conn).await?;
		row.map(Self::convert_row).transpose()
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	async fn memory_connection() -> SqliteConnection {
		SqliteConnection::connect("sqlite::memory:")
			.await
			.expect("in-memory connection opens")
	}

	#[tokio::test]
	async fn test_execute_and_fetch_round_trip() {
		// Arrange
		let conn = memory_connection().await;
		conn.execute("CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT)", vec![])
			.await
			.expect("create table");

		// Act
		let result = conn
			.execute(
				"INSERT INTO users (name) VALUES (?)",
				vec![QueryValue::from("alice")],
			)
			.await
			.expect("insert row");
		let row = conn
			.fetch_one("SELECT id, name FROM users", vec![])
			.await
			.expect("fetch row");

		// Assert
		assert_eq!(result.rows_affected, 1);
		assert_eq!(row.get::<i64>("id").expect("id column"), 1);
		assert_eq!(row.get::<String>("name").expect("name column"), "alice");
	}

	#[tokio::test]
	async fn test_fetch_optional_empty_result() {
		let conn = memory_connection().await;
		conn.execute("CREATE TABLE t (x INTEGER)", vec![])
			.await
			.expect("create table");

		let row = conn
			.fetch_optional("SELECT x FROM t", vec![])
			.await
			.expect("fetch succeeds");

		assert!(row.is_none());
	}

	#[tokio::test]
	async fn test_null_and_float_decoding() {
		// Arrange
		let conn = memory_connection().await;
		conn.execute("CREATE TABLE t (a INTEGER, b REAL, c TEXT)", vec![])
			.await
			.expect("create table");
		conn.execute(
			"INSERT INTO t (a, b, c) VALUES (?, ?, ?)",
			vec![QueryValue::Null, QueryValue::Float(1.5), QueryValue::from("x")],
		)
		.await
		.expect("insert row");

		// Act
		let row = conn
			.fetch_one("SELECT a, b, c FROM t", vec![])
			.await
			.expect("fetch row");

		// Assert
		assert_eq!(row.data.get("a"), Some(&QueryValue::Null));
		assert_eq!(row.data.get("b"), Some(&QueryValue::Float(1.5)));
		assert_eq!(row.data.get("c"), Some(&QueryValue::String("x".to_string())));
	}

	#[tokio::test]
	async fn test_manual_mode_commit_and_rollback() {
		// Arrange
		let conn = memory_connection().await;
		conn.execute("CREATE TABLE t (x INTEGER)", vec![])
			.await
			.expect("create table");
		conn.set_auto_commit(false)
			.await
			.expect("enter manual mode");
		assert!(!conn.is_auto_commit());

		// Act: committed insert survives, rolled-back insert does not
		conn.execute("INSERT INTO t (x) VALUES (1)", vec![])
			.await
			.expect("insert row");
		conn.commit().await.expect("commit succeeds");
		conn.execute("INSERT INTO t (x) VALUES (2)", vec![])
			.await
			.expect("insert row");
		conn.rollback().await.expect("rollback succeeds");

		// Assert
		let row = conn
			.fetch_one("SELECT COUNT(*) AS n FROM t", vec![])
			.await
			.expect("count rows");
		assert_eq!(row.get::<i64>("n").expect("count column"), 1);
	}

	#[tokio::test]
	async fn test_commit_without_transaction_is_a_driver_error() {
		let conn = memory_connection().await;

		let result = conn.commit().await;

		assert!(matches!(result, Err(ConnectionError::Driver(_))));
	}

	#[tokio::test]
	async fn test_operations_fail_after_close() {
		// Arrange
		let conn = memory_connection().await;
		conn.close().await.expect("close succeeds");

		// Act & Assert
		assert!(conn.is_closed());
		assert!(matches!(
			conn.execute("SELECT 1", vec![]).await,
			Err(ConnectionError::Closed)
		));
		// Closing twice is a no-op
		assert!(conn.close().await.is_ok());
	}

	#[tokio::test]
	async fn test_provider_opens_distinct_connections() {
		let provider = SqliteConnectionProvider::new("sqlite::memory:");

		let first = provider.acquire().await.expect("acquire succeeds");
		let second = provider.acquire().await.expect("acquire succeeds");

		assert!(!Arc::ptr_eq(&first, &second));
		assert!(!first.is_closed());
		assert!(first.is_auto_commit());
	}
}
