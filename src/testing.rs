//! Test doubles for connection-dependent code
//!
//! In-memory implementations of [`Connection`] and [`ConnectionProvider`]
//! with call recording and failure injection. Useful for testing scoped
//! connection handling without a real database.

use crate::connection::Connection;
use crate::error::{ConnectionError, ConnectionResult};
use crate::provider::ConnectionProvider;
use crate::types::{QueryResult, QueryValue, Row};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

/// In-memory [`Connection`] that records calls and can simulate failures
///
/// # Examples
///
/// ```
/// use txscope::connection::Connection;
/// use txscope::testing::MockConnection;
///
/// # tokio_test::block_on(async {
/// let conn = MockConnection::new();
/// conn.execute("DELETE FROM t", vec![]).await.unwrap();
///
/// assert_eq!(conn.executed_sql(), vec!["DELETE FROM t".to_string()]);
/// assert_eq!(conn.commit_calls(), 0);
/// # });
/// ```
pub struct MockConnection {
	closed: AtomicBool,
	auto_commit: AtomicBool,
	commit_calls: AtomicUsize,
	rollback_calls: AtomicUsize,
	close_calls: AtomicUsize,
	fail_commit: AtomicBool,
	fail_rollback: AtomicBool,
	fail_close: AtomicBool,
	executed: Mutex<Vec<String>>,
	queued_rows: Mutex<VecDeque<Row>>,
}

impl MockConnection {
	/// Create an open connection in auto-commit mode
	pub fn new() -> Self {
		Self::with_auto_commit(true)
	}

	/// Create an open connection with the given auto-commit mode
	pub fn with_auto_commit(auto_commit: bool) -> Self {
		Self {
			closed: AtomicBool::new(false),
			auto_commit: AtomicBool::new(auto_commit),
			commit_calls: AtomicUsize::new(0),
			rollback_calls: AtomicUsize::new(0),
			close_calls: AtomicUsize::new(0),
			fail_commit: AtomicBool::new(false),
			fail_rollback: AtomicBool::new(false),
			fail_close: AtomicBool::new(false),
			executed: Mutex::new(Vec::new()),
			queued_rows: Mutex::new(VecDeque::new()),
		}
	}

	/// Simulate the connection being opened or closed externally
	pub fn set_closed(&self, closed: bool) {
		self.closed.store(closed, Ordering::SeqCst);
	}

	/// Make every following `commit` fail
	pub fn fail_commit(&self) {
		self.fail_commit.store(true, Ordering::SeqCst);
	}

	/// Make every following `rollback` fail
	pub fn fail_rollback(&self) {
		self.fail_rollback.store(true, Ordering::SeqCst);
	}

	/// Make every following `close` fail
	pub fn fail_close(&self) {
		self.fail_close.store(true, Ordering::SeqCst);
	}

	/// Queue a row to be returned by the next fetch
	pub fn queue_row(&self, row: Row) {
		self.queued_rows.lock().push_back(row);
	}

	pub fn commit_calls(&self) -> usize {
		self.commit_calls.load(Ordering::SeqCst)
	}

	pub fn rollback_calls(&self) -> usize {
		self.rollback_calls.load(Ordering::SeqCst)
	}

	pub fn close_calls(&self) -> usize {
		self.close_calls.load(Ordering::SeqCst)
	}

	/// Every statement passed to `execute` or a fetch, in call order
	pub fn executed_sql(&self) -> Vec<String> {
		self.executed.lock().clone()
	}

	fn guard_open(&self) -> ConnectionResult<()> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ConnectionError::Closed);
		}
		Ok(())
	}
}

impl Default for MockConnection {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl Connection for MockConnection {
	fn is_closed(&self) -> bool {
		self.closed.load(Ordering::SeqCst)
	}

	fn is_auto_commit(&self) -> bool {
		self.auto_commit.load(Ordering::SeqCst)
	}

	async fn set_auto_commit(&self, auto_commit: bool) -> ConnectionResult<()> {
		self.guard_open()?;
		self.auto_commit.store(auto_commit, Ordering::SeqCst);
		Ok(())
	}

	async fn commit(&self) -> ConnectionResult<()> {
		self.commit_calls.fetch_add(1, Ordering::SeqCst);
		self.guard_open()?;
		if self.fail_commit.load(Ordering::SeqCst) {
			return Err(ConnectionError::Backend(
				"simulated commit failure".to_string(),
			));
		}
		Ok(())
	}

	async fn rollback(&self) -> ConnectionResult<()> {
		self.rollback_calls.fetch_add(1, Ordering::SeqCst);
		self.guard_open()?;
		if self.fail_rollback.load(Ordering::SeqCst) {
			return Err(ConnectionError::Backend(
				"simulated rollback failure".to_string(),
			));
		}
		Ok(())
	}

	async fn close(&self) -> ConnectionResult<()> {
		self.close_calls.fetch_add(1, Ordering::SeqCst);
		if self.fail_close.load(Ordering::SeqCst) {
			return Err(ConnectionError::Backend(
				"simulated close failure".to_string(),
			));
		}
		self.closed.store(true, Ordering::SeqCst);
		Ok(())
	}

	async fn execute(&self, sql: &str, _params: Vec<QueryValue>) -> ConnectionResult<QueryResult> {
		self.guard_open()?;
		self.executed.lock().push(sql.to_string());
		Ok(QueryResult { rows_affected: 0 })
	}

	async fn fetch_one(&self, sql: &str, _params: Vec<QueryValue>) -> ConnectionResult<Row> {
		self.guard_open()?;
		self.executed.lock().push(sql.to_string());
		Ok(self.queued_rows.lock().pop_front().unwrap_or_default())
	}

	async fn fetch_all(&self, sql: &str, _params: Vec<QueryValue>) -> ConnectionResult<Vec<Row>> {
		self.guard_open()?;
		self.executed.lock().push(sql.to_string());
		Ok(self.queued_rows.lock().drain(..).collect())
	}

	async fn fetch_optional(
		&self,
		sql: &str,
		_params: Vec<QueryValue>,
	) -> ConnectionResult<Option<Row>> {
		self.guard_open()?;
		self.executed.lock().push(sql.to_string());
		Ok(self.queued_rows.lock().pop_front())
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}

/// [`ConnectionProvider`] that hands out fresh [`MockConnection`]s
///
/// Every created connection is retained for later inspection, so tests can
/// count factory calls and examine per-connection state after the code
/// under test finished.
///
/// # Examples
///
/// ```
/// use txscope::provider::ConnectionProvider;
/// use txscope::testing::MockConnectionProvider;
///
/// # tokio_test::block_on(async {
/// let provider = MockConnectionProvider::new();
/// let conn = provider.acquire().await.unwrap();
///
/// assert_eq!(provider.connection_count(), 1);
/// assert!(!conn.is_closed());
/// # });
/// ```
pub struct MockConnectionProvider {
	auto_commit: bool,
	connections: Mutex<Vec<Arc<MockConnection>>>,
	fail_next: AtomicBool,
}

impl MockConnectionProvider {
	/// Provider whose connections start in auto-commit mode
	pub fn new() -> Self {
		Self {
			auto_commit: true,
			connections: Mutex::new(Vec::new()),
			fail_next: AtomicBool::new(false),
		}
	}

	/// Provider whose connections start with auto-commit off
	pub fn manual_commit() -> Self {
		Self {
			auto_commit: false,
			connections: Mutex::new(Vec::new()),
			fail_next: AtomicBool::new(false),
		}
	}

	/// Make the next `acquire` fail with an acquisition error
	pub fn fail_next_acquire(&self) {
		self.fail_next.store(true, Ordering::SeqCst);
	}

	/// Number of connections created so far
	pub fn connection_count(&self) -> usize {
		self.connections.lock().len()
	}

	/// The `index`-th created connection
	///
	/// # Panics
	///
	/// Panics if fewer than `index + 1` connections were created.
	pub fn connection(&self, index: usize) -> Arc<MockConnection> {
		self.connections.lock()[index].clone()
	}
}

impl Default for MockConnectionProvider {
	fn default() -> Self {
		Self::new()
	}
}

#[async_trait::async_trait]
impl ConnectionProvider for MockConnectionProvider {
	async fn acquire(&self) -> ConnectionResult<Arc<dyn Connection>> {
		if self.fail_next.swap(false, Ordering::SeqCst) {
			return Err(ConnectionError::Acquisition(
				"simulated acquisition failure".to_string(),
			));
		}
		let conn = Arc::new(MockConnection::with_auto_commit(self.auto_commit));
		self.connections.lock().push(conn.clone());
		Ok(conn)
	}
}
