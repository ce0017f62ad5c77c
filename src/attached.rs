//! Lifecycle-tracked connection handle
//!
//! [`AttachedConnection`] wraps a raw connection that a unit-of-work scope
//! owns. Callers can use it like any other [`Connection`] but cannot end its
//! life: [`close`](Connection::close) is intercepted as a no-op, and only
//! the scope's cleanup phase physically closes the connection through
//! [`force_close`](AttachedConnection::force_close).

use crate::connection::{Connection, close_quietly};
use crate::error::{ConnectionError, ConnectionResult};
use crate::types::{QueryResult, QueryValue, Row};
use std::any::Any;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Connection handle owned by a unit-of-work scope
///
/// Every operation forwards to the wrapped connection except `close`,
/// which is ignored so that components inside a scope cannot tear down a
/// connection the rest of the scope tree still uses. After
/// [`force_close`](Self::force_close) the handle is terminal: transactional
/// and query operations fail with [`ConnectionError::Closed`].
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use txscope::attached::AttachedConnection;
/// use txscope::connection::Connection;
/// use txscope::testing::MockConnection;
///
/// # tokio_test::block_on(async {
/// let raw = Arc::new(MockConnection::new());
/// let attached = AttachedConnection::new(raw.clone());
///
/// attached.close().await.unwrap();
/// assert!(!attached.is_closed()); // the wrapped connection is untouched
///
/// attached.force_close().await;
/// assert!(attached.is_closed());
/// # });
/// ```
pub struct AttachedConnection {
	inner: Arc<dyn Connection>,
	force_closed: AtomicBool,
}

impl AttachedConnection {
	pub fn new(inner: Arc<dyn Connection>) -> Self {
		Self {
			inner,
			force_closed: AtomicBool::new(false),
		}
	}

	/// The wrapped connection
	pub fn inner(&self) -> &Arc<dyn Connection> {
		&self.inner
	}

	/// Whether this handle was force-closed
	pub fn is_force_closed(&self) -> bool {
		self.force_closed.load(Ordering::SeqCst)
	}

	/// Physically close the wrapped connection
	///
	/// Idempotent; close failures are logged and swallowed. Intended for
	/// the scope's cleanup phase, which reaches this method by downcasting
	/// through [`Connection::as_any`].
	pub async fn force_close(&self) {
		if self.force_closed.swap(true, Ordering::SeqCst) {
			return;
		}
		tracing::debug!("Force-closing scope-attached connection");
		close_quietly(self.inner.as_ref()).await;
	}

	fn guard_open(&self) -> ConnectionResult<()> {
		if self.is_force_closed() {
			return Err(ConnectionError::Closed);
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl Connection for AttachedConnection {
	fn is_closed(&self) -> bool {
		self.is_force_closed() || self.inner.is_closed()
	}

	fn is_auto_commit(&self) -> bool {
		self.inner.is_auto_commit()
	}

	async fn set_auto_commit(&self, auto_commit: bool) -> ConnectionResult<()> {
		self.guard_open()?;
		self.inner.set_auto_commit(auto_commit).await
	}

	async fn commit(&self) -> ConnectionResult<()> {
		self.guard_open()?;
		self.inner.commit().await
	}

	async fn rollback(&self) -> ConnectionResult<()> {
		self.guard_open()?;
		self.inner.rollback().await
	}

	/// Intercepted: the scope, not the caller, ends this connection
	async fn close(&self) -> ConnectionResult<()> {
		tracing::debug!("Ignoring close on scope-attached connection");
		Ok(())
	}

	async fn execute(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<QueryResult> {
		self.guard_open()?;
		self.inner.execute(sql, params).await
	}

	async fn fetch_one(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<Row> {
		self.guard_open()?;
		self.inner.fetch_one(sql, params).await
	}

	async fn fetch_all(&self, sql: &str, params: Vec<QueryValue>) -> ConnectionResult<Vec<Row>> {
		self.guard_open()?;
		self.inner.fetch_all(sql, params).await
	}

	async fn fetch_optional(
		&self,
		sql: &str,
		params: Vec<QueryValue>,
	) -> ConnectionResult<Option<Row>> {
		self.guard_open()?;
		self.inner.fetch_optional(sql, params).await
	}

	fn as_any(&self) -> &dyn Any {
		self
	}
}
