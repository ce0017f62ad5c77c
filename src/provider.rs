//! Scoped connection acquisition
//!
//! [`ConnectionProvider`] is the seam through which connections enter the
//! system: pools, single-connection factories, and test doubles all sit
//! behind it. [`UnitOfWorkAwareProvider`] decorates a provider so that every
//! acquisition inside a unit-of-work tree hands back the same physical
//! connection, and wires that connection's commit, rollback, and teardown
//! into the scope lifecycle.
//!
//! Code that runs both inside and outside a scope can call
//! [`UnitOfWorkAwareProvider::acquire`] unconditionally: without a scope it
//! degrades to plain delegation.

use crate::attached::AttachedConnection;
use crate::connection::{Connection, close_quietly};
use crate::error::{ConnectionResult, TransactionError, UnitOfWorkResult};
use crate::unit_of_work::{UnitOfWork, UnitOfWorkCallback};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Factory for database connections
///
/// Implementations hand out connections ready for use; whether they open a
/// fresh connection per call or draw from some shared supply is up to them.
#[async_trait::async_trait]
pub trait ConnectionProvider: Send + Sync {
	async fn acquire(&self) -> ConnectionResult<Arc<dyn Connection>>;
}

/// Registry key under which scoped connections are stored
///
/// Derived from the [`Connection`] trait's type name, so every component
/// that talks about "the scope's connection" resolves to the same slot.
pub fn connection_resource_key() -> &'static str {
	std::any::type_name::<dyn Connection>()
}

/// Connection provider that shares one connection per unit-of-work tree
///
/// Acquisitions inside a scope return a lifecycle-tracked handle
/// ([`AttachedConnection`]) registered with the scope: the scope's commit
/// and rollback drive the connection's transaction, and its cleanup phase
/// physically closes the connection. Repeated acquisitions reuse the stored
/// handle as long as its connection still reports open.
///
/// With `inherit` enabled (the default) the connection is stored on the
/// root scope and shared with every nested scope. With `inherit` disabled
/// each scope gets a connection of its own.
///
/// # Examples
///
/// ```
/// use std::sync::Arc;
/// use txscope::provider::UnitOfWorkAwareProvider;
/// use txscope::testing::MockConnectionProvider;
/// use txscope::unit_of_work::UnitOfWork;
///
/// # tokio_test::block_on(async {
/// let factory = Arc::new(MockConnectionProvider::new());
/// let provider = UnitOfWorkAwareProvider::new(factory.clone());
///
/// let scope = UnitOfWork::begin();
/// let first = provider.acquire(Some(&scope)).await.unwrap();
/// let second = provider.acquire(Some(&scope)).await.unwrap();
///
/// // Both handles are the same scoped connection
/// assert!(Arc::ptr_eq(&first, &second));
/// assert_eq!(factory.connection_count(), 1);
///
/// scope.commit().await.unwrap();
/// scope.cleanup().await;
/// # });
/// ```
pub struct UnitOfWorkAwareProvider {
	delegate: Arc<dyn ConnectionProvider>,
	inherit: bool,
	creation_gate: Mutex<()>,
}

impl UnitOfWorkAwareProvider {
	/// Wrap a provider; nested scopes share the root scope's connection
	pub fn new(delegate: Arc<dyn ConnectionProvider>) -> Self {
		Self::with_inherit(delegate, true)
	}

	/// Wrap a provider with explicit sharing behavior
	pub fn with_inherit(delegate: Arc<dyn ConnectionProvider>, inherit: bool) -> Self {
		Self {
			delegate,
			inherit,
			creation_gate: Mutex::new(()),
		}
	}

	/// Acquire a connection for the given scope
	///
	/// Without a scope this delegates directly to the wrapped provider and
	/// registers nothing. A scope already past its active phase, or whose
	/// root is, gets the same treatment: lifecycle callbacks can no longer
	/// fire there, so the connection comes back untracked. Provider
	/// failures propagate unchanged in every case.
	pub async fn acquire(
		&self,
		scope: Option<&UnitOfWork>,
	) -> ConnectionResult<Arc<dyn Connection>> {
		let Some(scope) = scope else {
			return self.delegate.acquire().await;
		};
		// A completed tree never runs its callbacks again, so a connection
		// parked there would stay open forever.
		if !scope.is_active() || !scope.root().is_active() {
			tracing::debug!(scope_id = %scope.id(), "Scope already completed, delegating unscoped");
			return self.delegate.acquire().await;
		}

		let owner = if self.inherit {
			scope.root()
		} else {
			scope.clone()
		};
		if let Some(existing) = live_scoped_connection(&owner) {
			tracing::debug!(scope_id = %owner.id(), "Reusing scoped connection");
			return Ok(existing);
		}

		// Serialize creation so two tasks missing at once cannot both store
		// a connection for the same scope.
		let _guard = self.creation_gate.lock().await;
		if let Some(existing) = live_scoped_connection(&owner) {
			tracing::debug!(scope_id = %owner.id(), "Reusing scoped connection");
			return Ok(existing);
		}

		let raw = self.delegate.acquire().await?;
		let attached: Arc<dyn Connection> = Arc::new(AttachedConnection::new(raw));
		let key = connection_resource_key();
		if self.inherit {
			owner.attach_inherited_resource(key, attached.clone());
		} else {
			owner.attach_resource(key, attached.clone());
		}
		scope.on_commit(CommitConnection {
			key,
			owner: owner.clone(),
		});
		scope.on_rollback(RollbackConnection {
			key,
			owner: owner.clone(),
		});
		scope.on_cleanup(CleanupConnection {
			key,
			owner: owner.clone(),
		});
		tracing::debug!(
			scope_id = %owner.id(),
			inherit = self.inherit,
			"Created scoped connection"
		);
		Ok(attached)
	}
}

/// Stored entry for the owner scope, if it still reports open
fn live_scoped_connection(owner: &UnitOfWork) -> Option<Arc<dyn Connection>> {
	let conn = match owner.resources().get(connection_resource_key()) {
		Some(entry) => entry.value.clone(),
		None => return None,
	};
	(!conn.is_closed()).then_some(conn)
}

/// Commits the scoped connection when the registering scope commits
struct CommitConnection {
	key: &'static str,
	owner: UnitOfWork,
}

#[async_trait::async_trait]
impl UnitOfWorkCallback for CommitConnection {
	async fn invoke(&self, _scope: &UnitOfWork) -> UnitOfWorkResult<()> {
		let conn = match self.owner.resources().get(self.key) {
			Some(entry) => entry.value.clone(),
			None => return Ok(()),
		};
		if !conn.is_auto_commit() {
			conn.commit().await.map_err(TransactionError::Commit)?;
		}
		Ok(())
	}
}

/// Rolls the scoped connection back when the registering scope rolls back
struct RollbackConnection {
	key: &'static str,
	owner: UnitOfWork,
}

#[async_trait::async_trait]
impl UnitOfWorkCallback for RollbackConnection {
	async fn invoke(&self, _scope: &UnitOfWork) -> UnitOfWorkResult<()> {
		let conn = match self.owner.resources().get(self.key) {
			Some(entry) => entry.value.clone(),
			None => return Ok(()),
		};
		if !conn.is_closed() && !conn.is_auto_commit() {
			conn.rollback().await.map_err(TransactionError::Rollback)?;
		}
		Ok(())
	}
}

/// Physically closes the scoped connection during cleanup
struct CleanupConnection {
	key: &'static str,
	owner: UnitOfWork,
}

#[async_trait::async_trait]
impl UnitOfWorkCallback for CleanupConnection {
	async fn invoke(&self, _scope: &UnitOfWork) -> UnitOfWorkResult<()> {
		let conn = match self.owner.resources().get(self.key) {
			Some(entry) => entry.value.clone(),
			None => return Ok(()),
		};
		close_quietly(conn.as_ref()).await;
		if let Some(attached) = conn.as_any().downcast_ref::<AttachedConnection>() {
			attached.force_close().await;
		}
		Ok(())
	}
}
