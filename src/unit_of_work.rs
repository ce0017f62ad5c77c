//! Unit-of-work scopes with resource registries and lifecycle callbacks
//!
//! A [`UnitOfWork`] models one logical piece of work, usually a business
//! transaction. Scopes nest: [`UnitOfWork::begin_nested`] starts a child
//! that can see resources its ancestors marked as inheritable, and the
//! whole tree shares one [root](UnitOfWork::root). Components register
//! resources (database connections, keyed by name) and lifecycle callbacks
//! that fire when the scope commits, rolls back, or is cleaned up.
//!
//! Driving a scope by hand means calling [`commit`](UnitOfWork::commit) or
//! [`rollback`](UnitOfWork::rollback) followed by
//! [`cleanup`](UnitOfWork::cleanup). The [`UnitOfWork::run`] closure runner
//! does this bookkeeping automatically.
//!
//! # Examples
//!
//! ```
//! use txscope::unit_of_work::UnitOfWork;
//!
//! # tokio_test::block_on(async {
//! let scope = UnitOfWork::begin();
//! scope.on_commit(|_scope: UnitOfWork| async move {
//! 	// runs when the scope commits
//! 	Ok(())
//! });
//!
//! scope.commit().await.unwrap();
//! scope.cleanup().await;
//! # });
//! ```

use crate::connection::Connection;
use crate::error::{UnitOfWorkError, UnitOfWorkResult};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use uuid::Uuid;

/// Lifecycle phase of a unit of work
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
	/// Accepting work and lifecycle registrations
	Active,
	/// Commit callbacks ran successfully
	Committed,
	/// Rollback callbacks ran (or a failed commit fell back to them)
	RolledBack,
	/// Cleanup callbacks ran; terminal
	Cleaned,
}

/// Resource registered with a scope
///
/// `inherited` controls visibility: inheritable resources are found by
/// descendant scopes through [`UnitOfWork::get_resource`], private ones are
/// not.
#[derive(Clone)]
pub struct Resource {
	pub value: Arc<dyn Connection>,
	pub inherited: bool,
}

impl std::fmt::Debug for Resource {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Resource")
			.field("inherited", &self.inherited)
			.finish_non_exhaustive()
	}
}

/// Callback fired on a unit-of-work lifecycle event
///
/// Async closures taking an owned [`UnitOfWork`] implement this trait
/// through a blanket impl, so both named callback types and ad-hoc closures
/// can be registered.
#[async_trait::async_trait]
pub trait UnitOfWorkCallback: Send + Sync {
	async fn invoke(&self, scope: &UnitOfWork) -> UnitOfWorkResult<()>;
}

#[async_trait::async_trait]
impl<F, Fut> UnitOfWorkCallback for F
where
	F: Fn(UnitOfWork) -> Fut + Send + Sync,
	Fut: std::future::Future<Output = UnitOfWorkResult<()>> + Send,
{
	async fn invoke(&self, scope: &UnitOfWork) -> UnitOfWorkResult<()> {
		self(scope.clone()).await
	}
}

struct Inner {
	id: String,
	parent: Option<UnitOfWork>,
	phase: Mutex<Phase>,
	resources: DashMap<String, Resource>,
	commit_callbacks: Mutex<Vec<Arc<dyn UnitOfWorkCallback>>>,
	rollback_callbacks: Mutex<Vec<Arc<dyn UnitOfWorkCallback>>>,
	cleanup_callbacks: Mutex<Vec<Arc<dyn UnitOfWorkCallback>>>,
}

/// Handle to a unit-of-work scope
///
/// Cloning is cheap and every clone refers to the same scope. Scopes form a
/// tree; resources and callbacks live on the scope they were registered
/// with, except cleanup callbacks, which always land on the root so shared
/// resources survive until the whole tree is done.
#[derive(Clone)]
pub struct UnitOfWork {
	inner: Arc<Inner>,
}

impl std::fmt::Debug for UnitOfWork {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("UnitOfWork")
			.field("id", &self.inner.id)
			.field("phase", &self.phase())
			.field("root", &self.is_root())
			.finish()
	}
}

impl UnitOfWork {
	/// Start a new root scope
	pub fn begin() -> Self {
		Self::new(None)
	}

	/// Start a nested scope under this one
	pub fn begin_nested(&self) -> Self {
		Self::new(Some(self.clone()))
	}

	fn new(parent: Option<UnitOfWork>) -> Self {
		let scope = Self {
			inner: Arc::new(Inner {
				id: Uuid::new_v4().to_string(),
				parent,
				phase: Mutex::new(Phase::Active),
				resources: DashMap::new(),
				commit_callbacks: Mutex::new(Vec::new()),
				rollback_callbacks: Mutex::new(Vec::new()),
				cleanup_callbacks: Mutex::new(Vec::new()),
			}),
		};
		tracing::debug!(
			scope_id = %scope.inner.id,
			root = scope.is_root(),
			"Started unit of work"
		);
		scope
	}

	/// Identifier of this scope, for log correlation
	pub fn id(&self) -> &str {
		&self.inner.id
	}

	/// Parent scope, if this is a nested scope
	pub fn parent(&self) -> Option<UnitOfWork> {
		self.inner.parent.clone()
	}

	/// Whether this scope is the root of its tree
	pub fn is_root(&self) -> bool {
		self.inner.parent.is_none()
	}

	/// Root scope of the tree this scope belongs to
	pub fn root(&self) -> UnitOfWork {
		let mut current = self.clone();
		while let Some(parent) = current.parent() {
			current = parent;
		}
		current
	}

	/// Current lifecycle phase
	pub fn phase(&self) -> Phase {
		*self.inner.phase.lock()
	}

	/// Whether the scope still accepts work
	pub fn is_active(&self) -> bool {
		self.phase() == Phase::Active
	}

	/// Resources registered directly with this scope
	pub fn resources(&self) -> &DashMap<String, Resource> {
		&self.inner.resources
	}

	/// Register a resource private to this scope
	///
	/// An existing entry under the same key is replaced.
	pub fn attach_resource(&self, key: impl Into<String>, value: Arc<dyn Connection>) {
		self.inner.resources.insert(
			key.into(),
			Resource {
				value,
				inherited: false,
			},
		);
	}

	/// Register a resource that nested scopes may see
	pub fn attach_inherited_resource(&self, key: impl Into<String>, value: Arc<dyn Connection>) {
		self.inner.resources.insert(
			key.into(),
			Resource {
				value,
				inherited: true,
			},
		);
	}

	/// Look up a resource by key
	///
	/// The scope's own registry is checked first; then ancestors are walked
	/// towards the root. The walk stops at the first scope holding the key,
	/// and its entry is only returned when marked inheritable.
	pub fn get_resource(&self, key: &str) -> Option<Arc<dyn Connection>> {
		if let Some(entry) = self.inner.resources.get(key) {
			return Some(entry.value.clone());
		}
		let mut current = self.parent();
		while let Some(scope) = current {
			if let Some(entry) = scope.inner.resources.get(key) {
				return entry.inherited.then(|| entry.value.clone());
			}
			current = scope.parent();
		}
		None
	}

	/// Register a callback to run when this scope commits
	pub fn on_commit<C>(&self, callback: C)
	where
		C: UnitOfWorkCallback + 'static,
	{
		self.inner.commit_callbacks.lock().push(Arc::new(callback));
	}

	/// Register a callback to run when this scope rolls back
	pub fn on_rollback<C>(&self, callback: C)
	where
		C: UnitOfWorkCallback + 'static,
	{
		self.inner.rollback_callbacks.lock().push(Arc::new(callback));
	}

	/// Register a callback to run when the scope tree is cleaned up
	///
	/// Registrations always land on the root scope: shared resources must
	/// stay usable until the outermost scope finishes.
	pub fn on_cleanup<C>(&self, callback: C)
	where
		C: UnitOfWorkCallback + 'static,
	{
		self.root()
			.inner
			.cleanup_callbacks
			.lock()
			.push(Arc::new(callback));
	}

	/// Commit this scope
	///
	/// Runs the commit callbacks in registration order. If one fails, the
	/// rollback callbacks run best-effort, the scope lands in
	/// [`Phase::RolledBack`], and the commit error is returned.
	pub async fn commit(&self) -> UnitOfWorkResult<()> {
		self.transition(Phase::Committed)?;
		let callbacks = std::mem::take(&mut *self.inner.commit_callbacks.lock());
		for callback in callbacks {
			if let Err(e) = callback.invoke(self).await {
				tracing::warn!(
					scope_id = %self.inner.id,
					error = %e,
					"Commit callback failed, rolling back"
				);
				self.run_rollback_callbacks().await;
				*self.inner.phase.lock() = Phase::RolledBack;
				return Err(e);
			}
		}
		tracing::debug!(scope_id = %self.inner.id, "Unit of work committed");
		Ok(())
	}

	/// Roll back this scope
	///
	/// Runs every rollback callback even if one fails; the first failure is
	/// returned.
	pub async fn rollback(&self) -> UnitOfWorkResult<()> {
		self.transition(Phase::RolledBack)?;
		match self.run_rollback_callbacks().await {
			Some(e) => Err(e),
			None => {
				tracing::debug!(scope_id = %self.inner.id, "Unit of work rolled back");
				Ok(())
			}
		}
	}

	/// Clean up the scope tree
	///
	/// Only the root actually runs cleanup callbacks; on nested scopes this
	/// is a no-op because their registrations were forwarded to the root.
	/// Cleanup never fails: callback errors are logged and swallowed.
	/// Calling it twice is safe.
	pub async fn cleanup(&self) {
		if !self.is_root() {
			tracing::debug!(scope_id = %self.inner.id, "Cleanup deferred to the root scope");
			return;
		}
		{
			let mut phase = self.inner.phase.lock();
			if *phase == Phase::Cleaned {
				return;
			}
			*phase = Phase::Cleaned;
		}
		let callbacks = std::mem::take(&mut *self.inner.cleanup_callbacks.lock());
		for callback in callbacks {
			if let Err(e) = callback.invoke(self).await {
				tracing::warn!(
					scope_id = %self.inner.id,
					error = %e,
					"Cleanup callback failed"
				);
			}
		}
		self.inner.resources.clear();
		tracing::debug!(scope_id = %self.inner.id, "Unit of work cleaned up");
	}

	/// Run a closure inside a fresh root scope
	///
	/// The scope commits when the closure returns `Ok`, rolls back when it
	/// returns `Err`, and is cleaned up in both cases.
	///
	/// # Examples
	///
	/// ```
	/// use txscope::unit_of_work::UnitOfWork;
	///
	/// # tokio_test::block_on(async {
	/// let value = UnitOfWork::run(|_scope| async move {
	/// 	// do transactional work with the scope
	/// 	Ok(42)
	/// })
	/// .await
	/// .unwrap();
	///
	/// assert_eq!(value, 42);
	/// # });
	/// ```
	pub async fn run<T, F, Fut>(f: F) -> Result<T, anyhow::Error>
	where
		F: FnOnce(UnitOfWork) -> Fut,
		Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
	{
		let scope = UnitOfWork::begin();
		let outcome = match f(scope.clone()).await {
			Ok(value) => scope.commit().await.map(|_| value).map_err(Into::into),
			Err(e) => {
				if let Err(rollback_err) = scope.rollback().await {
					tracing::warn!(
						scope_id = %scope.inner.id,
						error = %rollback_err,
						"Rollback after failed closure also failed"
					);
				}
				Err(e)
			}
		};
		scope.cleanup().await;
		outcome
	}

	fn transition(&self, next: Phase) -> UnitOfWorkResult<()> {
		let mut phase = self.inner.phase.lock();
		if *phase != Phase::Active {
			return Err(UnitOfWorkError::Completed { phase: *phase });
		}
		*phase = next;
		Ok(())
	}

	async fn run_rollback_callbacks(&self) -> Option<UnitOfWorkError> {
		let callbacks = std::mem::take(&mut *self.inner.rollback_callbacks.lock());
		let mut first_error = None;
		for callback in callbacks {
			if let Err(e) = callback.invoke(self).await {
				tracing::warn!(
					scope_id = %self.inner.id,
					error = %e,
					"Rollback callback failed"
				);
				if first_error.is_none() {
					first_error = Some(e);
				}
			}
		}
		first_error
	}
}
