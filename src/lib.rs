//! # txscope
//!
//! Unit-of-work aware database connection management.
//!
//! This crate keeps every piece of a logical unit of work on one physical
//! database connection:
//!
//! - **Unit-of-work scopes** (`unit_of_work`): nestable scopes with a
//!   resource registry and commit/rollback/cleanup lifecycle callbacks
//! - **Scoped acquisition** (`provider`): a [`ConnectionProvider`] decorator
//!   that stores one connection per scope tree and hands it back for every
//!   acquisition inside that tree
//! - **Lifecycle-tracked handles** (`attached`): connection wrappers whose
//!   `close` is a no-op, so only the scope's cleanup phase ends the physical
//!   connection
//! - **SQLite backing** (`sqlite`): a concrete provider over `sqlx`
//! - **Test doubles** (`testing`): mock connections and providers with call
//!   recording and failure injection
//!
//! ## How it fits together
//!
//! Components acquire connections through a [`UnitOfWorkAwareProvider`]
//! instead of opening their own. Inside a scope, the first acquisition
//! creates and registers the connection; later acquisitions, including those
//! from nested scopes, receive the same handle. When the scope commits or
//! rolls back, the connection's transaction follows; when the scope tree is
//! cleaned up, the connection is physically closed. Outside any scope the
//! provider degrades to plain delegation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use txscope::prelude::*;
//! use txscope::sqlite::SqliteConnectionProvider;
//!
//! # async fn example() -> Result<(), anyhow::Error> {
//! let factory = Arc::new(SqliteConnectionProvider::new("sqlite://app.db"));
//! let provider = Arc::new(UnitOfWorkAwareProvider::new(factory));
//!
//! let orders = provider.clone();
//! UnitOfWork::run(|scope| async move {
//! 	let conn = orders.acquire(Some(&scope)).await?;
//! 	conn.set_auto_commit(false).await?;
//! 	conn.execute(
//! 		"INSERT INTO orders (item) VALUES (?)",
//! 		vec!["widget".into()],
//! 	)
//! 	.await?;
//! 	Ok(())
//! })
//! .await?;
//! # Ok(())
//! # }
//! ```

pub mod attached;
pub mod connection;
pub mod error;
pub mod provider;
pub mod sqlite;
pub mod testing;
pub mod types;
pub mod unit_of_work;

// Re-export common external dependencies
pub use async_trait::async_trait;

pub use attached::AttachedConnection;
pub use connection::Connection;
pub use error::{ConnectionError, TransactionError, UnitOfWorkError};
pub use provider::{ConnectionProvider, UnitOfWorkAwareProvider};
pub use unit_of_work::{Phase, UnitOfWork};

pub mod prelude {
	// Connection capability and handles
	pub use crate::attached::*;
	pub use crate::connection::*;

	// Errors
	pub use crate::error::*;

	// Scoped acquisition
	pub use crate::provider::*;

	// Unit-of-work scopes
	pub use crate::unit_of_work::*;

	// Value types
	pub use crate::types::*;

	// External
	pub use async_trait::async_trait;
}
