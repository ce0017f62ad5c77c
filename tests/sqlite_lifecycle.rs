//! SQLite-backed scope lifecycle tests
//! Covers commit persistence, rollback, and physical teardown against a
//! file-backed database

use std::sync::Arc;
use tempfile::TempDir;
use txscope::sqlite::{SqliteConnection, SqliteConnectionProvider};
use txscope::{Connection, ConnectionError, UnitOfWork, UnitOfWorkAwareProvider};

fn database_url(dir: &TempDir) -> String {
	format!(
		"sqlite://{}?mode=rwc",
		dir.path().join("scope.db").display()
	)
}

#[tokio::test]
async fn test_scope_reuses_one_sqlite_connection() {
	// Test that every acquisition in a scope tree is the same physical
	// connection; a temporary table is only visible on the connection that
	// created it
	let dir = TempDir::new().expect("Failed to create temp directory");
	let factory = Arc::new(SqliteConnectionProvider::new(database_url(&dir)));
	let provider = UnitOfWorkAwareProvider::new(factory);
	let scope = UnitOfWork::begin();
	let nested = scope.begin_nested();

	let root_handle = provider
		.acquire(Some(&scope))
		.await
		.expect("Failed to acquire root connection");
	let nested_handle = provider
		.acquire(Some(&nested))
		.await
		.expect("Failed to acquire nested connection");
	assert!(Arc::ptr_eq(&root_handle, &nested_handle));

	root_handle
		.execute("CREATE TEMPORARY TABLE scratch (x INTEGER)", vec![])
		.await
		.expect("Failed to create temporary table");
	nested_handle
		.execute("INSERT INTO scratch (x) VALUES (1)", vec![])
		.await
		.expect("Failed to insert through nested handle");

	let row = root_handle
		.fetch_one("SELECT COUNT(*) AS n FROM scratch", vec![])
		.await
		.expect("Failed to count rows");
	assert_eq!(row.get::<i64>("n").expect("Failed to read count"), 1);

	scope.commit().await.expect("Failed to commit scope");
	scope.cleanup().await;
}

#[tokio::test]
async fn test_committed_scope_persists_rows() {
	// Test that work committed through the scope survives a reopen
	let dir = TempDir::new().expect("Failed to create temp directory");
	let url = database_url(&dir);
	let factory = Arc::new(SqliteConnectionProvider::new(&url));
	let provider = UnitOfWorkAwareProvider::new(factory);
	let scope = UnitOfWork::begin();

	let conn = provider
		.acquire(Some(&scope))
		.await
		.expect("Failed to acquire connection");
	conn.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT)", vec![])
		.await
		.expect("Failed to create table");
	conn.set_auto_commit(false)
		.await
		.expect("Failed to enter manual mode");
	conn.execute("INSERT INTO orders (item) VALUES (?)", vec!["widget".into()])
		.await
		.expect("Failed to insert row");

	scope.commit().await.expect("Failed to commit scope");
	scope.cleanup().await;

	let verify = SqliteConnection::connect(&url)
		.await
		.expect("Failed to reopen database");
	let row = verify
		.fetch_one("SELECT COUNT(*) AS n FROM orders", vec![])
		.await
		.expect("Failed to count rows");
	assert_eq!(row.get::<i64>("n").expect("Failed to read count"), 1);
}

#[tokio::test]
async fn test_rolled_back_scope_discards_rows() {
	// Test that work in a rolled-back scope never reaches the database
	let dir = TempDir::new().expect("Failed to create temp directory");
	let url = database_url(&dir);
	let factory = Arc::new(SqliteConnectionProvider::new(&url));
	let provider = UnitOfWorkAwareProvider::new(factory);
	let scope = UnitOfWork::begin();

	let conn = provider
		.acquire(Some(&scope))
		.await
		.expect("Failed to acquire connection");
	conn.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT)", vec![])
		.await
		.expect("Failed to create table");
	conn.set_auto_commit(false)
		.await
		.expect("Failed to enter manual mode");
	conn.execute("INSERT INTO orders (item) VALUES (?)", vec!["widget".into()])
		.await
		.expect("Failed to insert row");

	scope.rollback().await.expect("Failed to roll back scope");
	scope.cleanup().await;

	let verify = SqliteConnection::connect(&url)
		.await
		.expect("Failed to reopen database");
	let row = verify
		.fetch_one("SELECT COUNT(*) AS n FROM orders", vec![])
		.await
		.expect("Failed to count rows");
	assert_eq!(row.get::<i64>("n").expect("Failed to read count"), 0);
}

#[tokio::test]
async fn test_auto_commit_connection_skips_explicit_commit() {
	// Test that a connection left in auto-commit mode persists statements as
	// they execute and the scope commit leaves it alone
	let dir = TempDir::new().expect("Failed to create temp directory");
	let url = database_url(&dir);
	let factory = Arc::new(SqliteConnectionProvider::new(&url));
	let provider = UnitOfWorkAwareProvider::new(factory);
	let scope = UnitOfWork::begin();

	let conn = provider
		.acquire(Some(&scope))
		.await
		.expect("Failed to acquire connection");
	conn.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY, item TEXT)", vec![])
		.await
		.expect("Failed to create table");
	conn.execute("INSERT INTO orders (item) VALUES (?)", vec!["widget".into()])
		.await
		.expect("Failed to insert row");

	scope.commit().await.expect("Failed to commit scope");
	scope.cleanup().await;

	let verify = SqliteConnection::connect(&url)
		.await
		.expect("Failed to reopen database");
	let row = verify
		.fetch_one("SELECT COUNT(*) AS n FROM orders", vec![])
		.await
		.expect("Failed to count rows");
	assert_eq!(row.get::<i64>("n").expect("Failed to read count"), 1);
}

#[tokio::test]
async fn test_logical_close_is_intercepted_until_cleanup() {
	// Test that closing the scoped handle is a no-op while the scope lives
	// and that cleanup makes the handle terminal
	let dir = TempDir::new().expect("Failed to create temp directory");
	let factory = Arc::new(SqliteConnectionProvider::new(database_url(&dir)));
	let provider = UnitOfWorkAwareProvider::new(factory);
	let scope = UnitOfWork::begin();

	let conn = provider
		.acquire(Some(&scope))
		.await
		.expect("Failed to acquire connection");
	conn.execute("CREATE TABLE t (x INTEGER)", vec![])
		.await
		.expect("Failed to create table");

	conn.close().await.expect("Failed to request close");
	conn.execute("INSERT INTO t (x) VALUES (1)", vec![])
		.await
		.expect("Failed to insert after logical close");

	scope.commit().await.expect("Failed to commit scope");
	scope.cleanup().await;

	assert!(conn.is_closed());
	let result = conn.execute("SELECT 1", vec![]).await;
	assert!(matches!(result, Err(ConnectionError::Closed)));
}

#[tokio::test]
async fn test_closure_runner_against_real_database() {
	// Test the closure runner end to end against a file-backed database
	let dir = TempDir::new().expect("Failed to create temp directory");
	let url = database_url(&dir);
	let factory = Arc::new(SqliteConnectionProvider::new(&url));
	let provider = Arc::new(UnitOfWorkAwareProvider::new(factory));

	let scoped = provider.clone();
	let inserted = UnitOfWork::run(|scope| async move {
		let conn = scoped.acquire(Some(&scope)).await?;
		conn.execute("CREATE TABLE events (name TEXT)", vec![]).await?;
		conn.set_auto_commit(false).await?;
		for name in ["created", "paid", "shipped"] {
			conn.execute("INSERT INTO events (name) VALUES (?)", vec![name.into()])
				.await?;
		}
		let row = conn
			.fetch_one("SELECT COUNT(*) AS n FROM events", vec![])
			.await?;
		let n: i64 = row.get("n")?;
		Ok(n)
	})
	.await
	.expect("Failed to run unit of work");
	assert_eq!(inserted, 3);

	let verify = SqliteConnection::connect(&url)
		.await
		.expect("Failed to reopen database");
	let row = verify
		.fetch_one("SELECT COUNT(*) AS n FROM events", vec![])
		.await
		.expect("Failed to count rows");
	assert_eq!(row.get::<i64>("n").expect("Failed to read count"), 3);
}

#[tokio::test]
async fn test_unscoped_acquisition_closes_directly() {
	// Test that a connection acquired outside any scope is caller-managed
	let dir = TempDir::new().expect("Failed to create temp directory");
	let factory = Arc::new(SqliteConnectionProvider::new(database_url(&dir)));
	let provider = UnitOfWorkAwareProvider::new(factory);

	let conn = provider
		.acquire(None)
		.await
		.expect("Failed to acquire connection");
	conn.execute("CREATE TABLE t (x INTEGER)", vec![])
		.await
		.expect("Failed to create table");

	conn.close().await.expect("Failed to close connection");
	assert!(conn.is_closed());
	let result = conn.execute("SELECT 1", vec![]).await;
	assert!(matches!(result, Err(ConnectionError::Closed)));
}
