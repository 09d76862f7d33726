// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqliteSynchronous};
use std::str::FromStr;

use crate::error::DbError;

/// Create a SqlitePool with WAL mode and common settings.
///
/// # Arguments
/// * `database_url` - SQLite connection string (e.g., "sqlite:./keys.db")
///
/// # Errors
/// Returns `DbError::Internal` if the URL is invalid or connection fails.
#[tracing::instrument(skip(database_url))]
pub async fn create_pool(database_url: &str) -> Result<SqlitePool, DbError> {
	let options = SqliteConnectOptions::from_str(database_url)
		.map_err(|e| DbError::Internal(format!("Invalid database URL: {e}")))?
		.journal_mode(SqliteJournalMode::Wal)
		.synchronous(SqliteSynchronous::Normal)
		.create_if_missing(true);

	let pool = SqlitePool::connect_with(options).await?;

	tracing::debug!("database pool created");
	Ok(pool)
}

/// Create the `keys` table and its indexes if they do not exist.
///
/// The partial unique index on `principal_id` backs the single-active-key
/// rule at the storage layer, independent of any application lock.
#[tracing::instrument(skip(pool))]
pub async fn run_migrations(pool: &SqlitePool) -> Result<(), DbError> {
	sqlx::query(
		r#"
		CREATE TABLE IF NOT EXISTS keys (
			value TEXT PRIMARY KEY,
			principal_id TEXT NOT NULL,
			principal_name TEXT,
			context_id TEXT NOT NULL,
			issued_at TEXT NOT NULL,
			status TEXT NOT NULL DEFAULT 'active',
			deactivated_at TEXT,
			deactivation_reason TEXT,
			CHECK (status IN ('active', 'deactivated')),
			CHECK ((status = 'active') = (deactivated_at IS NULL)),
			CHECK ((deactivated_at IS NULL) = (deactivation_reason IS NULL))
		)
		"#,
	)
	.execute(pool)
	.await?;

	sqlx::query("CREATE INDEX IF NOT EXISTS idx_keys_principal_id ON keys(principal_id)")
		.execute(pool)
		.await?;

	sqlx::query(
		r#"
		CREATE UNIQUE INDEX IF NOT EXISTS idx_keys_one_active_per_principal
		ON keys(principal_id) WHERE status = 'active'
		"#,
	)
	.execute(pool)
	.await?;

	tracing::debug!("database migrations applied");
	Ok(())
}
