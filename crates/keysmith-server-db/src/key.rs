// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key repository for database operations.
//!
//! One row per issued key, keyed by the key value. Rows are never deleted;
//! deactivation only sets `status`, `deactivated_at` and `deactivation_reason`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keysmith_core::{
	ContextId, DeactivationReason, KeyRecord, KeyStats, KeyStatus, KeyValue, PrincipalId,
};
use sqlx::{sqlite::SqlitePool, Row};

use crate::error::DbError;

/// Durable mapping from key value to key record.
#[async_trait]
pub trait KeyStore: Send + Sync {
	/// Deactivate any active record of `record.principal_id` as superseded and
	/// insert `record` as active, in one atomic step.
	///
	/// Returns the number of superseded records (0 or 1). Fails with
	/// [`DbError::DuplicateKeyValue`] if the value already exists.
	async fn create_active(&self, record: &KeyRecord) -> Result<u64, DbError>;

	async fn get_active(&self, principal_id: &PrincipalId) -> Result<Option<KeyRecord>, DbError>;

	/// Point lookup by value. Returns the record whatever its status.
	async fn get_by_value(&self, value: &KeyValue) -> Result<Option<KeyRecord>, DbError>;

	/// Deactivate the record with `value`.
	///
	/// Returns `true` if this call changed the record. Unknown and already
	/// deactivated values are a no-op success.
	async fn deactivate(
		&self,
		value: &KeyValue,
		reason: DeactivationReason,
		at: DateTime<Utc>,
	) -> Result<bool, DbError>;

	/// Deactivate the active record of a principal, if any. Returns 0 or 1.
	async fn deactivate_active_for_principal(
		&self,
		principal_id: &PrincipalId,
		reason: DeactivationReason,
		at: DateTime<Utc>,
	) -> Result<u64, DbError>;

	/// Snapshot of all active records.
	async fn list_active(&self) -> Result<Vec<KeyRecord>, DbError>;

	async fn stats(&self) -> Result<KeyStats, DbError>;

	/// Cheap reachability check for health checks.
	async fn ping(&self) -> Result<(), DbError>;
}

/// Repository for key database operations.
#[derive(Clone)]
pub struct SqliteKeyStore {
	pool: SqlitePool,
}

impl SqliteKeyStore {
	/// Create a new key repository with the given pool.
	///
	/// The `keys` table must already exist; see [`crate::run_migrations`].
	pub fn new(pool: SqlitePool) -> Self {
		Self { pool }
	}

	pub fn pool(&self) -> &SqlitePool {
		&self.pool
	}
}

#[async_trait]
impl KeyStore for SqliteKeyStore {
	#[tracing::instrument(
		skip(self, record),
		fields(principal_id = %record.principal_id, key = %record.value.redacted())
	)]
	async fn create_active(&self, record: &KeyRecord) -> Result<u64, DbError> {
		if !record.is_active() {
			return Err(DbError::Internal(
				"create_active requires an active record".to_string(),
			));
		}

		let mut tx = self.pool.begin().await?;

		let superseded = sqlx::query(
			r#"
			UPDATE keys
			SET status = 'deactivated', deactivated_at = ?, deactivation_reason = ?
			WHERE principal_id = ? AND status = 'active'
			"#,
		)
		.bind(record.issued_at.to_rfc3339())
		.bind(DeactivationReason::Superseded.as_str())
		.bind(record.principal_id.as_str())
		.execute(&mut *tx)
		.await?
		.rows_affected();

		sqlx::query(
			r#"
			INSERT INTO keys (
				value, principal_id, principal_name, context_id, issued_at, status
			) VALUES (?, ?, ?, ?, ?, 'active')
			"#,
		)
		.bind(record.value.as_str())
		.bind(record.principal_id.as_str())
		.bind(record.principal_name.as_deref())
		.bind(record.context_id.as_str())
		.bind(record.issued_at.to_rfc3339())
		.execute(&mut *tx)
		.await
		.map_err(map_insert_error)?;

		tx.commit().await?;

		tracing::debug!(superseded, "key record created");
		Ok(superseded)
	}

	#[tracing::instrument(skip(self), fields(principal_id = %principal_id))]
	async fn get_active(&self, principal_id: &PrincipalId) -> Result<Option<KeyRecord>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT value, principal_id, principal_name, context_id, issued_at,
			       status, deactivated_at, deactivation_reason
			FROM keys
			WHERE principal_id = ? AND status = 'active'
			"#,
		)
		.bind(principal_id.as_str())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|row| parse_key_row(&row)).transpose()
	}

	#[tracing::instrument(skip(self, value), fields(key = %value.redacted()))]
	async fn get_by_value(&self, value: &KeyValue) -> Result<Option<KeyRecord>, DbError> {
		let row = sqlx::query(
			r#"
			SELECT value, principal_id, principal_name, context_id, issued_at,
			       status, deactivated_at, deactivation_reason
			FROM keys
			WHERE value = ?
			"#,
		)
		.bind(value.as_str())
		.fetch_optional(&self.pool)
		.await?;

		row.map(|row| parse_key_row(&row)).transpose()
	}

	#[tracing::instrument(skip(self, value), fields(key = %value.redacted(), reason = %reason))]
	async fn deactivate(
		&self,
		value: &KeyValue,
		reason: DeactivationReason,
		at: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE keys
			SET status = 'deactivated', deactivated_at = ?, deactivation_reason = ?
			WHERE value = ? AND status = 'active'
			"#,
		)
		.bind(at.to_rfc3339())
		.bind(reason.as_str())
		.bind(value.as_str())
		.execute(&self.pool)
		.await?;

		let changed = result.rows_affected() > 0;
		if changed {
			tracing::debug!("key deactivated");
		}
		Ok(changed)
	}

	#[tracing::instrument(skip(self), fields(principal_id = %principal_id, reason = %reason))]
	async fn deactivate_active_for_principal(
		&self,
		principal_id: &PrincipalId,
		reason: DeactivationReason,
		at: DateTime<Utc>,
	) -> Result<u64, DbError> {
		let result = sqlx::query(
			r#"
			UPDATE keys
			SET status = 'deactivated', deactivated_at = ?, deactivation_reason = ?
			WHERE principal_id = ? AND status = 'active'
			"#,
		)
		.bind(at.to_rfc3339())
		.bind(reason.as_str())
		.bind(principal_id.as_str())
		.execute(&self.pool)
		.await?;

		Ok(result.rows_affected())
	}

	#[tracing::instrument(skip(self))]
	async fn list_active(&self) -> Result<Vec<KeyRecord>, DbError> {
		let rows = sqlx::query(
			r#"
			SELECT value, principal_id, principal_name, context_id, issued_at,
			       status, deactivated_at, deactivation_reason
			FROM keys
			WHERE status = 'active'
			ORDER BY issued_at ASC
			"#,
		)
		.fetch_all(&self.pool)
		.await?;

		let mut records = Vec::with_capacity(rows.len());
		for row in rows {
			records.push(parse_key_row(&row)?);
		}
		tracing::debug!(count = records.len(), "listed active keys");
		Ok(records)
	}

	#[tracing::instrument(skip(self))]
	async fn stats(&self) -> Result<KeyStats, DbError> {
		let row = sqlx::query(
			r#"
			SELECT COUNT(*) AS total,
			       COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0) AS active
			FROM keys
			"#,
		)
		.fetch_one(&self.pool)
		.await?;

		let total: i64 = row.get("total");
		let active: i64 = row.get("active");
		Ok(KeyStats::new(active.max(0) as u64, total.max(0) as u64))
	}

	async fn ping(&self) -> Result<(), DbError> {
		sqlx::query("SELECT 1").execute(&self.pool).await?;
		Ok(())
	}
}

fn map_insert_error(err: sqlx::Error) -> DbError {
	if let sqlx::Error::Database(db_err) = &err {
		if db_err.is_unique_violation() {
			if db_err.message().contains("keys.value") {
				return DbError::DuplicateKeyValue;
			}
			return DbError::Conflict(format!(
				"principal already holds an active key: {}",
				db_err.message()
			));
		}
	}
	DbError::Sqlx(err)
}

fn parse_timestamp(raw: &str, column: &str) -> Result<DateTime<Utc>, DbError> {
	DateTime::parse_from_rfc3339(raw)
		.map(|dt| dt.with_timezone(&Utc))
		.map_err(|e| DbError::Internal(format!("Invalid {column}: {e}")))
}

fn parse_key_row(row: &sqlx::sqlite::SqliteRow) -> Result<KeyRecord, DbError> {
	let value: String = row.get("value");
	let principal_id: String = row.get("principal_id");
	let principal_name: Option<String> = row.get("principal_name");
	let context_id: String = row.get("context_id");
	let issued_at_str: String = row.get("issued_at");
	let status_str: String = row.get("status");
	let deactivated_at_str: Option<String> = row.get("deactivated_at");
	let reason_str: Option<String> = row.get("deactivation_reason");

	let issued_at = parse_timestamp(&issued_at_str, "issued_at")?;

	let status = match (status_str.as_str(), deactivated_at_str, reason_str) {
		("active", None, None) => KeyStatus::Active,
		("deactivated", Some(at), Some(reason)) => KeyStatus::Deactivated {
			at: parse_timestamp(&at, "deactivated_at")?,
			reason: reason
				.parse()
				.map_err(|e| DbError::Internal(format!("Invalid deactivation_reason: {e}")))?,
		},
		(other, _, _) => {
			return Err(DbError::Internal(format!(
				"Inconsistent key status row: {other}"
			)))
		}
	};

	Ok(KeyRecord {
		value: KeyValue::normalize(&value),
		principal_id: PrincipalId::new(principal_id),
		principal_name,
		context_id: ContextId::new(context_id),
		issued_at,
		status,
	})
}
