// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key lifecycle operations.
//!
//! Every mutating operation for a principal runs under that principal's
//! lock, so two concurrent issuance requests can never both create a key.
//! The lock also covers the rate-limit bookkeeping.

use std::sync::Arc;
use std::time::Duration;

use keysmith_core::{
	Clock, ContextId, DeactivationReason, KeyRecord, KeyStats, KeyValue, OperationClass,
	PrincipalId,
};
use keysmith_server_config::LimitsConfig;
use keysmith_server_db::{DbError, KeyStore};
use tracing::{debug, info, instrument, warn};

use crate::error::KeyError;
use crate::locks::PrincipalLocks;
use crate::oracle::AuthorizationOracle;
use crate::rate_limiter::{RateLimits, SlidingWindowLimiter};

/// Process-wide in-memory state shared by the manager and the sweep job.
pub struct Registries {
	pub limiter: SlidingWindowLimiter,
	pub locks: PrincipalLocks,
}

impl Registries {
	pub fn new(limits: RateLimits, lock_timeout: Duration, clock: Arc<dyn Clock>) -> Self {
		Self {
			limiter: SlidingWindowLimiter::new(limits, clock),
			locks: PrincipalLocks::new(lock_timeout),
		}
	}

	pub fn from_config(config: &LimitsConfig, clock: Arc<dyn Clock>) -> Self {
		Self::new(
			RateLimits::from(config),
			Duration::from_millis(config.lock_timeout_ms),
			clock,
		)
	}

	/// Drop expired rate windows and idle locks.
	pub fn sweep(&self) -> SweepCounts {
		SweepCounts {
			windows_removed: self.limiter.sweep(),
			locks_removed: self.locks.sweep(),
		}
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SweepCounts {
	pub windows_removed: usize,
	pub locks_removed: usize,
}

/// Result of an issuance request.
#[derive(Debug, Clone)]
pub struct IssuedKey {
	pub record: KeyRecord,
	/// `false` when the principal already had an active key and it was returned as-is.
	pub created: bool,
}

pub struct KeyLifecycleManager {
	store: Arc<dyn KeyStore>,
	oracle: Arc<dyn AuthorizationOracle>,
	registries: Arc<Registries>,
	clock: Arc<dyn Clock>,
	key_allocation_attempts: u32,
}

fn retry_after_secs(retry_after: Duration) -> u64 {
	let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
	secs.max(1)
}

impl KeyLifecycleManager {
	pub fn new(
		store: Arc<dyn KeyStore>,
		oracle: Arc<dyn AuthorizationOracle>,
		registries: Arc<Registries>,
		clock: Arc<dyn Clock>,
		key_allocation_attempts: u32,
	) -> Self {
		Self {
			store,
			oracle,
			registries,
			clock,
			key_allocation_attempts: key_allocation_attempts.max(1),
		}
	}

	pub fn store(&self) -> &Arc<dyn KeyStore> {
		&self.store
	}

	pub fn registries(&self) -> &Arc<Registries> {
		&self.registries
	}

	fn consume_budget(&self, principal: &PrincipalId, class: OperationClass) -> Result<(), KeyError> {
		self.registries
			.limiter
			.check(principal, class)
			.map_err(|retry_after| KeyError::RateLimited {
				class,
				retry_after_secs: retry_after_secs(retry_after),
			})
	}

	/// Issue a key for the principal, or return the one it already holds.
	///
	/// The issuance budget is consumed as soon as the call is admitted, even
	/// if the principal turns out to be unauthorized or already has a key.
	#[instrument(skip(self, principal_name), fields(principal_id = %principal, context_id = %context))]
	pub async fn issue(
		&self,
		principal: &PrincipalId,
		context: &ContextId,
		principal_name: Option<String>,
	) -> Result<IssuedKey, KeyError> {
		let _guard = self.registries.locks.acquire(principal).await?;

		self.consume_budget(principal, OperationClass::Issuance)?;

		match self.oracle.is_authorized(principal, context).await {
			Ok(true) => {}
			Ok(false) => {
				info!(oracle = self.oracle.name(), "issuance refused, principal not authorized");
				return Err(KeyError::Unauthorized);
			}
			Err(e) => {
				warn!(oracle = self.oracle.name(), error = %e, "issuance refused, authorization indeterminate");
				return Err(KeyError::OracleIndeterminate(e.to_string()));
			}
		}

		if let Some(existing) = self.store.get_active(principal).await? {
			debug!(key = %existing.value.redacted(), "returning existing active key");
			return Ok(IssuedKey {
				record: existing,
				created: false,
			});
		}

		for attempt in 1..=self.key_allocation_attempts {
			let now = self.clock.now();
			let record = KeyRecord::new_active(
				KeyValue::generate(principal, now),
				principal.clone(),
				context.clone(),
				principal_name.clone(),
				now,
			);

			match self.store.create_active(&record).await {
				Ok(superseded) => {
					info!(
						key = %record.value.redacted(),
						superseded,
						"issued new key"
					);
					return Ok(IssuedKey {
						record,
						created: true,
					});
				}
				Err(DbError::DuplicateKeyValue) => {
					warn!(attempt, "generated key value collided, regenerating");
				}
				Err(e) => return Err(e.into()),
			}
		}

		Err(KeyError::KeyAllocationExhausted {
			attempts: self.key_allocation_attempts,
		})
	}

	/// The principal's own view of its active key. Consumes inspection budget.
	#[instrument(skip(self), fields(principal_id = %principal))]
	pub async fn inspect(&self, principal: &PrincipalId) -> Result<Option<KeyRecord>, KeyError> {
		let _guard = self.registries.locks.acquire(principal).await?;
		self.consume_budget(principal, OperationClass::Inspection)?;
		Ok(self.store.get_active(principal).await?)
	}

	/// Deactivate the principal's key because it left the context. Idempotent.
	#[instrument(skip(self), fields(principal_id = %principal))]
	pub async fn handle_departure(&self, principal: &PrincipalId) -> Result<u64, KeyError> {
		self.deactivate_for(principal, DeactivationReason::LeftContext)
			.await
	}

	/// Operator revocation of the principal's active key. Idempotent.
	#[instrument(skip(self), fields(principal_id = %principal))]
	pub async fn revoke(&self, principal: &PrincipalId) -> Result<u64, KeyError> {
		self.deactivate_for(principal, DeactivationReason::AdministrativeRevocation)
			.await
	}

	async fn deactivate_for(
		&self,
		principal: &PrincipalId,
		reason: DeactivationReason,
	) -> Result<u64, KeyError> {
		let _guard = self.registries.locks.acquire(principal).await?;
		let changed = self
			.store
			.deactivate_active_for_principal(principal, reason, self.clock.now())
			.await?;
		if changed > 0 {
			info!(reason = %reason.as_str(), "deactivated active key");
		} else {
			debug!(reason = %reason.as_str(), "no active key to deactivate");
		}
		Ok(changed)
	}

	/// Operator lookup of a principal's active key. No budget, no lock.
	pub async fn lookup(&self, principal: &PrincipalId) -> Result<Option<KeyRecord>, KeyError> {
		Ok(self.store.get_active(principal).await?)
	}

	pub async fn stats(&self) -> Result<KeyStats, KeyError> {
		Ok(self.store.stats().await?)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::jobs::KeyReconciliationJob;
	use crate::oracle::{Decision, StaticOracle};
	use crate::rate_limiter::WindowConfig;
	use async_trait::async_trait;
	use chrono::{DateTime, Utc};
	use keysmith_core::ManualClock;
	use keysmith_server_db::MemoryKeyStore;
	use keysmith_server_jobs::CancellationToken;
	use std::sync::atomic::{AtomicU32, Ordering};

	struct Fixture {
		manager: KeyLifecycleManager,
		oracle: Arc<StaticOracle>,
		clock: Arc<ManualClock>,
		store: Arc<dyn KeyStore>,
	}

	fn fixture_with_store(store: Arc<dyn KeyStore>) -> Fixture {
		let clock = Arc::new(ManualClock::default());
		let oracle = Arc::new(StaticOracle::allow_all());
		let registries = Arc::new(Registries::new(
			RateLimits::default(),
			Duration::from_millis(200),
			clock.clone(),
		));
		let manager = KeyLifecycleManager::new(
			Arc::clone(&store),
			oracle.clone(),
			registries,
			clock.clone(),
			5,
		);
		Fixture {
			manager,
			oracle,
			clock,
			store,
		}
	}

	fn fixture() -> Fixture {
		fixture_with_store(Arc::new(MemoryKeyStore::new()))
	}

	fn p(id: &str) -> PrincipalId {
		PrincipalId::new(id)
	}

	fn guild() -> ContextId {
		ContextId::new("guild-1")
	}

	#[test]
	fn retry_after_rounds_up_to_whole_seconds() {
		assert_eq!(retry_after_secs(Duration::from_millis(1)), 1);
		assert_eq!(retry_after_secs(Duration::from_millis(1_500)), 2);
		assert_eq!(retry_after_secs(Duration::from_secs(30)), 30);
		assert_eq!(retry_after_secs(Duration::ZERO), 1);
	}

	#[tokio::test]
	async fn issue_creates_active_key() {
		let f = fixture();
		let issued = f
			.manager
			.issue(&p("p1"), &guild(), Some("alice".to_string()))
			.await
			.unwrap();

		assert!(issued.created);
		assert!(issued.record.is_active());
		assert_eq!(issued.record.principal_name.as_deref(), Some("alice"));
		assert_eq!(issued.record.issued_at, f.clock.now());
		assert_eq!(
			f.manager.lookup(&p("p1")).await.unwrap().unwrap().value,
			issued.record.value
		);
	}

	#[tokio::test]
	async fn second_issue_within_window_is_rate_limited() {
		let f = fixture();
		f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		f.clock.advance(Duration::from_secs(1));

		let err = f.manager.issue(&p("p1"), &guild(), None).await.unwrap_err();
		match err {
			KeyError::RateLimited {
				class,
				retry_after_secs,
			} => {
				assert_eq!(class, OperationClass::Issuance);
				assert_eq!(retry_after_secs, 21_599);
			}
			other => panic!("expected rate limit, got {other:?}"),
		}
	}

	#[tokio::test]
	async fn issue_after_window_returns_existing_key() {
		let f = fixture();
		let first = f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		f.clock.advance(Duration::from_secs(21_601));

		let second = f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		assert!(!second.created);
		assert_eq!(second.record.value, first.record.value);
		assert_eq!(f.manager.stats().await.unwrap(), KeyStats::new(1, 1));
	}

	#[tokio::test]
	async fn unauthorized_principal_gets_no_key_and_spends_budget() {
		let f = fixture();
		f.oracle.set("p1", Decision::Denied);

		let err = f.manager.issue(&p("p1"), &guild(), None).await.unwrap_err();
		assert!(matches!(err, KeyError::Unauthorized));
		assert!(f.manager.lookup(&p("p1")).await.unwrap().is_none());

		f.oracle.set("p1", Decision::Authorized);
		let err = f.manager.issue(&p("p1"), &guild(), None).await.unwrap_err();
		assert!(matches!(err, KeyError::RateLimited { .. }));
	}

	#[tokio::test]
	async fn indeterminate_oracle_refuses_issuance() {
		let f = fixture();
		f.oracle.set("p1", Decision::Indeterminate);

		let err = f.manager.issue(&p("p1"), &guild(), None).await.unwrap_err();
		assert!(matches!(err, KeyError::OracleIndeterminate(_)));
		assert_eq!(f.manager.stats().await.unwrap().total, 0);
	}

	#[tokio::test]
	async fn rate_limited_issue_does_not_query_oracle() {
		let f = fixture();
		f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		let calls = f.oracle.calls();

		let _ = f.manager.issue(&p("p1"), &guild(), None).await;
		assert_eq!(f.oracle.calls(), calls);
	}

	#[tokio::test]
	async fn reissue_after_departure_creates_new_key() {
		let f = fixture();
		let first = f.manager.issue(&p("p1"), &guild(), None).await.unwrap();

		assert_eq!(f.manager.handle_departure(&p("p1")).await.unwrap(), 1);
		f.clock.advance(Duration::from_secs(21_601));

		let second = f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		assert!(second.created);
		assert_ne!(second.record.value, first.record.value);

		let old = f
			.store
			.get_by_value(&first.record.value)
			.await
			.unwrap()
			.unwrap();
		assert_eq!(old.deactivation_reason(), Some(DeactivationReason::LeftContext));
	}

	#[tokio::test]
	async fn departure_and_revoke_are_idempotent() {
		let f = fixture();
		assert_eq!(f.manager.handle_departure(&p("nobody")).await.unwrap(), 0);

		f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		assert_eq!(f.manager.revoke(&p("p1")).await.unwrap(), 1);
		assert_eq!(f.manager.revoke(&p("p1")).await.unwrap(), 0);
		assert_eq!(f.manager.handle_departure(&p("p1")).await.unwrap(), 0);

		let stats = f.manager.stats().await.unwrap();
		assert_eq!(stats, KeyStats::new(0, 1));
	}

	#[tokio::test]
	async fn inspect_consumes_inspection_budget_only() {
		let f = fixture();
		assert!(f.manager.inspect(&p("p1")).await.unwrap().is_none());
		f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		assert!(f.manager.inspect(&p("p1")).await.unwrap().is_some());

		let err = f.manager.inspect(&p("p1")).await.unwrap_err();
		assert!(matches!(
			err,
			KeyError::RateLimited {
				class: OperationClass::Inspection,
				..
			}
		));

		// Operator lookup has no budget.
		for _ in 0..5 {
			assert!(f.manager.lookup(&p("p1")).await.unwrap().is_some());
		}
	}

	fn roomy_registries(clock: Arc<ManualClock>) -> Arc<Registries> {
		Arc::new(Registries::new(
			RateLimits {
				issuance: WindowConfig::new(1_000, Duration::from_secs(60)),
				inspection: WindowConfig::new(1_000, Duration::from_secs(60)),
			},
			Duration::from_secs(5),
			clock,
		))
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn issue_departure_and_reconciliation_race_leaves_at_most_one_active() {
		let clock = Arc::new(ManualClock::default());
		let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
		let manager = Arc::new(KeyLifecycleManager::new(
			Arc::clone(&store),
			Arc::new(StaticOracle::allow_all()),
			roomy_registries(clock.clone()),
			clock.clone(),
			5,
		));
		let reconciliation = Arc::new(KeyReconciliationJob::new(
			Arc::clone(&store),
			Arc::new(StaticOracle::deny_all()),
			clock,
		));

		for _ in 0..50 {
			let issuer = Arc::clone(&manager);
			let issue = tokio::spawn(async move { issuer.issue(&p("p1"), &guild(), None).await });
			let departing = Arc::clone(&manager);
			let departure = tokio::spawn(async move { departing.handle_departure(&p("p1")).await });
			let job = Arc::clone(&reconciliation);
			let pass = tokio::spawn(async move { job.reconcile(&CancellationToken::new()).await });

			issue.await.unwrap().unwrap();
			departure.await.unwrap().unwrap();
			pass.await.unwrap().unwrap();

			let active = store.list_active().await.unwrap();
			assert!(active.len() <= 1, "found {} active keys", active.len());
			let current = store.get_active(&p("p1")).await.unwrap();
			assert_eq!(current.map(|r| r.value), active.first().map(|r| r.value.clone()));
		}

		let stats = store.stats().await.unwrap();
		assert!(stats.active <= 1);
		assert!(stats.total >= 1);
	}

	#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
	async fn concurrent_issue_for_one_principal_creates_one_key() {
		let clock = Arc::new(ManualClock::default());
		let registries = Arc::new(Registries::new(
			RateLimits {
				issuance: WindowConfig::new(100, Duration::from_secs(60)),
				inspection: WindowConfig::new(100, Duration::from_secs(60)),
			},
			Duration::from_secs(5),
			clock.clone(),
		));
		let store: Arc<dyn KeyStore> = Arc::new(MemoryKeyStore::new());
		let manager = Arc::new(KeyLifecycleManager::new(
			Arc::clone(&store),
			Arc::new(StaticOracle::allow_all()),
			registries,
			clock,
			5,
		));

		let mut set = tokio::task::JoinSet::new();
		for _ in 0..16 {
			let manager = Arc::clone(&manager);
			set.spawn(async move { manager.issue(&p("p1"), &guild(), None).await });
		}

		let mut created = 0;
		let mut values = Vec::new();
		while let Some(result) = set.join_next().await {
			let issued = result.unwrap().unwrap();
			created += usize::from(issued.created);
			values.push(issued.record.value);
		}

		assert_eq!(created, 1);
		values.dedup();
		assert_eq!(values.len(), 1);
		assert_eq!(store.stats().await.unwrap(), KeyStats::new(1, 1));
	}

	/// Store that reports a collision for the first `collisions` inserts.
	struct CollidingStore {
		inner: MemoryKeyStore,
		collisions: AtomicU32,
	}

	#[async_trait]
	impl KeyStore for CollidingStore {
		async fn create_active(&self, record: &KeyRecord) -> Result<u64, DbError> {
			if self
				.collisions
				.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
				.is_ok()
			{
				return Err(DbError::DuplicateKeyValue);
			}
			self.inner.create_active(record).await
		}

		async fn get_active(&self, principal_id: &PrincipalId) -> Result<Option<KeyRecord>, DbError> {
			self.inner.get_active(principal_id).await
		}

		async fn get_by_value(&self, value: &KeyValue) -> Result<Option<KeyRecord>, DbError> {
			self.inner.get_by_value(value).await
		}

		async fn deactivate(
			&self,
			value: &KeyValue,
			reason: DeactivationReason,
			at: DateTime<Utc>,
		) -> Result<bool, DbError> {
			self.inner.deactivate(value, reason, at).await
		}

		async fn deactivate_active_for_principal(
			&self,
			principal_id: &PrincipalId,
			reason: DeactivationReason,
			at: DateTime<Utc>,
		) -> Result<u64, DbError> {
			self.inner
				.deactivate_active_for_principal(principal_id, reason, at)
				.await
		}

		async fn list_active(&self) -> Result<Vec<KeyRecord>, DbError> {
			self.inner.list_active().await
		}

		async fn stats(&self) -> Result<KeyStats, DbError> {
			self.inner.stats().await
		}

		async fn ping(&self) -> Result<(), DbError> {
			self.inner.ping().await
		}
	}

	#[tokio::test]
	async fn collisions_are_retried() {
		let f = fixture_with_store(Arc::new(CollidingStore {
			inner: MemoryKeyStore::new(),
			collisions: AtomicU32::new(3),
		}));
		let issued = f.manager.issue(&p("p1"), &guild(), None).await.unwrap();
		assert!(issued.created);
	}

	#[tokio::test]
	async fn persistent_collisions_exhaust_allocation() {
		let f = fixture_with_store(Arc::new(CollidingStore {
			inner: MemoryKeyStore::new(),
			collisions: AtomicU32::new(u32::MAX),
		}));
		let err = f.manager.issue(&p("p1"), &guild(), None).await.unwrap_err();
		assert!(matches!(err, KeyError::KeyAllocationExhausted { attempts: 5 }));
		assert_eq!(f.manager.stats().await.unwrap().total, 0);
	}

	#[tokio::test]
	async fn held_lock_times_out_issue() {
		let f = fixture();
		let _held = f.manager.registries().locks.acquire(&p("p1")).await.unwrap();
		let err = f.manager.issue(&p("p1"), &guild(), None).await.unwrap_err();
		assert!(matches!(err, KeyError::LockTimeout));
		// Timed-out calls never reached the limiter.
		assert_eq!(
			f.manager
				.registries()
				.limiter
				.in_window(&p("p1"), OperationClass::Issuance),
			0
		);
	}
}
