// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Lock registry keyed by principal.
//!
//! Mutating operations for one principal run one at a time; different
//! principals never contend. Acquisition is bounded by a timeout.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use keysmith_core::PrincipalId;
use parking_lot::Mutex;
use tokio::sync::OwnedMutexGuard;

use crate::error::KeyError;

pub type PrincipalGuard = OwnedMutexGuard<()>;

pub struct PrincipalLocks {
	locks: Mutex<HashMap<PrincipalId, Arc<tokio::sync::Mutex<()>>>>,
	timeout: Duration,
}

impl PrincipalLocks {
	pub fn new(timeout: Duration) -> Self {
		Self {
			locks: Mutex::new(HashMap::new()),
			timeout,
		}
	}

	/// Wait for the principal's lock, giving up after the configured timeout.
	pub async fn acquire(&self, principal: &PrincipalId) -> Result<PrincipalGuard, KeyError> {
		let lock = {
			let mut locks = self.locks.lock();
			Arc::clone(locks.entry(principal.clone()).or_default())
		};

		tokio::time::timeout(self.timeout, lock.lock_owned())
			.await
			.map_err(|_| {
				tracing::warn!(
					principal_id = %principal,
					timeout_ms = self.timeout.as_millis() as u64,
					"timed out waiting for principal lock"
				);
				KeyError::LockTimeout
			})
	}

	/// Drop locks nobody holds or waits on. Returns how many were removed.
	pub fn sweep(&self) -> usize {
		let mut locks = self.locks.lock();
		let before = locks.len();
		locks.retain(|_, lock| Arc::strong_count(lock) > 1);
		before - locks.len()
	}

	pub fn len(&self) -> usize {
		self.locks.lock().len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[tokio::test]
	async fn same_principal_times_out_while_held() {
		let locks = PrincipalLocks::new(Duration::from_millis(20));
		let p = PrincipalId::new("p1");

		let _held = locks.acquire(&p).await.unwrap();
		let second = locks.acquire(&p).await;
		assert!(matches!(second, Err(KeyError::LockTimeout)));
	}

	#[tokio::test]
	async fn different_principals_do_not_contend() {
		let locks = PrincipalLocks::new(Duration::from_millis(20));
		let _a = locks.acquire(&PrincipalId::new("a")).await.unwrap();
		let b = locks.acquire(&PrincipalId::new("b")).await;
		assert!(b.is_ok());
	}

	#[tokio::test]
	async fn lock_is_reusable_after_release() {
		let locks = PrincipalLocks::new(Duration::from_millis(20));
		let p = PrincipalId::new("p1");
		drop(locks.acquire(&p).await.unwrap());
		assert!(locks.acquire(&p).await.is_ok());
	}

	#[tokio::test]
	async fn sweep_keeps_held_locks() {
		let locks = PrincipalLocks::new(Duration::from_millis(20));
		let held = locks.acquire(&PrincipalId::new("held")).await.unwrap();
		drop(locks.acquire(&PrincipalId::new("idle")).await.unwrap());

		assert_eq!(locks.len(), 2);
		assert_eq!(locks.sweep(), 1);
		assert_eq!(locks.len(), 1);

		drop(held);
		assert_eq!(locks.sweep(), 1);
		assert!(locks.is_empty());
	}
}
