// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use keysmith_core::{DeactivationReason, KeyRecord, KeyStats, KeyValue, PrincipalId};
use parking_lot::RwLock;

use crate::error::DbError;
use crate::key::KeyStore;

#[derive(Default)]
struct MemoryState {
	records: HashMap<KeyValue, KeyRecord>,
	active_by_principal: HashMap<PrincipalId, KeyValue>,
}

/// Process-local key store. Contents are lost on restart.
#[derive(Default)]
pub struct MemoryKeyStore {
	state: RwLock<MemoryState>,
}

impl MemoryKeyStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
	async fn create_active(&self, record: &KeyRecord) -> Result<u64, DbError> {
		if !record.is_active() {
			return Err(DbError::Internal(
				"create_active requires an active record".to_string(),
			));
		}

		let mut state = self.state.write();
		if state.records.contains_key(&record.value) {
			return Err(DbError::DuplicateKeyValue);
		}

		let mut superseded = 0;
		if let Some(previous) = state.active_by_principal.remove(&record.principal_id) {
			if let Some(prev) = state.records.get_mut(&previous) {
				if prev.deactivate(DeactivationReason::Superseded, record.issued_at) {
					superseded = 1;
				}
			}
		}

		state
			.active_by_principal
			.insert(record.principal_id.clone(), record.value.clone());
		state.records.insert(record.value.clone(), record.clone());

		tracing::debug!(
			principal_id = %record.principal_id,
			key = %record.value.redacted(),
			superseded,
			"key record created"
		);
		Ok(superseded)
	}

	async fn get_active(&self, principal_id: &PrincipalId) -> Result<Option<KeyRecord>, DbError> {
		let state = self.state.read();
		Ok(state
			.active_by_principal
			.get(principal_id)
			.and_then(|value| state.records.get(value))
			.cloned())
	}

	async fn get_by_value(&self, value: &KeyValue) -> Result<Option<KeyRecord>, DbError> {
		Ok(self.state.read().records.get(value).cloned())
	}

	async fn deactivate(
		&self,
		value: &KeyValue,
		reason: DeactivationReason,
		at: DateTime<Utc>,
	) -> Result<bool, DbError> {
		let mut state = self.state.write();
		let Some(record) = state.records.get_mut(value) else {
			return Ok(false);
		};
		if !record.deactivate(reason, at) {
			return Ok(false);
		}
		let principal = record.principal_id.clone();
		if state.active_by_principal.get(&principal) == Some(value) {
			state.active_by_principal.remove(&principal);
		}
		Ok(true)
	}

	async fn deactivate_active_for_principal(
		&self,
		principal_id: &PrincipalId,
		reason: DeactivationReason,
		at: DateTime<Utc>,
	) -> Result<u64, DbError> {
		let mut state = self.state.write();
		let Some(value) = state.active_by_principal.remove(principal_id) else {
			return Ok(0);
		};
		let changed = state
			.records
			.get_mut(&value)
			.map(|record| record.deactivate(reason, at))
			.unwrap_or(false);
		Ok(u64::from(changed))
	}

	async fn list_active(&self) -> Result<Vec<KeyRecord>, DbError> {
		let state = self.state.read();
		let mut records: Vec<KeyRecord> = state
			.active_by_principal
			.values()
			.filter_map(|value| state.records.get(value))
			.cloned()
			.collect();
		records.sort_by_key(|r| r.issued_at);
		Ok(records)
	}

	async fn stats(&self) -> Result<KeyStats, DbError> {
		let state = self.state.read();
		Ok(KeyStats::new(
			state.active_by_principal.len() as u64,
			state.records.len() as u64,
		))
	}

	async fn ping(&self) -> Result<(), DbError> {
		Ok(())
	}
}
