// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use keysmith_core::{ContextId, PrincipalId};
use parking_lot::RwLock;

use super::{AuthorizationOracle, OracleError};

/// Scripted answer for a principal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
	Authorized,
	Denied,
	Indeterminate,
}

/// Oracle that answers from an in-process table.
///
/// Backs the `allow_all` and `deny_all` oracle kinds, and lets tests
/// script authorization changes between calls.
pub struct StaticOracle {
	default: Decision,
	overrides: RwLock<HashMap<PrincipalId, Decision>>,
	calls: AtomicU64,
}

impl StaticOracle {
	pub fn new(default: Decision) -> Self {
		Self {
			default,
			overrides: RwLock::new(HashMap::new()),
			calls: AtomicU64::new(0),
		}
	}

	pub fn allow_all() -> Self {
		Self::new(Decision::Authorized)
	}

	pub fn deny_all() -> Self {
		Self::new(Decision::Denied)
	}

	pub fn set(&self, principal: impl Into<PrincipalId>, decision: Decision) {
		self.overrides.write().insert(principal.into(), decision);
	}

	pub fn clear(&self, principal: &PrincipalId) {
		self.overrides.write().remove(principal);
	}

	/// Number of queries answered so far.
	pub fn calls(&self) -> u64 {
		self.calls.load(Ordering::Relaxed)
	}
}

#[async_trait]
impl AuthorizationOracle for StaticOracle {
	fn name(&self) -> &'static str {
		"static"
	}

	async fn is_authorized(
		&self,
		principal: &PrincipalId,
		_context: &ContextId,
	) -> Result<bool, OracleError> {
		self.calls.fetch_add(1, Ordering::Relaxed);
		let decision = self
			.overrides
			.read()
			.get(principal)
			.copied()
			.unwrap_or(self.default);

		match decision {
			Decision::Authorized => Ok(true),
			Decision::Denied => Ok(false),
			Decision::Indeterminate => Err(OracleError::Unreachable(
				"scripted indeterminate answer".to_string(),
			)),
		}
	}
}
