// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use std::sync::Arc;

use keysmith_core::KeyValue;
use keysmith_server_db::{DbError, KeyStore};

/// Answers whether a presented key is currently active.
///
/// Read-only and unauthenticated: the answer carries nothing about the
/// owning principal.
pub struct VerificationService {
	store: Arc<dyn KeyStore>,
}

impl VerificationService {
	pub fn new(store: Arc<dyn KeyStore>) -> Self {
		Self { store }
	}

	/// Whitespace is trimmed and case ignored before lookup.
	pub async fn verify(&self, presented: &str) -> Result<bool, DbError> {
		let value = KeyValue::normalize(presented);
		if value.as_str().is_empty() {
			return Ok(false);
		}

		let active = self
			.store
			.get_by_value(&value)
			.await?
			.is_some_and(|record| record.is_active());

		tracing::debug!(key = %value.redacted(), active, "key verification");
		Ok(active)
	}
}
