// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Key values and key generation.
//!
//! A key is 16 uppercase hexadecimal characters. Values are derived from
//! 16 bytes of OS randomness mixed with the principal identifier and a
//! nanosecond timestamp, hashed with SHA-256 and truncated. The random seed
//! cannot be recovered from the rendered value.

use std::fmt;

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::types::PrincipalId;

/// Number of characters in a rendered key.
pub const KEY_LENGTH: usize = 16;

const SEED_BYTES: usize = 16;
const VISIBLE_PREFIX: usize = 4;

/// A case-normalized key value.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyValue(String);

impl KeyValue {
	/// Normalize a presented value: trim surrounding whitespace and uppercase.
	///
	/// No format check happens here. Lookups of malformed values simply miss.
	pub fn normalize(presented: &str) -> Self {
		Self(presented.trim().to_ascii_uppercase())
	}

	/// Generate a new key for `principal` using the OS random source.
	pub fn generate(principal: &PrincipalId, now: DateTime<Utc>) -> Self {
		Self::generate_with_rng(&mut OsRng, principal, now)
	}

	/// Generate a new key drawing the seed from `rng`.
	pub fn generate_with_rng<R: RngCore + ?Sized>(
		rng: &mut R,
		principal: &PrincipalId,
		now: DateTime<Utc>,
	) -> Self {
		let mut seed = [0u8; SEED_BYTES];
		rng.fill_bytes(&mut seed);

		let nanos = now
			.timestamp_nanos_opt()
			.unwrap_or_else(|| now.timestamp_micros().saturating_mul(1_000));

		let mut hasher = Sha256::new();
		hasher.update(principal.as_str().as_bytes());
		hasher.update(nanos.to_be_bytes());
		hasher.update(seed);
		let digest = hasher.finalize();

		Self(hex::encode_upper(&digest[..KEY_LENGTH / 2]))
	}

	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Short form safe to write to logs: the first four characters only.
	pub fn redacted(&self) -> String {
		let prefix: String = self.0.chars().take(VISIBLE_PREFIX).collect();
		format!("{prefix}****")
	}
}

impl fmt::Display for KeyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

impl fmt::Debug for KeyValue {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.debug_tuple("KeyValue").field(&self.redacted()).finish()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use proptest::prelude::*;
	use std::collections::HashSet;

	#[test]
	fn generated_key_has_canonical_shape() {
		let key = KeyValue::generate(&PrincipalId::new("42"), Utc::now());
		assert_eq!(key.as_str().len(), KEY_LENGTH);
		assert!(key
			.as_str()
			.chars()
			.all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c)));
		assert_eq!(KeyValue::normalize(key.as_str()), key);
	}

	#[test]
	fn ten_thousand_generations_are_unique() {
		let principal = PrincipalId::new("281782820074688542");
		let now = Utc::now();
		let mut seen = HashSet::new();
		for _ in 0..10_000 {
			let key = KeyValue::generate(&principal, now);
			assert!(seen.insert(key), "duplicate key generated");
		}
	}

	#[test]
	fn normalize_trims_and_uppercases() {
		assert_eq!(
			KeyValue::normalize("  0a1b2c3d4e5f6a7b\n").as_str(),
			"0A1B2C3D4E5F6A7B"
		);
	}

	#[test]
	fn debug_and_redacted_hide_most_of_the_key() {
		let key = KeyValue::normalize("ABCDEF0123456789");
		assert_eq!(key.redacted(), "ABCD****");
		assert!(!format!("{key:?}").contains("0123456789"));
	}

	proptest! {
		#[test]
		fn normalize_is_idempotent(raw in "\\s{0,3}[0-9a-fA-F]{16}\\s{0,3}") {
			let once = KeyValue::normalize(&raw);
			let twice = KeyValue::normalize(once.as_str());
			prop_assert_eq!(once, twice);
		}

		#[test]
		fn case_variants_normalize_equal(raw in "[0-9a-f]{16}") {
			prop_assert_eq!(
				KeyValue::normalize(&raw),
				KeyValue::normalize(&raw.to_uppercase())
			);
		}

		#[test]
		fn distinct_principals_never_collide(a in "[0-9]{17,19}", b in "[0-9]{17,19}") {
			let now = Utc::now();
			let ka = KeyValue::generate(&PrincipalId::new(a), now);
			let kb = KeyValue::generate(&PrincipalId::new(b), now);
			prop_assert_ne!(ka, kb);
		}
	}
}
