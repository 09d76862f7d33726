// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Persisted key state and identifier newtypes.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ParseError;
use crate::key::KeyValue;

// =============================================================================
// Identifier newtypes
// =============================================================================

macro_rules! define_string_id {
	($name:ident, $doc:expr) => {
		#[doc = $doc]
		#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
		#[serde(transparent)]
		pub struct $name(String);

		impl $name {
			pub fn new(id: impl Into<String>) -> Self {
				Self(id.into())
			}

			pub fn as_str(&self) -> &str {
				&self.0
			}
		}

		impl fmt::Display for $name {
			fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
				f.write_str(&self.0)
			}
		}

		impl From<String> for $name {
			fn from(id: String) -> Self {
				Self(id)
			}
		}

		impl From<&str> for $name {
			fn from(id: &str) -> Self {
				Self(id.to_string())
			}
		}
	};
}

define_string_id!(
	PrincipalId,
	"Platform identifier of the user a key is issued to."
);
define_string_id!(
	ContextId,
	"Platform identifier of the guild or community authorization is scoped to."
);

// =============================================================================
// Status
// =============================================================================

/// Why a key stopped being active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeactivationReason {
	/// A newer key was issued to the same principal.
	Superseded,
	/// Reconciliation found the principal no longer holds the required membership.
	LostAuthorization,
	/// The principal left the context.
	LeftContext,
	/// An administrator revoked the key.
	AdministrativeRevocation,
}

impl DeactivationReason {
	pub fn as_str(&self) -> &'static str {
		match self {
			DeactivationReason::Superseded => "superseded",
			DeactivationReason::LostAuthorization => "lost authorization",
			DeactivationReason::LeftContext => "left context",
			DeactivationReason::AdministrativeRevocation => "administrative revocation",
		}
	}
}

impl fmt::Display for DeactivationReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

impl FromStr for DeactivationReason {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"superseded" => Ok(DeactivationReason::Superseded),
			"lost authorization" => Ok(DeactivationReason::LostAuthorization),
			"left context" => Ok(DeactivationReason::LeftContext),
			"administrative revocation" => Ok(DeactivationReason::AdministrativeRevocation),
			other => Err(ParseError::UnknownReason(other.to_string())),
		}
	}
}

/// Lifecycle state of a key record.
///
/// The deactivation timestamp and reason only exist on the `Deactivated`
/// variant, so a record can never carry one without the other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum KeyStatus {
	Active,
	Deactivated {
		at: DateTime<Utc>,
		reason: DeactivationReason,
	},
}

// =============================================================================
// Records
// =============================================================================

/// One issued key and its metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyRecord {
	pub value: KeyValue,
	pub principal_id: PrincipalId,
	/// Display name at issuance time, kept for audit only.
	pub principal_name: Option<String>,
	pub context_id: ContextId,
	pub issued_at: DateTime<Utc>,
	pub status: KeyStatus,
}

impl KeyRecord {
	/// Build a freshly issued, active record.
	pub fn new_active(
		value: KeyValue,
		principal_id: PrincipalId,
		context_id: ContextId,
		principal_name: Option<String>,
		issued_at: DateTime<Utc>,
	) -> Self {
		Self {
			value,
			principal_id,
			principal_name,
			context_id,
			issued_at,
			status: KeyStatus::Active,
		}
	}

	pub fn is_active(&self) -> bool {
		matches!(self.status, KeyStatus::Active)
	}

	pub fn deactivated_at(&self) -> Option<DateTime<Utc>> {
		match self.status {
			KeyStatus::Active => None,
			KeyStatus::Deactivated { at, .. } => Some(at),
		}
	}

	pub fn deactivation_reason(&self) -> Option<DeactivationReason> {
		match self.status {
			KeyStatus::Active => None,
			KeyStatus::Deactivated { reason, .. } => Some(reason),
		}
	}

	/// Transition `Active -> Deactivated`.
	///
	/// Returns `false` and leaves the record untouched if it is already
	/// deactivated; status never moves backwards and the first reason sticks.
	pub fn deactivate(&mut self, reason: DeactivationReason, at: DateTime<Utc>) -> bool {
		if !self.is_active() {
			return false;
		}
		self.status = KeyStatus::Deactivated { at, reason };
		true
	}
}

/// Counts returned by the administrative statistics query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyStats {
	pub active: u64,
	pub inactive: u64,
	pub total: u64,
}

impl KeyStats {
	pub fn new(active: u64, total: u64) -> Self {
		Self {
			active,
			inactive: total.saturating_sub(active),
			total,
		}
	}
}

/// Operation classes with independent rate-limit budgets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationClass {
	Issuance,
	Inspection,
}

impl OperationClass {
	pub fn all() -> &'static [OperationClass] {
		&[OperationClass::Issuance, OperationClass::Inspection]
	}
}

impl fmt::Display for OperationClass {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OperationClass::Issuance => write!(f, "issuance"),
			OperationClass::Inspection => write!(f, "inspection"),
		}
	}
}

impl FromStr for OperationClass {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s {
			"issuance" => Ok(OperationClass::Issuance),
			"inspection" => Ok(OperationClass::Inspection),
			other => Err(ParseError::UnknownOperationClass(other.to_string())),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use chrono::Duration;

	fn sample_record() -> KeyRecord {
		KeyRecord::new_active(
			KeyValue::normalize("0123456789abcdef"),
			PrincipalId::new("281782820074688542"),
			ContextId::new("1411206861499400192"),
			Some("someone".to_string()),
			Utc::now(),
		)
	}

	#[test]
	fn new_record_is_active_without_deactivation_fields() {
		let record = sample_record();
		assert!(record.is_active());
		assert!(record.deactivated_at().is_none());
		assert!(record.deactivation_reason().is_none());
	}

	#[test]
	fn deactivate_is_one_way_and_keeps_first_reason() {
		let mut record = sample_record();
		let first = Utc::now();
		assert!(record.deactivate(DeactivationReason::LeftContext, first));
		assert!(!record.deactivate(
			DeactivationReason::AdministrativeRevocation,
			first + Duration::seconds(10)
		));

		assert!(!record.is_active());
		assert_eq!(record.deactivated_at(), Some(first));
		assert_eq!(
			record.deactivation_reason(),
			Some(DeactivationReason::LeftContext)
		);
	}

	#[test]
	fn reason_strings_roundtrip() {
		for reason in [
			DeactivationReason::Superseded,
			DeactivationReason::LostAuthorization,
			DeactivationReason::LeftContext,
			DeactivationReason::AdministrativeRevocation,
		] {
			assert_eq!(reason.as_str().parse::<DeactivationReason>(), Ok(reason));
		}
		assert!("expired".parse::<DeactivationReason>().is_err());
	}

	#[test]
	fn stats_derive_inactive_count() {
		let stats = KeyStats::new(3, 10);
		assert_eq!(stats.inactive, 7);
		assert_eq!(KeyStats::new(0, 0), KeyStats::default());
	}

	#[test]
	fn status_serializes_with_state_tag() {
		let json = serde_json::to_value(KeyStatus::Active).unwrap();
		assert_eq!(json["state"], "active");

		let mut record = sample_record();
		record.deactivate(DeactivationReason::LostAuthorization, Utc::now());
		let json = serde_json::to_value(record.status).unwrap();
		assert_eq!(json["state"], "deactivated");
		assert_eq!(json["reason"], "lost_authorization");
	}
}
