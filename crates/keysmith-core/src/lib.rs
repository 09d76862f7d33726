// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Core domain types for Keysmith.
//!
//! A principal (a chat-platform user) holds at most one active access key
//! per deployment. Keys are issued while the principal holds the required
//! membership in a context (a guild or community) and are deactivated when
//! that membership is lost, when the principal leaves, when a replacement is
//! issued, or by an administrator. Records are never deleted.
//!
//! This crate holds the types every other Keysmith crate shares:
//!
//! - [`KeyValue`] - the normalized textual key and its generator
//! - [`KeyRecord`], [`KeyStatus`], [`DeactivationReason`] - persisted state
//! - [`PrincipalId`], [`ContextId`] - identifier newtypes
//! - [`Clock`] - injectable time source for rate limiting and tests

pub mod clock;
pub mod error;
pub mod key;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::ParseError;
pub use key::{KeyValue, KEY_LENGTH};
pub use types::{
	ContextId, DeactivationReason, KeyRecord, KeyStats, KeyStatus, OperationClass, PrincipalId,
};
