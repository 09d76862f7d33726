// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use thiserror::Error;

/// Errors produced when parsing persisted or presented values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
	#[error("unknown deactivation reason: {0}")]
	UnknownReason(String),

	#[error("unknown operation class: {0}")]
	UnknownOperationClass(String),
}
