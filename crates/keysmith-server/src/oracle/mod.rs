// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization oracles.
//!
//! An oracle answers whether a principal currently holds the required
//! authorization within a context. `Ok(true)` and `Ok(false)` are definite
//! answers; `Err` means the answer could not be determined (network failure,
//! timeout, upstream rate limiting) and callers must not treat it as "no".

mod discord;
mod fixed;

pub use discord::DiscordRoleOracle;
pub use fixed::{Decision, StaticOracle};

use async_trait::async_trait;
use keysmith_core::{ContextId, PrincipalId};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum OracleError {
	#[error("authorization provider unreachable: {0}")]
	Unreachable(String),

	#[error("authorization provider returned status {status}")]
	UnexpectedStatus { status: u16 },

	#[error("could not decode authorization response: {0}")]
	Decode(String),
}

#[async_trait]
pub trait AuthorizationOracle: Send + Sync {
	/// Short label used in logs.
	fn name(&self) -> &'static str;

	async fn is_authorized(
		&self,
		principal: &PrincipalId,
		context: &ContextId,
	) -> Result<bool, OracleError>;
}
