// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keysmith server: issues access keys to principals that hold a required
//! authorization, keeps them in step with that authorization, and answers
//! whether a presented key is currently valid.

pub mod api;
pub mod auth_middleware;
pub mod error;
pub mod jobs;
pub mod locks;
pub mod manager;
pub mod oracle;
pub mod rate_limiter;
pub mod routes;
pub mod verification;

pub use api::{
	assemble_app_state, create_app_state, create_oracle, create_router, create_store, AppComponents,
	AppState,
};
pub use error::{KeyError, ServerError, StartupError};
pub use jobs::{KeyReconciliationJob, ReconciliationReport, RegistrySweepJob};
pub use manager::{IssuedKey, KeyLifecycleManager, Registries};
pub use oracle::{AuthorizationOracle, Decision, DiscordRoleOracle, OracleError, StaticOracle};
pub use rate_limiter::{RateLimits, SlidingWindowLimiter, WindowConfig};
pub use verification::VerificationService;
