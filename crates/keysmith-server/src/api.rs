// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Application state and router assembly.

use std::sync::Arc;
use std::time::Duration;

use axum::{
	http::{header, Method},
	middleware,
	routing::{get, post},
	Router,
};
use keysmith_common_secret::SecretString;
use keysmith_core::{Clock, SystemClock};
use keysmith_server_config::{OracleKind, ServerConfig};
use keysmith_server_db::{create_pool, run_migrations, KeyStore, MemoryKeyStore, SqliteKeyStore};
use keysmith_server_jobs::JobScheduler;
use tower_http::{
	cors::{Any, CorsLayer},
	trace::TraceLayer,
};

use crate::{
	auth_middleware::require_service_token,
	error::StartupError,
	jobs::{KeyReconciliationJob, RegistrySweepJob},
	manager::{KeyLifecycleManager, Registries},
	oracle::{AuthorizationOracle, DiscordRoleOracle, StaticOracle},
	routes,
	verification::VerificationService,
};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
	pub manager: Arc<KeyLifecycleManager>,
	pub verification: Arc<VerificationService>,
	pub reconciliation: Arc<KeyReconciliationJob>,
	pub scheduler: Arc<JobScheduler>,
	pub service_token: Option<SecretString>,
}

/// The swappable pieces of the server. Tests inject scripted versions.
pub struct AppComponents {
	pub store: Arc<dyn KeyStore>,
	pub oracle: Arc<dyn AuthorizationOracle>,
	pub clock: Arc<dyn Clock>,
}

/// Open the configured key store, running migrations for SQLite.
pub async fn create_store(config: &ServerConfig) -> Result<Arc<dyn KeyStore>, StartupError> {
	if config.database.is_memory() {
		tracing::warn!("using in-memory key store, keys will not survive a restart");
		return Ok(Arc::new(MemoryKeyStore::new()));
	}

	let pool = create_pool(&config.database.url).await?;
	run_migrations(&pool).await?;
	Ok(Arc::new(SqliteKeyStore::new(pool)))
}

pub fn create_oracle(config: &ServerConfig) -> Result<Arc<dyn AuthorizationOracle>, StartupError> {
	let oracle: Arc<dyn AuthorizationOracle> = match config.oracle.kind {
		OracleKind::Discord => {
			let bot_token = config
				.oracle
				.bot_token
				.clone()
				.ok_or(StartupError::MissingSetting("oracle.bot_token"))?;
			let role_id = config
				.oracle
				.required_role_id
				.clone()
				.ok_or(StartupError::MissingSetting("oracle.required_role_id"))?;
			Arc::new(
				DiscordRoleOracle::new(
					bot_token,
					role_id,
					Duration::from_secs(config.oracle.request_timeout_secs),
				)?
				.with_base_url(config.oracle.api_base_url.clone()),
			)
		}
		OracleKind::AllowAll => {
			tracing::warn!("authorization oracle is allow_all, every principal is authorized");
			Arc::new(StaticOracle::allow_all())
		}
		OracleKind::DenyAll => Arc::new(StaticOracle::deny_all()),
	};
	Ok(oracle)
}

/// Build the production state: configured store, oracle, and system clock.
pub async fn create_app_state(config: &ServerConfig) -> Result<AppState, StartupError> {
	let components = AppComponents {
		store: create_store(config).await?,
		oracle: create_oracle(config)?,
		clock: Arc::new(SystemClock),
	};
	Ok(assemble_app_state(config, components))
}

/// Wire the manager, verification service, and scheduled jobs together.
///
/// The scheduler is returned unstarted.
pub fn assemble_app_state(config: &ServerConfig, components: AppComponents) -> AppState {
	let AppComponents {
		store,
		oracle,
		clock,
	} = components;

	let registries = Arc::new(Registries::from_config(&config.limits, Arc::clone(&clock)));
	let manager = Arc::new(KeyLifecycleManager::new(
		Arc::clone(&store),
		Arc::clone(&oracle),
		Arc::clone(&registries),
		Arc::clone(&clock),
		config.limits.key_allocation_attempts,
	));
	let verification = Arc::new(VerificationService::new(Arc::clone(&store)));
	let reconciliation = Arc::new(KeyReconciliationJob::new(store, oracle, clock));

	let mut scheduler = JobScheduler::new();
	if config.reconciliation.enabled {
		scheduler.register_periodic(
			reconciliation.clone(),
			Duration::from_secs(config.reconciliation.interval_secs),
		);
	} else {
		tracing::info!("periodic reconciliation disabled, manual trigger only");
		scheduler.register_one_shot(reconciliation.clone());
	}
	scheduler.register_periodic(
		Arc::new(RegistrySweepJob::new(registries)),
		Duration::from_secs(config.reconciliation.sweep_interval_secs),
	);

	AppState {
		manager,
		verification,
		reconciliation,
		scheduler: Arc::new(scheduler),
		service_token: config.service.token.clone(),
	}
}

pub fn create_router(state: AppState) -> Router {
	// Browsers call verification cross-origin.
	let cors = CorsLayer::new()
		.allow_origin(Any)
		.allow_methods([Method::POST, Method::OPTIONS])
		.allow_headers([header::CONTENT_TYPE]);

	let public = Router::new()
		.route("/", get(routes::health::liveness))
		.route("/health", get(routes::health::health_check))
		.route(
			"/verify_key",
			post(routes::verify::verify_key).layer(cors),
		);

	let service = Router::new()
		.route(
			"/principals/{principal_id}/key",
			post(routes::principals::issue_key)
				.get(routes::principals::inspect_key)
				.delete(routes::principals::revoke_key),
		)
		.route(
			"/principals/{principal_id}/key/admin",
			get(routes::principals::lookup_key),
		)
		.route(
			"/principals/{principal_id}/departure",
			post(routes::principals::record_departure),
		)
		.route("/keys/stats", get(routes::admin::key_stats))
		.route(
			"/reconciliation",
			get(routes::admin::reconciliation_status),
		)
		.route(
			"/reconciliation/run",
			post(routes::admin::run_reconciliation),
		)
		.route(
			"/reconciliation/pause",
			post(routes::admin::pause_reconciliation),
		)
		.route(
			"/reconciliation/resume",
			post(routes::admin::resume_reconciliation),
		)
		.route_layer(middleware::from_fn_with_state(
			state.clone(),
			require_service_token,
		));

	Router::new()
		.merge(public)
		.nest("/v1", service)
		.layer(TraceLayer::new_for_http())
		.with_state(state)
}
