// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Keysmith server binary.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use keysmith_server::{create_app_state, create_router};
use keysmith_server_config::{LogFormat, ServerConfig};
use keysmith_server_jobs::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod version;

/// Keysmith server - issues and verifies membership-gated access keys.
#[derive(Parser, Debug)]
#[command(
	name = "keysmith-server",
	about = "Keysmith key issuance and verification server",
	version
)]
struct Args {
	/// Path to a TOML config file (defaults to /etc/keysmith/server.toml)
	#[arg(long, global = true, env = "KEYSMITH_SERVER_CONFIG")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
	/// Run the HTTP server and scheduled jobs (default)
	Serve,
	/// Run a single reconciliation pass and exit
	ReconcileOnce,
	/// Show version and build information
	Version,
}

fn init_tracing(config: &ServerConfig) {
	let filter = tracing_subscriber::EnvFilter::try_from_default_env()
		.unwrap_or_else(|_| config.logging.level.clone().into());

	let (pretty, json) = match config.logging.format {
		LogFormat::Pretty => (Some(tracing_subscriber::fmt::layer()), None),
		LogFormat::Json => (None, Some(tracing_subscriber::fmt::layer().json())),
	};

	tracing_subscriber::registry()
		.with(filter)
		.with(pretty)
		.with(json)
		.init();
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	if let Some(Command::Version) = args.command {
		println!("{}", version::format_version_info());
		return Ok(());
	}

	dotenvy::dotenv().ok();

	let config = match &args.config {
		Some(path) => keysmith_server_config::load_config_with_file(path)?,
		None => keysmith_server_config::load_config()?,
	};

	init_tracing(&config);

	match args.command {
		Some(Command::ReconcileOnce) => reconcile_once(&config).await,
		_ => serve(&config).await,
	}
}

async fn reconcile_once(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
	let state = create_app_state(config).await?;
	let report = state
		.reconciliation
		.reconcile(&CancellationToken::new())
		.await?;

	tracing::info!(
		checked = report.checked,
		deactivated = report.deactivated,
		skipped_indeterminate = report.skipped_indeterminate,
		failed = report.failed,
		"reconciliation pass completed"
	);
	println!("{}", serde_json::to_string_pretty(&report)?);
	Ok(())
}

async fn serve(config: &ServerConfig) -> Result<(), Box<dyn std::error::Error>> {
	tracing::info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		oracle = %config.oracle.kind,
		"starting keysmith-server"
	);

	let state = create_app_state(config).await?;

	if config.reconciliation.enabled {
		tracing::info!(
			interval = %humantime::format_duration(Duration::from_secs(config.reconciliation.interval_secs)),
			"periodic reconciliation enabled"
		);
	}
	if config.service.token.is_none() {
		tracing::warn!("no service token configured, the /v1 service API will refuse all calls");
	}

	let scheduler = state.scheduler.clone();
	scheduler.start().await;

	let app = create_router(state);

	let addr = config.socket_addr();
	tracing::info!("listening on {}", addr);

	let listener = tokio::net::TcpListener::bind(&addr).await?;

	tokio::select! {
		result = axum::serve(listener, app) => {
			if let Err(e) = result {
				tracing::error!(error = %e, "Server error");
			}
		}
		_ = tokio::signal::ctrl_c() => {
			tracing::info!("Received shutdown signal");
			tracing::info!("Shutting down job scheduler...");
			scheduler.shutdown().await;
		}
	}

	tracing::info!("Server shutdown complete");
	Ok(())
}
