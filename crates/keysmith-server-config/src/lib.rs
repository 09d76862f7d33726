// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration for Keysmith server.
//!
//! This crate provides:
//! - Layered configuration from multiple sources (defaults, TOML file, environment)
//! - Type-safe configuration with validation
//! - Consistent environment variable naming (`KEYSMITH_SERVER_*`)
//!
//! # Usage
//!
//! ```ignore
//! use keysmith_server_config::load_config;
//!
//! let config = load_config()?;
//! println!("Server listening on {}:{}", config.http.host, config.http.port);
//! ```

pub mod error;
pub mod layer;
pub mod sections;
pub mod sources;

pub use error::ConfigError;
pub use layer::ServerConfigLayer;
pub use sections::*;
pub use sources::{
	ConfigSource, DefaultsSource, EnvSource, Precedence, TomlSource, SYSTEM_CONFIG_PATH,
};

use std::path::PathBuf;

use tracing::{debug, info};

/// Fully resolved server configuration.
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
	pub http: HttpConfig,
	pub database: DatabaseConfig,
	pub limits: LimitsConfig,
	pub reconciliation: ReconciliationConfig,
	pub oracle: OracleConfig,
	pub service: ServiceConfig,
	pub logging: LoggingConfig,
}

impl ServerConfig {
	/// Get the socket address string for binding.
	pub fn socket_addr(&self) -> String {
		format!("{}:{}", self.http.host, self.http.port)
	}
}

/// Load configuration from all sources with standard precedence.
///
/// Precedence (highest to lowest):
/// 1. Environment variables (`KEYSMITH_SERVER_*`)
/// 2. Config file (`/etc/keysmith/server.toml`)
/// 3. Built-in defaults
pub fn load_config() -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::system()),
		Box::new(EnvSource),
	])
}

/// Load configuration with a custom config file path.
pub fn load_config_with_file(config_path: impl Into<PathBuf>) -> Result<ServerConfig, ConfigError> {
	load_from_sources(vec![
		Box::new(DefaultsSource),
		Box::new(TomlSource::new(config_path)),
		Box::new(EnvSource),
	])
}

/// Merge the given sources in precedence order and resolve the result.
pub fn load_from_sources(
	mut sources: Vec<Box<dyn ConfigSource>>,
) -> Result<ServerConfig, ConfigError> {
	sources.sort_by_key(|s| s.precedence());

	let mut merged = ServerConfigLayer::default();
	for source in sources {
		debug!(source = source.name(), "loading configuration source");
		let layer = source.load()?;
		merged.merge(layer);
	}

	finalize(merged)
}

/// Finalize configuration layer into resolved config.
pub fn finalize(layer: ServerConfigLayer) -> Result<ServerConfig, ConfigError> {
	let config = ServerConfig {
		http: layer.http.unwrap_or_default().finalize(),
		database: layer.database.unwrap_or_default().finalize(),
		limits: layer.limits.unwrap_or_default().finalize(),
		reconciliation: layer.reconciliation.unwrap_or_default().finalize(),
		oracle: layer.oracle.unwrap_or_default().finalize(),
		service: layer.service.unwrap_or_default().finalize(),
		logging: layer.logging.unwrap_or_default().finalize(),
	};

	validate_config(&config)?;

	info!(
		host = %config.http.host,
		port = config.http.port,
		database = %config.database.url,
		oracle = %config.oracle.kind,
		reconciliation_enabled = config.reconciliation.enabled,
		reconciliation_interval_secs = config.reconciliation.interval_secs,
		service_token_configured = config.service.token.is_some(),
		"Server configuration loaded"
	);

	Ok(config)
}

/// Validate cross-field configuration rules.
fn validate_config(config: &ServerConfig) -> Result<(), ConfigError> {
	let limits = &config.limits;
	if limits.issuance_limit == 0 || limits.inspection_limit == 0 {
		return Err(ConfigError::Validation(
			"rate limits must allow at least one call per window".to_string(),
		));
	}
	if limits.issuance_window_secs == 0 || limits.inspection_window_secs == 0 {
		return Err(ConfigError::Validation(
			"rate limit windows must be non-zero".to_string(),
		));
	}
	if limits.lock_timeout_ms == 0 {
		return Err(ConfigError::Validation(
			"lock_timeout_ms must be non-zero".to_string(),
		));
	}
	if limits.key_allocation_attempts == 0 {
		return Err(ConfigError::Validation(
			"key_allocation_attempts must be at least 1".to_string(),
		));
	}

	let interval = config.reconciliation.interval_secs;
	if !(MIN_RECONCILIATION_INTERVAL_SECS..=MAX_RECONCILIATION_INTERVAL_SECS).contains(&interval) {
		return Err(ConfigError::Validation(format!(
			"reconciliation interval_secs must be between {MIN_RECONCILIATION_INTERVAL_SECS} \
			 and {MAX_RECONCILIATION_INTERVAL_SECS}, got {interval}"
		)));
	}
	if config.reconciliation.sweep_interval_secs == 0 {
		return Err(ConfigError::Validation(
			"sweep_interval_secs must be non-zero".to_string(),
		));
	}

	if config.oracle.kind == OracleKind::Discord {
		if config.oracle.bot_token.is_none() {
			return Err(ConfigError::Validation(
				"oracle kind 'discord' requires KEYSMITH_SERVER_BOT_TOKEN".to_string(),
			));
		}
		if config.oracle.required_role_id.is_none() {
			return Err(ConfigError::Validation(
				"oracle kind 'discord' requires KEYSMITH_SERVER_REQUIRED_ROLE_ID".to_string(),
			));
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	use super::*;
	use keysmith_common_secret::SecretString;
	use std::io::Write;

	fn allow_all_config() -> ServerConfig {
		ServerConfig {
			oracle: OracleConfig {
				kind: OracleKind::AllowAll,
				..Default::default()
			},
			..Default::default()
		}
	}

	#[test]
	fn test_socket_addr() {
		let config = ServerConfig {
			http: HttpConfig {
				host: "127.0.0.1".to_string(),
				port: 9000,
			},
			..Default::default()
		};
		assert_eq!(config.socket_addr(), "127.0.0.1:9000");
	}

	#[test]
	fn test_defaults_with_allow_all_are_valid() {
		assert!(validate_config(&allow_all_config()).is_ok());
	}

	#[test]
	fn test_discord_requires_token_and_role() {
		let mut config = ServerConfig::default();
		let err = validate_config(&config).unwrap_err();
		assert!(err.to_string().contains("BOT_TOKEN"));

		config.oracle.bot_token = Some(SecretString::new("token".to_string()));
		let err = validate_config(&config).unwrap_err();
		assert!(err.to_string().contains("REQUIRED_ROLE_ID"));

		config.oracle.required_role_id = Some("1411211795154210846".to_string());
		assert!(validate_config(&config).is_ok());
	}

	#[test]
	fn test_reconciliation_interval_bounds() {
		let mut config = allow_all_config();
		config.reconciliation.interval_secs = 3_599;
		assert!(validate_config(&config).is_err());
		config.reconciliation.interval_secs = 86_401;
		assert!(validate_config(&config).is_err());
		config.reconciliation.interval_secs = 3_600;
		assert!(validate_config(&config).is_ok());
		config.reconciliation.interval_secs = 86_400;
		assert!(validate_config(&config).is_ok());
	}

	#[test]
	fn test_zero_limits_rejected() {
		let mut config = allow_all_config();
		config.limits.issuance_limit = 0;
		assert!(validate_config(&config).is_err());

		let mut config = allow_all_config();
		config.limits.inspection_window_secs = 0;
		assert!(validate_config(&config).is_err());
	}

	#[test]
	fn test_file_overrides_defaults() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[database]
url = "memory:"

[reconciliation]
interval_secs = 7200

[oracle]
kind = "deny_all"

[logging]
format = "json"
"#
		)
		.unwrap();

		let config = load_from_sources(vec![
			Box::new(DefaultsSource),
			Box::new(TomlSource::new(file.path())),
		])
		.unwrap();

		assert!(config.database.is_memory());
		assert_eq!(config.reconciliation.interval_secs, 7_200);
		assert_eq!(config.oracle.kind, OracleKind::DenyAll);
		assert_eq!(config.logging.format, LogFormat::Json);
		assert_eq!(config.limits, LimitsConfig::default());
	}

	#[test]
	fn test_invalid_file_values_fail_validation() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[oracle]
kind = "allow_all"

[reconciliation]
interval_secs = 60
"#
		)
		.unwrap();

		let result = load_from_sources(vec![Box::new(TomlSource::new(file.path()))]);
		assert!(matches!(result, Err(ConfigError::Validation(_))));
	}
}
