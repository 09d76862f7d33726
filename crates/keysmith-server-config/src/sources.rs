// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Configuration sources: environment variables and TOML files.

use std::path::PathBuf;
use std::str::FromStr;

use keysmith_common_secret::load_secret_env;
use tracing::{debug, trace};

use crate::error::ConfigError;
use crate::layer::ServerConfigLayer;
use crate::sections::{
	DatabaseConfigLayer, HttpConfigLayer, LimitsConfigLayer, LogFormat, LoggingConfigLayer,
	OracleConfigLayer, OracleKind, ReconciliationConfigLayer, ServiceConfigLayer,
};

/// Default location of the server config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/keysmith/server.toml";

/// Source precedence levels (higher = overrides lower).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Precedence {
	Defaults = 10,
	ConfigFile = 20,
	Environment = 50,
}

/// Trait for configuration sources.
pub trait ConfigSource: Send + Sync {
	fn name(&self) -> &'static str;
	fn precedence(&self) -> Precedence;
	fn load(&self) -> Result<ServerConfigLayer, ConfigError>;
}

/// Built-in defaults source.
pub struct DefaultsSource;

impl ConfigSource for DefaultsSource {
	fn name(&self) -> &'static str {
		"defaults"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Defaults
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading defaults");
		Ok(ServerConfigLayer::default())
	}
}

/// TOML file configuration source.
pub struct TomlSource {
	path: PathBuf,
}

impl TomlSource {
	pub fn new(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into() }
	}

	pub fn system() -> Self {
		Self::new(SYSTEM_CONFIG_PATH)
	}
}

impl ConfigSource for TomlSource {
	fn name(&self) -> &'static str {
		"toml-config"
	}

	fn precedence(&self) -> Precedence {
		Precedence::ConfigFile
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		if !self.path.exists() {
			debug!(path = %self.path.display(), "config file not found, skipping");
			return Ok(ServerConfigLayer::default());
		}

		debug!(path = %self.path.display(), "loading config file");
		let content = std::fs::read_to_string(&self.path).map_err(|e| ConfigError::FileRead {
			path: self.path.clone(),
			source: e,
		})?;

		let layer: ServerConfigLayer =
			toml::from_str(&content).map_err(|e| ConfigError::TomlParse {
				path: self.path.clone(),
				source: e,
			})?;

		trace!("parsed config layer from TOML");
		Ok(layer)
	}
}

/// Environment variable source.
///
/// Convention: KEYSMITH_SERVER_<FIELD>. Secrets also accept a `_FILE` suffix.
pub struct EnvSource;

impl ConfigSource for EnvSource {
	fn name(&self) -> &'static str {
		"environment"
	}

	fn precedence(&self) -> Precedence {
		Precedence::Environment
	}

	fn load(&self) -> Result<ServerConfigLayer, ConfigError> {
		debug!("loading environment variables");
		Ok(ServerConfigLayer {
			http: Some(load_http_from_env()?),
			database: Some(load_database_from_env()),
			limits: Some(load_limits_from_env()?),
			reconciliation: Some(load_reconciliation_from_env()?),
			oracle: Some(load_oracle_from_env()?),
			service: Some(load_service_from_env()?),
			logging: Some(load_logging_from_env()?),
		})
	}
}

fn env_var(name: &str) -> Option<String> {
	std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_bool(name: &str) -> Option<bool> {
	env_var(name).map(|v| v.eq_ignore_ascii_case("true") || v == "1")
}

fn env_parse<T: FromStr>(name: &str, kind: &str) -> Result<Option<T>, ConfigError> {
	match env_var(name) {
		Some(v) => v.parse().map(Some).map_err(|_| ConfigError::InvalidValue {
			key: name.to_string(),
			message: format!("invalid {kind} value '{v}'"),
		}),
		None => Ok(None),
	}
}

fn env_u16(name: &str) -> Result<Option<u16>, ConfigError> {
	env_parse(name, "u16")
}

fn env_u32(name: &str) -> Result<Option<u32>, ConfigError> {
	env_parse(name, "u32")
}

fn env_u64(name: &str) -> Result<Option<u64>, ConfigError> {
	env_parse(name, "u64")
}

fn env_secret(name: &str) -> Result<Option<keysmith_common_secret::SecretString>, ConfigError> {
	load_secret_env(name).map_err(|e| ConfigError::Secret(e.to_string()))
}

fn load_http_from_env() -> Result<HttpConfigLayer, ConfigError> {
	// Hosting platforms commonly inject a bare PORT.
	let port = match env_u16("KEYSMITH_SERVER_PORT")? {
		Some(port) => Some(port),
		None => env_u16("PORT")?,
	};
	Ok(HttpConfigLayer {
		host: env_var("KEYSMITH_SERVER_HOST"),
		port,
	})
}

fn load_database_from_env() -> DatabaseConfigLayer {
	DatabaseConfigLayer {
		url: env_var("KEYSMITH_SERVER_DATABASE_URL"),
	}
}

fn load_limits_from_env() -> Result<LimitsConfigLayer, ConfigError> {
	Ok(LimitsConfigLayer {
		issuance_limit: env_u32("KEYSMITH_SERVER_ISSUANCE_LIMIT")?,
		issuance_window_secs: env_u64("KEYSMITH_SERVER_ISSUANCE_WINDOW_SECS")?,
		inspection_limit: env_u32("KEYSMITH_SERVER_INSPECTION_LIMIT")?,
		inspection_window_secs: env_u64("KEYSMITH_SERVER_INSPECTION_WINDOW_SECS")?,
		lock_timeout_ms: env_u64("KEYSMITH_SERVER_LOCK_TIMEOUT_MS")?,
		key_allocation_attempts: env_u32("KEYSMITH_SERVER_KEY_ALLOCATION_ATTEMPTS")?,
	})
}

fn load_reconciliation_from_env() -> Result<ReconciliationConfigLayer, ConfigError> {
	Ok(ReconciliationConfigLayer {
		enabled: env_bool("KEYSMITH_SERVER_RECONCILIATION_ENABLED"),
		interval_secs: env_u64("KEYSMITH_SERVER_RECONCILIATION_INTERVAL_SECS")?,
		sweep_interval_secs: env_u64("KEYSMITH_SERVER_SWEEP_INTERVAL_SECS")?,
	})
}

fn load_oracle_from_env() -> Result<OracleConfigLayer, ConfigError> {
	let kind = env_var("KEYSMITH_SERVER_ORACLE_KIND")
		.map(|v| {
			OracleKind::from_str(&v).map_err(|message| ConfigError::InvalidValue {
				key: "KEYSMITH_SERVER_ORACLE_KIND".to_string(),
				message,
			})
		})
		.transpose()?;

	Ok(OracleConfigLayer {
		kind,
		api_base_url: env_var("KEYSMITH_SERVER_DISCORD_API_BASE_URL"),
		bot_token: env_secret("KEYSMITH_SERVER_BOT_TOKEN")?,
		required_role_id: env_var("KEYSMITH_SERVER_REQUIRED_ROLE_ID"),
		request_timeout_secs: env_u64("KEYSMITH_SERVER_ORACLE_TIMEOUT_SECS")?,
	})
}

fn load_service_from_env() -> Result<ServiceConfigLayer, ConfigError> {
	Ok(ServiceConfigLayer {
		token: env_secret("KEYSMITH_SERVER_SERVICE_TOKEN")?,
	})
}

fn load_logging_from_env() -> Result<LoggingConfigLayer, ConfigError> {
	let format = env_var("KEYSMITH_SERVER_LOG_FORMAT")
		.map(|v| {
			LogFormat::from_str(&v).map_err(|message| ConfigError::InvalidValue {
				key: "KEYSMITH_SERVER_LOG_FORMAT".to_string(),
				message,
			})
		})
		.transpose()?;

	Ok(LoggingConfigLayer {
		level: env_var("KEYSMITH_SERVER_LOG_LEVEL"),
		format,
	})
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	#[test]
	fn test_precedence_ordering() {
		assert!(Precedence::Environment > Precedence::ConfigFile);
		assert!(Precedence::ConfigFile > Precedence::Defaults);
	}

	#[test]
	fn test_defaults_source_returns_empty_layer() {
		let source = DefaultsSource;
		let layer = source.load().unwrap();
		assert!(layer.http.is_none());
		assert!(layer.database.is_none());
	}

	#[test]
	fn test_toml_source_missing_file_returns_empty() {
		let source = TomlSource::new("/nonexistent/config.toml");
		let layer = source.load().unwrap();
		assert!(layer.http.is_none());
	}

	#[test]
	fn test_toml_source_reads_sections() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(
			file,
			r#"
[limits]
issuance_limit = 3

[oracle]
kind = "allow_all"
"#
		)
		.unwrap();

		let layer = TomlSource::new(file.path()).load().unwrap();
		assert_eq!(layer.limits.unwrap().issuance_limit, Some(3));
		assert_eq!(layer.oracle.unwrap().kind, Some(OracleKind::AllowAll));
	}

	#[test]
	fn test_toml_source_parse_error() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		write!(file, "[limits\nissuance_limit = ").unwrap();

		let result = TomlSource::new(file.path()).load();
		assert!(matches!(result, Err(ConfigError::TomlParse { .. })));
	}

	#[test]
	fn test_env_parse_rejects_garbage() {
		let name = "KEYSMITH_CONFIG_TEST_GARBAGE_U32";
		std::env::set_var(name, "many");
		let result = env_u32(name);
		std::env::remove_var(name);

		match result {
			Err(ConfigError::InvalidValue { key, message }) => {
				assert_eq!(key, name);
				assert!(message.contains("many"));
			}
			other => panic!("expected InvalidValue, got {other:?}"),
		}
	}

	#[test]
	fn test_env_bool_variants() {
		let name = "KEYSMITH_CONFIG_TEST_BOOL";
		std::env::set_var(name, "TRUE");
		assert_eq!(env_bool(name), Some(true));
		std::env::set_var(name, "0");
		assert_eq!(env_bool(name), Some(false));
		std::env::remove_var(name);
		assert_eq!(env_bool(name), None);
	}
}
