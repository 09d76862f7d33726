// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Authorization oracle configuration.

use std::fmt;
use std::str::FromStr;

use keysmith_common_secret::SecretString;
use serde::Deserialize;

const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Which membership check backs issuance and reconciliation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OracleKind {
	/// Guild member lookup on the Discord REST API, checking for a role.
	#[default]
	Discord,
	/// Every principal is authorized. Local development only.
	AllowAll,
	/// No principal is authorized.
	DenyAll,
}

impl fmt::Display for OracleKind {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			OracleKind::Discord => write!(f, "discord"),
			OracleKind::AllowAll => write!(f, "allow_all"),
			OracleKind::DenyAll => write!(f, "deny_all"),
		}
	}
}

impl FromStr for OracleKind {
	type Err = String;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.to_ascii_lowercase().as_str() {
			"discord" => Ok(OracleKind::Discord),
			"allow_all" | "allow-all" => Ok(OracleKind::AllowAll),
			"deny_all" | "deny-all" => Ok(OracleKind::DenyAll),
			other => Err(format!("unknown oracle kind '{other}'")),
		}
	}
}

#[derive(Debug, Clone)]
pub struct OracleConfig {
	pub kind: OracleKind,
	pub api_base_url: String,
	pub bot_token: Option<SecretString>,
	pub required_role_id: Option<String>,
	pub request_timeout_secs: u64,
}

impl Default for OracleConfig {
	fn default() -> Self {
		OracleConfigLayer::default().finalize()
	}
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OracleConfigLayer {
	#[serde(default)]
	pub kind: Option<OracleKind>,
	#[serde(default)]
	pub api_base_url: Option<String>,
	#[serde(default)]
	pub bot_token: Option<SecretString>,
	#[serde(default)]
	pub required_role_id: Option<String>,
	#[serde(default)]
	pub request_timeout_secs: Option<u64>,
}

impl OracleConfigLayer {
	pub fn merge(&mut self, other: OracleConfigLayer) {
		if other.kind.is_some() {
			self.kind = other.kind;
		}
		if other.api_base_url.is_some() {
			self.api_base_url = other.api_base_url;
		}
		if other.bot_token.is_some() {
			self.bot_token = other.bot_token;
		}
		if other.required_role_id.is_some() {
			self.required_role_id = other.required_role_id;
		}
		if other.request_timeout_secs.is_some() {
			self.request_timeout_secs = other.request_timeout_secs;
		}
	}

	pub fn finalize(self) -> OracleConfig {
		OracleConfig {
			kind: self.kind.unwrap_or_default(),
			api_base_url: self
				.api_base_url
				.map(|url| url.trim_end_matches('/').to_string())
				.unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string()),
			bot_token: self.bot_token,
			required_role_id: self.required_role_id,
			request_timeout_secs: self
				.request_timeout_secs
				.unwrap_or(DEFAULT_REQUEST_TIMEOUT_SECS),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_defaults() {
		let config = OracleConfig::default();
		assert_eq!(config.kind, OracleKind::Discord);
		assert_eq!(config.api_base_url, "https://discord.com/api/v10");
		assert!(config.bot_token.is_none());
		assert_eq!(config.request_timeout_secs, 10);
	}

	#[test]
	fn test_kind_parsing() {
		assert_eq!("ALLOW_ALL".parse::<OracleKind>(), Ok(OracleKind::AllowAll));
		assert_eq!("deny-all".parse::<OracleKind>(), Ok(OracleKind::DenyAll));
		assert!("ldap".parse::<OracleKind>().is_err());
	}

	#[test]
	fn test_toml_layer_with_token_is_redacted_in_debug() {
		let layer: OracleConfigLayer = toml::from_str(
			r#"
kind = "discord"
api_base_url = "http://127.0.0.1:9999/"
bot_token = "very-secret"
required_role_id = "1411211795154210846"
"#,
		)
		.unwrap();
		let config = layer.finalize();
		assert_eq!(config.api_base_url, "http://127.0.0.1:9999");
		assert_eq!(
			config.bot_token.as_ref().map(|t| t.expose().as_str()),
			Some("very-secret")
		);
		assert!(!format!("{config:?}").contains("very-secret"));
	}
}
