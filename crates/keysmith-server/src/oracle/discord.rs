// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Role membership oracle backed by the Discord REST API.
//!
//! A principal is authorized when the guild member object returned for
//! `GET /guilds/{context}/members/{principal}` lists the required role.
//! A 404 carrying Discord's "Unknown Member" code means the member is gone
//! and counts as a definite "no". Any other 404 (unknown guild, bot removed
//! from the guild, bad route) says nothing about the member and is
//! indeterminate.

use std::time::Duration;

use async_trait::async_trait;
use keysmith_common_secret::SecretString;
use keysmith_core::{ContextId, PrincipalId};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, instrument, warn};

use super::{AuthorizationOracle, OracleError};

pub const DEFAULT_API_BASE_URL: &str = "https://discord.com/api/v10";

/// JSON error code for "Unknown Member".
const UNKNOWN_MEMBER_CODE: u32 = 10007;

#[derive(Debug, Deserialize)]
struct GuildMember {
	#[serde(default)]
	roles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
	code: u32,
}

pub struct DiscordRoleOracle {
	http_client: Client,
	base_url: String,
	bot_token: SecretString,
	required_role_id: String,
}

impl DiscordRoleOracle {
	pub fn new(
		bot_token: SecretString,
		required_role_id: impl Into<String>,
		timeout: Duration,
	) -> Result<Self, reqwest::Error> {
		let http_client = Client::builder()
			.timeout(timeout)
			.user_agent(concat!("keysmith-server/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self {
			http_client,
			base_url: DEFAULT_API_BASE_URL.to_string(),
			bot_token,
			required_role_id: required_role_id.into(),
		})
	}

	pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
		self.base_url = base_url.into().trim_end_matches('/').to_string();
		self
	}

	pub fn base_url(&self) -> &str {
		&self.base_url
	}

	fn member_url(&self, context: &ContextId, principal: &PrincipalId) -> String {
		format!(
			"{}/guilds/{}/members/{}",
			self.base_url,
			context.as_str(),
			principal.as_str()
		)
	}
}

#[async_trait]
impl AuthorizationOracle for DiscordRoleOracle {
	fn name(&self) -> &'static str {
		"discord"
	}

	#[instrument(skip(self), fields(principal_id = %principal, context_id = %context))]
	async fn is_authorized(
		&self,
		principal: &PrincipalId,
		context: &ContextId,
	) -> Result<bool, OracleError> {
		let response = self
			.http_client
			.get(self.member_url(context, principal))
			.header("Authorization", format!("Bot {}", self.bot_token.expose()))
			.send()
			.await
			.map_err(|e| {
				if e.is_timeout() {
					warn!("Discord member lookup timed out");
					return OracleError::Unreachable("request timed out".to_string());
				}
				warn!(error = %e, "Network error during Discord member lookup");
				OracleError::Unreachable(e.to_string())
			})?;

		let status = response.status();
		debug!(status = %status, "Received Discord member response");

		if status == StatusCode::NOT_FOUND {
			let code = response.json::<ApiError>().await.ok().map(|e| e.code);
			if code == Some(UNKNOWN_MEMBER_CODE) {
				return Ok(false);
			}
			warn!(?code, "Discord lookup returned 404 without an unknown-member code");
			return Err(OracleError::UnexpectedStatus {
				status: status.as_u16(),
			});
		}

		if !status.is_success() {
			if status == StatusCode::TOO_MANY_REQUESTS {
				warn!("Discord API rate limited the member lookup");
			} else {
				warn!(status = status.as_u16(), "Unexpected Discord API status");
			}
			return Err(OracleError::UnexpectedStatus {
				status: status.as_u16(),
			});
		}

		let member: GuildMember = response
			.json()
			.await
			.map_err(|e| OracleError::Decode(e.to_string()))?;

		Ok(member.roles.iter().any(|role| role == &self.required_role_id))
	}
}
