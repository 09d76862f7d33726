// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Credentials for the chat-platform adapter and admin routes.

use keysmith_common_secret::SecretString;
use serde::Deserialize;

#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
	/// Bearer token required on `/v1` routes. Routes answer 503 when unset.
	pub token: Option<SecretString>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceConfigLayer {
	#[serde(default)]
	pub token: Option<SecretString>,
}

impl ServiceConfigLayer {
	pub fn merge(&mut self, other: ServiceConfigLayer) {
		if other.token.is_some() {
			self.token = other.token;
		}
	}

	pub fn finalize(self) -> ServiceConfig {
		ServiceConfig { token: self.token }
	}
}
