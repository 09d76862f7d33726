// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Public key verification endpoint.
//!
//! Request: `{"key": "<string>"}`. Response: `{"valid": true}` or
//! `{"valid": false, "error": "..."}`. Nothing about the owning principal
//! is ever returned.

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;

use crate::api::AppState;

pub const NO_KEY_PROVIDED: &str = "No key provided";
pub const INVALID_KEY: &str = "Invalid key";
pub const VERIFICATION_UNAVAILABLE: &str = "Verification unavailable";

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
	pub valid: bool,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<&'static str>,
}

impl VerifyResponse {
	fn valid() -> Self {
		Self {
			valid: true,
			error: None,
		}
	}

	fn invalid(error: &'static str) -> Self {
		Self {
			valid: false,
			error: Some(error),
		}
	}
}

/// Pull a non-blank `key` string out of the request body.
///
/// Malformed JSON, a missing key, a non-string key, and a blank key are all
/// treated as "no key provided".
fn presented_key(body: &[u8]) -> Option<String> {
	let value: serde_json::Value = serde_json::from_slice(body).ok()?;
	let key = value.get("key")?.as_str()?.trim();
	(!key.is_empty()).then(|| key.to_string())
}

/// POST /verify_key
pub async fn verify_key(State(state): State<AppState>, body: Bytes) -> impl IntoResponse {
	let Some(key) = presented_key(&body) else {
		return (
			StatusCode::BAD_REQUEST,
			Json(VerifyResponse::invalid(NO_KEY_PROVIDED)),
		);
	};

	match state.verification.verify(&key).await {
		Ok(true) => (StatusCode::OK, Json(VerifyResponse::valid())),
		Ok(false) => (StatusCode::OK, Json(VerifyResponse::invalid(INVALID_KEY))),
		Err(e) => {
			tracing::error!(error = %e, "key verification failed");
			(
				StatusCode::SERVICE_UNAVAILABLE,
				Json(VerifyResponse::invalid(VERIFICATION_UNAVAILABLE)),
			)
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn presented_key_accepts_string_key() {
		assert_eq!(
			presented_key(br#"{"key": "  abcd  "}"#).as_deref(),
			Some("abcd")
		);
	}

	#[test]
	fn presented_key_rejects_bad_bodies() {
		assert_eq!(presented_key(b""), None);
		assert_eq!(presented_key(b"not json"), None);
		assert_eq!(presented_key(br#"{}"#), None);
		assert_eq!(presented_key(br#"{"key": 42}"#), None);
		assert_eq!(presented_key(br#"{"key": "   "}"#), None);
		assert_eq!(presented_key(br#"["key"]"#), None);
	}

	#[test]
	fn valid_response_omits_error() {
		let json = serde_json::to_value(VerifyResponse::valid()).unwrap();
		assert_eq!(json, serde_json::json!({ "valid": true }));
	}
}
