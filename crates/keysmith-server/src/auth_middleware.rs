// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

//! Shared-secret authentication for the service API.
//!
//! Callers (the chat bot, operator tooling) present
//! `Authorization: Bearer <token>`. When no token is configured the
//! service API is closed entirely.

use axum::{
	extract::{Request, State},
	http::{header::AUTHORIZATION, HeaderMap},
	middleware::Next,
	response::{IntoResponse, Response},
};

use crate::{api::AppState, error::ServerError};

/// Extract the bearer token from the Authorization header.
pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
	headers
		.get(AUTHORIZATION)?
		.to_str()
		.ok()?
		.strip_prefix("Bearer ")
}

pub async fn require_service_token(
	State(state): State<AppState>,
	request: Request,
	next: Next,
) -> Response {
	let Some(expected) = state.service_token.as_ref() else {
		tracing::warn!("service API called but no service token is configured");
		return ServerError::ServiceUnavailable("service API is not configured".to_string())
			.into_response();
	};

	let authorized =
		extract_bearer_token(request.headers()).is_some_and(|presented| expected.matches(presented));
	if !authorized {
		tracing::debug!(path = %request.uri().path(), "rejected service API call");
		return ServerError::Unauthorized.into_response();
	}

	next.run(request).await
}

#[cfg(test)]
mod tests {
	use super::*;
	use axum::http::HeaderValue;

	#[test]
	fn extracts_bearer_token() {
		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
		assert_eq!(extract_bearer_token(&headers), Some("abc"));
	}

	#[test]
	fn ignores_other_schemes() {
		let mut headers = HeaderMap::new();
		headers.insert(AUTHORIZATION, HeaderValue::from_static("Basic abc"));
		assert_eq!(extract_bearer_token(&headers), None);
		assert_eq!(extract_bearer_token(&HeaderMap::new()), None);
	}
}
