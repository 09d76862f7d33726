// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

use axum::{
	http::{header, HeaderValue, StatusCode},
	response::{IntoResponse, Response},
	Json,
};
use keysmith_core::OperationClass;
use keysmith_server_db::DbError;
use keysmith_server_jobs::JobError;
use serde::Serialize;
use thiserror::Error;

/// Failures from the key lifecycle operations.
#[derive(Debug, Error)]
pub enum KeyError {
	#[error("rate limited for {class}; retry after {retry_after_secs}s")]
	RateLimited {
		class: OperationClass,
		retry_after_secs: u64,
	},

	#[error("principal is not authorized in this context")]
	Unauthorized,

	#[error("authorization could not be determined: {0}")]
	OracleIndeterminate(String),

	#[error("could not allocate a unique key after {attempts} attempts")]
	KeyAllocationExhausted { attempts: u32 },

	#[error("timed out waiting for principal lock")]
	LockTimeout,

	#[error("storage error: {0}")]
	Storage(#[from] DbError),
}

/// Failures while assembling the server from configuration.
#[derive(Debug, Error)]
pub enum StartupError {
	#[error("database error: {0}")]
	Database(#[from] DbError),

	#[error("http client error: {0}")]
	HttpClient(#[from] reqwest::Error),

	#[error("missing setting: {0}")]
	MissingSetting(&'static str),
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
	pub error: String,
	pub message: String,
	#[serde(skip_serializing_if = "Option::is_none")]
	pub retry_after_secs: Option<u64>,
}

/// Errors returned by the service API handlers.
#[derive(Debug, Error)]
pub enum ServerError {
	#[error(transparent)]
	Key(#[from] KeyError),

	#[error("not found: {0}")]
	NotFound(String),

	#[error("bad request: {0}")]
	BadRequest(String),

	#[error("unauthorized")]
	Unauthorized,

	#[error("conflict: {0}")]
	Conflict(String),

	#[error("service unavailable: {0}")]
	ServiceUnavailable(String),

	#[error("internal error: {0}")]
	Internal(String),
}

impl From<DbError> for ServerError {
	fn from(e: DbError) -> Self {
		ServerError::Key(KeyError::Storage(e))
	}
}

impl From<JobError> for ServerError {
	fn from(e: JobError) -> Self {
		match e {
			JobError::NotFound(id) => ServerError::NotFound(format!("job {id}")),
			JobError::AlreadyRunning(id) => ServerError::Conflict(format!("job {id} is already running")),
			JobError::Cancelled => ServerError::Conflict("job was cancelled".to_string()),
			JobError::Failed { message, .. } => ServerError::Internal(message),
		}
	}
}

fn error_body(status: StatusCode, error: &str, message: String) -> Response {
	(
		status,
		Json(ErrorResponse {
			error: error.to_string(),
			message,
			retry_after_secs: None,
		}),
	)
		.into_response()
}

impl IntoResponse for ServerError {
	fn into_response(self) -> Response {
		match self {
			ServerError::Key(KeyError::RateLimited {
				class,
				retry_after_secs,
			}) => {
				let body = ErrorResponse {
					error: "rate_limited".to_string(),
					message: format!("{class} budget exhausted"),
					retry_after_secs: Some(retry_after_secs),
				};
				let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
				if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
					response.headers_mut().insert(header::RETRY_AFTER, value);
				}
				response
			}
			ServerError::Key(KeyError::Unauthorized) => error_body(
				StatusCode::FORBIDDEN,
				"unauthorized",
				"principal does not hold the required authorization".to_string(),
			),
			ServerError::Key(KeyError::OracleIndeterminate(message)) => {
				tracing::warn!(error = %message, "authorization oracle unavailable");
				error_body(
					StatusCode::SERVICE_UNAVAILABLE,
					"oracle_unavailable",
					"authorization could not be checked, try again later".to_string(),
				)
			}
			ServerError::Key(KeyError::LockTimeout) => error_body(
				StatusCode::SERVICE_UNAVAILABLE,
				"busy",
				"another operation for this principal is in progress".to_string(),
			),
			ServerError::Key(KeyError::KeyAllocationExhausted { attempts }) => {
				tracing::error!(attempts, "key allocation exhausted");
				error_body(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"could not allocate a key".to_string(),
				)
			}
			ServerError::Key(KeyError::Storage(e)) => {
				tracing::error!(error = %e, "storage error");
				error_body(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"storage error".to_string(),
				)
			}
			ServerError::NotFound(message) => error_body(StatusCode::NOT_FOUND, "not_found", message),
			ServerError::BadRequest(message) => error_body(StatusCode::BAD_REQUEST, "bad_request", message),
			ServerError::Unauthorized => error_body(
				StatusCode::UNAUTHORIZED,
				"unauthorized",
				"missing or invalid service token".to_string(),
			),
			ServerError::Conflict(message) => error_body(StatusCode::CONFLICT, "conflict", message),
			ServerError::ServiceUnavailable(message) => {
				error_body(StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", message)
			}
			ServerError::Internal(message) => {
				tracing::error!(error = %message, "internal error");
				error_body(
					StatusCode::INTERNAL_SERVER_ERROR,
					"internal_error",
					"internal error".to_string(),
				)
			}
		}
	}
}
