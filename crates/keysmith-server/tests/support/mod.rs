// Copyright (c) 2025 Geoffrey Huntley <ghuntley@ghuntley.com>. All rights reserved.
// SPDX-License-Identifier: Proprietary

#![allow(dead_code)]

use std::sync::Arc;

use async_trait::async_trait;
use axum::{
	body::Body,
	http::{header, HeaderMap, Method, Request, StatusCode},
	Router,
};
use chrono::{DateTime, Utc};
use keysmith_common_secret::SecretString;
use keysmith_core::{
	DeactivationReason, KeyRecord, KeyStats, KeyValue, ManualClock, PrincipalId,
};
use keysmith_server::{
	assemble_app_state, create_router, AppComponents, AppState, StaticOracle,
};
use keysmith_server_config::ServerConfig;
use keysmith_server_db::{DbError, KeyStore, MemoryKeyStore};
use serde_json::Value;
use tower::ServiceExt;

pub const SERVICE_TOKEN: &str = "test-service-token";

pub struct TestApp {
	pub router: Router,
	pub state: AppState,
	pub oracle: Arc<StaticOracle>,
	pub clock: Arc<ManualClock>,
	pub store: Arc<dyn KeyStore>,
}

pub struct TestResponse {
	pub status: StatusCode,
	pub headers: HeaderMap,
	pub body: Value,
	pub text: String,
}

pub fn test_config() -> ServerConfig {
	let mut config = ServerConfig::default();
	config.service.token = Some(SecretString::new(SERVICE_TOKEN.to_string()));
	config
}

impl TestApp {
	pub fn new() -> Self {
		Self::with_config(test_config())
	}

	pub fn with_config(config: ServerConfig) -> Self {
		Self::with_store(config, Arc::new(MemoryKeyStore::new()))
	}

	pub fn with_store(config: ServerConfig, store: Arc<dyn KeyStore>) -> Self {
		let oracle = Arc::new(StaticOracle::allow_all());
		let clock = Arc::new(ManualClock::default());
		let state = assemble_app_state(
			&config,
			AppComponents {
				store: Arc::clone(&store),
				oracle: oracle.clone(),
				clock: clock.clone(),
			},
		);
		let router = create_router(state.clone());
		Self {
			router,
			state,
			oracle,
			clock,
			store,
		}
	}

	pub async fn send(&self, request: Request<Body>) -> TestResponse {
		let response = self.router.clone().oneshot(request).await.unwrap();
		let status = response.status();
		let headers = response.headers().clone();
		let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
			.await
			.unwrap();
		let text = String::from_utf8_lossy(&bytes).to_string();
		let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
		TestResponse {
			status,
			headers,
			body,
			text,
		}
	}

	pub async fn request(
		&self,
		method: Method,
		uri: &str,
		body: Option<Value>,
		token: Option<&str>,
	) -> TestResponse {
		let mut builder = Request::builder().method(method).uri(uri);
		if let Some(token) = token {
			builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
		}
		let body = match body {
			Some(json) => {
				builder = builder.header(header::CONTENT_TYPE, "application/json");
				Body::from(serde_json::to_string(&json).unwrap())
			}
			None => Body::empty(),
		};
		self.send(builder.body(body).unwrap()).await
	}

	/// Service API call with the configured token.
	pub async fn service(&self, method: Method, uri: &str, body: Option<Value>) -> TestResponse {
		self.request(method, uri, body, Some(SERVICE_TOKEN)).await
	}

	pub async fn verify_raw(&self, body: &str) -> TestResponse {
		let request = Request::builder()
			.method(Method::POST)
			.uri("/verify_key")
			.header(header::CONTENT_TYPE, "application/json")
			.body(Body::from(body.to_string()))
			.unwrap();
		self.send(request).await
	}

	pub async fn verify(&self, key: &str) -> TestResponse {
		self.verify_raw(&serde_json::json!({ "key": key }).to_string())
			.await
	}

	/// Issue through the service API and return the key string.
	pub async fn issue(&self, principal: &str) -> String {
		let response = self
			.service(
				Method::POST,
				&format!("/v1/principals/{principal}/key"),
				Some(serde_json::json!({ "context_id": "guild-1" })),
			)
			.await;
		assert!(
			response.status.is_success(),
			"issue failed: {} {}",
			response.status,
			response.text
		);
		response.body["value"].as_str().unwrap().to_string()
	}
}

/// Store whose every call fails, for exercising storage error paths.
pub struct UnavailableStore;

fn unavailable() -> DbError {
	DbError::Internal("database is unavailable".to_string())
}

#[async_trait]
impl KeyStore for UnavailableStore {
	async fn create_active(&self, _record: &KeyRecord) -> Result<u64, DbError> {
		Err(unavailable())
	}

	async fn get_active(&self, _principal_id: &PrincipalId) -> Result<Option<KeyRecord>, DbError> {
		Err(unavailable())
	}

	async fn get_by_value(&self, _value: &KeyValue) -> Result<Option<KeyRecord>, DbError> {
		Err(unavailable())
	}

	async fn deactivate(
		&self,
		_value: &KeyValue,
		_reason: DeactivationReason,
		_at: DateTime<Utc>,
	) -> Result<bool, DbError> {
		Err(unavailable())
	}

	async fn deactivate_active_for_principal(
		&self,
		_principal_id: &PrincipalId,
		_reason: DeactivationReason,
		_at: DateTime<Utc>,
	) -> Result<u64, DbError> {
		Err(unavailable())
	}

	async fn list_active(&self) -> Result<Vec<KeyRecord>, DbError> {
		Err(unavailable())
	}

	async fn stats(&self) -> Result<KeyStats, DbError> {
		Err(unavailable())
	}

	async fn ping(&self) -> Result<(), DbError> {
		Err(unavailable())
	}
}
