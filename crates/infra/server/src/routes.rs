//! HTTP handlers.

use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;

use patron_mailer::MetricsSnapshot;
use patron_oauth::{AuthError, ProviderProfile, SignIn};
use patron_webhooks::{DeadLetter, WebhookError, constant_time_eq};

use crate::AppState;

/// Header carrying the processor's webhook signature.
const SIGNATURE_HEADER: &str = "stripe-signature";

const DEFAULT_DEAD_LETTER_LIMIT: usize = 100;

pub(crate) fn router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/stripe", post(stripe_webhook))
        .route("/auth/callback/{provider}", post(auth_callback))
        .route("/admin/email-metrics", get(email_metrics))
        .route("/admin/dead-letters", get(dead_letters))
}

/// Error body for rejected requests.
pub(crate) struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn unauthorized() -> Self {
        Self {
            status: StatusCode::UNAUTHORIZED,
            message: "Missing or invalid admin token".to_string(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(err: WebhookError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self {
            status: StatusCode::from_u16(err.status_code())
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR),
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

/// Verifies and processes a webhook. Every verified event is acknowledged
/// with 200, whatever its outcome.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>, ApiError> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok());

    let outcome = state.webhooks.receive(signature, &body).await?;
    Ok(Json(json!({ "received": true, "outcome": outcome })))
}

/// Completes a provider sign-in. The caller has already verified the
/// provider's token; the path names the provider.
async fn auth_callback(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    headers: HeaderMap,
    Json(mut profile): Json<ProviderProfile>,
) -> Result<Json<SignIn>, ApiError> {
    authorize(&state, &headers)?;
    profile.provider = provider;

    let sign_in = state.identity.sign_in(&profile).await.map_err(|err| {
        tracing::warn!(provider = %profile.provider, error = %err, "Sign-in rejected");
        ApiError::from(err)
    })?;
    Ok(Json(sign_in))
}

async fn email_metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, ApiError> {
    authorize(&state, &headers)?;
    Ok(Json(state.metrics.snapshot()))
}

#[derive(Debug, Deserialize)]
pub(crate) struct DeadLetterQuery {
    limit: Option<usize>,
}

async fn dead_letters(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<DeadLetterQuery>,
) -> Result<Json<Vec<DeadLetter>>, ApiError> {
    authorize(&state, &headers)?;
    let letters = state
        .dead_letters
        .list(query.limit.unwrap_or(DEFAULT_DEAD_LETTER_LIMIT))
        .await?;
    Ok(Json(letters))
}

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = &state.admin_token else {
        return Ok(());
    };

    let provided = headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match provided {
        Some(token) if constant_time_eq(token, expected) => Ok(()),
        _ => Err(ApiError::unauthorized()),
    }
}
