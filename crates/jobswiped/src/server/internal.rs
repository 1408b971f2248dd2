//! Internal HTTP routes for trusted backend services.
//!
//! Producers hand events to the registry here, and the auth service
//! revokes credentials and enrolls principals. Every route requires
//! `Authorization: Bearer <internal_token>`; the routes are not mounted
//! at all when no internal token is configured.
//!
//! | Route | Body | Reply |
//! |-------|------|-------|
//! | `POST /internal/notify` | `NotificationEvent` | `DeliveryReport` |
//! | `POST /internal/broadcast` | any JSON value | `DeliveryReport` |
//! | `POST /internal/revoke` | `{"token": "..."}` | 204 |
//! | `POST /internal/principals` | `Principal` | 204 |

use axum::extract::{FromRequestParts, State};
use axum::http::request::Parts;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use jobswipe_core::{NotificationEvent, Principal};

use super::AppState;
use crate::auth::{AuthError, OracleError, StoreError};
use crate::registry::{DeliveryReport, RegistryError};

pub(super) fn routes() -> Router<AppState> {
    Router::new()
        .route("/internal/notify", post(notify_handler))
        .route("/internal/broadcast", post(broadcast_handler))
        .route("/internal/revoke", post(revoke_handler))
        .route("/internal/principals", post(enroll_handler))
}

// ============================================================================
// Caller authentication
// ============================================================================

/// Proof that the request carried the internal token.
#[derive(Debug)]
pub(super) struct Producer;

impl FromRequestParts<AppState> for Producer {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state.internal_token.as_deref().ok_or(ApiError::Unauthorized)?;
        let presented = bearer(&parts.headers).ok_or(ApiError::Unauthorized)?;

        if tokens_match(presented.as_bytes(), expected.as_bytes()) {
            Ok(Producer)
        } else {
            warn!("Internal request with a wrong token");
            Err(ApiError::Unauthorized)
        }
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
}

/// Compares without stopping at the first differing byte.
fn tokens_match(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

// ============================================================================
// Handlers
// ============================================================================

async fn notify_handler(
    _: Producer,
    State(state): State<AppState>,
    Json(event): Json<NotificationEvent>,
) -> Result<Json<DeliveryReport>, ApiError> {
    // Recipient fields always follow the target.
    let event = NotificationEvent::new(event.target, event.notification);
    let report = state.registry.notify(&event).await?;

    info!(
        identity = %event.target,
        notification = %event.notification.id,
        attempted = report.attempted,
        failed = report.failed,
        "Notification delivered"
    );
    Ok(Json(report))
}

async fn broadcast_handler(
    _: Producer,
    State(state): State<AppState>,
    Json(event): Json<serde_json::Value>,
) -> Result<Json<DeliveryReport>, ApiError> {
    let report = state.registry.broadcast(&event).await?;
    info!(
        attempted = report.attempted,
        failed = report.failed,
        "Broadcast delivered"
    );
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
struct RevokeRequest {
    token: String,
}

async fn revoke_handler(
    _: Producer,
    State(state): State<AppState>,
    Json(request): Json<RevokeRequest>,
) -> Result<StatusCode, ApiError> {
    if request.token.trim().is_empty() {
        return Err(ApiError::BadRequest("token must not be empty".to_string()));
    }
    state.gate.revoke(&request.token).await?;
    info!("Credential revoked");
    Ok(StatusCode::NO_CONTENT)
}

async fn enroll_handler(
    _: Producer,
    State(state): State<AppState>,
    Json(principal): Json<Principal>,
) -> Result<StatusCode, ApiError> {
    let id = principal.id;
    state.gate.enroll(principal).await?;
    info!(principal = %id, "Principal enrolled");
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug)]
pub(super) enum ApiError {
    Unauthorized,
    BadRequest(String),
    Unavailable(String),
}

#[derive(Debug, Serialize)]
struct ApiErrorBody {
    error: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", Some(msg)),
            ApiError::Unavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "unavailable", Some(msg))
            }
        };
        (status, Json(ApiErrorBody { error, message })).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        warn!(error = %e, "Registry unavailable for internal request");
        ApiError::Unavailable(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        warn!(error = %e, "Auth backend refused internal request");
        match e {
            AuthError::Oracle(OracleError::Unavailable(msg))
            | AuthError::Store(StoreError::Unavailable(msg)) => ApiError::Unavailable(msg),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}
