//! REST routes next to the realtime endpoint.
//!
//! Every route requires `Authorization: Bearer <token>`, verified by the same
//! gate as WebSocket connections.

use crate::handlers::AppState;
use axum::{
    async_trait,
    extract::{FromRequestParts, Path, State},
    http::{header, request::Parts, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, put},
    Json, Router,
};
use parley_core::{
    AuthError, Identity, Message, MessageStore, Notification, NotificationStore, StoreError, User,
    UserStore,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::error;

/// API errors, rendered as `{"error": "..."}`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or rejected credential.
    #[error(transparent)]
    Unauthorized(#[from] AuthError),

    /// The resource does not exist for the caller.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Unauthorized(e) => {
                crate::metrics::record_auth_rejection(e.kind());
                (StatusCode::UNAUTHORIZED, self.to_string())
            }
            Self::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Store(e) => {
                error!(error = %e, "Store error");
                crate::metrics::record_error("store");
                (StatusCode::INTERNAL_SERVER_ERROR, "Server error".to_string())
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

/// Extract the token from an `Authorization: Bearer` header.
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

/// The authenticated caller.
pub struct AuthUser(pub Identity);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let identity = state.auth.verify(bearer_token(&parts.headers))?;
        Ok(Self(identity))
    }
}

/// Routes mounted under `/api`.
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/users", get(list_users))
        .route("/messages/:user_id", get(conversation))
        .route("/notifications", get(list_notifications))
        .route("/notifications/:id/read", put(mark_read))
}

async fn list_users(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = state.hub.store().users_except(&caller.user_id).await?;
    Ok(Json(users))
}

async fn conversation(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Message>>, ApiError> {
    let messages = state
        .hub
        .store()
        .conversation(&caller.user_id, &user_id)
        .await?;
    Ok(Json(messages))
}

async fn list_notifications(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
) -> Result<Json<Vec<Notification>>, ApiError> {
    let notifications = state
        .hub
        .store()
        .notifications_for(&caller.user_id, state.config.api.notification_limit)
        .await?;
    Ok(Json(notifications))
}

async fn mark_read(
    State(state): State<Arc<AppState>>,
    AuthUser(caller): AuthUser,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let marked = state
        .hub
        .store()
        .mark_notification_read(&id, &caller.user_id)
        .await?;

    if !marked {
        return Err(ApiError::NotFound("Notification"));
    }
    Ok(Json(
        serde_json::json!({ "message": "Notification marked as read" }),
    ))
}
