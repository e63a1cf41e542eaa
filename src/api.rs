//! HTTP API.
//!
//! Every route requires the `Mattermost-User-Id` header. When an API key is
//! configured, the `X-Api-Key` header must match it as well.

use async_trait::async_trait;
use axum::{
    extract::{FromRequestParts, Path, Request, State},
    http::{request::Parts, StatusCode},
    middleware::{self as axum_middleware, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, warn};

use crate::message::Message;
use crate::metrics::TranslationMetrics;
use crate::security::{api_key_matches, API_KEY_HEADER};
use crate::service::{ServiceError, TranslationService};

pub const USER_ID_HEADER: &str = "mattermost-user-id";

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<TranslationService>,
    pub api_key: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: Arc<TranslationService>, api_key: Option<String>) -> Self {
        Self {
            service,
            api_key: api_key.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/translation/languages", get(get_languages))
        .route("/translation/user_preference", post(set_user_preference))
        .route(
            "/channel/:channelid/translations",
            get(get_channel_translations).post(set_channel_translations),
        )
        .route("/post/:postid/translate", post(translate_post))
        .route("/post/:postid/translation_state", get(get_translation_state))
        .route("/hooks/message_posted", post(message_posted))
        .route("/hooks/message_updated", post(message_updated))
        .route("/health", get(health))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn api_key_middleware(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok());

    if !api_key_matches(state.api_key.as_deref(), provided) {
        warn!("Rejected request with missing or invalid API key");
        return Err(StatusCode::UNAUTHORIZED);
    }
    Ok(next.run(request).await)
}

/// The authenticated user, taken from the `Mattermost-User-Id` header.
pub struct UserId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for UserId
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(StatusCode::UNAUTHORIZED)
    }
}

pub struct ApiError(ServiceError);

impl From<ServiceError> for ApiError {
    fn from(e: ServiceError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::PermissionDenied => StatusCode::FORBIDDEN,
            ServiceError::EmptyMessage | ServiceError::InvalidLanguage(_) => StatusCode::BAD_REQUEST,
            ServiceError::FeatureDisabled => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Backend(_) => StatusCode::BAD_GATEWAY,
            ServiceError::Commit(_) | ServiceError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {}", self.0);
        }

        // Backend details stay in the logs
        let message = match &self.0 {
            ServiceError::Backend(_) => "translation failed".to_string(),
            ServiceError::Commit(_) | ServiceError::Store(_) => "internal error".to_string(),
            other => other.to_string(),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

async fn get_languages(
    State(state): State<AppState>,
    UserId(user_id): UserId,
) -> Result<impl IntoResponse, ApiError> {
    Ok(Json(state.service.languages_for_user(&user_id).await?))
}

#[derive(Debug, Deserialize)]
struct UserPreferenceRequest {
    language: String,
}

async fn set_user_preference(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Json(body): Json<UserPreferenceRequest>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .service
        .set_user_preference(&user_id, &body.language)
        .await?;
    Ok(Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct ChannelTranslationsRequest {
    enabled: bool,
}

async fn set_channel_translations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(channel_id): Path<String>,
    Json(body): Json<ChannelTranslationsRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let enabled = state
        .service
        .set_channel_enabled(&user_id, &channel_id, body.enabled)
        .await?;
    Ok(Json(json!({ "enabled": enabled })))
}

async fn get_channel_translations(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(channel_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let enabled = state
        .service
        .channel_enabled_for(&user_id, &channel_id)
        .await?;
    Ok(Json(json!({ "enabled": enabled })))
}

#[derive(Debug, Deserialize)]
struct TranslatePostRequest {
    lang: String,
}

async fn translate_post(
    State(state): State<AppState>,
    UserId(user_id): UserId,
    Path(post_id): Path<String>,
    Json(body): Json<TranslatePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let translation = state
        .service
        .translate_on_demand(&user_id, &post_id, &body.lang)
        .await?;
    Ok(Json(translation))
}

async fn get_translation_state(
    State(state): State<AppState>,
    UserId(_user_id): UserId,
    Path(post_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let translation_state = state.service.translation_state(&post_id).await?;
    Ok(Json(json!({ "state": translation_state })))
}

async fn message_posted(
    State(state): State<AppState>,
    UserId(_user_id): UserId,
    Json(message): Json<Message>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.receive_message(message).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn message_updated(
    State(state): State<AppState>,
    UserId(_user_id): UserId,
    Json(message): Json<Message>,
) -> Result<impl IntoResponse, ApiError> {
    state.service.receive_update(message).await?;
    Ok(StatusCode::ACCEPTED)
}

async fn health(UserId(_user_id): UserId) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "metrics": TranslationMetrics::global().report(),
    }))
}
