//! Axum route handlers for the DreamDiary HTTP server.
//!
//! # Routes
//!
//! - `GET  /health`                     - Returns `{"status": "ok", "version": ..., "service": "dreamdiary"}`
//! - `POST /emotions/parse`             - Parse a bracketed emotion list, no model call
//! - `POST /dreams`                     - Analyse a dream and store it
//! - `GET  /users/:telegram_id/dreams`  - Dreams recorded for a user
//! - `GET  /dreams/:id/classifications` - Emotions recorded for a dream

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::agent::{ConversationRegistry, DreamDiaryAgent, DreamReply, FALLBACK_TELEGRAM_ID};
use crate::bot::handler::APOLOGY_TEXT;
use crate::db::{Classification, Dream, DreamStore};
use crate::emotions::{extract_emotions_report, DiscardedFragment, EmotionRecord};
use crate::utilities::errors::DatabaseError;

/// Shared application state for the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub agent: Arc<DreamDiaryAgent>,
    /// One conversation log per `user_id`.
    pub conversations: ConversationRegistry,
}

impl AppState {
    pub fn new(agent: Arc<DreamDiaryAgent>, conversations: ConversationRegistry) -> Self {
        Self {
            agent,
            conversations,
        }
    }

    fn store(&self) -> &Arc<dyn DreamStore> {
        self.agent.store()
    }
}

type ApiError = (StatusCode, Json<Value>);

fn error_response(status: StatusCode, message: impl Into<String>) -> ApiError {
    (status, Json(serde_json::json!({ "error": message.into() })))
}

fn db_error(e: DatabaseError) -> ApiError {
    tracing::error!("Database error: {}", e);
    error_response(StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
}

/// Build the axum router with all routes.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/emotions/parse", post(parse_emotions_handler))
        .route("/dreams", post(submit_dream_handler))
        .route("/users/:telegram_id/dreams", get(user_dreams_handler))
        .route("/dreams/:id/classifications", get(classifications_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// GET /health - liveness check.
async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "version": crate::VERSION,
        "service": "dreamdiary",
    }))
}

#[derive(Debug, Deserialize)]
pub struct ParseEmotionsRequest {
    pub text: String,
}

#[derive(Debug, Serialize)]
pub struct ParseEmotionsResponse {
    pub emotions: Vec<EmotionRecord>,
    /// Fragments dropped by the parser.
    pub discarded: Vec<DiscardedFragment>,
    /// Kept fragments that did not match the expected grammar.
    pub non_conforming: Vec<EmotionRecord>,
}

/// POST /emotions/parse - run the emotion parser on raw model output.
async fn parse_emotions_handler(
    Json(request): Json<ParseEmotionsRequest>,
) -> Json<ParseEmotionsResponse> {
    let report = extract_emotions_report(Some(&request.text));
    let non_conforming = report
        .non_conforming()
        .map(|p| p.record.clone())
        .collect();
    Json(ParseEmotionsResponse {
        emotions: report.records(),
        discarded: report.discarded,
        non_conforming,
    })
}

#[derive(Debug, Deserialize)]
pub struct SubmitDreamRequest {
    #[serde(default)]
    pub user_id: Option<i64>,
    pub text: String,
}

/// POST /dreams - analyse a dream in the caller's conversation.
async fn submit_dream_handler(
    State(state): State<AppState>,
    Json(request): Json<SubmitDreamRequest>,
) -> Result<Json<DreamReply>, ApiError> {
    if request.text.trim().is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "Dream text must not be empty",
        ));
    }

    let key = request.user_id.unwrap_or(FALLBACK_TELEGRAM_ID);
    let conversation = state.conversations.log_for(key);
    let mut conversation = conversation.lock().await;

    state
        .agent
        .process_dream(&mut conversation, &request.text, request.user_id)
        .await
        .map(Json)
        .map_err(|e| {
            tracing::error!("Error processing dream: {}", e);
            error_response(StatusCode::BAD_GATEWAY, APOLOGY_TEXT)
        })
}

/// GET /users/:telegram_id/dreams - dreams of a user, oldest first.
async fn user_dreams_handler(
    State(state): State<AppState>,
    Path(telegram_id): Path<i64>,
) -> Result<Json<Vec<Dream>>, ApiError> {
    let user = state
        .store()
        .get_user_by_telegram_id(telegram_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            error_response(
                StatusCode::NOT_FOUND,
                format!("User '{}' not found", telegram_id),
            )
        })?;

    let dreams = state
        .store()
        .dreams_for_user(user.id)
        .await
        .map_err(db_error)?;
    Ok(Json(dreams))
}

/// GET /dreams/:id/classifications - emotions stored for one dream.
async fn classifications_handler(
    State(state): State<AppState>,
    Path(dream_id): Path<i64>,
) -> Result<Json<Vec<Classification>>, ApiError> {
    let classifications = state
        .store()
        .classifications_for_dream(dream_id)
        .await
        .map_err(db_error)?;
    Ok(Json(classifications))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
