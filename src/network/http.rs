//! HTTP Move Endpoint
//!
//! A request-style alternative to the realtime channel: `POST
//! /games/{id}/moves` submits one move and returns the caller's redacted
//! view of the resulting state. Both paths share the move processor, so
//! WebSocket subscribers see moves made over HTTP.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use tracing::info;
use uuid::Uuid;

use crate::game::engine::RuleViolation;
use crate::game::state::{MatchId, PlayerId};
use crate::game::view::GameView;
use crate::network::processor::{MoveProcessor, ProcessError};
use crate::network::protocol::{ActionPayload, ErrorData, ErrorType};
use crate::network::server::PLAYER_ID_HEADER;
use crate::store::StoreError;

/// Build the HTTP router over a shared move processor.
pub fn router(processor: Arc<MoveProcessor>) -> Router {
    Router::new()
        .route("/games/:id/moves", post(submit_move))
        .with_state(processor)
}

/// Serve the router until `shutdown` resolves.
pub async fn serve(
    addr: std::net::SocketAddr,
    processor: Arc<MoveProcessor>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<(), std::io::Error> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("http endpoint listening on {}", addr);
    axum::serve(listener, router(processor))
        .with_graceful_shutdown(shutdown)
        .await
}

async fn submit_move(
    State(processor): State<Arc<MoveProcessor>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    Json(action): Json<ActionPayload>,
) -> Response {
    let Some(player) = caller_identity(&headers) else {
        return error_response(
            StatusCode::UNAUTHORIZED,
            ErrorData::new(ErrorType::InvalidMessage, "missing x-player-id header"),
        );
    };

    let mv = match action.into_move() {
        Ok(mv) => mv,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                ErrorData::new(ErrorType::InvalidMessage, e.to_string()),
            );
        }
    };

    let match_id = MatchId(id);
    match processor.process(match_id, &player, mv).await {
        Ok(game) => {
            let view = GameView::for_player(&game, &player);
            (StatusCode::OK, Json(view)).into_response()
        }
        Err(e) => {
            let status = match &e {
                ProcessError::Rule(RuleViolation::NotAParticipant)
                | ProcessError::NotAParticipant => StatusCode::FORBIDDEN,
                ProcessError::Rule(_) => StatusCode::BAD_REQUEST,
                ProcessError::Store(StoreError::MatchNotFound(_)) => StatusCode::NOT_FOUND,
                ProcessError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
            };
            let data = match &e {
                ProcessError::Rule(RuleViolation::NotAParticipant)
                | ProcessError::NotAParticipant => {
                    ErrorData::new(ErrorType::NotAParticipant, e.to_string())
                }
                ProcessError::Rule(violation) => ErrorData::rule_violation(violation),
                ProcessError::Store(StoreError::MatchNotFound(_)) => {
                    ErrorData::new(ErrorType::MatchNotFound, e.to_string())
                }
                ProcessError::Store(_) => ErrorData::new(ErrorType::Internal, e.to_string()),
            };
            error_response(status, data)
        }
    }
}

fn caller_identity(headers: &HeaderMap) -> Option<PlayerId> {
    headers
        .get(PLAYER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(PlayerId::from)
}

fn error_response(status: StatusCode, data: ErrorData) -> Response {
    (status, Json(data)).into_response()
}
