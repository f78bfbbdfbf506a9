//! Conversation turn endpoint

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::post,
};
use serde::Serialize;

use super::ApiState;
use crate::Error;
use crate::turn::{TurnRequest, TurnResponse};

/// Message returned for every failure that is not a configuration problem
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Build respond router
pub fn router(state: Arc<ApiState>) -> Router {
    Router::new()
        .route("/respond", post(respond))
        .with_state(state)
}

/// Run one conversation turn
async fn respond(
    State(state): State<Arc<ApiState>>,
    body: Bytes,
) -> Result<Json<TurnResponse>, RespondError> {
    let request: TurnRequest = serde_json::from_slice(&body)?;
    let response = state.turns.handle_turn(&request).await?;
    Ok(Json(response))
}

/// Respond API errors
#[derive(Debug)]
pub enum RespondError {
    NotConfigured(String),
    Rejected(String),
    Internal,
}

impl From<Error> for RespondError {
    fn from(err: Error) -> Self {
        match err {
            Error::Config(msg) => {
                tracing::error!(error = %msg, "turn rejected: provider not configured");
                Self::NotConfigured(msg)
            }
            Error::InvalidRequest(msg) => {
                tracing::warn!(error = %msg, "turn rejected");
                Self::Rejected(msg)
            }
            other => {
                tracing::error!(error = %other, "turn failed");
                Self::Internal
            }
        }
    }
}

impl From<serde_json::Error> for RespondError {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err).into()
    }
}

impl IntoResponse for RespondError {
    fn into_response(self) -> Response {
        #[derive(Serialize)]
        struct ErrorResponse {
            error: String,
        }

        let error = match self {
            Self::NotConfigured(msg) | Self::Rejected(msg) => msg,
            Self::Internal => INTERNAL_ERROR_MESSAGE.to_string(),
        };

        (StatusCode::INTERNAL_SERVER_ERROR, Json(ErrorResponse { error })).into_response()
    }
}
