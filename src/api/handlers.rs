use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use crate::workflow::{ChaincodeCall, EnrolledIdentity, WorkflowEngine};

/// Shared application state
pub struct AppState {
    pub engine: Arc<WorkflowEngine>,
    /// Identity every request is made as
    pub user: EnrolledIdentity,
    pub account: String,
    pub confirm_commits: bool,
}

#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn internal(err: impl std::error::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

#[derive(Debug, Deserialize)]
pub struct TransactionBody {
    #[serde(alias = "ammount")]
    pub amount: i64,
}

#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    pub status: &'static str,
    pub tx_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<u64>,
}

pub async fn health_handler() -> impl IntoResponse {
    Json(json!({ "status": "healthy" }))
}

/// GET /state/{var}
pub async fn get_state_handler(
    State(state): State<Arc<AppState>>,
    Path(var): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    debug!("Getting state of {}", var);
    let call = ChaincodeCall::new("query", vec![var]);
    let results = state
        .engine
        .query(&state.user, call)
        .await
        .map_err(ApiError::internal)?;

    Ok(Json(json!({ "value": results.result_string() })))
}

/// POST /transactions
pub async fn submit_transaction_handler(
    State(state): State<Arc<AppState>>,
    body: Result<Json<TransactionBody>, JsonRejection>,
) -> Result<Json<TransactionResponse>, ApiError> {
    let Json(body) = body.map_err(|rejection| ApiError::bad_request(rejection.body_text()))?;
    info!("Funding {} with {}", state.account, body.amount);

    let call = ChaincodeCall::new(
        "invoke",
        vec![state.account.clone(), body.amount.to_string()],
    );
    let response = if state.confirm_commits {
        let committed = state
            .engine
            .invoke_and_confirm(&state.user, call)
            .await
            .map_err(ApiError::internal)?;
        TransactionResponse {
            status: "committed",
            tx_id: committed.tx_id,
            block_number: Some(committed.block_number),
        }
    } else {
        let receipt = state
            .engine
            .invoke(&state.user, call)
            .await
            .map_err(ApiError::internal)?;
        TransactionResponse {
            status: "submitted",
            tx_id: receipt.tx_id,
            block_number: None,
        }
    };

    Ok(Json(response))
}
