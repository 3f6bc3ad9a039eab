//! API handlers for the loan service

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Serialize;
use sqlx::PgPool;

use crate::db;
use crate::error::ApiError;
use crate::loan::{CreateLoanRequest, CreateLoanResponse, LoanResponse};
use crate::state::AppState;

/// Submit a loan application.
pub async fn submit_loan(
    State(state): State<AppState>,
    Json(request): Json<CreateLoanRequest>,
) -> Result<Json<CreateLoanResponse>, ApiError> {
    let customer_id = request.customer_id.clone();

    match state.loan_service.submit_loan(request).await {
        Ok(response) => Ok(Json(response)),
        Err(err) => {
            if err.status_code().is_server_error() {
                tracing::error!(
                    customer_id = %customer_id,
                    error = %err,
                    "Error creating loan for customer"
                );
            }
            Err(err)
        }
    }
}

/// List all loans with their event history.
pub async fn list_loans(State(state): State<AppState>) -> Result<Json<Vec<LoanResponse>>, ApiError> {
    let loans = state.loan_service.list_loans().await?;
    Ok(Json(loans))
}

/// Fetch one loan by id with its event history.
pub async fn get_loan(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<LoanResponse>, ApiError> {
    let loan = state.loan_service.get_loan(&id).await?;
    Ok(Json(loan))
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub database: String,
    pub version: String,
}

/// Health check endpoint
pub async fn health_check(State(pool): State<PgPool>) -> Json<HealthResponse> {
    let database = match db::check_health(&pool).await {
        Ok(()) => "connected".to_string(),
        Err(e) => format!("error: {}", e),
    };

    let status = if database == "connected" {
        "healthy"
    } else {
        "unhealthy"
    };

    Json(HealthResponse {
        status: status.to_string(),
        database,
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}
