//! Route definitions for the loan API

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers::{get_loan, health_check, list_loans, submit_loan};
use crate::state::AppState;

// Loan routes
pub fn loan_routes() -> Router<AppState> {
    Router::new()
        .route("/api/loans", post(submit_loan).get(list_loans))
        .route("/api/loans/:id", get(get_loan))
}

// Operational routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
