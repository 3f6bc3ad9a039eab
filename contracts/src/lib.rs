//! Shared integration-event contracts for the loan services
//!
//! These types cross the bus boundary between the loan API and the BFF,
//! so both sides depend on this crate rather than on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Queue carrying loan-submission integration events.
pub const LOAN_QUEUE: &str = "loan-queue";

/// Published after a loan submission commits.
///
/// A flattened projection of the loan row plus the term count resolved
/// from the submission metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanSubmittedIntegrationEvent {
    pub loan_id: String,
    pub customer_id: String,
    pub amount: f64,
    pub terms: i32,
    pub submitted_at: DateTime<Utc>,
}
