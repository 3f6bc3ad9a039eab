//! Loan domain models and wire DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiError;

/// Event type discriminator for submission events.
pub const EVENT_TYPE_SUBMITTED: &str = "LoanSubmitted";
/// Event type discriminator for status-change events.
pub const EVENT_TYPE_STATUS_CHANGED: &str = "LoanStatusChanged";

/// Term count substituted when submission metadata is missing or malformed.
pub const DEFAULT_TERMS: i32 = 12;

/// Channel recorded in submission metadata.
pub const SUBMITTED_VIA_WEB_API: &str = "web-api";

/// Loan status, stored as text in the loans table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "PascalCase")]
pub enum LoanStatus {
    Submitted,
    InReview,
    Approved,
    Rejected,
    Disbursed,
    Closed,
}

impl LoanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoanStatus::Submitted => "Submitted",
            LoanStatus::InReview => "InReview",
            LoanStatus::Approved => "Approved",
            LoanStatus::Rejected => "Rejected",
            LoanStatus::Disbursed => "Disbursed",
            LoanStatus::Closed => "Closed",
        }
    }
}

/// A loan aggregate row.
///
/// `interest_rate` and `monthly_payment` are persisted but carry no
/// computation; no calculation logic exists in this service.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Loan {
    pub id: String,
    pub customer_id: String,
    pub amount: f64,
    pub interest_rate: f64,
    pub monthly_payment: f64,
    pub status: LoanStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Variant-specific payload of a domain event, selected by the
/// `event_type` discriminator column at the persistence boundary.
#[derive(Debug, Clone)]
pub enum LoanEventPayload {
    Submitted {
        customer_id: String,
        amount: f64,
    },
    StatusChanged {
        new_status: LoanStatus,
        reason: Option<String>,
    },
}

impl LoanEventPayload {
    pub fn event_type(&self) -> &'static str {
        match self {
            LoanEventPayload::Submitted { .. } => EVENT_TYPE_SUBMITTED,
            LoanEventPayload::StatusChanged { .. } => EVENT_TYPE_STATUS_CHANGED,
        }
    }
}

/// An immutable record of something that happened to a loan, stored in
/// the same transaction as the state change it describes. Append-only.
#[derive(Debug, Clone)]
pub struct LoanEvent {
    pub id: Uuid,
    pub loan_id: String,
    pub timestamp: DateTime<Utc>,
    pub version: i32,
    pub metadata: Option<serde_json::Value>,
    pub payload: LoanEventPayload,
}

/// Flat row shape of the loan_events table; variant fields are nullable.
#[derive(Debug, sqlx::FromRow)]
pub struct LoanEventRow {
    pub id: Uuid,
    pub loan_id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub version: i32,
    pub metadata: Option<serde_json::Value>,
    pub customer_id: Option<String>,
    pub amount: Option<f64>,
    pub new_status: Option<LoanStatus>,
    pub reason: Option<String>,
}

impl TryFrom<LoanEventRow> for LoanEvent {
    type Error = ApiError;

    fn try_from(row: LoanEventRow) -> Result<Self, Self::Error> {
        let payload = match row.event_type.as_str() {
            EVENT_TYPE_SUBMITTED => LoanEventPayload::Submitted {
                customer_id: row.customer_id.ok_or_else(|| {
                    ApiError::InternalError(format!(
                        "Submission event {} is missing customer_id",
                        row.id
                    ))
                })?,
                amount: row.amount.ok_or_else(|| {
                    ApiError::InternalError(format!("Submission event {} is missing amount", row.id))
                })?,
            },
            EVENT_TYPE_STATUS_CHANGED => LoanEventPayload::StatusChanged {
                new_status: row.new_status.ok_or_else(|| {
                    ApiError::InternalError(format!(
                        "Status-change event {} is missing new_status",
                        row.id
                    ))
                })?,
                reason: row.reason,
            },
            other => {
                return Err(ApiError::InternalError(format!(
                    "Unknown event type '{}' on event {}",
                    other, row.id
                )))
            }
        };

        Ok(LoanEvent {
            id: row.id,
            loan_id: row.loan_id,
            timestamp: row.timestamp,
            version: row.version,
            metadata: row.metadata,
            payload,
        })
    }
}

/// Typed submission metadata stored on the LoanSubmitted event.
///
/// All fields are optional on read so older or hand-written rows still
/// parse; unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SubmissionMetadata {
    pub terms: Option<i32>,
    pub submitted_via: Option<String>,
}

impl SubmissionMetadata {
    pub fn for_submission(terms: i32) -> Self {
        Self {
            terms: Some(terms),
            submitted_via: Some(SUBMITTED_VIA_WEB_API.to_string()),
        }
    }
}

/// Generate a loan identifier: submission date plus a random token.
///
/// The random suffix makes collisions negligible without a central
/// sequence; the primary key is the only uniqueness guard.
pub fn generate_loan_id(now: DateTime<Utc>) -> String {
    let token = Uuid::new_v4().simple().to_string();
    format!(
        "LOAN-{}-{}",
        now.format("%Y%m%d"),
        token[..8].to_uppercase()
    )
}

// ===== Wire DTOs =====

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanRequest {
    pub customer_id: String,
    pub amount: f64,
    pub terms: i32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLoanResponse {
    pub loan_id: String,
    pub status: String,
    pub submitted_at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanEventView {
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoanResponse {
    pub id: String,
    pub customer_id: String,
    pub amount: f64,
    pub status: String,
    pub created_at: DateTime<Utc>,
    pub events: Vec<LoanEventView>,
}

impl LoanResponse {
    pub fn from_parts(loan: Loan, events: Vec<LoanEvent>) -> Self {
        Self {
            id: loan.id,
            customer_id: loan.customer_id,
            amount: loan.amount,
            status: loan.status.as_str().to_string(),
            created_at: loan.created_at,
            events: events
                .into_iter()
                .map(|event| LoanEventView {
                    event_type: event.payload.event_type().to_string(),
                    timestamp: event.timestamp,
                    metadata: event.metadata,
                })
                .collect(),
        }
    }
}
