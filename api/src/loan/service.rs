//! Loan service layer - submission, read projections, and the
//! post-commit publish hook

use std::sync::Arc;

use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;

use crate::db;
use crate::error::ApiError;
use crate::loan::model::{
    generate_loan_id, CreateLoanRequest, CreateLoanResponse, Loan, LoanEvent, LoanEventPayload,
    LoanEventRow, LoanResponse, LoanStatus, SubmissionMetadata, DEFAULT_TERMS,
    EVENT_TYPE_SUBMITTED,
};
use crate::publisher::LoanEventPublisher;

/// Loan service owning writes to the loans and loan_events tables.
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
    publisher: Arc<LoanEventPublisher>,
}

impl LoanService {
    pub fn new(db_pool: PgPool, publisher: Arc<LoanEventPublisher>) -> Self {
        Self { db_pool, publisher }
    }

    /// Submit a loan application.
    ///
    /// The loan row and its LoanSubmitted event are written in one
    /// transaction, rerun as a unit on transient connectivity failures.
    /// After commit the new events are republished as integration
    /// events; a publish failure fails the request even though the rows
    /// are already committed, so a lost publish never passes unnoticed.
    pub async fn submit_loan(
        &self,
        request: CreateLoanRequest,
    ) -> Result<CreateLoanResponse, ApiError> {
        validate_submission(&request)?;

        let metadata = serde_json::to_value(SubmissionMetadata::for_submission(request.terms))?;

        let (loan, event) = self.persist_submission(&request, &metadata).await?;

        self.publish_submitted_events(std::slice::from_ref(&event))
            .await?;

        Ok(CreateLoanResponse {
            loan_id: loan.id,
            status: loan.status.as_str().to_string(),
            submitted_at: loan.created_at,
        })
    }

    /// Execution strategy: rerun the whole transactional unit on
    /// transient failures, with bounded fixed delays. A fresh loan id is
    /// generated per attempt so a replayed commit cannot collide with a
    /// previously committed one.
    async fn persist_submission(
        &self,
        request: &CreateLoanRequest,
        metadata: &serde_json::Value,
    ) -> Result<(Loan, LoanEvent), ApiError> {
        let mut attempt = 0;
        loop {
            match self.insert_submission(request, metadata).await {
                Ok(pair) => return Ok(pair),
                Err(err)
                    if db::is_transient(&err) && attempt < db::TRANSIENT_RETRY_DELAYS.len() =>
                {
                    tracing::warn!(
                        customer_id = %request.customer_id,
                        attempt = attempt + 1,
                        error = %err,
                        "Transient database failure, retrying submission"
                    );
                    tokio::time::sleep(db::TRANSIENT_RETRY_DELAYS[attempt]).await;
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }

    /// One transactional unit: insert the loan and its submission event.
    async fn insert_submission(
        &self,
        request: &CreateLoanRequest,
        metadata: &serde_json::Value,
    ) -> Result<(Loan, LoanEvent), sqlx::Error> {
        let now = Utc::now();
        let loan_id = generate_loan_id(now);

        let mut tx = self.db_pool.begin().await?;

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (id, customer_id, amount, interest_rate, monthly_payment, status, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(&loan_id)
        .bind(&request.customer_id)
        .bind(request.amount)
        .bind(0.0f64)
        .bind(0.0f64)
        .bind(LoanStatus::Submitted)
        .bind(now)
        .fetch_one(&mut *tx)
        .await?;

        let row = sqlx::query_as::<_, LoanEventRow>(
            r#"
            INSERT INTO loan_events (id, loan_id, event_type, "timestamp", version, metadata, customer_id, amount)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&loan_id)
        .bind(EVENT_TYPE_SUBMITTED)
        .bind(now)
        .bind(1i32)
        .bind(metadata)
        .bind(&request.customer_id)
        .bind(request.amount)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        let event = LoanEvent::try_from(row).map_err(|err| {
            sqlx::Error::Decode(format!("inserted event row did not map back: {}", err).into())
        })?;

        Ok((loan, event))
    }

    /// Post-commit publish hook.
    ///
    /// For each newly persisted LoanSubmitted event, re-read the parent
    /// loan and republish it as an integration event. Failures propagate
    /// to the caller; the committed rows stay in place.
    async fn publish_submitted_events(&self, events: &[LoanEvent]) -> Result<(), ApiError> {
        for event in events {
            if !matches!(event.payload, LoanEventPayload::Submitted { .. }) {
                continue;
            }

            let Some(loan) = self.find_loan(&event.loan_id).await? else {
                tracing::warn!(
                    loan_id = %event.loan_id,
                    "Submission event has no parent loan, skipping publish"
                );
                continue;
            };

            let terms = resolve_terms(&event.loan_id, event.metadata.as_ref());

            if let Err(err) = self.publisher.publish_loan_submitted(&loan, terms).await {
                tracing::error!(
                    loan_id = %event.loan_id,
                    error = %err,
                    "Error publishing event for loan"
                );
                return Err(err.into());
            }
        }

        Ok(())
    }

    async fn find_loan(&self, id: &str) -> Result<Option<Loan>, ApiError> {
        let loan = sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(loan)
    }

    async fn load_events(&self, loan_id: &str) -> Result<Vec<LoanEvent>, ApiError> {
        let rows = sqlx::query_as::<_, LoanEventRow>(
            r#"SELECT * FROM loan_events WHERE loan_id = $1 ORDER BY "timestamp""#,
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;

        rows.into_iter().map(LoanEvent::try_from).collect()
    }

    /// List all loans with their ordered event history.
    pub async fn list_loans(&self) -> Result<Vec<LoanResponse>, ApiError> {
        let loans = sqlx::query_as::<_, Loan>("SELECT * FROM loans ORDER BY created_at DESC")
            .fetch_all(&self.db_pool)
            .await?;

        let mut responses = Vec::with_capacity(loans.len());
        for loan in loans {
            let events = self.load_events(&loan.id).await?;
            responses.push(LoanResponse::from_parts(loan, events));
        }

        Ok(responses)
    }

    /// Fetch one loan with its ordered event history.
    pub async fn get_loan(&self, id: &str) -> Result<LoanResponse, ApiError> {
        let loan = self
            .find_loan(id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("Loan with ID {} not found", id)))?;

        let events = self.load_events(&loan.id).await?;

        Ok(LoanResponse::from_parts(loan, events))
    }
}

/// Submission-time validation; these bounds are not persisted as loan
/// fields.
fn validate_submission(request: &CreateLoanRequest) -> Result<(), ApiError> {
    if request.amount <= 0.0 {
        return Err(ApiError::BadRequest(
            "Amount must be greater than 0".to_string(),
        ));
    }

    if !(6..=60).contains(&request.terms) {
        return Err(ApiError::BadRequest(
            "Terms must be between 6 and 60 months".to_string(),
        ));
    }

    Ok(())
}

/// Extract the term count from event metadata.
///
/// Malformed or missing metadata is tolerated: a warning is logged and
/// the default of 12 months is substituted.
fn resolve_terms(loan_id: &str, metadata: Option<&serde_json::Value>) -> i32 {
    let Some(raw) = metadata else {
        return DEFAULT_TERMS;
    };

    match serde_json::from_value::<SubmissionMetadata>(raw.clone()) {
        Ok(parsed) => parsed.terms.unwrap_or(DEFAULT_TERMS),
        Err(err) => {
            tracing::warn!(
                loan_id = %loan_id,
                metadata = %raw,
                error = %err,
                "Could not parse metadata for loan"
            );
            DEFAULT_TERMS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request(amount: f64, terms: i32) -> CreateLoanRequest {
        CreateLoanRequest {
            customer_id: "CUST-1".to_string(),
            amount,
            terms,
        }
    }

    #[test]
    fn test_zero_amount_is_rejected() {
        let err = validate_submission(&request(0.0, 24)).unwrap_err();
        assert!(matches!(err, ApiError::BadRequest(_)));
        assert!(err.to_string().contains("Amount must be greater than 0"));
    }

    #[test]
    fn test_negative_amount_is_rejected() {
        assert!(validate_submission(&request(-100.0, 24)).is_err());
    }

    #[test]
    fn test_terms_out_of_range_are_rejected() {
        let err = validate_submission(&request(5000.0, 5)).unwrap_err();
        assert!(err
            .to_string()
            .contains("Terms must be between 6 and 60 months"));
        assert!(validate_submission(&request(5000.0, 61)).is_err());
    }

    #[test]
    fn test_boundary_terms_are_accepted() {
        assert!(validate_submission(&request(5000.0, 6)).is_ok());
        assert!(validate_submission(&request(5000.0, 60)).is_ok());
    }

    #[test]
    fn test_resolve_terms_from_valid_metadata() {
        let metadata = json!({"terms": 36, "submittedVia": "web-api"});
        assert_eq!(resolve_terms("LOAN-1", Some(&metadata)), 36);
    }

    #[test]
    fn test_resolve_terms_defaults_when_missing() {
        assert_eq!(resolve_terms("LOAN-1", None), DEFAULT_TERMS);

        let metadata = json!({"submittedVia": "web-api"});
        assert_eq!(resolve_terms("LOAN-1", Some(&metadata)), DEFAULT_TERMS);
    }

    #[test]
    fn test_resolve_terms_defaults_when_malformed() {
        let metadata = json!({"terms": "thirty-six"});
        assert_eq!(resolve_terms("LOAN-1", Some(&metadata)), DEFAULT_TERMS);

        let metadata = json!("not an object");
        assert_eq!(resolve_terms("LOAN-1", Some(&metadata)), DEFAULT_TERMS);
    }
}
