//! Consumer for loan-submission integration events
//!
//! Logs receipt and completes; downstream orchestration hangs off this
//! point later. Errors re-raise so the bus retry and dead-letter
//! behavior apply.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;

use loan_contracts::LoanSubmittedIntegrationEvent;
use loan_messaging::{MessageHandler, Result};

/// Handles LoanSubmitted integration events from the loan queue.
#[derive(Default)]
pub struct LoanSubmittedConsumer {
    processed: AtomicU64,
}

impl LoanSubmittedConsumer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of events processed since startup.
    pub fn processed_count(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl MessageHandler for LoanSubmittedConsumer {
    async fn handle(&self, payload: &[u8]) -> Result<()> {
        let event: LoanSubmittedIntegrationEvent = serde_json::from_slice(payload)?;

        tracing::info!(
            loan_id = %event.loan_id,
            customer_id = %event.customer_id,
            amount = event.amount,
            terms = event.terms,
            "Loan application received"
        );

        self.processed.fetch_add(1, Ordering::Relaxed);

        tracing::info!(loan_id = %event.loan_id, "Loan application processed");

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loan_contracts::LoanSubmittedIntegrationEvent;

    fn event_payload(terms: i32) -> Vec<u8> {
        serde_json::to_vec(&LoanSubmittedIntegrationEvent {
            loan_id: "LOAN-20250830-AB12CD34".to_string(),
            customer_id: "CUST-1".to_string(),
            amount: 5000.0,
            terms,
            submitted_at: "2025-08-30T12:00:00Z".parse().unwrap(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_valid_event_is_processed() {
        let consumer = LoanSubmittedConsumer::new();

        consumer.handle(&event_payload(36)).await.unwrap();

        assert_eq!(consumer.processed_count(), 1);
    }

    #[tokio::test]
    async fn test_malformed_payload_is_re_raised() {
        let consumer = LoanSubmittedConsumer::new();

        let result = consumer.handle(b"not json").await;

        assert!(result.is_err());
        assert_eq!(consumer.processed_count(), 0);
    }
}
