//! Integration-event publisher for the loan API

use std::sync::Arc;

use loan_contracts::{LoanSubmittedIntegrationEvent, LOAN_QUEUE};
use loan_messaging::{BusError, MessageBus};

use crate::loan::model::Loan;

/// Publishes loan integration events onto the bus.
pub struct LoanEventPublisher {
    bus: Arc<dyn MessageBus>,
}

impl LoanEventPublisher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }

    /// Emit a LoanSubmitted integration event for a committed loan.
    ///
    /// Failures are logged and propagated so the save path can surface
    /// them instead of silently losing the publish.
    pub async fn publish_loan_submitted(&self, loan: &Loan, terms: i32) -> Result<(), BusError> {
        let event = LoanSubmittedIntegrationEvent {
            loan_id: loan.id.clone(),
            customer_id: loan.customer_id.clone(),
            amount: loan.amount,
            terms,
            submitted_at: loan.created_at,
        };

        let payload = serde_json::to_vec(&event)?;

        match self.bus.publish(LOAN_QUEUE, payload).await {
            Ok(()) => {
                tracing::info!(loan_id = %loan.id, "Published LoanSubmitted event");
                Ok(())
            }
            Err(err) => {
                tracing::error!(
                    loan_id = %loan.id,
                    error = %err,
                    "Error publishing LoanSubmitted event"
                );
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use chrono::Utc;
    use loan_messaging::{ChannelBus, MessageHandler, RetryPolicy};

    use super::*;
    use crate::loan::model::LoanStatus;

    /// A bus whose publish path always fails.
    struct BrokenBus;

    #[async_trait]
    impl MessageBus for BrokenBus {
        async fn publish(&self, queue: &str, _payload: Vec<u8>) -> Result<(), BusError> {
            Err(BusError::Publish(format!("queue '{}' unreachable", queue)))
        }

        async fn subscribe(
            &self,
            _queue: &str,
            _handler: Arc<dyn MessageHandler>,
        ) -> Result<(), BusError> {
            Ok(())
        }
    }

    fn sample_loan() -> Loan {
        Loan {
            id: "LOAN-20250830-AB12CD34".to_string(),
            customer_id: "CUST-1".to_string(),
            amount: 5000.0,
            interest_rate: 0.0,
            monthly_payment: 0.0,
            status: LoanStatus::Submitted,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[tokio::test]
    async fn test_publish_failure_is_propagated() {
        let publisher = LoanEventPublisher::new(Arc::new(BrokenBus));

        let result = publisher.publish_loan_submitted(&sample_loan(), 24).await;

        assert!(matches!(result, Err(BusError::Publish(_))));
    }

    #[tokio::test]
    async fn test_publish_succeeds_on_working_bus() {
        let bus = Arc::new(ChannelBus::new(RetryPolicy::none()));
        let publisher = LoanEventPublisher::new(bus);

        publisher
            .publish_loan_submitted(&sample_loan(), 24)
            .await
            .unwrap();
    }
}
