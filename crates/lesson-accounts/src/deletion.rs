//! Guarded Account Deletion

use lesson_payments::{CustomerId, PaymentIntentId, PaymentIntentStatus};

use crate::error::{AccountError, Result};
use crate::service::AccountService;
use crate::workflow::{Step, StepLog, Workflow};

/// Payment intents inspected before deleting a customer
pub const PAYMENT_INTENT_PAGE_SIZE: u64 = 100;

/// Result of a deletion attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Deletion {
    Deleted,

    /// Authorized lessons must be captured or canceled first
    Blocked {
        uncaptured_payments: Vec<PaymentIntentId>,
    },
}

impl AccountService {
    /// Delete the customer unless a payment is still awaiting capture
    pub async fn delete_account(&self, customer_id: &CustomerId) -> Result<Deletion> {
        let mut log = StepLog::new(Workflow::DeleteAccount);

        let intents = log
            .run(
                Step::ListPaymentIntents,
                self.processor()
                    .list_payment_intents(customer_id, PAYMENT_INTENT_PAGE_SIZE),
            )
            .await?;

        let uncaptured_payments: Vec<PaymentIntentId> = intents
            .into_iter()
            .filter(|pi| pi.status == PaymentIntentStatus::RequiresCapture)
            .map(|pi| pi.id)
            .collect();

        if !uncaptured_payments.is_empty() {
            tracing::info!(
                %customer_id,
                count = uncaptured_payments.len(),
                "Deletion blocked by uncaptured payments"
            );
            return Ok(Deletion::Blocked { uncaptured_payments });
        }

        let deleted = log
            .run(Step::DeleteCustomer, self.processor().delete_customer(customer_id))
            .await?;
        if !deleted {
            return Err(AccountError::DeletionNotConfirmed(customer_id.clone()));
        }

        tracing::info!(%customer_id, "Deleted customer");
        Ok(Deletion::Deleted)
    }
}
