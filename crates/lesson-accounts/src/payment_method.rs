//! Payment Method Replacement and Views

use lesson_payments::{CustomerId, CustomerUpdate, PaymentMethod, PaymentMethodId};
use serde::{Deserialize, Serialize};

use crate::error::{AccountError, Result};
use crate::service::{AccountService, required};
use crate::workflow::{Step, StepLog, Workflow};

/// Not-found code when a customer has no usable card
pub const NO_PAYMENT_METHOD: &str = "no_payment_method";

/// Card display fields for the checkout page
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentMethodSummary {
    pub last4: String,
    pub brand: String,
}

impl AccountService {
    /// Swap the customer's default card for `payment_method_id`
    ///
    /// Detach, attach, set default, re-fetch. Stripe does not move a default
    /// on attach, so the default is always set explicitly. A failure after
    /// the detach leaves the customer without a card; the error lists the
    /// steps that already ran.
    pub async fn replace_payment_method(
        &self,
        customer_id: &CustomerId,
        payment_method_id: Option<&str>,
    ) -> Result<PaymentMethod> {
        let new_id = PaymentMethodId::new(required("paymentMethodId", payment_method_id)?);
        let mut log = StepLog::new(Workflow::ReplacePaymentMethod);

        let customer = log
            .run(Step::FetchCustomer, self.processor().retrieve_customer(customer_id))
            .await?;

        match customer.default_payment_method {
            Some(ref old_id) if *old_id != new_id => {
                log.run(Step::DetachPaymentMethod, self.processor().detach_payment_method(old_id))
                    .await?;
                tracing::debug!(%customer_id, payment_method_id = %old_id, "Detached previous card");
            }
            _ => {}
        }

        log.run(
            Step::AttachPaymentMethod,
            self.processor().attach_payment_method(&new_id, customer_id),
        )
        .await?;

        log.run(
            Step::SetDefaultPaymentMethod,
            self.processor()
                .update_customer(customer_id, CustomerUpdate::default_payment_method(new_id.clone())),
        )
        .await?;

        let payment_method = log
            .run(Step::FetchPaymentMethod, self.processor().retrieve_payment_method(&new_id))
            .await?;

        tracing::info!(%customer_id, payment_method_id = %new_id, "Replaced payment method");
        Ok(payment_method)
    }

    /// Last four digits and brand of a stored card
    pub async fn payment_method_summary(
        &self,
        payment_method_id: &PaymentMethodId,
    ) -> Result<PaymentMethodSummary> {
        let mut log = StepLog::new(Workflow::ViewPaymentMethod);
        let payment_method = log
            .run(
                Step::FetchPaymentMethod,
                self.processor().retrieve_payment_method(payment_method_id),
            )
            .await?;

        let card = payment_method.card.ok_or_else(|| AccountError::NotFound {
            code: NO_PAYMENT_METHOD,
            message: format!("Payment method {payment_method_id} is not a card"),
        })?;

        Ok(PaymentMethodSummary {
            last4: card.last4,
            brand: card.brand,
        })
    }

    /// The customer's default payment method, else their first card
    pub async fn current_payment_method(&self, customer_id: &CustomerId) -> Result<PaymentMethod> {
        let mut log = StepLog::new(Workflow::ViewPaymentMethod);
        let customer = log
            .run(Step::FetchCustomer, self.processor().retrieve_customer(customer_id))
            .await?;

        if let Some(default) = customer.default_payment_method {
            return log
                .run(Step::FetchPaymentMethod, self.processor().retrieve_payment_method(&default))
                .await;
        }

        let cards = log
            .run(
                Step::ListCardPaymentMethods,
                self.processor().list_card_payment_methods(customer_id),
            )
            .await?;

        cards
            .into_iter()
            .next()
            .ok_or_else(|| no_payment_method(customer_id))
    }
}

pub(crate) fn no_payment_method(customer_id: &CustomerId) -> AccountError {
    AccountError::NotFound {
        code: NO_PAYMENT_METHOD,
        message: format!("No payment methods found for {customer_id}"),
    }
}
