//! Account Field Updates
//!
//! Name and email live on both the customer and the billing details of its
//! card. Both records are written, customer first, with the same final values.

use lesson_payments::{BillingDetails, Customer, CustomerId, CustomerUpdate, PaymentMethod};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::payment_method::no_payment_method;
use crate::service::{AccountService, non_blank};
use crate::workflow::{Step, StepLog, Workflow};

/// Customers fetched when checking an email for conflicts
const EMAIL_SEARCH_LIMIT: u64 = 10;

/// Fields a learner may change; blank values are ignored
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AccountChanges {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Result of an account update
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AccountUpdate {
    /// Customer and billing details now carry the new values
    Applied { payment_method: PaymentMethod },

    /// Another customer already uses the email; nothing was written
    ///
    /// `name_blocked` is set when a name change in the same request was
    /// refused along with the email.
    EmailConflict { email: String, name_blocked: bool },

    /// No field differed from the current record
    NothingToUpdate,
}

impl AccountService {
    /// Update name and/or email, refusing emails owned by another customer
    pub async fn update_account(
        &self,
        customer_id: &CustomerId,
        changes: &AccountChanges,
    ) -> Result<AccountUpdate> {
        let mut log = StepLog::new(Workflow::UpdateAccount);

        let customer = log
            .run(Step::FetchCustomer, self.processor().retrieve_customer(customer_id))
            .await?;

        let name = non_blank(changes.name.as_deref());
        let email = non_blank(changes.email.as_deref())
            .filter(|email| customer.email.as_deref() != Some(*email));

        if let Some(email) = email {
            let matches = log
                .run(
                    Step::SearchEmail,
                    self.processor().list_customers_by_email(email, EMAIL_SEARCH_LIMIT),
                )
                .await?;

            if matches.iter().any(|other| other.id != customer.id) {
                tracing::info!(%customer_id, "Email already belongs to another customer");
                return Ok(AccountUpdate::EmailConflict {
                    email: email.to_string(),
                    name_blocked: name.is_some(),
                });
            }
        }

        let update = CustomerUpdate {
            name: name.map(str::to_string),
            email: email.map(str::to_string),
            default_payment_method: None,
        };
        if update.is_empty() {
            return Ok(AccountUpdate::NothingToUpdate);
        }

        let payment_method = self.billing_payment_method(&mut log, &customer).await?;

        let updated = log
            .run(Step::UpdateCustomer, self.processor().update_customer(customer_id, update))
            .await?;

        let payment_method = log
            .run(
                Step::UpdateBillingDetails,
                self.processor().update_billing_details(
                    &payment_method.id,
                    BillingDetails {
                        name: updated.name,
                        email: updated.email,
                    },
                ),
            )
            .await?;

        tracing::info!(%customer_id, payment_method_id = %payment_method.id, "Updated account");
        Ok(AccountUpdate::Applied { payment_method })
    }

    /// The default payment method, else the newest card
    async fn billing_payment_method(
        &self,
        log: &mut StepLog,
        customer: &Customer,
    ) -> Result<PaymentMethod> {
        if let Some(ref default) = customer.default_payment_method {
            return log
                .run(Step::FetchPaymentMethod, self.processor().retrieve_payment_method(default))
                .await;
        }

        log.run(
            Step::ListCardPaymentMethods,
            self.processor().list_card_payment_methods(&customer.id),
        )
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| no_payment_method(&customer.id))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lesson_payments::{MemoryProcessor, Operation};

    use super::*;
    use crate::error::ErrorKind;

    fn service() -> (Arc<MemoryProcessor>, AccountService) {
        let processor = Arc::new(MemoryProcessor::new());
        (processor.clone(), AccountService::new(processor))
    }

    fn changes(name: Option<&str>, email: Option<&str>) -> AccountChanges {
        AccountChanges {
            name: name.map(Into::into),
            email: email.map(Into::into),
        }
    }

    #[tokio::test]
    async fn test_update_writes_customer_then_billing_details() {
        let (processor, service) = service();
        let customer = processor.seed_customer("Ada", "ada@example.com");
        let card = processor.seed_card(Some(&customer), "visa", "4242");
        processor.seed_default(&customer, &card);

        let outcome = service
            .update_account(&customer, &changes(Some("Ada Lovelace"), Some("ada@lovelace.dev")))
            .await
            .unwrap();

        let AccountUpdate::Applied { payment_method } = outcome else {
            panic!("expected the update to apply");
        };
        assert_eq!(payment_method.billing_details.name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(payment_method.billing_details.email.as_deref(), Some("ada@lovelace.dev"));
        assert_eq!(
            processor.operations(),
            vec![
                Operation::RetrieveCustomer,
                Operation::ListCustomers,
                Operation::RetrievePaymentMethod,
                Operation::UpdateCustomer,
                Operation::UpdateBillingDetails,
            ]
        );
        let stored = processor.customer(&customer).unwrap();
        assert_eq!(stored.email.as_deref(), Some("ada@lovelace.dev"));
    }

    #[tokio::test]
    async fn test_conflicting_email_blocks_name_change_too() {
        let (processor, service) = service();
        let customer = processor.seed_customer("Ada", "ada@example.com");
        processor.seed_card(Some(&customer), "visa", "4242");
        processor.seed_customer("Grace", "grace@example.com");

        let outcome = service
            .update_account(&customer, &changes(Some("Ada L."), Some("grace@example.com")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            AccountUpdate::EmailConflict {
                email: "grace@example.com".into(),
                name_blocked: true,
            }
        );
        let stored = processor.customer(&customer).unwrap();
        assert_eq!(stored.name.as_deref(), Some("Ada"));
        assert_eq!(stored.email.as_deref(), Some("ada@example.com"));
        assert_eq!(processor.count(Operation::UpdateCustomer), 0);
        assert_eq!(processor.count(Operation::UpdateBillingDetails), 0);
    }

    #[tokio::test]
    async fn test_conflicting_email_alone_blocks_nothing_else() {
        let (processor, service) = service();
        let customer = processor.seed_customer("Ada", "ada@example.com");
        processor.seed_customer("Grace", "grace@example.com");

        let outcome = service
            .update_account(&customer, &changes(Some(" "), Some("grace@example.com")))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            AccountUpdate::EmailConflict {
                email: "grace@example.com".into(),
                name_blocked: false,
            }
        );
        assert_eq!(
            processor.operations(),
            vec![Operation::RetrieveCustomer, Operation::ListCustomers]
        );
    }

    #[tokio::test]
    async fn test_no_fields_makes_no_update_calls() {
        let (processor, service) = service();
        let customer = processor.seed_customer("Ada", "ada@example.com");

        let blank = service
            .update_account(&customer, &changes(Some("  "), None))
            .await
            .unwrap();
        let same_email = service
            .update_account(&customer, &changes(None, Some("ada@example.com")))
            .await
            .unwrap();

        assert_eq!(blank, AccountUpdate::NothingToUpdate);
        assert_eq!(same_email, AccountUpdate::NothingToUpdate);
        assert_eq!(processor.count(Operation::UpdateCustomer), 0);
        assert_eq!(processor.count(Operation::UpdateBillingDetails), 0);
        assert_eq!(processor.count(Operation::ListCustomers), 0);
    }

    #[tokio::test]
    async fn test_name_only_uses_first_card_and_keeps_email() {
        let (processor, service) = service();
        let customer = processor.seed_customer("Ada", "ada@example.com");
        let card = processor.seed_card(Some(&customer), "visa", "4242");

        let outcome = service
            .update_account(&customer, &changes(Some("Ada Lovelace"), None))
            .await
            .unwrap();

        let AccountUpdate::Applied { payment_method } = outcome else {
            panic!("expected the update to apply");
        };
        assert_eq!(payment_method.id, card);
        assert_eq!(payment_method.billing_details.email.as_deref(), Some("ada@example.com"));
        assert_eq!(processor.count(Operation::ListCustomers), 0);
        assert_eq!(processor.count(Operation::ListPaymentMethods), 1);
    }

    #[tokio::test]
    async fn test_update_without_card_is_not_found() {
        let (processor, service) = service();
        let customer = processor.seed_customer("Ada", "ada@example.com");

        let err = service
            .update_account(&customer, &changes(Some("Ada Lovelace"), None))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "no_payment_method");
        assert_eq!(processor.count(Operation::UpdateCustomer), 0);
    }

    #[tokio::test]
    async fn test_unknown_customer_is_not_found() {
        let (_processor, service) = service();

        let err = service
            .update_account(&CustomerId::new("cus_missing"), &changes(Some("Ada"), None))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.failed_step(), Some(Step::FetchCustomer));
    }
}
