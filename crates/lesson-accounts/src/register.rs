//! Learner Registration
//!
//! Lookup-or-create keyed on email. The processor does not enforce unique
//! emails, so the lookup always runs before any create.

use std::collections::HashMap;

use lesson_payments::{CustomerId, CustomerUpdate, NewCustomer};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::service::{AccountService, non_blank, required};
use crate::workflow::{Step, StepLog, Workflow};

/// Metadata key holding the first booked lesson
pub const FIRST_LESSON_METADATA_KEY: &str = "first_lesson";

/// Registration form as submitted
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Registration {
    pub name: Option<String>,
    pub email: Option<String>,
    /// First lesson time as entered, stored verbatim in customer metadata
    pub lesson_date_time: Option<String>,
}

/// Result of a registration attempt
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// New customer; the client confirms the card with `client_secret`
    Created {
        customer_id: CustomerId,
        client_secret: String,
    },

    /// Email already registered; the existing customer's name was updated
    Duplicate { customer_id: CustomerId },
}

impl AccountService {
    /// Find the customer for an email or create one with a SetupIntent
    ///
    /// On a duplicate email the existing customer's name is overwritten with
    /// the submitted one before the duplicate is reported.
    pub async fn register(&self, form: &Registration) -> Result<RegistrationOutcome> {
        let name = required("name", form.name.as_deref())?;
        let email = required("email", form.email.as_deref())?;
        let mut log = StepLog::new(Workflow::Register);

        let existing = log
            .run(Step::LookupCustomer, self.processor().list_customers_by_email(email, 1))
            .await?;

        if let Some(customer) = existing.into_iter().next() {
            log.run(
                Step::UpdateCustomerName,
                self.processor().update_customer(&customer.id, CustomerUpdate::name(name)),
            )
            .await?;

            tracing::info!(customer_id = %customer.id, "Registration for existing email");
            return Ok(RegistrationOutcome::Duplicate {
                customer_id: customer.id,
            });
        }

        let mut metadata = HashMap::new();
        if let Some(first_lesson) = non_blank(form.lesson_date_time.as_deref()) {
            metadata.insert(FIRST_LESSON_METADATA_KEY.to_string(), first_lesson.to_string());
        }

        let customer = log
            .run(
                Step::CreateCustomer,
                self.processor().create_customer(NewCustomer {
                    name: name.to_string(),
                    email: email.to_string(),
                    metadata,
                }),
            )
            .await?;

        let setup_intent = log
            .run(Step::CreateSetupIntent, self.processor().create_setup_intent(&customer.id))
            .await?;

        tracing::info!(customer_id = %customer.id, "Registered new learner");
        Ok(RegistrationOutcome::Created {
            customer_id: customer.id,
            client_secret: setup_intent.client_secret,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use lesson_payments::{MemoryProcessor, Operation, PaymentError, ProcessorCall};

    use super::*;
    use crate::error::AccountError;

    fn form(name: &str, email: &str) -> Registration {
        Registration {
            name: Some(name.into()),
            email: Some(email.into()),
            lesson_date_time: Some("2026-11-02T15:00".into()),
        }
    }

    fn service() -> (Arc<MemoryProcessor>, AccountService) {
        let processor = Arc::new(MemoryProcessor::new());
        (processor.clone(), AccountService::new(processor))
    }

    #[tokio::test]
    async fn test_new_email_creates_customer_and_setup_intent() {
        let (processor, service) = service();

        let outcome = service.register(&form("Ada", "ada@example.com")).await.unwrap();

        let RegistrationOutcome::Created { customer_id, client_secret } = outcome else {
            panic!("expected a new customer");
        };
        assert!(!client_secret.is_empty());
        assert_eq!(processor.count(Operation::CreateCustomer), 1);
        assert_eq!(processor.count(Operation::CreateSetupIntent), 1);
        assert_eq!(
            processor.operations(),
            vec![Operation::ListCustomers, Operation::CreateCustomer, Operation::CreateSetupIntent]
        );
        assert_eq!(
            processor.customer(&customer_id).unwrap().email.as_deref(),
            Some("ada@example.com")
        );
    }

    #[tokio::test]
    async fn test_new_customer_is_tagged_with_first_lesson() {
        let (processor, service) = service();

        service.register(&form("Ada", "ada@example.com")).await.unwrap();

        let metadata = processor
            .calls()
            .into_iter()
            .find_map(|call| match call {
                ProcessorCall::CreateCustomer { metadata, .. } => Some(metadata),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            metadata.get(FIRST_LESSON_METADATA_KEY).map(String::as_str),
            Some("2026-11-02T15:00")
        );
    }

    #[tokio::test]
    async fn test_repeat_email_updates_name_once_and_reports_duplicate() {
        let (processor, service) = service();
        let first = service.register(&form("Ada", "ada@example.com")).await.unwrap();
        let RegistrationOutcome::Created { customer_id, .. } = first else {
            panic!("expected a new customer");
        };
        processor.clear_calls();

        let second = service.register(&form("Ada Lovelace", "ada@example.com")).await.unwrap();

        assert_eq!(second, RegistrationOutcome::Duplicate { customer_id: customer_id.clone() });
        assert_eq!(processor.customers().len(), 1);
        assert_eq!(
            processor.calls(),
            vec![
                ProcessorCall::ListCustomers { email: "ada@example.com".into() },
                ProcessorCall::UpdateCustomer {
                    customer: customer_id.clone(),
                    update: CustomerUpdate::name("Ada Lovelace"),
                },
            ]
        );
        assert_eq!(
            processor.customer(&customer_id).unwrap().name.as_deref(),
            Some("Ada Lovelace")
        );

        // A third attempt still never creates.
        service.register(&form("A. Lovelace", "ada@example.com")).await.unwrap();
        assert_eq!(processor.count(Operation::CreateCustomer), 0);
        assert_eq!(processor.count(Operation::CreateSetupIntent), 0);
    }

    #[tokio::test]
    async fn test_missing_email_fails_before_processor() {
        let (processor, service) = service();
        let err = service
            .register(&Registration {
                name: Some("Ada".into()),
                email: Some("  ".into()),
                lesson_date_time: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, AccountError::MissingField("email")));
        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_setup_intent_failure_reports_created_customer() {
        let (processor, service) = service();
        processor.fail_next(Operation::CreateSetupIntent, PaymentError::Transport("timeout".into()));

        let err = service.register(&form("Ada", "ada@example.com")).await.unwrap_err();

        assert_eq!(err.failed_step(), Some(Step::CreateSetupIntent));
        assert_eq!(err.completed_steps(), &[Step::LookupCustomer, Step::CreateCustomer]);
        assert_eq!(processor.customers().len(), 1);
    }

    #[test]
    fn test_form_reads_camel_case_fields() {
        let form: Registration = serde_json::from_str(
            r#"{"name":"Ada","email":"ada@example.com","lessonDateTime":"2026-11-02T15:00"}"#,
        )
        .unwrap();
        assert_eq!(form.lesson_date_time.as_deref(), Some("2026-11-02T15:00"));

        let partial: Registration = serde_json::from_str(r#"{"name":"Ada"}"#).unwrap();
        assert_eq!(partial.email, None);
    }
}
