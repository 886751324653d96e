//! Lesson Charges
//!
//! A booked lesson is authorized off-session against the learner's saved
//! card and captured once the lesson has been taught. Refunding a lesson
//! that was never captured cancels the authorization instead.

use lesson_payments::{
    CustomerId, LessonCharge, PaymentError, PaymentIntent, PaymentIntentId, PaymentIntentStatus,
};

use crate::error::{AccountError, Result};
use crate::payment_method::no_payment_method;
use crate::service::{AccountService, non_blank};
use crate::workflow::{Step, StepLog, Workflow};

/// All lessons are priced in US dollars
pub const LESSON_CURRENCY: &str = "usd";

/// Result of refunding a lesson
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LessonRefund {
    /// Captured funds were returned
    Refunded { refund_id: String },

    /// The authorization was released before capture
    Canceled { payment_intent_id: PaymentIntentId },
}

/// Amounts are whole cents and must be positive
fn check_amount(amount: i64) -> Result<()> {
    if amount <= 0 {
        return Err(AccountError::InvalidField {
            field: "amount",
            reason: "must be a positive number of cents".into(),
        });
    }
    Ok(())
}

impl AccountService {
    /// Authorize a lesson against the customer's newest card
    pub async fn schedule_lesson(
        &self,
        customer_id: &CustomerId,
        amount: i64,
        description: Option<&str>,
    ) -> Result<PaymentIntent> {
        check_amount(amount)?;
        let mut log = StepLog::new(Workflow::ScheduleLesson);

        let card = log
            .run(
                Step::ListCardPaymentMethods,
                self.processor().list_card_payment_methods(customer_id),
            )
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| no_payment_method(customer_id))?;

        let charge = LessonCharge {
            customer: customer_id.clone(),
            payment_method: card.id,
            amount,
            currency: LESSON_CURRENCY.to_string(),
            description: non_blank(description).map(str::to_string),
        };
        let intent = log
            .run(Step::CreatePaymentIntent, self.processor().create_payment_intent(charge))
            .await?;

        tracing::info!(
            %customer_id,
            payment_intent_id = %intent.id,
            amount,
            "Scheduled lesson"
        );
        Ok(intent)
    }

    /// Capture an authorized lesson, optionally for less than authorized
    pub async fn complete_lesson_payment(
        &self,
        payment_intent_id: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<PaymentIntent> {
        amount.map(check_amount).transpose()?;
        let mut log = StepLog::new(Workflow::CompleteLessonPayment);

        let intent = log
            .run(
                Step::CapturePaymentIntent,
                self.processor().capture_payment_intent(payment_intent_id, amount),
            )
            .await
            .map_err(|err| with_default_code(err, "resource_missing"))?;

        tracing::info!(%payment_intent_id, amount = intent.amount_received, "Captured lesson payment");
        Ok(intent)
    }

    /// Refund a captured lesson or release an uncaptured one
    pub async fn refund_lesson(
        &self,
        payment_intent_id: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<LessonRefund> {
        amount.map(check_amount).transpose()?;
        let mut log = StepLog::new(Workflow::RefundLesson);

        let intent = log
            .run(
                Step::FetchPaymentIntent,
                self.processor().retrieve_payment_intent(payment_intent_id),
            )
            .await?;

        match intent.status {
            PaymentIntentStatus::Succeeded => {
                let refund = log
                    .run(
                        Step::CreateRefund,
                        self.processor().create_refund(payment_intent_id, amount),
                    )
                    .await?;
                tracing::info!(%payment_intent_id, refund_id = %refund.id, "Refunded lesson");
                Ok(LessonRefund::Refunded { refund_id: refund.id })
            }
            PaymentIntentStatus::RequiresCapture => {
                let canceled = log
                    .run(
                        Step::CancelPaymentIntent,
                        self.processor().cancel_payment_intent(payment_intent_id),
                    )
                    .await?;
                tracing::info!(%payment_intent_id, "Released lesson authorization");
                Ok(LessonRefund::Canceled {
                    payment_intent_id: canceled.id,
                })
            }
            status => Err(AccountError::Conflict {
                code: "payment_intent_unexpected_state",
                message: format!(
                    "PaymentIntent {payment_intent_id} cannot be refunded while {status}"
                ),
            }),
        }
    }
}

/// Give a code-less processor rejection the supplied code
fn with_default_code(err: AccountError, default: &str) -> AccountError {
    match err {
        AccountError::Processor {
            workflow,
            step,
            completed,
            source:
                PaymentError::Processor {
                    code: None,
                    message,
                    http_status,
                },
        } => AccountError::Processor {
            workflow,
            step,
            completed,
            source: PaymentError::Processor {
                code: Some(default.to_string()),
                message,
                http_status,
            },
        },
        other => other,
    }
}
