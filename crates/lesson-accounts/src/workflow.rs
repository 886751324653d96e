//! Workflow Step Plans
//!
//! Each account workflow is a fixed, ordered list of processor calls. The
//! processor has no multi-call transaction, so order is the only consistency
//! tool available: a failed workflow reports the step that failed and every
//! step that already took effect, and the caller re-queries from there.

use std::future::Future;

use lesson_payments::PaymentError;
use serde::Serialize;

use crate::error::{AccountError, Result};

/// A workflow exposed by [`AccountService`](crate::AccountService)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Workflow {
    Register,
    ReplacePaymentMethod,
    UpdateAccount,
    DeleteAccount,
    ViewPaymentMethod,
    ScheduleLesson,
    CompleteLessonPayment,
    RefundLesson,
}

/// One processor call inside a workflow
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    LookupCustomer,
    CreateCustomer,
    UpdateCustomerName,
    CreateSetupIntent,
    FetchCustomer,
    DetachPaymentMethod,
    AttachPaymentMethod,
    SetDefaultPaymentMethod,
    FetchPaymentMethod,
    SearchEmail,
    ListCardPaymentMethods,
    UpdateCustomer,
    UpdateBillingDetails,
    ListPaymentIntents,
    DeleteCustomer,
    CreatePaymentIntent,
    FetchPaymentIntent,
    CapturePaymentIntent,
    CancelPaymentIntent,
    CreateRefund,
}

impl Workflow {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Register => "register",
            Self::ReplacePaymentMethod => "replace_payment_method",
            Self::UpdateAccount => "update_account",
            Self::DeleteAccount => "delete_account",
            Self::ViewPaymentMethod => "view_payment_method",
            Self::ScheduleLesson => "schedule_lesson",
            Self::CompleteLessonPayment => "complete_lesson_payment",
            Self::RefundLesson => "refund_lesson",
        }
    }

    /// Every step the workflow may run, in execution order
    ///
    /// Branches skip steps but never reorder them.
    pub fn plan(&self) -> &'static [Step] {
        use Step::*;
        match self {
            Self::Register => &[LookupCustomer, CreateCustomer, UpdateCustomerName, CreateSetupIntent],
            Self::ReplacePaymentMethod => &[
                FetchCustomer,
                DetachPaymentMethod,
                AttachPaymentMethod,
                SetDefaultPaymentMethod,
                FetchPaymentMethod,
            ],
            Self::UpdateAccount => &[
                FetchCustomer,
                SearchEmail,
                FetchPaymentMethod,
                ListCardPaymentMethods,
                UpdateCustomer,
                UpdateBillingDetails,
            ],
            Self::DeleteAccount => &[ListPaymentIntents, DeleteCustomer],
            Self::ViewPaymentMethod => &[FetchCustomer, ListCardPaymentMethods, FetchPaymentMethod],
            Self::ScheduleLesson => &[ListCardPaymentMethods, CreatePaymentIntent],
            Self::CompleteLessonPayment => &[CapturePaymentIntent],
            Self::RefundLesson => &[FetchPaymentIntent, CreateRefund, CancelPaymentIntent],
        }
    }
}

impl std::fmt::Display for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LookupCustomer => "lookup_customer",
            Self::CreateCustomer => "create_customer",
            Self::UpdateCustomerName => "update_customer_name",
            Self::CreateSetupIntent => "create_setup_intent",
            Self::FetchCustomer => "fetch_customer",
            Self::DetachPaymentMethod => "detach_payment_method",
            Self::AttachPaymentMethod => "attach_payment_method",
            Self::SetDefaultPaymentMethod => "set_default_payment_method",
            Self::FetchPaymentMethod => "fetch_payment_method",
            Self::SearchEmail => "search_email",
            Self::ListCardPaymentMethods => "list_card_payment_methods",
            Self::UpdateCustomer => "update_customer",
            Self::UpdateBillingDetails => "update_billing_details",
            Self::ListPaymentIntents => "list_payment_intents",
            Self::DeleteCustomer => "delete_customer",
            Self::CreatePaymentIntent => "create_payment_intent",
            Self::FetchPaymentIntent => "fetch_payment_intent",
            Self::CapturePaymentIntent => "capture_payment_intent",
            Self::CancelPaymentIntent => "cancel_payment_intent",
            Self::CreateRefund => "create_refund",
        }
    }
}

impl std::fmt::Display for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs a workflow's processor calls and remembers what completed
pub(crate) struct StepLog {
    workflow: Workflow,
    completed: Vec<Step>,
    /// Index into the plan of the last step run
    cursor: Option<usize>,
}

impl StepLog {
    pub(crate) fn new(workflow: Workflow) -> Self {
        Self {
            workflow,
            completed: Vec::new(),
            cursor: None,
        }
    }

    /// Run one step; on failure, wrap the error with the completed steps
    pub(crate) async fn run<T, F>(&mut self, step: Step, call: F) -> Result<T>
    where
        F: Future<Output = lesson_payments::Result<T>>,
    {
        self.advance(step);

        match call.await {
            Ok(value) => {
                tracing::debug!(workflow = %self.workflow, step = %step, "Step completed");
                self.completed.push(step);
                Ok(value)
            }
            Err(source) => {
                tracing::warn!(
                    workflow = %self.workflow,
                    step = %step,
                    completed = ?self.completed,
                    error = %source,
                    "Step failed"
                );
                Err(self.fail(step, source))
            }
        }
    }

    fn advance(&mut self, step: Step) {
        let plan = self.workflow.plan();
        let from = self.cursor.map_or(0, |i| i + 1);
        let position = plan[from..].iter().position(|s| *s == step).map(|i| i + from);
        debug_assert!(
            position.is_some(),
            "{step} is out of order for {}",
            self.workflow
        );
        if position.is_some() {
            self.cursor = position;
        }
    }

    fn fail(&self, step: Step, source: PaymentError) -> AccountError {
        AccountError::Processor {
            workflow: self.workflow,
            step,
            completed: self.completed.clone(),
            source,
        }
    }

    #[cfg(test)]
    pub(crate) fn completed(&self) -> &[Step] {
        &self.completed
    }
}
