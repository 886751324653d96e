//! Account Workflow Errors

use lesson_payments::{CustomerId, PaymentError};
use thiserror::Error;

use crate::workflow::{Step, Workflow};

/// Result type alias
pub type Result<T> = std::result::Result<T, AccountError>;

/// Broad error class, used by the HTTP layer to pick a status code
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    Conflict,
    Upstream,
    Internal,
}

/// Account workflow errors
#[derive(Error, Debug)]
pub enum AccountError {
    /// A required request field was absent or blank
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    /// A request field was present but unusable
    #[error("Invalid {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },

    /// Nothing to act on, e.g. no payment method on file
    #[error("{message}")]
    NotFound { code: &'static str, message: String },

    /// The request contradicts current processor state
    #[error("{message}")]
    Conflict { code: &'static str, message: String },

    /// A processor call failed partway through a workflow
    #[error("{workflow} failed at {step}: {source}")]
    Processor {
        workflow: Workflow,
        step: Step,
        /// Steps that took effect before the failure
        completed: Vec<Step>,
        source: PaymentError,
    },

    /// The processor answered a delete without deleting
    #[error("Customer {0} was not deleted")]
    DeletionNotConfirmed(CustomerId),
}

impl AccountError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingField(_) | Self::InvalidField { .. } => ErrorKind::Validation,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::Processor { source, .. } if source.is_not_found() => ErrorKind::NotFound,
            Self::Processor { .. } => ErrorKind::Upstream,
            Self::DeletionNotConfirmed(_) => ErrorKind::Internal,
        }
    }

    /// Machine-readable code; processor codes pass through
    pub fn code(&self) -> &str {
        match self {
            Self::MissingField(_) => "missing_required_field",
            Self::InvalidField { .. } => "invalid_request",
            Self::NotFound { code, .. } | Self::Conflict { code, .. } => code,
            Self::Processor { source, .. } => source.code(),
            Self::DeletionNotConfirmed(_) => "deletion_not_confirmed",
        }
    }

    /// Human-readable message
    pub fn message(&self) -> String {
        match self {
            Self::Processor { source, .. } => source.message(),
            other => other.to_string(),
        }
    }

    /// Message safe to show a client; transport and config details stay in logs
    pub fn user_message(&self) -> String {
        match self {
            Self::Processor {
                source: source @ (PaymentError::Transport(_) | PaymentError::Config(_)),
                ..
            } => source.user_message().to_string(),
            other => other.message(),
        }
    }

    /// Step at which a processor call failed, if any
    pub fn failed_step(&self) -> Option<Step> {
        match self {
            Self::Processor { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Steps that took effect before the failure
    pub fn completed_steps(&self) -> &[Step] {
        match self {
            Self::Processor { completed, .. } => completed,
            _ => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_kind() {
        let err = AccountError::MissingField("paymentMethodId");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(err.code(), "missing_required_field");
        assert_eq!(err.message(), "Missing required field: paymentMethodId");
    }

    #[test]
    fn test_processor_not_found_is_not_found() {
        let err = AccountError::Processor {
            workflow: Workflow::UpdateAccount,
            step: Step::FetchCustomer,
            completed: vec![],
            source: PaymentError::resource_missing("No such customer: 'cus_x'"),
        };
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.code(), "resource_missing");
        assert_eq!(err.message(), "No such customer: 'cus_x'");
        assert_eq!(err.failed_step(), Some(Step::FetchCustomer));
    }

    #[test]
    fn test_processor_transport_is_upstream() {
        let err = AccountError::Processor {
            workflow: Workflow::DeleteAccount,
            step: Step::DeleteCustomer,
            completed: vec![Step::ListPaymentIntents],
            source: PaymentError::Transport("reset".into()),
        };
        assert_eq!(err.kind(), ErrorKind::Upstream);
        assert_eq!(err.code(), "internal_server_error");
        assert_eq!(err.completed_steps(), &[Step::ListPaymentIntents]);
        assert_eq!(err.user_message(), "Payment processing failed. Please try again.");
    }
}
