//! Account Service

use std::sync::Arc;

use lesson_payments::PaymentProcessor;

use crate::error::{AccountError, Result};

/// Reconciles learner accounts against the payment processor
///
/// Holds no state of its own; every read is a live processor call.
#[derive(Clone)]
pub struct AccountService {
    processor: Arc<dyn PaymentProcessor>,
}

impl AccountService {
    pub fn new(processor: Arc<dyn PaymentProcessor>) -> Self {
        Self { processor }
    }

    pub fn processor(&self) -> &dyn PaymentProcessor {
        self.processor.as_ref()
    }
}

/// Trimmed value, or `None` when absent or blank
pub(crate) fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Trimmed value, failing fast when absent or blank
pub fn required<'a>(field: &'static str, value: Option<&'a str>) -> Result<&'a str> {
    non_blank(value).ok_or(AccountError::MissingField(field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_blank() {
        assert!(required("email", None).is_err());
        assert!(required("email", Some("   ")).is_err());
        assert_eq!(required("email", Some(" a@b.co ")).unwrap(), "a@b.co");
    }

    #[test]
    fn test_non_blank() {
        assert_eq!(non_blank(Some("")), None);
        assert_eq!(non_blank(Some(" Ada ")), Some("Ada"));
    }
}
