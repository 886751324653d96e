//! Payment Error Types

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, PaymentError>;

/// Generic code used when the processor gave none
pub const INTERNAL_ERROR_CODE: &str = "internal_server_error";

/// Errors raised at the payment processor boundary
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PaymentError {
    /// The processor rejected the call
    #[error("Stripe error ({}): {message}", .code.as_deref().unwrap_or(INTERNAL_ERROR_CODE))]
    Processor {
        /// Processor error code, e.g. `resource_missing` or `card_declined`
        code: Option<String>,
        message: String,
        /// HTTP status the processor answered with, if any
        http_status: Option<u16>,
    },

    /// The processor could not be reached or answered garbage
    #[error("Stripe transport error: {0}")]
    Transport(String),

    /// An identifier did not have the processor's shape
    #[error("Invalid {kind} id: {id}")]
    InvalidId { kind: &'static str, id: String },

    /// Webhook signature verification failed
    #[error("Webhook signature invalid: {0}")]
    WebhookSignature(String),

    /// Webhook payload parsing failed
    #[error("Webhook parse error: {0}")]
    WebhookParse(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl PaymentError {
    /// Build a processor rejection with a code
    pub fn processor(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Processor {
            code: Some(code.into()),
            message: message.into(),
            http_status: None,
        }
    }

    /// Processor `resource_missing` rejection
    pub fn resource_missing(message: impl Into<String>) -> Self {
        Self::Processor {
            code: Some("resource_missing".into()),
            message: message.into(),
            http_status: Some(404),
        }
    }

    /// Error code to expose to callers
    ///
    /// Processor codes pass through; everything else maps to
    /// [`INTERNAL_ERROR_CODE`].
    pub fn code(&self) -> &str {
        match self {
            Self::Processor { code: Some(code), .. } => code,
            Self::InvalidId { .. } => "resource_missing",
            _ => INTERNAL_ERROR_CODE,
        }
    }

    /// Message to expose to callers
    pub fn message(&self) -> String {
        match self {
            Self::Processor { message, .. } => message.clone(),
            Self::InvalidId { kind, id } => format!("No such {kind}: '{id}'"),
            other => other.to_string(),
        }
    }

    /// Whether the processor reported the object as missing
    pub fn is_not_found(&self) -> bool {
        self.code() == "resource_missing"
    }

    /// Get user-friendly message
    pub fn user_message(&self) -> &str {
        match self {
            Self::Processor { .. } => "The payment processor rejected the request.",
            Self::Transport(_) => "Payment processing failed. Please try again.",
            Self::InvalidId { .. } => "The referenced payment object does not exist.",
            Self::WebhookSignature(_) | Self::WebhookParse(_) => "Invalid webhook payload.",
            Self::Config(_) => "Service configuration error.",
        }
    }
}

impl From<stripe::StripeError> for PaymentError {
    fn from(err: stripe::StripeError) -> Self {
        match err {
            stripe::StripeError::Stripe(request) => Self::Processor {
                code: request.code.as_ref().map(ToString::to_string),
                message: request
                    .message
                    .unwrap_or_else(|| "An unknown error occurred".into()),
                http_status: Some(request.http_status),
            },
            other => Self::Transport(other.to_string()),
        }
    }
}
