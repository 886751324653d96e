//! # lesson-payments
//!
//! Payment processor boundary for the lesson checkout.
//!
//! ## Layout
//!
//! ```text
//! ┌──────────────────────┐      ┌──────────────────────────┐
//! │  lesson-accounts     │─────▶│  PaymentProcessor        │
//! │  (workflows)         │      │  (Strategy)              │
//! └──────────────────────┘      └────────────┬─────────────┘
//!                                  ┌─────────┴──────────┐
//!                          ┌───────▼────────┐  ┌────────▼────────┐
//!                          │ StripeProcessor│  │ MemoryProcessor │
//!                          │ (async-stripe) │  │ (tests, local)  │
//!                          └────────────────┘  └─────────────────┘
//! ```
//!
//! Callers only see the typed records in [`model`]; Stripe's wire objects stay
//! inside the adapter.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lesson_payments::{PaymentProcessor, StripeProcessor};
//!
//! let stripe = StripeProcessor::new("sk_test_xxx", None);
//! let existing = stripe.list_customers_by_email("ada@example.com", 1).await?;
//! ```

pub mod model;

mod error;
mod memory;
mod processor;
mod stripe_client;
mod webhook;

pub use error::{INTERNAL_ERROR_CODE, PaymentError, Result};
pub use memory::{MemoryProcessor, Operation, ProcessorCall};
pub use model::{
    BillingDetails, Card, Customer, CustomerId, PaymentIntent, PaymentIntentId,
    PaymentIntentStatus, PaymentMethod, PaymentMethodId, Refund, SetupIntent,
};
pub use processor::{CustomerUpdate, LessonCharge, NewCustomer, PaymentProcessor};
pub use stripe_client::StripeProcessor;
pub use webhook::{WebhookEvent, WebhookHandler};
