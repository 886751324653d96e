//! # lesson-accounts
//!
//! Customer and payment-method reconciliation for the lesson checkout.
//!
//! The processor owns all durable state and offers no multi-call
//! transactions. Every workflow here is a fixed sequence of processor calls
//! (see [`Workflow::plan`]); guards run before the writes they protect, and a
//! failure part way through reports exactly which steps took effect.
//!
//! | Workflow | Guard |
//! |----------|-------|
//! | [`AccountService::register`] | email lookup before create |
//! | [`AccountService::replace_payment_method`] | detach before attach |
//! | [`AccountService::update_account`] | email owned by another customer |
//! | [`AccountService::delete_account`] | payments awaiting capture |
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use lesson_accounts::{AccountService, Deletion};
//! use lesson_payments::MemoryProcessor;
//!
//! let service = AccountService::new(Arc::new(MemoryProcessor::new()));
//! match service.delete_account(&customer_id).await? {
//!     Deletion::Deleted => {}
//!     Deletion::Blocked { uncaptured_payments } => { /* capture or cancel */ }
//! }
//! ```

mod deletion;
mod error;
mod lessons;
mod payment_method;
mod profile;
mod register;
mod service;
mod workflow;

pub use deletion::{Deletion, PAYMENT_INTENT_PAGE_SIZE};
pub use error::{AccountError, ErrorKind, Result};
pub use lessons::{LESSON_CURRENCY, LessonRefund};
pub use payment_method::{NO_PAYMENT_METHOD, PaymentMethodSummary};
pub use profile::{AccountChanges, AccountUpdate};
pub use register::{FIRST_LESSON_METADATA_KEY, Registration, RegistrationOutcome};
pub use service::{AccountService, required};
pub use workflow::{Step, Workflow};
