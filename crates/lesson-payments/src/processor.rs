//! Payment Processor Strategy
//!
//! Every call the checkout flow makes against the processor goes through
//! [`PaymentProcessor`]. [`StripeProcessor`](crate::StripeProcessor) talks to
//! Stripe; [`MemoryProcessor`](crate::MemoryProcessor) keeps objects in
//! memory for tests and local runs.
//!
//! Calls are independent. The processor offers no multi-call transactions,
//! so callers that chain them own the ordering.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::model::{
    BillingDetails, Customer, CustomerId, PaymentIntent, PaymentIntentId, PaymentMethod,
    PaymentMethodId, Refund, SetupIntent,
};

/// Fields for a new customer
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub metadata: HashMap<String, String>,
}

/// Partial customer update; `None` fields are left untouched
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomerUpdate {
    pub name: Option<String>,
    pub email: Option<String>,
    pub default_payment_method: Option<PaymentMethodId>,
}

impl CustomerUpdate {
    pub fn name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn default_payment_method(id: PaymentMethodId) -> Self {
        Self {
            default_payment_method: Some(id),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.email.is_none() && self.default_payment_method.is_none()
    }
}

/// An off-session, manually captured lesson charge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LessonCharge {
    pub customer: CustomerId,
    pub payment_method: PaymentMethodId,
    /// Minor currency units
    pub amount: i64,
    pub currency: String,
    pub description: Option<String>,
}

/// Payment processor client (Strategy pattern)
#[async_trait]
pub trait PaymentProcessor: Send + Sync {
    /// Customers whose email matches exactly, newest first
    async fn list_customers_by_email(&self, email: &str, limit: u64) -> Result<Vec<Customer>>;

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer>;

    /// Fetch a customer with its default payment method resolved
    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Customer>;

    async fn update_customer(&self, id: &CustomerId, update: CustomerUpdate) -> Result<Customer>;

    /// Returns whether the processor confirmed the deletion
    async fn delete_customer(&self, id: &CustomerId) -> Result<bool>;

    /// SetupIntent for collecting a card for later off-session charges
    async fn create_setup_intent(&self, customer: &CustomerId) -> Result<SetupIntent>;

    async fn retrieve_payment_method(&self, id: &PaymentMethodId) -> Result<PaymentMethod>;

    /// Card payment methods attached to a customer
    async fn list_card_payment_methods(&self, customer: &CustomerId) -> Result<Vec<PaymentMethod>>;

    async fn attach_payment_method(
        &self,
        id: &PaymentMethodId,
        customer: &CustomerId,
    ) -> Result<PaymentMethod>;

    async fn detach_payment_method(&self, id: &PaymentMethodId) -> Result<PaymentMethod>;

    async fn update_billing_details(
        &self,
        id: &PaymentMethodId,
        details: BillingDetails,
    ) -> Result<PaymentMethod>;

    async fn list_payment_intents(
        &self,
        customer: &CustomerId,
        limit: u64,
    ) -> Result<Vec<PaymentIntent>>;

    /// Create and confirm an off-session, manual-capture intent
    async fn create_payment_intent(&self, charge: LessonCharge) -> Result<PaymentIntent>;

    async fn retrieve_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent>;

    /// Capture an authorization, optionally for less than authorized
    async fn capture_payment_intent(
        &self,
        id: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<PaymentIntent>;

    /// Release an uncaptured authorization
    async fn cancel_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent>;

    /// Refund a captured intent, in full when `amount` is `None`
    async fn create_refund(&self, payment_intent: &PaymentIntentId, amount: Option<i64>)
        -> Result<Refund>;

    /// Processor name for logs and health output
    fn name(&self) -> &str;
}
