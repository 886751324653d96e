//! Processor Records
//!
//! Typed views of the processor objects the checkout flow touches. The
//! Stripe adapter maps the wire format into these; nothing outside this
//! crate sees `stripe::*` types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

macro_rules! object_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }
    };
}

object_id! {
    /// Processor-assigned customer id (`cus_...`)
    CustomerId
}

object_id! {
    /// Processor-assigned payment method id (`pm_...`)
    PaymentMethodId
}

object_id! {
    /// Processor-assigned payment intent id (`pi_...`)
    PaymentIntentId
}

/// A learner as the processor knows them
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub id: CustomerId,
    pub email: Option<String>,
    pub name: Option<String>,
    /// `invoice_settings.default_payment_method`
    pub default_payment_method: Option<PaymentMethodId>,
}

/// Name and email printed on a payment method
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BillingDetails {
    pub name: Option<String>,
    pub email: Option<String>,
}

/// Card display fields
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub brand: String,
    pub exp_month: i64,
    pub exp_year: i64,
    pub last4: String,
}

/// A stored payment method, in the shape handed back to clients
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMethod {
    pub id: PaymentMethodId,
    /// Processor method type, e.g. `card`
    #[serde(rename = "type")]
    pub kind: String,
    pub billing_details: BillingDetails,
    pub card: Option<Card>,
    /// Owning customer; `None` once detached
    #[serde(skip)]
    pub customer: Option<CustomerId>,
}

impl PaymentMethod {
    pub fn is_card(&self) -> bool {
        self.kind == "card"
    }
}

/// Lifecycle of a payment intent
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentIntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    RequiresAction,
    Processing,
    /// Authorized, waiting for capture or cancel
    RequiresCapture,
    Canceled,
    Succeeded,
}

impl PaymentIntentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RequiresPaymentMethod => "requires_payment_method",
            Self::RequiresConfirmation => "requires_confirmation",
            Self::RequiresAction => "requires_action",
            Self::Processing => "processing",
            Self::RequiresCapture => "requires_capture",
            Self::Canceled => "canceled",
            Self::Succeeded => "succeeded",
        }
    }
}

impl std::fmt::Display for PaymentIntentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An authorized (and maybe captured) lesson charge
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: PaymentIntentId,
    /// Minor currency units
    pub amount: i64,
    pub amount_received: i64,
    pub currency: String,
    pub status: PaymentIntentStatus,
    pub customer: Option<CustomerId>,
    pub payment_method: Option<PaymentMethodId>,
    pub description: Option<String>,
    pub created: DateTime<Utc>,
}

/// Card collection handle returned to the browser
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetupIntent {
    pub id: String,
    pub client_secret: String,
    pub customer: CustomerId,
}

/// A refund against a captured payment intent
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Refund {
    pub id: String,
    pub amount: i64,
    pub status: Option<String>,
    pub payment_intent: PaymentIntentId,
}
