//! Stripe Adapter
//!
//! Implements [`PaymentProcessor`] over `async-stripe`, translating Stripe's
//! wire objects (nested `card`, `invoice_settings.default_payment_method`)
//! into the records in [`crate::model`].

use std::str::FromStr;

use async_trait::async_trait;
use chrono::DateTime;
use stripe::{
    AttachPaymentMethod, CapturePaymentIntent, CancelPaymentIntent, Client, CreateCustomer,
    CreatePaymentIntent, CreateRefund, CreateSetupIntent, Currency, CustomerInvoiceSettings,
    Expandable, ListCustomers, ListPaymentIntents, ListPaymentMethods,
    PaymentIntentCaptureMethod, PaymentIntentOffSession, PaymentMethodTypeFilter,
    RefundReasonFilter, UpdateCustomer, UpdatePaymentMethod,
};

use crate::error::{PaymentError, Result};
use crate::model::{
    BillingDetails, Card, Customer, CustomerId, PaymentIntent, PaymentIntentId,
    PaymentIntentStatus, PaymentMethod, PaymentMethodId, Refund, SetupIntent,
};
use crate::processor::{CustomerUpdate, LessonCharge, NewCustomer, PaymentProcessor};

const EXPAND_DEFAULT_PAYMENT_METHOD: &[&str] = &["invoice_settings.default_payment_method"];

/// Stripe client wrapper
pub struct StripeProcessor {
    client: Client,
    webhook_secret: Option<String>,
}

impl StripeProcessor {
    /// Create a new Stripe processor
    pub fn new(secret_key: &str, webhook_secret: Option<String>) -> Self {
        Self {
            client: Client::new(secret_key),
            webhook_secret,
        }
    }

    /// Create from environment variables
    ///
    /// `STRIPE_SECRET_KEY` is required, `STRIPE_WEBHOOK_SECRET` is optional.
    pub fn from_env() -> Result<Self> {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .map_err(|_| PaymentError::Config("STRIPE_SECRET_KEY not set".into()))?;
        let webhook_secret = std::env::var("STRIPE_WEBHOOK_SECRET")
            .ok()
            .filter(|secret| !secret.is_empty());

        Ok(Self::new(&secret_key, webhook_secret))
    }

    /// Get the webhook secret
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook_secret.as_deref()
    }
}

fn parse_id<T: FromStr>(kind: &'static str, id: &str) -> Result<T> {
    id.parse::<T>().map_err(|_| PaymentError::InvalidId {
        kind,
        id: id.to_string(),
    })
}

fn parse_currency(code: &str) -> Result<Currency> {
    match code.to_ascii_lowercase().as_str() {
        "usd" => Ok(Currency::USD),
        "eur" => Ok(Currency::EUR),
        "gbp" => Ok(Currency::GBP),
        "cad" => Ok(Currency::CAD),
        other => Err(PaymentError::processor(
            "invalid_currency",
            format!("Unsupported currency: {other}"),
        )),
    }
}

fn map_customer(customer: stripe::Customer) -> Customer {
    let default_payment_method = customer
        .invoice_settings
        .and_then(|settings| settings.default_payment_method)
        .map(|pm| match pm {
            Expandable::Id(id) => PaymentMethodId::new(id.to_string()),
            Expandable::Object(pm) => PaymentMethodId::new(pm.id.to_string()),
        });

    Customer {
        id: CustomerId::new(customer.id.to_string()),
        email: customer.email,
        name: customer.name,
        default_payment_method,
    }
}

fn map_payment_method(pm: stripe::PaymentMethod) -> PaymentMethod {
    PaymentMethod {
        id: PaymentMethodId::new(pm.id.to_string()),
        kind: pm.type_.to_string(),
        billing_details: BillingDetails {
            name: pm.billing_details.name,
            email: pm.billing_details.email,
        },
        card: pm.card.map(|card| Card {
            brand: card.brand.to_string(),
            exp_month: card.exp_month,
            exp_year: card.exp_year,
            last4: card.last4,
        }),
        customer: pm.customer.map(|c| CustomerId::new(c.id().to_string())),
    }
}

fn map_status(status: stripe::PaymentIntentStatus) -> PaymentIntentStatus {
    match status.as_str() {
        "requires_payment_method" => PaymentIntentStatus::RequiresPaymentMethod,
        "requires_confirmation" => PaymentIntentStatus::RequiresConfirmation,
        "requires_action" => PaymentIntentStatus::RequiresAction,
        "requires_capture" => PaymentIntentStatus::RequiresCapture,
        "canceled" => PaymentIntentStatus::Canceled,
        "succeeded" => PaymentIntentStatus::Succeeded,
        _ => PaymentIntentStatus::Processing,
    }
}

fn map_payment_intent(pi: stripe::PaymentIntent) -> PaymentIntent {
    PaymentIntent {
        id: PaymentIntentId::new(pi.id.to_string()),
        amount: pi.amount,
        amount_received: pi.amount_received,
        currency: pi.currency.to_string(),
        status: map_status(pi.status),
        customer: pi.customer.map(|c| CustomerId::new(c.id().to_string())),
        payment_method: pi
            .payment_method
            .map(|pm| PaymentMethodId::new(pm.id().to_string())),
        description: pi.description,
        created: DateTime::from_timestamp(pi.created, 0).unwrap_or_default(),
    }
}

#[async_trait]
impl PaymentProcessor for StripeProcessor {
    async fn list_customers_by_email(&self, email: &str, limit: u64) -> Result<Vec<Customer>> {
        let mut params = ListCustomers::new();
        params.email = Some(email);
        params.limit = Some(limit);

        let list = stripe::Customer::list(&self.client, &params).await?;
        Ok(list.data.into_iter().map(map_customer).collect())
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer> {
        let mut params = CreateCustomer::new();
        params.name = Some(&customer.name);
        params.email = Some(&customer.email);
        if !customer.metadata.is_empty() {
            params.metadata = Some(customer.metadata.clone());
        }

        let created = stripe::Customer::create(&self.client, params).await?;
        tracing::debug!(customer_id = %created.id, "Created Stripe customer");
        Ok(map_customer(created))
    }

    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Customer> {
        let customer_id: stripe::CustomerId = parse_id("customer", id.as_str())?;
        let customer =
            stripe::Customer::retrieve(&self.client, &customer_id, EXPAND_DEFAULT_PAYMENT_METHOD)
                .await?;
        Ok(map_customer(customer))
    }

    async fn update_customer(&self, id: &CustomerId, update: CustomerUpdate) -> Result<Customer> {
        let customer_id: stripe::CustomerId = parse_id("customer", id.as_str())?;

        let mut params = UpdateCustomer::new();
        params.name = update.name.as_deref();
        params.email = update.email.as_deref();
        if let Some(ref pm_id) = update.default_payment_method {
            params.invoice_settings = Some(CustomerInvoiceSettings {
                default_payment_method: Some(pm_id.to_string()),
                ..Default::default()
            });
        }

        let customer = stripe::Customer::update(&self.client, &customer_id, params).await?;
        Ok(map_customer(customer))
    }

    async fn delete_customer(&self, id: &CustomerId) -> Result<bool> {
        let customer_id: stripe::CustomerId = parse_id("customer", id.as_str())?;
        let deleted = stripe::Customer::delete(&self.client, &customer_id).await?;
        Ok(deleted.deleted)
    }

    async fn create_setup_intent(&self, customer: &CustomerId) -> Result<SetupIntent> {
        let customer_id: stripe::CustomerId = parse_id("customer", customer.as_str())?;

        // Stripe defaults `usage` to off_session.
        let mut params = CreateSetupIntent::new();
        params.customer = Some(customer_id);

        let intent = stripe::SetupIntent::create(&self.client, params).await?;
        let client_secret = intent
            .client_secret
            .ok_or_else(|| PaymentError::Transport("No client secret returned".into()))?;

        Ok(SetupIntent {
            id: intent.id.to_string(),
            client_secret,
            customer: customer.clone(),
        })
    }

    async fn retrieve_payment_method(&self, id: &PaymentMethodId) -> Result<PaymentMethod> {
        let pm_id: stripe::PaymentMethodId = parse_id("payment_method", id.as_str())?;
        let pm = stripe::PaymentMethod::retrieve(&self.client, &pm_id, &[]).await?;
        Ok(map_payment_method(pm))
    }

    async fn list_card_payment_methods(&self, customer: &CustomerId) -> Result<Vec<PaymentMethod>> {
        let customer_id: stripe::CustomerId = parse_id("customer", customer.as_str())?;

        let mut params = ListPaymentMethods::new();
        params.customer = Some(customer_id);
        params.type_ = Some(PaymentMethodTypeFilter::Card);

        let list = stripe::PaymentMethod::list(&self.client, &params).await?;
        Ok(list.data.into_iter().map(map_payment_method).collect())
    }

    async fn attach_payment_method(
        &self,
        id: &PaymentMethodId,
        customer: &CustomerId,
    ) -> Result<PaymentMethod> {
        let pm_id: stripe::PaymentMethodId = parse_id("payment_method", id.as_str())?;
        let customer_id: stripe::CustomerId = parse_id("customer", customer.as_str())?;

        let pm = stripe::PaymentMethod::attach(
            &self.client,
            &pm_id,
            AttachPaymentMethod { customer: customer_id },
        )
        .await?;
        Ok(map_payment_method(pm))
    }

    async fn detach_payment_method(&self, id: &PaymentMethodId) -> Result<PaymentMethod> {
        let pm_id: stripe::PaymentMethodId = parse_id("payment_method", id.as_str())?;
        let pm = stripe::PaymentMethod::detach(&self.client, &pm_id).await?;
        Ok(map_payment_method(pm))
    }

    async fn update_billing_details(
        &self,
        id: &PaymentMethodId,
        details: BillingDetails,
    ) -> Result<PaymentMethod> {
        let pm_id: stripe::PaymentMethodId = parse_id("payment_method", id.as_str())?;

        let mut params = UpdatePaymentMethod::new();
        params.billing_details = Some(stripe::BillingDetails {
            name: details.name,
            email: details.email,
            ..Default::default()
        });

        let pm = stripe::PaymentMethod::update(&self.client, &pm_id, params).await?;
        Ok(map_payment_method(pm))
    }

    async fn list_payment_intents(
        &self,
        customer: &CustomerId,
        limit: u64,
    ) -> Result<Vec<PaymentIntent>> {
        let customer_id: stripe::CustomerId = parse_id("customer", customer.as_str())?;

        let mut params = ListPaymentIntents::new();
        params.customer = Some(customer_id);
        params.limit = Some(limit);

        let list = stripe::PaymentIntent::list(&self.client, &params).await?;
        Ok(list.data.into_iter().map(map_payment_intent).collect())
    }

    async fn create_payment_intent(&self, charge: LessonCharge) -> Result<PaymentIntent> {
        let customer_id: stripe::CustomerId = parse_id("customer", charge.customer.as_str())?;
        let pm_id: stripe::PaymentMethodId =
            parse_id("payment_method", charge.payment_method.as_str())?;

        let mut params = CreatePaymentIntent::new(charge.amount, parse_currency(&charge.currency)?);
        params.customer = Some(customer_id);
        params.payment_method = Some(pm_id);
        params.confirm = Some(true);
        params.off_session = Some(PaymentIntentOffSession::Exists(true));
        params.capture_method = Some(PaymentIntentCaptureMethod::Manual);
        params.description = charge.description.as_deref();

        let pi = stripe::PaymentIntent::create(&self.client, params).await?;
        tracing::debug!(payment_intent_id = %pi.id, status = %pi.status, "Created payment intent");
        Ok(map_payment_intent(pi))
    }

    async fn retrieve_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent> {
        let pi_id: stripe::PaymentIntentId = parse_id("payment_intent", id.as_str())?;
        let pi = stripe::PaymentIntent::retrieve(&self.client, &pi_id, &[]).await?;
        Ok(map_payment_intent(pi))
    }

    async fn capture_payment_intent(
        &self,
        id: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<PaymentIntent> {
        let amount_to_capture = amount
            .map(|a| {
                u64::try_from(a).map_err(|_| {
                    PaymentError::processor(
                        "parameter_invalid_integer",
                        "The amount to capture must be a positive integer.",
                    )
                })
            })
            .transpose()?;
        let params = CapturePaymentIntent {
            amount_to_capture,
            application_fee_amount: None,
        };

        let pi = stripe::PaymentIntent::capture(&self.client, id.as_str(), params).await?;
        Ok(map_payment_intent(pi))
    }

    async fn cancel_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent> {
        let params = CancelPaymentIntent {
            cancellation_reason: None,
        };

        let pi = stripe::PaymentIntent::cancel(&self.client, id.as_str(), params).await?;
        Ok(map_payment_intent(pi))
    }

    async fn create_refund(
        &self,
        payment_intent: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<Refund> {
        let pi_id: stripe::PaymentIntentId = parse_id("payment_intent", payment_intent.as_str())?;

        let mut params = CreateRefund::new();
        params.payment_intent = Some(pi_id);
        params.amount = amount;
        params.reason = Some(RefundReasonFilter::RequestedByCustomer);

        let refund = stripe::Refund::create(&self.client, params).await?;
        Ok(Refund {
            id: refund.id.to_string(),
            amount: refund.amount,
            status: refund.status.as_ref().map(ToString::to_string),
            payment_intent: payment_intent.clone(),
        })
    }

    fn name(&self) -> &str {
        "Stripe"
    }
}
