//! In-Memory Processor
//!
//! A [`PaymentProcessor`] that keeps customers, payment methods and intents in
//! memory and records every call it receives. Used by tests to assert call
//! order, and for running the server without Stripe credentials.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;

use crate::error::{PaymentError, Result};
use crate::model::{
    BillingDetails, Card, Customer, CustomerId, PaymentIntent, PaymentIntentId,
    PaymentIntentStatus, PaymentMethod, PaymentMethodId, Refund, SetupIntent,
};
use crate::processor::{CustomerUpdate, LessonCharge, NewCustomer, PaymentProcessor};

/// Processor operation, used to inject failures
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    ListCustomers,
    CreateCustomer,
    RetrieveCustomer,
    UpdateCustomer,
    DeleteCustomer,
    CreateSetupIntent,
    RetrievePaymentMethod,
    ListPaymentMethods,
    AttachPaymentMethod,
    DetachPaymentMethod,
    UpdateBillingDetails,
    ListPaymentIntents,
    CreatePaymentIntent,
    RetrievePaymentIntent,
    CapturePaymentIntent,
    CancelPaymentIntent,
    CreateRefund,
}

/// One recorded call
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessorCall {
    ListCustomers { email: String },
    CreateCustomer {
        name: String,
        email: String,
        metadata: HashMap<String, String>,
    },
    RetrieveCustomer(CustomerId),
    UpdateCustomer { customer: CustomerId, update: CustomerUpdate },
    DeleteCustomer(CustomerId),
    CreateSetupIntent(CustomerId),
    RetrievePaymentMethod(PaymentMethodId),
    ListPaymentMethods(CustomerId),
    AttachPaymentMethod { payment_method: PaymentMethodId, customer: CustomerId },
    DetachPaymentMethod(PaymentMethodId),
    UpdateBillingDetails { payment_method: PaymentMethodId, details: BillingDetails },
    ListPaymentIntents(CustomerId),
    CreatePaymentIntent { customer: CustomerId, amount: i64 },
    RetrievePaymentIntent(PaymentIntentId),
    CapturePaymentIntent(PaymentIntentId),
    CancelPaymentIntent(PaymentIntentId),
    CreateRefund(PaymentIntentId),
}

impl ProcessorCall {
    pub fn operation(&self) -> Operation {
        match self {
            Self::ListCustomers { .. } => Operation::ListCustomers,
            Self::CreateCustomer { .. } => Operation::CreateCustomer,
            Self::RetrieveCustomer(_) => Operation::RetrieveCustomer,
            Self::UpdateCustomer { .. } => Operation::UpdateCustomer,
            Self::DeleteCustomer(_) => Operation::DeleteCustomer,
            Self::CreateSetupIntent(_) => Operation::CreateSetupIntent,
            Self::RetrievePaymentMethod(_) => Operation::RetrievePaymentMethod,
            Self::ListPaymentMethods(_) => Operation::ListPaymentMethods,
            Self::AttachPaymentMethod { .. } => Operation::AttachPaymentMethod,
            Self::DetachPaymentMethod(_) => Operation::DetachPaymentMethod,
            Self::UpdateBillingDetails { .. } => Operation::UpdateBillingDetails,
            Self::ListPaymentIntents(_) => Operation::ListPaymentIntents,
            Self::CreatePaymentIntent { .. } => Operation::CreatePaymentIntent,
            Self::RetrievePaymentIntent(_) => Operation::RetrievePaymentIntent,
            Self::CapturePaymentIntent(_) => Operation::CapturePaymentIntent,
            Self::CancelPaymentIntent(_) => Operation::CancelPaymentIntent,
            Self::CreateRefund(_) => Operation::CreateRefund,
        }
    }
}

#[derive(Default)]
struct State {
    next_id: u64,
    /// Creation order, oldest first
    customer_order: Vec<CustomerId>,
    customers: HashMap<CustomerId, Customer>,
    payment_methods: HashMap<PaymentMethodId, PaymentMethod>,
    payment_intents: HashMap<PaymentIntentId, PaymentIntent>,
    intent_order: Vec<PaymentIntentId>,
    refunds: Vec<Refund>,
    calls: Vec<ProcessorCall>,
    failures: HashMap<Operation, PaymentError>,
    unconfirmed_deletes: bool,
}

impl State {
    fn next_id(&mut self, prefix: &str) -> String {
        self.next_id += 1;
        format!("{prefix}_{:06}", self.next_id)
    }

    /// Record the call, then fail it if a failure was injected
    fn record(&mut self, call: ProcessorCall) -> Result<()> {
        let operation = call.operation();
        self.calls.push(call);
        match self.failures.remove(&operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn customer(&self, id: &CustomerId) -> Result<&Customer> {
        self.customers
            .get(id)
            .ok_or_else(|| PaymentError::resource_missing(format!("No such customer: '{id}'")))
    }

    fn payment_method(&self, id: &PaymentMethodId) -> Result<&PaymentMethod> {
        self.payment_methods.get(id).ok_or_else(|| {
            PaymentError::resource_missing(format!("No such PaymentMethod: '{id}'"))
        })
    }

    fn payment_intent_mut(&mut self, id: &PaymentIntentId) -> Result<&mut PaymentIntent> {
        self.payment_intents.get_mut(id).ok_or_else(|| {
            PaymentError::resource_missing(format!("No such payment_intent: '{id}'"))
        })
    }
}

/// In-memory payment processor (for tests and development)
#[derive(Default)]
pub struct MemoryProcessor {
    state: Mutex<State>,
}

impl MemoryProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    // ------------------------------------------------------------------------
    // Seeding
    // ------------------------------------------------------------------------

    /// Insert a customer without recording a call
    pub fn seed_customer(&self, name: &str, email: &str) -> CustomerId {
        let mut state = self.lock();
        let id = CustomerId::new(state.next_id("cus"));
        state.customers.insert(
            id.clone(),
            Customer {
                id: id.clone(),
                email: Some(email.to_string()),
                name: Some(name.to_string()),
                default_payment_method: None,
            },
        );
        state.customer_order.push(id.clone());
        id
    }

    /// Insert a card, attached to `customer` when given
    pub fn seed_card(&self, customer: Option<&CustomerId>, brand: &str, last4: &str) -> PaymentMethodId {
        let mut state = self.lock();
        let id = PaymentMethodId::new(state.next_id("pm"));
        state.payment_methods.insert(
            id.clone(),
            PaymentMethod {
                id: id.clone(),
                kind: "card".into(),
                billing_details: BillingDetails::default(),
                card: Some(Card {
                    brand: brand.to_string(),
                    exp_month: 12,
                    exp_year: 2034,
                    last4: last4.to_string(),
                }),
                customer: customer.cloned(),
            },
        );
        id
    }

    /// Mark an attached payment method as the customer's default
    pub fn seed_default(&self, customer: &CustomerId, payment_method: &PaymentMethodId) {
        let mut state = self.lock();
        if let Some(c) = state.customers.get_mut(customer) {
            c.default_payment_method = Some(payment_method.clone());
        }
    }

    /// Insert a payment intent in the given status
    pub fn seed_payment_intent(
        &self,
        customer: &CustomerId,
        amount: i64,
        status: PaymentIntentStatus,
    ) -> PaymentIntentId {
        let mut state = self.lock();
        let id = PaymentIntentId::new(state.next_id("pi"));
        state.payment_intents.insert(
            id.clone(),
            PaymentIntent {
                id: id.clone(),
                amount,
                amount_received: if status == PaymentIntentStatus::Succeeded { amount } else { 0 },
                currency: "usd".into(),
                status,
                customer: Some(customer.clone()),
                payment_method: None,
                description: None,
                created: Utc::now(),
            },
        );
        state.intent_order.push(id.clone());
        id
    }

    /// Fail the next call of `operation` with `error`
    pub fn fail_next(&self, operation: Operation, error: PaymentError) {
        self.lock().failures.insert(operation, error);
    }

    /// Make customer deletion report `deleted: false`
    pub fn set_unconfirmed_deletes(&self, unconfirmed: bool) {
        self.lock().unconfirmed_deletes = unconfirmed;
    }

    // ------------------------------------------------------------------------
    // Inspection
    // ------------------------------------------------------------------------

    pub fn calls(&self) -> Vec<ProcessorCall> {
        self.lock().calls.clone()
    }

    pub fn operations(&self) -> Vec<Operation> {
        self.lock().calls.iter().map(ProcessorCall::operation).collect()
    }

    pub fn count(&self, operation: Operation) -> usize {
        self.lock()
            .calls
            .iter()
            .filter(|call| call.operation() == operation)
            .count()
    }

    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    pub fn customer(&self, id: &CustomerId) -> Option<Customer> {
        self.lock().customers.get(id).cloned()
    }

    pub fn customers(&self) -> Vec<Customer> {
        let state = self.lock();
        state
            .customer_order
            .iter()
            .filter_map(|id| state.customers.get(id).cloned())
            .collect()
    }

    pub fn payment_method(&self, id: &PaymentMethodId) -> Option<PaymentMethod> {
        self.lock().payment_methods.get(id).cloned()
    }

    pub fn payment_intent(&self, id: &PaymentIntentId) -> Option<PaymentIntent> {
        self.lock().payment_intents.get(id).cloned()
    }

    pub fn refunds(&self) -> Vec<Refund> {
        self.lock().refunds.clone()
    }
}

#[async_trait]
impl PaymentProcessor for MemoryProcessor {
    async fn list_customers_by_email(&self, email: &str, limit: u64) -> Result<Vec<Customer>> {
        let mut state = self.lock();
        state.record(ProcessorCall::ListCustomers { email: email.to_string() })?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(state
            .customer_order
            .iter()
            .rev()
            .filter_map(|id| state.customers.get(id))
            .filter(|c| c.email.as_deref() == Some(email))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_customer(&self, customer: NewCustomer) -> Result<Customer> {
        let mut state = self.lock();
        state.record(ProcessorCall::CreateCustomer {
            name: customer.name.clone(),
            email: customer.email.clone(),
            metadata: customer.metadata.clone(),
        })?;

        let id = CustomerId::new(state.next_id("cus"));
        let created = Customer {
            id: id.clone(),
            email: Some(customer.email),
            name: Some(customer.name),
            default_payment_method: None,
        };
        state.customers.insert(id.clone(), created.clone());
        state.customer_order.push(id);
        Ok(created)
    }

    async fn retrieve_customer(&self, id: &CustomerId) -> Result<Customer> {
        let mut state = self.lock();
        state.record(ProcessorCall::RetrieveCustomer(id.clone()))?;
        state.customer(id).cloned()
    }

    async fn update_customer(&self, id: &CustomerId, update: CustomerUpdate) -> Result<Customer> {
        let mut state = self.lock();
        state.record(ProcessorCall::UpdateCustomer {
            customer: id.clone(),
            update: update.clone(),
        })?;
        state.customer(id)?;

        if let Some(ref pm_id) = update.default_payment_method {
            let pm = state.payment_method(pm_id)?;
            if pm.customer.as_ref() != Some(id) {
                return Err(PaymentError::processor(
                    "resource_missing",
                    format!("The customer does not have a payment method with the ID {pm_id}."),
                ));
            }
        }

        let customer = state
            .customers
            .get_mut(id)
            .ok_or_else(|| PaymentError::resource_missing(format!("No such customer: '{id}'")))?;
        if let Some(name) = update.name {
            customer.name = Some(name);
        }
        if let Some(email) = update.email {
            customer.email = Some(email);
        }
        if let Some(pm_id) = update.default_payment_method {
            customer.default_payment_method = Some(pm_id);
        }
        Ok(customer.clone())
    }

    async fn delete_customer(&self, id: &CustomerId) -> Result<bool> {
        let mut state = self.lock();
        state.record(ProcessorCall::DeleteCustomer(id.clone()))?;
        state.customer(id)?;

        if state.unconfirmed_deletes {
            return Ok(false);
        }

        state.customers.remove(id);
        state.customer_order.retain(|c| c != id);
        for pm in state.payment_methods.values_mut() {
            if pm.customer.as_ref() == Some(id) {
                pm.customer = None;
            }
        }
        Ok(true)
    }

    async fn create_setup_intent(&self, customer: &CustomerId) -> Result<SetupIntent> {
        let mut state = self.lock();
        state.record(ProcessorCall::CreateSetupIntent(customer.clone()))?;
        state.customer(customer)?;

        let id = state.next_id("seti");
        Ok(SetupIntent {
            client_secret: format!("{id}_secret_memory"),
            id,
            customer: customer.clone(),
        })
    }

    async fn retrieve_payment_method(&self, id: &PaymentMethodId) -> Result<PaymentMethod> {
        let mut state = self.lock();
        state.record(ProcessorCall::RetrievePaymentMethod(id.clone()))?;
        state.payment_method(id).cloned()
    }

    async fn list_card_payment_methods(&self, customer: &CustomerId) -> Result<Vec<PaymentMethod>> {
        let mut state = self.lock();
        state.record(ProcessorCall::ListPaymentMethods(customer.clone()))?;
        state.customer(customer)?;

        let mut methods: Vec<PaymentMethod> = state
            .payment_methods
            .values()
            .filter(|pm| pm.customer.as_ref() == Some(customer) && pm.is_card())
            .cloned()
            .collect();
        // Stripe lists newest first; ids are monotonic here.
        methods.sort_by(|a, b| b.id.cmp(&a.id));
        Ok(methods)
    }

    async fn attach_payment_method(
        &self,
        id: &PaymentMethodId,
        customer: &CustomerId,
    ) -> Result<PaymentMethod> {
        let mut state = self.lock();
        state.record(ProcessorCall::AttachPaymentMethod {
            payment_method: id.clone(),
            customer: customer.clone(),
        })?;
        state.customer(customer)?;

        let pm = state.payment_methods.get_mut(id).ok_or_else(|| {
            PaymentError::resource_missing(format!("No such PaymentMethod: '{id}'"))
        })?;
        if pm.customer.as_ref().is_some_and(|owner| owner != customer) {
            return Err(PaymentError::processor(
                "payment_method_unexpected_state",
                "The payment method you provided has already been attached to a customer.",
            ));
        }
        pm.customer = Some(customer.clone());
        Ok(pm.clone())
    }

    async fn detach_payment_method(&self, id: &PaymentMethodId) -> Result<PaymentMethod> {
        let mut state = self.lock();
        state.record(ProcessorCall::DetachPaymentMethod(id.clone()))?;

        let pm = state.payment_methods.get_mut(id).ok_or_else(|| {
            PaymentError::resource_missing(format!("No such PaymentMethod: '{id}'"))
        })?;
        let Some(owner) = pm.customer.take() else {
            return Err(PaymentError::processor(
                "payment_method_unexpected_state",
                "The payment method you provided is not attached to a customer so detachment is impossible.",
            ));
        };
        let detached = pm.clone();

        if let Some(customer) = state.customers.get_mut(&owner) {
            if customer.default_payment_method.as_ref() == Some(id) {
                customer.default_payment_method = None;
            }
        }
        Ok(detached)
    }

    async fn update_billing_details(
        &self,
        id: &PaymentMethodId,
        details: BillingDetails,
    ) -> Result<PaymentMethod> {
        let mut state = self.lock();
        state.record(ProcessorCall::UpdateBillingDetails {
            payment_method: id.clone(),
            details: details.clone(),
        })?;

        let pm = state.payment_methods.get_mut(id).ok_or_else(|| {
            PaymentError::resource_missing(format!("No such PaymentMethod: '{id}'"))
        })?;
        if details.name.is_some() {
            pm.billing_details.name = details.name;
        }
        if details.email.is_some() {
            pm.billing_details.email = details.email;
        }
        Ok(pm.clone())
    }

    async fn list_payment_intents(
        &self,
        customer: &CustomerId,
        limit: u64,
    ) -> Result<Vec<PaymentIntent>> {
        let mut state = self.lock();
        state.record(ProcessorCall::ListPaymentIntents(customer.clone()))?;

        let limit = usize::try_from(limit).unwrap_or(usize::MAX);
        Ok(state
            .intent_order
            .iter()
            .rev()
            .filter_map(|id| state.payment_intents.get(id))
            .filter(|pi| pi.customer.as_ref() == Some(customer))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_payment_intent(&self, charge: LessonCharge) -> Result<PaymentIntent> {
        let mut state = self.lock();
        state.record(ProcessorCall::CreatePaymentIntent {
            customer: charge.customer.clone(),
            amount: charge.amount,
        })?;
        state.customer(&charge.customer)?;
        let pm = state.payment_method(&charge.payment_method)?;
        if pm.customer.as_ref() != Some(&charge.customer) {
            return Err(PaymentError::processor(
                "payment_method_unexpected_state",
                "The provided PaymentMethod does not belong to this customer.",
            ));
        }

        let id = PaymentIntentId::new(state.next_id("pi"));
        let intent = PaymentIntent {
            id: id.clone(),
            amount: charge.amount,
            amount_received: 0,
            currency: charge.currency.to_ascii_lowercase(),
            status: PaymentIntentStatus::RequiresCapture,
            customer: Some(charge.customer),
            payment_method: Some(charge.payment_method),
            description: charge.description,
            created: Utc::now(),
        };
        state.payment_intents.insert(id.clone(), intent.clone());
        state.intent_order.push(id);
        Ok(intent)
    }

    async fn retrieve_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent> {
        let mut state = self.lock();
        state.record(ProcessorCall::RetrievePaymentIntent(id.clone()))?;
        state.payment_intent_mut(id).map(|pi| pi.clone())
    }

    async fn capture_payment_intent(
        &self,
        id: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<PaymentIntent> {
        let mut state = self.lock();
        state.record(ProcessorCall::CapturePaymentIntent(id.clone()))?;

        let pi = state.payment_intent_mut(id)?;
        if pi.status != PaymentIntentStatus::RequiresCapture {
            return Err(PaymentError::processor(
                "payment_intent_unexpected_state",
                format!("This PaymentIntent could not be captured because it has a status of {}.", pi.status),
            ));
        }
        let captured = amount.unwrap_or(pi.amount);
        if captured <= 0 {
            return Err(PaymentError::processor(
                "parameter_invalid_integer",
                "The amount to capture must be a positive integer.",
            ));
        }
        if captured > pi.amount {
            return Err(PaymentError::processor(
                "amount_too_large",
                "The amount to capture exceeds the authorized amount.",
            ));
        }
        pi.status = PaymentIntentStatus::Succeeded;
        pi.amount_received = captured;
        Ok(pi.clone())
    }

    async fn cancel_payment_intent(&self, id: &PaymentIntentId) -> Result<PaymentIntent> {
        let mut state = self.lock();
        state.record(ProcessorCall::CancelPaymentIntent(id.clone()))?;

        let pi = state.payment_intent_mut(id)?;
        if matches!(pi.status, PaymentIntentStatus::Succeeded | PaymentIntentStatus::Canceled) {
            return Err(PaymentError::processor(
                "payment_intent_unexpected_state",
                format!("This PaymentIntent could not be canceled because it has a status of {}.", pi.status),
            ));
        }
        pi.status = PaymentIntentStatus::Canceled;
        Ok(pi.clone())
    }

    async fn create_refund(
        &self,
        payment_intent: &PaymentIntentId,
        amount: Option<i64>,
    ) -> Result<Refund> {
        let mut state = self.lock();
        state.record(ProcessorCall::CreateRefund(payment_intent.clone()))?;

        let pi = state.payment_intent_mut(payment_intent)?;
        if pi.status != PaymentIntentStatus::Succeeded {
            return Err(PaymentError::processor(
                "charge_not_refundable",
                format!("PaymentIntent {payment_intent} has no captured charge to refund."),
            ));
        }
        let received = pi.amount_received;
        let already: i64 = state
            .refunds
            .iter()
            .filter(|r| &r.payment_intent == payment_intent)
            .map(|r| r.amount)
            .sum();
        let refundable = received - already;
        let amount = amount.unwrap_or(refundable);
        if amount <= 0 || amount > refundable {
            return Err(PaymentError::processor(
                "charge_already_refunded",
                format!("Refund amount ({amount}) is greater than unrefunded amount ({refundable})."),
            ));
        }

        let refund = Refund {
            id: state.next_id("re"),
            amount,
            status: Some("succeeded".into()),
            payment_intent: payment_intent.clone(),
        };
        state.refunds.push(refund.clone());
        Ok(refund)
    }

    fn name(&self) -> &str {
        "Memory"
    }
}
