//! Stripe Webhook Handling
//!
//! Verifies Stripe webhook signatures and classifies the events the lesson
//! checkout cares about. Nothing is stored locally; events are logged so an
//! operator can follow card setup and lesson payments.

use stripe::{Event, EventObject, EventType, Webhook};

use crate::error::{PaymentError, Result};

/// Parsed webhook event
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WebhookEvent {
    /// Card collected through a SetupIntent
    CardSetupSucceeded {
        setup_intent_id: String,
        customer_id: Option<String>,
        payment_method_id: Option<String>,
    },

    /// Lesson authorized and waiting for capture
    LessonAuthorized {
        payment_intent_id: String,
        amount_capturable: i64,
    },

    /// Lesson payment captured
    LessonPaid {
        payment_intent_id: String,
        amount_received: i64,
    },

    /// Authorization attempt declined
    LessonPaymentFailed {
        payment_intent_id: String,
        customer_id: Option<String>,
        reason: Option<String>,
    },

    /// Customer removed, possibly from the dashboard
    CustomerDeleted { customer_id: String },

    /// Unhandled event type
    Other { event_type: String },
}

/// Webhook handler
pub struct WebhookHandler {
    secret: String,
}

impl WebhookHandler {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    /// Verify webhook signature and parse event
    pub fn parse_event(&self, payload: &str, signature: &str) -> Result<Event> {
        Webhook::construct_event(payload, signature, &self.secret)
            .map_err(|e| PaymentError::WebhookSignature(e.to_string()))
    }

    /// Process a webhook event
    pub fn handle(&self, event: &Event) -> Result<WebhookEvent> {
        tracing::info!(event_id = %event.id, event_type = ?event.type_, "Processing Stripe webhook");

        let parsed = parse_webhook_event(event)?;

        match &parsed {
            WebhookEvent::CardSetupSucceeded { customer_id, payment_method_id, .. } => {
                tracing::info!(
                    customer_id = ?customer_id,
                    payment_method_id = ?payment_method_id,
                    "Card saved for customer"
                );
            }

            WebhookEvent::LessonAuthorized { payment_intent_id, amount_capturable } => {
                tracing::info!(
                    payment_intent_id = %payment_intent_id,
                    amount_capturable,
                    "Lesson authorized, awaiting capture"
                );
            }

            WebhookEvent::LessonPaid { payment_intent_id, amount_received } => {
                tracing::info!(payment_intent_id = %payment_intent_id, amount_received, "Lesson paid");
            }

            WebhookEvent::LessonPaymentFailed { payment_intent_id, customer_id, reason } => {
                tracing::warn!(
                    payment_intent_id = %payment_intent_id,
                    customer_id = ?customer_id,
                    reason = ?reason,
                    "Lesson payment failed"
                );
            }

            WebhookEvent::CustomerDeleted { customer_id } => {
                tracing::info!(customer_id = %customer_id, "Customer deleted");
            }

            WebhookEvent::Other { event_type } => {
                tracing::debug!(event_type = %event_type, "Unhandled webhook event");
            }
        }

        Ok(parsed)
    }
}

/// Parse Stripe event into our event type
fn parse_webhook_event(event: &Event) -> Result<WebhookEvent> {
    match event.type_ {
        EventType::SetupIntentSucceeded => {
            if let EventObject::SetupIntent(intent) = &event.data.object {
                Ok(WebhookEvent::CardSetupSucceeded {
                    setup_intent_id: intent.id.to_string(),
                    customer_id: intent.customer.as_ref().map(|c| c.id().to_string()),
                    payment_method_id: intent.payment_method.as_ref().map(|pm| pm.id().to_string()),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid setup intent data".into()))
            }
        }

        EventType::PaymentIntentAmountCapturableUpdated => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                Ok(WebhookEvent::LessonAuthorized {
                    payment_intent_id: intent.id.to_string(),
                    amount_capturable: intent.amount_capturable,
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid payment intent data".into()))
            }
        }

        EventType::PaymentIntentSucceeded => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                Ok(WebhookEvent::LessonPaid {
                    payment_intent_id: intent.id.to_string(),
                    amount_received: intent.amount_received,
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid payment intent data".into()))
            }
        }

        EventType::PaymentIntentPaymentFailed => {
            if let EventObject::PaymentIntent(intent) = &event.data.object {
                Ok(WebhookEvent::LessonPaymentFailed {
                    payment_intent_id: intent.id.to_string(),
                    customer_id: intent.customer.as_ref().map(|c| c.id().to_string()),
                    reason: intent
                        .last_payment_error
                        .as_ref()
                        .and_then(|err| err.message.clone()),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid payment intent data".into()))
            }
        }

        EventType::CustomerDeleted => {
            if let EventObject::Customer(customer) = &event.data.object {
                Ok(WebhookEvent::CustomerDeleted {
                    customer_id: customer.id.to_string(),
                })
            } else {
                Err(PaymentError::WebhookParse("Invalid customer data".into()))
            }
        }

        _ => Ok(WebhookEvent::Other {
            event_type: format!("{:?}", event.type_),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_bad_signature() {
        let handler = WebhookHandler::new("whsec_test");
        let result = handler.parse_event(r#"{"id":"evt_1"}"#, "t=1700000000,v1=deadbeef");
        assert!(matches!(result, Err(PaymentError::WebhookSignature(_))));
    }

    #[test]
    fn test_rejects_malformed_header() {
        let handler = WebhookHandler::new("whsec_test");
        let result = handler.parse_event("{}", "not-a-signature");
        assert!(result.is_err());
    }
}
