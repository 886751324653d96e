//! Router

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::handlers::{
    complete_lesson_payment, create_customer, current_payment_method, delete_account,
    get_config, health_check, payment_method_details, refund_lesson, replace_payment_method,
    schedule_lesson, stripe_webhook, update_account,
};
use crate::state::AppState;

/// Endpoint table, printed at startup
pub const ENDPOINTS: &[(&str, &str, &str)] = &[
    ("GET", "/health", "Health check"),
    ("GET", "/config", "Publishable key"),
    ("POST", "/customers", "Register learner"),
    ("POST", "/customers/{customerId}/update", "Update name/email"),
    ("POST", "/customers/{customerId}/delete", "Delete account"),
    ("GET", "/customers/{customerId}/payment-method", "Current card"),
    ("GET", "/payment-methods/{paymentMethodId}", "Card summary"),
    ("POST", "/payment-methods/{customerId}/replace", "Replace card"),
    ("POST", "/schedule-lesson", "Authorize lesson"),
    ("POST", "/complete-lesson-payment", "Capture lesson"),
    ("POST", "/refund-lesson", "Refund lesson"),
    ("POST", "/webhook", "Stripe webhook"),
];

pub fn router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health & info
        .route("/health", get(health_check))
        .route("/config", get(get_config))

        // Accounts
        .route("/customers", post(create_customer))
        .route("/customers/{id}/update", post(update_account))
        .route("/customers/{id}/delete", post(delete_account))
        .route("/customers/{id}/payment-method", get(current_payment_method))

        // Payment methods
        .route("/payment-methods/{id}", get(payment_method_details))
        .route("/payment-methods/{id}/replace", post(replace_payment_method))

        // Lessons
        .route("/schedule-lesson", post(schedule_lesson))
        .route("/complete-lesson-payment", post(complete_lesson_payment))
        .route("/refund-lesson", post(refund_lesson))

        // Webhooks
        .route("/webhook", post(stripe_webhook))

        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::{
        body::{Body, to_bytes},
        http::{Request, StatusCode},
    };
    use lesson_accounts::AccountService;
    use lesson_payments::{MemoryProcessor, Operation, PaymentIntentStatus, WebhookHandler};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;

    fn app_with(processor: &Arc<MemoryProcessor>) -> Router {
        router(AppState {
            accounts: Some(AccountService::new(processor.clone())),
            publishable_key: Some("pk_test_123".into()),
            webhook: Some(Arc::new(WebhookHandler::new("whsec_test"))),
        })
    }

    fn disabled_app() -> Router {
        router(AppState {
            accounts: None,
            publishable_key: None,
            webhook: None,
        })
    }

    async fn send(app: Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => request
                .header("content-type", "application/json")
                .body(Body::from(body.to_string())),
            None => request.body(Body::empty()),
        }
        .unwrap();

        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    #[tokio::test]
    async fn test_health_and_config() {
        let processor = Arc::new(MemoryProcessor::new());

        let (status, body) = send(app_with(&processor), "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["stripe_configured"], true);
        assert_eq!(body["processor"], "Memory");

        let (_, body) = send(app_with(&processor), "GET", "/config", None).await;
        assert_eq!(body["key"], "pk_test_123");
    }

    #[tokio::test]
    async fn test_register_then_duplicate() {
        let processor = Arc::new(MemoryProcessor::new());
        let form = json!({
            "name": "Ada",
            "email": "ada@example.com",
            "lessonDateTime": "2026-11-02T15:00",
        });

        let (status, body) = send(app_with(&processor), "POST", "/customers", Some(form.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["clientSecret"].as_str().is_some());
        let customer_id = body["customerId"].clone();

        let (status, body) = send(app_with(&processor), "POST", "/customers", Some(form)).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["customerId"], customer_id);
        assert_eq!(body["error"], "A customer with this email address already exists.");
        assert_eq!(processor.count(Operation::CreateSetupIntent), 1);
    }

    #[tokio::test]
    async fn test_register_missing_email_is_bad_request() {
        let processor = Arc::new(MemoryProcessor::new());

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/customers",
            Some(json!({ "name": "Ada" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Missing required field: email");
        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_replace_payment_method() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");
        let old = processor.seed_card(Some(&customer), "visa", "4242");
        processor.seed_default(&customer, &old);
        let new = processor.seed_card(None, "mastercard", "4444");

        let (status, body) = send(
            app_with(&processor),
            "POST",
            &format!("/payment-methods/{customer}/replace"),
            Some(json!({ "paymentMethodId": new })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["paymentMethod"]["id"], new.as_str());
        assert_eq!(body["paymentMethod"]["type"], "card");
        assert_eq!(body["paymentMethod"]["card"]["last4"], "4444");
        assert_eq!(body["paymentMethod"]["card"]["expMonth"], 12);
    }

    #[tokio::test]
    async fn test_replace_without_id_is_bad_request() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");

        let (status, body) = send(
            app_with(&processor),
            "POST",
            &format!("/payment-methods/{customer}/replace"),
            Some(json!({})),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Failed to update payment method");
        assert_eq!(body["details"], "Missing required field: paymentMethodId");
        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_update_account_responses() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");
        processor.seed_card(Some(&customer), "visa", "4242");
        processor.seed_customer("Grace", "grace@example.com");
        let uri = format!("/customers/{customer}/update");

        let (status, body) = send(app_with(&processor), "POST", &uri, Some(json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "No updates necessary");
        assert_eq!(body["emailAlreadyExists"], false);

        let (status, body) = send(
            app_with(&processor),
            "POST",
            &uri,
            Some(json!({ "email": "grace@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["emailAlreadyExists"], true);
        assert_eq!(body["message"], "No updates necessary");

        let (status, body) = send(
            app_with(&processor),
            "POST",
            &uri,
            Some(json!({ "name": "Ada L.", "email": "grace@example.com" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["success"], false);
        assert_eq!(body["emailAlreadyExists"], true);
        assert_eq!(body["message"], "Customer email grace@example.com already exists");
        assert_eq!(processor.count(Operation::UpdateCustomer), 0);

        let (status, body) = send(
            app_with(&processor),
            "POST",
            &uri,
            Some(json!({ "name": "Ada Lovelace" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["paymentMethod"]["billingDetails"]["name"], "Ada Lovelace");
    }

    #[tokio::test]
    async fn test_update_without_card_is_not_found() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");

        let (status, body) = send(
            app_with(&processor),
            "POST",
            &format!("/customers/{customer}/update"),
            Some(json!({ "name": "Ada Lovelace" })),
        )
        .await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["details"], format!("No payment methods found for {customer}"));
    }

    #[tokio::test]
    async fn test_delete_blocked_then_deleted() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");
        let pending = processor.seed_payment_intent(&customer, 4500, PaymentIntentStatus::RequiresCapture);
        let uri = format!("/customers/{customer}/delete");

        let (status, body) = send(app_with(&processor), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "uncaptured_payments": [pending.as_str()] }));

        let (status, _) = send(
            app_with(&processor),
            "POST",
            "/complete-lesson-payment",
            Some(json!({ "payment_intent_id": pending })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = send(app_with(&processor), "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "deleted": true }));
    }

    #[tokio::test]
    async fn test_lesson_lifecycle() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");
        processor.seed_card(Some(&customer), "visa", "4242");

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/schedule-lesson",
            Some(json!({ "customer_id": customer, "amount": 4500, "description": "Piano" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["payment"]["status"], "requires_capture");
        let payment_intent_id = body["payment"]["id"].clone();

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/refund-lesson",
            Some(json!({ "payment_intent_id": payment_intent_id })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["canceled"], payment_intent_id);
    }

    #[tokio::test]
    async fn test_schedule_without_card_uses_coded_error() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/schedule-lesson",
            Some(json!({ "customer_id": customer, "amount": 4500 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "no_payment_method");
        assert_eq!(
            body["error"]["message"],
            format!("No payment methods found for {customer}")
        );
    }

    #[tokio::test]
    async fn test_complete_unknown_intent() {
        let processor = Arc::new(MemoryProcessor::new());

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/complete-lesson-payment",
            Some(json!({ "payment_intent_id": "pi_missing" })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "resource_missing");
        assert_eq!(body["error"]["message"], "No such payment_intent: 'pi_missing'");
    }

    #[tokio::test]
    async fn test_malformed_bodies_use_coded_error() {
        let processor = Arc::new(MemoryProcessor::new());

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/schedule-lesson",
            Some(json!({ "customer_id": "cus_1", "amount": "4500" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["code"], "invalid_request");
        assert!(body["error"]["message"].as_str().unwrap().contains("amount"));

        let request = Request::builder()
            .method("POST")
            .uri("/customers")
            .header("content-type", "application/json")
            .body(Body::from("{\"name\": \"Ada\""))
            .unwrap();
        let response = app_with(&processor).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"]["code"], "invalid_request");

        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_negative_capture_amount_is_rejected() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");
        let pi = processor.seed_payment_intent(&customer, 4500, PaymentIntentStatus::RequiresCapture);

        let (status, body) = send(
            app_with(&processor),
            "POST",
            "/complete-lesson-payment",
            Some(json!({ "payment_intent_id": pi, "amount": -100 })),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "invalid_request");
        assert!(processor.calls().is_empty());
    }

    #[tokio::test]
    async fn test_payments_disabled() {
        let (status, body) = send(
            disabled_app(),
            "POST",
            "/customers/cus_1/delete",
            None,
        )
        .await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["error"]["code"], "payments_disabled");

        let (_, body) = send(disabled_app(), "GET", "/health", None).await;
        assert_eq!(body["stripe_configured"], false);
        assert_eq!(body["processor"], Value::Null);

        let (status, _) = send(disabled_app(), "POST", "/webhook", Some(json!({}))).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_webhook_rejects_bad_signature() {
        let processor = Arc::new(MemoryProcessor::new());
        let request = Request::builder()
            .method("POST")
            .uri("/webhook")
            .header("content-type", "application/json")
            .header("stripe-signature", "t=1700000000,v1=deadbeef")
            .body(Body::from(r#"{"id":"evt_1"}"#))
            .unwrap();

        let response = app_with(&processor).oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let (status, body) = send(app_with(&processor), "POST", "/webhook", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"]["code"], "missing_signature");
    }

    #[tokio::test]
    async fn test_views() {
        let processor = Arc::new(MemoryProcessor::new());
        let customer = processor.seed_customer("Ada", "ada@example.com");
        let card = processor.seed_card(Some(&customer), "amex", "0005");

        let (status, body) = send(
            app_with(&processor),
            "GET",
            &format!("/payment-methods/{card}"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({ "last4": "0005", "brand": "amex" }));

        let (status, body) = send(
            app_with(&processor),
            "GET",
            &format!("/customers/{customer}/payment-method"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["id"], card.as_str());

        let (status, body) = send(app_with(&processor), "GET", "/payment-methods/pm_missing", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["code"], "resource_missing");
    }
}
