//! HTTP Handlers

use axum::{
    Json,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;

use lesson_accounts::{
    AccountChanges, AccountError, AccountService, AccountUpdate, Deletion, ErrorKind,
    LessonRefund, PaymentMethodSummary, Registration, RegistrationOutcome, required,
};
use lesson_payments::{CustomerId, PaymentIntentId, PaymentMethod, PaymentMethodId};

use crate::error::{ApiError, ApiJson};
use crate::state::AppState;

type ApiResult<T> = Result<T, ApiError>;

// ============================================================================
// Request / Response Types
// ============================================================================

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub stripe_configured: bool,
    pub webhooks_configured: bool,
    /// Active processor, e.g. `Stripe` or `Memory`
    pub processor: Option<String>,
}

#[derive(Serialize)]
pub struct ConfigResponse {
    pub key: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePaymentMethodRequest {
    pub payment_method_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacePaymentMethodResponse {
    pub success: bool,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountUpdateResponse {
    pub success: bool,
    pub email_already_exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<PaymentMethod>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScheduleLessonRequest {
    pub customer_id: Option<String>,
    pub amount: Option<i64>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LessonPaymentRequest {
    pub payment_intent_id: Option<String>,
    /// Minor units; defaults to the full amount
    pub amount: Option<i64>,
}

// ============================================================================
// Handlers
// ============================================================================

fn accounts(state: &AppState) -> ApiResult<&AccountService> {
    state.accounts.as_ref().ok_or_else(ApiError::payments_disabled)
}

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        stripe_configured: state.accounts.is_some(),
        webhooks_configured: state.webhook.is_some(),
        processor: state
            .accounts
            .as_ref()
            .map(|accounts| accounts.processor().name().to_string()),
    })
}

/// Publishable key for the card form
pub async fn get_config(State(state): State<AppState>) -> Json<ConfigResponse> {
    Json(ConfigResponse {
        key: state.publishable_key.clone(),
    })
}

/// Register a learner, or report the email as taken
pub async fn create_customer(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<Registration>,
) -> ApiResult<Response> {
    let accounts = accounts(&state)?;

    match accounts.register(&form).await {
        Ok(RegistrationOutcome::Created {
            customer_id,
            client_secret,
        }) => Ok(Json(json!({
            "clientSecret": client_secret,
            "customerId": customer_id,
        }))
        .into_response()),

        Ok(RegistrationOutcome::Duplicate { customer_id }) => Ok((
            StatusCode::CREATED,
            Json(json!({
                "error": "A customer with this email address already exists.",
                "customerId": customer_id,
            })),
        )
            .into_response()),

        Err(err) => {
            let status = match err.kind() {
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            tracing::warn!(error = %err, "Registration failed");
            Err(ApiError::plain(status, err.user_message()))
        }
    }
}

/// Swap the customer's default card
pub async fn replace_payment_method(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    ApiJson(payload): ApiJson<ReplacePaymentMethodRequest>,
) -> ApiResult<Json<ReplacePaymentMethodResponse>> {
    let accounts = accounts(&state)?;
    let customer_id = CustomerId::new(customer_id);

    let payment_method = accounts
        .replace_payment_method(&customer_id, payload.payment_method_id.as_deref())
        .await
        .map_err(|err| {
            ApiError::detailed(StatusCode::BAD_REQUEST, "Failed to update payment method", &err)
        })?;

    Ok(Json(ReplacePaymentMethodResponse {
        success: true,
        payment_method,
    }))
}

/// Update name and/or email
pub async fn update_account(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
    ApiJson(changes): ApiJson<AccountChanges>,
) -> ApiResult<Response> {
    let accounts = accounts(&state)?;
    let customer_id = CustomerId::new(customer_id);

    let outcome = accounts
        .update_account(&customer_id, &changes)
        .await
        .map_err(|err| {
            let status = match err.kind() {
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            };
            ApiError::detailed(status, "Failed to update account", &err)
        })?;

    let response = match outcome {
        AccountUpdate::Applied { payment_method } => Json(AccountUpdateResponse {
            success: true,
            email_already_exists: false,
            payment_method: Some(payment_method),
            message: None,
        })
        .into_response(),

        AccountUpdate::NothingToUpdate => Json(AccountUpdateResponse {
            success: true,
            email_already_exists: false,
            payment_method: None,
            message: Some("No updates necessary".into()),
        })
        .into_response(),

        AccountUpdate::EmailConflict {
            email,
            name_blocked: true,
        } => (
            StatusCode::CREATED,
            Json(AccountUpdateResponse {
                success: false,
                email_already_exists: true,
                payment_method: None,
                message: Some(format!("Customer email {email} already exists")),
            }),
        )
            .into_response(),

        // The taken email was the only change requested
        AccountUpdate::EmailConflict {
            name_blocked: false,
            ..
        } => Json(AccountUpdateResponse {
            success: true,
            email_already_exists: true,
            payment_method: None,
            message: Some("No updates necessary".into()),
        })
        .into_response(),
    };
    Ok(response)
}

/// Delete the customer unless payments await capture
pub async fn delete_account(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    let accounts = accounts(&state)?;
    let customer_id = CustomerId::new(customer_id);

    let deletion = accounts.delete_account(&customer_id).await.map_err(|err| {
        let status = match err.kind() {
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        ApiError::from_account_with(status, &err)
    })?;

    Ok(Json(match deletion {
        Deletion::Deleted => json!({ "deleted": true }),
        Deletion::Blocked {
            uncaptured_payments,
        } => json!({ "uncaptured_payments": uncaptured_payments }),
    }))
}

/// Last four digits and brand of a card
pub async fn payment_method_details(
    State(state): State<AppState>,
    Path(payment_method_id): Path<String>,
) -> ApiResult<Json<PaymentMethodSummary>> {
    let accounts = accounts(&state)?;
    let summary = accounts
        .payment_method_summary(&PaymentMethodId::new(payment_method_id))
        .await
        .map_err(|err| ApiError::from_account(&err))?;
    Ok(Json(summary))
}

/// Card shown on the account-update page
pub async fn current_payment_method(
    State(state): State<AppState>,
    Path(customer_id): Path<String>,
) -> ApiResult<Json<PaymentMethod>> {
    let accounts = accounts(&state)?;
    let payment_method = accounts
        .current_payment_method(&CustomerId::new(customer_id))
        .await
        .map_err(|err| ApiError::from_account(&err))?;
    Ok(Json(payment_method))
}

/// Authorize a lesson for later capture
pub async fn schedule_lesson(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<ScheduleLessonRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let accounts = accounts(&state)?;
    let lesson_error = |err: AccountError| ApiError::from_account_with(StatusCode::BAD_REQUEST, &err);

    let customer_id = required("customer_id", payload.customer_id.as_deref()).map_err(lesson_error)?;
    let amount = payload
        .amount
        .ok_or(AccountError::MissingField("amount"))
        .map_err(lesson_error)?;

    let payment = accounts
        .schedule_lesson(
            &CustomerId::new(customer_id),
            amount,
            payload.description.as_deref(),
        )
        .await
        .map_err(lesson_error)?;

    Ok(Json(json!({ "payment": payment })))
}

/// Capture an authorized lesson
pub async fn complete_lesson_payment(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LessonPaymentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let accounts = accounts(&state)?;
    let lesson_error = |err: AccountError| ApiError::from_account_with(StatusCode::BAD_REQUEST, &err);

    let payment_intent_id =
        required("payment_intent_id", payload.payment_intent_id.as_deref()).map_err(lesson_error)?;

    let payment = accounts
        .complete_lesson_payment(&PaymentIntentId::new(payment_intent_id), payload.amount)
        .await
        .map_err(lesson_error)?;

    Ok(Json(json!({ "payment": payment })))
}

/// Refund a captured lesson or release its authorization
pub async fn refund_lesson(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<LessonPaymentRequest>,
) -> ApiResult<Json<serde_json::Value>> {
    let accounts = accounts(&state)?;
    let lesson_error = |err: AccountError| ApiError::from_account_with(StatusCode::BAD_REQUEST, &err);

    let payment_intent_id =
        required("payment_intent_id", payload.payment_intent_id.as_deref()).map_err(lesson_error)?;

    let refund = accounts
        .refund_lesson(&PaymentIntentId::new(payment_intent_id), payload.amount)
        .await
        .map_err(lesson_error)?;

    Ok(Json(match refund {
        LessonRefund::Refunded { refund_id } => json!({ "refund": refund_id }),
        LessonRefund::Canceled { payment_intent_id } => json!({ "canceled": payment_intent_id }),
    }))
}

/// Stripe webhook handler
pub async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> ApiResult<Json<serde_json::Value>> {
    let handler = state.webhook.as_ref().ok_or_else(|| {
        ApiError::coded(
            StatusCode::SERVICE_UNAVAILABLE,
            "webhooks_disabled",
            "Webhook secret not configured",
        )
    })?;

    let signature = headers
        .get("stripe-signature")
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| {
            ApiError::coded(StatusCode::BAD_REQUEST, "missing_signature", "Missing Stripe signature")
        })?;

    let event = handler.parse_event(&body, signature).map_err(|e| {
        tracing::warn!("Webhook signature failed: {}", e);
        ApiError::coded(StatusCode::BAD_REQUEST, "invalid_signature", "Invalid signature")
    })?;

    handler.handle(&event).map_err(|e| {
        tracing::error!("Webhook processing error: {}", e);
        ApiError::coded(
            StatusCode::BAD_REQUEST,
            "invalid_payload",
            "Webhook processing failed",
        )
    })?;

    Ok(Json(json!({ "received": true })))
}
