//! Application State

use std::sync::Arc;

use lesson_accounts::AccountService;
use lesson_payments::WebhookHandler;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    /// Account workflows (None if no processor is configured)
    pub accounts: Option<AccountService>,

    /// Publishable key for the browser
    pub publishable_key: Option<String>,

    /// Webhook verifier (None if no signing secret is configured)
    pub webhook: Option<Arc<WebhookHandler>>,
}
