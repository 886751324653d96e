//! lesson-checkout HTTP Server
//!
//! Axum-based server for the lesson booking checkout: learner registration,
//! card replacement, account updates and deletion, and lesson charges.

mod config;
mod error;
mod handlers;
mod routes;
mod state;

use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use lesson_accounts::AccountService;
use lesson_payments::{MemoryProcessor, PaymentProcessor, StripeProcessor, WebhookHandler};

use crate::config::{Backend, ServerConfig};
use crate::state::AppState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load environment
    dotenvy::dotenv().ok();
    let config = ServerConfig::from_env();

    // Initialize payments
    let (processor, webhook_secret): (Option<Arc<dyn PaymentProcessor>>, Option<String>) =
        match config.backend {
            Backend::Stripe => match StripeProcessor::from_env() {
                Ok(stripe) => {
                    tracing::info!("✓ Stripe configured");
                    let secret = stripe.webhook_secret().map(str::to_string);
                    (Some(Arc::new(stripe) as Arc<dyn PaymentProcessor>), secret)
                }
                Err(e) => {
                    tracing::warn!("⚠ Stripe not configured - payments disabled ({})", e);
                    tracing::warn!("  Set STRIPE_SECRET_KEY in .env");
                    (None, None)
                }
            },
            Backend::Memory => {
                tracing::warn!("⚠ Using in-memory payments - nothing reaches Stripe");
                (Some(Arc::new(MemoryProcessor::new()) as Arc<dyn PaymentProcessor>), None)
            }
        };

    if webhook_secret.is_none() {
        tracing::warn!("⚠ STRIPE_WEBHOOK_SECRET not set - webhooks disabled");
    }

    // Build application state
    let state = AppState {
        accounts: processor.map(AccountService::new),
        publishable_key: config.publishable_key.clone(),
        webhook: webhook_secret.map(|secret| Arc::new(WebhookHandler::new(secret))),
    };

    let app = routes::router(state);

    // Start server
    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;

    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("🚀 lesson-checkout server running on http://{}", config.bind_addr);
    tracing::info!("══════════════════════════════════════════════════");
    tracing::info!("");
    tracing::info!("Endpoints:");
    for (method, path, summary) in routes::ENDPOINTS {
        tracing::info!("  {:<4} {:<42} - {}", method, path, summary);
    }
    tracing::info!("");

    axum::serve(listener, app).await?;

    Ok(())
}
