//! Application state

use std::sync::Arc;

use sqlx::PgPool;
use subhook_billing::webhooks::{
    default_registry, EventDispatcher, EventStore, SignatureVerifier, VerificationMode,
    WebhookPipeline,
};
use subhook_billing::{BillingService, CustomerRepository};

use crate::config::Config;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub webhooks: Arc<WebhookPipeline>,
    /// Billing service (only available with a database and Stripe credentials)
    pub billing: Option<Arc<BillingService>>,
}

impl AppState {
    /// Wire the webhook pipeline over `store`, and billing when `pool` is available
    pub fn new(config: Config, store: Arc<dyn EventStore>, pool: Option<PgPool>) -> Self {
        let billing = match (&config.stripe, &pool) {
            (Some(stripe), Some(pool)) => match BillingService::new(stripe.clone(), pool.clone()) {
                Ok(svc) => {
                    tracing::info!("Stripe billing service initialized");
                    Some(Arc::new(svc))
                }
                Err(e) => {
                    tracing::warn!("Stripe billing not configured: {}", e);
                    None
                }
            },
            (Some(_), None) => {
                tracing::warn!("Billing requires DATABASE_URL - billing endpoints disabled");
                None
            }
            (None, _) => {
                tracing::info!("STRIPE_SECRET_KEY not set - billing endpoints disabled");
                None
            }
        };

        let customers = billing
            .as_ref()
            .and(pool)
            .map(CustomerRepository::new);
        let registry = default_registry(customers);
        tracing::info!(event_types = ?registry.event_types(), "Webhook handlers registered");

        let dispatcher = EventDispatcher::new(store, Arc::new(registry), config.webhook.dispatch);

        let mode = match &config.webhook.secret {
            Some(secret) => VerificationMode::Signed(SignatureVerifier::new(
                secret.as_bytes(),
                config.webhook.tolerance_seconds,
            )),
            None => VerificationMode::Unverified,
        };

        let webhooks = WebhookPipeline::new(mode, Arc::new(dispatcher));
        tracing::info!(
            signed = webhooks.is_verified(),
            tolerance_seconds = config.webhook.tolerance_seconds,
            "Webhook ingestion ready"
        );

        Self {
            config: Arc::new(config),
            webhooks: Arc::new(webhooks),
            billing,
        }
    }
}
