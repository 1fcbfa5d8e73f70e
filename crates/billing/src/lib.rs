// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! Subhook Billing Module
//!
//! Stripe integration for the subscription checkout flow and idempotent
//! webhook ingestion.
//!
//! ## Features
//!
//! - **Customers**: Reuse or create Stripe customers, linked by email
//! - **Subscriptions**: Subscribe customers to the configured price
//! - **Webhooks**: Verify, deduplicate, and dispatch Stripe events

pub mod client;
pub mod customer;
pub mod error;
pub mod subscriptions;
pub mod webhooks;


// Client
pub use client::{StripeClient, StripeConfig};

// Customer
pub use customer::{CustomerLink, CustomerRepository, CustomerService};

// Error
pub use error::{BillingError, BillingResult};

// Subscriptions
pub use subscriptions::SubscriptionService;

// Webhooks
pub use webhooks::{
    DispatchSettings, Event, EventDispatcher, EventHandler, EventStore, HandlerRegistry,
    IngestError, InMemoryEventStore, Outcome, PgEventStore, SignatureVerifier, StoreError,
    VerificationError, VerificationMode, WebhookPipeline,
};

use sqlx::PgPool;

/// Billing services backing the checkout endpoints
pub struct BillingService {
    pub customer: CustomerService,
    pub subscriptions: SubscriptionService,
    stripe: StripeClient,
}

impl BillingService {
    /// Create a new billing service with explicit config
    pub fn new(config: StripeConfig, pool: PgPool) -> BillingResult<Self> {
        if config.secret_key.trim().is_empty() {
            return Err(BillingError::Config("STRIPE_SECRET_KEY is empty".to_string()));
        }
        if config.subscription_price_id.trim().is_empty() {
            return Err(BillingError::Config(
                "SUBSCRIPTION_PLAN_ID must be set when billing is enabled".to_string(),
            ));
        }

        let stripe = StripeClient::new(config);

        Ok(Self {
            customer: CustomerService::new(stripe.clone(), pool),
            subscriptions: SubscriptionService::new(stripe.clone()),
            stripe,
        })
    }

    pub fn publishable_key(&self) -> &str {
        &self.stripe.config().publishable_key
    }
}
