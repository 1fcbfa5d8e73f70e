//! Stripe client wrapper

use std::sync::Arc;

use stripe::Client;

/// Stripe credentials and catalogue settings
#[derive(Clone)]
pub struct StripeConfig {
    pub secret_key: String,
    pub publishable_key: String,
    /// Price (or legacy plan) every new subscription is created on
    pub subscription_price_id: String,
}

impl std::fmt::Debug for StripeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StripeConfig")
            .field("secret_key", &"<redacted>")
            .field("publishable_key", &self.publishable_key)
            .field("subscription_price_id", &self.subscription_price_id)
            .finish()
    }
}

/// Cheaply cloneable handle to the Stripe API
#[derive(Clone)]
pub struct StripeClient {
    inner: Client,
    config: Arc<StripeConfig>,
}

impl StripeClient {
    pub fn new(config: StripeConfig) -> Self {
        let inner = Client::new(config.secret_key.clone());
        Self {
            inner,
            config: Arc::new(config),
        }
    }

    pub fn inner(&self) -> &Client {
        &self.inner
    }

    pub fn config(&self) -> &StripeConfig {
        &self.config
    }
}
