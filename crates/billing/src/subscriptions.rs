//! Subscription creation and lookup

use stripe::{
    CreateSubscription, CreateSubscriptionItems, CustomerId, Subscription, SubscriptionId,
};

use crate::client::StripeClient;
use crate::error::{BillingError, BillingResult};

/// Expansion the checkout page needs to confirm the first payment
const CHECKOUT_EXPAND: &[&str] = &["latest_invoice.payment_intent"];

pub struct SubscriptionService {
    stripe: StripeClient,
}

impl SubscriptionService {
    pub fn new(stripe: StripeClient) -> Self {
        Self { stripe }
    }

    /// Subscribe `customer_id` to the configured price
    pub async fn create_for_customer(
        &self,
        customer_id: &CustomerId,
    ) -> BillingResult<Subscription> {
        let price_id = &self.stripe.config().subscription_price_id;

        let mut params = CreateSubscription::new(customer_id.clone());
        params.items = Some(vec![CreateSubscriptionItems {
            price: Some(price_id.to_string()),
            quantity: Some(1),
            ..Default::default()
        }]);
        params.expand = CHECKOUT_EXPAND;

        let subscription = Subscription::create(self.stripe.inner(), params)
            .await
            .map_err(|e| {
                tracing::error!(
                    customer_id = %customer_id,
                    price_id = %price_id,
                    error = %e,
                    "Failed to create Stripe subscription"
                );
                e
            })?;

        tracing::info!(
            customer_id = %customer_id,
            subscription_id = %subscription.id,
            status = ?subscription.status,
            "Created subscription"
        );

        Ok(subscription)
    }

    pub async fn retrieve(&self, subscription_id: &str) -> BillingResult<Subscription> {
        let sub_id = parse_subscription_id(subscription_id)?;
        let subscription = Subscription::retrieve(self.stripe.inner(), &sub_id, &[]).await?;
        Ok(subscription)
    }
}

fn parse_subscription_id(subscription_id: &str) -> BillingResult<SubscriptionId> {
    subscription_id
        .parse::<SubscriptionId>()
        .map_err(|e| BillingError::InvalidInput(format!("Invalid subscription ID: {}", e)))
}
