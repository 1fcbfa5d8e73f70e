//! Bundled event handlers

use async_trait::async_trait;

use super::event::Event;
use super::registry::{EventHandler, HandlerRegistry};
use crate::customer::CustomerRepository;

/// Event types the service acknowledges by logging them
pub const LOGGED_EVENT_TYPES: &[&str] = &[
    "customer.created",
    "customer.updated",
    "invoice.upcoming",
    "invoice.created",
    "invoice.finalized",
    "invoice.payment_succeeded",
    "invoice.payment_failed",
    "customer.subscription.created",
];

/// Logs the event's object and succeeds
pub struct LogEventHandler;

#[async_trait]
impl EventHandler for LogEventHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let object = event.object().cloned().unwrap_or_default();
        tracing::info!(
            event_id = %event.id,
            event_type = %event.event_type,
            livemode = event.livemode,
            object_id = object.get("id").and_then(|v| v.as_str()).unwrap_or(""),
            object = %object,
            "Webhook event received"
        );
        Ok(())
    }
}

/// Records `email → customer id` for customers created outside the checkout flow
pub struct CustomerLinkHandler {
    repo: CustomerRepository,
}

impl CustomerLinkHandler {
    pub fn new(repo: CustomerRepository) -> Self {
        Self { repo }
    }
}

#[async_trait]
impl EventHandler for CustomerLinkHandler {
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        let Some((email, customer_id)) = customer_link_from_event(event) else {
            tracing::info!(
                event_id = %event.id,
                "customer.created without email - nothing to link"
            );
            return Ok(());
        };

        let link = self.repo.insert(&email, &customer_id).await?;
        tracing::info!(
            event_id = %event.id,
            email = %link.email,
            customer_id = %link.customer_id,
            "Customer link recorded from webhook"
        );
        Ok(())
    }
}

/// Pull `(email, customer id)` out of a `customer.*` event
fn customer_link_from_event(event: &Event) -> Option<(String, String)> {
    let object = event.object()?;
    let customer_id = object.get("id")?.as_str()?.trim();
    let email = object.get("email")?.as_str()?.trim();

    if customer_id.is_empty() || email.is_empty() {
        return None;
    }
    Some((email.to_string(), customer_id.to_string()))
}

/// Registry with a logging handler for every type in [`LOGGED_EVENT_TYPES`]
///
/// With a customer repository, `customer.created` also records the customer
/// link instead of only logging.
pub fn default_registry(customers: Option<CustomerRepository>) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    let log = std::sync::Arc::new(LogEventHandler);
    for event_type in LOGGED_EVENT_TYPES {
        registry.register(*event_type, log.clone());
    }

    if let Some(repo) = customers {
        registry.register(
            "customer.created",
            std::sync::Arc::new(CustomerLinkHandler::new(repo)),
        );
    }

    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer_event(object: serde_json::Value) -> Event {
        Event {
            id: "evt_c".to_string(),
            event_type: "customer.created".to_string(),
            created: 0,
            payload: serde_json::json!({ "object": object }),
            livemode: false,
            api_version: None,
        }
    }

    #[test]
    fn test_customer_link_extraction() {
        let event = customer_event(serde_json::json!({
            "id": "cus_123",
            "object": "customer",
            "email": " jenny@example.com "
        }));

        assert_eq!(
            customer_link_from_event(&event),
            Some(("jenny@example.com".to_string(), "cus_123".to_string()))
        );
    }

    #[test]
    fn test_customer_link_requires_email_and_id() {
        for object in [
            serde_json::json!({"id": "cus_123"}),
            serde_json::json!({"id": "cus_123", "email": null}),
            serde_json::json!({"id": "cus_123", "email": ""}),
            serde_json::json!({"email": "jenny@example.com"}),
        ] {
            assert_eq!(customer_link_from_event(&customer_event(object)), None);
        }
    }

    #[test]
    fn test_default_registry_covers_logged_types() {
        let registry = default_registry(None);

        assert_eq!(registry.len(), LOGGED_EVENT_TYPES.len());
        for event_type in LOGGED_EVENT_TYPES {
            assert!(registry.handler_for(event_type).is_some(), "{}", event_type);
        }
        assert!(registry.handler_for("charge.refunded").is_none());
    }

    #[tokio::test]
    async fn test_log_handler_succeeds_without_object() {
        let event = Event {
            payload: serde_json::Value::Null,
            ..customer_event(serde_json::json!({}))
        };
        LogEventHandler.handle(&event).await.unwrap();
    }
}
