//! Event-type → handler registry
//!
//! The dispatcher never branches on event types itself; the surrounding
//! application plugs business logic in here.

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use super::event::Event;

/// Business logic for one kind of provider event
///
/// Errors are recorded as `handler_error` and logged; they never reach the
/// provider.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> anyhow::Result<()>;
}

/// Adapter so async closures can be registered directly
pub struct FnHandler<F>(F);

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Event) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn handle(&self, event: &Event) -> anyhow::Result<()> {
        (self.0)(event.clone()).await
    }
}

#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `event_type`, replacing any previous handler
    pub fn register(
        &mut self,
        event_type: impl Into<String>,
        handler: Arc<dyn EventHandler>,
    ) -> &mut Self {
        let event_type = event_type.into();
        if self.handlers.insert(event_type.clone(), handler).is_some() {
            tracing::debug!(event_type = %event_type, "Replaced webhook handler");
        }
        self
    }

    /// Register an async closure for `event_type`
    pub fn register_fn<F, Fut>(&mut self, event_type: impl Into<String>, f: F) -> &mut Self
    where
        F: Fn(Event) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register(event_type, Arc::new(FnHandler(f)))
    }

    pub fn handler_for(&self, event_type: &str) -> Option<Arc<dyn EventHandler>> {
        self.handlers.get(event_type).cloned()
    }

    /// Registered event types, sorted
    pub fn event_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("event_types", &self.event_types())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn event(event_type: &str) -> Event {
        Event {
            id: "evt_1".to_string(),
            event_type: event_type.to_string(),
            created: 0,
            payload: serde_json::json!({"object": {}}),
            livemode: false,
            api_version: None,
        }
    }

    #[tokio::test]
    async fn test_lookup_by_event_type() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();

        let mut registry = HandlerRegistry::new();
        registry.register_fn("invoice.paid", move |_event| {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
        });

        assert!(registry.handler_for("invoice.payment_failed").is_none());

        let handler = registry.handler_for("invoice.paid").unwrap();
        handler.handle(&event("invoice.paid")).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_register_replaces_previous_handler() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("customer.created", |_event| async { Ok(()) })
            .register_fn("customer.created", |_event| async {
                Err(anyhow::anyhow!("second"))
            });

        assert_eq!(registry.len(), 1);
        let err = registry
            .handler_for("customer.created")
            .unwrap()
            .handle(&event("customer.created"))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "second");
    }

    #[test]
    fn test_event_types_sorted() {
        let mut registry = HandlerRegistry::new();
        registry
            .register_fn("invoice.paid", |_event| async { Ok(()) })
            .register_fn("customer.created", |_event| async { Ok(()) });

        assert_eq!(
            registry.event_types(),
            vec!["customer.created", "invoice.paid"]
        );
        assert!(!registry.is_empty());
    }
}
