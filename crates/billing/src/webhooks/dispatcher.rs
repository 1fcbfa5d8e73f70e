//! Idempotent event dispatch
//!
//! Each delivery is routed through the store's claim so that a handler runs at
//! most once per event id, no matter how many times (or how concurrently) the
//! provider delivers it. Handler failures are recorded, logged, and swallowed:
//! the provider only needs to know that the event was durably accepted.
//!
//! Dispatch runs in its own task. A dropped request (the provider hung up)
//! therefore never leaves a claim without an outcome or a release.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use super::event::{DispatchReport, Event, Outcome};
use super::registry::{EventHandler, HandlerRegistry};
use super::store::{EventStore, StoreError};

/// Timing knobs for dispatch
#[derive(Debug, Clone, Copy)]
pub struct DispatchSettings {
    /// Upper bound on a single handler invocation
    pub handler_timeout: Duration,
    /// Age after which an unrecorded claim is considered abandoned
    pub claim_timeout: Duration,
    /// How long a duplicate delivery waits for the in-flight one to record.
    /// Must exceed `handler_timeout`, or a legal slow handler leaves its
    /// duplicates without an outcome.
    pub duplicate_wait: Duration,
    pub duplicate_poll_interval: Duration,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            handler_timeout: Duration::from_secs(10),
            claim_timeout: Duration::from_secs(30 * 60),
            // handler_timeout plus headroom for the outcome write
            duplicate_wait: Duration::from_secs(15),
            duplicate_poll_interval: Duration::from_millis(25),
        }
    }
}

/// Why a handler invocation did not succeed
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0:#}")]
    Failed(anyhow::Error),

    #[error("handler timed out after {0:?}")]
    TimedOut(Duration),

    #[error("handler panicked: {0}")]
    Panicked(String),
}

#[derive(Clone)]
pub struct EventDispatcher {
    store: Arc<dyn EventStore>,
    registry: Arc<HandlerRegistry>,
    settings: DispatchSettings,
}

impl EventDispatcher {
    pub fn new(
        store: Arc<dyn EventStore>,
        registry: Arc<HandlerRegistry>,
        settings: DispatchSettings,
    ) -> Self {
        Self {
            store,
            registry,
            settings,
        }
    }

    /// Process one delivery of `event`
    ///
    /// Returns the recorded outcome. A redelivery returns the outcome recorded
    /// the first time, without invoking the handler again.
    ///
    /// The work is detached from the caller: dropping the returned future
    /// does not stop the claim → handler → record sequence.
    pub async fn dispatch(&self, event: &Event) -> Result<DispatchReport, StoreError> {
        let dispatcher = self.clone();
        let owned = event.clone();
        let task = tokio::spawn(async move { dispatcher.dispatch_detached(&owned).await });

        task.await.map_err(|join_err| {
            tracing::error!(
                event_id = %event.id,
                error = %join_err,
                "Webhook dispatch task failed"
            );
            StoreError::Unavailable(format!("dispatch task failed: {}", join_err))
        })?
    }

    async fn dispatch_detached(&self, event: &Event) -> Result<DispatchReport, StoreError> {
        if let Some(existing) = self.store.get(&event.id).await? {
            tracing::info!(
                event_id = %event.id,
                event_type = %event.event_type,
                outcome = %existing.outcome,
                "Duplicate webhook event - returning recorded outcome"
            );
            return Ok(DispatchReport {
                event_id: event.id.clone(),
                outcome: existing.outcome,
                duplicate: true,
            });
        }

        if !self.claim(event).await? {
            return self.await_recorded_outcome(event).await;
        }

        tracing::debug!(
            event_id = %event.id,
            event_type = %event.event_type,
            "Claimed webhook event for processing"
        );

        self.process_claimed(event).await
    }

    async fn claim(&self, event: &Event) -> Result<bool, StoreError> {
        self.store
            .try_claim(&event.id, &event.event_type, self.settings.claim_timeout)
            .await
    }

    /// Another delivery holds the claim; wait for it to record an outcome
    ///
    /// If the holder releases its claim (its store write failed) the claim is
    /// taken over and the event processed here.
    async fn await_recorded_outcome(&self, event: &Event) -> Result<DispatchReport, StoreError> {
        let deadline = Instant::now() + self.settings.duplicate_wait;

        loop {
            if let Some(existing) = self.store.get(&event.id).await? {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = %existing.outcome,
                    "Concurrent duplicate webhook event - returning recorded outcome"
                );
                return Ok(DispatchReport {
                    event_id: event.id.clone(),
                    outcome: existing.outcome,
                    duplicate: true,
                });
            }

            if self.claim(event).await? {
                tracing::info!(
                    event_id = %event.id,
                    "Webhook claim released by previous holder - processing here"
                );
                return self.process_claimed(event).await;
            }

            if Instant::now() >= deadline {
                // Nothing recorded yet: make the provider retry later
                tracing::warn!(
                    event_id = %event.id,
                    waited_ms = self.settings.duplicate_wait.as_millis() as u64,
                    "Webhook claim still pending after duplicate wait"
                );
                return Err(StoreError::Unavailable(format!(
                    "event {} still being processed by another delivery after {:?}",
                    event.id, self.settings.duplicate_wait
                )));
            }

            tokio::time::sleep(self.settings.duplicate_poll_interval).await;
        }
    }

    async fn process_claimed(&self, event: &Event) -> Result<DispatchReport, StoreError> {
        let (outcome, error_message) = match self.registry.handler_for(&event.event_type) {
            None => {
                tracing::info!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    "Received unhandled webhook event type - no handler registered"
                );
                (Outcome::UnrecognizedType, None)
            }
            Some(handler) => match self.invoke(handler, event).await {
                Ok(()) => (Outcome::Success, None),
                Err(e) => {
                    tracing::error!(
                        event_id = %event.id,
                        event_type = %event.event_type,
                        error = %e,
                        "Webhook handler failed"
                    );
                    (Outcome::HandlerError, Some(e.to_string()))
                }
            },
        };

        match self
            .store
            .mark_processed(
                &event.id,
                &event.event_type,
                outcome,
                error_message.as_deref(),
            )
            .await
        {
            Ok(record) => {
                tracing::info!(
                    event_id = %record.event_id,
                    event_type = %record.event_type,
                    outcome = %record.outcome,
                    "Webhook event processed"
                );
                Ok(DispatchReport {
                    event_id: record.event_id,
                    outcome: record.outcome,
                    duplicate: false,
                })
            }
            Err(StoreError::Unavailable(e)) => {
                // Nothing was recorded: let the provider's retry re-claim at once
                if let Err(release_err) = self.store.release_claim(&event.id).await {
                    tracing::warn!(
                        event_id = %event.id,
                        error = %release_err,
                        "Failed to release webhook claim; it will expire after the claim timeout"
                    );
                }
                tracing::error!(
                    event_id = %event.id,
                    event_type = %event.event_type,
                    outcome = %outcome,
                    error = %e,
                    "CRITICAL: Failed to record webhook outcome"
                );
                Err(StoreError::Unavailable(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Run the handler in its own task, bounded by the handler timeout
    ///
    /// A panicking handler is contained by the task boundary; a timed-out one
    /// is aborted.
    async fn invoke(
        &self,
        handler: Arc<dyn EventHandler>,
        event: &Event,
    ) -> Result<(), HandlerError> {
        let owned = event.clone();
        let task = tokio::spawn(async move { handler.handle(&owned).await });
        let abort = task.abort_handle();

        match tokio::time::timeout(self.settings.handler_timeout, task).await {
            Ok(Ok(Ok(()))) => Ok(()),
            Ok(Ok(Err(e))) => Err(HandlerError::Failed(e)),
            Ok(Err(join_err)) => Err(HandlerError::Panicked(join_err.to_string())),
            Err(_) => {
                abort.abort();
                Err(HandlerError::TimedOut(self.settings.handler_timeout))
            }
        }
    }
}
