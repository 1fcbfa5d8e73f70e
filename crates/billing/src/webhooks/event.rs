//! Webhook event and processing-record types

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A notification delivered by the payment provider
///
/// Deliveries are at-least-once: two deliveries carrying the same `id` are the
/// same logical event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    /// Provider-side unix timestamp
    #[serde(default)]
    pub created: i64,
    /// Type-specific body; the provider's `data` member (`{"object": ...}`)
    #[serde(rename = "data", default)]
    pub payload: serde_json::Value,
    #[serde(default)]
    pub livemode: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

impl Event {
    /// Parse an event from a raw request body
    ///
    /// Returns `None` when the body is not an event or lacks an id/type.
    pub fn from_slice(body: &[u8]) -> Option<Self> {
        let event: Event = serde_json::from_slice(body)
            .map_err(|e| {
                tracing::debug!(error = %e, "Webhook body is not a valid event");
            })
            .ok()?;

        if event.id.trim().is_empty() || event.event_type.trim().is_empty() {
            tracing::debug!("Webhook event missing id or type");
            return None;
        }

        Some(event)
    }

    /// The `data.object` member, if present
    pub fn object(&self) -> Option<&serde_json::Value> {
        self.payload.get("object")
    }
}

/// Recorded result of processing an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// The registered handler completed
    Success,
    /// The registered handler failed, timed out, or panicked
    HandlerError,
    /// No handler is registered for the event type
    UnrecognizedType,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::HandlerError => "handler_error",
            Outcome::UnrecognizedType => "unrecognized_type",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Outcome::Success),
            "handler_error" => Ok(Outcome::HandlerError),
            "unrecognized_type" => Ok(Outcome::UnrecognizedType),
            other => Err(format!("unknown outcome '{}'", other)),
        }
    }
}

/// Persisted marker for an event that has been processed
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessedEventRecord {
    pub event_id: String,
    pub event_type: String,
    pub outcome: Outcome,
    pub error_message: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub processed_at: OffsetDateTime,
}

/// What the dispatcher did with one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchReport {
    pub event_id: String,
    pub outcome: Outcome,
    /// True when the outcome was recorded by an earlier delivery
    pub duplicate: bool,
}
