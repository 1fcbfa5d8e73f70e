//! Stripe webhook ingestion
//!
//! A delivery flows verify → parse → dispatch. The dispatcher deduplicates by
//! event id through the [`EventStore`] claim, so handlers registered in the
//! [`HandlerRegistry`] run at most once per event.

pub mod dispatcher;
pub mod event;
pub mod handlers;
pub mod ingest;
pub mod registry;
pub mod store;
pub mod verify;

pub use dispatcher::{DispatchSettings, EventDispatcher, HandlerError};
pub use event::{DispatchReport, Event, Outcome, ProcessedEventRecord};
pub use handlers::{default_registry, CustomerLinkHandler, LogEventHandler, LOGGED_EVENT_TYPES};
pub use ingest::{IngestError, VerificationMode, WebhookPipeline};
pub use registry::{EventHandler, HandlerRegistry};
pub use store::{EventStore, InMemoryEventStore, PgEventStore, StoreError, StoreResult};
pub use verify::{SignatureVerifier, VerificationError, DEFAULT_TOLERANCE_SECONDS, SIGNATURE_HEADER};
