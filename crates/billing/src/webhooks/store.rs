//! Processed-event ledger
//!
//! The store is the only serialization point between concurrent deliveries of
//! the same event, possibly on different replicas. Exclusivity comes from an
//! atomic insert-if-absent on `event_id`, never from a read-then-write check
//! or an in-process lock around dispatch.
//!
//! A row moves through two states:
//!
//! 1. **claimed**: `outcome IS NULL`, written by [`EventStore::try_claim`]
//! 2. **recorded**: `outcome` set by [`EventStore::mark_processed`], final
//!
//! A claim older than `stale_after` is treated as abandoned (the holder
//! crashed between claiming and recording) and can be taken over.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use sqlx::PgPool;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tokio::time::Instant;

use super::event::{Outcome, ProcessedEventRecord};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Conflicting processing state for event {event_id}: {detail}")]
    Conflict { event_id: String, detail: String },

    #[error("Event store unavailable: {0}")]
    Unavailable(String),

    #[error("Event store returned an unreadable record: {0}")]
    Corrupt(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Durable record of every event id seen
#[async_trait]
pub trait EventStore: Send + Sync {
    /// True once an outcome has been recorded for the event
    async fn has_processed(&self, event_id: &str) -> StoreResult<bool>;

    /// The recorded outcome, if any (pending claims are not returned)
    async fn get(&self, event_id: &str) -> StoreResult<Option<ProcessedEventRecord>>;

    /// Atomically claim exclusive processing rights
    ///
    /// Returns `false` if the event is recorded or another delivery holds a
    /// claim younger than `stale_after`.
    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        stale_after: Duration,
    ) -> StoreResult<bool>;

    /// Record the outcome for an event
    ///
    /// Finalizes a pending claim or inserts the record directly. Recording
    /// the same outcome again returns the existing record; a different
    /// outcome fails with [`StoreError::Conflict`].
    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        outcome: Outcome,
        error_message: Option<&str>,
    ) -> StoreResult<ProcessedEventRecord>;

    /// Drop a pending claim so a redelivery can take it immediately
    async fn release_claim(&self, event_id: &str) -> StoreResult<()>;
}

fn conflict(
    event_id: &str,
    existing: Option<&ProcessedEventRecord>,
    attempted: Outcome,
) -> StoreError {
    let detail = match existing {
        Some(record) => format!(
            "already recorded as {}, attempted {}",
            record.outcome, attempted
        ),
        None => format!("claim lost before recording {}", attempted),
    };
    StoreError::Conflict {
        event_id: event_id.to_string(),
        detail,
    }
}

// =============================================================================
// Postgres
// =============================================================================

/// Postgres-backed store over the `processed_events` table
#[derive(Clone)]
pub struct PgEventStore {
    pool: PgPool,
}

#[derive(Debug, sqlx::FromRow)]
struct ProcessedEventRow {
    event_id: String,
    event_type: String,
    outcome: String,
    error_message: Option<String>,
    processed_at: OffsetDateTime,
}

impl TryFrom<ProcessedEventRow> for ProcessedEventRecord {
    type Error = StoreError;

    fn try_from(row: ProcessedEventRow) -> Result<Self, Self::Error> {
        let outcome = row
            .outcome
            .parse::<Outcome>()
            .map_err(|e| StoreError::Corrupt(format!("event {}: {}", row.event_id, e)))?;

        Ok(ProcessedEventRecord {
            event_id: row.event_id,
            event_type: row.event_type,
            outcome,
            error_message: row.error_message,
            processed_at: row.processed_at,
        })
    }
}

impl PgEventStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl EventStore for PgEventStore {
    async fn has_processed(&self, event_id: &str) -> StoreResult<bool> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS(
                SELECT 1 FROM processed_events
                WHERE event_id = $1 AND outcome IS NOT NULL
            )
            "#,
        )
        .bind(event_id)
        .fetch_one(&self.pool)
        .await?;

        Ok(exists)
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<ProcessedEventRecord>> {
        let row: Option<ProcessedEventRow> = sqlx::query_as(
            r#"
            SELECT event_id, event_type, outcome, error_message, processed_at
            FROM processed_events
            WHERE event_id = $1 AND outcome IS NOT NULL
            "#,
        )
        .bind(event_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(ProcessedEventRecord::try_from).transpose()
    }

    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        stale_after: Duration,
    ) -> StoreResult<bool> {
        // Only one concurrent INSERT can win the row; a loser blocks until the
        // winner's statement commits and then sees the conflict. The DO UPDATE
        // branch takes over abandoned claims only.
        let claimed: Option<(String,)> = sqlx::query_as(
            r#"
            INSERT INTO processed_events (event_id, event_type, claimed_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (event_id) DO UPDATE SET
                event_type = EXCLUDED.event_type,
                claimed_at = NOW()
            WHERE processed_events.outcome IS NULL
              AND processed_events.claimed_at < NOW() - make_interval(secs => $3)
            RETURNING event_id
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(stale_after.as_secs_f64())
        .fetch_optional(&self.pool)
        .await?;

        Ok(claimed.is_some())
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        outcome: Outcome,
        error_message: Option<&str>,
    ) -> StoreResult<ProcessedEventRecord> {
        let recorded: Option<ProcessedEventRow> = sqlx::query_as(
            r#"
            INSERT INTO processed_events
                (event_id, event_type, outcome, error_message, claimed_at, processed_at)
            VALUES ($1, $2, $3, $4, NOW(), NOW())
            ON CONFLICT (event_id) DO UPDATE SET
                outcome = EXCLUDED.outcome,
                error_message = EXCLUDED.error_message,
                processed_at = EXCLUDED.processed_at
            WHERE processed_events.outcome IS NULL
            RETURNING event_id, event_type, outcome, error_message, processed_at
            "#,
        )
        .bind(event_id)
        .bind(event_type)
        .bind(outcome.as_str())
        .bind(error_message)
        .fetch_optional(&self.pool)
        .await?;

        if let Some(row) = recorded {
            return ProcessedEventRecord::try_from(row);
        }

        // Already recorded: identical outcome is an idempotent no-op
        match self.get(event_id).await? {
            Some(existing) if existing.outcome == outcome => Ok(existing),
            existing => Err(conflict(event_id, existing.as_ref(), outcome)),
        }
    }

    async fn release_claim(&self, event_id: &str) -> StoreResult<()> {
        sqlx::query("DELETE FROM processed_events WHERE event_id = $1 AND outcome IS NULL")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// In-memory
// =============================================================================

#[derive(Debug, Clone)]
struct Entry {
    event_type: String,
    claimed_at: Instant,
    record: Option<ProcessedEventRecord>,
}

/// Single-process store for local development and tests
///
/// Provides the same claim semantics as [`PgEventStore`], but state is lost on
/// restart and is not shared between replicas.
#[derive(Default)]
pub struct InMemoryEventStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows, pending claims included
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// All recorded outcomes, ordered by event id
    pub async fn records(&self) -> Vec<ProcessedEventRecord> {
        let entries = self.entries.lock().await;
        let mut records: Vec<_> = entries.values().filter_map(|e| e.record.clone()).collect();
        records.sort_by(|a, b| a.event_id.cmp(&b.event_id));
        records
    }
}

#[async_trait]
impl EventStore for InMemoryEventStore {
    async fn has_processed(&self, event_id: &str) -> StoreResult<bool> {
        let entries = self.entries.lock().await;
        Ok(entries.get(event_id).is_some_and(|e| e.record.is_some()))
    }

    async fn get(&self, event_id: &str) -> StoreResult<Option<ProcessedEventRecord>> {
        let entries = self.entries.lock().await;
        Ok(entries.get(event_id).and_then(|e| e.record.clone()))
    }

    async fn try_claim(
        &self,
        event_id: &str,
        event_type: &str,
        stale_after: Duration,
    ) -> StoreResult<bool> {
        let mut entries = self.entries.lock().await;

        match entries.get_mut(event_id) {
            None => {
                entries.insert(
                    event_id.to_string(),
                    Entry {
                        event_type: event_type.to_string(),
                        claimed_at: Instant::now(),
                        record: None,
                    },
                );
                Ok(true)
            }
            Some(entry) if entry.record.is_none() && entry.claimed_at.elapsed() > stale_after => {
                tracing::warn!(
                    event_id = %event_id,
                    held_for_ms = entry.claimed_at.elapsed().as_millis() as u64,
                    "Taking over abandoned webhook claim"
                );
                entry.event_type = event_type.to_string();
                entry.claimed_at = Instant::now();
                Ok(true)
            }
            Some(_) => Ok(false),
        }
    }

    async fn mark_processed(
        &self,
        event_id: &str,
        event_type: &str,
        outcome: Outcome,
        error_message: Option<&str>,
    ) -> StoreResult<ProcessedEventRecord> {
        let mut entries = self.entries.lock().await;

        let entry = entries.entry(event_id.to_string()).or_insert_with(|| Entry {
            event_type: event_type.to_string(),
            claimed_at: Instant::now(),
            record: None,
        });

        match &entry.record {
            Some(existing) if existing.outcome == outcome => Ok(existing.clone()),
            Some(existing) => Err(conflict(event_id, Some(existing), outcome)),
            None => {
                let record = ProcessedEventRecord {
                    event_id: event_id.to_string(),
                    event_type: entry.event_type.clone(),
                    outcome,
                    error_message: error_message.map(str::to_string),
                    processed_at: OffsetDateTime::now_utc(),
                };
                entry.record = Some(record.clone());
                Ok(record)
            }
        }
    }

    async fn release_claim(&self, event_id: &str) -> StoreResult<()> {
        let mut entries = self.entries.lock().await;
        if entries.get(event_id).is_some_and(|e| e.record.is_none()) {
            entries.remove(event_id);
        }
        Ok(())
    }
}
