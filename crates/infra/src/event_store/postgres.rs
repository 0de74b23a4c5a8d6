//! Postgres-backed event store.
//!
//! Persists streams in an append-only `events` table with optimistic
//! concurrency enforced at the database level: a unique constraint on
//! `(aggregate_id, sequence_number)` turns a concurrent append into a
//! `Concurrency` error that callers can retry.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool, Postgres, Row, Transaction};
use std::future::Future;
use std::sync::Arc;
use tracing::instrument;

use rentworks_core::{AggregateId, ExpectedVersion};

use super::r#trait::{EventStore, EventStoreError, StoredEvent, UncommittedEvent};

/// Postgres-backed append-only event store.
///
/// The sync `EventStore` trait is bridged onto the async sqlx API: runtime
/// threads shift into a blocking section before driving the query, plain
/// threads (projection worker, discount scheduler) block on the runtime
/// handle captured at construction.
#[derive(Debug, Clone)]
pub struct PostgresEventStore {
    pool: Arc<PgPool>,
    runtime: Option<tokio::runtime::Handle>,
}

impl PostgresEventStore {
    /// Build the store. Must be called inside the tokio runtime so the
    /// captured handle can serve sync trait calls from worker threads.
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            runtime: tokio::runtime::Handle::try_current().ok(),
        }
    }

    /// Drive an async store call to completion from the sync trait.
    ///
    /// On a runtime thread, `block_on` would panic; `block_in_place` hands
    /// the worker's queue off first (multi-thread flavor only). Off the
    /// runtime, the handle captured in `new` drives the future directly.
    fn bridge<F, T>(&self, fut: F) -> Result<T, EventStoreError>
    where
        F: Future<Output = Result<T, EventStoreError>>,
    {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => tokio::task::block_in_place(move || handle.block_on(fut)),
            Err(_) => match self.runtime.as_ref() {
                Some(handle) => handle.block_on(fut),
                None => Err(EventStoreError::InvalidAppend(
                    "PostgresEventStore was built outside a tokio runtime and called off one"
                        .to_string(),
                )),
            },
        }
    }

    /// Load all events for an aggregate stream in sequence number order.
    #[instrument(skip(self), fields(aggregate_id = %aggregate_id.as_uuid()), err)]
    pub async fn load_stream_async(
        &self,
        aggregate_id: AggregateId,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let rows = sqlx::query(
            r#"
            SELECT
                event_id,
                aggregate_id,
                aggregate_type,
                sequence_number,
                event_type,
                event_version,
                occurred_at,
                payload
            FROM events
            WHERE aggregate_id = $1
            ORDER BY sequence_number ASC
            "#,
        )
        .bind(aggregate_id.as_uuid())
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_stream", e))?;

        let mut stored = Vec::with_capacity(rows.len());
        for row in rows {
            let parsed = StoredEventRow::from_row(&row).map_err(|e| {
                EventStoreError::InvalidAppend(format!("failed to deserialize event row: {e}"))
            })?;
            stored.push(parsed.into());
        }

        Ok(stored)
    }

    /// Append events with an optimistic concurrency check, atomically.
    #[instrument(
        skip(self, events),
        fields(event_count = events.len(), expected_version = ?expected_version),
        err
    )]
    pub async fn append_async(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        if events.is_empty() {
            return Ok(vec![]);
        }

        let aggregate_id = events[0].aggregate_id;
        let aggregate_type = events[0].aggregate_type.clone();

        for (idx, e) in events.iter().enumerate() {
            if e.aggregate_id != aggregate_id {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains multiple aggregate_ids (index {idx})"
                )));
            }
            if e.aggregate_type != aggregate_type {
                return Err(EventStoreError::AggregateTypeMismatch(format!(
                    "batch contains multiple aggregate_types (index {idx})"
                )));
            }
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        let (current_version, existing_type) = check_stream_version(&mut tx, aggregate_id).await?;

        if let Some(ref existing) = existing_type
            && existing != &aggregate_type
        {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::AggregateTypeMismatch(format!(
                "stream aggregate_type is '{existing}', attempted append with '{aggregate_type}'"
            )));
        }

        if !expected_version.matches(current_version) {
            tx.rollback()
                .await
                .map_err(|e| map_sqlx_error("rollback", e))?;
            return Err(EventStoreError::Concurrency(format!(
                "expected {expected_version:?}, found {current_version}"
            )));
        }

        let mut committed = Vec::with_capacity(events.len());
        let mut next_sequence = current_version + 1;

        for event in events {
            sqlx::query(
                r#"
                INSERT INTO events (
                    event_id,
                    aggregate_id,
                    aggregate_type,
                    sequence_number,
                    event_type,
                    event_version,
                    occurred_at,
                    payload
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(event.event_id)
            .bind(aggregate_id.as_uuid())
            .bind(&aggregate_type)
            .bind(next_sequence as i64)
            .bind(&event.event_type)
            .bind(event.event_version as i32)
            .bind(event.occurred_at)
            .bind(&event.payload)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    EventStoreError::Concurrency(format!(
                        "concurrent append detected: sequence_number {next_sequence} already exists"
                    ))
                } else {
                    map_sqlx_error("insert_event", e)
                }
            })?;

            committed.push(StoredEvent {
                event_id: event.event_id,
                aggregate_id: event.aggregate_id,
                aggregate_type: event.aggregate_type,
                sequence_number: next_sequence,
                event_type: event.event_type,
                event_version: event.event_version,
                occurred_at: event.occurred_at,
                payload: event.payload,
            });
            next_sequence += 1;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(committed)
    }
}

/// Current version of a stream: `(max sequence_number, aggregate_type)`,
/// `(0, None)` when the stream does not exist.
async fn check_stream_version(
    tx: &mut Transaction<'_, Postgres>,
    aggregate_id: AggregateId,
) -> Result<(u64, Option<String>), EventStoreError> {
    let row = sqlx::query(
        r#"
        SELECT
            COALESCE(MAX(sequence_number), 0) as current_version,
            MAX(aggregate_type) as aggregate_type
        FROM events
        WHERE aggregate_id = $1
        "#,
    )
    .bind(aggregate_id.as_uuid())
    .fetch_one(&mut **tx)
    .await
    .map_err(|e| map_sqlx_error("check_stream_version", e))?;

    let current_version: Option<i64> = row.try_get("current_version").map_err(|e| {
        EventStoreError::InvalidAppend(format!("failed to read current_version: {e}"))
    })?;
    let aggregate_type: Option<String> = row.try_get("aggregate_type").map_err(|e| {
        EventStoreError::InvalidAppend(format!("failed to read aggregate_type: {e}"))
    })?;

    Ok((current_version.unwrap_or(0) as u64, aggregate_type))
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> EventStoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") => EventStoreError::Concurrency(msg),
                _ => EventStoreError::InvalidAppend(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            EventStoreError::InvalidAppend(format!("connection pool closed in {operation}"))
        }
        other => EventStoreError::InvalidAppend(format!("sqlx error in {operation}: {other}")),
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    if let sqlx::Error::Database(db_err) = err
        && let Some(code) = db_err.code()
    {
        return code.as_ref() == "23505";
    }
    false
}

#[derive(Debug)]
struct StoredEventRow {
    event_id: uuid::Uuid,
    aggregate_id: uuid::Uuid,
    aggregate_type: String,
    sequence_number: i64,
    event_type: String,
    event_version: i32,
    occurred_at: DateTime<Utc>,
    payload: serde_json::Value,
}

impl<'r> sqlx::FromRow<'r, sqlx::postgres::PgRow> for StoredEventRow {
    fn from_row(row: &'r sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        Ok(StoredEventRow {
            event_id: row.try_get("event_id")?,
            aggregate_id: row.try_get("aggregate_id")?,
            aggregate_type: row.try_get("aggregate_type")?,
            sequence_number: row.try_get("sequence_number")?,
            event_type: row.try_get("event_type")?,
            event_version: row.try_get("event_version")?,
            occurred_at: row.try_get("occurred_at")?,
            payload: row.try_get("payload")?,
        })
    }
}

impl From<StoredEventRow> for StoredEvent {
    fn from(row: StoredEventRow) -> Self {
        StoredEvent {
            event_id: row.event_id,
            aggregate_id: AggregateId::from_uuid(row.aggregate_id),
            aggregate_type: row.aggregate_type,
            sequence_number: row.sequence_number as u64,
            event_type: row.event_type,
            event_version: row.event_version as u32,
            occurred_at: row.occurred_at,
            payload: row.payload,
        }
    }
}

impl EventStore for PostgresEventStore {
    fn append(
        &self,
        events: Vec<UncommittedEvent>,
        expected_version: ExpectedVersion,
    ) -> Result<Vec<StoredEvent>, EventStoreError> {
        let store = self.clone();
        self.bridge(async move { store.append_async(events, expected_version).await })
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let store = self.clone();
        self.bridge(async move { store.load_stream_async(aggregate_id).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // The pool points at nothing; these tests check the bridge, not the
    // database. A failure must be a connection error, never a missing or
    // stalled runtime.
    fn lazy_store() -> PostgresEventStore {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .acquire_timeout(std::time::Duration::from_millis(100))
            .connect_lazy("postgres://127.0.0.1:9/rentworks")
            .unwrap();
        PostgresEventStore::new(pool)
    }

    #[test]
    fn sync_calls_work_from_plain_worker_threads() {
        let rt = tokio::runtime::Runtime::new().unwrap();
        let store = rt.block_on(async { lazy_store() });

        // Scheduler and projection worker threads have no runtime context of
        // their own; the store falls back to the captured handle.
        let err = std::thread::Builder::new()
            .name("discount-sweep".to_string())
            .spawn(move || store.load_stream(AggregateId::new()).unwrap_err())
            .unwrap()
            .join()
            .unwrap();
        assert!(!err.to_string().contains("runtime"), "{err}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn sync_calls_do_not_panic_on_runtime_threads() {
        let store = lazy_store();
        let err = store.load_stream(AggregateId::new()).unwrap_err();
        assert!(!err.to_string().contains("runtime"), "{err}");
    }
}
