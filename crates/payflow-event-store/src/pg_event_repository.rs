//! `PostgreSQL` implementation of the `EventRepository` trait.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use payflow_core::error::DomainError;
use payflow_core::repository::{EventRepository, StoredEvent};

/// PostgreSQL-backed event repository.
///
/// The expected-version check happens inside the append transaction: the
/// stream head row is locked, compared against the caller's expectation, and
/// only then are the new rows inserted. The `UNIQUE (aggregate_id,
/// sequence_number)` constraint backstops races on streams that have no head
/// row to lock yet.
#[derive(Debug, Clone)]
pub struct PgEventRepository {
    pool: PgPool,
}

impl PgEventRepository {
    /// Creates a new `PgEventRepository`.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn stream_head(&self, aggregate_id: Uuid) -> Result<i64, DomainError> {
        let head: Option<(i64,)> = sqlx::query_as(
            "SELECT sequence_number FROM domain_events
             WHERE aggregate_id = $1
             ORDER BY sequence_number DESC
             LIMIT 1",
        )
        .bind(aggregate_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(infra)?;
        Ok(head.map_or(0, |(seq,)| seq))
    }
}

fn infra(err: sqlx::Error) -> DomainError {
    DomainError::Infrastructure(err.to_string())
}

fn row_to_stored_event(row: &PgRow) -> Result<StoredEvent, sqlx::Error> {
    Ok(StoredEvent {
        event_id: row.try_get("event_id")?,
        aggregate_id: row.try_get("aggregate_id")?,
        event_type: row.try_get("event_type")?,
        payload: row.try_get("payload")?,
        sequence_number: row.try_get("sequence_number")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        occurred_at: row.try_get("occurred_at")?,
    })
}

#[async_trait]
impl EventRepository for PgEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        let rows = sqlx::query(
            "SELECT event_id, aggregate_id, event_type, payload, sequence_number,
                    correlation_id, causation_id, occurred_at
             FROM domain_events
             WHERE aggregate_id = $1
             ORDER BY sequence_number ASC",
        )
        .bind(aggregate_id)
        .fetch_all(&self.pool)
        .await
        .map_err(infra)?;

        rows.iter()
            .map(|row| row_to_stored_event(row).map_err(infra))
            .collect()
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
    ) -> Result<(), DomainError> {
        if events.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(infra)?;

        // Lock the stream head so concurrent appends to the same aggregate
        // serialize on this row. A brand-new stream has no row to lock; the
        // unique constraint on (aggregate_id, sequence_number) settles that
        // race below.
        let head: Option<(i64,)> = sqlx::query_as(
            "SELECT sequence_number FROM domain_events
             WHERE aggregate_id = $1
             ORDER BY sequence_number DESC
             LIMIT 1
             FOR UPDATE",
        )
        .bind(aggregate_id)
        .fetch_optional(&mut *tx)
        .await
        .map_err(infra)?;

        let actual = head.map_or(0, |(seq,)| seq);
        if actual != expected_version {
            return Err(DomainError::VersionConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }

        for event in events {
            let insert = sqlx::query(
                "INSERT INTO domain_events
                     (event_id, aggregate_id, event_type, payload, sequence_number,
                      correlation_id, causation_id, occurred_at)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
            )
            .bind(event.event_id)
            .bind(event.aggregate_id)
            .bind(&event.event_type)
            .bind(&event.payload)
            .bind(event.sequence_number)
            .bind(event.correlation_id)
            .bind(event.causation_id)
            .bind(event.occurred_at)
            .execute(&mut *tx)
            .await;

            if let Err(err) = insert {
                let unique_violation = err
                    .as_database_error()
                    .is_some_and(sqlx::error::DatabaseError::is_unique_violation);
                drop(tx);
                if unique_violation {
                    let actual = self.stream_head(aggregate_id).await?;
                    return Err(DomainError::VersionConflict {
                        aggregate_id,
                        expected: expected_version,
                        actual,
                    });
                }
                return Err(infra(err));
            }
        }

        tx.commit().await.map_err(infra)?;
        tracing::debug!(
            aggregate_id = %aggregate_id,
            count = events.len(),
            "appended events"
        );
        Ok(())
    }
}
