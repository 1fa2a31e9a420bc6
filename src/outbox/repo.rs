use tracing::{debug, error};
use uuid::Uuid;

use crate::db::Executor;
use crate::domain::{Error, Event, NewEvent};

/// Outbox row persistence. Rows are written inside the same transaction as
/// the mutation they describe and are immutable except for `processed_at`.
#[async_trait::async_trait]
pub trait OutboxStore: Send + Sync {
    /// Appends an event, returning its assigned id.
    async fn add_event(&self, db: &mut Executor<'_>, event: &NewEvent) -> Result<Uuid, Error>;

    /// Fetches up to `limit` unprocessed rows, locking each one for the
    /// current transaction and skipping rows other transactions hold, so
    /// concurrent callers always claim disjoint sets. Rows stay claimable
    /// until the transaction that marks them processed commits.
    async fn claim_unprocessed(
        &self,
        db: &mut Executor<'_>,
        limit: i64,
    ) -> Result<Vec<Event>, Error>;

    /// Stamps `processed_at` on a row. Never called outside the transaction
    /// that claimed the row.
    async fn mark_processed(&self, db: &mut Executor<'_>, id: Uuid) -> Result<(), Error>;
}

#[derive(Debug, Clone, Default)]
pub struct PgOutboxStore;

#[async_trait::async_trait]
impl OutboxStore for PgOutboxStore {
    async fn add_event(&self, db: &mut Executor<'_>, event: &NewEvent) -> Result<Uuid, Error> {
        let query = sqlx::query_scalar::<_, Uuid>(
            "INSERT INTO outbox (event_type, payload) VALUES ($1, $2) RETURNING id",
        )
        .bind(event.event_type.as_str())
        .bind(&event.payload);

        let result = match db {
            Executor::Pool(pool) => query.fetch_one(*pool).await,
            Executor::Tx(tx) => query.fetch_one(&mut ***tx).await,
        };

        result.map_err(|err| {
            error!(error = %err, "failed to create outbox event");
            Error::Internal
        })
    }

    async fn claim_unprocessed(
        &self,
        db: &mut Executor<'_>,
        limit: i64,
    ) -> Result<Vec<Event>, Error> {
        let query = sqlx::query_as::<_, Event>(
            r#"
            SELECT id, event_type, payload
            FROM outbox
            WHERE processed_at IS NULL
            FOR UPDATE SKIP LOCKED
            LIMIT $1
            "#,
        )
        .bind(limit);

        let result = match db {
            Executor::Pool(pool) => query.fetch_all(*pool).await,
            Executor::Tx(tx) => query.fetch_all(&mut ***tx).await,
        };

        result.map_err(|err| match err {
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                error!(error = %err, "failed to decode outbox row");
                Error::FailedToProcessData
            }
            _ => {
                debug!(error = %err, "failed to fetch unprocessed outbox events");
                Error::Internal
            }
        })
    }

    async fn mark_processed(&self, db: &mut Executor<'_>, id: Uuid) -> Result<(), Error> {
        let query =
            sqlx::query("UPDATE outbox SET processed_at = now() WHERE id = $1").bind(id);

        let result = match db {
            Executor::Pool(pool) => query.execute(*pool).await,
            Executor::Tx(tx) => query.execute(&mut ***tx).await,
        };

        result.map_err(|err| {
            error!(error = %err, "failed to mark outbox event processed");
            Error::Internal
        })?;
        Ok(())
    }
}
