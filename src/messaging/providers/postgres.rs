//! # PostgreSQL Broker
//!
//! Broker backed by a single PostgreSQL table and LISTEN/NOTIFY.
//!
//! - **List queue**: rows in `dualwrite_queue`, ordered by a `BIGSERIAL` id.
//!   `pop_left` deletes the oldest row for a key with `FOR UPDATE SKIP LOCKED`,
//!   so concurrent drainers never receive the same record twice.
//! - **Pub/sub**: `pg_notify(topic, payload)` to publish, a dedicated
//!   `PgListener` connection per subscription. Every listener on the channel,
//!   the publishing process included, receives the notification.
//!
//! pg_notify payloads are limited to 8000 bytes; transition messages are far
//! below that. Delivery is not guaranteed across listener reconnects.

use async_trait::async_trait;
use futures::StreamExt;
use sqlx::postgres::{PgListener, PgPoolOptions};
use sqlx::PgPool;
use tracing::{debug, error, info, instrument};

use crate::constants::PG_QUEUE_TABLE;
use crate::macros::debug_with_pgpool;
use crate::messaging::broker::{Broker, Delivery, Subscription};
use crate::messaging::errors::{BrokerError, BrokerResult};

/// PostgreSQL-backed broker
///
/// # Example
///
/// ```rust,no_run
/// use dualwrite::messaging::{Broker, PgBroker};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let broker = PgBroker::connect("postgresql://localhost/dualwrite", 5).await?;
/// broker.ensure_schema().await?;
///
/// broker.push_right("dualwrite-accounts-production", "{}").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct PgBroker {
    pool: PgPool,
}

debug_with_pgpool!(PgBroker { pool: PgPool });

impl PgBroker {
    /// Connect a new pool to `database_url`
    pub async fn connect(database_url: &str, max_connections: u32) -> BrokerResult<Self> {
        info!("Connecting PostgreSQL broker");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| BrokerError::connection(format!("Failed to connect: {e}")))?;

        info!("PostgreSQL broker connected");
        Ok(Self { pool })
    }

    /// Build on an existing connection pool
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Get a reference to the underlying connection pool
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the queue table and its index if they do not exist
    pub async fn ensure_schema(&self) -> BrokerResult<()> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {PG_QUEUE_TABLE} (
                id BIGSERIAL PRIMARY KEY,
                queue_key TEXT NOT NULL,
                payload TEXT NOT NULL,
                enqueued_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )"
        );
        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS {PG_QUEUE_TABLE}_key_idx ON {PG_QUEUE_TABLE} (queue_key, id)"
        );

        sqlx::query(&create_table).execute(&self.pool).await?;
        sqlx::query(&create_index).execute(&self.pool).await?;

        debug!(table = PG_QUEUE_TABLE, "Broker schema ensured");
        Ok(())
    }
}

#[async_trait]
impl Broker for PgBroker {
    #[instrument(skip(self, payload), fields(queue_key = %queue_key))]
    async fn push_right(&self, queue_key: &str, payload: &str) -> BrokerResult<()> {
        let sql = format!("INSERT INTO {PG_QUEUE_TABLE} (queue_key, payload) VALUES ($1, $2)");

        sqlx::query(&sql)
            .bind(queue_key)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| BrokerError::queue_operation(queue_key, "push_right", e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self), fields(queue_key = %queue_key))]
    async fn pop_left(&self, queue_key: &str) -> BrokerResult<Option<String>> {
        let sql = format!(
            "DELETE FROM {PG_QUEUE_TABLE}
             WHERE id = (
                 SELECT id FROM {PG_QUEUE_TABLE}
                 WHERE queue_key = $1
                 ORDER BY id
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING payload"
        );

        sqlx::query_scalar::<_, String>(&sql)
            .bind(queue_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| BrokerError::queue_operation(queue_key, "pop_left", e.to_string()))
    }

    #[instrument(skip(self, payload), fields(topic = %topic))]
    async fn publish(&self, topic: &str, payload: &str) -> BrokerResult<()> {
        sqlx::query("SELECT pg_notify($1, $2)")
            .bind(topic)
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                error!("Failed to send notification to channel {}: {}", topic, e);
                BrokerError::publish(topic, e.to_string())
            })?;

        debug!("Sent notification to channel: {}", topic);
        Ok(())
    }

    #[instrument(skip(self), fields(topic = %topic))]
    async fn subscribe(&self, topic: &str) -> BrokerResult<Subscription> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(|e| BrokerError::subscribe(topic, e.to_string()))?;

        listener
            .listen(topic)
            .await
            .map_err(|e| BrokerError::subscribe(topic, e.to_string()))?;

        info!("Now listening to channel: {}", topic);

        let deliveries = listener
            .into_stream()
            .take_while(|notification| {
                let keep_going = notification.is_ok();
                if let Err(e) = notification {
                    error!("Connection error in broker listener: {}", e);
                }
                futures::future::ready(keep_going)
            })
            .filter_map(|notification| {
                futures::future::ready(notification.ok().map(|n| Delivery {
                    topic: n.channel().to_string(),
                    payload: n.payload().to_string(),
                }))
            })
            .boxed();

        Ok(Subscription::new(topic, deliveries))
    }

    async fn len(&self, queue_key: &str) -> BrokerResult<usize> {
        let sql = format!("SELECT COUNT(*) FROM {PG_QUEUE_TABLE} WHERE queue_key = $1");

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(queue_key)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| BrokerError::queue_operation(queue_key, "len", e.to_string()))?;

        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn provider_name(&self) -> &'static str {
        "postgres"
    }
}
