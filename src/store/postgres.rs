//! PostgreSQL order store.
//!
//! Three tables: `orders`, `order_items` (foreign key to `orders`) and
//! `outbox_events`. [`SCHEMA`] holds the DDL; [`PostgresOrderStore::install_schema`]
//! applies it idempotently.

use crate::model::{ItemId, NewOrder, Order, OrderId, OrderItem, OrderStatus, ProductId, UserId};
use crate::outbox::{NewOutboxEvent, OutboxEvent};
use crate::store::{OrderStore, StoreError, StoreTransaction};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{query, Pool, Postgres, Row, Transaction};
use std::time::Duration;
use tracing::{info, instrument};
use uuid::Uuid;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS orders (
    id               UUID PRIMARY KEY,
    user_id          UUID NOT NULL,
    order_number     TEXT NOT NULL,
    status           TEXT NOT NULL,
    total_price      BIGINT NOT NULL,
    quantity         INTEGER NOT NULL,
    payment_method   TEXT NOT NULL,
    shipping_fee     BIGINT NOT NULL,
    shipping_address TEXT NOT NULL,
    ordered_at       TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    paid_at          TIMESTAMPTZ,
    memo             TEXT
);

CREATE TABLE IF NOT EXISTS order_items (
    seq             BIGSERIAL,
    id              UUID PRIMARY KEY,
    order_id        UUID NOT NULL REFERENCES orders (id),
    product_id      UUID NOT NULL,
    product_name    TEXT NOT NULL,
    product_price   BIGINT NOT NULL,
    quantity        INTEGER NOT NULL,
    product_options JSONB
);

CREATE INDEX IF NOT EXISTS order_items_order_idx ON order_items (order_id, seq);

CREATE TABLE IF NOT EXISTS outbox_events (
    id           BIGSERIAL PRIMARY KEY,
    order_id     UUID NOT NULL,
    event_key    TEXT NOT NULL,
    payload      BYTEA NOT NULL,
    created_at   TIMESTAMPTZ NOT NULL DEFAULT CURRENT_TIMESTAMP,
    attempts     INTEGER NOT NULL DEFAULT 0,
    last_error   TEXT,
    delivered_at TIMESTAMPTZ
);

CREATE INDEX IF NOT EXISTS outbox_events_pending_idx ON outbox_events (id) WHERE delivered_at IS NULL;
"#;

const ORDER_COLUMNS: &str = "id, user_id, order_number, status, total_price, quantity, payment_method, \
     shipping_fee, shipping_address, ordered_at, paid_at, memo";

/// Configuration for the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresConfig {
    /// Maximum number of connections in the pool (default: 10)
    pub max_connections: u32,
    /// Timeout for acquiring a connection from the pool (default: 30 seconds)
    pub acquire_timeout: Duration,
    /// Idle timeout for connections in the pool (default: 10 minutes)
    pub idle_timeout: Duration,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PostgresOrderStore {
    pool: Pool<Postgres>,
}

impl PostgresOrderStore {
    pub async fn connect(database_url: &str, config: &PostgresConfig) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .acquire_timeout(config.acquire_timeout)
            .idle_timeout(config.idle_timeout)
            .connect(database_url)
            .await?;
        info!(max_connections = config.max_connections, "Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Wraps an existing pool, e.g. one shared with other components.
    pub fn from_pool(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    pub async fn install_schema(&self) -> Result<(), StoreError> {
        sqlx::raw_sql(SCHEMA).execute(&self.pool).await?;
        info!("Order schema installed");
        Ok(())
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    type Tx = PostgresTransaction;

    async fn begin(&self) -> Result<PostgresTransaction, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PostgresTransaction { tx })
    }

    #[instrument(name = "postgres.list_orders", skip(self))]
    async fn list_orders(&self) -> Result<Vec<Order>, StoreError> {
        let rows = query(&format!("SELECT {ORDER_COLUMNS} FROM orders ORDER BY ordered_at, id"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(order_from_row).collect()
    }

    async fn list_items(&self, order_id: OrderId) -> Result<Vec<OrderItem>, StoreError> {
        let rows = query(
            "SELECT id, order_id, product_id, product_name, product_price, quantity, product_options \
             FROM order_items WHERE order_id = $1 ORDER BY seq",
        )
        .bind(order_id.0)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(item_from_row).collect()
    }

    async fn pending_events(&self, limit: usize) -> Result<Vec<OutboxEvent>, StoreError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let rows = query(
            "SELECT id, order_id, event_key, payload, created_at, attempts, last_error, delivered_at \
             FROM outbox_events WHERE delivered_at IS NULL ORDER BY id LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(event_from_row).collect()
    }

    async fn mark_event_delivered(&self, event_id: i64) -> Result<(), StoreError> {
        query("UPDATE outbox_events SET delivered_at = CURRENT_TIMESTAMP WHERE id = $1")
            .bind(event_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn record_event_failure(&self, event_id: i64, error: &str) -> Result<(), StoreError> {
        query("UPDATE outbox_events SET attempts = attempts + 1, last_error = $2 WHERE id = $1")
            .bind(event_id)
            .bind(error)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn prune_delivered_events(&self) -> Result<u64, StoreError> {
        let result = query("DELETE FROM outbox_events WHERE delivered_at IS NOT NULL")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

/// A live `sqlx` transaction. Dropped without commit, it rolls back.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl StoreTransaction for PostgresTransaction {
    async fn insert_order(&mut self, order: &NewOrder) -> Result<DateTime<Utc>, StoreError> {
        let row = query(
            "INSERT INTO orders (id, user_id, order_number, status, total_price, quantity, payment_method, \
             shipping_fee, shipping_address, ordered_at, paid_at, memo) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, COALESCE($10, CURRENT_TIMESTAMP), $11, $12) \
             RETURNING ordered_at",
        )
        .bind(order.id.0)
        .bind(order.user_id.0)
        .bind(&order.order_number)
        .bind(order.status.as_str())
        .bind(order.total_price)
        .bind(order.quantity)
        .bind(&order.payment_method)
        .bind(order.shipping_fee)
        .bind(&order.shipping_address)
        .bind(order.ordered_at)
        .bind(order.paid_at)
        .bind(&order.memo)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("ordered_at")?)
    }

    async fn insert_item(&mut self, item: &OrderItem) -> Result<(), StoreError> {
        query(
            "INSERT INTO order_items \
             (id, order_id, product_id, product_name, product_price, quantity, product_options) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(item.id.0)
        .bind(item.order_id.0)
        .bind(item.product_id.0)
        .bind(&item.product_name)
        .bind(item.product_price)
        .bind(item.quantity)
        .bind(&item.product_options)
        .execute(&mut *self.tx)
        .await?;
        Ok(())
    }

    async fn order_status(&mut self, order_id: OrderId) -> Result<Option<OrderStatus>, StoreError> {
        let row = query("SELECT status FROM orders WHERE id = $1 FOR UPDATE")
            .bind(order_id.0)
            .fetch_optional(&mut *self.tx)
            .await?;
        match row {
            Some(row) => Ok(Some(parse_status(row.try_get("status")?)?)),
            None => Ok(None),
        }
    }

    async fn affected_product_ids(
        &mut self,
        order_id: OrderId,
    ) -> Result<Vec<ProductId>, StoreError> {
        let rows = query(
            "SELECT product_id FROM order_items WHERE order_id = $1 \
             GROUP BY product_id ORDER BY MIN(seq)",
        )
        .bind(order_id.0)
        .fetch_all(&mut *self.tx)
        .await?;
        rows.iter()
            .map(|row| -> Result<ProductId, StoreError> {
                Ok(ProductId(row.try_get::<Uuid, _>("product_id")?))
            })
            .collect()
    }

    async fn update_status(
        &mut self,
        order_id: OrderId,
        status: OrderStatus,
        at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let result = query(
            "UPDATE orders SET status = $2, \
             paid_at = CASE WHEN $2 = 'paid' AND paid_at IS NULL THEN $3 ELSE paid_at END \
             WHERE id = $1",
        )
        .bind(order_id.0)
        .bind(status.as_str())
        .bind(at)
        .execute(&mut *self.tx)
        .await?;
        Ok(result.rows_affected())
    }

    async fn enqueue_event(&mut self, event: &NewOutboxEvent) -> Result<i64, StoreError> {
        let row = query(
            "INSERT INTO outbox_events (order_id, event_key, payload) VALUES ($1, $2, $3) RETURNING id",
        )
        .bind(event.order_id.0)
        .bind(&event.key)
        .bind(&event.payload)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(row.try_get("id")?)
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

fn parse_status(raw: String) -> Result<OrderStatus, StoreError> {
    raw.parse()
        .map_err(|e: crate::model::UnknownStatus| StoreError::Persistence(e.to_string()))
}

fn order_from_row(row: &PgRow) -> Result<Order, StoreError> {
    Ok(Order {
        id: OrderId(row.try_get("id")?),
        user_id: UserId(row.try_get("user_id")?),
        order_number: row.try_get("order_number")?,
        status: parse_status(row.try_get("status")?)?,
        total_price: row.try_get("total_price")?,
        quantity: row.try_get("quantity")?,
        payment_method: row.try_get("payment_method")?,
        shipping_fee: row.try_get("shipping_fee")?,
        shipping_address: row.try_get("shipping_address")?,
        ordered_at: row.try_get("ordered_at")?,
        paid_at: row.try_get("paid_at")?,
        memo: row.try_get("memo")?,
        items: Vec::new(),
    })
}

fn item_from_row(row: &PgRow) -> Result<OrderItem, StoreError> {
    Ok(OrderItem {
        id: ItemId(row.try_get("id")?),
        order_id: OrderId(row.try_get("order_id")?),
        product_id: ProductId(row.try_get("product_id")?),
        product_name: row.try_get("product_name")?,
        product_price: row.try_get("product_price")?,
        quantity: row.try_get("quantity")?,
        product_options: row.try_get("product_options")?,
    })
}

fn event_from_row(row: &PgRow) -> Result<OutboxEvent, StoreError> {
    let attempts: i32 = row.try_get("attempts")?;
    Ok(OutboxEvent {
        id: row.try_get("id")?,
        order_id: OrderId(row.try_get("order_id")?),
        key: row.try_get("event_key")?,
        payload: row.try_get("payload")?,
        created_at: row.try_get("created_at")?,
        attempts: u32::try_from(attempts).unwrap_or_default(),
        last_error: row.try_get("last_error")?,
        delivered_at: row.try_get("delivered_at")?,
    })
}
