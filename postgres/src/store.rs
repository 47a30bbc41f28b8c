//! [`InventoryStore`] over a `PostgreSQL` pool.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::FromRow;
use sqlx::postgres::{PgPool, Postgres};
use ticket_allocator_core::store::{InventoryStore, InventoryTransaction, StoreResult};
use ticket_allocator_core::{
    BuyerId, Event, EventId, Order, OrderId, OrderStatus, StoreError, Ticket, TicketId,
    TicketType, TicketTypeId,
};
use uuid::Uuid;

const ORDER_COLUMNS: &str =
    "id, ticket_type_id, buyer_id, quantity, status, booked_at, cancel_date";

/// `PostgreSQL`-backed inventory store.
///
/// Ticket selection uses `FOR UPDATE SKIP LOCKED`, so concurrent claims on the
/// same ticket type partition the free units instead of queueing behind each other.
///
/// # Example
///
/// ```ignore
/// use ticket_allocator_postgres::{PostgresConfig, PostgresInventoryStore};
///
/// let store = PostgresInventoryStore::connect(&PostgresConfig::from_env()).await?;
/// store.migrate().await?;
/// ```
#[derive(Debug, Clone)]
pub struct PostgresInventoryStore {
    pool: PgPool,
}

impl PostgresInventoryStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connect using `config`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the pool can not connect.
    pub async fn connect(config: &crate::PostgresConfig) -> StoreResult<Self> {
        let pool = config
            .connect()
            .await
            .map_err(|e| StoreError::Database(format!("Failed to connect: {e}")))?;
        Ok(Self::new(pool))
    }

    /// Run the embedded schema migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if a migration fails.
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn fetch_orders(&self, sql: &str, bind: Option<Uuid>) -> StoreResult<Vec<Order>> {
        let query = sqlx::query_as::<_, OrderRow>(sql);
        let query = match bind {
            Some(id) => query.bind(id),
            None => query,
        };
        query
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("load orders"))?
            .into_iter()
            .map(Order::try_from)
            .collect()
    }
}

/// Map a driver error to [`StoreError::Database`], logging and counting it.
fn db_error(operation: &'static str) -> impl FnOnce(sqlx::Error) -> StoreError {
    move |e| {
        tracing::error!(operation, error = %e, "Inventory query failed");
        metrics::counter!("inventory_store.errors", "operation" => operation).increment(1);
        StoreError::Database(format!("Failed to {operation}: {e}"))
    }
}

fn to_i32(value: u32, what: &str) -> StoreResult<i32> {
    i32::try_from(value)
        .map_err(|_| StoreError::Database(format!("{what} {value} exceeds i32::MAX")))
}

fn from_i32(value: i32, what: &str) -> StoreResult<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative {what}: {value}")))
}

fn count_to_u32(count: i64) -> StoreResult<u32> {
    u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("count out of range: {count}")))
}

fn ticket_ids(ids: &[TicketId]) -> Vec<Uuid> {
    ids.iter().map(|id| *id.as_uuid()).collect()
}

#[derive(FromRow)]
struct OrderRow {
    id: Uuid,
    ticket_type_id: Uuid,
    buyer_id: Uuid,
    quantity: i32,
    status: String,
    booked_at: Option<DateTime<Utc>>,
    cancel_date: Option<NaiveDate>,
}

impl TryFrom<OrderRow> for Order {
    type Error = StoreError;

    fn try_from(row: OrderRow) -> StoreResult<Self> {
        let status = match (row.status.as_str(), row.booked_at, row.cancel_date) {
            ("new", None, None) => OrderStatus::New,
            ("booked", Some(booked_at), None) => OrderStatus::Booked { booked_at },
            ("cancelled", Some(booked_at), Some(cancelled_on)) => OrderStatus::Cancelled {
                booked_at,
                cancelled_on,
            },
            (status, ..) => {
                return Err(StoreError::Corrupt(format!(
                    "order {} has inconsistent status '{status}'",
                    row.id
                )));
            },
        };

        Ok(Self {
            id: OrderId::from_uuid(row.id),
            ticket_type_id: TicketTypeId::from_uuid(row.ticket_type_id),
            buyer_id: BuyerId::from_uuid(row.buyer_id),
            quantity: from_i32(row.quantity, "order quantity")?,
            status,
        })
    }
}

impl InventoryStore for PostgresInventoryStore {
    type Transaction = PostgresTransaction;

    async fn begin(&self) -> StoreResult<PostgresTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("start transaction"))?;
        Ok(PostgresTransaction { tx })
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        sqlx::query("INSERT INTO events (id, name, description) VALUES ($1, $2, $3)")
            .bind(event.id.as_uuid())
            .bind(&event.name)
            .bind(&event.description)
            .execute(&self.pool)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(ref db) if db.is_unique_violation() => StoreError::Conflict(
                    format!("event name '{}' already exists", event.name),
                ),
                other => db_error("insert event")(other),
            })?;
        Ok(())
    }

    async fn find_event_by_name(&self, name: &str) -> StoreResult<Option<Event>> {
        let row: Option<(Uuid, String, String)> =
            sqlx::query_as("SELECT id, name, description FROM events WHERE name = $1")
                .bind(name)
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("find event"))?;

        Ok(row.map(|(id, name, description)| Event {
            id: EventId::from_uuid(id),
            name,
            description,
        }))
    }

    async fn insert_ticket_type(
        &self,
        ticket_type: &TicketType,
        tickets: &[Ticket],
    ) -> StoreResult<()> {
        let quantity = to_i32(ticket_type.quantity, "ticket quantity")?;
        let ids: Vec<Uuid> = tickets.iter().map(|t| *t.id.as_uuid()).collect();

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_error("start transaction"))?;

        sqlx::query(
            "INSERT INTO ticket_types (id, event_id, name, quantity) VALUES ($1, $2, $3, $4)",
        )
        .bind(ticket_type.id.as_uuid())
        .bind(ticket_type.event_id.as_uuid())
        .bind(&ticket_type.name)
        .bind(quantity)
        .execute(&mut *tx)
        .await
        .map_err(db_error("insert ticket type"))?;

        sqlx::query("INSERT INTO tickets (id, ticket_type_id) SELECT unnest($1::uuid[]), $2")
            .bind(ids)
            .bind(ticket_type.id.as_uuid())
            .execute(&mut *tx)
            .await
            .map_err(db_error("issue tickets"))?;

        tx.commit().await.map_err(db_error("commit transaction"))?;
        Ok(())
    }

    async fn get_ticket_type(&self, id: TicketTypeId) -> StoreResult<Option<TicketType>> {
        let row: Option<(Uuid, Uuid, String, i32)> =
            sqlx::query_as("SELECT id, event_id, name, quantity FROM ticket_types WHERE id = $1")
                .bind(id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(db_error("load ticket type"))?;

        row.map(|(id, event_id, name, quantity)| {
            Ok(TicketType {
                id: TicketTypeId::from_uuid(id),
                event_id: EventId::from_uuid(event_id),
                name,
                quantity: from_i32(quantity, "ticket quantity")?,
            })
        })
        .transpose()
    }

    async fn count_tickets(&self, id: TicketTypeId) -> StoreResult<u32> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE ticket_type_id = $1")
                .bind(id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(db_error("count tickets"))?;
        count_to_u32(count)
    }

    async fn count_available_tickets(&self, id: TicketTypeId) -> StoreResult<u32> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM tickets WHERE ticket_type_id = $1 AND order_id IS NULL",
        )
        .bind(id.as_uuid())
        .fetch_one(&self.pool)
        .await
        .map_err(db_error("count available tickets"))?;
        count_to_u32(count)
    }

    async fn tickets_held_by(&self, order_id: OrderId) -> StoreResult<Vec<TicketId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as("SELECT id FROM tickets WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(db_error("load held tickets"))?;
        Ok(rows.into_iter().map(|(id,)| TicketId::from_uuid(id)).collect())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        sqlx::query(
            r"
            INSERT INTO orders (id, ticket_type_id, buyer_id, quantity, status, booked_at, cancel_date)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(order.id.as_uuid())
        .bind(order.ticket_type_id.as_uuid())
        .bind(order.buyer_id.as_uuid())
        .bind(to_i32(order.quantity, "order quantity")?)
        .bind(order.status.as_str())
        .bind(order.status.booked_at())
        .bind(order.status.cancelled_on())
        .execute(&self.pool)
        .await
        .map_err(db_error("insert order"))?;
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_error("load order"))?
            .map(Order::try_from)
            .transpose()
    }

    async fn orders_for_event(&self, event_id: EventId) -> StoreResult<Vec<Order>> {
        let sql = format!(
            r"
            SELECT {ORDER_COLUMNS} FROM orders
            WHERE ticket_type_id IN (SELECT id FROM ticket_types WHERE event_id = $1)
            "
        );
        self.fetch_orders(&sql, Some(*event_id.as_uuid())).await
    }

    async fn cancelled_orders(&self) -> StoreResult<Vec<Order>> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders WHERE status = 'cancelled' ORDER BY cancel_date"
        );
        self.fetch_orders(&sql, None).await
    }
}

/// Transaction handed out by [`PostgresInventoryStore`].
///
/// Dropping it without committing rolls back.
pub struct PostgresTransaction {
    tx: sqlx::Transaction<'static, Postgres>,
}

impl InventoryTransaction for PostgresTransaction {
    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1 FOR UPDATE");
        sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_uuid())
            .fetch_optional(&mut *self.tx)
            .await
            .map_err(db_error("lock order"))?
            .map(Order::try_from)
            .transpose()
    }

    async fn select_free_tickets(
        &mut self,
        ticket_type_id: TicketTypeId,
        limit: u32,
    ) -> StoreResult<Vec<TicketId>> {
        let rows: Vec<(Uuid,)> = sqlx::query_as(
            r"
            SELECT id FROM tickets
            WHERE ticket_type_id = $1 AND order_id IS NULL
            LIMIT $2
            FOR UPDATE SKIP LOCKED
            ",
        )
        .bind(ticket_type_id.as_uuid())
        .bind(i64::from(limit))
        .fetch_all(&mut *self.tx)
        .await
        .map_err(db_error("select free tickets"))?;

        Ok(rows.into_iter().map(|(id,)| TicketId::from_uuid(id)).collect())
    }

    async fn assign_tickets(
        &mut self,
        tickets: &[TicketId],
        order_id: OrderId,
    ) -> StoreResult<u32> {
        let result = sqlx::query(
            "UPDATE tickets SET order_id = $1 WHERE id = ANY($2) AND order_id IS NULL",
        )
        .bind(order_id.as_uuid())
        .bind(ticket_ids(tickets))
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("assign tickets"))?;

        u32::try_from(result.rows_affected())
            .map_err(|_| StoreError::Corrupt("assigned row count out of range".to_string()))
    }

    async fn release_tickets(&mut self, order_id: OrderId) -> StoreResult<u32> {
        let result = sqlx::query("UPDATE tickets SET order_id = NULL WHERE order_id = $1")
            .bind(order_id.as_uuid())
            .execute(&mut *self.tx)
            .await
            .map_err(db_error("release tickets"))?;

        tracing::debug!(order_id = %order_id, released = result.rows_affected(), "Tickets released");
        u32::try_from(result.rows_affected())
            .map_err(|_| StoreError::Corrupt("released row count out of range".to_string()))
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        let result = sqlx::query(
            "UPDATE orders SET status = $2, booked_at = $3, cancel_date = $4 WHERE id = $1",
        )
        .bind(order.id.as_uuid())
        .bind(order.status.as_str())
        .bind(order.status.booked_at())
        .bind(order.status.cancelled_on())
        .execute(&mut *self.tx)
        .await
        .map_err(db_error("save order"))?;

        if result.rows_affected() != 1 {
            return Err(StoreError::Database(format!("order {} vanished", order.id)));
        }
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await.map_err(db_error("commit transaction"))
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await.map_err(db_error("roll back transaction"))
    }
}
