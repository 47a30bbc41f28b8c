//! Storage abstraction for ticket inventory.
//!
//! The allocator never talks to a database directly. It needs:
//!
//! - a transactional unit of work with commit/rollback ([`InventoryTransaction`]),
//! - a "lock for update, skip locked, limit N" ticket selection,
//! - atomic bulk insertion of a ticket type's units,
//! - plain reads for reporting.
//!
//! # Implementations
//!
//! - `PostgresInventoryStore` (in `ticket-allocator-postgres`): production, `FOR UPDATE SKIP LOCKED`
//! - `InMemoryInventoryStore` (in `ticket-allocator-testing`): fast, deterministic tests
//!
//! # Thread Safety
//!
//! Stores are shared across concurrent callers, so every returned future is `Send`.

use crate::error::StoreError;
use crate::types::{Event, EventId, Order, OrderId, Ticket, TicketId, TicketType, TicketTypeId};
use std::future::Future;

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Durable store for events, ticket pools, and orders.
pub trait InventoryStore: Send + Sync {
    /// Unit of work type handed out by [`begin`](Self::begin).
    type Transaction: InventoryTransaction;

    /// Start a transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the transaction can not be opened.
    fn begin(&self) -> impl Future<Output = StoreResult<Self::Transaction>> + Send;

    /// Insert an event.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Conflict`] if an event with the same name exists
    /// - [`StoreError::Database`] on query failure
    fn insert_event(&self, event: &Event) -> impl Future<Output = StoreResult<()>> + Send;

    /// Look up an event by its unique name.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn find_event_by_name(
        &self,
        name: &str,
    ) -> impl Future<Output = StoreResult<Option<Event>>> + Send;

    /// Insert a ticket type together with all of its ticket units, atomically.
    ///
    /// Either the type and every unit exist afterwards, or nothing was written.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn insert_ticket_type(
        &self,
        ticket_type: &TicketType,
        tickets: &[Ticket],
    ) -> impl Future<Output = StoreResult<()>> + Send;

    /// Load a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn get_ticket_type(
        &self,
        id: TicketTypeId,
    ) -> impl Future<Output = StoreResult<Option<TicketType>>> + Send;

    /// Count all ticket units of a type.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn count_tickets(&self, id: TicketTypeId) -> impl Future<Output = StoreResult<u32>> + Send;

    /// Count ticket units of a type not held by any order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn count_available_tickets(
        &self,
        id: TicketTypeId,
    ) -> impl Future<Output = StoreResult<u32>> + Send;

    /// Tickets currently held by an order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn tickets_held_by(
        &self,
        order_id: OrderId,
    ) -> impl Future<Output = StoreResult<Vec<TicketId>>> + Send;

    /// Insert a new order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn insert_order(&self, order: &Order) -> impl Future<Output = StoreResult<()>> + Send;

    /// Load an order without locking it.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn get_order(&self, id: OrderId) -> impl Future<Output = StoreResult<Option<Order>>> + Send;

    /// All orders placed against any ticket type of an event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn orders_for_event(
        &self,
        event_id: EventId,
    ) -> impl Future<Output = StoreResult<Vec<Order>>> + Send;

    /// All cancelled orders across every event.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn cancelled_orders(&self) -> impl Future<Output = StoreResult<Vec<Order>>> + Send;
}

/// A unit of work against the inventory.
///
/// Writes become visible to other transactions only after [`commit`](Self::commit).
/// Dropping a transaction without committing discards its writes and releases its locks.
pub trait InventoryTransaction: Send {
    /// Load an order and lock its row until the transaction ends.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn lock_order(
        &mut self,
        id: OrderId,
    ) -> impl Future<Output = StoreResult<Option<Order>>> + Send;

    /// Select up to `limit` unclaimed tickets of a type, locking them.
    ///
    /// Rows already locked by another in-flight transaction are skipped rather
    /// than waited on, so concurrent claimants partition the pool.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn select_free_tickets(
        &mut self,
        ticket_type_id: TicketTypeId,
        limit: u32,
    ) -> impl Future<Output = StoreResult<Vec<TicketId>>> + Send;

    /// Point the given tickets at `order_id`, touching only those still unclaimed.
    ///
    /// Returns the number of tickets actually updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn assign_tickets(
        &mut self,
        tickets: &[TicketId],
        order_id: OrderId,
    ) -> impl Future<Output = StoreResult<u32>> + Send;

    /// Return every ticket held by `order_id` to the pool.
    ///
    /// Returns the number of tickets released.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn release_tickets(&mut self, order_id: OrderId)
    -> impl Future<Output = StoreResult<u32>> + Send;

    /// Persist the order's current status.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] on query failure.
    fn save_order(&mut self, order: &Order) -> impl Future<Output = StoreResult<()>> + Send;

    /// Make every write of this transaction durable and visible.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the commit fails.
    fn commit(self) -> impl Future<Output = StoreResult<()>> + Send;

    /// Discard every write of this transaction.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Database`] if the rollback fails.
    fn rollback(self) -> impl Future<Output = StoreResult<()>> + Send;
}
