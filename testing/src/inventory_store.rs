//! In-memory inventory store with row-lock semantics.
//!
//! Mirrors what the Postgres store gets from the database:
//!
//! - writes are buffered per transaction and applied on commit,
//! - `select_free_tickets` locks rows and skips rows locked by other transactions,
//! - `lock_order` waits for another transaction's lock on the same order,
//! - dropping an uncommitted transaction releases its locks and discards its writes.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use ticket_allocator_core::store::{InventoryStore, InventoryTransaction, StoreResult};
use ticket_allocator_core::{
    Event, EventId, Order, OrderId, StoreError, Ticket, TicketId, TicketType, TicketTypeId,
};

type TxId = u64;

#[derive(Debug, Default)]
struct Tables {
    events: HashMap<EventId, Event>,
    ticket_types: HashMap<TicketTypeId, TicketType>,
    /// Ordered so ticket selection is deterministic.
    tickets: BTreeMap<TicketId, Ticket>,
    orders: HashMap<OrderId, Order>,
    ticket_locks: HashMap<TicketId, TxId>,
    order_locks: HashMap<OrderId, TxId>,
    next_tx: TxId,
    /// Test hook: tickets to steal from the next `assign_tickets` call.
    pending_interference: u32,
}

impl Tables {
    fn unlock(&mut self, tx: TxId) {
        self.ticket_locks.retain(|_, owner| *owner != tx);
        self.order_locks.retain(|_, owner| *owner != tx);
    }
}

/// In-memory [`InventoryStore`] for tests.
///
/// Clones share the same tables.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryStore {
    tables: Arc<Mutex<Tables>>,
}

fn lock_tables(tables: &Mutex<Tables>) -> MutexGuard<'_, Tables> {
    tables.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryInventoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        lock_tables(&self.tables)
    }

    /// Committed snapshot of every ticket of a type.
    #[must_use]
    pub fn tickets_of_type(&self, ticket_type_id: TicketTypeId) -> Vec<Ticket> {
        self.tables()
            .tickets
            .values()
            .filter(|t| t.ticket_type_id == ticket_type_id)
            .copied()
            .collect()
    }

    /// Number of row locks currently held by open transactions.
    #[must_use]
    pub fn held_locks(&self) -> usize {
        let tables = self.tables();
        tables.ticket_locks.len() + tables.order_locks.len()
    }

    /// Simulate a concurrent writer racing the next claim.
    ///
    /// On the next `assign_tickets` call, the first `steal` selected tickets are
    /// claimed by an unrelated order just before the update runs, so the update
    /// touches fewer rows than were selected.
    pub fn interfere_with_next_assignment(&self, steal: u32) {
        self.tables().pending_interference = steal;
    }
}

impl InventoryStore for InMemoryInventoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        let id = {
            let mut tables = self.tables();
            tables.next_tx += 1;
            tables.next_tx
        };

        Ok(InMemoryTransaction {
            id,
            tables: Arc::clone(&self.tables),
            ticket_writes: BTreeMap::new(),
            order_writes: HashMap::new(),
        })
    }

    async fn insert_event(&self, event: &Event) -> StoreResult<()> {
        let mut tables = self.tables();
        if tables.events.values().any(|e| e.name == event.name) {
            return Err(StoreError::Conflict(format!(
                "event name '{}' already exists",
                event.name
            )));
        }
        tables.events.insert(event.id, event.clone());
        Ok(())
    }

    async fn find_event_by_name(&self, name: &str) -> StoreResult<Option<Event>> {
        Ok(self
            .tables()
            .events
            .values()
            .find(|e| e.name == name)
            .cloned())
    }

    async fn insert_ticket_type(
        &self,
        ticket_type: &TicketType,
        tickets: &[Ticket],
    ) -> StoreResult<()> {
        let mut tables = self.tables();
        if !tables.events.contains_key(&ticket_type.event_id) {
            return Err(StoreError::Database(format!(
                "event {} does not exist",
                ticket_type.event_id
            )));
        }

        tables.ticket_types.insert(ticket_type.id, ticket_type.clone());
        tables
            .tickets
            .extend(tickets.iter().map(|ticket| (ticket.id, *ticket)));
        Ok(())
    }

    async fn get_ticket_type(&self, id: TicketTypeId) -> StoreResult<Option<TicketType>> {
        Ok(self.tables().ticket_types.get(&id).cloned())
    }

    async fn count_tickets(&self, id: TicketTypeId) -> StoreResult<u32> {
        let count = self
            .tables()
            .tickets
            .values()
            .filter(|t| t.ticket_type_id == id)
            .count();
        u32::try_from(count).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn count_available_tickets(&self, id: TicketTypeId) -> StoreResult<u32> {
        let count = self
            .tables()
            .tickets
            .values()
            .filter(|t| t.ticket_type_id == id && t.is_available())
            .count();
        u32::try_from(count).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn tickets_held_by(&self, order_id: OrderId) -> StoreResult<Vec<TicketId>> {
        Ok(self
            .tables()
            .tickets
            .values()
            .filter(|t| t.order_id == Some(order_id))
            .map(|t| t.id)
            .collect())
    }

    async fn insert_order(&self, order: &Order) -> StoreResult<()> {
        let mut tables = self.tables();
        if !tables.ticket_types.contains_key(&order.ticket_type_id) {
            return Err(StoreError::Database(format!(
                "ticket type {} does not exist",
                order.ticket_type_id
            )));
        }
        tables.orders.insert(order.id, order.clone());
        Ok(())
    }

    async fn get_order(&self, id: OrderId) -> StoreResult<Option<Order>> {
        Ok(self.tables().orders.get(&id).cloned())
    }

    async fn orders_for_event(&self, event_id: EventId) -> StoreResult<Vec<Order>> {
        let tables = self.tables();
        Ok(tables
            .orders
            .values()
            .filter(|order| {
                tables
                    .ticket_types
                    .get(&order.ticket_type_id)
                    .is_some_and(|tt| tt.event_id == event_id)
            })
            .cloned()
            .collect())
    }

    async fn cancelled_orders(&self) -> StoreResult<Vec<Order>> {
        Ok(self
            .tables()
            .orders
            .values()
            .filter(|order| order.is_cancelled())
            .cloned()
            .collect())
    }
}

/// Transaction handed out by [`InMemoryInventoryStore`].
#[derive(Debug)]
pub struct InMemoryTransaction {
    id: TxId,
    tables: Arc<Mutex<Tables>>,
    ticket_writes: BTreeMap<TicketId, Option<OrderId>>,
    order_writes: HashMap<OrderId, Order>,
}

impl InMemoryTransaction {
    /// `None` while another transaction holds the order's lock.
    fn try_lock_order(&self, id: OrderId) -> Option<Option<Order>> {
        let mut tables = lock_tables(&self.tables);
        match tables.order_locks.get(&id) {
            Some(owner) if *owner != self.id => None,
            _ => {
                let Some(committed) = tables.orders.get(&id).cloned() else {
                    return Some(None);
                };
                tables.order_locks.insert(id, self.id);
                Some(Some(
                    self.order_writes.get(&id).cloned().unwrap_or(committed),
                ))
            },
        }
    }
}

impl InventoryTransaction for InMemoryTransaction {
    async fn lock_order(&mut self, id: OrderId) -> StoreResult<Option<Order>> {
        loop {
            if let Some(order) = self.try_lock_order(id) {
                return Ok(order);
            }
            tokio::task::yield_now().await;
        }
    }

    async fn select_free_tickets(
        &mut self,
        ticket_type_id: TicketTypeId,
        limit: u32,
    ) -> StoreResult<Vec<TicketId>> {
        let mut tables = lock_tables(&self.tables);
        let limit = usize::try_from(limit).unwrap_or(usize::MAX);

        let selected: Vec<TicketId> = tables
            .tickets
            .values()
            .filter(|t| t.ticket_type_id == ticket_type_id && t.is_available())
            .filter(|t| !self.ticket_writes.contains_key(&t.id))
            .filter(|t| {
                tables
                    .ticket_locks
                    .get(&t.id)
                    .is_none_or(|owner| *owner == self.id)
            })
            .take(limit)
            .map(|t| t.id)
            .collect();

        for id in &selected {
            tables.ticket_locks.insert(*id, self.id);
        }
        Ok(selected)
    }

    async fn assign_tickets(
        &mut self,
        tickets: &[TicketId],
        order_id: OrderId,
    ) -> StoreResult<u32> {
        let mut tables = lock_tables(&self.tables);

        let steal = std::mem::take(&mut tables.pending_interference);
        let thief = OrderId::new();
        for id in tickets.iter().take(usize::try_from(steal).unwrap_or(usize::MAX)) {
            if let Some(ticket) = tables.tickets.get_mut(id) {
                ticket.order_id = Some(thief);
            }
        }

        let mut updated = 0;
        for id in tickets {
            let still_free = tables.tickets.get(id).is_some_and(Ticket::is_available);
            let lockable = tables
                .ticket_locks
                .get(id)
                .is_none_or(|owner| *owner == self.id);
            if still_free && lockable {
                tables.ticket_locks.insert(*id, self.id);
                self.ticket_writes.insert(*id, Some(order_id));
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn release_tickets(&mut self, order_id: OrderId) -> StoreResult<u32> {
        let mut tables = lock_tables(&self.tables);

        let held: Vec<TicketId> = tables
            .tickets
            .values()
            .filter(|t| t.order_id == Some(order_id))
            .map(|t| t.id)
            .collect();

        for id in &held {
            tables.ticket_locks.insert(*id, self.id);
            self.ticket_writes.insert(*id, None);
        }
        u32::try_from(held.len()).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn save_order(&mut self, order: &Order) -> StoreResult<()> {
        self.order_writes.insert(order.id, order.clone());
        Ok(())
    }

    async fn commit(mut self) -> StoreResult<()> {
        let mut tables = lock_tables(&self.tables);

        for (id, order_id) in std::mem::take(&mut self.ticket_writes) {
            if let Some(ticket) = tables.tickets.get_mut(&id) {
                ticket.order_id = order_id;
            }
        }
        for (id, order) in std::mem::take(&mut self.order_writes) {
            tables.orders.insert(id, order);
        }
        tables.unlock(self.id);
        drop(tables);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        // Drop releases the locks.
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        lock_tables(&self.tables).unlock(self.id);
    }
}
