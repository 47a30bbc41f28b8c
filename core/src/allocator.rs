//! The allocator: atomically claims ticket units for an order.
//!
//! **Concurrency Strategy**: every claim runs in one store transaction that
//!
//! 1. locks the order row and rejects already-fulfilled orders,
//! 2. selects up to `quantity` free tickets with *skip-locked* row locks, so
//!    concurrent claimants partition the pool instead of queueing,
//! 3. assigns them and re-checks that exactly `quantity` rows changed,
//! 4. books the order and commits.
//!
//! Any shortfall rolls the whole transaction back: an order gets its full
//! quantity or nothing. Shortfalls are reported as [`BookingOutcome::Unfulfilled`],
//! never as errors, and are not retried here.

use crate::error::Result;
use crate::store::{InventoryStore, InventoryTransaction};
use crate::types::{Order, OrderId, TicketId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Result of a claim attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    /// The order now holds all requested tickets
    Booked {
        /// The order, in `Booked` state
        order: Order,
        /// Tickets claimed for it
        tickets: Vec<TicketId>,
    },
    /// Nothing was claimed; the order is unchanged
    Unfulfilled(UnfulfilledReason),
}

impl BookingOutcome {
    /// Whether the claim succeeded
    #[must_use]
    pub const fn is_booked(&self) -> bool {
        matches!(self, Self::Booked { .. })
    }
}

/// Why a claim came back empty-handed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnfulfilledReason {
    /// Fewer free tickets than requested (pool exhausted, or the remainder is
    /// locked by in-flight claims)
    InsufficientInventory {
        /// Tickets requested
        requested: u32,
        /// Free, unlocked tickets found
        available: u32,
    },
    /// Tickets were selected but some were claimed by a concurrent transaction
    /// before the update landed
    Contended {
        /// Tickets requested
        requested: u32,
        /// Tickets actually updated
        secured: u32,
    },
}

impl UnfulfilledReason {
    const fn metric_label(self) -> &'static str {
        match self {
            Self::InsufficientInventory { .. } => "insufficient",
            Self::Contended { .. } => "contended",
        }
    }
}

/// Claims ticket units for orders against an [`InventoryStore`].
#[derive(Debug)]
pub struct Allocator<S> {
    store: Arc<S>,
}

impl<S> Clone for Allocator<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
        }
    }
}

impl<S: InventoryStore> Allocator<S> {
    /// Creates an allocator over `store`
    #[must_use]
    pub const fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Claim `order.quantity` tickets for the order, booking it at `now`.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::OrderNotFound`](crate::AllocatorError::OrderNotFound) if the order does not exist
    /// - [`AllocatorError::AlreadyFulfilled`](crate::AllocatorError::AlreadyFulfilled) if the order was booked before
    /// - [`AllocatorError::Store`](crate::AllocatorError::Store) if the store fails; the transaction is rolled back
    pub async fn claim(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<BookingOutcome> {
        let mut tx = self.store.begin().await?;

        let Some(mut order) = tx.lock_order(order_id).await? else {
            tx.rollback().await?;
            return Err(crate::AllocatorError::OrderNotFound(order_id));
        };

        if let Err(error) = order.ensure_unfulfilled() {
            tx.rollback().await?;
            tracing::error!(order_id = %order_id, status = %order.status, "Claim on fulfilled order");
            return Err(error);
        }

        let requested = order.quantity;
        let selected = tx
            .select_free_tickets(order.ticket_type_id, requested)
            .await?;
        let available = u32::try_from(selected.len()).unwrap_or(u32::MAX);

        if available < requested {
            tx.rollback().await?;
            return Ok(Self::unfulfilled(
                &order,
                UnfulfilledReason::InsufficientInventory {
                    requested,
                    available,
                },
            ));
        }

        let secured = tx.assign_tickets(&selected, order.id).await?;
        if secured != requested {
            tx.rollback().await?;
            return Ok(Self::unfulfilled(
                &order,
                UnfulfilledReason::Contended { requested, secured },
            ));
        }

        order.mark_booked(now)?;
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(
            order_id = %order.id,
            ticket_type_id = %order.ticket_type_id,
            quantity = requested,
            "Order booked"
        );
        metrics::counter!("allocator.claims", "outcome" => "booked").increment(1);
        metrics::counter!("allocator.tickets_claimed").increment(u64::from(requested));

        Ok(BookingOutcome::Booked {
            order,
            tickets: selected,
        })
    }

    fn unfulfilled(order: &Order, reason: UnfulfilledReason) -> BookingOutcome {
        tracing::warn!(
            order_id = %order.id,
            ticket_type_id = %order.ticket_type_id,
            ?reason,
            "Order not booked"
        );
        metrics::counter!("allocator.claims", "outcome" => reason.metric_label()).increment(1);
        BookingOutcome::Unfulfilled(reason)
    }
}
