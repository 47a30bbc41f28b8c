//! Application-facing facade over the allocator, lifecycle, and reporting.
//!
//! Presentation layers (HTTP handlers, CLIs) call into [`TicketingService`]; it owns
//! no state of its own beyond the injected store, clock, and policy.

use crate::allocator::{Allocator, BookingOutcome};
use crate::config::AllocatorConfig;
use crate::environment::Clock;
use crate::error::{AllocatorError, Result, StoreError};
use crate::reporting::{self, CancellationRate, CancelledVolume};
use crate::store::{InventoryStore, InventoryTransaction};
use crate::types::{BuyerId, Event, Order, OrderId, TicketType, TicketTypeId};
use chrono::{DateTime, NaiveDate, Utc};
use std::sync::Arc;

/// Ticket inventory operations.
///
/// Cheap to clone; clones share the store and clock.
pub struct TicketingService<S> {
    store: Arc<S>,
    allocator: Allocator<S>,
    clock: Arc<dyn Clock>,
    config: AllocatorConfig,
}

impl<S> Clone for TicketingService<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            allocator: self.allocator.clone(),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
        }
    }
}

impl<S: InventoryStore> TicketingService<S> {
    /// Creates a new `TicketingService`
    #[must_use]
    pub fn new(store: Arc<S>, clock: Arc<dyn Clock>, config: AllocatorConfig) -> Self {
        Self {
            allocator: Allocator::new(Arc::clone(&store)),
            store,
            clock,
            config,
        }
    }

    /// Access the underlying store.
    #[must_use]
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Active policy.
    #[must_use]
    pub const fn config(&self) -> &AllocatorConfig {
        &self.config
    }

    // ========================================================================
    // Inventory setup
    // ========================================================================

    /// Create an event with a unique name.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::EventAlreadyExists`] if the name is taken
    /// - [`AllocatorError::Store`] on store failure
    #[tracing::instrument(skip(self, description))]
    pub async fn create_event(&self, name: &str, description: &str) -> Result<Event> {
        let event = Event::new(name, description);
        match self.store.insert_event(&event).await {
            Ok(()) => {},
            Err(StoreError::Conflict(_)) => {
                return Err(AllocatorError::EventAlreadyExists(name.to_string()));
            },
            Err(e) => return Err(e.into()),
        }

        tracing::info!(event_id = %event.id, "Event created");
        Ok(event)
    }

    /// Create a ticket type under an event, issuing all `quantity` units at once.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::EventNotFound`] if no event has this name
    /// - [`AllocatorError::Store`] on store failure (nothing is written)
    #[tracing::instrument(skip(self))]
    pub async fn create_ticket_type(
        &self,
        event_name: &str,
        name: &str,
        quantity: u32,
    ) -> Result<TicketType> {
        let event = self.find_event(event_name).await?;
        let ticket_type = TicketType::new(event.id, name, quantity);
        let tickets = ticket_type.issue_tickets();

        self.store.insert_ticket_type(&ticket_type, &tickets).await?;

        tracing::info!(ticket_type_id = %ticket_type.id, quantity, "Ticket type created");
        Ok(ticket_type)
    }

    /// Place a new, unbooked order.
    ///
    /// The quantity is not checked against remaining inventory; that happens on booking.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::TicketTypeNotFound`] if the ticket type does not exist
    /// - [`AllocatorError::Store`] on store failure
    #[tracing::instrument(skip(self))]
    pub async fn create_order(
        &self,
        ticket_type_id: TicketTypeId,
        buyer_id: BuyerId,
        quantity: u32,
    ) -> Result<Order> {
        if self.store.get_ticket_type(ticket_type_id).await?.is_none() {
            return Err(AllocatorError::TicketTypeNotFound(ticket_type_id));
        }

        let order = Order::new(ticket_type_id, buyer_id, quantity);
        self.store.insert_order(&order).await?;

        tracing::debug!(order_id = %order.id, "Order created");
        Ok(order)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Claim tickets for an order, booking it at the current clock time.
    ///
    /// Shortfalls come back as [`BookingOutcome::Unfulfilled`]; retrying is up to the caller.
    ///
    /// # Errors
    ///
    /// See [`Allocator::claim`].
    #[tracing::instrument(skip(self))]
    pub async fn book_order(&self, order_id: OrderId) -> Result<BookingOutcome> {
        let now = self.clock.now();
        self.allocator.claim(order_id, now).await
    }

    /// Cancel a booked order as of `now`.
    ///
    /// The order row is locked for the duration. With `release_on_cancel`, its
    /// tickets go back to the pool in the same transaction.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::OrderNotFound`] if the order does not exist
    /// - [`AllocatorError::NotCancellable`] if the order is not `Booked`
    /// - [`AllocatorError::CancellationWindowExpired`] if `now` is past the window
    /// - [`AllocatorError::Store`] on store failure
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, now: DateTime<Utc>) -> Result<Order> {
        let mut tx = self.store.begin().await?;

        let Some(mut order) = tx.lock_order(order_id).await? else {
            tx.rollback().await?;
            return Err(AllocatorError::OrderNotFound(order_id));
        };

        if let Err(error) = order.cancel(now, self.config.cancellation_window()) {
            tx.rollback().await?;
            tracing::warn!(order_id = %order_id, %error, "Cancellation rejected");
            metrics::counter!("allocator.cancellations", "outcome" => "rejected").increment(1);
            return Err(error);
        }

        let released = if self.config.release_on_cancel {
            tx.release_tickets(order.id).await?
        } else {
            0
        };
        tx.save_order(&order).await?;
        tx.commit().await?;

        tracing::info!(order_id = %order.id, released, "Order cancelled");
        metrics::counter!("allocator.cancellations", "outcome" => "cancelled").increment(1);
        Ok(order)
    }

    /// Cancel a booked order as of the current clock time.
    ///
    /// # Errors
    ///
    /// See [`cancel_order`](Self::cancel_order).
    pub async fn cancel_order_now(&self, order_id: OrderId) -> Result<Order> {
        let now = self.clock.now();
        self.cancel_order(order_id, now).await
    }

    /// Load an order.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::OrderNotFound`] if the order does not exist
    /// - [`AllocatorError::Store`] on store failure
    pub async fn get_order(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or(AllocatorError::OrderNotFound(order_id))
    }

    // ========================================================================
    // Reporting
    // ========================================================================

    /// Number of unclaimed units left in a ticket type.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Store`] on store failure.
    pub async fn available_tickets(&self, ticket_type_id: TicketTypeId) -> Result<u32> {
        Ok(self.store.count_available_tickets(ticket_type_id).await?)
    }

    /// Booked vs. cancelled orders across every ticket type of an event.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::EventNotFound`] if no event has this name
    /// - [`AllocatorError::Store`] on store failure
    #[tracing::instrument(skip(self))]
    pub async fn get_cancellation_rate(&self, event_name: &str) -> Result<CancellationRate> {
        let event = self.find_event(event_name).await?;
        let orders = self.store.orders_for_event(event.id).await?;
        let rate = reporting::cancellation_rate(&orders);

        tracing::debug!(
            total = rate.total_orders,
            cancelled = rate.cancelled_orders,
            "Cancellation rate computed"
        );
        Ok(rate)
    }

    /// The cancellation date picked by the configured [`PeakSelection`](crate::PeakSelection).
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::NoCancellations`] if nothing was ever cancelled
    /// - [`AllocatorError::Store`] on store failure
    pub async fn get_peak_cancellation_date(&self) -> Result<NaiveDate> {
        let orders = self.store.cancelled_orders().await?;
        reporting::peak_cancellation_date(&orders, self.config.peak_selection)
    }

    /// Cancelled ticket volume per date, ascending.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::Store`] on store failure.
    pub async fn get_cancelled_volume_by_date(&self) -> Result<Vec<CancelledVolume>> {
        let orders = self.store.cancelled_orders().await?;
        Ok(reporting::cancelled_volume_by_date(&orders))
    }

    async fn find_event(&self, name: &str) -> Result<Event> {
        self.store
            .find_event_by_name(name)
            .await?
            .ok_or_else(|| AllocatorError::EventNotFound(name.to_string()))
    }
}
