//! Error types for allocation, lifecycle, and reporting operations.
//!
//! Allocation shortfalls are *not* errors: they come back as
//! [`BookingOutcome::Unfulfilled`](crate::allocator::BookingOutcome::Unfulfilled).

use crate::types::{OrderId, OrderStatus, TicketTypeId};
use chrono::Duration;
use thiserror::Error;

/// Result type alias for allocator operations.
pub type Result<T> = std::result::Result<T, AllocatorError>;

/// Broad classification of an [`AllocatorError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller bypassed a lifecycle guard (programming error)
    ContractViolation,
    /// A business rule rejected the request; report it to the caller
    BusinessRule,
    /// The backing store failed
    Storage,
}

/// Errors returned by the allocator core.
#[derive(Debug, Error)]
pub enum AllocatorError {
    // ═══════════════════════════════════════════════════════════
    // Contract violations
    // ═══════════════════════════════════════════════════════════

    /// Booking was attempted on an order that was already fulfilled.
    #[error("Order {order_id} already fulfilled")]
    AlreadyFulfilled {
        /// Offending order
        order_id: OrderId,
    },

    /// Cancellation was attempted on an order that is not currently booked.
    #[error("Order {order_id} can not be cancelled (status: {status})")]
    NotCancellable {
        /// Offending order
        order_id: OrderId,
        /// Status the order was in
        status: OrderStatus,
    },

    // ═══════════════════════════════════════════════════════════
    // Business rule violations
    // ═══════════════════════════════════════════════════════════

    /// The booking window has closed.
    #[error(
        "Order {order_id} can not be cancelled {elapsed_minutes} minutes after booking (window: {window_minutes} minutes)",
        elapsed_minutes = .elapsed.num_minutes(),
        window_minutes = .window.num_minutes()
    )]
    CancellationWindowExpired {
        /// Offending order
        order_id: OrderId,
        /// Time since booking
        elapsed: Duration,
        /// Configured window
        window: Duration,
    },

    /// No event exists with the given name.
    #[error("No event by the name '{0}'")]
    EventNotFound(String),

    /// An event with the given name already exists.
    #[error("Event '{0}' already exists")]
    EventAlreadyExists(String),

    /// No such order.
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),

    /// No such ticket type.
    #[error("Ticket type {0} not found")]
    TicketTypeNotFound(TicketTypeId),

    /// There are no cancelled orders to report on.
    #[error("No cancelled orders")]
    NoCancellations,

    // ═══════════════════════════════════════════════════════════
    // Storage
    // ═══════════════════════════════════════════════════════════

    /// The backing store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl AllocatorError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::AlreadyFulfilled { .. } | Self::NotCancellable { .. } => {
                ErrorKind::ContractViolation
            },
            Self::CancellationWindowExpired { .. }
            | Self::EventNotFound(_)
            | Self::EventAlreadyExists(_)
            | Self::OrderNotFound(_)
            | Self::TicketTypeNotFound(_)
            | Self::NoCancellations => ErrorKind::BusinessRule,
            Self::Store(_) => ErrorKind::Storage,
        }
    }
}

/// Errors raised by [`InventoryStore`](crate::store::InventoryStore) implementations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, query, or transaction failure.
    #[error("Database error: {0}")]
    Database(String),

    /// A stored row could not be decoded into a domain value.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A uniqueness constraint was violated.
    #[error("Conflict: {0}")]
    Conflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_errors() {
        let order_id = OrderId::new();
        assert_eq!(
            AllocatorError::AlreadyFulfilled { order_id }.kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(
            AllocatorError::NotCancellable {
                order_id,
                status: OrderStatus::New
            }
            .kind(),
            ErrorKind::ContractViolation
        );
        assert_eq!(
            AllocatorError::EventNotFound("Gala".into()).kind(),
            ErrorKind::BusinessRule
        );
        assert_eq!(
            AllocatorError::from(StoreError::Database("down".into())).kind(),
            ErrorKind::Storage
        );
    }

    #[test]
    fn window_message_reports_minutes() {
        let err = AllocatorError::CancellationWindowExpired {
            order_id: OrderId::new(),
            elapsed: Duration::minutes(45),
            window: Duration::minutes(30),
        };
        let message = err.to_string();
        assert!(message.contains("45 minutes after booking"));
        assert!(message.contains("window: 30 minutes"));
    }
}
