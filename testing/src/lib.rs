//! # Ticket Allocator Testing
//!
//! Testing utilities for the ticket allocator.
//!
//! This crate provides:
//! - Mock implementations of environment traits ([`FixedClock`])
//! - An in-memory inventory store with skip-locked row semantics
//! - Fixture helpers for seeding events and ticket pools
//! - Property-based testing strategies
//!
//! ## Example
//!
//! ```ignore
//! use ticket_allocator_testing::{helpers, InMemoryInventoryStore};
//!
//! #[tokio::test]
//! async fn books_from_fresh_pool() {
//!     let store = InMemoryInventoryStore::new();
//!     let service = helpers::test_service(store);
//!     let pool = helpers::seed_pool(&service, 5).await;
//!
//!     let order = service.create_order(pool.id, BuyerId::new(), 3).await.unwrap();
//!     assert!(service.book_order(order.id).await.unwrap().is_booked());
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod inventory_store;

use chrono::{DateTime, Utc};
use ticket_allocator_core::environment::Clock;

/// Mock implementations of environment traits and the store.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    pub use crate::inventory_store::{InMemoryInventoryStore, InMemoryTransaction};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use ticket_allocator_testing::mocks::FixedClock;
    /// use ticket_allocator_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// let time1 = clock.now();
    /// let time2 = clock.now();
    /// assert_eq!(time1, time2); // Always the same!
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    ///
    /// # Panics
    ///
    /// This function will panic if the hardcoded timestamp fails to parse,
    /// which should never happen in practice.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-01-01T00:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Fixture helpers for seeding inventory.
pub mod helpers {
    use super::mocks::test_clock;
    use std::sync::Arc;
    use ticket_allocator_core::{
        AllocatorConfig, BuyerId, InventoryStore, Order, TicketType, TicketingService,
    };

    /// Name of the event [`seed_pool`] creates.
    pub const TEST_EVENT: &str = "Test Event";

    /// Service over `store` with [`test_clock`] and the default policy.
    #[must_use]
    pub fn test_service<S: InventoryStore>(store: S) -> TicketingService<S> {
        TicketingService::new(
            Arc::new(store),
            Arc::new(test_clock()),
            AllocatorConfig::default(),
        )
    }

    /// Create [`TEST_EVENT`] (if missing) and a fresh ticket type with `quantity` units.
    ///
    /// # Panics
    ///
    /// Panics if the store rejects the fixture.
    #[allow(clippy::expect_used)]
    pub async fn seed_pool<S: InventoryStore>(
        service: &TicketingService<S>,
        quantity: u32,
    ) -> TicketType {
        if service
            .store()
            .find_event_by_name(TEST_EVENT)
            .await
            .expect("event lookup")
            .is_none()
        {
            service
                .create_event(TEST_EVENT, "Fixture event")
                .await
                .expect("create fixture event");
        }

        service
            .create_ticket_type(TEST_EVENT, "General", quantity)
            .await
            .expect("create fixture ticket type")
    }

    /// Place and book an order, asserting it was booked.
    ///
    /// # Panics
    ///
    /// Panics if the order can not be created or is not booked.
    #[allow(clippy::expect_used, clippy::panic)]
    pub async fn book<S: InventoryStore>(
        service: &TicketingService<S>,
        ticket_type: &TicketType,
        quantity: u32,
    ) -> Order {
        let order = service
            .create_order(ticket_type.id, BuyerId::new(), quantity)
            .await
            .expect("create order");
        match service.book_order(order.id).await.expect("book order") {
            ticket_allocator_core::BookingOutcome::Booked { order, .. } => order,
            ticket_allocator_core::BookingOutcome::Unfulfilled(reason) => {
                panic!("expected booking to succeed, got {reason:?}")
            },
        }
    }
}

/// Property-based testing utilities using proptest.
pub mod properties {
    use proptest::prelude::*;

    /// A ticket pool size and a sequence of order quantities drawn against it.
    ///
    /// Quantities include zero and may exceed the pool.
    pub fn pool_and_orders() -> impl Strategy<Value = (u32, Vec<u32>)> {
        (0_u32..40).prop_flat_map(|pool| {
            (
                Just(pool),
                prop::collection::vec(0_u32..=pool.saturating_add(3), 0..24),
            )
        })
    }
}

// Re-export commonly used items
pub use inventory_store::InMemoryInventoryStore;
pub use mocks::{FixedClock, test_clock};
