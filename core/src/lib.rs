//! # Ticket Allocator Core
//!
//! Concurrency-safe ticket inventory allocation.
//!
//! A ticket type owns a fixed pool of fungible ticket units. Orders claim units from
//! that pool atomically and all-or-nothing; booked orders may be cancelled within a
//! bounded window; reporting reads accumulated orders.
//!
//! ## Core Concepts
//!
//! - **Ticket pool**: the units of a [`TicketType`], each free or held by one order
//! - **Allocator**: the skip-locked, count-verified claim ([`allocator`])
//! - **Order lifecycle**: `New → Booked → Cancelled` ([`lifecycle`])
//! - **Reporting**: cancellation rate and peak cancellation date ([`reporting`])
//! - **Store**: the transactional persistence the core runs against ([`store`])
//! - **Environment**: injected dependencies such as the [`Clock`](environment::Clock)
//!
//! ## Example
//!
//! ```ignore
//! use ticket_allocator_core::*;
//!
//! let service = TicketingService::new(store, Arc::new(SystemClock), AllocatorConfig::default());
//!
//! service.create_event("Spring Gala", "Annual fundraiser").await?;
//! let general = service.create_ticket_type("Spring Gala", "General", 100).await?;
//!
//! let order = service.create_order(general.id, BuyerId::new(), 3).await?;
//! match service.book_order(order.id).await? {
//!     BookingOutcome::Booked { tickets, .. } => println!("got {} tickets", tickets.len()),
//!     BookingOutcome::Unfulfilled(reason) => println!("sold out: {reason:?}"),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod allocator;
pub mod config;
pub mod environment;
pub mod error;
pub mod lifecycle;
pub mod reporting;
pub mod service;
pub mod store;
pub mod types;

pub use allocator::{Allocator, BookingOutcome, UnfulfilledReason};
pub use config::AllocatorConfig;
pub use environment::{Clock, SystemClock};
pub use error::{AllocatorError, ErrorKind, Result, StoreError};
pub use reporting::{CancellationRate, CancelledVolume, PeakSelection};
pub use service::TicketingService;
pub use store::{InventoryStore, InventoryTransaction, StoreResult};
pub use types::*;
