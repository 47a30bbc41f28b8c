//! `PostgreSQL` inventory store for the ticket allocator.
//!
//! This crate provides [`PostgresInventoryStore`], the production implementation of
//! the `InventoryStore` trait from `ticket-allocator-core`. It uses sqlx runtime
//! queries and supports:
//!
//! - `FOR UPDATE SKIP LOCKED` ticket selection for concurrent claims
//! - Row-locked order transitions
//! - Embedded schema migrations
//! - Connection pooling configured from the environment
//!
//! # Example
//!
//! ```ignore
//! use ticket_allocator_postgres::{PostgresConfig, PostgresInventoryStore};
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = PostgresInventoryStore::connect(&PostgresConfig::from_env()).await?;
//!     store.migrate().await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod config;
mod store;

pub use config::PostgresConfig;
pub use store::{PostgresInventoryStore, PostgresTransaction};
