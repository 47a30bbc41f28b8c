//! Demo configuration.

use serde::{Deserialize, Serialize};
use std::env;
use ticket_allocator_core::AllocatorConfig;
use ticket_allocator_postgres::PostgresConfig;

/// Demo configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database pool settings
    pub postgres: PostgresConfig,
    /// Allocator policy
    pub allocator: AllocatorConfig,
    /// Simulation size
    pub simulation: SimulationConfig,
}

/// How much load the demo generates
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Units issued for the demo ticket type
    pub tickets: u32,
    /// Concurrent buyers
    pub buyers: u32,
    /// Upper bound on each buyer's order quantity
    pub max_quantity: u32,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup.
    ///
    /// `DEMO_TICKETS` (100), `DEMO_BUYERS` (40) and `DEMO_MAX_QUANTITY` (4, at
    /// least 1) size the simulation; the other sections read their own keys.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            postgres: PostgresConfig::from_lookup(&lookup),
            allocator: AllocatorConfig::from_lookup(&lookup),
            simulation: SimulationConfig {
                tickets: lookup("DEMO_TICKETS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(100),
                buyers: lookup("DEMO_BUYERS")
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(40),
                max_quantity: lookup("DEMO_MAX_QUANTITY")
                    .and_then(|s| s.parse().ok())
                    .filter(|n: &u32| *n > 0)
                    .unwrap_or(4),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn simulation_defaults() {
        let config = Config::from_lookup(|_| None);
        assert_eq!(config.simulation.tickets, 100);
        assert_eq!(config.simulation.buyers, 40);
        assert_eq!(config.simulation.max_quantity, 4);
        assert_eq!(config.allocator, AllocatorConfig::default());
    }

    #[test]
    fn reads_every_section() {
        let config = Config::from_lookup(lookup(&[
            ("DEMO_TICKETS", "12"),
            ("DEMO_BUYERS", "7"),
            ("DEMO_MAX_QUANTITY", "2"),
            ("DATABASE_MAX_CONNECTIONS", "3"),
            ("ALLOCATOR_RELEASE_ON_CANCEL", "false"),
        ]));

        assert_eq!(config.simulation.tickets, 12);
        assert_eq!(config.simulation.buyers, 7);
        assert_eq!(config.simulation.max_quantity, 2);
        assert_eq!(config.postgres.max_connections, 3);
        assert!(!config.allocator.release_on_cancel);
    }

    #[test]
    fn zero_max_quantity_is_rejected() {
        let config =
            Config::from_lookup(lookup(&[("DEMO_MAX_QUANTITY", "0"), ("DEMO_BUYERS", "x")]));
        assert_eq!(config.simulation.max_quantity, 4);
        assert_eq!(config.simulation.buyers, 40);
    }
}
