//! Read-side aggregation over order snapshots.
//!
//! These are pure functions: the service reads a snapshot of orders from the store
//! (no locks, read skew tolerated) and hands it here.

use crate::error::{AllocatorError, Result};
use crate::types::{Order, OrderStatus};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Cancellation statistics for one event.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct CancellationRate {
    /// Booked + cancelled orders (new orders are not counted)
    pub total_orders: u64,
    /// Cancelled orders
    pub cancelled_orders: u64,
    /// `100 * cancelled / total`, or `0.0` when there are no orders
    pub percentage: f64,
}

/// Summed cancelled ticket quantity for one calendar date.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelledVolume {
    /// Cancellation date
    pub date: NaiveDate,
    /// Total tickets across all orders cancelled that day
    pub tickets: u64,
}

/// Which end of the per-date cancellation volume counts as the "peak".
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeakSelection {
    /// Date with the smallest cancelled volume
    #[default]
    Fewest,
    /// Date with the largest cancelled volume
    Most,
}

impl FromStr for PeakSelection {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fewest" | "min" => Ok(Self::Fewest),
            "most" | "max" => Ok(Self::Most),
            other => Err(format!("Invalid peak selection: {other}")),
        }
    }
}

impl fmt::Display for PeakSelection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fewest => f.write_str("fewest"),
            Self::Most => f.write_str("most"),
        }
    }
}

/// Cancellation rate over the orders of one event.
#[must_use]
#[allow(clippy::cast_precision_loss)] // order counts stay far below 2^52
pub fn cancellation_rate(orders: &[Order]) -> CancellationRate {
    let (booked, cancelled) = orders
        .iter()
        .fold((0_u64, 0_u64), |(booked, cancelled), order| match order.status {
            OrderStatus::New => (booked, cancelled),
            OrderStatus::Booked { .. } => (booked + 1, cancelled),
            OrderStatus::Cancelled { .. } => (booked, cancelled + 1),
        });

    let total_orders = booked + cancelled;
    let percentage = if total_orders == 0 {
        0.0
    } else {
        cancelled as f64 / total_orders as f64 * 100.0
    };

    CancellationRate {
        total_orders,
        cancelled_orders: cancelled,
        percentage,
    }
}

/// Cancelled ticket quantity per date, ascending by date.
///
/// Orders that are not cancelled are ignored.
#[must_use]
pub fn cancelled_volume_by_date(orders: &[Order]) -> Vec<CancelledVolume> {
    let mut by_date: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for order in orders {
        if let Some(date) = order.status.cancelled_on() {
            *by_date.entry(date).or_default() += u64::from(order.quantity);
        }
    }

    by_date
        .into_iter()
        .map(|(date, tickets)| CancelledVolume { date, tickets })
        .collect()
}

/// The date selected by `selection` from the cancelled volume of `orders`.
///
/// Ties resolve to the earliest date.
///
/// # Errors
///
/// Returns [`AllocatorError::NoCancellations`] if no order is cancelled.
pub fn peak_cancellation_date(orders: &[Order], selection: PeakSelection) -> Result<NaiveDate> {
    let volumes = cancelled_volume_by_date(orders);

    // Volumes are date-ascending. `min_by_key` keeps the first minimum while
    // `max_by_key` keeps the last maximum, hence the reverse.
    let peak = match selection {
        PeakSelection::Fewest => volumes.iter().min_by_key(|v| v.tickets),
        PeakSelection::Most => volumes.iter().rev().max_by_key(|v| v.tickets),
    };

    peak.map(|v| v.date).ok_or(AllocatorError::NoCancellations)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;
    use crate::types::{BuyerId, TicketTypeId};
    use chrono::{TimeZone, Utc};

    fn date(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, day).unwrap()
    }

    fn order(status: OrderStatus, quantity: u32) -> Order {
        let mut order = Order::new(TicketTypeId::new(), BuyerId::new(), quantity);
        order.status = status;
        order
    }

    fn booked() -> OrderStatus {
        OrderStatus::Booked {
            booked_at: Utc.with_ymd_and_hms(2025, 6, 1, 10, 0, 0).unwrap(),
        }
    }

    fn cancelled(day: u32) -> OrderStatus {
        OrderStatus::Cancelled {
            booked_at: Utc.with_ymd_and_hms(2025, 6, day, 10, 0, 0).unwrap(),
            cancelled_on: date(day),
        }
    }

    #[test]
    fn rate_with_one_booked_one_cancelled() {
        let orders = vec![order(booked(), 1), order(cancelled(1), 3)];
        let rate = cancellation_rate(&orders);
        assert_eq!(rate.total_orders, 2);
        assert_eq!(rate.cancelled_orders, 1);
        assert_eq!(rate.percentage, 50.0);
    }

    #[test]
    fn rate_without_orders_is_zero() {
        let rate = cancellation_rate(&[]);
        assert_eq!(rate.total_orders, 0);
        assert_eq!(rate.percentage, 0.0);
    }

    #[test]
    fn rate_ignores_new_orders() {
        let orders = vec![
            order(OrderStatus::New, 2),
            order(OrderStatus::New, 1),
            order(cancelled(2), 1),
        ];
        let rate = cancellation_rate(&orders);
        assert_eq!(rate.total_orders, 1);
        assert_eq!(rate.percentage, 100.0);
    }

    #[test]
    fn volume_sums_quantities_per_date() {
        let orders = vec![
            order(cancelled(3), 2),
            order(cancelled(1), 4),
            order(cancelled(3), 5),
            order(booked(), 9),
        ];

        assert_eq!(
            cancelled_volume_by_date(&orders),
            vec![
                CancelledVolume {
                    date: date(1),
                    tickets: 4
                },
                CancelledVolume {
                    date: date(3),
                    tickets: 7
                },
            ]
        );
    }

    #[test]
    fn fewest_picks_smallest_volume() {
        let orders = vec![
            order(cancelled(1), 6),
            order(cancelled(2), 1),
            order(cancelled(3), 3),
        ];
        assert_eq!(
            peak_cancellation_date(&orders, PeakSelection::Fewest).unwrap(),
            date(2)
        );
    }

    #[test]
    fn most_picks_largest_volume() {
        let orders = vec![
            order(cancelled(1), 6),
            order(cancelled(2), 1),
            order(cancelled(2), 1),
            order(cancelled(3), 3),
        ];
        assert_eq!(
            peak_cancellation_date(&orders, PeakSelection::Most).unwrap(),
            date(1)
        );
    }

    #[test]
    fn ties_resolve_to_earliest_date() {
        let orders = vec![order(cancelled(5), 2), order(cancelled(4), 2)];
        assert_eq!(
            peak_cancellation_date(&orders, PeakSelection::Fewest).unwrap(),
            date(4)
        );
        assert_eq!(
            peak_cancellation_date(&orders, PeakSelection::Most).unwrap(),
            date(4)
        );
    }

    #[test]
    fn no_cancellations_is_an_error() {
        let orders = vec![order(booked(), 1)];
        assert!(matches!(
            peak_cancellation_date(&orders, PeakSelection::Fewest),
            Err(AllocatorError::NoCancellations)
        ));
    }

    #[test]
    fn parses_peak_selection() {
        assert_eq!("most".parse::<PeakSelection>().unwrap(), PeakSelection::Most);
        assert_eq!(" Fewest ".parse::<PeakSelection>().unwrap(), PeakSelection::Fewest);
        assert!("median".parse::<PeakSelection>().is_err());
    }
}
