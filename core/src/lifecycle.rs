//! Order lifecycle state machine.
//!
//! ```text
//! ┌─────┐  claim   ┌────────┐  cancel (elapsed <= window)  ┌───────────┐
//! │ New │ ───────▶ │ Booked │ ───────────────────────────▶ │ Cancelled │
//! └─────┘          └────────┘                              └───────────┘
//! ```
//!
//! Transitions are pure: they validate and mutate an [`Order`] in memory. Persisting
//! the result is the caller's job, inside the same transaction that locked the row.

use crate::error::{AllocatorError, Result};
use crate::types::{Order, OrderStatus};
use chrono::{DateTime, Duration, Utc};

/// Default booking window: cancellations are honored for 30 minutes after booking.
pub const DEFAULT_CANCELLATION_WINDOW_SECS: i64 = 30 * 60;

/// Default booking window as a [`Duration`].
#[must_use]
pub fn default_cancellation_window() -> Duration {
    Duration::seconds(DEFAULT_CANCELLATION_WINDOW_SECS)
}

impl Order {
    /// Transition `New → Booked`.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::AlreadyFulfilled`] if the order was booked before
    /// (including orders booked and then cancelled).
    pub fn mark_booked(&mut self, booked_at: DateTime<Utc>) -> Result<()> {
        self.ensure_unfulfilled()?;
        self.status = OrderStatus::Booked { booked_at };
        Ok(())
    }

    /// Guard for the allocator: only `New` orders may claim tickets.
    ///
    /// # Errors
    ///
    /// Returns [`AllocatorError::AlreadyFulfilled`] for any non-`New` order.
    pub fn ensure_unfulfilled(&self) -> Result<()> {
        if self.is_fulfilled() {
            return Err(AllocatorError::AlreadyFulfilled { order_id: self.id });
        }
        Ok(())
    }

    /// Transition `Booked → Cancelled` if `now` is within `window` of the booking.
    ///
    /// The cancel date is the UTC calendar date of `now`. The boundary is
    /// inclusive: an order cancelled exactly `window` after booking is accepted.
    ///
    /// # Errors
    ///
    /// - [`AllocatorError::NotCancellable`] if the order is `New` or already `Cancelled`
    /// - [`AllocatorError::CancellationWindowExpired`] if the window has passed; the
    ///   order is left `Booked`
    pub fn cancel(&mut self, now: DateTime<Utc>, window: Duration) -> Result<()> {
        let OrderStatus::Booked { booked_at } = self.status else {
            return Err(AllocatorError::NotCancellable {
                order_id: self.id,
                status: self.status,
            });
        };

        let elapsed = now - booked_at;
        if elapsed > window {
            return Err(AllocatorError::CancellationWindowExpired {
                order_id: self.id,
                elapsed,
                window,
            });
        }

        self.status = OrderStatus::Cancelled {
            booked_at,
            cancelled_on: now.date_naive(),
        };
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::types::{BuyerId, TicketTypeId};
    use chrono::NaiveDate;

    fn booked_order(booked_at: DateTime<Utc>) -> Order {
        let mut order = Order::new(TicketTypeId::new(), BuyerId::new(), 2);
        order.mark_booked(booked_at).unwrap();
        order
    }

    fn noon() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-14T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn booking_sets_timestamp() {
        let order = booked_order(noon());
        assert_eq!(order.status, OrderStatus::Booked { booked_at: noon() });
        assert!(order.is_fulfilled());
    }

    #[test]
    fn booking_twice_is_a_contract_violation() {
        let mut order = booked_order(noon());
        let err = order.mark_booked(noon()).unwrap_err();
        assert!(matches!(err, AllocatorError::AlreadyFulfilled { .. }));
        assert_eq!(err.kind(), ErrorKind::ContractViolation);
    }

    #[test]
    fn cancel_just_inside_window() {
        let mut order = booked_order(noon());
        let now = noon() + Duration::minutes(29) + Duration::seconds(59);

        order.cancel(now, default_cancellation_window()).unwrap();

        assert_eq!(
            order.status,
            OrderStatus::Cancelled {
                booked_at: noon(),
                cancelled_on: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            }
        );
    }

    #[test]
    fn cancel_exactly_at_window_boundary() {
        let mut order = booked_order(noon());
        let now = noon() + default_cancellation_window();
        assert!(order.cancel(now, default_cancellation_window()).is_ok());
    }

    #[test]
    fn cancel_just_outside_window() {
        let mut order = booked_order(noon());
        let now = noon() + Duration::minutes(30) + Duration::seconds(1);

        let err = order.cancel(now, default_cancellation_window()).unwrap_err();

        assert!(matches!(err, AllocatorError::CancellationWindowExpired { .. }));
        assert_eq!(err.kind(), ErrorKind::BusinessRule);
        assert_eq!(order.status, OrderStatus::Booked { booked_at: noon() });
    }

    #[test]
    fn cancel_new_order_fails() {
        let mut order = Order::new(TicketTypeId::new(), BuyerId::new(), 1);
        let err = order.cancel(noon(), default_cancellation_window()).unwrap_err();
        assert!(matches!(
            err,
            AllocatorError::NotCancellable {
                status: OrderStatus::New,
                ..
            }
        ));
        assert_eq!(order.status, OrderStatus::New);
    }

    #[test]
    fn second_cancel_fails() {
        let mut order = booked_order(noon());
        let now = noon() + Duration::minutes(5);
        order.cancel(now, default_cancellation_window()).unwrap();

        let err = order.cancel(now, default_cancellation_window()).unwrap_err();
        assert!(matches!(err, AllocatorError::NotCancellable { .. }));
        assert!(order.is_cancelled());
    }

    #[test]
    fn cancel_date_uses_utc_calendar_day() {
        let late = DateTime::parse_from_rfc3339("2025-03-14T23:50:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let mut order = booked_order(late);

        order
            .cancel(late + Duration::minutes(20), default_cancellation_window())
            .unwrap();

        assert_eq!(
            order.status.cancelled_on(),
            NaiveDate::from_ymd_opt(2025, 3, 15)
        );
    }

    #[test]
    fn cancelled_order_can_not_be_rebooked() {
        let mut order = booked_order(noon());
        order
            .cancel(noon() + Duration::minutes(1), default_cancellation_window())
            .unwrap();
        assert!(order.mark_booked(noon()).is_err());
    }
}
