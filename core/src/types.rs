//! Domain types for the ticket inventory allocator.
//!
//! Identifiers are UUID newtypes. The order lifecycle is carried by a single
//! tagged [`OrderStatus`] so an order can never claim to be fulfilled while
//! still being `New`.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            #[doc = concat!("Creates a new random `", stringify!($name), "`")]
            #[must_use]
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            #[doc = concat!("Create a `", stringify!($name), "` from a `Uuid`")]
            #[must_use]
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Get the inner UUID
            #[must_use]
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Unique identifier for an event
    EventId
);
uuid_id!(
    /// Unique identifier for a ticket type
    TicketTypeId
);
uuid_id!(
    /// Unique identifier for a single ticket unit
    TicketId
);
uuid_id!(
    /// Unique identifier for an order
    OrderId
);
uuid_id!(
    /// Opaque identifier for the buyer placing an order.
    ///
    /// Identity and authentication live outside the allocator.
    BuyerId
);

// ============================================================================
// Event / TicketType / Ticket
// ============================================================================

/// An event groups ticket types and is the boundary for cancellation reporting.
///
/// The `name` is unique and serves as the lookup key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Unique event name
    pub name: String,
    /// Free-form description
    pub description: String,
}

impl Event {
    /// Creates a new event with a fresh ID
    #[must_use]
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: EventId::new(),
            name: name.into(),
            description: description.into(),
        }
    }
}

/// A ticket type with a fixed pool of fungible units.
///
/// `quantity` is set at creation and never changes.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketType {
    /// Ticket type ID
    pub id: TicketTypeId,
    /// Owning event
    pub event_id: EventId,
    /// Display name (e.g. "General Admission")
    pub name: String,
    /// Number of ticket units issued at creation
    pub quantity: u32,
}

impl TicketType {
    /// Creates a new ticket type with a fresh ID
    #[must_use]
    pub fn new(event_id: EventId, name: impl Into<String>, quantity: u32) -> Self {
        Self {
            id: TicketTypeId::new(),
            event_id,
            name: name.into(),
            quantity,
        }
    }

    /// Issues the full pool of ticket units for this type, all unclaimed.
    ///
    /// Called exactly once, when the ticket type is created.
    #[must_use]
    pub fn issue_tickets(&self) -> Vec<Ticket> {
        (0..self.quantity)
            .map(|_| Ticket {
                id: TicketId::new(),
                ticket_type_id: self.id,
                order_id: None,
            })
            .collect()
    }
}

/// A single fungible ticket unit.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
    /// Ticket ID
    pub id: TicketId,
    /// Owning ticket type
    pub ticket_type_id: TicketTypeId,
    /// Order currently holding this unit (`None` = available)
    pub order_id: Option<OrderId>,
}

impl Ticket {
    /// Whether the unit is free to be claimed
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.order_id.is_none()
    }
}

// ============================================================================
// Order
// ============================================================================

/// Lifecycle state of an order.
///
/// ```text
/// New ──claim──▶ Booked ──cancel (within window)──▶ Cancelled
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderStatus {
    /// Created, nothing claimed yet
    New,
    /// All requested units claimed
    Booked {
        /// When the claim committed (the order timestamp)
        booked_at: DateTime<Utc>,
    },
    /// Cancelled within the booking window (terminal)
    Cancelled {
        /// When the claim committed
        booked_at: DateTime<Utc>,
        /// Calendar date (UTC) of the cancellation
        cancelled_on: NaiveDate,
    },
}

impl OrderStatus {
    /// Short status code used in storage and logs
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Booked { .. } => "booked",
            Self::Cancelled { .. } => "cancelled",
        }
    }

    /// Booking timestamp, if the order was ever booked
    #[must_use]
    pub const fn booked_at(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::New => None,
            Self::Booked { booked_at } | Self::Cancelled { booked_at, .. } => Some(*booked_at),
        }
    }

    /// Cancellation date, if cancelled
    #[must_use]
    pub const fn cancelled_on(&self) -> Option<NaiveDate> {
        match self {
            Self::Cancelled { cancelled_on, .. } => Some(*cancelled_on),
            _ => None,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A buyer's request for `quantity` units of one ticket type.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    /// Order ID
    pub id: OrderId,
    /// Ticket type the units are drawn from
    pub ticket_type_id: TicketTypeId,
    /// Buyer placing the order
    pub buyer_id: BuyerId,
    /// Requested number of units
    pub quantity: u32,
    /// Lifecycle state
    pub status: OrderStatus,
}

impl Order {
    /// Creates a new, unfulfilled order
    #[must_use]
    pub fn new(ticket_type_id: TicketTypeId, buyer_id: BuyerId, quantity: u32) -> Self {
        Self {
            id: OrderId::new(),
            ticket_type_id,
            buyer_id,
            quantity,
            status: OrderStatus::New,
        }
    }

    /// Whether the order has ever been booked.
    ///
    /// Stays `true` after cancellation.
    #[must_use]
    pub const fn is_fulfilled(&self) -> bool {
        !matches!(self.status, OrderStatus::New)
    }

    /// Whether the order currently holds its tickets as a live booking
    #[must_use]
    pub const fn is_booked(&self) -> bool {
        matches!(self.status, OrderStatus::Booked { .. })
    }

    /// Whether the order was cancelled
    #[must_use]
    pub const fn is_cancelled(&self) -> bool {
        matches!(self.status, OrderStatus::Cancelled { .. })
    }
}
