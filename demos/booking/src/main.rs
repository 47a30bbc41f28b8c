//! Booking simulation.
//!
//! Issues a ticket pool in `PostgreSQL`, lets a crowd of buyers race for it,
//! cancels a share of the winners, and logs the resulting reports.

mod config;

use config::Config;
use rand::Rng;
use std::sync::Arc;
use ticket_allocator_core::{AllocatorError, BookingOutcome, BuyerId, SystemClock, TicketingService};
use ticket_allocator_postgres::PostgresInventoryStore;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EVENT_NAME: &str = "Demo Concert";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "booking_demo=info,ticket_allocator_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    info!(
        tickets = config.simulation.tickets,
        buyers = config.simulation.buyers,
        window_secs = config.allocator.cancellation_window_secs,
        "Configuration loaded"
    );

    let store = PostgresInventoryStore::connect(&config.postgres).await?;
    store.migrate().await?;
    info!("Database ready");

    let service = TicketingService::new(
        Arc::new(store),
        Arc::new(SystemClock),
        config.allocator.clone(),
    );

    match service.create_event(EVENT_NAME, "Booking simulation").await {
        Ok(_) | Err(AllocatorError::EventAlreadyExists(_)) => {},
        Err(e) => return Err(e.into()),
    }
    let ticket_type = service
        .create_ticket_type(EVENT_NAME, "General Admission", config.simulation.tickets)
        .await?;

    // Draw quantities up front; the RNG is not Send.
    let quantities: Vec<u32> = {
        let mut rng = rand::thread_rng();
        (0..config.simulation.buyers)
            .map(|_| rng.gen_range(1..=config.simulation.max_quantity))
            .collect()
    };

    let mut orders = Vec::with_capacity(quantities.len());
    for quantity in quantities {
        orders.push(
            service
                .create_order(ticket_type.id, BuyerId::new(), quantity)
                .await?,
        );
    }

    let handles: Vec<_> = orders
        .into_iter()
        .map(|order| {
            let service = service.clone();
            tokio::spawn(async move { service.book_order(order.id).await })
        })
        .collect();

    let mut booked = Vec::new();
    let mut unfulfilled = 0_usize;
    for result in futures::future::join_all(handles).await {
        match result? {
            Ok(BookingOutcome::Booked { order, .. }) => booked.push(order),
            Ok(BookingOutcome::Unfulfilled(_)) => unfulfilled += 1,
            Err(e) => warn!(error = %e, "Booking failed"),
        }
    }

    let remaining = service.available_tickets(ticket_type.id).await?;
    info!(
        booked = booked.len(),
        unfulfilled,
        remaining,
        "Booking round finished"
    );

    for order in booked.iter().step_by(3) {
        if let Err(e) = service.cancel_order_now(order.id).await {
            warn!(order_id = %order.id, error = %e, "Cancellation failed");
        }
    }

    let rate = service.get_cancellation_rate(EVENT_NAME).await?;
    info!(
        total = rate.total_orders,
        cancelled = rate.cancelled_orders,
        percentage = rate.percentage,
        "Cancellation rate"
    );

    for volume in service.get_cancelled_volume_by_date().await? {
        info!(date = %volume.date, tickets = volume.tickets, "Cancelled volume");
    }

    match service.get_peak_cancellation_date().await {
        Ok(date) => info!(
            %date,
            selection = %config.allocator.peak_selection,
            "Peak cancellation date"
        ),
        Err(AllocatorError::NoCancellations) => info!("No cancellations recorded"),
        Err(e) => return Err(e.into()),
    }

    Ok(())
}
