use std::sync::Arc;

use anyhow::Context;
use chrono::NaiveDate;

use booking_intake::api::{BookingApi, HttpBookingApi};
use booking_intake::booking::BookingSession;
use booking_intake::booking::model::{active_services, selectable_slots};
use booking_intake::config::{ApiConfig, SessionConfig};
use booking_intake::error::Result;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let api_config = ApiConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        eprintln!("  export BOOKING_API_URL=http://localhost:3000/api");
        std::process::exit(1);
    });
    let session_config = SessionConfig::from_env()?;

    // Optional: SERVICE_ID [YYYY-MM-DD]
    let mut args = std::env::args().skip(1);
    let service_id = args.next();
    let date = args
        .next()
        .map(|raw| NaiveDate::parse_from_str(&raw, "%Y-%m-%d"))
        .transpose()
        .context("date must be YYYY-MM-DD")?;

    eprintln!("📅 Booking intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", api_config.base_url);
    eprintln!(
        "   Timeout: {}s\n",
        session_config.request_timeout.as_secs()
    );

    run(&api_config, &session_config, service_id, date).await?;
    Ok(())
}

/// Health check, then list services, dates and slots for whatever was
/// selected on the command line.
async fn run(
    api_config: &ApiConfig,
    session_config: &SessionConfig,
    service_id: Option<String>,
    date: Option<NaiveDate>,
) -> Result<()> {
    let api = Arc::new(HttpBookingApi::new(api_config)?);
    api.health().await?;
    tracing::info!("Booking API is reachable");

    let session = BookingSession::new(api, session_config);

    let services = session.fetch_available_services(false).await?;
    println!("Services:");
    for service in active_services(&services) {
        println!(
            "  {:<24} {:<32} {:>4} min  {}",
            service.id, service.name, service.duration_minutes, service.price
        );
    }

    let Some(service_id) = service_id else {
        return Ok(());
    };
    let Some(service) = services.iter().find(|s| s.id == service_id).cloned() else {
        eprintln!("Unknown service '{service_id}'");
        return Ok(());
    };
    session.select_service(service)?;

    let dates = session.fetch_available_dates(false).await?;
    println!("\nAvailable dates for {service_id}:");
    for d in &dates {
        println!("  {d}");
    }

    let Some(date) = date else {
        return Ok(());
    };
    session.select_date(date)?;

    let slots = session.fetch_available_time_slots(false).await?;
    println!("\nTime slots on {date}:");
    for slot in selectable_slots(&slots) {
        println!(
            "  {}-{}  ({})",
            slot.start_time.format("%H:%M"),
            slot.end_time.format("%H:%M"),
            slot.id
        );
    }

    Ok(())
}
