use std::collections::BTreeSet;
use std::sync::Arc;

use bus_tracker::alerts::{
    AlertConfig, AlertManager, AlertStore, AlertTriggers, CachedStopDirectory, JsonFileAlertStore,
    MemoryAlertStore, MemoryStopDirectory, SlotNotifier, StopCacheConfig, TokioAlertScheduler,
};
use bus_tracker::domain::{DepartureBoard, StopCode};
use bus_tracker::refresh::{
    RefreshConfig, RefreshController, RefreshEvent, departures_loader, parse_departure_count,
};
use bus_tracker::tracker::{AssumeConnected, TrackerConfig, TrackerEndpoint};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bus_tracker=info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let stop_codes = std::env::args()
        .skip(1)
        .map(StopCode::new)
        .collect::<Result<BTreeSet<_>, _>>()?;
    if stop_codes.is_empty() {
        eprintln!("Usage: bus-tracker <stop code>...");
        return Ok(());
    }

    // Tracker configuration from environment
    let api_key = std::env::var("BUS_TRACKER_API_KEY").unwrap_or_else(|_| {
        warn!("BUS_TRACKER_API_KEY not set. API calls will fail.");
        String::new()
    });
    let mut tracker_config = TrackerConfig::new(api_key);
    if let Ok(base_url) = std::env::var("BUS_TRACKER_BASE_URL") {
        tracker_config = tracker_config.with_base_url(base_url);
    }
    let num_departures =
        parse_departure_count(&std::env::var("BUS_TRACKER_DEPARTURES").unwrap_or_default());
    let auto_refresh = std::env::var("BUS_TRACKER_AUTO_REFRESH")
        .map(|v| matches!(v.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    let endpoint = TrackerEndpoint::from_config(&tracker_config, Arc::new(AssumeConnected))?;

    // Alert engine
    let store: Arc<dyn AlertStore> = match std::env::var("BUS_TRACKER_ALERTS_FILE") {
        Ok(path) => Arc::new(JsonFileAlertStore::new(path)),
        Err(_) => Arc::new(MemoryAlertStore::new()),
    };
    let stop_directory = match std::env::var("BUS_TRACKER_STOPS_FILE") {
        Ok(path) => MemoryStopDirectory::from_json_file(path)?,
        Err(_) => MemoryStopDirectory::default(),
    };
    info!(stops = stop_directory.len(), "stop directory loaded");
    let stops = Arc::new(CachedStopDirectory::new(
        stop_directory,
        &StopCacheConfig::default(),
    ));

    let (scheduler, signals) = TokioAlertScheduler::new();
    let notifier = Arc::new(SlotNotifier::new());
    let manager = AlertManager::new(store, stops, Arc::new(scheduler), AlertConfig::default());
    let triggers = AlertTriggers::new(manager.clone(), endpoint.clone(), notifier);
    tokio::spawn(triggers.run(signals));

    let restored = manager.restore().await?;
    if restored > 0 {
        info!(restored, "alerts restored");
    }

    // Optional time alert on the first stop, e.g. BUS_TRACKER_ALERT_LEAD=5
    // with BUS_TRACKER_ALERT_SERVICES=22,3
    if let Ok(lead) = std::env::var("BUS_TRACKER_ALERT_LEAD")
        && let Some(first_stop) = stop_codes.first()
    {
        let lead_minutes: u32 = lead.trim().parse()?;
        let services: BTreeSet<String> = std::env::var("BUS_TRACKER_ALERT_SERVICES")
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        manager
            .add_time_alert(first_stop.clone(), services, lead_minutes)
            .await?;
        println!("Time alert set for stop {first_stop}, {lead_minutes} minutes ahead");
    }

    // Departure board
    let refresh_config = RefreshConfig::default().with_auto_refresh(auto_refresh);
    let loader = departures_loader(endpoint, stop_codes, num_departures);
    let (handle, mut events) = RefreshController::spawn(loader, refresh_config);
    handle.resume();

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                RefreshEvent::Loading => println!("Loading departures..."),
                RefreshEvent::Loaded { data, loaded_at } => {
                    println!("Departures at {}", loaded_at.format("%H:%M:%S"));
                    print_board(&data);
                }
                RefreshEvent::Failed { message, .. } => println!("{message}"),
                RefreshEvent::LastUpdated(_) => {}
            }
        }
    });

    tokio::signal::ctrl_c().await?;
    handle.pause();
    info!("shutting down");
    Ok(())
}

fn print_board(board: &DepartureBoard) {
    if board.is_empty() {
        println!("  No departures.");
        return;
    }
    for (stop_code, at_stop) in board.iter() {
        println!("{} ({stop_code})", at_stop.stop_name().unwrap_or("Unknown stop"));
        for service in at_stop.services() {
            let times: Vec<String> = service
                .departures()
                .iter()
                .map(|d| {
                    let marker = if d.realtime { "" } else { "*" };
                    if d.is_due() {
                        format!("DUE{marker}")
                    } else {
                        format!("{}{marker}", d.minutes)
                    }
                })
                .collect();
            let destination = service
                .next_departure()
                .map(|d| d.destination.as_str())
                .unwrap_or("");
            println!(
                "  {:<5} {:<24} {}",
                service.service_name(),
                destination,
                times.join(", ")
            );
        }
    }
}
