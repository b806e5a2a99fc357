use std::sync::Arc;

use autogroup::events::EventBus;
use autogroup::inventory::MemoryAssetStore;
use autogroup::jobs::{Dispatcher, JobContext};
use autogroup::resolver::Resolver;
use autogroup::settings::Settings;
use autogroup::storage::GroupStore;
use autogroup::web;
use clap::Parser;
use miette::Result;
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(
    name = "autogroup",
    version,
    about = "Rule-based asset groups for the datacenter inventory"
)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    // logging
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();

    // load settings
    let settings = Settings::load(&cli.config)?;
    tracing::info!(?settings, "Loaded configuration");

    let store = Arc::new(GroupStore::open(&settings.storage));
    let assets = Arc::new(MemoryAssetStore::load(&settings.inventory.path)?);
    let resolver = Arc::new(Resolver::from_settings(
        store.clone(),
        assets,
        &settings.resolver,
    ));

    let events = EventBus::new();
    spawn_event_log(&events);

    let dispatcher = Dispatcher::new(JobContext::new(store, resolver, events));
    web::serve(&settings, dispatcher).await
}

/// Log every published group notification.
fn spawn_event_log(events: &EventBus) {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => tracing::info!(subject = %event.subject, id = event.id, "Group event"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Group event log lagging behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });
}
