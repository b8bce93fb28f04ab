//! The runtime: wires the config store, change watcher, ticket
//! scheduler, and the four periodic services into one cooperative
//! `tokio` task set, then waits for a shutdown signal.
//!
//! Service launch follows the familiar shape: load config, construct
//! collaborators, spawn one task per service, await a combined
//! ctrl-c/SIGTERM future, then shut down — recast here around tick-
//! driven services rather than a long-lived HTTP or plugin host.

use crate::config::{ChangeWatcher, ConfigStore};
use crate::domain::ports::{BacnetStack, DocumentStore};
use crate::domain::{GatewayError, Scheduler};
use crate::services::{
    device_inventory::DeviceInventory, point_inventory::PointInventory, poller::Poller,
    read_tick_settings, remote_config::RemoteConfigReconciler, LoggingSubscriber,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info, warn};

const CHANGE_WATCHER_INTERVAL: Duration = Duration::from_secs(60);
const SCHEDULER_SWEEP_INTERVAL: Duration = Duration::from_secs(10);
const SERVICE_TICK_GRANULARITY: Duration = Duration::from_secs(1);

/// Everything the runtime needs to construct its services. The CLI
/// binary assembles this once at startup; tests can assemble the same
/// shape around a [`crate::adapters::sim_bacnet::SimulatedStack`] and
/// [`crate::adapters::in_memory_store::InMemoryStore`].
pub struct RuntimeConfig {
    pub respath: PathBuf,
    pub tz: String,
    pub nukid: String,
    pub config: Arc<ConfigStore>,
    pub stack: Arc<dyn BacnetStack>,
    pub store: Arc<dyn DocumentStore>,
}

/// Runs every enabled periodic service plus the change watcher and
/// scheduler sweep as independent cooperative tasks until `shutdown`
/// fires, then waits for all of them to reach their next suspension
/// point and return.
pub async fn run(runtime: RuntimeConfig, mut shutdown: watch::Receiver<bool>) -> Result<(), GatewayError> {
    let scheduler = Arc::new(Scheduler::new());
    let watcher = Arc::new(ChangeWatcher::new(&runtime.respath));

    for (section, interests) in [
        ("device-discovery", vec!["enable", "interval", "timeout"]),
        ("point-discovery", vec!["enable", "interval"]),
        ("point-polling", vec!["enable", "interval"]),
    ] {
        runtime.config.subscribe(Arc::new(LoggingSubscriber { section, interests }));
    }

    let mut tasks = Vec::new();

    tasks.push(tokio::spawn(run_change_watcher(
        watcher,
        runtime.config.clone(),
        shutdown.clone(),
    )));

    tasks.push(tokio::spawn(run_scheduler_sweep(scheduler.clone(), shutdown.clone())));

    let device_inventory = Arc::new(DeviceInventory::new(
        runtime.stack.clone(),
        runtime.store.clone(),
        runtime.tz.clone(),
    ));
    tasks.push(tokio::spawn(run_device_discovery(
        device_inventory,
        runtime.config.clone(),
        scheduler.clone(),
        shutdown.clone(),
    )));

    let point_inventory = Arc::new(PointInventory::new(
        runtime.stack.clone(),
        runtime.store.clone(),
        runtime.respath.clone(),
        runtime.tz.clone(),
    ));
    tasks.push(tokio::spawn(run_point_discovery(
        point_inventory,
        runtime.config.clone(),
        scheduler.clone(),
        shutdown.clone(),
    )));

    let poller = Arc::new(Poller::new(
        runtime.stack.clone(),
        runtime.store.clone(),
        runtime.respath.clone(),
        runtime.tz.clone(),
    ));
    tasks.push(tokio::spawn(run_point_polling(
        poller,
        runtime.config.clone(),
        scheduler.clone(),
        shutdown.clone(),
    )));

    let reconciler = Arc::new(RemoteConfigReconciler::new(runtime.store.clone(), runtime.nukid.clone()));
    tasks.push(tokio::spawn(run_remote_config(
        reconciler,
        runtime.config.clone(),
        shutdown.clone(),
    )));

    shutdown.changed().await.ok();
    info!("shutdown requested, waiting for in-flight cycles to finish...");
    for task in tasks {
        if let Err(e) = task.await {
            error!(error = %e, "service task panicked");
        }
    }
    info!("runtime shut down cleanly");
    Ok(())
}

/// Sleep until either the tick interval elapses or shutdown fires.
/// Returns `false` once shutdown has fired, so callers can break their
/// loop at this suspension point.
async fn sleep_or_shutdown(duration: Duration, shutdown: &mut watch::Receiver<bool>) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => !*shutdown.borrow(),
        _ = shutdown.changed() => false,
    }
}

async fn run_change_watcher(watcher: Arc<ChangeWatcher>, config: Arc<ConfigStore>, mut shutdown: watch::Receiver<bool>) {
    loop {
        if let Err(e) = watcher.tick(&config).await {
            warn!(error = %e, "change watcher tick failed");
        }
        if !sleep_or_shutdown(CHANGE_WATCHER_INTERVAL, &mut shutdown).await {
            return;
        }
    }
}

async fn run_scheduler_sweep(scheduler: Arc<Scheduler>, mut shutdown: watch::Receiver<bool>) {
    loop {
        scheduler.sweep();
        if !sleep_or_shutdown(SCHEDULER_SWEEP_INTERVAL, &mut shutdown).await {
            return;
        }
    }
}

/// Whether `section` is due this tick: either it has never run before
/// (the bootstrap override that runs a service immediately on its
/// first tick) or the scheduler's ticket for it has expired.
fn is_due(scheduler: &Scheduler, section: &str, interval_seconds: i64) -> bool {
    let bootstrap = scheduler.is_bootstrap_tick(section);
    let due = scheduler.check_ticket(section, Some(interval_seconds), chrono::Utc::now());
    bootstrap || due
}

async fn run_device_discovery(
    inventory: Arc<DeviceInventory>,
    config: Arc<ConfigStore>,
    scheduler: Arc<Scheduler>,
    mut shutdown: watch::Receiver<bool>,
) {
    const SECTION: &str = "device-discovery";
    loop {
        match read_tick_settings(&config, SECTION, true) {
            Ok(settings) if settings.enable && is_due(&scheduler, SECTION, settings.interval_seconds) => {
                if let Err(e) = inventory
                    .run_cycle(&config, settings.timeout_seconds.unwrap_or(30))
                    .await
                {
                    error!(error = %e, "device discovery cycle failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not read device-discovery settings"),
        }
        if !sleep_or_shutdown(SERVICE_TICK_GRANULARITY, &mut shutdown).await {
            return;
        }
    }
}

async fn run_point_discovery(
    inventory: Arc<PointInventory>,
    config: Arc<ConfigStore>,
    scheduler: Arc<Scheduler>,
    mut shutdown: watch::Receiver<bool>,
) {
    const SECTION: &str = "point-discovery";
    loop {
        match read_tick_settings(&config, SECTION, false) {
            Ok(settings) if settings.enable && is_due(&scheduler, SECTION, settings.interval_seconds) => {
                if let Err(e) = inventory.run_cycle().await {
                    error!(error = %e, "point discovery cycle failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not read point-discovery settings"),
        }
        if !sleep_or_shutdown(SERVICE_TICK_GRANULARITY, &mut shutdown).await {
            return;
        }
    }
}

async fn run_point_polling(
    poller: Arc<Poller>,
    config: Arc<ConfigStore>,
    scheduler: Arc<Scheduler>,
    mut shutdown: watch::Receiver<bool>,
) {
    const SECTION: &str = "point-polling";
    loop {
        match read_tick_settings(&config, SECTION, false) {
            Ok(settings) if settings.enable && is_due(&scheduler, SECTION, settings.interval_seconds) => {
                if let Err(e) = poller.run_cycle().await {
                    error!(error = %e, "poll cycle failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "could not read point-polling settings"),
        }
        if !sleep_or_shutdown(SERVICE_TICK_GRANULARITY, &mut shutdown).await {
            return;
        }
    }
}

/// The reconciler has no `enable`/`interval` pair in the config schema;
/// it bootstraps once and then drains the change stream continuously,
/// re-polling at the same granularity as the other services so it
/// observes shutdown promptly.
async fn run_remote_config(
    reconciler: Arc<RemoteConfigReconciler>,
    config: Arc<ConfigStore>,
    mut shutdown: watch::Receiver<bool>,
) {
    let sections: &[(&str, &[&str])] = &[
        ("device-discovery", &["enable", "interval", "timeout"]),
        ("point-discovery", &["enable", "interval"]),
        ("point-polling", &["enable", "interval"]),
    ];
    if let Err(e) = reconciler.bootstrap(&config, sections).await {
        error!(error = %e, "remote config bootstrap failed");
    }
    loop {
        if let Err(e) = reconciler.run_cycle(&config, &mut shutdown).await {
            error!(error = %e, "remote config reconciliation cycle failed");
        }
        if *shutdown.borrow() {
            return;
        }
        if !sleep_or_shutdown(SERVICE_TICK_GRANULARITY, &mut shutdown).await {
            return;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_tick_is_due_via_bootstrap_even_with_long_interval() {
        let scheduler = Scheduler::new();
        assert!(is_due(&scheduler, "device-discovery", 3600));
    }

    #[test]
    fn second_tick_is_not_due_before_interval_elapses() {
        let scheduler = Scheduler::new();
        assert!(is_due(&scheduler, "device-discovery", 3600));
        assert!(!is_due(&scheduler, "device-discovery", 3600));
    }

    #[test]
    fn each_section_gets_its_own_bootstrap_tick() {
        let scheduler = Scheduler::new();
        assert!(is_due(&scheduler, "device-discovery", 60));
        assert!(is_due(&scheduler, "point-discovery", 60));
    }
}
