//! The five periodic services (C6, C8, C9, C10) plus the object-graph
//! persistence helper (C7) they share.

pub mod device_inventory;
pub mod object_graph;
pub mod point_inventory;
pub mod poller;
pub mod remote_config;

use crate::config::{ConfigStore, ConfigSubscriber, ConfigValue};
use tracing::debug;

/// A subscriber that does nothing but log. Every periodic service
/// still rereads its settings directly from the config store at the
/// top of each tick, so the subscription exists only to surface a
/// change as soon as it lands rather than to drive the service's
/// behavior by itself.
pub struct LoggingSubscriber {
    pub section: &'static str,
    pub interests: Vec<&'static str>,
}

impl ConfigSubscriber for LoggingSubscriber {
    fn section(&self) -> &str {
        self.section
    }

    fn interests(&self) -> &[&str] {
        &self.interests
    }

    fn notify(&self, section: &str, option: &str, value: &ConfigValue) {
        debug!(%section, %option, %value, "configuration option updated");
    }
}

/// The `{enable, interval, timeout}` triple every periodic service
/// reads at the top of a tick. `timeout` is only meaningful for
/// device discovery; other services leave it `None`.
pub struct TickSettings {
    pub enable: bool,
    pub interval_seconds: i64,
    pub timeout_seconds: Option<i64>,
}

pub fn read_tick_settings(
    store: &ConfigStore,
    section: &str,
    needs_timeout: bool,
) -> Result<TickSettings, crate::domain::ConfigError> {
    let enable = store
        .read(section, "enable")?
        .as_bool()
        .unwrap_or(false);
    let interval_seconds = store.read(section, "interval")?.as_int().unwrap_or(0);
    let timeout_seconds = if needs_timeout {
        Some(store.read(section, "timeout")?.as_int().unwrap_or(0))
    } else {
        None
    };
    Ok(TickSettings {
        enable,
        interval_seconds,
        timeout_seconds,
    })
}
