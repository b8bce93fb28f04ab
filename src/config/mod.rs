//! Config Store (C1) and Change Watcher (C2).
//!
//! The store is the single source of truth for runtime parameters; the
//! watcher detects that the on-disk `.ini` changed and drives a resync.
//! Subscribers implement a small capability trait rather than a base
//! class, and every read goes through one typed [`ConfigValue`]
//! coercion rather than ad-hoc per-call-site parsing.

mod coerce;
mod store;
mod watcher;

pub use coerce::ConfigValue;
pub use store::{ConfigStore, ConfigSubscriber};
pub use watcher::ChangeWatcher;
