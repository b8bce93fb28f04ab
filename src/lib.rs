//! # BACnet/IP Building-Automation Gateway
//!
//! Discovers BACnet/IP devices on a LAN, enumerates their object lists
//! and properties, periodically polls point values, and reconciles
//! normalized snapshots into a document database.
//!
//! The crate is organized around the gateway's ten components:
//!
//! - [`config`] — the Config Store (C1) and Change Watcher (C2).
//! - [`domain::ticket`] — the Ticket Scheduler (C3).
//! - [`bacnet`] — the BACnet Reader (C4) and Property Normalizer (C5).
//! - [`services`] — Device Inventory (C6), Point Inventory (C8), the
//!   Poller (C9), and the Remote Config Reconciler (C10), plus the
//!   Object Graph (C7) persistence they share.
//! - [`domain`] — shared value objects, persisted record shapes, the
//!   error taxonomy, and the driven ports ([`domain::BacnetStack`],
//!   [`domain::DocumentStore`]) that keep every service free of any
//!   concrete wire or database dependency.
//! - [`adapters`] — implementations of those ports: a simulated BACnet
//!   stack and an in-memory store for tests, a `mongodb`-backed store
//!   for production.
//! - [`logging`] — forwards `INFO`-and-above `tracing` events to the
//!   `Logs` collection alongside the usual console output.
//! - [`runtime`] — wires everything into cooperative `tokio` tasks.

#![warn(clippy::all)]

pub mod adapters;
pub mod bacnet;
pub mod config;
pub mod domain;
pub mod logging;
pub mod runtime;
pub mod services;
pub mod time;

#[cfg(any(test, feature = "mock"))]
pub mod testing;
