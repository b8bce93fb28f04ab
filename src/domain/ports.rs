//! # Domain Ports (Hexagonal Architecture)
//!
//! Ports define the boundaries between the domain and external systems.
//! Each port is a trait an adapter implements.
//!
//! ## Port Categories
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Domain Layer                                │
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │              Driven Ports (Outbound)                     │   │
//! │  │  • BacnetStack - who-is / read-property on the wire      │   │
//! │  │  • DocumentStore - device/point/config persistence       │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Services (C6, C8, C9, C10) are written against these traits so that a
//! simulated [`BacnetStack`] and an in-memory [`DocumentStore`] can stand
//! in during tests without touching a real network or database.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::{BacnetError, DbError};
use super::records::DeviceRecord;
use super::value_objects::{Address, BacnetValue, DeviceId, PointObjectId};

// ============================================================================
// BACnet wire port (driven)
// ============================================================================

/// A `who-is` response: a device identifier paired with the address it
/// answered from.
#[derive(Debug, Clone, PartialEq)]
pub struct IAm {
    pub device_id: DeviceId,
    pub address: Address,
}

/// Abstraction over a BACnet/IP stack's wire operations. A production
/// adapter wraps a real stack; [`crate::adapters::sim_bacnet::SimulatedStack`]
/// provides a scripted in-memory implementation for tests.
#[async_trait]
pub trait BacnetStack: Send + Sync {
    /// Broadcast `who-is` across `[low, high]` and collect the responses
    /// that arrive before `timeout` elapses.
    async fn who_is(
        &self,
        low: u32,
        high: u32,
        address: &Address,
        timeout: Duration,
    ) -> Result<Vec<IAm>, BacnetError>;

    /// Read a single property, optionally indexing into an array
    /// property (used for the segmentation-refusal array-index walk
    /// over `object-list`).
    async fn read_property(
        &self,
        address: &Address,
        object: &PointObjectId,
        property: &str,
        array_index: Option<u32>,
    ) -> Result<BacnetValue, BacnetError>;
}

// ============================================================================
// Document store port (driven)
// ============================================================================

/// Collections the gateway persists to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Collection {
    Devices,
    Points,
    Configuration,
    Logs,
}

impl Collection {
    pub fn name(&self) -> &'static str {
        match self {
            Collection::Devices => "Devices",
            Collection::Points => "Points",
            Collection::Configuration => "Configuration",
            Collection::Logs => "Logs",
        }
    }
}

/// A change-stream event, reduced to the fields [`crate::services::remote_config`]
/// needs: the dotted `section.option` keys that changed and a resume
/// token to reopen the stream after a disconnect.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub updated_fields: std::collections::BTreeMap<String, serde_json::Value>,
    pub resume_token: serde_json::Value,
}

/// A live change-stream subscription. Adapter-specific iteration is
/// exposed through `next`, matching the pull-based shape services use
/// to drain updates one at a time and react to a closed stream by
/// reopening from the last resume token.
#[async_trait]
pub trait ChangeSubscription: Send {
    async fn next(&mut self) -> Result<Option<ChangeEvent>, DbError>;
}

/// Abstraction over the document database the gateway reconciles
/// against. Method names follow the operations the reconciliation
/// algorithms in C6/C8/C10 actually perform, rather than exposing the
/// full `mongodb` driver surface.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Confirm connectivity; called once at startup.
    async fn ping(&self) -> Result<(), DbError>;

    /// Count documents in a collection. A connection-level failure
    /// (collection doesn't exist yet, first run) is distinguished from
    /// zero documents by returning `Err`, matching the bootstrap
    /// fall-through in the device/point commit cycles.
    async fn count_documents(&self, collection: Collection) -> Result<u64, DbError>;

    async fn insert_one(
        &self,
        collection: Collection,
        document: serde_json::Value,
    ) -> Result<(), DbError>;

    async fn insert_many(
        &self,
        collection: Collection,
        documents: Vec<serde_json::Value>,
    ) -> Result<(), DbError>;

    /// Replace the document whose `id` field matches; inserts if no such
    /// document exists (upsert). Used throughout reconciliation to
    /// bring a single stale record in line with its in-memory value.
    async fn find_one_and_replace(
        &self,
        collection: Collection,
        id: &str,
        document: serde_json::Value,
    ) -> Result<(), DbError>;

    /// Project `{id}` for every document, used to compute the
    /// new/found/stale device-id sets during reconciliation.
    async fn find_ids(&self, collection: Collection) -> Result<Vec<String>, DbError>;

    async fn find_one(
        &self,
        collection: Collection,
        query: serde_json::Value,
    ) -> Result<Option<serde_json::Value>, DbError>;

    /// Merge `fields` into the document matching `query` without
    /// replacing the whole document (used by the poller to update only
    /// `points` on a device spec).
    async fn update_one(
        &self,
        collection: Collection,
        query: serde_json::Value,
        fields: serde_json::Value,
    ) -> Result<(), DbError>;

    /// Open a change stream over `collection`, optionally resuming from
    /// a prior token.
    async fn watch(
        &self,
        collection: Collection,
        resume_token: Option<serde_json::Value>,
    ) -> Result<Box<dyn ChangeSubscription>, DbError>;
}

/// Serialize a [`DeviceRecord`] for a write, panicking only on a
/// programmer error (a record that cannot serialize is a bug, not a
/// runtime condition the reconciliation loop should handle).
pub fn device_document(record: &DeviceRecord) -> serde_json::Value {
    serde_json::to_value(record).expect("DeviceRecord always serializes")
}
