//! Persisted record shapes: devices, points, the object graph, and the
//! scheduling tickets that gate the periodic services.

use crate::domain::value_objects::{Address, DeviceId, NormalizedValue, PointObjectId, PropertyMap};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A discovered BACnet device, as persisted to the `Devices` collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub address: Address,
    #[serde(rename = "last synced")]
    pub last_synced: Option<String>,
    pub properties: PropertyMap,
}

impl DeviceRecord {
    pub fn new(id: DeviceId, address: Address, properties: PropertyMap) -> Self {
        Self {
            id,
            address,
            last_synced: None,
            properties,
        }
    }

    pub fn device_name(&self) -> Option<&str> {
        self.properties
            .get("device-name")
            .and_then(|v| v.value.as_str())
    }
}

impl PartialOrd for DeviceRecord {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Eq for DeviceRecord {}

impl Ord for DeviceRecord {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.id.cmp(&other.id)
    }
}

/// Kind-specific fields layered onto a [`PointRecord`], named to match
/// the point kind family the object id belongs to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PointExtra {
    Analog {
        units: String,
        #[serde(rename = "maxVal")]
        max_val: NormalizedValue,
        #[serde(rename = "minVal")]
        min_val: NormalizedValue,
    },
    Binary {
        #[serde(rename = "activeText")]
        active_text: NormalizedValue,
        #[serde(rename = "inactiveText")]
        inactive_text: NormalizedValue,
        #[serde(rename = "elapsedActiveTime")]
        elapsed_active_time: NormalizedValue,
    },
    MultiState {
        #[serde(rename = "stateCount")]
        state_count: NormalizedValue,
        #[serde(rename = "stateLabels")]
        state_labels: NormalizedValue,
    },
    None,
}

/// A single point's snapshot, as persisted inside a [`DeviceSpec`].
///
/// `build()` (point discovery, C8) populates every field including
/// `description` and the kind-specific extras; `update()` (the poller,
/// C9) only ever touches `value`, `status`, `reliability`, and
/// `last_synced` — it never re-reads `description` or the extras.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PointRecord {
    pub id: PointObjectId,
    pub device: (String, DeviceId),
    pub name: String,
    pub value: NormalizedValue,
    pub status: String,
    pub reliability: String,
    pub description: String,
    #[serde(rename = "last synced")]
    pub last_synced: String,
    #[serde(flatten)]
    pub extra: PointExtra,
}

impl PointRecord {
    /// Apply a poller refresh in place, touching only the live fields.
    pub fn apply_update(
        &mut self,
        value: NormalizedValue,
        status: String,
        reliability: String,
        last_synced: String,
    ) {
        self.value = value;
        self.status = status;
        self.reliability = reliability;
        self.last_synced = last_synced;
    }
}

/// One device's full point inventory, persisted to the `Points`
/// collection. Points are kept in discovery order, not key order —
/// an `IndexMap` rather than a `BTreeMap`, since `"analog-input,10"`
/// sorting before `"analog-input,2"` would silently reshuffle them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub name: String,
    pub id: DeviceId,
    pub address: Address,
    pub points: IndexMap<String, PointRecord>,
}

impl DeviceSpec {
    pub fn new(name: String, id: DeviceId, address: Address) -> Self {
        Self {
            name,
            id,
            address,
            points: IndexMap::new(),
        }
    }
}

/// One entry in the object graph: a point's identity and addressing
/// metadata, persisted alongside (not inside) the point's live record so
/// the poller can walk points without re-reading the full device spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectGraphEntry {
    pub id: PointObjectId,
    pub name: String,
    pub address: Address,
    pub point: PointRecord,
}

/// `device -> point -> entry` map, serialized between a point-discovery
/// cycle and the poller's next tick. The inner map keeps the same
/// discovery order as [`DeviceSpec::points`]; the outer device keying
/// has no ordering requirement, so it stays key-sorted.
pub type ObjectGraph = BTreeMap<DeviceId, IndexMap<String, ObjectGraphEntry>>;
