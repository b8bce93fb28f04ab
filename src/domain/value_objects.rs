//! Value objects for the BACnet domain: identifiers, addresses, and the
//! normalized value shape every property read is reduced to.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Instance range a `who-is` broadcast is allowed to cover.
pub const DEVICE_INSTANCE_MIN: u32 = 0;
pub const DEVICE_INSTANCE_MAX: u32 = 4_194_303;

/// Identifies a BACnet device object: `(device, instance)`.
///
/// Serializes as `"device,<instance>"`, matching the wire representation
/// BACnet object identifiers use. Ordering is by `instance` so that
/// device collections sort the way the reconciliation algorithm in
/// [`crate::services::device_inventory`] expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId {
    instance: u32,
}

impl Serialize for DeviceId {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DeviceId {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Error, Debug)]
pub enum DeviceIdError {
    #[error("device instance {0} out of range (0..={DEVICE_INSTANCE_MAX})")]
    OutOfRange(u32),
    #[error("malformed device id '{0}', expected 'device,<instance>'")]
    Malformed(String),
}

impl DeviceId {
    pub fn try_new(instance: u32) -> Result<Self, DeviceIdError> {
        if instance > DEVICE_INSTANCE_MAX {
            return Err(DeviceIdError::OutOfRange(instance));
        }
        Ok(Self { instance })
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device,{}", self.instance)
    }
}

impl FromStr for DeviceId {
    type Err = DeviceIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, instance) = s
            .split_once(',')
            .ok_or_else(|| DeviceIdError::Malformed(s.to_string()))?;
        if kind != "device" {
            return Err(DeviceIdError::Malformed(s.to_string()));
        }
        let instance: u32 = instance
            .parse()
            .map_err(|_| DeviceIdError::Malformed(s.to_string()))?;
        Self::try_new(instance)
    }
}

/// Object kinds that carry a live value worth polling.
pub const POINT_KINDS: [&str; 9] = [
    "analog-input",
    "analog-output",
    "analog-value",
    "binary-input",
    "binary-output",
    "binary-value",
    "multi-state-input",
    "multi-state-output",
    "multi-state-value",
];

/// Identifies any BACnet object: `(kind, instance)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointObjectId {
    kind: String,
    instance: u32,
}

impl PointObjectId {
    pub fn new(kind: impl Into<String>, instance: u32) -> Self {
        Self {
            kind: kind.into(),
            instance,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn instance(&self) -> u32 {
        self.instance
    }

    /// Whether this object kind is one of the nine point kinds worth
    /// carrying into the object graph and polling.
    pub fn is_point_kind(&self) -> bool {
        POINT_KINDS.iter().any(|k| self.kind.contains(k))
    }

    /// Coarse point family, used to dispatch to the right builder.
    pub fn family(&self) -> PointFamily {
        if self.kind.contains("analog") {
            PointFamily::Analog
        } else if self.kind.contains("binary") {
            PointFamily::Binary
        } else if self.kind.contains("multi-state") {
            PointFamily::MultiState
        } else {
            PointFamily::Other
        }
    }
}

impl fmt::Display for PointObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.kind, self.instance)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PointFamily {
    Analog,
    Binary,
    MultiState,
    Other,
}

/// Opaque network address handed back by the BACnet stack on discovery.
/// Carries enough information to address a read-property request; the
/// wire form (`mac:port`, a BACnet/IP broadcast distribution address, or
/// a network-number/MAC pair for routed devices) is stack-specific, so
/// this type is kept as an opaque string rather than parsed here.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A BACnet property value as read off the wire, before normalization.
/// Mirrors the handful of primitive/constructed shapes the reader needs
/// to distinguish to drive normalization and the octet-string decoders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BacnetValue {
    Boolean(bool),
    Unsigned(u64),
    Integer(i64),
    Real(f32),
    Double(f64),
    CharacterString(String),
    OctetString(Vec<u8>),
    Enumerated(String),
    ObjectIdentifier(PointObjectId),
    BitString(Vec<bool>),
    Date(String),
    Time(String),
    List(Vec<BacnetValue>),
    Null,
}

/// The uniform `{value, type}` shape every property is normalized into.
/// `type` names the BACnet-ish tag the normalizer dispatched on
/// (`"uuid"`, `"address"`, `"boolean"`, `"real"`, `"enumerated"`,
/// `"list"`, `"not-supported"`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedValue {
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub kind: String,
}

impl NormalizedValue {
    pub fn new(value: serde_json::Value, kind: impl Into<String>) -> Self {
        Self {
            value,
            kind: kind.into(),
        }
    }

    pub fn not_supported() -> Self {
        Self::new(serde_json::Value::String("not-supported".to_string()), "not-supported")
    }
}

/// Ordered map of normalized device properties, keyed by BACnet property
/// name (e.g. `"object-list"`, `"device-name"`).
pub type PropertyMap = BTreeMap<String, NormalizedValue>;
