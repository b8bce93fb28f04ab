//! # Gateway Domain Layer
//!
//! Types and ports for the BACnet/IP gateway: value objects (device and
//! point identifiers, normalized values), persisted record shapes
//! (device/point/object-graph), the error taxonomy, and the driven
//! ports ([`ports::BacnetStack`], [`ports::DocumentStore`]) that keep
//! the service layer free of any concrete wire or database dependency.

pub mod errors;
pub mod ports;
pub mod records;
pub mod ticket;
pub mod value_objects;

pub use errors::{BacnetError, ConfigError, DbError, GatewayError, NormalizeError};
pub use ports::{BacnetStack, ChangeEvent, ChangeSubscription, Collection, DocumentStore, IAm};
pub use records::{DeviceRecord, DeviceSpec, ObjectGraph, ObjectGraphEntry, PointExtra, PointRecord};
pub use ticket::{Scheduler, Ticket, TicketStatus};
pub use value_objects::{
    Address, BacnetValue, DeviceId, DeviceIdError, NormalizedValue, PointFamily, PointObjectId,
    PropertyMap, POINT_KINDS,
};
