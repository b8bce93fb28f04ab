//! A scriptable, in-memory [`BacnetStack`] used by unit and service
//! tests. Not compiled for production use; stands in for a real wire
//! stack so discovery/read/normalize logic can be exercised without a
//! network.

use crate::domain::errors::{AbortReason, BacnetError};
use crate::domain::ports::{BacnetStack, IAm};
use crate::domain::value_objects::{Address, BacnetValue, DeviceId, PointObjectId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub struct SimulatedStack {
    who_is_responses: Mutex<Vec<IAm>>,
    properties: Mutex<HashMap<(PointObjectId, String), BacnetValue>>,
    segmented_lists: Mutex<HashMap<PointObjectId, Vec<BacnetValue>>>,
}

impl SimulatedStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_who_is_response(self, device_id: DeviceId, address: Address) -> Self {
        self.who_is_responses
            .lock()
            .unwrap()
            .push(IAm { device_id, address });
        self
    }

    pub fn with_property(self, object: &PointObjectId, property: &str, value: BacnetValue) -> Self {
        self.properties
            .lock()
            .unwrap()
            .insert((object.clone(), property.to_string()), value);
        self
    }

    /// Script `object` to refuse a whole-array `object-list` read with
    /// `segmentationNotSupported`, and to answer the index-0 length
    /// read plus the subsequent per-index reads with `items`.
    pub fn with_segmented_object_list(self, object: &PointObjectId, items: Vec<BacnetValue>) -> Self {
        self.segmented_lists
            .lock()
            .unwrap()
            .insert(object.clone(), items);
        self
    }
}

#[async_trait]
impl BacnetStack for SimulatedStack {
    async fn who_is(
        &self,
        low: u32,
        high: u32,
        _address: &Address,
        _timeout: Duration,
    ) -> Result<Vec<IAm>, BacnetError> {
        Ok(self
            .who_is_responses
            .lock()
            .unwrap()
            .iter()
            .filter(|iam| iam.device_id.instance() >= low && iam.device_id.instance() <= high)
            .cloned()
            .collect())
    }

    async fn read_property(
        &self,
        _address: &Address,
        object: &PointObjectId,
        property: &str,
        array_index: Option<u32>,
    ) -> Result<BacnetValue, BacnetError> {
        if property == "object-list" {
            let segmented = self.segmented_lists.lock().unwrap();
            if let Some(items) = segmented.get(object) {
                return match array_index {
                    None => Err(BacnetError::Abort {
                        reason: AbortReason::SegmentationNotSupported,
                    }),
                    Some(0) => Ok(BacnetValue::Unsigned(items.len() as u64)),
                    Some(i) => items
                        .get((i - 1) as usize)
                        .cloned()
                        .ok_or_else(|| BacnetError::Transport(format!("object-list index {i} out of range"))),
                };
            }
        }

        self.properties
            .lock()
            .unwrap()
            .get(&(object.clone(), property.to_string()))
            .cloned()
            .ok_or_else(|| {
                BacnetError::Timeout {
                    address: _address.to_string(),
                    object: object.to_string(),
                    property: property.to_string(),
                }
            })
    }
}
