//! BACnet Reader (C4): wraps `read-property` with the segmentation-
//! refusal fallback that walks `object-list` element-by-element when a
//! device refuses to return the whole array in one APDU.

use crate::domain::errors::{AbortReason, BacnetError};
use crate::domain::ports::BacnetStack;
use crate::domain::value_objects::{Address, BacnetValue, PointObjectId};
use std::sync::Arc;

/// Stateless wrapper around a [`BacnetStack`]. Concurrency is bounded
/// entirely by the calling task; the reader holds no state of its own.
pub struct Reader {
    stack: Arc<dyn BacnetStack>,
}

impl Reader {
    pub fn new(stack: Arc<dyn BacnetStack>) -> Self {
        Self { stack }
    }

    /// Read one property, falling back to an index-by-index walk of
    /// `object-list` if the device aborts with
    /// `segmentation-not-supported`.
    pub async fn read(
        &self,
        address: &Address,
        object: &PointObjectId,
        property: &str,
    ) -> Result<BacnetValue, BacnetError> {
        match self.stack.read_property(address, object, property, None).await {
            Ok(value) => Ok(value),
            Err(BacnetError::Abort {
                reason: AbortReason::SegmentationNotSupported,
            }) if property == "object-list" => self.read_object_list_by_index(address, object).await,
            Err(e) => Err(e),
        }
    }

    async fn read_object_list_by_index(
        &self,
        address: &Address,
        object: &PointObjectId,
    ) -> Result<BacnetValue, BacnetError> {
        let length = self
            .stack
            .read_property(address, object, "object-list", Some(0))
            .await?;
        let n = match length {
            BacnetValue::Unsigned(n) => n,
            BacnetValue::Integer(n) => n as u64,
            other => {
                return Err(BacnetError::Transport(format!(
                    "object-list length read returned non-numeric value: {other:?}"
                )))
            }
        };

        let mut items = Vec::with_capacity(n as usize);
        for i in 1..=n {
            let item = self
                .stack
                .read_property(address, object, "object-list", Some(i as u32))
                .await?;
            items.push(item);
        }
        Ok(BacnetValue::List(items))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::sim_bacnet::SimulatedStack;

    #[tokio::test]
    async fn segmentation_refusal_walks_indices_in_order() {
        let device = PointObjectId::new("device", 1);
        let stack = SimulatedStack::new().with_segmented_object_list(
            &device,
            vec![
                BacnetValue::ObjectIdentifier(PointObjectId::new("analog-input", 1)),
                BacnetValue::ObjectIdentifier(PointObjectId::new("analog-input", 2)),
                BacnetValue::ObjectIdentifier(PointObjectId::new("analog-input", 3)),
            ],
        );
        let reader = Reader::new(Arc::new(stack));
        let address = Address::new("192.0.2.1");

        let result = reader.read(&address, &device, "object-list").await.unwrap();
        match result {
            BacnetValue::List(items) => assert_eq!(items.len(), 3),
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn other_properties_pass_through_unmodified() {
        let device = PointObjectId::new("device", 1);
        let stack = SimulatedStack::new()
            .with_property(&device, "object-name", BacnetValue::CharacterString("GW-1".into()));
        let reader = Reader::new(Arc::new(stack));
        let address = Address::new("192.0.2.1");

        let result = reader.read(&address, &device, "object-name").await.unwrap();
        assert_eq!(result, BacnetValue::CharacterString("GW-1".into()));
    }
}
