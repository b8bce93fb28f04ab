//! Device Inventory (C6): `who-is` discovery into normalized
//! [`DeviceRecord`]s, reconciled against the `Devices` collection.

use crate::bacnet::{normalize_property, Reader};
use crate::config::ConfigStore;
use crate::domain::ports::{device_document, BacnetStack, Collection, DocumentStore};
use crate::domain::value_objects::{Address, DeviceId, PropertyMap, DEVICE_INSTANCE_MAX, DEVICE_INSTANCE_MIN};
use crate::domain::{DeviceRecord, GatewayError};
use crate::time::now_iso8601;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

/// In-memory device set plus the collaborators needed to discover and
/// commit it. One instance per running gateway.
pub struct DeviceInventory {
    reader: Reader,
    stack: Arc<dyn BacnetStack>,
    store: Arc<dyn DocumentStore>,
    tz: String,
    devices: Mutex<Vec<DeviceRecord>>,
}

impl DeviceInventory {
    pub fn new(stack: Arc<dyn BacnetStack>, store: Arc<dyn DocumentStore>, tz: String) -> Self {
        Self {
            reader: Reader::new(stack.clone()),
            stack,
            store,
            tz,
            devices: Mutex::new(Vec::new()),
        }
    }

    /// One full discover+commit cycle, as driven by the runtime when
    /// the scheduler says this section is due (or on the bootstrap
    /// tick).
    pub async fn run_cycle(
        &self,
        config: &ConfigStore,
        timeout_seconds: i64,
    ) -> Result<(), GatewayError> {
        self.discover(Duration::from_secs(timeout_seconds.max(0) as u64))
            .await?;
        self.commit().await?;
        let _ = config;
        Ok(())
    }

    async fn discover(&self, timeout: Duration) -> Result<(), GatewayError> {
        info!("device discovery started...");
        let address = Address::new("*");
        let iams = self
            .stack
            .who_is(DEVICE_INSTANCE_MIN, DEVICE_INSTANCE_MAX, &address, timeout)
            .await?;
        info!(count = iams.len(), "BACnet IP devices found...");

        let mut devices = self.devices.lock().await;
        for iam in &iams {
            let device_object = crate::domain::value_objects::PointObjectId::new(
                "device",
                iam.device_id.instance(),
            );

            let mut properties: PropertyMap = BTreeMap::new();

            let device_name = self
                .reader
                .read(&iam.address, &device_object, "object-name")
                .await;
            match device_name {
                Ok(value) => {
                    properties.insert(
                        "device-name".to_string(),
                        normalize_property("device-name", &value),
                    );
                }
                Err(e) => {
                    debug!(device = %iam.device_id, error = %e, "could not read object-name");
                }
            }

            let property_list = self
                .reader
                .read(&iam.address, &device_object, "property-list")
                .await;

            if let Ok(crate::domain::value_objects::BacnetValue::List(props)) = property_list {
                for prop in props {
                    let name = match &prop {
                        crate::domain::value_objects::BacnetValue::CharacterString(s) => s.clone(),
                        crate::domain::value_objects::BacnetValue::Enumerated(s) => s.clone(),
                        other => format!("{other:?}"),
                    };
                    match self.reader.read(&iam.address, &device_object, &name).await {
                        Ok(value) => {
                            properties.insert(name.clone(), normalize_property(&name, &value));
                        }
                        Err(e) => {
                            debug!(device = %iam.device_id, property = %name, error = %e, "read failed, skipping property");
                        }
                    }
                }
            }

            if !properties.contains_key("device-name") {
                properties.insert(
                    "device-name".to_string(),
                    crate::domain::value_objects::NormalizedValue::not_supported(),
                );
            }

            let mut record = DeviceRecord::new(iam.device_id, iam.address.clone(), properties);
            record.last_synced = Some(now_iso8601(&self.tz));

            upsert_in_memory(&mut devices, record);
        }
        info!("device discovery completed...");
        Ok(())
    }

    /// Reconciles the in-memory device set against the database. Clears
    /// the in-memory set once the cycle completes, win or lose on any
    /// individual document.
    async fn commit(&self) -> Result<(), GatewayError> {
        info!("device commit to database has started...");
        let mut devices = self.devices.lock().await;
        devices.sort();

        let doc_count = self.store.count_documents(Collection::Devices).await;

        match doc_count {
            Err(_) => {
                self.bulk_insert(&devices).await?;
            }
            Ok(n_db) => {
                debug!(doc_count = n_db, device_count = devices.len(), "reconciling devices");
                let n_mem = devices.len() as u64;
                if n_db == 0 {
                    self.bulk_insert(&devices).await?;
                } else if n_db == n_mem {
                    self.replace_all(&devices).await;
                } else if n_db < n_mem {
                    self.reconcile_grow(&devices).await?;
                } else {
                    self.reconcile_shrink(&devices).await?;
                }
            }
        }

        devices.clear();
        info!("device commit to database completed...");
        Ok(())
    }

    async fn bulk_insert(&self, devices: &[DeviceRecord]) -> Result<(), GatewayError> {
        let docs = devices.iter().map(device_document).collect();
        if let Err(e) = self.store.insert_many(Collection::Devices, docs).await {
            error!(error = %e, "bulk insert of devices failed");
        }
        Ok(())
    }

    async fn replace_all(&self, devices: &[DeviceRecord]) {
        for device in devices {
            if let Err(e) = self
                .store
                .find_one_and_replace(Collection::Devices, &device.id.to_string(), device_document(device))
                .await
            {
                error!(error = %e, device = %device.id, "replace failed");
            }
        }
    }

    async fn db_ids(&self) -> Result<HashSet<u32>, GatewayError> {
        let raw = self.store.find_ids(Collection::Devices).await?;
        Ok(raw
            .iter()
            .filter_map(|id| id.split_once(',').and_then(|(_, n)| n.parse().ok()))
            .collect())
    }

    async fn reconcile_grow(&self, devices: &[DeviceRecord]) -> Result<(), GatewayError> {
        let db_ids = self.db_ids().await?;
        let mem_ids: HashSet<u32> = devices.iter().map(|d| d.id.instance()).collect();
        let new_ids: HashSet<u32> = mem_ids.difference(&db_ids).copied().collect();
        let found_ids: HashSet<u32> = mem_ids.intersection(&db_ids).copied().collect();
        info!(?mem_ids, ?db_ids, ?new_ids, ?found_ids, "devices discovered vs persisted");

        let new_devices: Vec<&DeviceRecord> = devices
            .iter()
            .filter(|d| new_ids.contains(&d.id.instance()))
            .collect();
        for device in &new_devices {
            if let Err(e) = self
                .store
                .insert_one(Collection::Devices, device_document(device))
                .await
            {
                error!(error = %e, device = %device.id, "insert failed");
            }
        }

        let found_devices: Vec<&DeviceRecord> = devices
            .iter()
            .filter(|d| found_ids.contains(&d.id.instance()))
            .collect();
        for device in &found_devices {
            if let Err(e) = self
                .store
                .find_one_and_replace(Collection::Devices, &device.id.to_string(), device_document(device))
                .await
            {
                error!(error = %e, device = %device.id, "replace failed");
            }
        }
        Ok(())
    }

    /// `N_db > N_mem`: replace the intersection only, never delete the
    /// stale documents — presence in the database does not imply the
    /// network still has the device.
    async fn reconcile_shrink(&self, devices: &[DeviceRecord]) -> Result<(), GatewayError> {
        let db_ids = self.db_ids().await?;
        let mem_ids: HashSet<u32> = devices.iter().map(|d| d.id.instance()).collect();
        let found_ids: HashSet<u32> = mem_ids.intersection(&db_ids).copied().collect();
        info!(?mem_ids, ?db_ids, ?found_ids, "devices discovered vs persisted");

        for device in devices.iter().filter(|d| found_ids.contains(&d.id.instance())) {
            if let Err(e) = self
                .store
                .find_one_and_replace(Collection::Devices, &device.id.to_string(), device_document(device))
                .await
            {
                error!(error = %e, device = %device.id, "replace failed");
            }
        }
        Ok(())
    }

    #[cfg(test)]
    pub async fn device_count(&self) -> usize {
        self.devices.lock().await.len()
    }
}

/// Deduplicate by `(instance, address)`: a device rediscovered at the
/// same address replaces the existing working-set entry rather than
/// appending a second one.
fn upsert_in_memory(devices: &mut Vec<DeviceRecord>, record: DeviceRecord) {
    if let Some(existing) = devices
        .iter_mut()
        .find(|d| d.id == record.id && d.address == record.address)
    {
        *existing = record;
    } else {
        devices.push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_store::InMemoryStore;
    use crate::adapters::sim_bacnet::SimulatedStack;
    use crate::domain::value_objects::BacnetValue;

    fn device_iam(instance: u32, address: &str) -> (DeviceId, Address) {
        (DeviceId::try_new(instance).unwrap(), Address::new(address))
    }

    #[tokio::test]
    async fn empty_db_bootstrap_inserts_both_devices() {
        let mut stack = SimulatedStack::new();
        let (a_id, a_addr) = device_iam(1234, "192.0.2.10");
        let (b_id, b_addr) = device_iam(5678, "192.0.2.11");
        stack = stack.with_who_is_response(a_id, a_addr.clone());
        stack = stack.with_who_is_response(b_id, b_addr.clone());
        stack = stack.with_property(
            &crate::domain::value_objects::PointObjectId::new("device", 1234),
            "object-name",
            BacnetValue::CharacterString("A".into()),
        );
        stack = stack.with_property(
            &crate::domain::value_objects::PointObjectId::new("device", 5678),
            "object-name",
            BacnetValue::CharacterString("B".into()),
        );

        let store = Arc::new(InMemoryStore::new());
        let inventory = DeviceInventory::new(Arc::new(stack), store.clone(), "UTC".to_string());
        inventory.discover(Duration::from_secs(1)).await.unwrap();
        inventory.commit().await.unwrap();

        let ids = store.find_ids(Collection::Devices).await.unwrap();
        let mut ids = ids;
        ids.sort();
        assert_eq!(ids, vec!["device,1234".to_string(), "device,5678".to_string()]);
    }

    #[tokio::test]
    async fn shrink_network_does_not_delete_stale_devices() {
        let store = Arc::new(InMemoryStore::new());
        store
            .insert_one(
                Collection::Devices,
                serde_json::json!({"id": "device,1234", "address": "192.0.2.10", "last synced": null, "properties": {}}),
            )
            .await
            .unwrap();
        store
            .insert_one(
                Collection::Devices,
                serde_json::json!({"id": "device,5678", "address": "192.0.2.11", "last synced": null, "properties": {}}),
            )
            .await
            .unwrap();

        let mut stack = SimulatedStack::new();
        let (a_id, a_addr) = device_iam(1234, "192.0.2.10");
        stack = stack.with_who_is_response(a_id, a_addr);
        stack = stack.with_property(
            &crate::domain::value_objects::PointObjectId::new("device", 1234),
            "object-name",
            BacnetValue::CharacterString("A".into()),
        );

        let inventory = DeviceInventory::new(Arc::new(stack), store.clone(), "UTC".to_string());
        inventory.discover(Duration::from_secs(1)).await.unwrap();
        inventory.commit().await.unwrap();

        let ids = store.find_ids(Collection::Devices).await.unwrap();
        let mut ids = ids;
        ids.sort();
        assert_eq!(ids, vec!["device,1234".to_string(), "device,5678".to_string()]);
    }

    #[test]
    fn upsert_in_memory_replaces_same_instance_and_address_instead_of_duplicating() {
        let (id, addr) = device_iam(1234, "192.0.2.10");
        let mut devices = vec![DeviceRecord::new(id, addr.clone(), BTreeMap::new())];

        let mut updated = BTreeMap::new();
        updated.insert(
            "device-name".to_string(),
            crate::domain::value_objects::NormalizedValue::new(serde_json::json!("renamed"), "string"),
        );
        upsert_in_memory(&mut devices, DeviceRecord::new(id, addr, updated));

        assert_eq!(devices.len(), 1);
        assert_eq!(
            devices[0].properties.get("device-name").unwrap().value,
            serde_json::json!("renamed")
        );
    }

    #[test]
    fn upsert_in_memory_keeps_same_instance_at_different_address_separate() {
        let (id, addr_a) = device_iam(1234, "192.0.2.10");
        let (_, addr_b) = device_iam(1234, "192.0.2.11");
        let mut devices = vec![DeviceRecord::new(id, addr_a, BTreeMap::new())];

        upsert_in_memory(&mut devices, DeviceRecord::new(id, addr_b, BTreeMap::new()));

        assert_eq!(devices.len(), 2);
    }
}
