//! Point Inventory (C8): per-device point enumeration, building both the
//! object graph (C7) and the `Points` collection.

use crate::bacnet::{normalize_property, Reader};
use crate::domain::ports::{BacnetStack, Collection, DocumentStore};
use crate::domain::value_objects::{
    Address, BacnetValue, DeviceId, NormalizedValue, PointFamily, PointObjectId,
};
use crate::domain::{DeviceSpec, GatewayError, ObjectGraph, ObjectGraphEntry, PointExtra, PointRecord};
use crate::services::object_graph;
use crate::time::now_iso8601;
use indexmap::IndexMap;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

/// Enumerates every known device's points, one device at a time, and
/// reconciles the resulting `DeviceSpec` set against `Points`.
pub struct PointInventory {
    reader: Reader,
    store: Arc<dyn DocumentStore>,
    respath: PathBuf,
    tz: String,
    specs: Mutex<Vec<DeviceSpec>>,
}

impl PointInventory {
    pub fn new(
        stack: Arc<dyn BacnetStack>,
        store: Arc<dyn DocumentStore>,
        respath: PathBuf,
        tz: String,
    ) -> Self {
        Self {
            reader: Reader::new(stack),
            store,
            respath,
            tz,
            specs: Mutex::new(Vec::new()),
        }
    }

    pub async fn run_cycle(&self) -> Result<(), GatewayError> {
        let device_count = self.store.count_documents(Collection::Devices).await.unwrap_or(0);
        if device_count == 0 {
            debug!("no devices known yet, skipping point discovery cycle");
            return Ok(());
        }
        self.discover().await?;
        self.commit().await?;
        Ok(())
    }

    async fn discover(&self) -> Result<(), GatewayError> {
        info!("point discovery started...");
        let raw_devices = self.store.find_ids(Collection::Devices).await?;
        let mut graph = ObjectGraph::new();
        let mut specs = Vec::with_capacity(raw_devices.len());

        for raw_id in &raw_devices {
            match self.build_device_spec(raw_id, &mut graph).await {
                Ok(spec) => specs.push(spec),
                Err(e) => {
                    error!(device = %raw_id, error = %e, "point discovery failed for device, skipping");
                }
            }
            object_graph::save(&self.respath, &graph).await?;
        }

        *self.specs.lock().await = specs;
        info!("point discovery completed...");
        Ok(())
    }

    async fn build_device_spec(
        &self,
        raw_id: &str,
        graph: &mut ObjectGraph,
    ) -> Result<DeviceSpec, GatewayError> {
        let doc = self
            .store
            .find_one(Collection::Devices, serde_json::json!({ "id": raw_id }))
            .await?
            .ok_or_else(|| GatewayError::CommitFailed(format!("device {raw_id} vanished mid-cycle")))?;

        let device_id: DeviceId = raw_id.parse().map_err(|_| {
            GatewayError::CommitFailed(format!("malformed device id in database: {raw_id}"))
        })?;
        let address = Address::new(
            doc.get("address")
                .and_then(|v| v.as_str())
                .unwrap_or_default(),
        );
        let device_name = doc
            .get("properties")
            .and_then(|p| p.get("device-name"))
            .and_then(|v| v.get("value"))
            .and_then(|v| v.as_str())
            .unwrap_or("unknown")
            .to_string();
        let object_list = doc
            .get("properties")
            .and_then(|p| p.get("object-list"))
            .and_then(|v| v.get("value"))
            .and_then(|v| v.as_array())
            .cloned()
            .unwrap_or_default();

        let mut spec = DeviceSpec::new(device_name.clone(), device_id, address.clone());
        let mut points = IndexMap::new();

        for entry in &object_list {
            let raw = match entry.as_str() {
                Some(s) => s,
                None => continue,
            };
            let object = match parse_point_object(raw) {
                Some(o) if o.is_point_kind() => o,
                _ => continue,
            };

            match self.build_point_record(&address, &device_name, device_id, &object).await {
                Ok(point) => {
                    let key = object.to_string();
                    graph.entry(device_id).or_default().insert(
                        key.clone(),
                        ObjectGraphEntry {
                            id: object.clone(),
                            name: point.name.clone(),
                            address: address.clone(),
                            point: point.clone(),
                        },
                    );
                    points.insert(key, point);
                }
                Err(e) => {
                    warn!(device = %device_id, point = %object, error = %e, "point read failed, skipping point");
                }
            }
        }

        spec.points = points;
        Ok(spec)
    }

    async fn build_point_record(
        &self,
        address: &Address,
        device_name: &str,
        device_id: DeviceId,
        object: &PointObjectId,
    ) -> Result<PointRecord, GatewayError> {
        let name = self.read_string(address, object, "object-name").await?;
        let value = self.read_normalized(address, object, "present-value").await?;
        let status = self.read_string(address, object, "status-flags").await.unwrap_or_default();
        let reliability = self.read_string(address, object, "reliability").await.unwrap_or_default();
        let description = self.read_string(address, object, "description").await.unwrap_or_default();
        let last_synced = now_iso8601(&self.tz);

        let extra = match object.family() {
            PointFamily::Analog => PointExtra::Analog {
                units: self.read_string(address, object, "units").await.unwrap_or_default(),
                max_val: self.read_normalized(address, object, "max-present-value").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
                min_val: self.read_normalized(address, object, "min-present-value").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
            },
            PointFamily::Binary => PointExtra::Binary {
                active_text: self.read_normalized(address, object, "active-text").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
                inactive_text: self.read_normalized(address, object, "inactive-text").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
                elapsed_active_time: self.read_normalized(address, object, "elapsed-active-time").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
            },
            PointFamily::MultiState => PointExtra::MultiState {
                state_count: self.read_normalized(address, object, "number-of-states").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
                state_labels: self.read_normalized(address, object, "state-text").await.unwrap_or_else(|_| NormalizedValue::not_supported()),
            },
            PointFamily::Other => PointExtra::None,
        };

        Ok(PointRecord {
            id: object.clone(),
            device: (device_name.to_string(), device_id),
            name,
            value,
            status,
            reliability,
            description,
            last_synced,
            extra,
        })
    }

    async fn read_string(&self, address: &Address, object: &PointObjectId, property: &str) -> Result<String, GatewayError> {
        let value = self.reader.read(address, object, property).await?;
        Ok(match value {
            BacnetValue::CharacterString(s) | BacnetValue::Enumerated(s) => s,
            other => format!("{other:?}"),
        })
    }

    async fn read_normalized(&self, address: &Address, object: &PointObjectId, property: &str) -> Result<NormalizedValue, GatewayError> {
        let value = self.reader.read(address, object, property).await?;
        Ok(normalize_property(property, &value))
    }

    async fn commit(&self) -> Result<(), GatewayError> {
        info!("point commit to database has started...");
        let mut specs = self.specs.lock().await;
        specs.sort_by(|a, b| a.id.cmp(&b.id));

        let doc_count = self.store.count_documents(Collection::Points).await;
        match doc_count {
            Err(_) => self.bulk_insert(&specs).await?,
            Ok(n_db) => {
                let n_mem = specs.len() as u64;
                if n_db == 0 {
                    self.bulk_insert(&specs).await?;
                } else if n_db == n_mem {
                    self.replace_all(&specs).await;
                } else if n_db < n_mem {
                    self.reconcile_grow(&specs).await?;
                } else {
                    self.reconcile_shrink(&specs).await?;
                }
            }
        }

        specs.clear();
        info!("point commit to database completed...");
        Ok(())
    }

    async fn bulk_insert(&self, specs: &[DeviceSpec]) -> Result<(), GatewayError> {
        let docs = specs.iter().map(spec_document).collect();
        if let Err(e) = self.store.insert_many(Collection::Points, docs).await {
            error!(error = %e, "bulk insert of points failed");
        }
        Ok(())
    }

    async fn replace_all(&self, specs: &[DeviceSpec]) {
        for spec in specs {
            if let Err(e) = self
                .store
                .find_one_and_replace(Collection::Points, &spec.id.to_string(), spec_document(spec))
                .await
            {
                error!(error = %e, device = %spec.id, "replace failed");
            }
        }
    }

    async fn db_ids(&self) -> Result<HashSet<u32>, GatewayError> {
        let raw = self.store.find_ids(Collection::Points).await?;
        Ok(raw
            .iter()
            .filter_map(|id| id.split_once(',').and_then(|(_, n)| n.parse().ok()))
            .collect())
    }

    async fn reconcile_grow(&self, specs: &[DeviceSpec]) -> Result<(), GatewayError> {
        let db_ids = self.db_ids().await?;
        let mem_ids: HashSet<u32> = specs.iter().map(|d| d.id.instance()).collect();
        let new_ids: HashSet<u32> = mem_ids.difference(&db_ids).copied().collect();
        let found_ids: HashSet<u32> = mem_ids.intersection(&db_ids).copied().collect();

        for spec in specs.iter().filter(|d| new_ids.contains(&d.id.instance())) {
            if let Err(e) = self.store.insert_one(Collection::Points, spec_document(spec)).await {
                error!(error = %e, device = %spec.id, "insert failed");
            }
        }
        for spec in specs.iter().filter(|d| found_ids.contains(&d.id.instance())) {
            if let Err(e) = self
                .store
                .find_one_and_replace(Collection::Points, &spec.id.to_string(), spec_document(spec))
                .await
            {
                error!(error = %e, device = %spec.id, "replace failed");
            }
        }
        Ok(())
    }

    /// Mirrors device-inventory's `N_db > N_mem` handling: replace the
    /// intersection, leave the rest of the database untouched.
    async fn reconcile_shrink(&self, specs: &[DeviceSpec]) -> Result<(), GatewayError> {
        let db_ids = self.db_ids().await?;
        let mem_ids: HashSet<u32> = specs.iter().map(|d| d.id.instance()).collect();
        let found_ids: HashSet<u32> = mem_ids.intersection(&db_ids).copied().collect();

        for spec in specs.iter().filter(|d| found_ids.contains(&d.id.instance())) {
            if let Err(e) = self
                .store
                .find_one_and_replace(Collection::Points, &spec.id.to_string(), spec_document(spec))
                .await
            {
                error!(error = %e, device = %spec.id, "replace failed");
            }
        }
        Ok(())
    }
}

fn spec_document(spec: &DeviceSpec) -> serde_json::Value {
    serde_json::to_value(spec).expect("DeviceSpec always serializes")
}

/// Parse a stringified object identifier (`"analog-input,12"`) as
/// persisted by the normalizer's `object-list` handling.
fn parse_point_object(raw: &str) -> Option<PointObjectId> {
    let (kind, instance) = raw.split_once(',')?;
    let instance: u32 = instance.parse().ok()?;
    Some(PointObjectId::new(kind, instance))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_store::InMemoryStore;
    use crate::adapters::sim_bacnet::SimulatedStack;

    #[tokio::test]
    async fn skips_cycle_when_no_devices_known() {
        let store = Arc::new(InMemoryStore::new());
        let stack = Arc::new(SimulatedStack::new());
        let inventory = PointInventory::new(stack, store, std::env::temp_dir(), "UTC".to_string());
        inventory.run_cycle().await.unwrap();
        assert!(inventory.specs.lock().await.is_empty());
    }

    #[test]
    fn parses_point_object_identifiers() {
        let object = parse_point_object("analog-input,12").unwrap();
        assert_eq!(object.kind(), "analog-input");
        assert_eq!(object.instance(), 12);
        assert!(object.is_point_kind());

        assert!(parse_point_object("device,12").map(|o| o.is_point_kind()).unwrap_or(false) == false);
    }
}
