//! Poller (C9): reloads the object graph each tick and refreshes only
//! the live attributes of every known point.

use crate::bacnet::{normalize_property, Reader};
use crate::domain::ports::{BacnetStack, Collection, DocumentStore};
use crate::domain::value_objects::{Address, BacnetValue, PointObjectId};
use crate::domain::GatewayError;
use crate::services::object_graph;
use crate::time::now_iso8601;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

pub struct Poller {
    reader: Reader,
    store: Arc<dyn DocumentStore>,
    respath: PathBuf,
    tz: String,
}

impl Poller {
    pub fn new(stack: Arc<dyn BacnetStack>, store: Arc<dyn DocumentStore>, respath: PathBuf, tz: String) -> Self {
        Self {
            reader: Reader::new(stack),
            store,
            respath,
            tz,
        }
    }

    pub async fn run_cycle(&self) -> Result<(), GatewayError> {
        info!("poll cycle started...");
        let graph = object_graph::load(&self.respath).await?;
        if graph.is_empty() {
            debug!("object graph is empty, nothing to poll");
            return Ok(());
        }

        for (device_id, points) in &graph {
            let mut updated = serde_json::Map::new();
            for (key, entry) in points {
                match self.refresh_point(&entry.address, &entry.id).await {
                    Ok((value, status, reliability)) => {
                        let mut point = serde_json::to_value(&entry.point)
                            .expect("PointRecord always serializes");
                        if let serde_json::Value::Object(ref mut map) = point {
                            map.insert("value".to_string(), serde_json::to_value(&value).unwrap());
                            map.insert("status".to_string(), serde_json::Value::String(status));
                            map.insert("reliability".to_string(), serde_json::Value::String(reliability));
                            map.insert("last synced".to_string(), serde_json::Value::String(now_iso8601(&self.tz)));
                        }
                        updated.insert(key.clone(), point);
                    }
                    Err(e) => {
                        warn!(device = %device_id, point = %key, error = %e, "poll read failed, leaving point unchanged");
                        let point = serde_json::to_value(&entry.point).expect("PointRecord always serializes");
                        updated.insert(key.clone(), point);
                    }
                }
            }

            let query = serde_json::json!({ "id": device_id.to_string() });
            let set = serde_json::json!({ "points": serde_json::Value::Object(updated) });
            if let Err(e) = self.store.update_one(Collection::Points, query, set).await {
                error!(device = %device_id, error = %e, "poll update failed");
            }
        }

        info!("poll cycle completed...");
        Ok(())
    }

    async fn refresh_point(
        &self,
        address: &Address,
        object: &PointObjectId,
    ) -> Result<(crate::domain::value_objects::NormalizedValue, String, String), GatewayError> {
        let present_value = self.reader.read(address, object, "present-value").await?;
        let value = normalize_property("present-value", &present_value);

        let status = self
            .reader
            .read(address, object, "status-flags")
            .await
            .map(|v| stringify(&v))
            .unwrap_or_default();
        let reliability = self
            .reader
            .read(address, object, "reliability")
            .await
            .map(|v| stringify(&v))
            .unwrap_or_default();

        Ok((value, status, reliability))
    }
}

fn stringify(value: &BacnetValue) -> String {
    match value {
        BacnetValue::CharacterString(s) | BacnetValue::Enumerated(s) => s.clone(),
        other => format!("{other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_store::InMemoryStore;
    use crate::adapters::sim_bacnet::SimulatedStack;

    #[tokio::test]
    async fn empty_graph_is_a_no_op() {
        let store = Arc::new(InMemoryStore::new());
        let stack = Arc::new(SimulatedStack::new());
        let dir = crate::testing::TempDir::new();
        let poller = Poller::new(stack, store, dir.path().to_path_buf(), "UTC".to_string());
        poller.run_cycle().await.unwrap();
    }
}
