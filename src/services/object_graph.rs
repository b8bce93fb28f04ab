//! Object Graph Persistence (C7): atomic write of the point address
//! book point discovery (C8) builds and the poller (C9) reads back.

use crate::domain::{GatewayError, ObjectGraph};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

const FILE_NAME: &str = "object-graph.bin";

pub fn path(respath: &Path) -> PathBuf {
    respath.join(FILE_NAME)
}

/// Serialize `graph` and write it to `<respath>/object-graph.bin`,
/// writing to a sibling temp file first and renaming over the target
/// so a crash mid-write never leaves a truncated graph behind.
pub async fn save(respath: &Path, graph: &ObjectGraph) -> Result<(), GatewayError> {
    let encoded = bincode::serialize(graph)?;
    let target = path(respath);
    let tmp = respath.join(format!("{FILE_NAME}.tmp"));
    fs::write(&tmp, &encoded).await?;
    fs::rename(&tmp, &target).await?;
    debug!(bytes = encoded.len(), devices = graph.len(), "object graph saved");
    Ok(())
}

/// Load the object graph, returning an empty one if it has never been
/// written (first run, before any point discovery cycle has
/// completed).
pub async fn load(respath: &Path) -> Result<ObjectGraph, GatewayError> {
    let target = path(respath);
    match fs::read(&target).await {
        Ok(bytes) => Ok(bincode::deserialize(&bytes)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ObjectGraph::new()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value_objects::{Address, DeviceId, NormalizedValue, PointObjectId};
    use crate::domain::{ObjectGraphEntry, PointExtra, PointRecord};
    use indexmap::IndexMap;

    fn sample_graph() -> ObjectGraph {
        let mut graph = ObjectGraph::new();
        let device = DeviceId::try_new(1).unwrap();
        let point = PointRecord {
            id: PointObjectId::new("analog-input", 1),
            device: ("device".to_string(), device),
            name: "Zone Temp".to_string(),
            value: NormalizedValue::new(serde_json::json!(72.5), "real"),
            status: "normal".to_string(),
            reliability: "no-fault-detected".to_string(),
            description: "Zone temperature".to_string(),
            last_synced: "2026-07-26T00:00:00+0000".to_string(),
            extra: PointExtra::Analog {
                units: "degrees-fahrenheit".to_string(),
                max_val: NormalizedValue::new(serde_json::json!(100.0), "real"),
                min_val: NormalizedValue::new(serde_json::json!(0.0), "real"),
            },
        };
        let entry = ObjectGraphEntry {
            id: point.id.clone(),
            name: point.name.clone(),
            address: Address::new("192.0.2.10"),
            point,
        };
        let mut points = IndexMap::new();
        points.insert("analog-input,1".to_string(), entry);
        graph.insert(device, points);
        graph
    }

    #[tokio::test]
    async fn round_trips_through_disk() {
        let dir = crate::testing::TempDir::new();
        let graph = sample_graph();
        save(dir.path(), &graph).await.unwrap();
        let loaded = load(dir.path()).await.unwrap();
        assert_eq!(loaded, graph);
    }

    #[tokio::test]
    async fn missing_file_loads_as_empty() {
        let dir = crate::testing::TempDir::new();
        let loaded = load(dir.path()).await.unwrap();
        assert!(loaded.is_empty());
    }
}
