//! Remote Config Reconciler (C10): mirrors the local configuration to a
//! cloud document once, then applies remote edits back to the `.ini`
//! file as they stream in.

use crate::config::ConfigStore;
use crate::domain::ports::{ChangeSubscription, Collection, DocumentStore};
use crate::domain::GatewayError;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

pub struct RemoteConfigReconciler {
    store: Arc<dyn DocumentStore>,
    nukid: String,
    resume_token: Mutex<Option<serde_json::Value>>,
}

impl RemoteConfigReconciler {
    pub fn new(store: Arc<dyn DocumentStore>, nukid: String) -> Self {
        Self {
            store,
            nukid,
            resume_token: Mutex::new(None),
        }
    }

    /// Idempotent: inserts the local config document once, does nothing
    /// on every later call since the document already exists.
    pub async fn bootstrap(&self, config: &ConfigStore, sections: &[(&str, &[&str])]) -> Result<(), GatewayError> {
        let existing = self
            .store
            .find_one(
                Collection::Configuration,
                serde_json::json!({ "device.nukid": self.nukid }),
            )
            .await?;

        if existing.is_some() {
            debug!(nukid = %self.nukid, "remote config document already present, skipping bootstrap");
            return Ok(());
        }

        let mut document = serde_json::Map::new();
        document.insert("device".to_string(), serde_json::json!({ "nukid": self.nukid }));
        for (section, options) in sections {
            let mut values = serde_json::Map::new();
            for option in *options {
                if let Ok(value) = config.read(section, option) {
                    values.insert(option.to_string(), serde_json::to_value(value).unwrap());
                }
            }
            document.insert(section.to_string(), serde_json::Value::Object(values));
        }

        self.store
            .insert_one(Collection::Configuration, serde_json::Value::Object(document))
            .await?;
        info!(nukid = %self.nukid, "remote config document bootstrapped");
        Ok(())
    }

    /// Open (or reopen) the change stream, resuming from the last token
    /// this reconciler observed.
    async fn open_stream(&self) -> Result<Box<dyn ChangeSubscription>, GatewayError> {
        let token = self.resume_token.lock().await.clone();
        Ok(self.store.watch(Collection::Configuration, token).await?)
    }

    /// Drain one batch of change-stream events, applying each update's
    /// dotted `section.option` keys to the local config store. Reopens
    /// the stream on error, with or without a resume token.
    ///
    /// A live change stream never yields `Ok(None)` on its own — it
    /// simply blocks until the next event — so each `stream.next()` is
    /// raced against `shutdown` rather than awaited bare; otherwise
    /// shutdown would have to wait for a remote config edit that may
    /// never come.
    pub async fn run_cycle(&self, config: &ConfigStore, shutdown: &mut watch::Receiver<bool>) -> Result<(), GatewayError> {
        let mut stream = match self.open_stream().await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "change stream open failed, will retry next tick");
                return Ok(());
            }
        };

        loop {
            tokio::select! {
                next = stream.next() => match next {
                    Ok(Some(event)) => {
                        *self.resume_token.lock().await = Some(event.resume_token.clone());
                        for (dotted_key, value) in &event.updated_fields {
                            self.apply_update(config, dotted_key, value);
                        }
                    }
                    Ok(None) => break,
                    Err(e) => {
                        error!(error = %e, "change stream error, will reopen on next tick");
                        break;
                    }
                },
                _ = shutdown.changed() => {
                    debug!("shutdown requested, leaving change stream drain");
                    break;
                }
            }
        }
        Ok(())
    }

    fn apply_update(&self, config: &ConfigStore, dotted_key: &str, value: &serde_json::Value) {
        let Some((section, option)) = dotted_key.split_once('.') else {
            warn!(key = %dotted_key, "remote update key is not a dotted section.option path, skipping");
            return;
        };
        let raw = match value {
            serde_json::Value::String(s) => s.clone(),
            serde_json::Value::Bool(b) => if *b { "True".to_string() } else { "False".to_string() },
            other => other.to_string(),
        };
        if let Err(e) = config.write_option(section, option, &raw) {
            error!(%section, %option, error = %e, "failed to write remote config update to disk");
        } else {
            info!(%section, %option, value = %raw, "applied remote configuration update");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::in_memory_store::InMemoryStore;

    #[tokio::test]
    async fn bootstrap_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let dir = crate::testing::TempDir::new();
        std::fs::write(
            dir.path().join("local-device.ini"),
            "[device]\nnukid=abc123\n",
        )
        .unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();
        let reconciler = RemoteConfigReconciler::new(store.clone(), "abc123".to_string());

        reconciler.bootstrap(&config, &[("device", &["nukid"])]).await.unwrap();
        let count_after_first = store.count_documents(Collection::Configuration).await.unwrap();
        assert_eq!(count_after_first, 1);

        reconciler.bootstrap(&config, &[("device", &["nukid"])]).await.unwrap();
        let count_after_second = store.count_documents(Collection::Configuration).await.unwrap();
        assert_eq!(count_after_second, 1);
    }

    #[tokio::test]
    async fn apply_update_writes_dotted_key_to_ini() {
        let store = Arc::new(InMemoryStore::new());
        let dir = crate::testing::TempDir::new();
        std::fs::write(
            dir.path().join("local-device.ini"),
            "[device-discovery]\ninterval=5\n",
        )
        .unwrap();
        let config = ConfigStore::load(dir.path()).unwrap();
        let reconciler = RemoteConfigReconciler::new(store, "abc123".to_string());

        reconciler.apply_update(&config, "device-discovery.interval", &serde_json::json!(30));
        assert_eq!(
            config.read("device-discovery", "interval").unwrap(),
            crate::config::ConfigValue::Int(30)
        );
    }
}
