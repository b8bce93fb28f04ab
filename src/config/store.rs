//! Config Store (C1): single source of truth for runtime parameters.

use crate::config::coerce::ConfigValue;
use crate::domain::errors::ConfigError;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};

/// A registered observer of configuration changes. `section` and
/// `interests` together form the subscriber's interest set: a
/// notification is delivered only when the changed option's section
/// matches `section()` and the option name is in `interests()`.
///
/// A small capability trait rather than a base class, so adapters opt
/// into notification without inheriting behavior they don't need.
pub trait ConfigSubscriber: Send + Sync {
    fn section(&self) -> &str;
    fn interests(&self) -> &[&str];
    fn notify(&self, section: &str, option: &str, value: &ConfigValue);
}

/// Typed, in-memory mirror of `<respath>/local-device.ini`.
pub struct ConfigStore {
    path: PathBuf,
    snapshot: RwLock<HashMap<(String, String), ConfigValue>>,
    subscribers: RwLock<Vec<Arc<dyn ConfigSubscriber>>>,
    initialized: AtomicBool,
}

impl ConfigStore {
    /// Construct the store and load the initial snapshot from disk.
    /// `initialized` flips true exactly once, after every option has
    /// been loaded.
    pub fn load(respath: &Path) -> Result<Self, ConfigError> {
        let path = respath.join("local-device.ini");
        let store = Self {
            path,
            snapshot: RwLock::new(HashMap::new()),
            subscribers: RwLock::new(Vec::new()),
            initialized: AtomicBool::new(false),
        };
        store.reload_snapshot()?;
        store.initialized.store(true, Ordering::SeqCst);
        Ok(store)
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn read_file(&self) -> Result<ini::Ini, ConfigError> {
        if !self.path.exists() {
            return Err(ConfigError::FileNotFound(self.path.display().to_string()));
        }
        Ok(ini::Ini::load_from_file(&self.path)?)
    }

    fn reload_snapshot(&self) -> Result<(), ConfigError> {
        let ini = self.read_file()?;
        let mut snapshot = self.snapshot.write().expect("config store lock poisoned");
        snapshot.clear();
        for (section, props) in ini.iter() {
            let section = match section {
                Some(s) => s,
                None => continue,
            };
            for (option, value) in props.iter() {
                snapshot.insert(
                    (section.to_string(), option.to_string()),
                    ConfigValue::coerce(value),
                );
            }
        }
        Ok(())
    }

    /// Reload the file and return the coerced value for `section.option`.
    pub fn read(&self, section: &str, option: &str) -> Result<ConfigValue, ConfigError> {
        self.reload_snapshot()?;
        let snapshot = self.snapshot.read().expect("config store lock poisoned");
        snapshot
            .get(&(section.to_string(), option.to_string()))
            .cloned()
            .ok_or_else(|| ConfigError::MissingOption {
                section: section.to_string(),
                option: option.to_string(),
            })
    }

    /// Register a subscriber. Duplicates are allowed; there is no
    /// identity-based unsubscribe in this runtime (every subscriber
    /// lives for the process lifetime, one per service).
    pub fn subscribe(&self, subscriber: Arc<dyn ConfigSubscriber>) {
        self.subscribers
            .write()
            .expect("config store lock poisoned")
            .push(subscriber);
    }

    /// Compare every known option's in-memory value against the on-disk
    /// value, update memory, and notify every subscriber whose interest
    /// set contains an option that changed and whose section matches.
    pub fn sync(&self) -> Result<(), ConfigError> {
        let ini = self.read_file()?;
        let mut fresh = HashMap::new();
        for (section, props) in ini.iter() {
            let section = match section {
                Some(s) => s,
                None => continue,
            };
            for (option, value) in props.iter() {
                fresh.insert(
                    (section.to_string(), option.to_string()),
                    ConfigValue::coerce(value),
                );
            }
        }

        let mut snapshot = self.snapshot.write().expect("config store lock poisoned");
        let subscribers = self.subscribers.read().expect("config store lock poisoned");

        for (key, value) in &fresh {
            let changed = snapshot.get(key) != Some(value);
            if !changed {
                continue;
            }
            let (section, option) = key;
            for subscriber in subscribers.iter() {
                if subscriber.section() == section
                    && subscriber.interests().contains(&option.as_str())
                {
                    subscriber.notify(section, option, value);
                }
            }
        }

        *snapshot = fresh;
        Ok(())
    }

    /// Write a single `(section, option)` update to the `.ini` file on
    /// disk, used by the remote config reconciler (C10) to apply a
    /// cloud edit locally.
    pub fn write_option(&self, section: &str, option: &str, value: &str) -> Result<(), ConfigError> {
        let mut ini = self.read_file()?;
        ini.set_to(Some(section), option.to_string(), value.to_string());
        ini.write_to_file(&self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TempDir;
    use std::sync::Mutex;

    fn write_ini(dir: &std::path::Path, contents: &str) {
        std::fs::write(dir.join("local-device.ini"), contents).unwrap();
    }

    struct RecordingSubscriber {
        section: &'static str,
        interests: Vec<&'static str>,
        seen: Mutex<Vec<(String, String, ConfigValue)>>,
    }

    impl ConfigSubscriber for RecordingSubscriber {
        fn section(&self) -> &str {
            self.section
        }

        fn interests(&self) -> &[&str] {
            &self.interests
        }

        fn notify(&self, section: &str, option: &str, value: &ConfigValue) {
            self.seen.lock().unwrap().push((
                section.to_string(),
                option.to_string(),
                value.clone(),
            ));
        }
    }

    #[test]
    fn read_coerces_per_precedence() {
        let dir = TempDir::new();
        write_ini(
            dir.path(),
            "[point-polling]\nenable=True\ninterval=5\n",
        );
        let store = ConfigStore::load(dir.path()).unwrap();
        assert_eq!(
            store.read("point-polling", "enable").unwrap(),
            ConfigValue::Bool(true)
        );
        assert_eq!(
            store.read("point-polling", "interval").unwrap(),
            ConfigValue::Int(5)
        );
    }

    #[test]
    fn sync_notifies_only_matching_interested_subscribers() {
        let dir = TempDir::new();
        write_ini(dir.path(), "[point-polling]\ninterval=5\n");
        let store = ConfigStore::load(dir.path()).unwrap();

        let subscriber = Arc::new(RecordingSubscriber {
            section: "point-polling",
            interests: vec!["interval"],
            seen: Mutex::new(Vec::new()),
        });
        store.subscribe(subscriber.clone());

        write_ini(dir.path(), "[point-polling]\ninterval=10\n");
        store.sync().unwrap();

        let seen = subscriber.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].2, ConfigValue::Int(10));
    }

    #[test]
    fn sync_does_not_notify_on_unchanged_value() {
        let dir = TempDir::new();
        write_ini(dir.path(), "[point-polling]\ninterval=5\n");
        let store = ConfigStore::load(dir.path()).unwrap();

        let subscriber = Arc::new(RecordingSubscriber {
            section: "point-polling",
            interests: vec!["interval"],
            seen: Mutex::new(Vec::new()),
        });
        store.subscribe(subscriber.clone());

        store.sync().unwrap();
        assert!(subscriber.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn missing_option_is_config_missing() {
        let dir = TempDir::new();
        write_ini(dir.path(), "[device]\nobjectName=gw\n");
        let store = ConfigStore::load(dir.path()).unwrap();
        assert!(matches!(
            store.read("device", "tz"),
            Err(ConfigError::MissingOption { .. })
        ));
    }
}
