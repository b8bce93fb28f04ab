//! Change Watcher (C2): detects that the `.ini` file changed by
//! counting lines appended to an external events file, rather than
//! watching the file's content directly.

use crate::config::store::ConfigStore;
use crate::domain::errors::ConfigError;
use std::io::{BufRead, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

const TRUNCATE_THRESHOLD: u64 = 5_000;

/// Polls `<respath>/ini.events` for its line count and triggers
/// [`ConfigStore::sync`] when it grows. Decoupled from inotify-style
/// watching so a crash mid-write of the events file never desyncs the
/// watcher — re-reading the file is always idempotent.
pub struct ChangeWatcher {
    events_path: PathBuf,
    last: AtomicU64,
}

impl ChangeWatcher {
    pub fn new(respath: &std::path::Path) -> Self {
        Self {
            events_path: respath.join("ini.events"),
            last: AtomicU64::new(0),
        }
    }

    fn count_lines(&self) -> std::io::Result<u64> {
        match std::fs::File::open(&self.events_path) {
            Ok(file) => {
                let reader = std::io::BufReader::new(file);
                Ok(reader.lines().count() as u64)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e),
        }
    }

    fn truncate(&self) -> std::io::Result<()> {
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .truncate(true)
            .open(&self.events_path)?;
        file.seek(SeekFrom::Start(0))?;
        file.flush()
    }

    /// One tick of the watcher: compare the current line count to the
    /// last observed count and react:
    /// - grown → sync the config store, remember the new count.
    /// - shrunk (rotation) → remember the new count without syncing.
    /// - over threshold → truncate the events file and reset to zero.
    pub async fn tick(&self, store: &ConfigStore) -> Result<(), ConfigError> {
        let current = self.count_lines().map_err(ConfigError::Io)?;
        let last = self.last.load(Ordering::SeqCst);

        if current > last {
            store.sync()?;
            self.last.store(current, Ordering::SeqCst);
        } else if current < last {
            self.last.store(current, Ordering::SeqCst);
        }

        if current > TRUNCATE_THRESHOLD {
            self.truncate().map_err(ConfigError::Io)?;
            self.last.store(0, Ordering::SeqCst);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir() -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("bacnet-gateway-watcher-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&path).unwrap();
        path
    }

    fn write_ini(dir: &std::path::Path) {
        std::fs::write(
            dir.join("local-device.ini"),
            "[point-polling]\ninterval=5\n",
        )
        .unwrap();
    }

    #[tokio::test]
    async fn growth_triggers_sync() {
        let dir = temp_dir();
        write_ini(&dir);
        let store = ConfigStore::load(&dir).unwrap();
        let watcher = ChangeWatcher::new(&dir);

        std::fs::write(dir.join("ini.events"), "one\n").unwrap();
        watcher.tick(&store).await.unwrap();
        assert_eq!(watcher.last.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn shrink_resets_without_sync_error() {
        let dir = temp_dir();
        write_ini(&dir);
        let store = ConfigStore::load(&dir).unwrap();
        let watcher = ChangeWatcher::new(&dir);

        std::fs::write(dir.join("ini.events"), "one\ntwo\nthree\n").unwrap();
        watcher.tick(&store).await.unwrap();
        std::fs::write(dir.join("ini.events"), "one\n").unwrap();
        watcher.tick(&store).await.unwrap();
        assert_eq!(watcher.last.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn over_threshold_truncates() {
        let dir = temp_dir();
        write_ini(&dir);
        let store = ConfigStore::load(&dir).unwrap();
        let watcher = ChangeWatcher::new(&dir);

        let lines = "x\n".repeat((TRUNCATE_THRESHOLD + 1) as usize);
        std::fs::write(dir.join("ini.events"), lines).unwrap();
        watcher.tick(&store).await.unwrap();
        assert_eq!(watcher.last.load(Ordering::SeqCst), 0);
        let remaining = std::fs::read_to_string(dir.join("ini.events")).unwrap();
        assert!(remaining.is_empty());
    }
}
