// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Persisted agent configuration with reload-on-write.
//
// Requests call `snapshot()` once at their start and keep that `Arc` for
// their whole lifetime. When the file changed on disk since the last load
// the store reloads before handing out the snapshot, so edits apply to the
// next request and never to one in flight.

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::SystemTime;

use tracing::{info, warn};

use bondruck_core::AgentConfig;
use bondruck_core::error::{BondruckError, Result};

pub const CONFIG_FILE: &str = "config.json";

/// Identity of the file contents last loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Stamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl Stamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug)]
struct Loaded {
    snapshot: Arc<AgentConfig>,
    stamp: Option<Stamp>,
}

/// Process-wide handle to the configuration file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
    loaded: Arc<RwLock<Loaded>>,
}

fn read_config(path: &Path) -> Result<AgentConfig> {
    let data = std::fs::read_to_string(path)?;
    let invalid = |reason: String| BondruckError::Config(format!("{}: {reason}", path.display()));
    let value: serde_json::Value =
        serde_json::from_str(&data).map_err(|e| invalid(e.to_string()))?;
    // serde would read a sequence into the defaulted struct.
    if !value.is_object() {
        return Err(invalid("expected a JSON object".into()));
    }
    serde_json::from_value(value).map_err(|e| invalid(e.to_string()))
}

fn persist_config(path: &Path, config: &AgentConfig) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    std::fs::write(path, json)?;
    Ok(())
}

impl ConfigStore {
    /// Open the file at `path`, writing defaults when it does not exist.
    ///
    /// An unreadable or invalid file is an error at startup.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = if path.exists() {
            read_config(&path)?
        } else {
            let config = AgentConfig::default();
            persist_config(&path, &config)?;
            info!(path = %path.display(), "wrote default configuration");
            config
        };
        info!(
            path = %path.display(),
            port = config.port,
            printer = %config.printer_name,
            kitchen = ?config.kitchen_printer_name,
            "configuration loaded"
        );
        Ok(Self {
            loaded: Arc::new(RwLock::new(Loaded {
                snapshot: Arc::new(config),
                stamp: Stamp::of(&path),
            })),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current configuration, reloaded first if the file changed.
    pub fn snapshot(&self) -> Arc<AgentConfig> {
        let stamp = Stamp::of(&self.path);
        {
            let loaded = self.loaded.read().unwrap_or_else(PoisonError::into_inner);
            if loaded.stamp == stamp || stamp.is_none() {
                return Arc::clone(&loaded.snapshot);
            }
        }

        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        // Another request may have reloaded while we waited for the lock.
        if loaded.stamp != stamp {
            match read_config(&self.path) {
                Ok(config) => {
                    if config.port != loaded.snapshot.port {
                        warn!(
                            running = loaded.snapshot.port,
                            configured = config.port,
                            "port change takes effect after restart"
                        );
                    }
                    info!(path = %self.path.display(), "configuration reloaded");
                    loaded.snapshot = Arc::new(config);
                }
                Err(err) => {
                    warn!(%err, "invalid configuration file; keeping previous settings");
                }
            }
            loaded.stamp = stamp;
        }
        Arc::clone(&loaded.snapshot)
    }

    /// Persist `config` and make it the current snapshot.
    pub fn save(&self, config: AgentConfig) -> Result<()> {
        persist_config(&self.path, &config)?;
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        loaded.snapshot = Arc::new(config);
        loaded.stamp = Stamp::of(&self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, ConfigStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = ConfigStore::open(dir.path().join("nested").join(CONFIG_FILE)).unwrap();
        (dir, store)
    }

    /// Rewrite the file so that its stamp surely differs.
    fn rewrite(path: &Path, json: &str) {
        std::fs::write(path, json).unwrap();
        let later = SystemTime::now() + std::time::Duration::from_secs(5);
        std::fs::File::options()
            .write(true)
            .open(path)
            .unwrap()
            .set_modified(later)
            .unwrap();
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        let (_dir, store) = store();
        assert!(store.path().exists());
        assert_eq!(*store.snapshot(), AgentConfig::default());
        let written: AgentConfig =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(written, AgentConfig::default());
    }

    #[test]
    fn edits_apply_to_the_next_snapshot_only() {
        let (_dir, store) = store();
        let in_flight = store.snapshot();

        rewrite(store.path(), r#"{"printerName":"Counter","kitchenPrinterName":"Kitchen"}"#);
        let next = store.snapshot();

        assert_eq!(in_flight.printer_name, AgentConfig::default().printer_name);
        assert_eq!(next.printer_name, "Counter");
        assert_eq!(next.kitchen_printer_name.as_deref(), Some("Kitchen"));
    }

    #[test]
    fn invalid_edit_keeps_previous_settings() {
        let (_dir, store) = store();
        store
            .save(AgentConfig {
                printer_name: "Counter".into(),
                ..AgentConfig::default()
            })
            .unwrap();

        rewrite(store.path(), "{ not json");
        assert_eq!(store.snapshot().printer_name, "Counter");
    }

    #[test]
    fn unchanged_file_returns_same_snapshot() {
        let (_dir, store) = store();
        let a = store.snapshot();
        let b = store.snapshot();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn save_persists_and_publishes() {
        let (_dir, store) = store();
        let mut config = AgentConfig::default();
        config.horizontal_offset_mm = Some(1.5);
        store.save(config.clone()).unwrap();

        assert_eq!(*store.snapshot(), config);
        let reopened = ConfigStore::open(store.path()).unwrap();
        assert_eq!(reopened.snapshot().horizontal_offset_mm, Some(1.5));
    }

    #[test]
    fn invalid_file_fails_at_startup() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[]").unwrap();
        let err = ConfigStore::open(&path).unwrap_err();
        assert!(
            matches!(err, BondruckError::Config(ref reason) if reason.contains("JSON object"))
        );

        std::fs::write(&path, "{\"port\":").unwrap();
        assert!(matches!(ConfigStore::open(&path), Err(BondruckError::Config(_))));
    }

    #[test]
    fn positional_array_does_not_replace_a_valid_snapshot() {
        let (_dir, store) = store();
        store
            .save(AgentConfig {
                printer_name: "Counter".into(),
                ..AgentConfig::default()
            })
            .unwrap();
        rewrite(store.path(), "[4000, \"Other\"]");
        assert_eq!(store.snapshot().printer_name, "Counter");
    }
}
